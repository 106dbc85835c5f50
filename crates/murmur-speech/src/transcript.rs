use crate::types::TranscriptionResult;

/// What a fold step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptChange {
    Unchanged,
    /// Only the hypothesis was replaced.
    Hypothesis,
    /// Confirmed text grew (the hypothesis may have been cleared as well).
    Confirmed,
}

/// Live transcript built from engine results.
///
/// Confirmed text only ever grows: a final result is appended and never
/// revisited, no matter what later partial results say. The hypothesis is
/// replaced wholesale by every partial result and cleared once its
/// utterance settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    confirmed: String,
    hypothesis: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one engine result into the transcript.
    pub fn apply(&mut self, result: &TranscriptionResult) -> TranscriptChange {
        let text = clean(&result.text);
        if result.is_final {
            let had_hypothesis = !self.hypothesis.is_empty();
            self.hypothesis.clear();
            if self.append_confirmed(&text) {
                TranscriptChange::Confirmed
            } else if had_hypothesis {
                TranscriptChange::Hypothesis
            } else {
                TranscriptChange::Unchanged
            }
        } else if self.hypothesis != text {
            self.hypothesis = text;
            TranscriptChange::Hypothesis
        } else {
            TranscriptChange::Unchanged
        }
    }

    /// Moves the open hypothesis into confirmed text, for engines that end an
    /// utterance without a final result of their own.
    pub fn commit_hypothesis(&mut self) -> TranscriptChange {
        let hypothesis = std::mem::take(&mut self.hypothesis);
        if self.append_confirmed(&hypothesis) {
            TranscriptChange::Confirmed
        } else {
            TranscriptChange::Unchanged
        }
    }

    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.hypothesis.clear();
    }

    pub fn confirmed(&self) -> &str {
        &self.confirmed
    }

    pub fn hypothesis(&self) -> &str {
        &self.hypothesis
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.hypothesis.is_empty()
    }

    fn append_confirmed(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if !self.confirmed.is_empty() {
            self.confirmed.push(' ');
        }
        self.confirmed.push_str(text);
        true
    }
}

/// Trims the text and drops non-speech markers like `[BLANK_AUDIO]` or
/// `(music)`, including markers that span several words. An unclosed marker
/// runs to the end of the text.
fn clean(text: &str) -> String {
    let mut spoken = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => {
                depth -= 1;
                spoken.push(' ');
            }
            _ if depth == 0 => spoken.push(ch),
            _ => {}
        }
    }
    spoken.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_three_chunks_with_middle_final() {
        let mut transcript = Transcript::new();

        transcript.apply(&TranscriptionResult::partial("the quick"));
        assert_eq!(transcript.confirmed(), "");
        assert_eq!(transcript.hypothesis(), "the quick");

        let change = transcript.apply(&TranscriptionResult::final_text("the quick brown fox"));
        assert_eq!(change, TranscriptChange::Confirmed);
        assert_eq!(transcript.confirmed(), "the quick brown fox");
        assert_eq!(transcript.hypothesis(), "");

        transcript.apply(&TranscriptionResult::partial("jumps"));
        assert_eq!(transcript.confirmed(), "the quick brown fox");
        assert_eq!(transcript.hypothesis(), "jumps");

        transcript.apply(&TranscriptionResult::final_text("jumps over"));
        assert_eq!(transcript.confirmed(), "the quick brown fox jumps over");
        assert_eq!(transcript.hypothesis(), "");
    }

    #[test]
    fn confirmed_text_only_grows() {
        let script = [
            TranscriptionResult::partial("a"),
            TranscriptionResult::final_text("alpha"),
            TranscriptionResult::partial("be"),
            TranscriptionResult::partial("bet"),
            TranscriptionResult::final_text(""),
            TranscriptionResult::partial("gamma"),
            TranscriptionResult::final_text("[BLANK_AUDIO]"),
            TranscriptionResult::final_text("delta"),
            TranscriptionResult::partial("something else entirely"),
        ];

        let mut transcript = Transcript::new();
        let mut previous = String::new();
        for result in &script {
            transcript.apply(result);
            assert!(
                transcript.confirmed().starts_with(&previous),
                "{previous:?} was rewritten to {:?}",
                transcript.confirmed()
            );
            previous = transcript.confirmed().to_string();
        }
        assert_eq!(transcript.confirmed(), "alpha delta");
    }

    #[test]
    fn partial_replaces_hypothesis_in_full() {
        let mut transcript = Transcript::new();
        transcript.apply(&TranscriptionResult::partial("hello wor"));
        transcript.apply(&TranscriptionResult::partial("hello world"));
        assert_eq!(transcript.hypothesis(), "hello world");
        assert_eq!(
            transcript.apply(&TranscriptionResult::partial("hello world")),
            TranscriptChange::Unchanged
        );
    }

    #[test]
    fn commit_moves_hypothesis_into_confirmed() {
        let mut transcript = Transcript::new();
        transcript.apply(&TranscriptionResult::final_text("one"));
        transcript.apply(&TranscriptionResult::partial("two"));
        assert_eq!(transcript.commit_hypothesis(), TranscriptChange::Confirmed);
        assert_eq!(transcript.confirmed(), "one two");
        assert_eq!(transcript.hypothesis(), "");
        assert_eq!(transcript.commit_hypothesis(), TranscriptChange::Unchanged);
    }

    #[test]
    fn clear_resets_both_parts() {
        let mut transcript = Transcript::new();
        transcript.apply(&TranscriptionResult::final_text("kept"));
        transcript.apply(&TranscriptionResult::partial("open"));
        transcript.clear();
        assert!(transcript.is_empty());
        assert_eq!(transcript.hypothesis(), "");
    }

    #[test]
    fn junk_markers_are_dropped() {
        let mut transcript = Transcript::new();
        transcript.apply(&TranscriptionResult::final_text("  [BLANK_AUDIO]  "));
        assert!(transcript.is_empty());
        transcript.apply(&TranscriptionResult::final_text(" hi  [MUSIC] there "));
        assert_eq!(transcript.confirmed(), "hi there");
    }

    #[test]
    fn multi_word_markers_are_dropped() {
        let mut transcript = Transcript::new();
        transcript.apply(&TranscriptionResult::final_text("[BLANK AUDIO]"));
        transcript.apply(&TranscriptionResult::final_text("(music)"));
        transcript.apply(&TranscriptionResult::partial("( upbeat music playing )"));
        assert!(transcript.is_empty());

        transcript.apply(&TranscriptionResult::final_text("so [ Silence ] anyway (laughs) yes"));
        assert_eq!(transcript.confirmed(), "so anyway yes");
    }
}
