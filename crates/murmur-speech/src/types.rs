//! Values exchanged between engines and their callers.

/// One recognized span of speech.
///
/// Offsets are milliseconds from the start of the transcribed buffer. Backends
/// that do not report timing leave them at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub language: Option<String>,
}

/// Output of a single engine call.
///
/// Batch engines produce exactly one final result per call. Streaming engines
/// produce a sequence of results where `is_final == false` marks a revisable
/// hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: Option<String>,
    pub inference_time_ms: u64,
    pub is_final: bool,
}

impl Default for TranscriptionResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl TranscriptionResult {
    /// A final result carrying no text.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
            language: None,
            inference_time_ms: 0,
            is_final: true,
        }
    }

    /// A final result with a single untimed segment.
    pub fn final_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: single_segment(&text),
            text,
            ..Self::empty()
        }
    }

    /// A revisable streaming hypothesis.
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            is_final: false,
            ..Self::final_text(text)
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        for segment in &mut self.segments {
            if segment.language.is_none() {
                segment.language = language.clone();
            }
        }
        self.language = language;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn single_segment(text: &str) -> Vec<TranscriptSegment> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![TranscriptSegment {
        text: text.to_string(),
        ..TranscriptSegment::default()
    }]
}

/// Per-call inference settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Worker threads the backend may use.
    pub num_threads: usize,
    /// ISO 639-1 language hint; `None` lets the backend detect it.
    pub language: Option<String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get_physical().max(1),
            language: None,
        }
    }
}

impl TranscribeOptions {
    /// Builds options from optional overrides, treating `"auto"` as no hint.
    pub fn new(num_threads: Option<usize>, language: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            num_threads: num_threads.filter(|&n| n > 0).unwrap_or(defaults.num_threads),
            language: language
                .map(str::trim)
                .filter(|language| !language.is_empty() && !language.eq_ignore_ascii_case("auto"))
                .map(str::to_lowercase),
        }
    }
}
