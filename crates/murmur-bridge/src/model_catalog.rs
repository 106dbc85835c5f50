//! Static registry of every model the application knows how to load.
//!
//! The catalog is a `const` table: adding a model is a data change. Each
//! descriptor names the engine that runs it and the files that must be
//! present under the models directory before it can load. Fetching those
//! files is somebody else's job; the catalog only answers whether they are
//! all there.

use std::path::{Path, PathBuf};

/// Concrete native engine a model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// ggml models through whisper.cpp.
    WhisperCpp,
    /// Parakeet TDT exported to ONNX.
    ParakeetOnnx,
    /// Kaldi models through libvosk.
    VoskStreaming,
    /// The operating system's recognizer.
    SystemSpeech,
}

/// Execution model of an engine, as seen by the transcription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EngineVariant {
    BatchOffline,
    Streaming,
    OsBuiltin,
}

impl EngineKind {
    pub const fn variant(self) -> EngineVariant {
        match self {
            EngineKind::WhisperCpp | EngineKind::ParakeetOnnx => EngineVariant::BatchOffline,
            EngineKind::VoskStreaming => EngineVariant::Streaming,
            EngineKind::SystemSpeech => EngineVariant::OsBuiltin,
        }
    }

    /// Whether the engine loads a directory of files rather than one file.
    const fn loads_directory(self) -> bool {
        !matches!(self, EngineKind::WhisperCpp)
    }
}

impl std::fmt::Display for EngineVariant {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            EngineVariant::BatchOffline => "Offline",
            EngineVariant::Streaming => "Streaming",
            EngineVariant::OsBuiltin => "System",
        })
    }
}

/// One remote file and the path it is stored at, relative to the model's
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFile {
    pub url: &'static str,
    pub file_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub engine: EngineKind,
    /// Human-readable language coverage.
    pub languages: &'static str,
    /// Approximate download size.
    pub size_mb: u32,
    pub description: &'static str,
    pub files: &'static [ModelFile],
}

impl ModelDescriptor {
    pub const fn variant(&self) -> EngineVariant {
        self.engine.variant()
    }

    /// Directory holding this model's files under `models_root`.
    pub fn model_dir(&self, models_root: &Path) -> PathBuf {
        models_root.join(self.id)
    }

    /// Path handed to the engine's load operation.
    pub fn load_path(&self, models_root: &Path) -> PathBuf {
        let model_dir = self.model_dir(models_root);
        match self.files.first() {
            Some(file) if !self.engine.loads_directory() => model_dir.join(file.file_name),
            _ => model_dir,
        }
    }

    /// Absolute destination of every file the model needs.
    pub fn file_paths(&self, models_root: &Path) -> Vec<(ModelFile, PathBuf)> {
        let model_dir = self.model_dir(models_root);
        self.files
            .iter()
            .map(|file| (*file, model_dir.join(file.file_name)))
            .collect()
    }

    /// True when every listed file exists and is non-empty. Models without
    /// files are always ready.
    pub fn is_downloaded(&self, models_root: &Path) -> bool {
        self.file_paths(models_root).iter().all(|(_, path)| {
            std::fs::metadata(path)
                .map(|metadata| metadata.is_file() && metadata.len() > 0)
                .unwrap_or(false)
        })
    }
}

const WHISPER_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/";

macro_rules! whisper_file {
    ($file_name:literal) => {
        ModelFile {
            url: concat!(
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/",
                $file_name
            ),
            file_name: $file_name,
        }
    };
}

macro_rules! hf_file {
    ($repo:literal, $file_name:literal) => {
        ModelFile {
            url: concat!("https://huggingface.co/", $repo, "/resolve/main/", $file_name),
            file_name: $file_name,
        }
    };
}

pub const DEFAULT_MODEL_ID: &str = "whisper-base";

static MODELS: [ModelDescriptor; 6] = [
    ModelDescriptor {
        id: "whisper-tiny",
        display_name: "Whisper Tiny",
        engine: EngineKind::WhisperCpp,
        languages: "99 languages",
        size_mb: 75,
        description: "Fastest multilingual model, noticeably less accurate.",
        files: &[whisper_file!("ggml-tiny.bin")],
    },
    ModelDescriptor {
        id: "whisper-base",
        display_name: "Whisper Base",
        engine: EngineKind::WhisperCpp,
        languages: "99 languages",
        size_mb: 142,
        description: "Balanced multilingual model.",
        files: &[whisper_file!("ggml-base.bin")],
    },
    ModelDescriptor {
        id: "whisper-small",
        display_name: "Whisper Small",
        engine: EngineKind::WhisperCpp,
        languages: "99 languages",
        size_mb: 466,
        description: "Most accurate bundled Whisper model, slow on older CPUs.",
        files: &[whisper_file!("ggml-small.bin")],
    },
    ModelDescriptor {
        id: "parakeet-tdt-v2",
        display_name: "Parakeet TDT 0.6B v2",
        engine: EngineKind::ParakeetOnnx,
        languages: "English",
        size_mb: 2_470,
        description: "High accuracy English transcription on CPU via ONNX Runtime.",
        files: &[
            hf_file!("istupakov/parakeet-tdt-0.6b-v2-onnx", "encoder-model.onnx"),
            hf_file!("istupakov/parakeet-tdt-0.6b-v2-onnx", "encoder-model.onnx.data"),
            hf_file!("istupakov/parakeet-tdt-0.6b-v2-onnx", "decoder_joint-model.onnx"),
            hf_file!("istupakov/parakeet-tdt-0.6b-v2-onnx", "vocab.txt"),
        ],
    },
    ModelDescriptor {
        id: "vosk-small-en",
        display_name: "Vosk Small English",
        engine: EngineKind::VoskStreaming,
        languages: "English",
        size_mb: 40,
        description: "Lightweight streaming model with live partial results.",
        files: &[
            hf_file!("alphacep/vosk-model-small-en-us", "am/final.mdl"),
            hf_file!("alphacep/vosk-model-small-en-us", "conf/mfcc.conf"),
            hf_file!("alphacep/vosk-model-small-en-us", "conf/model.conf"),
            hf_file!("alphacep/vosk-model-small-en-us", "graph/Gr.fst"),
            hf_file!("alphacep/vosk-model-small-en-us", "graph/HCLr.fst"),
            hf_file!("alphacep/vosk-model-small-en-us", "graph/disambig_tid.int"),
            hf_file!("alphacep/vosk-model-small-en-us", "graph/phones/word_boundary.int"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/final.dubm"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/final.ie"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/final.mat"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/global_cmvn.stats"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/online_cmvn.conf"),
            hf_file!("alphacep/vosk-model-small-en-us", "ivector/splice.conf"),
        ],
    },
    ModelDescriptor {
        id: "system-speech",
        display_name: "System Speech Recognizer",
        engine: EngineKind::SystemSpeech,
        languages: "Depends on the operating system",
        size_mb: 0,
        description: "Listens on the default microphone; cannot transcribe files reliably.",
        files: &[],
    },
];

/// Every known model, in presentation order.
pub fn all() -> &'static [ModelDescriptor] {
    &MODELS
}

pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|model| model.id == id)
}

/// The model used when nothing else is configured.
pub fn default_model() -> &'static ModelDescriptor {
    // the table is const and always contains the default id
    find(DEFAULT_MODEL_ID).unwrap_or(&MODELS[1])
}

/// Models grouped by engine variant, groups and members in table order.
pub fn grouped_by_variant() -> Vec<(EngineVariant, Vec<&'static ModelDescriptor>)> {
    let mut groups: Vec<(EngineVariant, Vec<&'static ModelDescriptor>)> = Vec::new();
    for model in MODELS.iter() {
        match groups.iter_mut().find(|(variant, _)| *variant == model.variant()) {
            Some((_, members)) => members.push(model),
            None => groups.push((model.variant(), vec![model])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        for (index, model) in all().iter().enumerate() {
            assert!(
                all()[index + 1..].iter().all(|other| other.id != model.id),
                "duplicate id {}",
                model.id
            );
        }
    }

    #[test]
    fn default_is_whisper_base() {
        let model = default_model();
        assert_eq!(model.id, "whisper-base");
        assert_eq!(model.variant(), EngineVariant::BatchOffline);
    }

    #[test]
    fn lookup_by_id() {
        assert_eq!(find("vosk-small-en").map(|m| m.engine), Some(EngineKind::VoskStreaming));
        assert!(find("whisper-huge").is_none());
    }

    #[test]
    fn groups_cover_every_model_once() {
        let groups = grouped_by_variant();
        let variants: Vec<_> = groups.iter().map(|(variant, _)| *variant).collect();
        assert_eq!(
            variants,
            vec![EngineVariant::BatchOffline, EngineVariant::Streaming, EngineVariant::OsBuiltin]
        );
        let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
        assert_eq!(total, all().len());
    }

    #[test]
    fn whisper_urls_share_the_base() {
        for model in all().iter().filter(|m| m.engine == EngineKind::WhisperCpp) {
            for file in model.files {
                assert!(file.url.starts_with(WHISPER_BASE_URL));
                assert!(file.url.ends_with(file.file_name));
            }
        }
    }

    #[test]
    fn load_path_points_at_file_or_directory() {
        let root = Path::new("/models");
        let whisper = find("whisper-tiny").unwrap();
        assert_eq!(whisper.load_path(root), root.join("whisper-tiny").join("ggml-tiny.bin"));
        let parakeet = find("parakeet-tdt-v2").unwrap();
        assert_eq!(parakeet.load_path(root), root.join("parakeet-tdt-v2"));
    }

    #[test]
    fn downloaded_only_when_every_file_is_present() {
        let root = tempfile::tempdir().unwrap();
        let model = find("parakeet-tdt-v2").unwrap();
        assert!(!model.is_downloaded(root.path()));

        let paths = model.file_paths(root.path());
        for (_, path) in &paths[..paths.len() - 1] {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"weights").unwrap();
        }
        assert!(!model.is_downloaded(root.path()));

        let (_, last) = paths.last().unwrap();
        std::fs::write(last, b"").unwrap();
        assert!(!model.is_downloaded(root.path()), "empty files do not count");

        std::fs::write(last, b"vocab").unwrap();
        assert!(model.is_downloaded(root.path()));
    }

    #[test]
    fn fileless_models_are_always_ready() {
        let root = tempfile::tempdir().unwrap();
        assert!(find("system-speech").unwrap().is_downloaded(root.path()));
    }
}
