//! Backend runtime entry point and public API surface.
//!
//! This crate owns the backend lifecycle, routes bridge messages to services,
//! and runs the transcription session that ties capture, normalization, and
//! the speech engines together.

mod app;
mod capture;
mod config;
mod runtime;
mod services;
mod state;

pub mod collaborators;
pub mod publisher;
pub mod session;

pub use crate::collaborators::{CollaboratorError, Collaborators, TranscriptSink, Translator};
pub use crate::publisher::Publisher;
pub use crate::runtime::{run, run_with_collaborators};
pub use crate::session::{ChunkSender, EngineFactory, SessionSettings, TranscriptionSession};
