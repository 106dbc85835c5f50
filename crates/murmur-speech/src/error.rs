/// Errors reported by speech engines.
///
/// Callers map these onto the session's recovery policy: load errors leave
/// the model in a failed state, inference errors become empty results, and
/// cancellation is a quiet terminal state rather than a failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The operation requires a loaded model.
    #[error("no model is loaded")]
    NotLoaded,
    /// Acquiring the native model resource failed.
    #[error("failed to load model: {0}")]
    Load(String),
    /// The native backend faulted during inference.
    #[error("inference failed: {0}")]
    Inference(String),
    /// The backend is not compiled in or the platform does not provide it.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// The operation does not apply to this engine variant.
    #[error("operation is not supported by {0} engines")]
    Unsupported(&'static str),
    /// The caller's cancellation token fired at a checkpoint.
    #[error("operation was cancelled")]
    Cancelled,
    /// A previous holder of the engine lock panicked.
    #[error("engine lock poisoned")]
    Poisoned,
    /// The blocking task running the engine did not complete.
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
