use thiserror::Error;

/// Failures surfaced by [`SceneOrchestrator::start`](crate::SceneOrchestrator::start).
///
/// Collaborator failures keep their `anyhow` chain as the error source so the
/// caller can print the full context with `{:?}`.
#[derive(Debug, Error)]
pub enum BackdropError {
    #[error("failed to load panorama texture {path}")]
    Texture {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to create decorative mesh `{kind}`")]
    DecorativeMesh {
        kind: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("world snapshot could not be built")]
    Snapshot(#[source] anyhow::Error),
    #[error("backdrop was disposed before it finished starting")]
    Cancelled,
    #[error("backdrop has already been started")]
    AlreadyStarted,
}

impl BackdropError {
    /// Returns true when the error was caused by disposal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackdropError::Cancelled)
    }
}
