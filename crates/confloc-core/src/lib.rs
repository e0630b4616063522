use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = color_eyre::eyre::Result<T>;

/// System default language used when the caller supplies none.
pub const SYSTEM_DEFAULT_LANG: &str = "en_US";

/// Name prefix that marks a standard reference document in the registry.
pub const STANDARD_PREFIX: &str = "Standard";

#[derive(Debug, Error)]
pub enum ConflocError {
    #[error("xml parse error: {0}")]
    Xml(String),
    #[error("workbook error: {0}")]
    Workbook(String),
    #[error("document did not match any known configuration shape: {0}")]
    Unclassified(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Cooperative cancellation flag shared between a caller and a running
/// export/import pass. The engines poll it at their suspension points only,
/// so a raised flag never interrupts a half-applied mutation batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise `ConflocError::Cancelled` if the flag has been set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ConflocError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

/// Whether an error chain bottoms out in a cancellation request.
pub fn is_cancelled(err: &color_eyre::eyre::Report) -> bool {
    err.chain()
        .any(|e| matches!(e.downcast_ref::<ConflocError>(), Some(ConflocError::Cancelled)))
}
