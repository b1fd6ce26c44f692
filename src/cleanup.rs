use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backend::Backend;

/// Deletion of the backend chat created by a successful attempt.
pub struct Cleanup {
    backend: Arc<dyn Backend>,
    session_id: String,
    identity: String,
}

impl Cleanup {
    pub fn new(backend: Arc<dyn Backend>, session_id: String, identity: String) -> Self {
        Self {
            backend,
            session_id,
            identity,
        }
    }

    /// Fire-and-forget: the task is detached from the request and only logs failures.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self
                .backend
                .delete_chat(&self.session_id, &self.identity)
                .await
            {
                Ok(()) => tracing::debug!(
                    identity = %self.identity,
                    session_id = %self.session_id,
                    "backend chat deleted"
                ),
                Err(e) => tracing::warn!(
                    identity = %self.identity,
                    session_id = %self.session_id,
                    error = %e,
                    "failed to delete backend chat"
                ),
            }
        })
    }
}
