pub mod dead_letter;
pub mod normalizer;
pub mod outbox_publisher;
pub mod search_indexer;
pub mod search_service;

use std::sync::Arc;

use crate::domain::errors::DomainError;

/// Runs a synchronous repository call on the blocking pool so diesel never
/// stalls the async runtime.
pub(crate) async fn run_blocking<R, T, F>(repo: &Arc<R>, f: F) -> Result<T, DomainError>
where
    R: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: FnOnce(&R) -> Result<T, DomainError> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| DomainError::Storage(format!("blocking task failed: {e}")))?
}
