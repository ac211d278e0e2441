pub mod http;

pub use http::HttpListingSource;

use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, Operation};

pub type SourceResult<T> = Result<T, CoreError>;

/// Transport for the remote listing service. Implementations only move raw
/// response bodies; parsing and normalization happen in [`crate::fetch`].
///
/// Calls are blocking and are run on the blocking pool by the engine.
pub trait ListingSource: Send + Sync {
    /// `GET /listings?{query_string}`.
    fn search_listings(&self, query_string: &str) -> SourceResult<String>;

    /// `GET /search/suggestions?q={text}`.
    fn search_suggestions(&self, text: &str) -> SourceResult<String>;

    /// `GET /favorites`.
    fn favorites(&self) -> SourceResult<String>;
}

/// Runs one source call on the blocking pool.
pub(crate) async fn call_source<F>(
    operation: Operation,
    source: Arc<dyn ListingSource>,
    call: F,
) -> SourceResult<String>
where
    F: FnOnce(&dyn ListingSource) -> SourceResult<String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(source.as_ref()))
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("source call join failure: {join_error}"),
            )
            .during(operation)
        })?
        .map_err(|error| error.during(operation))
}

/// Like [`call_source`], retrying once when the failure is transient and the
/// operation is an idempotent read.
pub(crate) async fn call_source_with_retry<F>(
    operation: Operation,
    source: Arc<dyn ListingSource>,
    call: F,
) -> SourceResult<String>
where
    F: Fn(&dyn ListingSource) -> SourceResult<String> + Clone + Send + 'static,
{
    match call_source(operation, Arc::clone(&source), call.clone()).await {
        Err(error) if error.is_retryable() && operation.is_idempotent_read() => {
            tracing::warn!(
                operation = ?operation,
                status = ?error.status,
                message = %error.message,
                "retrying read after transient failure"
            );
            call_source(operation, source, call).await
        }
        result => result,
    }
}
