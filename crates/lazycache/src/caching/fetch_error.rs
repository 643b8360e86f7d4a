use std::time::Duration;

use thiserror::Error;

/// An error that happens when a provider fails to produce a value.
///
/// Errors are never cached. A provider that found nothing for a key reports that as `Ok(None)`,
/// which is not an error at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider did not answer in time.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    /// The provider refused to hand out the value.
    ///
    /// The attached string contains the provider's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The provider could not be reached or reported a transient failure.
    ///
    /// The attached string contains the provider's response.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// An unexpected error, like an I/O failure while talking to the provider.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FetchError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl FetchError {
    /// Logs the given error and turns it into an [`Internal`](Self::Internal) error.
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::Internal(e.to_string())
    }
}

/// The outcome of asking a provider for a key.
///
/// * `Ok(Some(value))`: the provider produced a value.
/// * `Ok(None)`: the provider was asked and explicitly found nothing.
/// * `Err(_)`: the provider failed.
pub type FetchResult<V> = Result<Option<V>, FetchError>;
