//! Caller-supplied options for a single routing call.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options accepted by every routing operation.
///
/// Fields that don't apply to an operation are ignored.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Cancels the call when fired.
    pub signal: Option<CancellationToken>,
    /// Stop a provider search after this many providers.
    pub num_providers: Option<usize>,
    /// Provide every block of the DAG, not only the root.
    pub recursive: bool,
    /// Extra HTTP headers for the delegate request.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_num_providers(mut self, n: usize) -> Self {
        self.num_providers = Some(n);
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
