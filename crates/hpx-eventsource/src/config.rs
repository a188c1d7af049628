//! Connection configuration.
//!
//! [`ConnectionOptions`] is the complete, validated set of options used for a
//! single connection attempt. [`OptionsPatch`] carries partial overrides that
//! are merged on top of the stored options by
//! [`EventSourceClient::connect`](crate::EventSourceClient::connect) and
//! [`EventSourceClient::update_options`](crate::EventSourceClient::update_options).

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::retry::RetryPolicy;

/// Options for a streaming connection.
///
/// Provides sensible defaults and chainable setter methods.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOptions {
    /// Target endpoint URL.
    pub endpoint: String,
    /// Whether credentials (cookies, authorization headers) are included in
    /// the handshake.
    pub with_credentials: bool,
    /// Maximum time to wait for the connection to open.
    pub timeout: Duration,
    /// Delay between automatic reconnection attempts.
    pub retry_interval: Duration,
    /// Maximum number of automatic reconnection attempts.
    pub max_retries: u32,
    /// Extra headers sent with every connection attempt.
    pub headers: HeaderMap,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            with_credentials: false,
            timeout: Duration::from_secs(10),
            retry_interval: Duration::from_secs(3),
            max_retries: 5,
            headers: HeaderMap::new(),
        }
    }
}

impl ConnectionOptions {
    /// Create options for the given endpoint, with defaults for everything else.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set whether credentials are included in the handshake.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the establishment timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between reconnection attempts.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the maximum number of automatic reconnection attempts.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace all extra headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a single extra header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The retry policy derived from these options.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_interval, self.max_retries, self.timeout)
    }

    /// Return a copy of these options with `patch` applied on top.
    #[must_use]
    pub fn merged(&self, patch: &OptionsPatch) -> Self {
        let mut merged = self.clone();
        merged.apply(patch);
        merged
    }

    /// Apply `patch` in place. Fields absent from the patch are kept.
    ///
    /// Headers are merged per name: every name present in the patch replaces
    /// all stored values for that name.
    pub fn apply(&mut self, patch: &OptionsPatch) {
        if let Some(endpoint) = &patch.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(with_credentials) = patch.with_credentials {
            self.with_credentials = with_credentials;
        }
        if let Some(timeout) = patch.timeout {
            self.timeout = timeout;
        }
        if let Some(interval) = patch.retry_interval {
            self.retry_interval = interval;
        }
        if let Some(max_retries) = patch.max_retries {
            self.max_retries = max_retries;
        }
        for name in patch.headers.keys() {
            self.headers.remove(name);
            for value in patch.headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("Endpoint cannot be empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("Timeout must be > 0".to_string());
        }
        Ok(())
    }
}

/// Partial overrides for [`ConnectionOptions`].
///
/// Every field is optional; only the fields that are set take part in a
/// merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionsPatch {
    /// Override for [`ConnectionOptions::endpoint`].
    pub endpoint: Option<String>,
    /// Override for [`ConnectionOptions::with_credentials`].
    pub with_credentials: Option<bool>,
    /// Override for [`ConnectionOptions::timeout`].
    pub timeout: Option<Duration>,
    /// Override for [`ConnectionOptions::retry_interval`].
    pub retry_interval: Option<Duration>,
    /// Override for [`ConnectionOptions::max_retries`].
    pub max_retries: Option<u32>,
    /// Headers merged over [`ConnectionOptions::headers`].
    pub headers: HeaderMap,
}

impl OptionsPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Override the credential flag.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = Some(with_credentials);
        self
    }

    /// Override the establishment timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the reconnection interval.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// Override the maximum number of reconnection attempts.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Add a header to merge.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns `true` if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.with_credentials.is_none()
            && self.timeout.is_none()
            && self.retry_interval.is_none()
            && self.max_retries.is_none()
            && self.headers.is_empty()
    }
}

impl From<ConnectionOptions> for OptionsPatch {
    fn from(options: ConnectionOptions) -> Self {
        Self {
            endpoint: Some(options.endpoint),
            with_credentials: Some(options.with_credentials),
            timeout: Some(options.timeout),
            retry_interval: Some(options.retry_interval),
            max_retries: Some(options.max_retries),
            headers: options.headers,
        }
    }
}
