// ABOUTME: Connection-wide tunables negotiated or applied at SETUP time
// ABOUTME: A config struct with a validated builder that checks required fields at build time

use std::fmt;
use std::sync::Arc;

use crate::error::RSocketError;

pub const DEFAULT_MISSED_KEEPALIVE_THRESHOLD: u32 = 3;
pub const DEFAULT_MIME_TYPE: &str = "application/binary";
pub const DEFAULT_MAX_INBOUND_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Receives otherwise-unactionable errors the driver can't return to a caller (a fatal
/// teardown with nobody left awaiting the result, a cleanup task that failed in the
/// background). Defaults to logging at `tracing::warn!`.
pub type ErrorConsumer = Arc<dyn Fn(&RSocketError) + Send + Sync>;

fn default_error_consumer() -> ErrorConsumer {
    Arc::new(|err: &RSocketError| {
        tracing::warn!(error = %err, "unreported connection error");
    })
}

/// Per-connection configuration, supplied at `connect`/`accept` time.
///
/// `keepalive_period_ms` and `max_lifetime_ms` are required and validated to be
/// nonzero by [`ConnectionConfig::build`]; every other field has the default named in
/// the external interfaces section.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub keepalive_period_ms: u32,
    pub max_lifetime_ms: u32,
    pub missed_keepalive_threshold: u32,
    pub honor_lease: bool,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub max_inbound_payload_size: u32,
    pub error_consumer: ErrorConsumer,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("keepalive_period_ms", &self.keepalive_period_ms)
            .field("max_lifetime_ms", &self.max_lifetime_ms)
            .field("missed_keepalive_threshold", &self.missed_keepalive_threshold)
            .field("honor_lease", &self.honor_lease)
            .field("metadata_mime_type", &self.metadata_mime_type)
            .field("data_mime_type", &self.data_mime_type)
            .field("max_inbound_payload_size", &self.max_inbound_payload_size)
            .field("error_consumer", &"<fn>")
            .finish()
    }
}

impl ConnectionConfig {
    pub fn builder(keepalive_period_ms: u32, max_lifetime_ms: u32) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            keepalive_period_ms,
            max_lifetime_ms,
            missed_keepalive_threshold: DEFAULT_MISSED_KEEPALIVE_THRESHOLD,
            honor_lease: false,
            metadata_mime_type: DEFAULT_MIME_TYPE.to_string(),
            data_mime_type: DEFAULT_MIME_TYPE.to_string(),
            max_inbound_payload_size: DEFAULT_MAX_INBOUND_PAYLOAD_SIZE,
            error_consumer: default_error_consumer(),
        }
    }
}

/// Builder that validates the required fields before producing a [`ConnectionConfig`].
#[derive(Clone)]
pub struct ConnectionConfigBuilder {
    keepalive_period_ms: u32,
    max_lifetime_ms: u32,
    missed_keepalive_threshold: u32,
    honor_lease: bool,
    metadata_mime_type: String,
    data_mime_type: String,
    max_inbound_payload_size: u32,
    error_consumer: ErrorConsumer,
}

impl ConnectionConfigBuilder {
    pub fn missed_keepalive_threshold(mut self, n: u32) -> Self {
        self.missed_keepalive_threshold = n;
        self
    }

    pub fn honor_lease(mut self, honor: bool) -> Self {
        self.honor_lease = honor;
        self
    }

    pub fn metadata_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.metadata_mime_type = mime.into();
        self
    }

    pub fn data_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.data_mime_type = mime.into();
        self
    }

    pub fn max_inbound_payload_size(mut self, bytes: u32) -> Self {
        self.max_inbound_payload_size = bytes;
        self
    }

    pub fn error_consumer(mut self, f: impl Fn(&RSocketError) + Send + Sync + 'static) -> Self {
        self.error_consumer = Arc::new(f);
        self
    }

    pub fn build(self) -> Result<ConnectionConfig, RSocketError> {
        if self.keepalive_period_ms == 0 {
            return Err(RSocketError::Invalid(
                "keepalive_period_ms must be > 0".into(),
            ));
        }
        if self.max_lifetime_ms == 0 {
            return Err(RSocketError::Invalid("max_lifetime_ms must be > 0".into()));
        }
        Ok(ConnectionConfig {
            keepalive_period_ms: self.keepalive_period_ms,
            max_lifetime_ms: self.max_lifetime_ms,
            missed_keepalive_threshold: self.missed_keepalive_threshold,
            honor_lease: self.honor_lease,
            metadata_mime_type: self.metadata_mime_type,
            data_mime_type: self.data_mime_type,
            max_inbound_payload_size: self.max_inbound_payload_size,
            error_consumer: self.error_consumer,
        })
    }
}

impl Default for ConnectionConfig {
    /// 30s keepalive / 120s max lifetime, matching commonly used RSocket client defaults.
    fn default() -> Self {
        ConnectionConfig::builder(30_000, 120_000)
            .build()
            .expect("default config is always valid")
    }
}
