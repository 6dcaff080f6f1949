use thiserror::Error;

use crate::ServiceId;

/// Validation errors for caller-supplied input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("address cannot be empty")]
    EmptyAddress,
    #[error("address length {len} exceeds max {max}")]
    AddressTooLong { len: usize, max: usize },
    #[error("address contains control character at index {index}")]
    AddressControlChar { index: usize },

    #[error("region cannot be empty")]
    EmptyRegion,
    #[error("region length {len} exceeds max {max}")]
    RegionTooLong { len: usize, max: usize },
    #[error("region contains control character at index {index}")]
    RegionControlChar { index: usize },

    #[error("search radius must be a positive finite number of miles, got {value}")]
    InvalidRadius { value: f64 },

    #[error(
        "invalid service '{value}', expected one of listings, valuation, publicRecords, demographics"
    )]
    InvalidService { value: String },

    #[error("timestamp must be RFC3339 UTC, got '{value}'")]
    TimestampNotUtc { value: String },

    #[error("rate limit ceiling for '{window}' must be greater than zero")]
    ZeroRateLimit { window: &'static str },
}

/// Closed error taxonomy surfaced to callers of a service.
///
/// A kind is assigned once where the failure is first observed; retry and
/// circuit-breaker decisions match on it instead of inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorKind {
    RateLimitExceeded,
    Unauthorized,
    NotFound,
    ServerError,
    Network,
    Timeout,
    Parsing,
    Api,
    CircuitOpen,
    Cancelled,
    Unsupported,
    NotConfigured,
}

impl ServiceErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::ServerError => "SERVER_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Parsing => "PARSING_ERROR",
            Self::Api => "API_ERROR",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Cancelled => "CANCELLED",
            Self::Unsupported => "UNSUPPORTED",
            Self::NotConfigured => "NOT_CONFIGURED",
        }
    }

    /// Transient failures worth another attempt after a backoff.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ServerError | Self::Network | Self::Timeout)
    }

    /// Failures that indicate the service itself is unhealthy.
    ///
    /// Client errors (4xx) and local refusals prove nothing about upstream
    /// health, so they never move the breaker.
    pub const fn counts_against_circuit(self) -> bool {
        matches!(self, Self::ServerError | Self::Network | Self::Timeout)
    }
}

/// Classified failure of a single service call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{service}: {message} ({})", .kind.code())]
pub struct ServiceError {
    kind: ServiceErrorKind,
    service: ServiceId,
    message: String,
    status: Option<u16>,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, service: ServiceId, message: impl Into<String>) -> Self {
        Self {
            kind,
            service,
            message: message.into(),
            status: None,
        }
    }

    /// Classifies a non-2xx HTTP status.
    pub fn from_status(service: ServiceId, status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ServiceErrorKind::Unauthorized,
            404 => ServiceErrorKind::NotFound,
            429 => ServiceErrorKind::RateLimitExceeded,
            500..=599 => ServiceErrorKind::ServerError,
            _ => ServiceErrorKind::Api,
        };

        let detail = body.trim();
        let message = if detail.is_empty() {
            format!("upstream returned status {status}")
        } else {
            let snippet: String = detail.chars().take(200).collect();
            format!("upstream returned status {status}: {snippet}")
        };

        Self {
            kind,
            service,
            message,
            status: Some(status),
        }
    }

    pub fn rate_limited(service: ServiceId) -> Self {
        Self::new(
            ServiceErrorKind::RateLimitExceeded,
            service,
            "local rate limit exceeded; request not sent",
        )
    }

    pub fn circuit_open(service: ServiceId) -> Self {
        Self::new(
            ServiceErrorKind::CircuitOpen,
            service,
            "circuit breaker is open; skipping upstream call",
        )
    }

    pub fn cancelled(service: ServiceId) -> Self {
        Self::new(
            ServiceErrorKind::Cancelled,
            service,
            "request cancelled before completion",
        )
    }

    pub fn timeout(service: ServiceId, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Timeout, service, message)
    }

    pub fn parsing(service: ServiceId, message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Parsing, service, message)
    }

    pub fn unsupported(service: ServiceId, operation: &str) -> Self {
        Self::new(
            ServiceErrorKind::Unsupported,
            service,
            format!("operation '{operation}' is not supported by this service"),
        )
    }

    /// The service was skipped for lack of a credential or base URL.
    pub fn not_configured(service: ServiceId) -> Self {
        Self::new(
            ServiceErrorKind::NotConfigured,
            service,
            "service not configured; set its API key and base URL",
        )
    }

    pub const fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub const fn service(&self) -> ServiceId {
        self.service
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub const fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the upstream answered at all, as opposed to a local refusal.
    ///
    /// `NotFound` counts even without a status: adapters raise it for a
    /// well-formed answer that holds no matching record.
    pub const fn reached_service(&self) -> bool {
        self.status.is_some()
            || matches!(self.kind, ServiceErrorKind::Parsing | ServiceErrorKind::NotFound)
    }
}

/// Top-level error type for aggregator operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        let cases = [
            (401, ServiceErrorKind::Unauthorized),
            (403, ServiceErrorKind::Unauthorized),
            (404, ServiceErrorKind::NotFound),
            (429, ServiceErrorKind::RateLimitExceeded),
            (500, ServiceErrorKind::ServerError),
            (503, ServiceErrorKind::ServerError),
            (400, ServiceErrorKind::Api),
            (302, ServiceErrorKind::Api),
        ];

        for (status, expected) in cases {
            let error = ServiceError::from_status(ServiceId::Listings, status, "");
            assert_eq!(error.kind(), expected, "status {status}");
            assert_eq!(error.status(), Some(status));
        }
    }

    #[test]
    fn only_transient_kinds_retry_or_trip_the_circuit() {
        for kind in [
            ServiceErrorKind::ServerError,
            ServiceErrorKind::Network,
            ServiceErrorKind::Timeout,
        ] {
            assert!(kind.is_retryable());
            assert!(kind.counts_against_circuit());
        }

        for kind in [
            ServiceErrorKind::Unauthorized,
            ServiceErrorKind::NotFound,
            ServiceErrorKind::RateLimitExceeded,
            ServiceErrorKind::Parsing,
            ServiceErrorKind::Api,
            ServiceErrorKind::CircuitOpen,
            ServiceErrorKind::Cancelled,
            ServiceErrorKind::NotConfigured,
        ] {
            assert!(!kind.is_retryable());
            assert!(!kind.counts_against_circuit());
        }
    }

    #[test]
    fn display_includes_service_and_code() {
        let error = ServiceError::from_status(ServiceId::Valuation, 502, "bad gateway");
        let rendered = error.to_string();
        assert!(rendered.starts_with("valuation:"));
        assert!(rendered.ends_with("(SERVER_ERROR)"));
    }

    #[test]
    fn empty_answers_count_as_reaching_the_service() {
        let empty = ServiceError::new(ServiceErrorKind::NotFound, ServiceId::Valuation, "no avm");
        assert!(empty.status().is_none());
        assert!(empty.reached_service());

        assert!(!ServiceError::rate_limited(ServiceId::Valuation).reached_service());
        assert!(!ServiceError::cancelled(ServiceId::Valuation).reached_service());
        assert!(!ServiceError::not_configured(ServiceId::Valuation).reached_service());
    }
}
