//! # Propdata Core
//!
//! Resilient multi-source property data aggregation.
//!
//! ## Overview
//!
//! A single query (a street address or a neighborhood) fans out to every
//! configured upstream service concurrently. Each call runs through a shared
//! rate limiter, a TTL response cache, a retry loop with exponential backoff
//! and a per-service circuit breaker. Answers are merged by fixed service
//! precedence into one [`AggregatedRecord`] carrying a data-quality score,
//! per-source values and structured per-service failures.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (listings, public records, valuation, demographics) |
//! | [`aggregator`] | Fan-out / fan-in, deadline and fallback substitution |
//! | [`builder`] | Environment-driven composition root |
//! | [`cache`] | TTL response cache keyed by request fingerprint |
//! | [`circuit_breaker`] | Per-service circuit breaker |
//! | [`client`] | Rate-limited, cached HTTP pipeline per service |
//! | [`domain`] | Addresses, records, comparables, history |
//! | [`error`] | Validation and service error taxonomy |
//! | [`fallback`] | Static substitute records |
//! | [`fixtures`] | Deterministic offline transport |
//! | [`http_client`] | HTTP client abstraction |
//! | [`merge`] | Precedence merge and quality scoring |
//! | [`rate_limiter`] | Sliding-window request budgets |
//! | [`retry`] | Retry policy wired to the circuit breaker |
//! | [`service`] | Service identifiers, precedence and weights |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use propdata_core::{AggregationOptions, AggregatorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let aggregator = AggregatorBuilder::new().with_env().build()?;
//!     let record = aggregator
//!         .get_property_data("1 Main St, Springfield", &AggregationOptions::default())
//!         .await?;
//!
//!     println!("quality {} ({:?})", record.data_quality.score, record.data_quality.confidence_label);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Aggregator │────▶│ Merge / Scoring  │
//! └────────┬────────┘     └──────────────────┘
//!          │ join_all
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry Policy    │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider        │────▶│ Service Client   │──▶ rate limiter, cache
//! │ Adapters        │     │ (HttpClient)     │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Invalid input surfaces as [`CoreError::Validation`] before any network
//! call. Provider failures never fail the aggregation; they are reported in
//! [`AggregatedRecord::errors`] with a stable code:
//!
//! ```rust
//! use propdata_core::{ServiceError, ServiceErrorKind};
//!
//! fn should_alert(error: &ServiceError) -> bool {
//!     matches!(
//!         error.kind(),
//!         ServiceErrorKind::Unauthorized | ServiceErrorKind::CircuitOpen
//!     )
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables or the builder, never logged
//! - Credentials are redacted from `Debug` output

pub mod adapters;
pub mod aggregator;
pub mod builder;
pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod fixtures;
pub mod http_client;
pub mod merge;
pub mod rate_limiter;
pub mod retry;
pub mod service;

// Adapter implementations
pub use adapters::{
    AdapterFuture, CapabilitySet, DemographicsAdapter, ListingsAdapter, Operation,
    ProviderAdapter, PublicRecordsAdapter, ValuationAdapter,
};

// Aggregation
pub use aggregator::{
    AggregationOptions, ComparablesReport, DataAggregator, ServiceStatus, DEFAULT_DEADLINE,
    DEFAULT_RADIUS_MILES,
};
pub use builder::{AggregatorBuilder, ServiceConfig};

// Caching
pub use cache::{CacheMode, CacheTtl, ResponseCache};

// Circuit breaker
pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};

// Service client
pub use client::{RequestDescriptor, ServiceClient, ServiceSettings};

// Domain models
pub use domain::{
    address_key, validate_radius, Address, AggregatedRecord, Comparable, ConfidenceLabel,
    DataQuality, Field, FieldValue, MergedValue, PermitEvent, PropertyHistory, ProviderFailure,
    ProviderRecord, RecordKind, Region, SaleEvent, UtcDateTime,
};

// Error types
pub use error::{CoreError, ServiceError, ServiceErrorKind, ValidationError};

// Offline transport
pub use fixtures::FixtureHttpClient;

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpMethod, HttpRequest,
    HttpResponse, ReqwestHttpClient,
};

// Merge
pub use merge::{merge_records, score_quality, MergeOutcome};

// Rate limiting
pub use rate_limiter::{RateLimitConfig, RateLimitRemaining, RateLimiter};

// Retry logic
pub use retry::{Backoff, RetryConfig, RetryPolicy};

// Service identifiers
pub use service::ServiceId;
