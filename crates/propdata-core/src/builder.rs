//! Composition root for [`DataAggregator`].

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::adapters::{
    DemographicsAdapter, ListingsAdapter, ProviderAdapter, PublicRecordsAdapter, ValuationAdapter,
};
use crate::aggregator::DataAggregator;
use crate::cache::ResponseCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::client::{ServiceClient, ServiceSettings};
use crate::fixtures::{fixture_base_url, FixtureHttpClient};
use crate::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::{ServiceId, ValidationError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-service connection settings collected by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl ServiceConfig {
    pub fn default_for(service: ServiceId) -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            rate_limit: RateLimitConfig::default_for(service),
        }
    }
}

/// Builds a [`DataAggregator`] with one shared rate limiter, circuit
/// breaker and response cache.
///
/// # Environment Variables
///
/// | Service | API key | Base URL |
/// |---------|---------|----------|
/// | listings | `PROPDATA_LISTINGS_API_KEY` | `PROPDATA_LISTINGS_BASE_URL` |
/// | valuation | `PROPDATA_VALUATION_API_KEY` | `PROPDATA_VALUATION_BASE_URL` |
/// | publicRecords | `PROPDATA_PUBLIC_RECORDS_API_KEY` | `PROPDATA_PUBLIC_RECORDS_BASE_URL` |
/// | demographics | `PROPDATA_DEMOGRAPHICS_API_KEY` | `PROPDATA_DEMOGRAPHICS_BASE_URL` |
///
/// A service is queried only when it has both a key and a base URL, or when
/// offline mode is on.
///
/// ```rust,ignore
/// use propdata_core::AggregatorBuilder;
///
/// let aggregator = AggregatorBuilder::new().with_env().build()?;
/// let offline = AggregatorBuilder::new().with_offline_mode().build()?;
/// ```
pub struct AggregatorBuilder {
    offline: bool,
    services: BTreeMap<ServiceId, ServiceConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    request_timeout: Duration,
    retry: RetryConfig,
    circuit_breaker: CircuitBreakerConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
    cache: Option<ResponseCache>,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self {
            offline: false,
            services: ServiceId::ALL
                .into_iter()
                .map(|service| (service, ServiceConfig::default_for(service)))
                .collect(),
            http_client: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: None,
            breaker: None,
            cache: None,
        }
    }

    /// Reads `PROPDATA_<SERVICE>_API_KEY` and `PROPDATA_<SERVICE>_BASE_URL`.
    ///
    /// Values already set explicitly are kept.
    pub fn with_env(mut self) -> Self {
        for (service, config) in &mut self.services {
            let prefix = service.env_prefix();
            if config.api_key.is_none() {
                config.api_key = read_env(&format!("PROPDATA_{prefix}_API_KEY"));
            }
            if config.base_url.is_none() {
                config.base_url = read_env(&format!("PROPDATA_{prefix}_BASE_URL"));
            }
        }
        self
    }

    /// Serves every service from the deterministic fixture transport.
    pub fn with_offline_mode(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn with_api_key(mut self, service: ServiceId, key: impl Into<String>) -> Self {
        self.config_mut(service).api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, service: ServiceId, base_url: impl Into<String>) -> Self {
        self.config_mut(service).base_url = Some(base_url.into());
        self
    }

    pub fn with_rate_limit(mut self, service: ServiceId, rate_limit: RateLimitConfig) -> Self {
        self.config_mut(service).rate_limit = rate_limit;
        self
    }

    pub fn with_service_enabled(mut self, service: ServiceId, enabled: bool) -> Self {
        self.config_mut(service).enabled = enabled;
        self
    }

    /// Replaces the transport for every service.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Shares resilience state with other aggregators in the process.
    pub fn with_shared_state(
        mut self,
        rate_limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        cache: ResponseCache,
    ) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self.breaker = Some(breaker);
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<DataAggregator, ValidationError> {
        for config in self.services.values() {
            config.rate_limit.validate()?;
        }

        let http_client: Arc<dyn HttpClient> = match (&self.http_client, self.offline) {
            (Some(client), _) => Arc::clone(client),
            (None, true) => Arc::new(FixtureHttpClient::new()),
            (None, false) => Arc::new(ReqwestHttpClient::new()),
        };
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new()));
        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(self.circuit_breaker)));
        let cache = self.cache.unwrap_or_default();

        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        let mut clients = BTreeMap::new();

        for (service, config) in self.services {
            if !config.enabled {
                debug!(service = service.as_str(), "service disabled");
                continue;
            }

            let settings = resolve_settings(service, &config, self.offline)
                .with_rate_limit(config.rate_limit)
                .with_timeout(self.request_timeout);
            let client = ServiceClient::new(
                service,
                settings,
                Arc::clone(&http_client),
                Arc::clone(&rate_limiter),
                cache.clone(),
            );

            adapters.push(adapter_for(service, client.clone(), self.offline));
            clients.insert(service, client);
        }

        let retry = RetryPolicy::new(self.retry, breaker);
        Ok(DataAggregator::new(adapters, clients, retry, cache))
    }

    fn config_mut(&mut self, service: ServiceId) -> &mut ServiceConfig {
        self.services
            .entry(service)
            .or_insert_with(|| ServiceConfig::default_for(service))
    }
}

fn resolve_settings(service: ServiceId, config: &ServiceConfig, offline: bool) -> ServiceSettings {
    let base_url = match (&config.base_url, offline) {
        (Some(url), _) => url.clone(),
        (None, true) => fixture_base_url(service),
        (None, false) => {
            if config.api_key.is_some() {
                warn!(
                    service = service.as_str(),
                    "API key set without PROPDATA_{}_BASE_URL; service stays unconfigured",
                    service.env_prefix()
                );
            }
            return ServiceSettings::new(String::new(), HttpAuth::None);
        }
    };

    let auth = config
        .api_key
        .as_ref()
        .map_or(HttpAuth::None, |key| auth_for(service, key));
    ServiceSettings::new(base_url, auth)
}

/// Credential placement each provider expects.
fn auth_for(service: ServiceId, key: &str) -> HttpAuth {
    match service {
        ServiceId::Listings => HttpAuth::BearerToken(key.to_owned()),
        ServiceId::Valuation => HttpAuth::Header {
            name: String::from("X-API-Key"),
            value: key.to_owned(),
        },
        ServiceId::PublicRecords => HttpAuth::QueryKey {
            name: String::from("apikey"),
            value: key.to_owned(),
        },
        ServiceId::Demographics => HttpAuth::QueryKey {
            name: String::from("key"),
            value: key.to_owned(),
        },
    }
}

fn adapter_for(
    service: ServiceId,
    client: ServiceClient,
    offline: bool,
) -> Arc<dyn ProviderAdapter> {
    match service {
        ServiceId::Listings => Arc::new(ListingsAdapter::new(client).with_offline(offline)),
        ServiceId::PublicRecords => {
            Arc::new(PublicRecordsAdapter::new(client).with_offline(offline))
        }
        ServiceId::Valuation => Arc::new(ValuationAdapter::new(client).with_offline(offline)),
        ServiceId::Demographics => {
            Arc::new(DemographicsAdapter::new(client).with_offline(offline))
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_build_makes_every_service_available() {
        let aggregator = AggregatorBuilder::new()
            .with_offline_mode()
            .build()
            .expect("offline build succeeds");

        let status = aggregator.service_status();
        assert_eq!(status.len(), 4);
        assert!(status.iter().all(|entry| entry.available));
    }

    #[test]
    fn key_without_base_url_leaves_service_unconfigured() {
        let aggregator = AggregatorBuilder::new()
            .with_api_key(ServiceId::Listings, "token")
            .with_api_key(ServiceId::Valuation, "avm")
            .with_base_url(ServiceId::Valuation, "https://avm.example.test")
            .build()
            .expect("build succeeds");

        let status = aggregator.service_status();
        let available = |service: ServiceId| {
            status
                .iter()
                .find(|entry| entry.service == service)
                .is_some_and(|entry| entry.available)
        };
        assert!(!available(ServiceId::Listings));
        assert!(available(ServiceId::Valuation));
        assert!(!available(ServiceId::PublicRecords));
    }

    #[test]
    fn disabled_service_is_not_registered() {
        let aggregator = AggregatorBuilder::new()
            .with_offline_mode()
            .with_service_enabled(ServiceId::Demographics, false)
            .build()
            .expect("build succeeds");

        let demographics = aggregator
            .service_status()
            .into_iter()
            .find(|entry| entry.service == ServiceId::Demographics)
            .expect("status lists every service");
        assert!(!demographics.available);
        assert!(demographics.capabilities.is_empty());
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let error = AggregatorBuilder::new()
            .with_rate_limit(ServiceId::Listings, RateLimitConfig::per_minute(0))
            .build()
            .err()
            .expect("build must fail");
        assert!(matches!(error, ValidationError::ZeroRateLimit { .. }));
    }

    #[test]
    fn auth_placement_differs_per_service() {
        assert!(matches!(
            auth_for(ServiceId::Listings, "k"),
            HttpAuth::BearerToken(_)
        ));
        assert!(matches!(
            auth_for(ServiceId::PublicRecords, "k"),
            HttpAuth::QueryKey { .. }
        ));
    }
}
