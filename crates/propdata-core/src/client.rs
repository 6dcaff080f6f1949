//! Per-service request pipeline.
//!
//! Every call runs: rate limiter → cache lookup → transport → status
//! classification → cache store. Retries are not performed here; the
//! aggregator wraps whole adapter operations in a [`crate::RetryPolicy`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{cache_key, CacheMode, ResponseCache};
use crate::http_client::{HttpAuth, HttpClient, HttpErrorKind, HttpMethod, HttpRequest};
use crate::rate_limiter::{RateLimitConfig, RateLimitRemaining, RateLimiter};
use crate::{ServiceError, ServiceErrorKind, ServiceId};

/// Connection settings for one upstream service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub base_url: String,
    pub auth: HttpAuth,
    pub rate_limit: RateLimitConfig,
    pub timeout: Duration,
}

impl ServiceSettings {
    pub fn new(base_url: impl Into<String>, auth: HttpAuth) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            rate_limit: RateLimitConfig::unlimited(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One outbound call as described by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub cache_ttl: Option<Duration>,
    pub cache_mode: CacheMode,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            body: None,
            cache_ttl: None,
            cache_mode: CacheMode::Use,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn bypass_cache(self) -> Self {
        self.with_cache_mode(CacheMode::Bypass)
    }
}

/// Request pipeline bound to a single [`ServiceId`].
#[derive(Clone)]
pub struct ServiceClient {
    service: ServiceId,
    settings: ServiceSettings,
    http_client: Arc<dyn HttpClient>,
    rate_limiter: Arc<RateLimiter>,
    cache: ResponseCache,
}

impl ServiceClient {
    pub fn new(
        service: ServiceId,
        settings: ServiceSettings,
        http_client: Arc<dyn HttpClient>,
        rate_limiter: Arc<RateLimiter>,
        cache: ResponseCache,
    ) -> Self {
        Self {
            service,
            settings,
            http_client,
            rate_limiter,
            cache,
        }
    }

    pub const fn service(&self) -> ServiceId {
        self.service
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn has_credential(&self) -> bool {
        self.settings.auth.is_configured()
    }

    pub fn rate_limit_remaining(&self) -> RateLimitRemaining {
        self.rate_limiter.remaining(self.service, &self.settings.rate_limit)
    }

    pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<Value, ServiceError> {
        if !self.rate_limiter.can_proceed(self.service, &self.settings.rate_limit) {
            warn!(
                service = self.service.as_str(),
                endpoint = descriptor.endpoint.as_str(),
                "request denied by local rate limiter"
            );
            return Err(ServiceError::rate_limited(self.service));
        }

        let key = self.cache_key_for(descriptor);
        if let Some(key) = key.as_deref() {
            if descriptor.cache_mode.reads() {
                if let Some(hit) = self.cache.get(key).await {
                    debug!(
                        service = self.service.as_str(),
                        endpoint = descriptor.endpoint.as_str(),
                        "cache hit"
                    );
                    return Ok(hit);
                }
            }
        }

        let value = self.send(descriptor).await?;

        if let (Some(key), Some(ttl)) = (key, descriptor.cache_ttl) {
            if descriptor.cache_mode.writes() {
                self.cache.set(key, value.clone(), ttl).await;
            }
        }

        Ok(value)
    }

    fn cache_key_for(&self, descriptor: &RequestDescriptor) -> Option<String> {
        let cacheable = descriptor.method.is_idempotent_read()
            && descriptor.cache_ttl.is_some_and(|ttl| !ttl.is_zero())
            && descriptor.cache_mode != CacheMode::Bypass;

        cacheable.then(|| {
            cache_key(
                self.service,
                descriptor.method,
                &descriptor.endpoint,
                &descriptor.params,
            )
        })
    }

    async fn send(&self, descriptor: &RequestDescriptor) -> Result<Value, ServiceError> {
        let url = format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            descriptor.endpoint.trim_start_matches('/')
        );

        let mut request = HttpRequest::new(descriptor.method, url)
            .with_header("content-type", "application/json")
            .with_header("accept", "application/json")
            .with_auth(&self.settings.auth)
            .with_timeout_ms(self.settings.timeout.as_millis().min(u128::from(u64::MAX)) as u64);
        for (name, value) in &descriptor.params {
            request = request.with_query(name.clone(), value.clone());
        }
        if let Some(body) = &descriptor.body {
            request = request.with_body(body.to_string());
        }

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| {
                let kind = match error.kind() {
                    HttpErrorKind::Timeout => ServiceErrorKind::Timeout,
                    HttpErrorKind::Connect | HttpErrorKind::Other => ServiceErrorKind::Network,
                };
                ServiceError::new(kind, self.service, error.message())
            })?;

        if !response.is_success() {
            let error = ServiceError::from_status(self.service, response.status, &response.body);
            debug!(
                service = self.service.as_str(),
                status = response.status,
                code = error.code(),
                "upstream returned error status"
            );
            return Err(error);
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body).map_err(|error| {
            ServiceError::parsing(self.service, format!("malformed JSON response: {error}"))
        })
    }
}
