//! Fan-out / fan-in over every configured provider.
//!
//! Each provider call runs inside its own [`RetryPolicy`] loop. All loops
//! share one child [`CancellationToken`]; when the aggregate deadline passes
//! the token is cancelled, every loop unwinds promptly, and providers that
//! had not answered are reported as `TIMEOUT`.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{AdapterFuture, Operation, ProviderAdapter};
use crate::cache::ResponseCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::client::ServiceClient;
use crate::fallback::{fallback_for, Subject};
use crate::merge::{consolidate_comparables, merge_records, score_quality};
use crate::rate_limiter::RateLimitRemaining;
use crate::retry::RetryPolicy;
use crate::{
    validate_radius, Address, AggregatedRecord, Comparable, CoreError, ProviderFailure,
    ProviderRecord, RecordKind, Region, ServiceError, ServiceErrorKind, ServiceId, UtcDateTime,
};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
pub const DEFAULT_RADIUS_MILES: f64 = 1.0;

/// Per-call knobs for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregationOptions {
    /// Substitute fallback records for every failed provider, not only on
    /// total failure.
    pub include_fallback: bool,
    pub include_comparables: bool,
    pub include_history: bool,
    pub radius_miles: f64,
    pub deadline: Duration,
    /// Caller-owned token; cancelling it abandons the whole aggregation.
    pub cancel: Option<CancellationToken>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            include_fallback: false,
            include_comparables: false,
            include_history: false,
            radius_miles: DEFAULT_RADIUS_MILES,
            deadline: DEFAULT_DEADLINE,
            cancel: None,
        }
    }
}

impl AggregationOptions {
    pub fn with_fallback(mut self, include: bool) -> Self {
        self.include_fallback = include;
        self
    }

    pub fn with_comparables(mut self, include: bool) -> Self {
        self.include_comparables = include;
        self
    }

    pub fn with_history(mut self, include: bool) -> Self {
        self.include_history = include;
        self
    }

    pub fn with_radius_miles(mut self, radius_miles: f64) -> Self {
        self.radius_miles = radius_miles;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Standalone comparables search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparablesReport {
    pub request_id: String,
    pub subject: String,
    pub radius_miles: f64,
    pub comparables: Vec<Comparable>,
    pub sources: BTreeSet<ServiceId>,
    pub errors: Vec<ProviderFailure>,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
}

/// Health and budget view of one service, used by `sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service: ServiceId,
    pub available: bool,
    pub capabilities: Vec<&'static str>,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    pub rate_limit_remaining: RateLimitRemaining,
}

type Outcome<T> = (ServiceId, Result<T, ServiceError>);

/// Coordinates provider adapters, resilience state and the merge step.
pub struct DataAggregator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    clients: BTreeMap<ServiceId, ServiceClient>,
    retry: RetryPolicy,
    cache: ResponseCache,
    shutdown: CancellationToken,
}

impl DataAggregator {
    /// Adapters are consulted in precedence order regardless of input order.
    pub fn new(
        mut adapters: Vec<Arc<dyn ProviderAdapter>>,
        clients: BTreeMap<ServiceId, ServiceClient>,
        retry: RetryPolicy,
        cache: ResponseCache,
    ) -> Self {
        adapters.sort_by_key(|adapter| adapter.service().precedence());
        Self {
            adapters,
            clients,
            retry,
            cache,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.retry.breaker()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Starts the periodic cache sweep; it stops on [`DataAggregator::shutdown`].
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.cache.spawn_sweeper(every, self.shutdown.child_token())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn get_property_data(
        &self,
        address: &str,
        options: &AggregationOptions,
    ) -> Result<AggregatedRecord, CoreError> {
        let address = Address::parse(address)?;
        let radius = if options.include_comparables {
            validate_radius(options.radius_miles)?
        } else {
            options.radius_miles
        };

        let started = Instant::now();
        let token = self.request_token(options);
        let deadline_at = started + options.deadline;

        let property = self.fan_out(Operation::Property, &token, |adapter| {
            adapter.fetch_property(&address)
        });
        let comparables = async {
            if options.include_comparables {
                self.fan_out(Operation::Comparables, &token, |adapter| {
                    adapter.fetch_comparables(&address, radius)
                })
                .await
            } else {
                Vec::new()
            }
        };
        let history = async {
            if options.include_history {
                self.fan_out(Operation::History, &token, |adapter| {
                    adapter.fetch_history(&address)
                })
                .await
            } else {
                Vec::new()
            }
        };

        let ((property, comparables, history), deadline_hit) = run_until_deadline(
            &token,
            deadline_at,
            async { futures::join!(property, comparables, history) },
        )
        .await;

        let property = settle(property, deadline_hit, options.deadline);
        let comparables = settle(comparables, deadline_hit, options.deadline);
        let history = settle(history, deadline_hit, options.deadline);

        let mut record = self.assemble(
            RecordKind::Property,
            Operation::Property,
            &Subject::Address(&address),
            property,
            options.include_fallback,
        );

        let mut found = Vec::new();
        for (_, result) in comparables {
            match result {
                Ok(list) => found.extend(list),
                Err(error) => record
                    .errors
                    .push(failure(Operation::Comparables, &error)),
            }
        }
        record.comparables = consolidate_comparables(&address.normalized_key(), found, radius);

        for (_, result) in history {
            match result {
                Ok(history) => record.history = Some(history),
                Err(error) => record
                    .errors
                    .push(failure(Operation::History, &error)),
            }
        }

        record.request_id = Uuid::new_v4().to_string();
        record.latency_ms = elapsed_ms(started);
        info!(
            request_id = record.request_id.as_str(),
            subject = record.subject.as_str(),
            score = record.data_quality.score,
            sources = record.sources.len(),
            errors = record.errors.len(),
            latency_ms = record.latency_ms,
            "property aggregation complete"
        );
        Ok(record)
    }

    pub async fn get_neighborhood_data(
        &self,
        region: &str,
        options: &AggregationOptions,
    ) -> Result<AggregatedRecord, CoreError> {
        let region = Region::parse(region)?;

        let started = Instant::now();
        let token = self.request_token(options);
        let deadline_at = started + options.deadline;

        let neighborhood = self.fan_out(Operation::Neighborhood, &token, |adapter| {
            adapter.fetch_neighborhood(&region)
        });
        let (outcomes, deadline_hit) =
            run_until_deadline(&token, deadline_at, neighborhood).await;
        let outcomes = settle(outcomes, deadline_hit, options.deadline);

        let mut record = self.assemble(
            RecordKind::Neighborhood,
            Operation::Neighborhood,
            &Subject::Region(&region),
            outcomes,
            options.include_fallback,
        );
        record.request_id = Uuid::new_v4().to_string();
        record.latency_ms = elapsed_ms(started);
        info!(
            request_id = record.request_id.as_str(),
            subject = record.subject.as_str(),
            score = record.data_quality.score,
            errors = record.errors.len(),
            latency_ms = record.latency_ms,
            "neighborhood aggregation complete"
        );
        Ok(record)
    }

    pub async fn get_comparables(
        &self,
        address: &str,
        radius_miles: f64,
        options: &AggregationOptions,
    ) -> Result<ComparablesReport, CoreError> {
        let address = Address::parse(address)?;
        let radius = validate_radius(radius_miles)?;

        let started = Instant::now();
        let token = self.request_token(options);
        let deadline_at = started + options.deadline;

        let search = self.fan_out(Operation::Comparables, &token, |adapter| {
            adapter.fetch_comparables(&address, radius)
        });
        let (outcomes, deadline_hit) = run_until_deadline(&token, deadline_at, search).await;

        let mut found = Vec::new();
        let mut sources = BTreeSet::new();
        let mut errors = Vec::new();
        for (service, result) in settle(outcomes, deadline_hit, options.deadline) {
            match result {
                Ok(list) => {
                    sources.insert(service);
                    found.extend(list);
                }
                Err(error) => errors.push(failure(Operation::Comparables, &error)),
            }
        }
        if sources.is_empty() {
            errors.extend(self.unconfigured_failures(Operation::Comparables));
        }

        Ok(ComparablesReport {
            request_id: Uuid::new_v4().to_string(),
            subject: address.to_string(),
            radius_miles: radius,
            comparables: consolidate_comparables(&address.normalized_key(), found, radius),
            sources,
            errors,
            generated_at: UtcDateTime::now(),
            latency_ms: elapsed_ms(started),
        })
    }

    /// Availability, circuit state and rate-limit slack for every service.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        let now = Instant::now();
        ServiceId::ALL
            .into_iter()
            .map(|service| {
                let adapter = self
                    .adapters
                    .iter()
                    .find(|adapter| adapter.service() == service);
                let snapshot = self.breaker().snapshot(service);
                let retry_in_ms = match snapshot.state {
                    CircuitState::Open => snapshot.next_attempt_at.map(|at| {
                        at.saturating_duration_since(now).as_millis() as u64
                    }),
                    _ => None,
                };

                ServiceStatus {
                    service,
                    available: adapter.is_some_and(|adapter| adapter.is_available()),
                    capabilities: adapter
                        .map(|adapter| adapter.capabilities().supported_operations())
                        .unwrap_or_default(),
                    circuit_state: snapshot.state,
                    consecutive_failures: snapshot.consecutive_failures,
                    retry_in_ms,
                    rate_limit_remaining: self
                        .clients
                        .get(&service)
                        .map(ServiceClient::rate_limit_remaining)
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    fn request_token(&self, options: &AggregationOptions) -> CancellationToken {
        options
            .cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_else(|| self.shutdown.child_token())
    }

    async fn fan_out<'a, T, F>(
        &'a self,
        operation: Operation,
        token: &'a CancellationToken,
        call: F,
    ) -> Vec<Outcome<T>>
    where
        F: Fn(&'a dyn ProviderAdapter) -> AdapterFuture<'a, T>,
    {
        let call = &call;
        let calls = self
            .adapters
            .iter()
            .filter(|adapter| adapter.capabilities().supports(operation))
            .filter(|adapter| {
                let available = adapter.is_available();
                if !available {
                    debug!(
                        service = adapter.service().as_str(),
                        operation = operation.as_str(),
                        "skipping unconfigured provider"
                    );
                }
                available
            })
            .map(|adapter| {
                let adapter: &'a dyn ProviderAdapter = adapter.as_ref();
                let service = adapter.service();
                async move {
                    let result = self
                        .retry
                        .execute(service, token, || call(adapter))
                        .await;
                    if let Err(error) = &result {
                        warn!(
                            service = service.as_str(),
                            operation = operation.as_str(),
                            code = error.code(),
                            "provider failed: {}",
                            error.message()
                        );
                    }
                    (service, result)
                }
            });

        join_all(calls).await
    }

    /// One `NOT_CONFIGURED` entry per capable service that `fan_out` skipped.
    fn unconfigured_failures(&self, operation: Operation) -> Vec<ProviderFailure> {
        self.adapters
            .iter()
            .filter(|adapter| adapter.capabilities().supports(operation))
            .filter(|adapter| !adapter.is_available())
            .map(|adapter| failure(operation, &ServiceError::not_configured(adapter.service())))
            .collect()
    }

    /// Turns provider outcomes into a merged record.
    fn assemble(
        &self,
        kind: RecordKind,
        operation: Operation,
        subject: &Subject<'_>,
        outcomes: Vec<Outcome<ProviderRecord>>,
        include_fallback: bool,
    ) -> AggregatedRecord {
        let mut records = Vec::with_capacity(outcomes.len());
        let mut errors = Vec::new();
        for (_, result) in outcomes {
            match result {
                Ok(record) => records.push(record),
                Err(error) => errors.push(failure(operation, &error)),
            }
        }

        let total_failure = records.is_empty();
        if total_failure {
            errors.extend(self.unconfigured_failures(operation));
        }
        if include_fallback || total_failure {
            let answered: BTreeSet<ServiceId> =
                records.iter().map(|record| record.service).collect();
            let substitutes: Vec<ProviderRecord> = self
                .adapters
                .iter()
                .filter(|adapter| adapter.capabilities().supports(operation))
                .map(|adapter| adapter.service())
                .filter(|service| !answered.contains(service))
                .filter_map(|service| fallback_for(operation, service, subject))
                .collect();
            if !substitutes.is_empty() {
                debug!(
                    subject = subject.as_str(),
                    count = substitutes.len(),
                    total_failure,
                    "substituting fallback records"
                );
            }
            records.extend(substitutes);
        }

        let merged = merge_records(&records);
        let data_quality = score_quality(&merged.sources);

        AggregatedRecord {
            request_id: String::new(),
            subject: subject.as_str().to_owned(),
            kind,
            fields: merged.fields,
            by_source: merged.by_source,
            sources: merged.sources,
            fallback_sources: merged.fallback_sources,
            data_quality,
            errors,
            comparables: Vec::new(),
            history: None,
            fallback_messages: merged.fallback_messages,
            generated_at: UtcDateTime::now(),
            latency_ms: 0,
        }
    }
}

/// Drives `work` to completion, cancelling `token` once `deadline_at` passes.
///
/// Work is never dropped mid-flight: retry loops observe the cancellation,
/// release any half-open probe they hold, and return.
async fn run_until_deadline<T>(
    token: &CancellationToken,
    deadline_at: Instant,
    work: impl Future<Output = T>,
) -> (T, bool) {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => return (output, false),
        _ = tokio::time::sleep_until(deadline_at) => {}
    }

    warn!("aggregate deadline elapsed; cancelling outstanding provider calls");
    token.cancel();
    (work.await, true)
}

/// Reports calls cut short by the deadline as timeouts.
fn settle<T>(outcomes: Vec<Outcome<T>>, deadline_hit: bool, deadline: Duration) -> Vec<Outcome<T>> {
    if !deadline_hit {
        return outcomes;
    }
    outcomes
        .into_iter()
        .map(|(service, result)| match result {
            Err(error) if error.kind() == ServiceErrorKind::Cancelled => (
                service,
                Err(ServiceError::timeout(
                    service,
                    format!(
                        "no answer within the {} ms aggregate deadline",
                        deadline.as_millis()
                    ),
                )),
            ),
            other => (service, other),
        })
        .collect()
}

fn failure(operation: Operation, error: &ServiceError) -> ProviderFailure {
    ProviderFailure {
        operation: Some(operation),
        ..ProviderFailure::from(error)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
