//! Shared fixtures for integration tests: a scripted transport and a builder
//! wired to it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use propdata_core::{
    AggregatorBuilder, HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse,
    RateLimitConfig, ServiceId,
};
use serde_json::{json, Value};

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(HttpResponse),
    Fail(HttpError),
    /// Answers only after the delay elapses on the tokio clock.
    Delayed(Duration, HttpResponse),
}

impl Scripted {
    pub fn json(body: Value) -> Self {
        Self::Respond(HttpResponse::ok_json(body.to_string()))
    }

    pub fn status(status: u16) -> Self {
        Self::Respond(HttpResponse::with_status(status, "{}"))
    }
}

struct Route {
    prefix: String,
    queue: VecDeque<Scripted>,
    last: Option<Scripted>,
}

/// In-memory transport that answers by URL prefix and counts calls.
///
/// Each route pops its queue in order; once drained, the final entry keeps
/// repeating. Unrouted URLs get a 404.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// More specific prefixes must be registered first.
    pub fn route(&self, prefix: impl Into<String>, script: Vec<Scripted>) {
        let queue: VecDeque<Scripted> = script.into_iter().collect();
        let last = queue.back().cloned();
        self.routes
            .lock()
            .expect("route table should not be poisoned")
            .push(Route {
                prefix: prefix.into(),
                queue,
                last,
            });
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .expect("call log should not be poisoned")
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("call log should not be poisoned")
            .len()
    }

    fn next(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().expect("route table should not be poisoned");
        match routes.iter_mut().find(|route| url.starts_with(&route.prefix)) {
            Some(route) => route
                .queue
                .pop_front()
                .or_else(|| route.last.clone())
                .unwrap_or_else(|| Scripted::status(404)),
            None => Scripted::status(404),
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let url = request.full_url();
            self.calls
                .lock()
                .expect("call log should not be poisoned")
                .push(url.clone());

            match self.next(&url) {
                Scripted::Respond(response) => Ok(response),
                Scripted::Fail(error) => Err(error),
                Scripted::Delayed(delay, response) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
            }
        })
    }
}

pub fn base_url(service: ServiceId) -> String {
    format!("https://{}.test", service.as_str())
}

pub fn endpoint(service: ServiceId, path: &str) -> String {
    format!("{}{path}", base_url(service))
}

/// Builder with every service configured against `http` and no rate ceilings.
pub fn builder_for(http: Arc<ScriptedHttpClient>) -> AggregatorBuilder {
    ServiceId::ALL.into_iter().fold(
        AggregatorBuilder::new().with_http_client(http),
        |builder, service| {
            builder
                .with_api_key(service, format!("{service}-key"))
                .with_base_url(service, base_url(service))
                .with_rate_limit(service, RateLimitConfig::unlimited())
        },
    )
}

pub fn listing_json(address: &str, price: f64) -> Value {
    json!({
        "listing": {
            "listingId": "MLS-1",
            "address": address,
            "listPrice": price,
            "beds": 3,
            "baths": 2.0,
            "livingAreaSqft": 1_650,
            "yearBuilt": 1960,
            "propertyType": "single_family",
            "status": "active",
            "daysOnMarket": 12
        }
    })
}

pub fn parcel_json(address: &str, assessed: f64) -> Value {
    json!({
        "parcel": {
            "apn": "123-456-789",
            "situsAddress": address,
            "assessedTotal": assessed,
            "taxAmount": 6_200.0,
            "lastSale": { "date": "2015-06-01", "amount": 410_000.0 },
            "bedrooms": 3,
            "bathrooms": 2.0,
            "buildingSqft": 1_640,
            "yearBuilt": 1961,
            "landUse": "residential"
        }
    })
}

pub fn avm_json(estimate: f64) -> Value {
    json!({
        "valuation": {
            "estimate": estimate,
            "range": { "low": estimate * 0.95, "high": estimate * 1.05 },
            "rent_estimate": 2_900.0,
            "confidence_score": 0.82
        }
    })
}

pub fn market_stats_json(region: &str) -> Value {
    json!({
        "region": region,
        "medianListPrice": 1_250_000.0,
        "medianSalePrice": 1_210_000.0,
        "activeListings": 42,
        "avgDaysOnMarket": 18.5,
        "priceChangeYoy": 3.1
    })
}

pub fn forecast_json(region: &str) -> Value {
    json!({ "region": region, "forecast_change_pct": 2.4, "horizon_months": 12 })
}

pub fn demographics_json() -> Value {
    json!({
        "population": 22_000,
        "median_household_income": 145_000.0,
        "median_age": 38.5,
        "owner_occupied_pct": 54.0
    })
}

pub fn scores_json() -> Value {
    json!({ "walkscore": 92, "transit_score": 71 })
}

/// Routes the three property endpoints to healthy answers.
pub fn route_healthy_property(http: &ScriptedHttpClient, address: &str) {
    http.route(
        endpoint(ServiceId::Listings, "/properties"),
        vec![Scripted::json(listing_json(address, 500_000.0))],
    );
    http.route(
        endpoint(ServiceId::PublicRecords, "/parcels?"),
        vec![Scripted::json(parcel_json(address, 495_000.0))],
    );
    http.route(
        endpoint(ServiceId::Valuation, "/avm"),
        vec![Scripted::json(avm_json(510_000.0))],
    );
}
