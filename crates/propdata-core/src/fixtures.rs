//! Deterministic offline transport.
//!
//! [`FixtureHttpClient`] answers `fixture://<service>/<endpoint>` URLs with
//! provider-native JSON derived from the queried address or region, so the
//! full pipeline (rate limiting, caching, retries, merge) runs without
//! network access.

use serde_json::{json, Value};

use crate::http_client::{HttpClient, HttpFuture, HttpRequest, HttpResponse};
use crate::{address_key, ServiceId};

pub const FIXTURE_SCHEME: &str = "fixture://";

const STREETS: [&str; 6] = [
    "Oak Ave",
    "Maple St",
    "Cedar Ln",
    "Pine Dr",
    "Elm St",
    "Birch Ct",
];
const PROPERTY_TYPES: [&str; 4] = ["single_family", "condo", "townhouse", "multi_family"];

/// Base URL the builder assigns to `service` in offline mode.
pub fn fixture_base_url(service: ServiceId) -> String {
    format!("{FIXTURE_SCHEME}{service}")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureHttpClient;

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self
    }

    fn respond(&self, request: &HttpRequest) -> HttpResponse {
        let Some(rest) = request.url.strip_prefix(FIXTURE_SCHEME) else {
            return HttpResponse::with_status(400, "fixture transport only serves fixture:// urls");
        };
        let (service, endpoint) = rest.split_once('/').unwrap_or((rest, ""));
        let Ok(service) = service.parse::<ServiceId>() else {
            return HttpResponse::with_status(404, format!("unknown fixture service '{service}'"));
        };

        let subject = ["address", "region", "area"]
            .iter()
            .find_map(|name| request.query.get(*name))
            .map(String::as_str)
            .unwrap_or_default();
        let seed = subject_seed(subject);

        let body = match (service, endpoint) {
            (ServiceId::Listings, "properties") => listing(subject, seed),
            (ServiceId::Listings, "market/stats") => market_stats(subject, seed),
            (ServiceId::Listings, "listings/search") => listings_search(seed),
            (ServiceId::PublicRecords, "parcels") => parcel(subject, seed),
            (ServiceId::PublicRecords, "sales/nearby") => nearby_sales(seed),
            (ServiceId::PublicRecords, "parcels/history") => parcel_history(seed),
            (ServiceId::Valuation, "avm") => avm(seed),
            (ServiceId::Valuation, "forecast") => forecast(subject, seed),
            (ServiceId::Valuation, "comparables") => valuation_comps(seed),
            (ServiceId::Demographics, "demographics") => demographics(seed),
            (ServiceId::Demographics, "scores") => scores(seed),
            _ => {
                return HttpResponse::with_status(
                    404,
                    format!("no fixture for {service} endpoint '/{endpoint}'"),
                )
            }
        };

        HttpResponse::ok_json(body.to_string())
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let response = self.respond(&request);
        Box::pin(async move { Ok(response) })
    }
}

fn subject_seed(subject: &str) -> u64 {
    address_key(subject).bytes().fold(13_u64, |acc, byte| {
        acc.wrapping_mul(29).wrapping_add(u64::from(byte))
    })
}

fn base_price(seed: u64) -> f64 {
    (350_000 + (seed % 650) * 1_000) as f64
}

fn listing(address: &str, seed: u64) -> Value {
    json!({
        "listing": {
            "listingId": format!("MLS-{:06}", seed % 1_000_000),
            "address": address,
            "listPrice": base_price(seed),
            "beds": 2 + seed % 4,
            "baths": 1.0 + (seed % 4) as f64 * 0.5,
            "livingAreaSqft": 1_100 + seed % 1_900,
            "lotSizeSqft": 3_000 + seed % 5_000,
            "yearBuilt": 1950 + seed % 70,
            "propertyType": PROPERTY_TYPES[(seed % 4) as usize],
            "status": "active",
            "daysOnMarket": seed % 90
        }
    })
}

fn parcel(address: &str, seed: u64) -> Value {
    let assessed = (base_price(seed) * 0.92).round();
    json!({
        "parcel": {
            "apn": format!("{:03}-{:03}-{:03}", seed % 1_000, (seed / 7) % 1_000, (seed / 13) % 1_000),
            "situsAddress": address.to_uppercase(),
            "assessedTotal": assessed,
            "taxAmount": (assessed * 0.0125).round(),
            "lastSale": {
                "date": format!("20{:02}-{:02}-15", 10 + seed % 12, 1 + seed % 9),
                "amount": (base_price(seed) * 0.8).round()
            },
            "bedrooms": 2 + seed % 4,
            "bathrooms": 1.0 + (seed % 4) as f64 * 0.5,
            "buildingSqft": 1_080 + seed % 1_900,
            "lotSqft": 3_000 + seed % 5_000,
            "yearBuilt": 1950 + seed % 70,
            "landUse": PROPERTY_TYPES[(seed % 4) as usize]
        }
    })
}

fn avm(seed: u64) -> Value {
    let estimate = (base_price(seed) * 1.02).round();
    json!({
        "valuation": {
            "estimate": estimate,
            "range": { "low": (estimate * 0.94).round(), "high": (estimate * 1.06).round() },
            "rent_estimate": (estimate * 0.0055).round(),
            "confidence_score": 0.70 + (seed % 25) as f64 / 100.0
        }
    })
}

/// Nearby addresses shared by every comparables fixture, so that services
/// overlap and the aggregator's dedupe is exercised.
fn nearby(seed: u64, index: u64) -> (String, f64) {
    let number = 100 + (seed + index * 17) % 900;
    let street = STREETS[((seed + index) % STREETS.len() as u64) as usize];
    let distance = 0.2 + index as f64 * 0.35;
    (format!("{number} {street}"), distance)
}

fn listings_search(seed: u64) -> Value {
    let results: Vec<Value> = (0..4)
        .map(|index| {
            let (address, distance) = nearby(seed, index);
            json!({
                "address": address,
                "price": base_price(seed + index * 31),
                "soldDate": format!("2024-{:02}-01", 1 + (seed + index) % 12),
                "distanceMiles": distance,
                "beds": 2 + (seed + index) % 4,
                "baths": 2.0,
                "sqft": 1_200 + (seed + index * 97) % 1_500
            })
        })
        .collect();
    json!({ "results": results })
}

fn nearby_sales(seed: u64) -> Value {
    let sales: Vec<Value> = (1..5)
        .map(|index| {
            let (address, distance) = nearby(seed, index);
            json!({
                "address": address.to_uppercase(),
                "price": base_price(seed + index * 31) * 0.97,
                "recordedDate": format!("2023-{:02}-20", 1 + (seed + index) % 12),
                "distance": distance,
                "bedrooms": 2 + (seed + index) % 4,
                "bathrooms": 2.0,
                "buildingSqft": 1_180 + (seed + index * 97) % 1_500
            })
        })
        .collect();
    json!({ "sales": sales })
}

fn valuation_comps(seed: u64) -> Value {
    let comps: Vec<Value> = (2..6)
        .map(|index| {
            let (address, distance) = nearby(seed, index);
            json!({
                "address": address,
                "sale_price": base_price(seed + index * 31) * 1.01,
                "sale_date": format!("2024-{:02}-10", 1 + (seed + index) % 12),
                "distance_mi": distance,
                "beds": 2 + (seed + index) % 4,
                "baths": 2.5,
                "sqft": 1_250 + (seed + index * 97) % 1_500
            })
        })
        .collect();
    json!({ "comps": comps })
}

fn parcel_history(seed: u64) -> Value {
    let last = base_price(seed) * 0.8;
    json!({
        "transactions": [
            {
                "recordedDate": format!("20{:02}-{:02}-15", 10 + seed % 12, 1 + seed % 9),
                "price": last.round(),
                "documentType": "GRANT_DEED"
            },
            {
                "recordedDate": format!("199{}-06-30", seed % 10),
                "price": (last * 0.45).round(),
                "documentType": "GRANT_DEED"
            }
        ],
        "permits": [
            {
                "issuedDate": format!("2022-{:02}-03", 1 + seed % 12),
                "description": "Kitchen remodel",
                "valuation": (25_000 + (seed % 40) * 1_000) as f64
            }
        ]
    })
}

fn market_stats(region: &str, seed: u64) -> Value {
    json!({
        "region": region,
        "medianListPrice": base_price(seed),
        "medianSalePrice": (base_price(seed) * 0.98).round(),
        "activeListings": 40 + seed % 260,
        "avgDaysOnMarket": 18.0 + (seed % 40) as f64,
        "priceChangeYoy": -3.0 + (seed % 110) as f64 / 10.0
    })
}

fn forecast(region: &str, seed: u64) -> Value {
    json!({
        "region": region,
        "forecast_change_pct": -1.5 + (seed % 70) as f64 / 10.0,
        "horizon_months": 12
    })
}

fn demographics(seed: u64) -> Value {
    json!({
        "population": 8_000 + seed % 60_000,
        "median_household_income": (55_000 + (seed % 120) * 1_000) as f64,
        "median_age": 29.0 + (seed % 200) as f64 / 10.0,
        "owner_occupied_pct": 35.0 + (seed % 500) as f64 / 10.0
    })
}

fn scores(seed: u64) -> Value {
    json!({
        "walkscore": 30 + seed % 70,
        "transit_score": 20 + seed % 80
    })
}
