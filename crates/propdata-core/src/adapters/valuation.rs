use serde::Deserialize;

use crate::adapters::{decode, AdapterFuture, CapabilitySet, ProviderAdapter};
use crate::cache::CacheTtl;
use crate::client::{RequestDescriptor, ServiceClient};
use crate::{
    Address, Comparable, Field, ProviderRecord, Region, ServiceError, ServiceErrorKind, ServiceId,
};

/// Automated valuation model (AVM) adapter.
#[derive(Clone)]
pub struct ValuationAdapter {
    client: ServiceClient,
    offline: bool,
}

impl ValuationAdapter {
    pub fn new(client: ServiceClient) -> Self {
        Self {
            client,
            offline: false,
        }
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }
}

impl ProviderAdapter for ValuationAdapter {
    fn service(&self) -> ServiceId {
        ServiceId::Valuation
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true, false)
    }

    fn is_available(&self) -> bool {
        self.offline || self.client.has_credential()
    }

    fn fetch_property<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/avm")
                .with_param("address", address)
                .with_cache_ttl(CacheTtl::PROPERTY_DETAILS);
            let payload: AvmEnvelope =
                decode(self.service(), self.client.request(&descriptor).await?)?;

            let valuation = payload.valuation.ok_or_else(|| {
                ServiceError::new(
                    ServiceErrorKind::NotFound,
                    ServiceId::Valuation,
                    format!("no valuation available for '{address}'"),
                )
            })?;
            Ok(normalize_valuation(valuation))
        })
    }

    fn fetch_neighborhood<'a>(&'a self, region: &'a Region) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/forecast")
                .with_param("region", region)
                .with_cache_ttl(CacheTtl::MARKET_STATISTICS);
            let payload: ForecastPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(normalize_forecast(payload))
        })
    }

    fn fetch_comparables<'a>(
        &'a self,
        address: &'a Address,
        radius_miles: f64,
    ) -> AdapterFuture<'a, Vec<Comparable>> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/comparables")
                .with_param("address", address)
                .with_param("radius", radius_miles)
                .with_cache_ttl(CacheTtl::PROPERTY_DETAILS);
            let payload: CompsPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(payload.comps.into_iter().map(normalize_comp).collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct AvmEnvelope {
    valuation: Option<AvmPayload>,
}

#[derive(Debug, Deserialize)]
struct AvmPayload {
    estimate: f64,
    range: Option<AvmRangePayload>,
    rent_estimate: Option<f64>,
    confidence_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AvmRangePayload {
    low: f64,
    high: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    region: String,
    forecast_change_pct: Option<f64>,
    horizon_months: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompsPayload {
    #[serde(default)]
    comps: Vec<CompPayload>,
}

#[derive(Debug, Deserialize)]
struct CompPayload {
    address: String,
    sale_price: f64,
    sale_date: Option<String>,
    distance_mi: f64,
    beds: Option<u32>,
    baths: Option<f64>,
    sqft: Option<u32>,
}

fn normalize_valuation(payload: AvmPayload) -> ProviderRecord {
    let (low, high) = payload
        .range
        .map(|range| (Some(range.low), Some(range.high)))
        .unwrap_or((None, None));

    ProviderRecord::new(ServiceId::Valuation)
        .with(Field::EstimatedValue, payload.estimate)
        .with_opt(Field::ValueRangeLow, low)
        .with_opt(Field::ValueRangeHigh, high)
        .with_opt(Field::RentEstimate, payload.rent_estimate)
        .with_opt(Field::ValuationConfidence, payload.confidence_score)
}

fn normalize_forecast(payload: ForecastPayload) -> ProviderRecord {
    ProviderRecord::new(ServiceId::Valuation)
        .with(Field::Region, payload.region)
        .with_opt(Field::ForecastChangePercent, payload.forecast_change_pct)
        .with_opt(Field::ForecastHorizonMonths, payload.horizon_months)
}

fn normalize_comp(payload: CompPayload) -> Comparable {
    Comparable {
        address: payload.address,
        price: payload.sale_price,
        sale_date: payload.sale_date,
        distance_miles: payload.distance_mi,
        bedrooms: payload.beds,
        bathrooms: payload.baths,
        square_feet: payload.sqft,
        source: ServiceId::Valuation,
        confidence: ServiceId::Valuation.confidence_weight(),
    }
}
