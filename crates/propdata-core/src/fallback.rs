//! Static substitute records used when a provider cannot answer.
//!
//! Every record is marked `is_fallback` and carries a message, so callers can
//! always tell substituted values from real ones. Fallback sources never
//! count towards the quality score.

use crate::adapters::Operation;
use crate::{Address, Field, ProviderRecord, Region, ServiceId};

const MARKET_STATS_MESSAGE: &str =
    "Market statistics unavailable; showing placeholder values. Contact a local agent for current figures.";
const DEMOGRAPHICS_MESSAGE: &str =
    "Demographic data unavailable; showing placeholder values.";
const FORECAST_MESSAGE: &str = "Price forecast unavailable; assuming a flat market.";

/// Substitute for a failed neighborhood query, if the catalog has one.
pub fn neighborhood_fallback(service: ServiceId, region: &Region) -> Option<ProviderRecord> {
    let record = match service {
        ServiceId::Listings => ProviderRecord::fallback(service, MARKET_STATS_MESSAGE)
            .with(Field::Region, region.as_str())
            .with(Field::MedianListPrice, 0.0)
            .with(Field::MedianSalePrice, 0.0)
            .with(Field::ActiveListings, 0_i64)
            .with(Field::AverageDaysOnMarket, 30.0)
            .with(Field::PriceChangeYoyPercent, 0.0),
        ServiceId::Demographics => ProviderRecord::fallback(service, DEMOGRAPHICS_MESSAGE)
            .with(Field::Region, region.as_str())
            .with(Field::Population, 0_i64)
            .with(Field::MedianHouseholdIncome, 0.0)
            .with(Field::MedianAge, 0.0)
            .with(Field::OwnerOccupiedPercent, 0.0)
            .with(Field::WalkScore, 50_i64)
            .with(Field::TransitScore, 50_i64),
        ServiceId::Valuation => ProviderRecord::fallback(service, FORECAST_MESSAGE)
            .with(Field::Region, region.as_str())
            .with(Field::ForecastChangePercent, 0.0)
            .with(Field::ForecastHorizonMonths, 12_i64),
        ServiceId::PublicRecords => return None,
    };
    Some(record)
}

/// Address-only substitute for a failed property query.
pub fn property_fallback(service: ServiceId, address: &Address) -> ProviderRecord {
    ProviderRecord::fallback(
        service,
        format!("{service} data unavailable for this property; only the address is known."),
    )
    .with(Field::Address, address.as_str())
}

/// Fallback lookup keyed by operation.
pub(crate) fn fallback_for(
    operation: Operation,
    service: ServiceId,
    subject: &Subject<'_>,
) -> Option<ProviderRecord> {
    match (operation, subject) {
        (Operation::Property, Subject::Address(address)) => {
            Some(property_fallback(service, address))
        }
        (Operation::Neighborhood, Subject::Region(region)) => {
            neighborhood_fallback(service, region)
        }
        _ => None,
    }
}

/// Query subject passed through the aggregator.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Subject<'a> {
    Address(&'a Address),
    Region(&'a Region),
}

impl Subject<'_> {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Address(address) => address.as_str(),
            Self::Region(region) => region.as_str(),
        }
    }
}
