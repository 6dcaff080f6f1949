use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::adapters::Operation;
use crate::{ServiceError, ServiceId, UtcDateTime};

/// Closed set of property and area attributes a provider may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    // property
    Address,
    Price,
    Bedrooms,
    Bathrooms,
    SquareFeet,
    LotSizeSqft,
    YearBuilt,
    PropertyType,
    ListingStatus,
    DaysOnMarket,
    ListingId,
    ParcelId,
    AssessedValue,
    AnnualTax,
    LastSalePrice,
    LastSaleDate,
    EstimatedValue,
    ValueRangeLow,
    ValueRangeHigh,
    RentEstimate,
    ValuationConfidence,
    // neighborhood
    Region,
    MedianListPrice,
    MedianSalePrice,
    ActiveListings,
    AverageDaysOnMarket,
    PriceChangeYoyPercent,
    ForecastChangePercent,
    ForecastHorizonMonths,
    Population,
    MedianHouseholdIncome,
    MedianAge,
    OwnerOccupiedPercent,
    WalkScore,
    TransitScore,
}

impl Field {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Price => "price",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
            Self::SquareFeet => "squareFeet",
            Self::LotSizeSqft => "lotSizeSqft",
            Self::YearBuilt => "yearBuilt",
            Self::PropertyType => "propertyType",
            Self::ListingStatus => "listingStatus",
            Self::DaysOnMarket => "daysOnMarket",
            Self::ListingId => "listingId",
            Self::ParcelId => "parcelId",
            Self::AssessedValue => "assessedValue",
            Self::AnnualTax => "annualTax",
            Self::LastSalePrice => "lastSalePrice",
            Self::LastSaleDate => "lastSaleDate",
            Self::EstimatedValue => "estimatedValue",
            Self::ValueRangeLow => "valueRangeLow",
            Self::ValueRangeHigh => "valueRangeHigh",
            Self::RentEstimate => "rentEstimate",
            Self::ValuationConfidence => "valuationConfidence",
            Self::Region => "region",
            Self::MedianListPrice => "medianListPrice",
            Self::MedianSalePrice => "medianSalePrice",
            Self::ActiveListings => "activeListings",
            Self::AverageDaysOnMarket => "averageDaysOnMarket",
            Self::PriceChangeYoyPercent => "priceChangeYoyPercent",
            Self::ForecastChangePercent => "forecastChangePercent",
            Self::ForecastHorizonMonths => "forecastHorizonMonths",
            Self::Population => "population",
            Self::MedianHouseholdIncome => "medianHouseholdIncome",
            Self::MedianAge => "medianAge",
            Self::OwnerOccupiedPercent => "ownerOccupiedPercent",
            Self::WalkScore => "walkScore",
            Self::TransitScore => "transitScore",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar reported for a [`Field`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Flag(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Normalized result of one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    pub service: ServiceId,
    pub fields: BTreeMap<Field, FieldValue>,
    pub is_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
}

impl ProviderRecord {
    pub fn new(service: ServiceId) -> Self {
        Self {
            service,
            fields: BTreeMap::new(),
            is_fallback: false,
            fallback_message: None,
        }
    }

    /// Static substitute record, clearly marked as such.
    pub fn fallback(service: ServiceId, message: impl Into<String>) -> Self {
        Self {
            is_fallback: true,
            fallback_message: Some(message.into()),
            ..Self::new(service)
        }
    }

    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Sets `field` only when the provider actually reported it.
    pub fn with_opt<V: Into<FieldValue>>(mut self, field: Field, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.fields.insert(field, value.into());
        }
        self
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }
}

/// Winning value of a field after the precedence merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedValue {
    pub value: FieldValue,
    pub source: ServiceId,
    /// Every service that reported the field, in precedence order.
    pub reported_by: Vec<ServiceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl Display for ConfidenceLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub score: u8,
    pub source_count: usize,
    pub confidence_label: ConfidenceLabel,
}

/// One provider that did not contribute real data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub service: ServiceId,
    /// Set when the failure came from an enrichment step rather than the
    /// main query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&ServiceError> for ProviderFailure {
    fn from(error: &ServiceError) -> Self {
        Self {
            service: error.service(),
            operation: None,
            code: error.code().to_owned(),
            message: error.message().to_owned(),
            retryable: error.retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Property,
    Neighborhood,
}

/// Recently sold or listed property near the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparable {
    pub address: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_date: Option<String>,
    pub distance_miles: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_feet: Option<u32>,
    pub source: ServiceId,
    /// Trust weight of `source`, in `0.0..=1.0`.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEvent {
    pub date: String,
    pub price: f64,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitEvent {
    pub date: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Recorded transactions and permits for one parcel, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyHistory {
    pub sales: Vec<SaleEvent>,
    pub permits: Vec<PermitEvent>,
}

/// Merged view over every provider that answered a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub request_id: String,
    pub subject: String,
    pub kind: RecordKind,
    pub fields: BTreeMap<Field, MergedValue>,
    pub by_source: BTreeMap<ServiceId, BTreeMap<Field, FieldValue>>,
    pub sources: BTreeSet<ServiceId>,
    pub fallback_sources: BTreeSet<ServiceId>,
    pub data_quality: DataQuality,
    pub errors: Vec<ProviderFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comparables: Vec<Comparable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<PropertyHistory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_messages: Vec<String>,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
}

impl AggregatedRecord {
    /// Merged value of `field`, if any provider reported it.
    pub fn value(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field).map(|merged| &merged.value)
    }

    /// Value of `field` exactly as `service` reported it.
    pub fn source_value(&self, service: ServiceId, field: Field) -> Option<&FieldValue> {
        self.by_source
            .get(&service)
            .and_then(|fields| fields.get(&field))
    }

    /// True when at least one provider failed.
    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn failure_for(&self, service: ServiceId) -> Option<&ProviderFailure> {
        self.errors.iter().find(|failure| failure.service == service)
    }
}
