//! Provider adapters.
//!
//! Each adapter owns a [`ServiceClient`](crate::ServiceClient) and translates
//! its provider-native JSON into [`ProviderRecord`], [`Comparable`] or
//! [`PropertyHistory`] values.
//!
//! | Adapter | Property | Neighborhood | Comparables | History |
//! |---------|----------|--------------|-------------|---------|
//! | [`ListingsAdapter`] | yes | market stats | active/sold listings | - |
//! | [`PublicRecordsAdapter`] | yes | - | recorded sales | yes |
//! | [`ValuationAdapter`] | yes | forecast | yes | - |
//! | [`DemographicsAdapter`] | - | demographics, scores | - | - |

mod demographics;
mod listings;
mod public_records;
mod valuation;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Address, Comparable, PropertyHistory, ProviderRecord, Region, ServiceError, ServiceId,
};

pub use demographics::DemographicsAdapter;
pub use listings::ListingsAdapter;
pub use public_records::PublicRecordsAdapter;
pub use valuation::ValuationAdapter;

/// Aggregator operation, used for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Property,
    Neighborhood,
    Comparables,
    History,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Neighborhood => "neighborhood",
            Self::Comparables => "comparables",
            Self::History => "history",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported operation matrix for an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub property: bool,
    pub neighborhood: bool,
    pub comparables: bool,
    pub history: bool,
}

impl CapabilitySet {
    pub const fn new(property: bool, neighborhood: bool, comparables: bool, history: bool) -> Self {
        Self {
            property,
            neighborhood,
            comparables,
            history,
        }
    }

    pub const fn supports(self, operation: Operation) -> bool {
        match operation {
            Operation::Property => self.property,
            Operation::Neighborhood => self.neighborhood,
            Operation::Comparables => self.comparables,
            Operation::History => self.history,
        }
    }

    pub fn supported_operations(self) -> Vec<&'static str> {
        [
            Operation::Property,
            Operation::Neighborhood,
            Operation::Comparables,
            Operation::History,
        ]
        .into_iter()
        .filter(|operation| self.supports(*operation))
        .map(Operation::as_str)
        .collect()
    }
}

pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Provider adapter contract.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`service`](ProviderAdapter::service) | Service namespace |
/// | [`capabilities`](ProviderAdapter::capabilities) | Supported operations |
/// | [`is_available`](ProviderAdapter::is_available) | Credential present or offline mode |
/// | [`fetch_property`](ProviderAdapter::fetch_property) | Property attributes |
/// | [`fetch_neighborhood`](ProviderAdapter::fetch_neighborhood) | Area attributes |
/// | [`fetch_comparables`](ProviderAdapter::fetch_comparables) | Nearby sales/listings |
/// | [`fetch_history`](ProviderAdapter::fetch_history) | Sales and permits |
///
/// Operations an adapter does not support resolve to
/// [`ServiceErrorKind::Unsupported`](crate::ServiceErrorKind::Unsupported).
pub trait ProviderAdapter: Send + Sync {
    fn service(&self) -> ServiceId;

    fn capabilities(&self) -> CapabilitySet;

    fn is_available(&self) -> bool;

    fn fetch_property<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, ProviderRecord> {
        let _ = address;
        unsupported(self.service(), Operation::Property)
    }

    fn fetch_neighborhood<'a>(&'a self, region: &'a Region) -> AdapterFuture<'a, ProviderRecord> {
        let _ = region;
        unsupported(self.service(), Operation::Neighborhood)
    }

    fn fetch_comparables<'a>(
        &'a self,
        address: &'a Address,
        radius_miles: f64,
    ) -> AdapterFuture<'a, Vec<Comparable>> {
        let _ = (address, radius_miles);
        unsupported(self.service(), Operation::Comparables)
    }

    fn fetch_history<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, PropertyHistory> {
        let _ = address;
        unsupported(self.service(), Operation::History)
    }
}

fn unsupported<'a, T: Send + 'a>(service: ServiceId, operation: Operation) -> AdapterFuture<'a, T> {
    Box::pin(async move { Err(ServiceError::unsupported(service, operation.as_str())) })
}

/// Decodes a provider payload, classifying shape mismatches as parsing errors.
pub(crate) fn decode<T: DeserializeOwned>(
    service: ServiceId,
    value: Value,
) -> Result<T, ServiceError> {
    serde_json::from_value(value).map_err(|error| {
        ServiceError::parsing(service, format!("unexpected {service} payload: {error}"))
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_lists_supported_operations() {
        let capabilities = CapabilitySet::new(true, false, true, false);
        assert!(capabilities.supports(Operation::Comparables));
        assert!(!capabilities.supports(Operation::History));
        assert_eq!(
            capabilities.supported_operations(),
            vec!["property", "comparables"]
        );
    }
}
