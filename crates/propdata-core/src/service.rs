use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data providers. Each id owns its own rate-limit, circuit and cache namespace.
///
/// Variants are declared in merge precedence order, so the derived `Ord`
/// doubles as the precedence ranking used by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceId {
    Listings,
    PublicRecords,
    Valuation,
    Demographics,
}

impl ServiceId {
    pub const ALL: [Self; 4] = [
        Self::Listings,
        Self::PublicRecords,
        Self::Valuation,
        Self::Demographics,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listings => "listings",
            Self::PublicRecords => "publicRecords",
            Self::Valuation => "valuation",
            Self::Demographics => "demographics",
        }
    }

    /// Rank used by the precedence merge; lower wins.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Listings => 0,
            Self::PublicRecords => 1,
            Self::Valuation => 2,
            Self::Demographics => 3,
        }
    }

    /// Base points a real answer from this service adds to the quality score.
    pub const fn quality_points(self) -> u8 {
        match self {
            Self::Listings => 40,
            Self::PublicRecords => 30,
            Self::Valuation => 20,
            Self::Demographics => 10,
        }
    }

    /// Trust weight in `0.0..=1.0` attached to comparables from this service.
    pub fn confidence_weight(self) -> f64 {
        f64::from(self.quality_points()) / f64::from(Self::Listings.quality_points())
    }

    /// Prefix for `PROPDATA_<PREFIX>_API_KEY` style environment variables.
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Listings => "LISTINGS",
            Self::PublicRecords => "PUBLIC_RECORDS",
            Self::Valuation => "VALUATION",
            Self::Demographics => "DEMOGRAPHICS",
        }
    }
}

impl Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "listings" | "mls" => Ok(Self::Listings),
            "publicrecords" | "public_records" | "public-records" => Ok(Self::PublicRecords),
            "valuation" => Ok(Self::Valuation),
            "demographics" => Ok(Self::Demographics),
            other => Err(ValidationError::InvalidService {
                value: other.to_owned(),
            }),
        }
    }
}
