use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_ADDRESS_LEN: usize = 200;
const MAX_REGION_LEN: usize = 100;

/// Street-suffix abbreviations applied when building dedupe keys.
const SUFFIXES: [(&str, &str); 12] = [
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("boulevard", "blvd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("terrace", "ter"),
    ("highway", "hwy"),
    ("parkway", "pkwy"),
    ("circle", "cir"),
];

/// Whitespace-normalized street address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = normalize(
            input,
            MAX_ADDRESS_LEN,
            ValidationError::EmptyAddress,
            |len, max| ValidationError::AddressTooLong { len, max },
            |index| ValidationError::AddressControlChar { index },
        )?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case- and punctuation-insensitive key used to detect the same
    /// property reported by several services.
    pub fn normalized_key(&self) -> String {
        address_key(&self.0)
    }
}

/// Dedupe key for a raw address string as reported by a provider.
pub fn address_key(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }

    cleaned
        .split_whitespace()
        .map(|word| {
            SUFFIXES
                .iter()
                .find(|(long, _)| *long == word)
                .map_or(word, |(_, short)| *short)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Address {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Neighborhood, city or ZIP code used for area-level queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = normalize(
            input,
            MAX_REGION_LEN,
            ValidationError::EmptyRegion,
            |len, max| ValidationError::RegionTooLong { len, max },
            |index| ValidationError::RegionControlChar { index },
        )?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Region {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Region {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Region> for String {
    fn from(value: Region) -> Self {
        value.0
    }
}

/// Checks a comparables search radius in miles.
pub fn validate_radius(miles: f64) -> Result<f64, ValidationError> {
    if miles.is_finite() && miles > 0.0 {
        Ok(miles)
    } else {
        Err(ValidationError::InvalidRadius { value: miles })
    }
}

fn normalize(
    input: &str,
    max: usize,
    empty: ValidationError,
    too_long: impl FnOnce(usize, usize) -> ValidationError,
    control: impl FnOnce(usize) -> ValidationError,
) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(empty);
    }

    // Tabs and newlines are folded like spaces; anything else non-printable is rejected.
    if let Some((index, _)) = trimmed
        .chars()
        .enumerate()
        .find(|(_, ch)| ch.is_control() && !ch.is_whitespace())
    {
        return Err(control(index));
    }

    let normalized = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = normalized.chars().count();
    if len > max {
        return Err(too_long(len, max));
    }

    Ok(normalized)
}
