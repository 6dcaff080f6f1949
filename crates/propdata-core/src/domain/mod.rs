//! # Domain Models
//!
//! Canonical property and neighborhood types shared by adapters, the merge
//! step and callers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Address`] | Validated, whitespace-normalized street address |
//! | [`Region`] | Validated neighborhood / city / ZIP |
//! | [`Field`] | Closed set of attributes a provider may report |
//! | [`FieldValue`] | Integer, number, text or flag |
//! | [`ProviderRecord`] | One adapter's normalized answer |
//! | [`AggregatedRecord`] | Precedence-merged result with quality score |
//! | [`Comparable`] | Nearby sale or listing |
//! | [`PropertyHistory`] | Recorded sales and permits |
//! | [`UtcDateTime`] | UTC timestamp |

mod address;
mod record;
mod timestamp;

pub use address::{address_key, validate_radius, Address, Region};
pub use record::{
    AggregatedRecord, Comparable, ConfidenceLabel, DataQuality, Field, FieldValue, MergedValue,
    PermitEvent, PropertyHistory, ProviderFailure, ProviderRecord, RecordKind, SaleEvent,
};
pub use timestamp::UtcDateTime;
