//! Precedence merge, quality scoring and comparables consolidation.
//!
//! Everything here is a pure function of its inputs; arrival order of
//! provider answers never changes the output.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    address_key, Comparable, ConfidenceLabel, DataQuality, Field, FieldValue, MergedValue,
    ProviderRecord, ServiceId,
};

const HIGH_CONFIDENCE_MIN: u8 = 85;
const MEDIUM_CONFIDENCE_MIN: u8 = 50;
const EXTRA_SOURCE_BONUS: u32 = 10;
const MAX_SCORE: u32 = 100;

/// Result of merging provider records field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub fields: BTreeMap<Field, MergedValue>,
    pub by_source: BTreeMap<ServiceId, BTreeMap<Field, FieldValue>>,
    pub sources: BTreeSet<ServiceId>,
    pub fallback_sources: BTreeSet<ServiceId>,
    pub fallback_messages: Vec<String>,
}

/// Merges `records` by fixed service precedence.
///
/// Real records always outrank fallback records; within each group
/// listings > publicRecords > valuation > demographics.
pub fn merge_records(records: &[ProviderRecord]) -> MergeOutcome {
    let mut ordered: Vec<&ProviderRecord> = records.iter().collect();
    ordered.sort_by_key(|record| (record.is_fallback, record.service.precedence()));

    let mut outcome = MergeOutcome::default();
    for record in ordered {
        if record.is_fallback {
            outcome.fallback_sources.insert(record.service);
            if let Some(message) = &record.fallback_message {
                outcome.fallback_messages.push(message.clone());
            }
        } else {
            outcome.sources.insert(record.service);
        }

        outcome
            .by_source
            .insert(record.service, record.fields.clone());

        for (field, value) in &record.fields {
            outcome
                .fields
                .entry(*field)
                .and_modify(|merged| merged.reported_by.push(record.service))
                .or_insert_with(|| MergedValue {
                    value: value.clone(),
                    source: record.service,
                    reported_by: vec![record.service],
                });
        }
    }

    outcome
}

/// Scores which real services contributed.
pub fn score_quality(sources: &BTreeSet<ServiceId>) -> DataQuality {
    let base: u32 = sources
        .iter()
        .map(|service| u32::from(service.quality_points()))
        .sum();
    let extra = (sources.len() as u32).saturating_sub(1) * EXTRA_SOURCE_BONUS;
    let score = (base + extra).min(MAX_SCORE) as u8;

    DataQuality {
        score,
        source_count: sources.len(),
        confidence_label: confidence_label(score),
    }
}

pub fn confidence_label(score: u8) -> ConfidenceLabel {
    if score >= HIGH_CONFIDENCE_MIN {
        ConfidenceLabel::High
    } else if score >= MEDIUM_CONFIDENCE_MIN {
        ConfidenceLabel::Medium
    } else {
        ConfidenceLabel::Low
    }
}

/// Filters, dedupes and orders comparables from every source.
///
/// Entries outside `radius_miles` or at the subject's own address are
/// dropped. Duplicates (same normalized address) keep the most trusted
/// source. The result is sorted by confidence, then distance, then address.
pub fn consolidate_comparables(
    subject_key: &str,
    comparables: Vec<Comparable>,
    radius_miles: f64,
) -> Vec<Comparable> {
    let mut best: HashMap<String, Comparable> = HashMap::new();

    for comparable in comparables {
        let within_radius =
            comparable.distance_miles.is_finite() && comparable.distance_miles <= radius_miles;
        if !within_radius {
            continue;
        }

        let key = address_key(&comparable.address);
        if key == subject_key {
            continue;
        }

        match best.get(&key) {
            Some(existing) if trust_order(existing, &comparable) != Ordering::Greater => {}
            _ => {
                best.insert(key, comparable);
            }
        }
    }

    let mut consolidated: Vec<Comparable> = best.into_values().collect();
    consolidated.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.distance_miles.total_cmp(&b.distance_miles))
            .then_with(|| a.address.cmp(&b.address))
    });
    consolidated
}

/// `Greater` when `candidate` should replace `existing`.
fn trust_order(existing: &Comparable, candidate: &Comparable) -> Ordering {
    candidate
        .confidence
        .total_cmp(&existing.confidence)
        .then_with(|| {
            existing
                .source
                .precedence()
                .cmp(&candidate.source.precedence())
        })
        .then_with(|| existing.distance_miles.total_cmp(&candidate.distance_miles))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service: ServiceId, fields: &[(Field, f64)]) -> ProviderRecord {
        fields
            .iter()
            .fold(ProviderRecord::new(service), |record, (field, value)| {
                record.with(*field, *value)
            })
    }

    fn comparable(address: &str, source: ServiceId, distance: f64) -> Comparable {
        Comparable {
            address: address.to_owned(),
            price: 500_000.0,
            sale_date: None,
            distance_miles: distance,
            bedrooms: None,
            bathrooms: None,
            square_feet: None,
            source,
            confidence: source.confidence_weight(),
        }
    }

    #[test]
    fn higher_precedence_wins_and_reported_by_lists_all() {
        let records = vec![
            record(ServiceId::Valuation, &[(Field::YearBuilt, 1961.0)]),
            record(ServiceId::PublicRecords, &[(Field::YearBuilt, 1962.0)]),
            record(ServiceId::Listings, &[(Field::YearBuilt, 1960.0)]),
        ];

        let outcome = merge_records(&records);
        let merged = &outcome.fields[&Field::YearBuilt];
        assert_eq!(merged.value, FieldValue::Number(1960.0));
        assert_eq!(merged.source, ServiceId::Listings);
        assert_eq!(
            merged.reported_by,
            vec![
                ServiceId::Listings,
                ServiceId::PublicRecords,
                ServiceId::Valuation
            ]
        );
        assert_eq!(
            outcome.by_source[&ServiceId::Valuation][&Field::YearBuilt],
            FieldValue::Number(1961.0)
        );
    }

    #[test]
    fn real_values_outrank_fallback_values() {
        let records = vec![
            ProviderRecord::fallback(ServiceId::Listings, "placeholder")
                .with(Field::AverageDaysOnMarket, 30.0),
            record(ServiceId::Valuation, &[(Field::AverageDaysOnMarket, 21.0)]),
        ];

        let outcome = merge_records(&records);
        assert_eq!(
            outcome.fields[&Field::AverageDaysOnMarket].source,
            ServiceId::Valuation
        );
        assert_eq!(outcome.sources, BTreeSet::from([ServiceId::Valuation]));
        assert_eq!(outcome.fallback_sources, BTreeSet::from([ServiceId::Listings]));
        assert_eq!(outcome.fallback_messages, vec![String::from("placeholder")]);
    }

    #[test]
    fn quality_scores_follow_weights_and_cap() {
        let all_three = BTreeSet::from([
            ServiceId::Listings,
            ServiceId::PublicRecords,
            ServiceId::Valuation,
        ]);
        let two = BTreeSet::from([ServiceId::Listings, ServiceId::PublicRecords]);

        let high = score_quality(&all_three);
        assert_eq!(high.score, 100);
        assert_eq!(high.confidence_label, ConfidenceLabel::High);

        let medium = score_quality(&two);
        assert_eq!(medium.score, 80);
        assert_eq!(medium.confidence_label, ConfidenceLabel::Medium);

        assert_eq!(score_quality(&BTreeSet::from([ServiceId::Listings])).score, 40);
        let none = score_quality(&BTreeSet::new());
        assert_eq!(none.score, 0);
        assert_eq!(none.confidence_label, ConfidenceLabel::Low);
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(confidence_label(85), ConfidenceLabel::High);
        assert_eq!(confidence_label(84), ConfidenceLabel::Medium);
        assert_eq!(confidence_label(50), ConfidenceLabel::Medium);
        assert_eq!(confidence_label(49), ConfidenceLabel::Low);
    }

    #[test]
    fn comparables_are_deduped_filtered_and_sorted() {
        let subject = address_key("1 Main St");
        let consolidated = consolidate_comparables(
            &subject,
            vec![
                comparable("5 Oak Avenue", ServiceId::Valuation, 0.4),
                comparable("5 OAK AVE", ServiceId::Listings, 0.4),
                comparable("9 Pine Dr", ServiceId::PublicRecords, 0.2),
                comparable("7 Elm St", ServiceId::Listings, 0.9),
                comparable("1 Main Street", ServiceId::Listings, 0.0),
                comparable("40 Far Rd", ServiceId::Listings, 3.0),
            ],
            1.0,
        );

        let addresses: Vec<&str> = consolidated.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["5 OAK AVE", "7 Elm St", "9 Pine Dr"]);
        assert_eq!(consolidated[0].source, ServiceId::Listings);
    }
}
