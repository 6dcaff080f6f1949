use std::sync::Arc;

use propdata_core::fixtures::fixture_base_url;
use propdata_core::{
    Address, DemographicsAdapter, FixtureHttpClient, HttpAuth, ListingsAdapter, Operation,
    ProviderAdapter, PublicRecordsAdapter, RateLimiter, Region, ResponseCache, ServiceClient,
    ServiceErrorKind, ServiceId, ServiceSettings, ValuationAdapter,
};

#[derive(Clone)]
struct AdapterCase {
    id: ServiceId,
    adapter: Arc<dyn ProviderAdapter>,
    supports: [bool; 4],
}

const OPERATIONS: [Operation; 4] = [
    Operation::Property,
    Operation::Neighborhood,
    Operation::Comparables,
    Operation::History,
];

fn client(service: ServiceId) -> ServiceClient {
    ServiceClient::new(
        service,
        ServiceSettings::new(fixture_base_url(service), HttpAuth::None),
        Arc::new(FixtureHttpClient::new()),
        Arc::new(RateLimiter::new()),
        ResponseCache::new(),
    )
}

fn adapter_cases() -> Vec<AdapterCase> {
    vec![
        AdapterCase {
            id: ServiceId::Listings,
            adapter: Arc::new(ListingsAdapter::new(client(ServiceId::Listings)).with_offline(true)),
            supports: [true, true, true, false],
        },
        AdapterCase {
            id: ServiceId::PublicRecords,
            adapter: Arc::new(
                PublicRecordsAdapter::new(client(ServiceId::PublicRecords)).with_offline(true),
            ),
            supports: [true, false, true, true],
        },
        AdapterCase {
            id: ServiceId::Valuation,
            adapter: Arc::new(
                ValuationAdapter::new(client(ServiceId::Valuation)).with_offline(true),
            ),
            supports: [true, true, true, false],
        },
        AdapterCase {
            id: ServiceId::Demographics,
            adapter: Arc::new(
                DemographicsAdapter::new(client(ServiceId::Demographics)).with_offline(true),
            ),
            supports: [false, true, false, false],
        },
    ]
}

fn address() -> Address {
    Address::parse("1 Main St, Springfield").expect("valid address")
}

fn region() -> Region {
    Region::parse("Noe Valley").expect("valid region")
}

#[test]
fn declared_capabilities_match_the_catalog() {
    for case in adapter_cases() {
        assert_eq!(case.adapter.service(), case.id);
        assert!(case.adapter.is_available(), "provider '{}': offline", case.id);
        for (operation, expected) in OPERATIONS.into_iter().zip(case.supports) {
            assert_eq!(
                case.adapter.capabilities().supports(operation),
                expected,
                "provider '{}': {operation}",
                case.id
            );
        }
    }
}

#[tokio::test]
async fn supported_operations_answer_and_unsupported_ones_refuse() {
    let address = address();
    let region = region();

    for case in adapter_cases() {
        let adapter = case.adapter.as_ref();
        let results = [
            adapter.fetch_property(&address).await.map(|_| ()),
            adapter.fetch_neighborhood(&region).await.map(|_| ()),
            adapter.fetch_comparables(&address, 2.0).await.map(|_| ()),
            adapter.fetch_history(&address).await.map(|_| ()),
        ];

        for ((operation, supported), result) in
            OPERATIONS.into_iter().zip(case.supports).zip(results)
        {
            if supported {
                assert!(
                    result.is_ok(),
                    "provider '{}': {operation} should succeed: {result:?}",
                    case.id
                );
            } else {
                let error = result.expect_err("operation should be unsupported");
                assert_eq!(
                    error.kind(),
                    ServiceErrorKind::Unsupported,
                    "provider '{}': {operation}",
                    case.id
                );
                assert_eq!(error.service(), case.id);
            }
        }
    }
}

#[tokio::test]
async fn records_are_tagged_with_their_service_and_never_fallback() {
    let address = address();
    let region = region();

    for case in adapter_cases() {
        let adapter = case.adapter.as_ref();
        let mut records = Vec::new();
        if case.supports[0] {
            records.push(adapter.fetch_property(&address).await.expect("property"));
        }
        if case.supports[1] {
            records.push(adapter.fetch_neighborhood(&region).await.expect("neighborhood"));
        }

        for record in records {
            assert_eq!(record.service, case.id, "provider '{}': service tag", case.id);
            assert!(!record.is_fallback, "provider '{}': real record", case.id);
            assert!(record.fallback_message.is_none());
            assert!(!record.fields.is_empty(), "provider '{}': fields", case.id);
        }
    }
}

#[tokio::test]
async fn comparables_carry_source_weight_and_sane_values() {
    let address = address();

    for case in adapter_cases().into_iter().filter(|case| case.supports[2]) {
        let comparables = case
            .adapter
            .fetch_comparables(&address, 2.0)
            .await
            .unwrap_or_else(|error| panic!("provider '{}' comparables failed: {error}", case.id));

        assert!(!comparables.is_empty(), "provider '{}': comparables", case.id);
        for comparable in comparables {
            assert_eq!(comparable.source, case.id);
            assert_eq!(comparable.confidence, case.id.confidence_weight());
            assert!(comparable.price > 0.0, "provider '{}': price", case.id);
            assert!(
                comparable.distance_miles >= 0.0,
                "provider '{}': distance",
                case.id
            );
            assert!(!comparable.address.is_empty());
        }
    }
}

#[tokio::test]
async fn fixture_answers_are_deterministic() {
    let address = address();

    for case in adapter_cases().into_iter().filter(|case| case.supports[0]) {
        let first = case.adapter.fetch_property(&address).await.expect("property");
        let again = adapter_cases()
            .into_iter()
            .find(|other| other.id == case.id)
            .expect("same provider")
            .adapter
            .fetch_property(&address)
            .await
            .expect("property");
        assert_eq!(first, again, "provider '{}': deterministic", case.id);
    }
}
