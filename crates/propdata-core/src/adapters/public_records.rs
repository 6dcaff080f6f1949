use serde::Deserialize;

use crate::adapters::{decode, AdapterFuture, CapabilitySet, ProviderAdapter};
use crate::cache::CacheTtl;
use crate::client::{RequestDescriptor, ServiceClient};
use crate::{
    Address, Comparable, Field, PermitEvent, PropertyHistory, ProviderRecord, SaleEvent,
    ServiceError, ServiceErrorKind, ServiceId,
};

/// County assessor / recorder adapter.
#[derive(Clone)]
pub struct PublicRecordsAdapter {
    client: ServiceClient,
    offline: bool,
}

impl PublicRecordsAdapter {
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

impl ProviderAdapter for PublicRecordsAdapter {
    fn service(&self) -> ServiceId {
        ServiceId::PublicRecords
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, false, true, true)
    }

    fn is_available(&self) -> bool {
        self.offline || self.client.has_credential()
    }

    fn fetch_property<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/parcels")
                .with_param("address", address)
                .with_cache_ttl(CacheTtl::PUBLIC_RECORDS);
            let payload: ParcelEnvelope =
                decode(self.service(), self.client.request(&descriptor).await?)?;

            let parcel = payload.parcel.ok_or_else(|| {
                ServiceError::new(
                    ServiceErrorKind::NotFound,
                    ServiceId::PublicRecords,
                    format!("no parcel on record for '{address}'"),
                )
            })?;
            Ok(normalize_parcel(parcel))
        })
    }

    fn fetch_comparables<'a>(
        &'a self,
        address: &'a Address,
        radius_miles: f64,
    ) -> AdapterFuture<'a, Vec<Comparable>> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/sales/nearby")
                .with_param("address", address)
                .with_param("radiusMiles", radius_miles)
                .with_cache_ttl(CacheTtl::PUBLIC_RECORDS);
            let payload: NearbySalesPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(payload.sales.into_iter().map(normalize_sale).collect())
        })
    }

    fn fetch_history<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, PropertyHistory> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/parcels/history")
                .with_param("address", address)
                .with_cache_ttl(CacheTtl::PUBLIC_RECORDS);
            let payload: HistoryPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(normalize_history(payload))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ParcelEnvelope {
    parcel: Option<ParcelPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParcelPayload {
    apn: String,
    situs_address: String,
    assessed_total: Option<f64>,
    tax_amount: Option<f64>,
    last_sale: Option<LastSalePayload>,
    bedrooms: Option<u32>,
    bathrooms: Option<f64>,
    building_sqft: Option<u32>,
    lot_sqft: Option<u32>,
    year_built: Option<u32>,
    land_use: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastSalePayload {
    date: String,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct NearbySalesPayload {
    #[serde(default)]
    sales: Vec<RecordedSalePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedSalePayload {
    address: String,
    price: f64,
    recorded_date: String,
    distance: f64,
    bedrooms: Option<u32>,
    bathrooms: Option<f64>,
    building_sqft: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    transactions: Vec<TransactionPayload>,
    #[serde(default)]
    permits: Vec<PermitPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionPayload {
    recorded_date: String,
    price: f64,
    document_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermitPayload {
    issued_date: String,
    description: String,
    valuation: Option<f64>,
}

fn normalize_parcel(payload: ParcelPayload) -> ProviderRecord {
    let (last_sale_date, last_sale_price) = payload
        .last_sale
        .map(|sale| (Some(sale.date), Some(sale.amount)))
        .unwrap_or((None, None));

    ProviderRecord::new(ServiceId::PublicRecords)
        .with(Field::ParcelId, payload.apn)
        .with(Field::Address, payload.situs_address)
        .with_opt(Field::AssessedValue, payload.assessed_total)
        .with_opt(Field::AnnualTax, payload.tax_amount)
        .with_opt(Field::LastSaleDate, last_sale_date)
        .with_opt(Field::LastSalePrice, last_sale_price)
        .with_opt(Field::Bedrooms, payload.bedrooms)
        .with_opt(Field::Bathrooms, payload.bathrooms)
        .with_opt(Field::SquareFeet, payload.building_sqft)
        .with_opt(Field::LotSizeSqft, payload.lot_sqft)
        .with_opt(Field::YearBuilt, payload.year_built)
        .with_opt(Field::PropertyType, payload.land_use)
}

fn normalize_sale(payload: RecordedSalePayload) -> Comparable {
    Comparable {
        address: payload.address,
        price: payload.price,
        sale_date: Some(payload.recorded_date),
        distance_miles: payload.distance,
        bedrooms: payload.bedrooms,
        bathrooms: payload.bathrooms,
        square_feet: payload.building_sqft,
        source: ServiceId::PublicRecords,
        confidence: ServiceId::PublicRecords.confidence_weight(),
    }
}

fn normalize_history(payload: HistoryPayload) -> PropertyHistory {
    let mut sales: Vec<SaleEvent> = payload
        .transactions
        .into_iter()
        .map(|transaction| SaleEvent {
            date: transaction.recorded_date,
            price: transaction.price,
            kind: transaction.document_type.to_ascii_lowercase(),
        })
        .collect();
    let mut permits: Vec<PermitEvent> = payload
        .permits
        .into_iter()
        .map(|permit| PermitEvent {
            date: permit.issued_date,
            description: permit.description,
            value: permit.valuation,
        })
        .collect();

    // ISO-8601 dates sort lexicographically.
    sales.sort_by(|a, b| a.date.cmp(&b.date));
    permits.sort_by(|a, b| a.date.cmp(&b.date));

    PropertyHistory { sales, permits }
}
