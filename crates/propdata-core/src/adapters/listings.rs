use serde::Deserialize;

use crate::adapters::{decode, AdapterFuture, CapabilitySet, ProviderAdapter};
use crate::cache::CacheTtl;
use crate::client::{RequestDescriptor, ServiceClient};
use crate::{
    Address, Comparable, Field, ProviderRecord, Region, ServiceError, ServiceErrorKind, ServiceId,
};

/// MLS-style listings adapter.
#[derive(Clone)]
pub struct ListingsAdapter {
    client: ServiceClient,
    offline: bool,
}

impl ListingsAdapter {
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

impl ProviderAdapter for ListingsAdapter {
    fn service(&self) -> ServiceId {
        ServiceId::Listings
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true, false)
    }

    fn is_available(&self) -> bool {
        self.offline || self.client.has_credential()
    }

    fn fetch_property<'a>(&'a self, address: &'a Address) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/properties")
                .with_param("address", address)
                .with_cache_ttl(CacheTtl::PROPERTY_DETAILS);
            let payload: ListingEnvelope =
                decode(self.service(), self.client.request(&descriptor).await?)?;

            let listing = payload.listing.ok_or_else(|| {
                ServiceError::new(
                    ServiceErrorKind::NotFound,
                    ServiceId::Listings,
                    format!("no listing found for '{address}'"),
                )
            })?;
            Ok(normalize_listing(listing))
        })
    }

    fn fetch_neighborhood<'a>(&'a self, region: &'a Region) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/market/stats")
                .with_param("region", region)
                .with_cache_ttl(CacheTtl::MARKET_STATISTICS);
            let payload: MarketStatsPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(normalize_market_stats(payload))
        })
    }

    fn fetch_comparables<'a>(
        &'a self,
        address: &'a Address,
        radius_miles: f64,
    ) -> AdapterFuture<'a, Vec<Comparable>> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::get("/listings/search")
                .with_param("address", address)
                .with_param("radius", radius_miles)
                .with_cache_ttl(CacheTtl::ACTIVE_LISTINGS);
            let payload: SearchPayload =
                decode(self.service(), self.client.request(&descriptor).await?)?;
            Ok(payload
                .results
                .into_iter()
                .map(normalize_comparable)
                .collect())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListingEnvelope {
    listing: Option<ListingPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingPayload {
    listing_id: String,
    address: String,
    list_price: f64,
    beds: Option<u32>,
    baths: Option<f64>,
    living_area_sqft: Option<u32>,
    lot_size_sqft: Option<u32>,
    year_built: Option<u32>,
    property_type: Option<String>,
    status: Option<String>,
    days_on_market: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketStatsPayload {
    region: String,
    median_list_price: Option<f64>,
    median_sale_price: Option<f64>,
    active_listings: Option<u32>,
    avg_days_on_market: Option<f64>,
    price_change_yoy: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    results: Vec<SearchResultPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultPayload {
    address: String,
    price: f64,
    sold_date: Option<String>,
    distance_miles: f64,
    beds: Option<u32>,
    baths: Option<f64>,
    sqft: Option<u32>,
}

fn normalize_listing(payload: ListingPayload) -> ProviderRecord {
    ProviderRecord::new(ServiceId::Listings)
        .with(Field::ListingId, payload.listing_id)
        .with(Field::Address, payload.address)
        .with(Field::Price, payload.list_price)
        .with_opt(Field::Bedrooms, payload.beds)
        .with_opt(Field::Bathrooms, payload.baths)
        .with_opt(Field::SquareFeet, payload.living_area_sqft)
        .with_opt(Field::LotSizeSqft, payload.lot_size_sqft)
        .with_opt(Field::YearBuilt, payload.year_built)
        .with_opt(Field::PropertyType, payload.property_type)
        .with_opt(Field::ListingStatus, payload.status)
        .with_opt(Field::DaysOnMarket, payload.days_on_market)
}

fn normalize_market_stats(payload: MarketStatsPayload) -> ProviderRecord {
    ProviderRecord::new(ServiceId::Listings)
        .with(Field::Region, payload.region)
        .with_opt(Field::MedianListPrice, payload.median_list_price)
        .with_opt(Field::MedianSalePrice, payload.median_sale_price)
        .with_opt(Field::ActiveListings, payload.active_listings)
        .with_opt(Field::AverageDaysOnMarket, payload.avg_days_on_market)
        .with_opt(Field::PriceChangeYoyPercent, payload.price_change_yoy)
}

fn normalize_comparable(payload: SearchResultPayload) -> Comparable {
    Comparable {
        address: payload.address,
        price: payload.price,
        sale_date: payload.sold_date,
        distance_miles: payload.distance_miles,
        bedrooms: payload.beds,
        bathrooms: payload.baths,
        square_feet: payload.sqft,
        source: ServiceId::Listings,
        confidence: ServiceId::Listings.confidence_weight(),
    }
}
