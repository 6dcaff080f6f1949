use serde::Deserialize;

use crate::adapters::{decode, AdapterFuture, CapabilitySet, ProviderAdapter};
use crate::cache::CacheTtl;
use crate::client::{RequestDescriptor, ServiceClient};
use crate::{Field, ProviderRecord, Region, ServiceId};

/// Census-style demographics and walkability adapter.
#[derive(Clone)]
pub struct DemographicsAdapter {
    client: ServiceClient,
    offline: bool,
}

impl DemographicsAdapter {
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

impl ProviderAdapter for DemographicsAdapter {
    fn service(&self) -> ServiceId {
        ServiceId::Demographics
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(false, true, false, false)
    }

    fn is_available(&self) -> bool {
        self.offline || self.client.has_credential()
    }

    fn fetch_neighborhood<'a>(&'a self, region: &'a Region) -> AdapterFuture<'a, ProviderRecord> {
        Box::pin(async move {
            let profile = RequestDescriptor::get("/demographics")
                .with_param("area", region)
                .with_cache_ttl(CacheTtl::DEMOGRAPHICS);
            let profile: ProfilePayload =
                decode(self.service(), self.client.request(&profile).await?)?;

            // Scores change rarely and are cached far longer than the profile.
            let scores = RequestDescriptor::get("/scores")
                .with_param("area", region)
                .with_cache_ttl(CacheTtl::WALK_SCORES);
            let scores: ScoresPayload =
                decode(self.service(), self.client.request(&scores).await?)?;

            Ok(normalize_profile(region, profile, scores))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    population: Option<u32>,
    median_household_income: Option<f64>,
    median_age: Option<f64>,
    owner_occupied_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ScoresPayload {
    walkscore: Option<u32>,
    transit_score: Option<u32>,
}

fn normalize_profile(
    region: &Region,
    profile: ProfilePayload,
    scores: ScoresPayload,
) -> ProviderRecord {
    ProviderRecord::new(ServiceId::Demographics)
        .with(Field::Region, region.as_str())
        .with_opt(Field::Population, profile.population)
        .with_opt(Field::MedianHouseholdIncome, profile.median_household_income)
        .with_opt(Field::MedianAge, profile.median_age)
        .with_opt(Field::OwnerOccupiedPercent, profile.owner_occupied_pct)
        .with_opt(Field::WalkScore, scores.walkscore)
        .with_opt(Field::TransitScore, scores.transit_score)
}
