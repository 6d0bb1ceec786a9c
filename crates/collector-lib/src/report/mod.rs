//! Read side consumed by the reporting surface
//!
//! Listings, statistics and detail views use the latest analysis of each
//! sub-unit.

pub mod patch;

pub use patch::ResourcePatch;

use crate::error::StoreResult;
use crate::models::{Confidence, Recommendation, RecommendationView, Statistics, Status, UnitDetail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum rows returned by [`ReportingStore::search`]
pub const SEARCH_LIMIT: usize = 50;

/// Rows returned by [`ReportingStore::get`] usage history
pub const HISTORY_LIMIT: usize = 100;

/// Ordering of unit listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Monthly savings, descending
    #[default]
    Savings,
    /// CPU waste percentage, descending
    Waste,
    /// Unit name, ascending
    Name,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "savings" => Ok(SortKey::Savings),
            "waste" => Ok(SortKey::Waste),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortKey::Savings => "savings",
            SortKey::Waste => "waste",
            SortKey::Name => "name",
        };
        f.write_str(s)
    }
}

/// Filter for unit listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitFilter {
    pub namespace: Option<String>,
    pub status: Option<Status>,
    pub sort: SortKey,
    pub limit: Option<usize>,
}

/// Filter for recommendation listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationFilter {
    pub confidence: Option<Confidence>,
    /// Only savings at or above this value; ignored unless positive
    pub min_savings: Option<f64>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait ReportingStore: Send + Sync {
    async fn list(&self, filter: &UnitFilter) -> StoreResult<Vec<RecommendationView>>;

    /// Case-insensitive substring match on unit name or namespace, by savings
    async fn search(&self, term: &str) -> StoreResult<Vec<RecommendationView>>;

    async fn get(&self, namespace: &str, unit_name: &str) -> StoreResult<Option<UnitDetail>>;

    /// Recommendations by savings, descending
    async fn list_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> StoreResult<Vec<Recommendation>>;

    async fn get_recommendation(&self, id: i64) -> StoreResult<Option<Recommendation>>;

    /// Set the applied flag; returns `false` if no such recommendation exists
    async fn mark_applied(&self, id: i64, applied: bool) -> StoreResult<bool>;

    async fn get_statistics(&self) -> StoreResult<Statistics>;

    async fn namespaces(&self) -> StoreResult<Vec<String>>;
}
