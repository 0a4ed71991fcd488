//! Read side of jobfit: recommendation ranking, filtered listings, posting detail,
//! facets and likes.

use std::collections::BTreeMap;
use std::sync::Arc;

use jobfit_core::{
    AddressFacets, KeywordFacet, PostingDetail, PostingId, PostingSummary, SortOrder, StackFacet,
    UserId,
};
use jobfit_storage::{JobpostStore, LikedPostingCache, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod options;
pub mod scoring;

pub use options::{build_posting_query, BrowseSort};
pub use scoring::{
    haversine_km, KeywordMatchMode, Recommendation, ScoredPosting, ScoringEngine, Signals,
    Subscores,
};

pub const CRATE_NAME: &str = "jobfit-query";

pub const DETAIL_UNAVAILABLE: &str = "could not load posting detail";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown filter {0:?}")]
    UnknownFilter(String),
    #[error("invalid value {value:?} for filter {key:?}")]
    InvalidFilter { key: String, value: String },
    #[error("invalid sort order {0:?}")]
    InvalidOrder(String),
    #[error("recommended sort needs a viewer")]
    ViewerRequired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub keyword_match: KeywordMatchMode,
    pub default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            keyword_match: KeywordMatchMode::default(),
            default_limit: 20,
        }
    }
}

impl QueryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            keyword_match: std::env::var("JOBFIT_KEYWORD_MATCH")
                .ok()
                .and_then(|v| KeywordMatchMode::parse(&v))
                .unwrap_or(defaults.keyword_match),
            default_limit: std::env::var("JOBFIT_DEFAULT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_limit),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowseRequest {
    #[serde(default)]
    pub viewer: Option<UserId>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BrowseData {
    Ranked(Vec<ScoredPosting>),
    Listing(Vec<PostingSummary>),
}

impl BrowseData {
    pub fn posting_ids(&self) -> Vec<PostingId> {
        match self {
            BrowseData::Ranked(rows) => rows.iter().map(|r| r.posting.posting_id).collect(),
            BrowseData::Listing(rows) => rows.iter().map(|r| r.posting_id).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowseResponse {
    pub data: BrowseData,
    pub total_count: u64,
    pub liked_posting_ids: Vec<PostingId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PostingDetailResponse {
    Detail(Box<PostingDetail>),
    Message { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facets {
    pub addresses: AddressFacets,
    pub stacks: Vec<StackFacet>,
    pub keywords: Vec<KeywordFacet>,
}

pub struct JobpostService {
    store: Arc<dyn JobpostStore>,
    likes: Arc<dyn LikedPostingCache>,
    engine: ScoringEngine,
    default_limit: u32,
}

impl JobpostService {
    pub fn new(
        store: Arc<dyn JobpostStore>,
        likes: Arc<dyn LikedPostingCache>,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            likes,
            engine: ScoringEngine::new(config.keyword_match),
            default_limit: config.default_limit,
        }
    }

    pub async fn browse(&self, request: &BrowseRequest) -> Result<BrowseResponse, QueryError> {
        let limit = request.limit.unwrap_or(self.default_limit);
        let order = match request.order.as_deref() {
            None => SortOrder::default(),
            Some(raw) => {
                SortOrder::parse(raw).ok_or_else(|| QueryError::InvalidOrder(raw.to_string()))?
            }
        };

        match BrowseSort::parse(request.sort.as_deref()) {
            BrowseSort::Recommended => {
                let viewer = request.viewer.ok_or(QueryError::ViewerRequired)?;
                let recommendation = self.recommend(viewer, limit).await?;
                Ok(BrowseResponse {
                    total_count: recommendation.total_candidates as u64,
                    data: BrowseData::Ranked(recommendation.ranked),
                    liked_posting_ids: recommendation.liked_posting_ids,
                })
            }
            BrowseSort::Listing(sort) => {
                let query = build_posting_query(
                    sort,
                    order,
                    limit,
                    request.offset.unwrap_or(0),
                    &request.filters,
                )?;
                let page = self.store.filtered_postings(&query).await?;
                debug!(
                    sort = ?sort,
                    predicates = query.predicates.len(),
                    total = page.total_count,
                    "listing page loaded"
                );
                Ok(BrowseResponse {
                    data: BrowseData::Listing(page.rows),
                    total_count: page.total_count,
                    liked_posting_ids: self.liked_posting_ids(request.viewer).await?,
                })
            }
        }
    }

    pub async fn recommend(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Recommendation, QueryError> {
        let preference = self.store.user_preferences(user_id).await?;
        let candidates = if preference.stack_ids.is_empty() {
            Vec::new()
        } else {
            self.store.scoring_candidates(&preference.stack_ids).await?
        };
        let fetched = candidates.len();
        let (ranked, total_candidates) = self.engine.rank(&preference, candidates, limit as usize);
        debug!(
            user_id,
            fetched,
            total_candidates,
            keyword_match = ?self.engine.keyword_match(),
            "recommendation ranked"
        );
        Ok(Recommendation {
            ranked,
            total_candidates,
            liked_posting_ids: self.liked_posting_ids(Some(user_id)).await?,
        })
    }

    /// The viewer's liked posting ids in ascending order; empty without a viewer.
    pub async fn liked_posting_ids(
        &self,
        viewer: Option<UserId>,
    ) -> Result<Vec<PostingId>, QueryError> {
        let Some(viewer) = viewer else {
            return Ok(Vec::new());
        };
        let mut ids = self
            .likes
            .all_liked_postings()
            .await?
            .into_iter()
            .filter(|like| like.user_id == viewer)
            .map(|like| like.posting_id)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    pub async fn detail(&self, posting_id: PostingId) -> PostingDetailResponse {
        match self.store.posting_detail(posting_id).await {
            Ok(Some(detail)) => PostingDetailResponse::Detail(Box::new(detail)),
            Ok(None) => {
                debug!(posting_id, "posting detail not found");
                PostingDetailResponse::Message {
                    message: DETAIL_UNAVAILABLE.to_string(),
                }
            }
            Err(err) => {
                warn!(posting_id, error = %err, "posting detail lookup failed");
                PostingDetailResponse::Message {
                    message: DETAIL_UNAVAILABLE.to_string(),
                }
            }
        }
    }

    pub async fn facets(&self) -> Result<Facets, QueryError> {
        Ok(Facets {
            addresses: self.store.address_facets().await?,
            stacks: self.store.stack_facets().await?,
            keywords: self.store.keyword_facets().await?,
        })
    }

    /// Store failures are logged and swallowed.
    pub async fn like(&self, user_id: UserId, posting_id: PostingId) {
        if let Err(err) = self.store.add_like(user_id, posting_id).await {
            warn!(user_id, posting_id, error = %err, "like not recorded");
        }
    }

    /// Store failures are logged and swallowed.
    pub async fn unlike(&self, user_id: UserId, posting_id: PostingId) {
        if let Err(err) = self.store.remove_like(user_id, posting_id).await {
            warn!(user_id, posting_id, error = %err, "unlike not recorded");
        }
    }
}
