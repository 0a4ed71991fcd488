//! Store contracts for jobfit plus their Postgres and in-memory implementations,
//! and the HTTP fetcher used by scrape producers.

use std::collections::BTreeSet;

use async_trait::async_trait;
use jobfit_core::{
    AddressFacets, CandidatePosting, CompanyId, Keyword, KeywordFacet, LikedPosting, NewPosting,
    PostingDetail, PostingId, PostingPage, PostingQuery, RawCompany, Stack, StackFacet, StackId,
    TaxonomyLinkPolicy, TaxonomyLinks, UpsertOutcome, UserId, UserPreference,
};
use thiserror::Error;

mod fetch;
mod memory;
mod pg;

pub use fetch::{
    classify_reqwest_error, classify_status, BackoffPolicy, BackoffShape, FetchError,
    FetchedResponse, HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use memory::MemoryStore;
pub use pg::{build_count_query, build_listing_query, PgStore};

pub const CRATE_NAME: &str = "jobfit-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("posting {0} not found")]
    PostingNotFound(PostingId),
    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unknown taxonomy reference: {0}")]
    UnknownTaxonomy(String),
}

/// Persistence contract consumed by ingestion and querying.
#[async_trait]
pub trait JobpostStore: Send + Sync {
    async fn find_company_id_by_name(&self, name: &str) -> Result<Option<CompanyId>, StoreError>;

    /// Name-keyed insert-or-update of a scraped company record.
    async fn upsert_company(&self, company: &RawCompany) -> Result<CompanyId, StoreError>;

    async fn find_keyword_by_code(&self, code: &str) -> Result<Option<Keyword>, StoreError>;

    async fn find_stack_by_canonical_alias(&self, alias: &str) -> Result<Option<Stack>, StoreError>;

    /// Single-statement insert-or-update keyed on (company, title). On conflict only
    /// salary, image URL and deadline change.
    async fn upsert_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
    ) -> Result<UpsertOutcome, StoreError>;

    /// [`JobpostStore::upsert_posting`] plus the link writes `policy` calls for, as one
    /// unit: on any failure neither the row nor its links are written.
    async fn upsert_tagged_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
        links: &TaxonomyLinks,
        policy: TaxonomyLinkPolicy,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Adds taxonomy links; links that already exist are left alone.
    async fn attach_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError>;

    /// Replaces the posting's taxonomy links with exactly the given sets.
    async fn replace_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError>;

    async fn user_preferences(&self, user_id: UserId) -> Result<UserPreference, StoreError>;

    /// Postings linked to at least one of `stack_ids`, ordered by posting id.
    async fn scoring_candidates(
        &self,
        stack_ids: &BTreeSet<StackId>,
    ) -> Result<Vec<CandidatePosting>, StoreError>;

    async fn filtered_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError>;

    async fn posting_detail(&self, posting_id: PostingId)
        -> Result<Option<PostingDetail>, StoreError>;

    async fn address_facets(&self) -> Result<AddressFacets, StoreError>;

    async fn stack_facets(&self) -> Result<Vec<StackFacet>, StoreError>;

    async fn keyword_facets(&self) -> Result<Vec<KeywordFacet>, StoreError>;

    async fn add_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError>;

    async fn remove_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError>;
}

/// Key-value view of liked postings used to annotate query results.
#[async_trait]
pub trait LikedPostingCache: Send + Sync {
    async fn all_liked_postings(&self) -> Result<Vec<LikedPosting>, StoreError>;
}
