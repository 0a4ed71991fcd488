//! Core domain model for jobfit: postings, companies, taxonomy records, likes and
//! the predicate model shared by every store implementation.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "jobfit-core";

pub type PostingId = i64;
pub type CompanyId = i64;
pub type StackId = i64;
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Posting body as delivered by a producer: plain text, or structured detail data
/// that is serialized to JSON text before scanning and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostingContent {
    Text(String),
    Structured(JsonValue),
}

impl Default for PostingContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl PostingContent {
    pub fn to_text(&self) -> Result<Cow<'_, str>, serde_json::Error> {
        match self {
            Self::Text(text) => Ok(Cow::Borrowed(text.as_str())),
            Self::Structured(value) => serde_json::to_string(value).map(Cow::Owned),
        }
    }
}

/// Pre-taxonomy posting record handed over by an ingestion producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawPosting {
    pub company_name: String,
    pub title: String,
    #[serde(default)]
    pub content: PostingContent,
    #[serde(default)]
    pub salary: Option<i64>,
    #[serde(default)]
    pub original_site_name: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub original_img_url: Option<String>,
    #[serde(default)]
    pub posted_dtm: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_dtm: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_address: Option<String>,
    #[serde(default)]
    pub address_upper: Option<String>,
    #[serde(default)]
    pub address_lower: Option<String>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
}

/// Pre-persistence company record handed over by an ingestion producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawCompany {
    pub company_name: String,
    #[serde(default)]
    pub representative_name: Option<String>,
    #[serde(default)]
    pub number_employees: Option<i64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub founded_year: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub annual_sales: Option<i64>,
    #[serde(default)]
    pub avg_salary: Option<i64>,
    #[serde(default)]
    pub kreditjob_url: Option<String>,
    #[serde(default)]
    pub industry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: CompanyId,
    pub company_name: String,
    pub address: Option<String>,
    pub number_employees: Option<i64>,
    pub founded_year: Option<i32>,
    pub image_url: Option<String>,
    pub homepage_url: Option<String>,
    pub avg_salary: Option<i64>,
    pub industry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword_code: String,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub stack_id: StackId,
    pub stack: String,
    pub category: String,
    pub stack_img_url: Option<String>,
}

/// Posting fields written by the upserter once content has been flattened to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub title: String,
    pub content: String,
    pub salary: Option<i64>,
    pub original_site_name: Option<String>,
    pub original_url: Option<String>,
    pub original_img_url: Option<String>,
    pub posted_dtm: Option<DateTime<Utc>>,
    pub deadline_dtm: Option<DateTime<Utc>>,
    pub original_address: Option<String>,
    pub address_upper: Option<String>,
    pub address_lower: Option<String>,
    pub location: Option<Coordinates>,
}

impl NewPosting {
    pub fn from_raw(raw: &RawPosting, content: String) -> Self {
        Self {
            title: raw.title.clone(),
            content,
            salary: raw.salary,
            original_site_name: raw.original_site_name.clone(),
            original_url: raw.original_url.clone(),
            original_img_url: raw.original_img_url.clone(),
            posted_dtm: raw.posted_dtm,
            deadline_dtm: raw.deadline_dtm,
            original_address: raw.original_address.clone(),
            address_upper: raw.address_upper.clone(),
            address_lower: raw.address_lower.clone(),
            location: Coordinates::from_parts(raw.latitude, raw.longitude),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub posting_id: PostingId,
    pub created: bool,
}

/// When extracted taxonomy links are written for an upserted posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxonomyLinkPolicy {
    /// Links are attached only when the upsert created the posting.
    #[default]
    AttachOnCreate,
    /// Links are replaced with the fresh extraction on every upsert.
    ReplaceOnUpdate,
}

impl TaxonomyLinkPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "attach-on-create" => Some(Self::AttachOnCreate),
            "replace-on-update" => Some(Self::ReplaceOnUpdate),
            _ => None,
        }
    }

    /// Whether links are written for an upsert with the given outcome, and whether
    /// existing links are cleared first.
    pub fn link_writes(self, created: bool) -> Option<LinkWrite> {
        match (created, self) {
            (true, _) => Some(LinkWrite::Attach),
            (false, Self::ReplaceOnUpdate) => Some(LinkWrite::Replace),
            (false, Self::AttachOnCreate) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWrite {
    Attach,
    Replace,
}

/// Taxonomy ids extracted for one posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyLinks {
    pub keyword_codes: Vec<String>,
    pub stack_ids: Vec<StackId>,
}

/// Text form of a timestamp when a timestamp column is compared as text: UTC,
/// whole seconds, `+00:00` offset.
pub fn timestamp_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Stored posting row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub posting_id: PostingId,
    pub company_id: CompanyId,
    pub title: String,
    pub content: String,
    pub salary: Option<i64>,
    pub original_site_name: Option<String>,
    pub original_url: Option<String>,
    pub original_img_url: Option<String>,
    pub posted_dtm: Option<DateTime<Utc>>,
    pub deadline_dtm: Option<DateTime<Utc>>,
    pub original_address: Option<String>,
    pub address_upper: Option<String>,
    pub address_lower: Option<String>,
    pub location: Option<Coordinates>,
    pub views: i64,
    pub created_dtm: DateTime<Utc>,
    pub updated_dtm: DateTime<Utc>,
}

/// Listing row with company, keyword and stack display strings denormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingSummary {
    pub posting_id: PostingId,
    pub company_name: Option<String>,
    pub original_img_url: Option<String>,
    pub title: String,
    pub keywords: Vec<String>,
    pub keyword_codes: Vec<String>,
    pub stacks: Vec<String>,
    pub stack_img_urls: Vec<String>,
    pub likes_count: i64,
    pub views: i64,
    pub salary: Option<i64>,
    pub deadline_dtm: Option<DateTime<Utc>>,
    pub address_upper: Option<String>,
    pub address_lower: Option<String>,
    pub original_address: Option<String>,
}

/// A posting sharing at least one stack with a user's liked postings, with the raw
/// inputs of every scoring signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePosting {
    pub summary: PostingSummary,
    pub stack_ids: Vec<StackId>,
    pub location: Option<Coordinates>,
    pub avg_salary: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingDetail {
    pub posting: Posting,
    pub company: Option<Company>,
    pub keywords: Vec<Keyword>,
    pub stacks: Vec<Stack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LikedPosting {
    pub user_id: UserId,
    pub posting_id: PostingId,
}

/// Derived ranking input for one user; never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: UserId,
    pub location: Option<Coordinates>,
    pub stack_ids: BTreeSet<StackId>,
    pub keyword_codes: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AddressFacets {
    pub address_upper: Vec<String>,
    pub address_lower: Vec<AddressPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressPair {
    pub address_upper: String,
    pub address_lower: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackFacet {
    pub category: String,
    pub stack: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFacet {
    pub keyword_code: String,
    pub keyword: String,
}

/// Filterable columns of the flattened listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    PostingId,
    CompanyId,
    CompanyName,
    Title,
    Content,
    OriginalSiteName,
    OriginalUrl,
    Salary,
    DeadlineDtm,
    AddressUpper,
    AddressLower,
    Keywords,
    KeywordCodes,
    Stacks,
}

impl Column {
    pub const ALL: [Column; 14] = [
        Column::PostingId,
        Column::CompanyId,
        Column::CompanyName,
        Column::Title,
        Column::Content,
        Column::OriginalSiteName,
        Column::OriginalUrl,
        Column::Salary,
        Column::DeadlineDtm,
        Column::AddressUpper,
        Column::AddressLower,
        Column::Keywords,
        Column::KeywordCodes,
        Column::Stacks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::PostingId => "jobpost_id",
            Column::CompanyId => "company_id",
            Column::CompanyName => "company_name",
            Column::Title => "title",
            Column::Content => "content",
            Column::OriginalSiteName => "original_site_name",
            Column::OriginalUrl => "original_url",
            Column::Salary => "salary",
            Column::DeadlineDtm => "deadline_dtm",
            Column::AddressUpper => "address_upper",
            Column::AddressLower => "address_lower",
            Column::Keywords => "keywords",
            Column::KeywordCodes => "keyword_codes",
            Column::Stacks => "stacks",
        }
    }

    /// Resolves a filter key to a column; accepts the snake_case column name or its
    /// camelCase spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        let snake = camel_to_snake(name);
        Self::ALL.into_iter().find(|column| column.name() == snake)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.trim().chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Typed filter predicate. Store implementations render or evaluate it; values are
/// always carried as data, never spliced into query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Exact equality against the column's text form.
    Eq { column: Column, value: String },
    /// Case-insensitive substring match.
    Contains { column: Column, needle: String },
    NotNull { column: Column },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

/// Row view the in-memory evaluator reads columns through.
pub trait ColumnSource {
    fn column_text(&self, column: Column) -> Option<Cow<'_, str>>;
}

impl Predicate {
    pub fn eq(column: Column, value: impl Into<String>) -> Self {
        Self::Eq {
            column,
            value: value.into(),
        }
    }

    pub fn contains(column: Column, needle: impl Into<String>) -> Self {
        Self::Contains {
            column,
            needle: needle.into(),
        }
    }

    pub fn matches(&self, row: &dyn ColumnSource) -> bool {
        match self {
            Predicate::Eq { column, value } => row
                .column_text(*column)
                .is_some_and(|text| text.as_ref() == value),
            Predicate::Contains { column, needle } => {
                row.column_text(*column).is_some_and(|text| {
                    text.to_lowercase().contains(&needle.to_lowercase())
                })
            }
            Predicate::NotNull { column } => row.column_text(*column).is_some(),
            Predicate::All(items) => items.iter().all(|p| p.matches(row)),
            Predicate::Any(items) => items.iter().any(|p| p.matches(row)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Sort keys for the non-recommended browsing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Recent,
    Popular,
    Ending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingQuery {
    /// Conjunctive list; every predicate must hold.
    pub predicates: Vec<Predicate>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PostingPage {
    pub rows: Vec<PostingSummary>,
    pub total_count: u64,
}
