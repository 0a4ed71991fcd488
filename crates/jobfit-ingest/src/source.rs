//! Producers of raw posting and company records.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use jobfit_core::{PostingContent, RawCompany, RawPosting};
use jobfit_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// One producer hand-off: companies first, then the postings that reference them by
/// name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeBatch {
    #[serde(default)]
    pub companies: Vec<RawCompany>,
    #[serde(default, alias = "jobposts")]
    pub postings: Vec<RawPosting>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait PostingSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch_batch(&self, run_id: Uuid) -> Result<ScrapeBatch, SourceError>;
}

pub fn load_batch_file(path: impl AsRef<Path>) -> anyhow::Result<ScrapeBatch> {
    let path = path.as_ref();
    let data =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Reads a previously captured batch from a JSON file.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PostingSource for FixtureSource {
    fn source_id(&self) -> &str {
        "fixture"
    }

    async fn fetch_batch(&self, _run_id: Uuid) -> Result<ScrapeBatch, SourceError> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let batch = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(batch)
    }
}

#[derive(Debug, Clone)]
pub struct ListingApiConfig {
    /// Origin that relative `links.next` paths and detail paths are resolved against.
    pub base_url: String,
    /// First listing page, absolute or relative to `base_url`.
    pub listing_url: String,
    pub site_name: String,
    /// Offset of the site's local time; deadlines are end-of-day in this zone.
    pub utc_offset: FixedOffset,
    /// Origin of the company salary site. `None` registers companies from the
    /// listing site's company detail alone.
    pub salary_api_url: Option<String>,
}

impl Default for ListingApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.wanted.co.kr".to_string(),
            listing_url: "/api/v4/jobs?country=kr&tag_type_ids=518&locations=all&years=-1&limit=100&offset=0&job_sort=job.latest_order".to_string(),
            site_name: "원티드".to_string(),
            utc_offset: FixedOffset::east_opt(9 * 3600).unwrap_or_else(|| Utc.fix()),
            salary_api_url: Some("https://kreditjob.com".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ListingPage {
    #[serde(default)]
    data: Vec<ListingJob>,
    #[serde(default)]
    links: ListingLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListingLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListingJob {
    id: i64,
    #[serde(default)]
    status: Option<String>,
    position: String,
    #[serde(default)]
    due_time: Option<String>,
    company: ListingCompany,
}

#[derive(Debug, Clone, Deserialize)]
struct ListingCompany {
    id: i64,
    name: String,
}

/// Paginated listing API producer: follows `links.next`, keeps active jobs, and
/// enriches each with its job detail and, once per company, the company detail.
pub struct ListingApiSource {
    http: HttpFetcher,
    config: ListingApiConfig,
}

impl ListingApiSource {
    pub fn new(http: HttpFetcher, config: ListingApiConfig) -> Self {
        Self { http, config }
    }

    fn absolute(&self, path_or_url: &str) -> String {
        resolve_url(&self.config.base_url, path_or_url)
    }

    async fn job_detail(&self, run_id: Uuid, job_id: i64) -> Option<JsonValue> {
        let url = self.absolute(&format!("/api/v4/jobs/{job_id}"));
        match self
            .http
            .fetch_json::<JsonValue>(run_id, self.source_id(), &url)
            .await
        {
            Ok(detail) => Some(detail),
            Err(err) => {
                warn!(job_id, error = %err, "job detail unavailable; keeping listing fields only");
                None
            }
        }
    }

    /// Industry code to name table of the salary site, fetched once per run.
    async fn industry_names(&self, run_id: Uuid) -> BTreeMap<String, String> {
        let Some(base) = self.config.salary_api_url.as_deref() else {
            return BTreeMap::new();
        };
        let url = resolve_url(base, "/api/industries");
        match self
            .http
            .fetch_json::<JsonValue>(run_id, self.source_id(), &url)
            .await
        {
            Ok(codes) => industry_names(&codes),
            Err(err) => {
                warn!(error = %err, "industry codes unavailable; keeping listing industry names");
                BTreeMap::new()
            }
        }
    }

    async fn salary_profile(
        &self,
        run_id: Uuid,
        salary_id: &str,
        industries: &BTreeMap<String, String>,
    ) -> Option<SalaryProfile> {
        let base = self.config.salary_api_url.as_deref()?;
        let summary_url = resolve_url(base, &format!("/api/company/{salary_id}/summary"));
        let info_url = resolve_url(base, &format!("/api/company/{salary_id}/info"));
        let fetched = async {
            let summary: JsonValue = self
                .http
                .fetch_json(run_id, self.source_id(), &summary_url)
                .await?;
            let info: JsonValue = self
                .http
                .fetch_json(run_id, self.source_id(), &info_url)
                .await?;
            Ok::<_, FetchError>((summary, info))
        }
        .await;
        match fetched {
            Ok((summary, info)) => Some(salary_profile(base, salary_id, &summary, &info, industries)),
            Err(err) => {
                warn!(salary_id, error = %err, "salary profile unavailable; registering listing fields only");
                None
            }
        }
    }

    async fn company_detail(&self, run_id: Uuid, company_id: i64) -> Option<JsonValue> {
        let url = self.absolute(&format!("/api/v4/companies/{company_id}"));
        match self
            .http
            .fetch_json::<JsonValue>(run_id, self.source_id(), &url)
            .await
        {
            Ok(detail) => Some(detail),
            Err(err) => {
                warn!(company_id, error = %err, "company detail unavailable; registering name only");
                None
            }
        }
    }
}

#[async_trait]
impl PostingSource for ListingApiSource {
    fn source_id(&self) -> &str {
        "listing-api"
    }

    async fn fetch_batch(&self, run_id: Uuid) -> Result<ScrapeBatch, SourceError> {
        let mut batch = ScrapeBatch::default();
        let mut seen_companies = BTreeSet::new();
        let mut next = Some(self.absolute(&self.config.listing_url));
        let mut pages = 0usize;
        let industries = self.industry_names(run_id).await;

        while let Some(url) = next.take() {
            let page: ListingPage = self.http.fetch_json(run_id, self.source_id(), &url).await?;
            pages += 1;
            next = page.links.next.as_deref().map(|n| self.absolute(n));

            for job in page.data.iter().filter(|job| is_active(job)) {
                if seen_companies.insert(job.company.id) {
                    let detail = self.company_detail(run_id, job.company.id).await;
                    let profile = match salary_site_id(detail.as_ref()) {
                        Some(salary_id) => {
                            self.salary_profile(run_id, &salary_id, &industries).await
                        }
                        None => None,
                    };
                    batch.companies.push(company_from_detail(
                        &job.company.name,
                        detail.as_ref(),
                        profile.as_ref(),
                    ));
                }
                let detail = self.job_detail(run_id, job.id).await;
                batch
                    .postings
                    .push(posting_from_listing(job, detail.as_ref(), &self.config));
            }
        }

        info!(
            pages,
            companies = batch.companies.len(),
            postings = batch.postings.len(),
            "listing traversal finished"
        );
        Ok(batch)
    }
}

fn is_active(job: &ListingJob) -> bool {
    job.status.as_deref() == Some("active")
}

fn resolve_url(base_url: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
        path_or_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path_or_url.trim_start_matches('/')
        )
    }
}

fn json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

fn json_str(value: &JsonValue, path: &[&str]) -> Option<String> {
    json_value(value, path)?.as_str().map(ToString::to_string)
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    json_value(value, path)?.as_f64()
}

/// Whole number at `path`; fractional values are rounded.
fn json_i64(value: &JsonValue, path: &[&str]) -> Option<i64> {
    let v = json_value(value, path)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

/// String or number at `path`, as text. Ids arrive in either form.
fn json_scalar(value: &JsonValue, path: &[&str]) -> Option<String> {
    match json_value(value, path)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Upper and lower administrative units: the first two space-separated tokens.
fn split_address(full: &str) -> (Option<String>, Option<String>) {
    let mut parts = full.split(' ').filter(|p| !p.is_empty());
    (
        parts.next().map(ToString::to_string),
        parts.next().map(ToString::to_string),
    )
}

fn end_of_day(date: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let local = date.and_hms_milli_opt(23, 59, 59, 999)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn posting_from_listing(
    job: &ListingJob,
    detail: Option<&JsonValue>,
    config: &ListingApiConfig,
) -> RawPosting {
    let job_detail = detail.and_then(|d| d.get("job"));
    let original_address =
        job_detail.and_then(|d| json_str(d, &["address", "full_location"]));
    let (address_upper, address_lower) = original_address
        .as_deref()
        .map(split_address)
        .unwrap_or_default();

    RawPosting {
        company_name: job.company.name.clone(),
        title: job.position.clone(),
        content: job_detail
            .and_then(|d| d.get("detail"))
            .cloned()
            .map(PostingContent::Structured)
            .unwrap_or_default(),
        salary: None,
        original_site_name: Some(config.site_name.clone()),
        original_url: Some(resolve_url(&config.base_url, &format!("/wd/{}", job.id))),
        original_img_url: job_detail.and_then(|d| json_str(d, &["logo_img", "thumb"])),
        posted_dtm: None,
        deadline_dtm: job
            .due_time
            .as_deref()
            .and_then(|d| end_of_day(d, config.utc_offset)),
        original_address,
        address_upper,
        address_lower,
        latitude: job_detail
            .and_then(|d| json_f64(d, &["address", "geo_location", "location", "lat"])),
        longitude: job_detail
            .and_then(|d| json_f64(d, &["address", "geo_location", "location", "lng"])),
    }
}

/// Headcount, pay and registration details from the company salary site.
#[derive(Debug, Clone, Default, PartialEq)]
struct SalaryProfile {
    profile_url: String,
    number_employees: Option<i64>,
    avg_salary: Option<i64>,
    address: Option<String>,
    industry_type: Option<String>,
    founded_year: Option<i32>,
}

fn industry_names(codes: &JsonValue) -> BTreeMap<String, String> {
    codes
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| Some((json_scalar(entry, &["code"])?, json_str(entry, &["name"])?)))
        .collect()
}

fn salary_site_id(detail: Option<&JsonValue>) -> Option<String> {
    detail.and_then(|d| json_scalar(d, &["company", "kreditjob_id"]))
}

fn salary_profile(
    base_url: &str,
    salary_id: &str,
    summary: &JsonValue,
    info: &JsonValue,
    industries: &BTreeMap<String, String>,
) -> SalaryProfile {
    SalaryProfile {
        profile_url: resolve_url(base_url, &format!("/company/{salary_id}")),
        number_employees: json_i64(summary, &["employee", "total"]),
        avg_salary: json_i64(summary, &["salary", "salary"]),
        address: json_str(info, &["location"]),
        industry_type: json_scalar(info, &["industryCode"])
            .and_then(|code| industries.get(&code).cloned()),
        founded_year: json_i64(info, &["foundedYear"]).and_then(|y| i32::try_from(y).ok()),
    }
}

fn company_from_detail(
    name: &str,
    detail: Option<&JsonValue>,
    profile: Option<&SalaryProfile>,
) -> RawCompany {
    let company = detail.and_then(|d| d.get("company"));
    let listed = RawCompany {
        company_name: name.to_string(),
        image_url: company.and_then(|c| json_str(c, &["logo_img", "thumb"])),
        homepage_url: company.and_then(|c| json_str(c, &["detail", "link"])),
        industry_type: company.and_then(|c| json_str(c, &["industry_name"])),
        ..Default::default()
    };
    let Some(profile) = profile else {
        return listed;
    };
    RawCompany {
        number_employees: profile.number_employees,
        address: profile.address.clone(),
        founded_year: profile.founded_year,
        avg_salary: profile.avg_salary,
        kreditjob_url: Some(profile.profile_url.clone()),
        industry_type: profile.industry_type.clone().or(listed.industry_type.clone()),
        ..listed
    }
}
