use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfit_core::{
    timestamp_text, AddressFacets, AddressPair, CandidatePosting, Column, ColumnSource, Company,
    CompanyId, Coordinates, Keyword, KeywordFacet, LikedPosting, LinkWrite, NewPosting, Posting,
    PostingDetail, PostingId, PostingPage, PostingQuery, PostingSummary, RawCompany, SortKey,
    SortOrder, Stack, StackFacet, StackId, TaxonomyLinkPolicy, TaxonomyLinks, UpsertOutcome,
    UserId, UserPreference,
};
use tokio::sync::Mutex;

use crate::{JobpostStore, LikedPostingCache, StoreError};

/// Process-local store with the same upsert, link and listing semantics as
/// [`crate::PgStore`]. Used by tests and fixture dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    companies: Vec<Company>,
    postings: Vec<Posting>,
    keywords: BTreeMap<String, Keyword>,
    stacks: Vec<Stack>,
    posting_keywords: BTreeSet<(PostingId, String)>,
    posting_stacks: BTreeSet<(PostingId, StackId)>,
    users: BTreeMap<UserId, Coordinates>,
    likes: BTreeSet<LikedPosting>,
}

/// Flattened listing row, mirroring the Postgres listing subquery.
struct ListingRow<'a> {
    posting: &'a Posting,
    company: Option<&'a Company>,
    summary: PostingSummary,
    stack_ids: Vec<StackId>,
    updated_dtm: DateTime<Utc>,
}

impl ColumnSource for ListingRow<'_> {
    fn column_text(&self, column: Column) -> Option<Cow<'_, str>> {
        let joined = |items: &[String]| {
            if items.is_empty() {
                None
            } else {
                Some(Cow::Owned(items.join(",")))
            }
        };
        match column {
            Column::PostingId => Some(Cow::Owned(self.posting.posting_id.to_string())),
            Column::CompanyId => Some(Cow::Owned(self.posting.company_id.to_string())),
            Column::CompanyName => self.company.map(|c| Cow::Borrowed(c.company_name.as_str())),
            Column::Title => Some(Cow::Borrowed(self.posting.title.as_str())),
            Column::Content => Some(Cow::Borrowed(self.posting.content.as_str())),
            Column::OriginalSiteName => self.posting.original_site_name.as_deref().map(Cow::Borrowed),
            Column::OriginalUrl => self.posting.original_url.as_deref().map(Cow::Borrowed),
            Column::Salary => self.posting.salary.map(|s| Cow::Owned(s.to_string())),
            Column::DeadlineDtm => self.posting.deadline_dtm.map(|d| Cow::Owned(timestamp_text(&d))),
            Column::AddressUpper => self.posting.address_upper.as_deref().map(Cow::Borrowed),
            Column::AddressLower => self.posting.address_lower.as_deref().map(Cow::Borrowed),
            Column::Keywords => joined(&self.summary.keywords),
            Column::KeywordCodes => joined(&self.summary.keyword_codes),
            Column::Stacks => joined(&self.summary.stacks),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_keyword(&self, keyword_code: &str, keyword: &str) -> Keyword {
        let record = Keyword {
            keyword_code: keyword_code.to_string(),
            keyword: keyword.to_string(),
        };
        let mut state = self.state.lock().await;
        state
            .keywords
            .insert(record.keyword_code.clone(), record.clone());
        record
    }

    pub async fn insert_stack(&self, stack: &str, category: &str) -> Stack {
        let mut state = self.state.lock().await;
        let record = Stack {
            stack_id: state.stacks.len() as StackId + 1,
            stack: stack.to_string(),
            category: category.to_string(),
            stack_img_url: None,
        };
        state.stacks.push(record.clone());
        record
    }

    pub async fn set_user_location(&self, user_id: UserId, location: Coordinates) {
        self.state.lock().await.users.insert(user_id, location);
    }

    pub async fn posting(&self, posting_id: PostingId) -> Option<Posting> {
        let state = self.state.lock().await;
        state.find_posting(posting_id).cloned()
    }

    pub async fn posting_count(&self) -> usize {
        self.state.lock().await.postings.len()
    }

    pub async fn posting_links(&self, posting_id: PostingId) -> (Vec<String>, Vec<StackId>) {
        let state = self.state.lock().await;
        (state.keyword_codes_of(posting_id), state.stack_ids_of(posting_id))
    }
}

impl MemoryState {
    fn find_posting(&self, posting_id: PostingId) -> Option<&Posting> {
        self.postings.iter().find(|p| p.posting_id == posting_id)
    }

    fn company(&self, company_id: CompanyId) -> Option<&Company> {
        self.companies.iter().find(|c| c.company_id == company_id)
    }

    fn posting_by_key(&self, company_id: CompanyId, title: &str) -> Option<&Posting> {
        self.postings
            .iter()
            .find(|p| p.company_id == company_id && p.title == title)
    }

    /// Link targets must exist, as the foreign keys require in Postgres.
    fn check_links(&self, keyword_codes: &[String], stack_ids: &[StackId]) -> Result<(), StoreError> {
        if let Some(code) = keyword_codes.iter().find(|c| !self.keywords.contains_key(*c)) {
            return Err(StoreError::UnknownTaxonomy(format!("keyword {code}")));
        }
        if let Some(id) = stack_ids.iter().find(|id| self.stack(**id).is_none()) {
            return Err(StoreError::UnknownTaxonomy(format!("stack {id}")));
        }
        Ok(())
    }

    fn insert_links(&mut self, posting_id: PostingId, keyword_codes: &[String], stack_ids: &[StackId]) {
        for code in keyword_codes {
            self.posting_keywords.insert((posting_id, code.clone()));
        }
        for stack_id in stack_ids {
            self.posting_stacks.insert((posting_id, *stack_id));
        }
    }

    fn clear_links(&mut self, posting_id: PostingId) {
        self.posting_keywords.retain(|(id, _)| *id != posting_id);
        self.posting_stacks.retain(|(id, _)| *id != posting_id);
    }

    /// Fails before touching state when the company is unknown.
    fn upsert_posting(
        &mut self,
        company_id: CompanyId,
        posting: &NewPosting,
    ) -> Result<UpsertOutcome, StoreError> {
        if self.company(company_id).is_none() {
            return Err(StoreError::CompanyNotFound(company_id));
        }

        if let Some(existing) = self
            .postings
            .iter_mut()
            .find(|p| p.company_id == company_id && p.title == posting.title)
        {
            existing.salary = posting.salary;
            existing.original_img_url = posting.original_img_url.clone();
            existing.deadline_dtm = posting.deadline_dtm;
            return Ok(UpsertOutcome {
                posting_id: existing.posting_id,
                created: false,
            });
        }

        let now = Utc::now();
        let posting_id = self.postings.len() as PostingId + 1;
        self.postings.push(Posting {
            posting_id,
            company_id,
            title: posting.title.clone(),
            content: posting.content.clone(),
            salary: posting.salary,
            original_site_name: posting.original_site_name.clone(),
            original_url: posting.original_url.clone(),
            original_img_url: posting.original_img_url.clone(),
            posted_dtm: posting.posted_dtm,
            deadline_dtm: posting.deadline_dtm,
            original_address: posting.original_address.clone(),
            address_upper: posting.address_upper.clone(),
            address_lower: posting.address_lower.clone(),
            location: posting.location,
            views: 0,
            created_dtm: now,
            updated_dtm: now,
        });
        Ok(UpsertOutcome {
            posting_id,
            created: true,
        })
    }

    fn keyword_codes_of(&self, posting_id: PostingId) -> Vec<String> {
        self.posting_keywords
            .iter()
            .filter(|(id, _)| *id == posting_id)
            .map(|(_, code)| code.clone())
            .collect()
    }

    fn stack_ids_of(&self, posting_id: PostingId) -> Vec<StackId> {
        self.posting_stacks
            .iter()
            .filter(|(id, _)| *id == posting_id)
            .map(|(_, stack_id)| *stack_id)
            .collect()
    }

    fn stack(&self, stack_id: StackId) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.stack_id == stack_id)
    }

    fn listing_row<'a>(&'a self, posting: &'a Posting) -> ListingRow<'a> {
        let company = self.company(posting.company_id);
        let keyword_codes = self.keyword_codes_of(posting.posting_id);
        let keywords = keyword_codes
            .iter()
            .filter_map(|code| self.keywords.get(code))
            .map(|k| k.keyword.clone())
            .collect();
        let stack_ids = self.stack_ids_of(posting.posting_id);
        let stacks = stack_ids
            .iter()
            .filter_map(|id| self.stack(*id))
            .collect::<Vec<_>>();
        let likes_count = self
            .likes
            .iter()
            .filter(|like| like.posting_id == posting.posting_id)
            .count() as i64;

        ListingRow {
            posting,
            company,
            summary: PostingSummary {
                posting_id: posting.posting_id,
                company_name: company.map(|c| c.company_name.clone()),
                original_img_url: posting.original_img_url.clone(),
                title: posting.title.clone(),
                keywords,
                keyword_codes,
                stacks: stacks.iter().map(|s| s.stack.clone()).collect(),
                stack_img_urls: stacks
                    .iter()
                    .map(|s| s.stack_img_url.clone().unwrap_or_default())
                    .collect(),
                likes_count,
                views: posting.views,
                salary: posting.salary,
                deadline_dtm: posting.deadline_dtm,
                address_upper: posting.address_upper.clone(),
                address_lower: posting.address_lower.clone(),
                original_address: posting.original_address.clone(),
            },
            stack_ids,
            updated_dtm: posting.updated_dtm,
        }
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn compare_rows(a: &ListingRow<'_>, b: &ListingRow<'_>, sort: SortKey, order: SortOrder) -> Ordering {
    match sort {
        SortKey::Recent => directed(a.updated_dtm.cmp(&b.updated_dtm), order),
        SortKey::Popular => directed(
            (a.summary.likes_count, a.summary.views).cmp(&(b.summary.likes_count, b.summary.views)),
            order,
        ),
        // Open deadlines sort last in both directions.
        SortKey::Ending => match (a.summary.deadline_dtm, b.summary.deadline_dtm) {
            (Some(x), Some(y)) => directed(x.cmp(&y), order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

#[async_trait]
impl JobpostStore for MemoryStore {
    async fn find_company_id_by_name(&self, name: &str) -> Result<Option<CompanyId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .companies
            .iter()
            .find(|company| company.company_name == name)
            .map(|company| company.company_id))
    }

    async fn upsert_company(&self, raw: &RawCompany) -> Result<CompanyId, StoreError> {
        let mut state = self.state.lock().await;
        let next_id = state.companies.len() as CompanyId + 1;
        let entry = state
            .companies
            .iter_mut()
            .find(|company| company.company_name == raw.company_name);
        let company_id = entry
            .as_ref()
            .map(|company| company.company_id)
            .unwrap_or(next_id);
        let record = Company {
            company_id,
            company_name: raw.company_name.clone(),
            address: raw.address.clone(),
            number_employees: raw.number_employees,
            founded_year: raw.founded_year,
            image_url: raw.image_url.clone(),
            homepage_url: raw.homepage_url.clone(),
            avg_salary: raw.avg_salary,
            industry_type: raw.industry_type.clone(),
        };
        match entry {
            Some(slot) => *slot = record,
            None => state.companies.push(record),
        }
        Ok(company_id)
    }

    async fn find_keyword_by_code(&self, code: &str) -> Result<Option<Keyword>, StoreError> {
        Ok(self.state.lock().await.keywords.get(code).cloned())
    }

    async fn find_stack_by_canonical_alias(&self, alias: &str) -> Result<Option<Stack>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.stacks.iter().find(|s| s.stack == alias).cloned())
    }

    async fn upsert_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
    ) -> Result<UpsertOutcome, StoreError> {
        self.state.lock().await.upsert_posting(company_id, posting)
    }

    async fn upsert_tagged_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
        links: &TaxonomyLinks,
        policy: TaxonomyLinkPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let created = state.posting_by_key(company_id, &posting.title).is_none();
        if policy.link_writes(created).is_some() {
            state.check_links(&links.keyword_codes, &links.stack_ids)?;
        }

        let outcome = state.upsert_posting(company_id, posting)?;
        match policy.link_writes(outcome.created) {
            Some(LinkWrite::Replace) => {
                state.clear_links(outcome.posting_id);
                state.insert_links(outcome.posting_id, &links.keyword_codes, &links.stack_ids);
            }
            Some(LinkWrite::Attach) => {
                state.insert_links(outcome.posting_id, &links.keyword_codes, &links.stack_ids);
            }
            None => {}
        }
        Ok(outcome)
    }

    async fn attach_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.find_posting(posting_id).is_none() {
            return Err(StoreError::PostingNotFound(posting_id));
        }
        state.check_links(keyword_codes, stack_ids)?;
        state.insert_links(posting_id, keyword_codes, stack_ids);
        Ok(())
    }

    async fn replace_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.find_posting(posting_id).is_none() {
            return Err(StoreError::PostingNotFound(posting_id));
        }
        state.check_links(keyword_codes, stack_ids)?;
        state.clear_links(posting_id);
        state.insert_links(posting_id, keyword_codes, stack_ids);
        Ok(())
    }

    async fn user_preferences(&self, user_id: UserId) -> Result<UserPreference, StoreError> {
        let state = self.state.lock().await;
        let mut preference = UserPreference {
            user_id,
            location: state.users.get(&user_id).copied(),
            ..Default::default()
        };
        for like in state.likes.iter().filter(|like| like.user_id == user_id) {
            preference
                .stack_ids
                .extend(state.stack_ids_of(like.posting_id));
            preference
                .keyword_codes
                .extend(state.keyword_codes_of(like.posting_id));
        }
        Ok(preference)
    }

    async fn scoring_candidates(
        &self,
        stack_ids: &BTreeSet<StackId>,
    ) -> Result<Vec<CandidatePosting>, StoreError> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        for posting in &state.postings {
            let row = state.listing_row(posting);
            if !row.stack_ids.iter().any(|id| stack_ids.contains(id)) {
                continue;
            }
            out.push(CandidatePosting {
                avg_salary: row.company.and_then(|c| c.avg_salary),
                location: posting.location,
                stack_ids: row.stack_ids,
                summary: row.summary,
            });
        }
        Ok(out)
    }

    async fn filtered_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state
            .postings
            .iter()
            .map(|posting| state.listing_row(posting))
            .filter(|row| query.predicates.iter().all(|p| p.matches(row)))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| compare_rows(a, b, query.sort, query.order));

        let total_count = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|row| row.summary)
            .collect();
        Ok(PostingPage { rows, total_count })
    }

    async fn posting_detail(
        &self,
        posting_id: PostingId,
    ) -> Result<Option<PostingDetail>, StoreError> {
        let state = self.state.lock().await;
        let Some(posting) = state.find_posting(posting_id) else {
            return Ok(None);
        };
        Ok(Some(PostingDetail {
            posting: posting.clone(),
            company: state.company(posting.company_id).cloned(),
            keywords: state
                .keyword_codes_of(posting_id)
                .iter()
                .filter_map(|code| state.keywords.get(code).cloned())
                .collect(),
            stacks: state
                .stack_ids_of(posting_id)
                .iter()
                .filter_map(|id| state.stack(*id).cloned())
                .collect(),
        }))
    }

    async fn address_facets(&self) -> Result<AddressFacets, StoreError> {
        let state = self.state.lock().await;
        let mut upper = BTreeSet::new();
        let mut lower = BTreeSet::new();
        for posting in &state.postings {
            if let Some(address_upper) = &posting.address_upper {
                upper.insert(address_upper.clone());
                if let Some(address_lower) = &posting.address_lower {
                    lower.insert(AddressPair {
                        address_upper: address_upper.clone(),
                        address_lower: address_lower.clone(),
                    });
                }
            }
        }
        Ok(AddressFacets {
            address_upper: upper.into_iter().collect(),
            address_lower: lower.into_iter().collect(),
        })
    }

    async fn stack_facets(&self) -> Result<Vec<StackFacet>, StoreError> {
        let state = self.state.lock().await;
        let facets = state
            .posting_stacks
            .iter()
            .filter_map(|(_, stack_id)| state.stack(*stack_id))
            .map(|s| StackFacet {
                category: s.category.clone(),
                stack: s.stack.clone(),
            })
            .collect::<BTreeSet<_>>();
        Ok(facets.into_iter().collect())
    }

    async fn keyword_facets(&self) -> Result<Vec<KeywordFacet>, StoreError> {
        let state = self.state.lock().await;
        let used = state
            .posting_keywords
            .iter()
            .map(|(_, code)| code.as_str())
            .collect::<BTreeSet<_>>();
        let mut facets = used
            .into_iter()
            .filter_map(|code| state.keywords.get(code))
            .map(|k| KeywordFacet {
                keyword_code: k.keyword_code.clone(),
                keyword: k.keyword.clone(),
            })
            .collect::<Vec<_>>();
        facets.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        Ok(facets)
    }

    async fn add_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.find_posting(posting_id).is_none() {
            return Err(StoreError::PostingNotFound(posting_id));
        }
        if !state.likes.insert(LikedPosting {
            user_id,
            posting_id,
        }) {
            return Err(StoreError::Conflict(format!(
                "user {user_id} already likes posting {posting_id}"
            )));
        }
        Ok(())
    }

    async fn remove_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError> {
        self.state.lock().await.likes.remove(&LikedPosting {
            user_id,
            posting_id,
        });
        Ok(())
    }
}

#[async_trait]
impl LikedPostingCache for MemoryStore {
    async fn all_liked_postings(&self) -> Result<Vec<LikedPosting>, StoreError> {
        Ok(self.state.lock().await.likes.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfit_core::Predicate;

    fn new_posting(title: &str, salary: Option<i64>) -> NewPosting {
        NewPosting {
            title: title.to_string(),
            content: "content".to_string(),
            salary,
            original_site_name: Some("wanted".into()),
            original_url: Some(format!("https://example.test/{title}")),
            original_img_url: Some("https://img.test/a.png".into()),
            posted_dtm: None,
            deadline_dtm: None,
            original_address: Some("서울 강남구".into()),
            address_upper: Some("서울".into()),
            address_lower: Some("강남구".into()),
            location: None,
        }
    }

    async fn store_with_company() -> (MemoryStore, CompanyId) {
        let store = MemoryStore::new();
        let id = store
            .upsert_company(&RawCompany {
                company_name: "Acme".into(),
                ..Default::default()
            })
            .await
            .expect("company");
        (store, id)
    }

    #[tokio::test]
    async fn upsert_on_existing_key_touches_only_salary_image_and_deadline() {
        let (store, company_id) = store_with_company().await;
        let first = store
            .upsert_posting(company_id, &new_posting("Backend", Some(5000)))
            .await
            .expect("insert");
        assert!(first.created);

        let mut again = new_posting("Backend", Some(6000));
        again.content = "changed".into();
        again.original_img_url = Some("https://img.test/b.png".into());
        let second = store.upsert_posting(company_id, &again).await.expect("update");
        assert!(!second.created);
        assert_eq!(first.posting_id, second.posting_id);

        let stored = store.posting(first.posting_id).await.expect("stored");
        assert_eq!(stored.salary, Some(6000));
        assert_eq!(stored.original_img_url.as_deref(), Some("https://img.test/b.png"));
        assert_eq!(stored.content, "content");
        assert_eq!(store.posting_count().await, 1);
    }

    #[tokio::test]
    async fn ending_ascending_with_not_null_drops_open_deadlines() {
        let (store, company_id) = store_with_company().await;
        let mut with_deadline = new_posting("A", None);
        with_deadline.deadline_dtm = Some(Utc::now());
        store.upsert_posting(company_id, &with_deadline).await.expect("a");
        store.upsert_posting(company_id, &new_posting("B", None)).await.expect("b");

        let page = store
            .filtered_postings(&PostingQuery {
                predicates: vec![Predicate::NotNull {
                    column: Column::DeadlineDtm,
                }],
                sort: SortKey::Ending,
                order: SortOrder::Asc,
                limit: 10,
                offset: 0,
            })
            .await
            .expect("page");
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].title, "A");

        let page = store
            .filtered_postings(&PostingQuery {
                predicates: vec![],
                sort: SortKey::Ending,
                order: SortOrder::Desc,
                limit: 10,
                offset: 0,
            })
            .await
            .expect("page");
        assert_eq!(
            page.rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn tagged_upsert_writes_nothing_when_a_link_is_rejected() {
        let (store, company_id) = store_with_company().await;
        store.insert_keyword("BE", "백엔드").await;
        let python = store.insert_stack("Python", "Language").await.stack_id;

        let bad = TaxonomyLinks {
            keyword_codes: vec!["BE".into()],
            stack_ids: vec![python, 99],
        };
        let err = store
            .upsert_tagged_posting(
                company_id,
                &new_posting("Backend", None),
                &bad,
                TaxonomyLinkPolicy::AttachOnCreate,
            )
            .await
            .expect_err("unknown stack");
        assert!(matches!(err, StoreError::UnknownTaxonomy(_)));
        assert_eq!(store.posting_count().await, 0);

        let good = TaxonomyLinks {
            keyword_codes: vec!["BE".into()],
            stack_ids: vec![python],
        };
        let outcome = store
            .upsert_tagged_posting(
                company_id,
                &new_posting("Backend", None),
                &good,
                TaxonomyLinkPolicy::AttachOnCreate,
            )
            .await
            .expect("retry");
        assert!(outcome.created);
        assert_eq!(
            store.posting_links(outcome.posting_id).await,
            (vec!["BE".to_string()], vec![python])
        );
    }

    #[tokio::test]
    async fn attach_on_create_leaves_existing_links_alone() {
        let (store, company_id) = store_with_company().await;
        let python = store.insert_stack("Python", "Language").await.stack_id;
        let go = store.insert_stack("Go", "Language").await.stack_id;
        let links = |id| TaxonomyLinks {
            keyword_codes: vec![],
            stack_ids: vec![id],
        };

        let first = store
            .upsert_tagged_posting(
                company_id,
                &new_posting("Backend", None),
                &links(python),
                TaxonomyLinkPolicy::AttachOnCreate,
            )
            .await
            .expect("create");
        store
            .upsert_tagged_posting(
                company_id,
                &new_posting("Backend", Some(1)),
                &links(go),
                TaxonomyLinkPolicy::AttachOnCreate,
            )
            .await
            .expect("update");
        assert_eq!(store.posting_links(first.posting_id).await.1, vec![python]);

        store
            .upsert_tagged_posting(
                company_id,
                &new_posting("Backend", Some(2)),
                &links(go),
                TaxonomyLinkPolicy::ReplaceOnUpdate,
            )
            .await
            .expect("replace");
        assert_eq!(store.posting_links(first.posting_id).await.1, vec![go]);
    }

    #[tokio::test]
    async fn deadline_equality_uses_whole_second_utc_text() {
        let (store, company_id) = store_with_company().await;
        let mut posting = new_posting("A", None);
        posting.deadline_dtm = Some(
            DateTime::parse_from_rfc3339("2026-11-30T23:59:59.999+09:00")
                .expect("deadline")
                .with_timezone(&Utc),
        );
        store.upsert_posting(company_id, &posting).await.expect("a");

        let page = store
            .filtered_postings(&PostingQuery {
                predicates: vec![Predicate::eq(Column::DeadlineDtm, "2026-11-30T14:59:59+00:00")],
                sort: SortKey::Recent,
                order: SortOrder::Desc,
                limit: 10,
                offset: 0,
            })
            .await
            .expect("page");
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn duplicate_like_is_a_conflict_and_unlike_is_idempotent() {
        let (store, company_id) = store_with_company().await;
        let outcome = store
            .upsert_posting(company_id, &new_posting("A", None))
            .await
            .expect("posting");
        store.add_like(7, outcome.posting_id).await.expect("like");
        assert!(matches!(
            store.add_like(7, outcome.posting_id).await,
            Err(StoreError::Conflict(_))
        ));
        store.remove_like(7, outcome.posting_id).await.expect("unlike");
        store.remove_like(7, outcome.posting_id).await.expect("unlike again");
        assert!(store.all_liked_postings().await.expect("likes").is_empty());
    }
}
