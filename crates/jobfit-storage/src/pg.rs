use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfit_core::{
    AddressFacets, AddressPair, CandidatePosting, Column, Company, CompanyId, Coordinates, Keyword,
    KeywordFacet, LikedPosting, LinkWrite, NewPosting, Posting, PostingDetail, PostingId,
    PostingPage, PostingQuery, PostingSummary, Predicate, RawCompany, SortKey, SortOrder, Stack,
    StackFacet, StackId, TaxonomyLinkPolicy, TaxonomyLinks, UpsertOutcome, UserId,
    UserPreference,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use tracing::info;

use crate::{JobpostStore, LikedPostingCache, StoreError};

/// Flattened listing row: one row per posting with keyword/stack lists and their
/// comma-joined forms (the latter are what `stack`/`keywordCode`/`search` filters
/// match against).
const LISTING_SOURCE: &str = r#"(
    SELECT j.jobpost_id,
           j.company_id,
           c.company_name,
           j.title,
           j.content,
           j.original_site_name,
           j.original_url,
           j.original_img_url,
           j.salary,
           j.deadline_dtm,
           j.updated_dtm,
           j.views,
           j.address_upper,
           j.address_lower,
           j.original_address,
           j.latitude,
           j.longitude,
           c.avg_salary,
           COALESCE(k.keyword_codes, ARRAY[]::text[]) AS keyword_code_list,
           COALESCE(k.keywords, ARRAY[]::text[]) AS keyword_list,
           COALESCE(s.stack_ids, ARRAY[]::bigint[]) AS stack_id_list,
           COALESCE(s.stacks, ARRAY[]::text[]) AS stack_list,
           COALESCE(s.stack_img_urls, ARRAY[]::text[]) AS stack_img_url_list,
           array_to_string(k.keyword_codes, ',') AS keyword_codes,
           array_to_string(k.keywords, ',') AS keywords,
           array_to_string(s.stacks, ',') AS stacks,
           COALESCE(l.likes_count, 0) AS likes_count
      FROM jobpost j
      JOIN company c ON c.company_id = j.company_id
      LEFT JOIN (
            SELECT jk.jobpost_id,
                   array_agg(jk.keyword_code ORDER BY jk.keyword_code) AS keyword_codes,
                   array_agg(ky.keyword ORDER BY jk.keyword_code) AS keywords
              FROM jobpostkeyword jk
              JOIN keyword ky ON ky.keyword_code = jk.keyword_code
             GROUP BY jk.jobpost_id
      ) k ON k.jobpost_id = j.jobpost_id
      LEFT JOIN (
            SELECT js.jobpost_id,
                   array_agg(js.stack_id ORDER BY js.stack_id) AS stack_ids,
                   array_agg(st.stack ORDER BY js.stack_id) AS stacks,
                   array_agg(COALESCE(st.stack_img_url, '') ORDER BY js.stack_id) AS stack_img_urls
              FROM jobpoststack js
              JOIN stack st ON st.stack_id = js.stack_id
             GROUP BY js.jobpost_id
      ) s ON s.jobpost_id = j.jobpost_id
      LEFT JOIN (
            SELECT jobpost_id, COUNT(*) AS likes_count
              FROM likedjobpost
             GROUP BY jobpost_id
      ) l ON l.jobpost_id = j.jobpost_id
) p"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Page query for the filtered listing.
pub fn build_listing_query(query: &PostingQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {LISTING_SOURCE}"));
    push_where(&mut qb, &query.predicates);
    push_order(&mut qb, query.sort, query.order);
    qb.push(" LIMIT ")
        .push_bind(i64::from(query.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(query.offset));
    qb
}

/// Count of the filtered listing before pagination.
pub fn build_count_query(query: &PostingQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) AS total_count FROM {LISTING_SOURCE}"
    ));
    push_where(&mut qb, &query.predicates);
    qb
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, predicates: &[Predicate]) {
    if predicates.is_empty() {
        return;
    }
    qb.push(" WHERE ");
    for (idx, predicate) in predicates.iter().enumerate() {
        if idx > 0 {
            qb.push(" AND ");
        }
        push_predicate(qb, predicate);
    }
}

/// Renders `deadline_dtm` in the same text form as `jobfit_core::timestamp_text`.
const DEADLINE_TEXT: &str =
    r#"to_char(p.deadline_dtm AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"+00:00"')"#;

fn push_predicate(qb: &mut QueryBuilder<'static, Postgres>, predicate: &Predicate) {
    match predicate {
        Predicate::Eq { column, value } => {
            if *column == Column::DeadlineDtm {
                qb.push(DEADLINE_TEXT);
            } else {
                qb.push("CAST(p.").push(column.name()).push(" AS TEXT)");
            }
            qb.push(" = ").push_bind(value.clone());
        }
        Predicate::Contains { column, needle } => {
            if *column == Column::DeadlineDtm {
                qb.push(DEADLINE_TEXT);
            } else {
                qb.push("p.").push(column.name());
            }
            qb.push(" ILIKE ").push_bind(like_pattern(needle));
        }
        Predicate::NotNull { column } => {
            qb.push("p.").push(column.name()).push(" IS NOT NULL");
        }
        Predicate::All(items) => push_group(qb, items, " AND ", "TRUE"),
        Predicate::Any(items) => push_group(qb, items, " OR ", "FALSE"),
    }
}

fn push_group(
    qb: &mut QueryBuilder<'static, Postgres>,
    items: &[Predicate],
    separator: &str,
    empty: &str,
) {
    if items.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            qb.push(separator);
        }
        push_predicate(qb, item);
    }
    qb.push(")");
}

fn push_order(qb: &mut QueryBuilder<'static, Postgres>, sort: SortKey, order: SortOrder) {
    let dir = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    qb.push(" ORDER BY ");
    match sort {
        SortKey::Recent => {
            qb.push(format!("p.updated_dtm {dir}"));
        }
        SortKey::Popular => {
            qb.push(format!("p.likes_count {dir}, p.views {dir}"));
        }
        SortKey::Ending => {
            qb.push(format!("p.deadline_dtm {dir} NULLS LAST"));
        }
    }
    qb.push(", p.jobpost_id ASC");
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn location_from_row(row: &PgRow) -> Result<Option<Coordinates>, sqlx::Error> {
    Ok(Coordinates::from_parts(
        row.try_get("latitude")?,
        row.try_get("longitude")?,
    ))
}

fn summary_from_row(row: &PgRow) -> Result<PostingSummary, sqlx::Error> {
    Ok(PostingSummary {
        posting_id: row.try_get("jobpost_id")?,
        company_name: row.try_get("company_name")?,
        original_img_url: row.try_get("original_img_url")?,
        title: row.try_get("title")?,
        keywords: row.try_get("keyword_list")?,
        keyword_codes: row.try_get("keyword_code_list")?,
        stacks: row.try_get("stack_list")?,
        stack_img_urls: row.try_get("stack_img_url_list")?,
        likes_count: row.try_get("likes_count")?,
        views: row.try_get("views")?,
        salary: row.try_get("salary")?,
        deadline_dtm: row.try_get("deadline_dtm")?,
        address_upper: row.try_get("address_upper")?,
        address_lower: row.try_get("address_lower")?,
        original_address: row.try_get("original_address")?,
    })
}

fn posting_from_row(row: &PgRow) -> Result<Posting, sqlx::Error> {
    Ok(Posting {
        posting_id: row.try_get("jobpost_id")?,
        company_id: row.try_get("company_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        salary: row.try_get("salary")?,
        original_site_name: row.try_get("original_site_name")?,
        original_url: row.try_get("original_url")?,
        original_img_url: row.try_get("original_img_url")?,
        posted_dtm: row.try_get("posted_dtm")?,
        deadline_dtm: row.try_get("deadline_dtm")?,
        original_address: row.try_get("original_address")?,
        address_upper: row.try_get("address_upper")?,
        address_lower: row.try_get("address_lower")?,
        location: location_from_row(row)?,
        views: row.try_get("views")?,
        created_dtm: row.try_get::<DateTime<Utc>, _>("created_dtm")?,
        updated_dtm: row.try_get::<DateTime<Utc>, _>("updated_dtm")?,
    })
}

fn stack_from_row(row: &PgRow) -> Result<Stack, sqlx::Error> {
    Ok(Stack {
        stack_id: row.try_get("stack_id")?,
        stack: row.try_get("stack")?,
        category: row.try_get("category")?,
        stack_img_url: row.try_get("stack_img_url")?,
    })
}

/// Single-statement insert-or-update keyed on (company, title).
async fn upsert_posting_row(
    conn: &mut PgConnection,
    company_id: CompanyId,
    posting: &NewPosting,
) -> Result<UpsertOutcome, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO jobpost (
            company_id, title, content, salary, original_site_name, original_url,
            original_img_url, posted_dtm, deadline_dtm, original_address,
            address_upper, address_lower, longitude, latitude
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (company_id, title) DO UPDATE
           SET salary = EXCLUDED.salary,
               original_img_url = EXCLUDED.original_img_url,
               deadline_dtm = EXCLUDED.deadline_dtm
        RETURNING jobpost_id, (xmax = 0) AS created
        "#,
    )
    .bind(company_id)
    .bind(&posting.title)
    .bind(&posting.content)
    .bind(posting.salary)
    .bind(&posting.original_site_name)
    .bind(&posting.original_url)
    .bind(&posting.original_img_url)
    .bind(posting.posted_dtm)
    .bind(posting.deadline_dtm)
    .bind(&posting.original_address)
    .bind(&posting.address_upper)
    .bind(&posting.address_lower)
    .bind(posting.location.map(|c| c.longitude))
    .bind(posting.location.map(|c| c.latitude))
    .fetch_one(&mut *conn)
    .await?;

    Ok(UpsertOutcome {
        posting_id: row.try_get("jobpost_id")?,
        created: row.try_get("created")?,
    })
}

async fn delete_links(conn: &mut PgConnection, posting_id: PostingId) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM jobpostkeyword WHERE jobpost_id = $1")
        .bind(posting_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM jobpoststack WHERE jobpost_id = $1")
        .bind(posting_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_links(
    conn: &mut PgConnection,
    posting_id: PostingId,
    keyword_codes: &[String],
    stack_ids: &[StackId],
) -> Result<(), sqlx::Error> {
    if !keyword_codes.is_empty() {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO jobpostkeyword (jobpost_id, keyword_code) ",
        );
        qb.push_values(keyword_codes, |mut b, code| {
            b.push_bind(posting_id).push_bind(code.clone());
        });
        qb.push(" ON CONFLICT (jobpost_id, keyword_code) DO NOTHING");
        qb.build().execute(&mut *conn).await?;
    }

    if !stack_ids.is_empty() {
        let mut qb =
            QueryBuilder::<Postgres>::new("INSERT INTO jobpoststack (jobpost_id, stack_id) ");
        qb.push_values(stack_ids, |mut b, stack_id| {
            b.push_bind(posting_id).push_bind(*stack_id);
        });
        qb.push(" ON CONFLICT (jobpost_id, stack_id) DO NOTHING");
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait]
impl JobpostStore for PgStore {
    async fn find_company_id_by_name(&self, name: &str) -> Result<Option<CompanyId>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT company_id FROM company WHERE company_name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_company(&self, company: &RawCompany) -> Result<CompanyId, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO company (
                company_name, representative_name, number_employees, address, founded_year,
                image_url, homepage_url, annual_sales, avg_salary, kreditjob_url, industry_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (company_name) DO UPDATE
               SET representative_name = EXCLUDED.representative_name,
                   number_employees = EXCLUDED.number_employees,
                   address = EXCLUDED.address,
                   founded_year = EXCLUDED.founded_year,
                   image_url = EXCLUDED.image_url,
                   homepage_url = EXCLUDED.homepage_url,
                   annual_sales = EXCLUDED.annual_sales,
                   avg_salary = EXCLUDED.avg_salary,
                   kreditjob_url = EXCLUDED.kreditjob_url,
                   industry_type = EXCLUDED.industry_type
            RETURNING company_id
            "#,
        )
        .bind(&company.company_name)
        .bind(&company.representative_name)
        .bind(company.number_employees)
        .bind(&company.address)
        .bind(company.founded_year)
        .bind(&company.image_url)
        .bind(&company.homepage_url)
        .bind(company.annual_sales)
        .bind(company.avg_salary)
        .bind(&company.kreditjob_url)
        .bind(&company.industry_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_keyword_by_code(&self, code: &str) -> Result<Option<Keyword>, StoreError> {
        let row = sqlx::query("SELECT keyword_code, keyword FROM keyword WHERE keyword_code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<Keyword, StoreError> {
            Ok(Keyword {
                keyword_code: row.try_get("keyword_code")?,
                keyword: row.try_get("keyword")?,
            })
        })
        .transpose()
    }

    async fn find_stack_by_canonical_alias(&self, alias: &str) -> Result<Option<Stack>, StoreError> {
        let row = sqlx::query(
            "SELECT stack_id, stack, category, stack_img_url FROM stack WHERE stack = $1",
        )
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(stack_from_row).transpose()?)
    }

    async fn upsert_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(upsert_posting_row(&mut *conn, company_id, posting).await?)
    }

    async fn upsert_tagged_posting(
        &self,
        company_id: CompanyId,
        posting: &NewPosting,
        links: &TaxonomyLinks,
        policy: TaxonomyLinkPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let outcome = upsert_posting_row(&mut *tx, company_id, posting).await?;
        match policy.link_writes(outcome.created) {
            Some(LinkWrite::Replace) => {
                delete_links(&mut *tx, outcome.posting_id).await?;
                insert_links(&mut *tx, outcome.posting_id, &links.keyword_codes, &links.stack_ids)
                    .await?;
            }
            Some(LinkWrite::Attach) => {
                insert_links(&mut *tx, outcome.posting_id, &links.keyword_codes, &links.stack_ids)
                    .await?;
            }
            None => {}
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn attach_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_links(&mut *conn, posting_id, keyword_codes, stack_ids).await?;
        Ok(())
    }

    async fn replace_taxonomy(
        &self,
        posting_id: PostingId,
        keyword_codes: &[String],
        stack_ids: &[StackId],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        delete_links(&mut *tx, posting_id).await?;
        insert_links(&mut *tx, posting_id, keyword_codes, stack_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn user_preferences(&self, user_id: UserId) -> Result<UserPreference, StoreError> {
        let location = sqlx::query("SELECT latitude, longitude FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| location_from_row(&row))
            .transpose()?
            .flatten();

        let stack_ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT js.stack_id
              FROM likedjobpost l
              JOIN jobpoststack js ON js.jobpost_id = l.jobpost_id
             WHERE l.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let keyword_codes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT jk.keyword_code
              FROM likedjobpost l
              JOIN jobpostkeyword jk ON jk.jobpost_id = l.jobpost_id
             WHERE l.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(UserPreference {
            user_id,
            location,
            stack_ids: stack_ids.into_iter().collect(),
            keyword_codes: keyword_codes.into_iter().collect(),
        })
    }

    async fn scoring_candidates(
        &self,
        stack_ids: &BTreeSet<StackId>,
    ) -> Result<Vec<CandidatePosting>, StoreError> {
        if stack_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT * FROM {LISTING_SOURCE} WHERE p.stack_id_list && "
        ));
        qb.push_bind(stack_ids.iter().copied().collect::<Vec<i64>>());
        qb.push(" ORDER BY p.jobpost_id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(CandidatePosting {
                summary: summary_from_row(&row)?,
                stack_ids: row.try_get("stack_id_list")?,
                location: location_from_row(&row)?,
                avg_salary: row.try_get("avg_salary")?,
            });
        }
        Ok(out)
    }

    async fn filtered_postings(&self, query: &PostingQuery) -> Result<PostingPage, StoreError> {
        let rows = build_listing_query(query)
            .build()
            .fetch_all(&self.pool)
            .await?;
        let total_count: i64 = build_count_query(query)
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total_count")?;

        let rows = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PostingPage {
            rows,
            total_count: u64::try_from(total_count).unwrap_or_default(),
        })
    }

    async fn posting_detail(
        &self,
        posting_id: PostingId,
    ) -> Result<Option<PostingDetail>, StoreError> {
        let Some(row) = sqlx::query(
            r#"
            SELECT jobpost_id, company_id, title, content, salary, original_site_name,
                   original_url, original_img_url, posted_dtm, deadline_dtm, original_address,
                   address_upper, address_lower, longitude, latitude, views,
                   created_dtm, updated_dtm
              FROM jobpost
             WHERE jobpost_id = $1
            "#,
        )
        .bind(posting_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let posting = posting_from_row(&row)?;

        let company = sqlx::query(
            r#"
            SELECT company_id, company_name, address, number_employees, founded_year,
                   image_url, homepage_url, avg_salary, industry_type
              FROM company
             WHERE company_id = $1
            "#,
        )
        .bind(posting.company_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| -> Result<Company, sqlx::Error> {
            Ok(Company {
                company_id: row.try_get("company_id")?,
                company_name: row.try_get("company_name")?,
                address: row.try_get("address")?,
                number_employees: row.try_get("number_employees")?,
                founded_year: row.try_get("founded_year")?,
                image_url: row.try_get("image_url")?,
                homepage_url: row.try_get("homepage_url")?,
                avg_salary: row.try_get("avg_salary")?,
                industry_type: row.try_get("industry_type")?,
            })
        })
        .transpose()?;

        let keywords = sqlx::query(
            r#"
            SELECT k.keyword_code, k.keyword
              FROM jobpostkeyword jk
              JOIN keyword k ON k.keyword_code = jk.keyword_code
             WHERE jk.jobpost_id = $1
             ORDER BY k.keyword_code
            "#,
        )
        .bind(posting_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<Keyword, sqlx::Error> {
            Ok(Keyword {
                keyword_code: row.try_get("keyword_code")?,
                keyword: row.try_get("keyword")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        let stacks = sqlx::query(
            r#"
            SELECT s.stack_id, s.stack, s.category, s.stack_img_url
              FROM jobpoststack js
              JOIN stack s ON s.stack_id = js.stack_id
             WHERE js.jobpost_id = $1
             ORDER BY s.stack_id
            "#,
        )
        .bind(posting_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(stack_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PostingDetail {
            posting,
            company,
            keywords,
            stacks,
        }))
    }

    async fn address_facets(&self) -> Result<AddressFacets, StoreError> {
        let address_upper = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT address_upper
              FROM jobpost
             WHERE address_upper IS NOT NULL
             ORDER BY address_upper ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let address_lower = sqlx::query(
            r#"
            SELECT DISTINCT address_upper, address_lower
              FROM jobpost
             WHERE address_lower IS NOT NULL AND address_upper IS NOT NULL
             ORDER BY address_upper ASC, address_lower ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<AddressPair, sqlx::Error> {
            Ok(AddressPair {
                address_upper: row.try_get("address_upper")?,
                address_lower: row.try_get("address_lower")?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(AddressFacets {
            address_upper,
            address_lower,
        })
    }

    async fn stack_facets(&self) -> Result<Vec<StackFacet>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT s.category, s.stack
              FROM jobpoststack js
              JOIN stack s ON s.stack_id = js.stack_id
             ORDER BY s.category ASC, s.stack ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(StackFacet {
                category: row.try_get("category")?,
                stack: row.try_get("stack")?,
            });
        }
        Ok(out)
    }

    async fn keyword_facets(&self) -> Result<Vec<KeywordFacet>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT k.keyword_code, k.keyword
              FROM jobpostkeyword jk
              JOIN keyword k ON k.keyword_code = jk.keyword_code
             ORDER BY k.keyword ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(KeywordFacet {
                keyword_code: row.try_get("keyword_code")?,
                keyword: row.try_get("keyword")?,
            });
        }
        Ok(out)
    }

    async fn add_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO likedjobpost (jobpost_id, user_id) VALUES ($1, $2)")
            .bind(posting_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_like(&self, user_id: UserId, posting_id: PostingId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM likedjobpost WHERE jobpost_id = $1 AND user_id = $2")
            .bind(posting_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LikedPostingCache for PgStore {
    async fn all_liked_postings(&self) -> Result<Vec<LikedPosting>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, jobpost_id FROM likedjobpost ORDER BY user_id, jobpost_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(LikedPosting {
                user_id: row.try_get("user_id")?,
                posting_id: row.try_get("jobpost_id")?,
            });
        }
        Ok(out)
    }
}
