//! Translation of caller filter options into a typed [`PostingQuery`].

use std::collections::BTreeMap;

use jobfit_core::{Column, PostingQuery, Predicate, SortKey, SortOrder};

use crate::QueryError;

pub const STACK_FILTER: &str = "stack";
pub const KEYWORD_CODE_FILTER: &str = "keywordCode";
pub const SEARCH_FILTER: &str = "search";
pub const PAGE_FILTER: &str = "page";

/// Columns a free-text search term is matched against.
pub const SEARCH_COLUMNS: [Column; 7] = [
    Column::CompanyName,
    Column::Title,
    Column::Keywords,
    Column::Stacks,
    Column::AddressUpper,
    Column::AddressLower,
    Column::Content,
];

/// Requested browsing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseSort {
    Recommended,
    Listing(SortKey),
}

impl BrowseSort {
    /// Unknown or absent values fall back to `recent`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("recommended") => Self::Recommended,
            Some("popular") => Self::Listing(SortKey::Popular),
            Some("ending") => Self::Listing(SortKey::Ending),
            _ => Self::Listing(SortKey::Recent),
        }
    }
}

fn split_terms(value: &str, separator: char) -> impl Iterator<Item = &str> {
    value.split(separator).map(str::trim).filter(|t| !t.is_empty())
}

/// Builds the listing query. `page` overrides `offset`; every other unrecognized key
/// must name a listing column and becomes an equality predicate.
pub fn build_posting_query(
    sort: SortKey,
    order: SortOrder,
    limit: u32,
    offset: u32,
    filters: &BTreeMap<String, String>,
) -> Result<PostingQuery, QueryError> {
    let mut query = PostingQuery {
        predicates: Vec::new(),
        sort,
        order,
        limit,
        offset,
    };

    if sort == SortKey::Ending && order == SortOrder::Asc {
        query.predicates.push(Predicate::NotNull {
            column: Column::DeadlineDtm,
        });
    }

    for (key, value) in filters {
        match key.as_str() {
            STACK_FILTER => query.predicates.extend(
                split_terms(value, ',').map(|term| Predicate::contains(Column::Stacks, term)),
            ),
            KEYWORD_CODE_FILTER => query.predicates.extend(
                split_terms(value, ',')
                    .map(|term| Predicate::contains(Column::KeywordCodes, term)),
            ),
            SEARCH_FILTER => {
                for term in value.split_whitespace() {
                    query.predicates.push(Predicate::Any(
                        SEARCH_COLUMNS
                            .iter()
                            .map(|column| Predicate::contains(*column, term))
                            .collect(),
                    ));
                }
            }
            PAGE_FILTER => {
                let page: u32 = value.trim().parse().map_err(|_| QueryError::InvalidFilter {
                    key: key.clone(),
                    value: value.clone(),
                })?;
                query.offset = page.saturating_sub(1).saturating_mul(limit);
            }
            other => {
                let column = Column::from_name(other)
                    .ok_or_else(|| QueryError::UnknownFilter(other.to_string()))?;
                query.predicates.push(Predicate::eq(column, value.clone()));
            }
        }
    }

    Ok(query)
}
