//! Change-list queries: search, filters, ordering and pagination over one
//! entity table, driven entirely by its [`EntityAdmin`] record.

use super::display::{self, render_value, EMPTY_VALUE};
use super::registry::{ColumnKind, EntityAdmin, Filter, FilterKind, BOOLEAN_CHOICES, LIST_PER_PAGE};
use super::AdminError;
use crate::domain::{parse_bool, FieldValue, Record};
use crate::scoring::format_score;
use crate::store::{dispatch, Conn, StoreError};
use serde::Serialize;
use sqlx::{Database, Encode, QueryBuilder, Type};
use std::collections::HashMap;

const SEARCH_PARAM: &str = "q";
const ORDER_PARAM: &str = "o";
const PAGE_PARAM: &str = "p";

/// Raw query-string parameters of a change-list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl ListParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let (key, value) = (key.into(), value.into());
            match key.as_str() {
                SEARCH_PARAM => params.search = Some(value),
                ORDER_PARAM => params.ordering = Some(value),
                PAGE_PARAM => params.page = Some(value),
                _ => params.filters.push((key, value)),
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone)]
struct AppliedFilter {
    filter: &'static Filter,
    raw: String,
    value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderTerm {
    column: &'static str,
    sort: &'static str,
    descending: bool,
}

/// Validated form of [`ListParams`] for one entity.
#[derive(Debug, Clone)]
pub struct Criteria {
    admin: &'static EntityAdmin,
    search: Option<String>,
    terms: Vec<String>,
    filters: Vec<AppliedFilter>,
    ordering: Vec<OrderTerm>,
    page: i64,
}

impl Criteria {
    pub fn parse(admin: &'static EntityAdmin, params: &ListParams) -> Result<Self, AdminError> {
        let search = params
            .search
            .as_ref()
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty());
        let terms = search.as_deref().map(split_terms).unwrap_or_default();

        let mut filters = Vec::with_capacity(params.filters.len());
        for (param, raw) in &params.filters {
            let filter = admin.filter(param).ok_or_else(|| {
                AdminError::InvalidLookup(format!("'{param}' is not a filter on {}", admin.kind))
            })?;
            filters.push(AppliedFilter {
                filter,
                raw: raw.clone(),
                value: filter_value(filter, raw)?,
            });
        }

        let requested = params
            .ordering
            .as_deref()
            .map(str::trim)
            .filter(|ordering| !ordering.is_empty());
        let ordering = match requested {
            Some(raw) => parse_ordering(admin, raw.split(','))?,
            None => parse_ordering(admin, admin.ordering.iter().copied())?,
        };

        let page = match params.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| AdminError::InvalidLookup(format!("invalid page '{raw}'")))?,
        };

        Ok(Self {
            admin,
            search,
            terms,
            filters,
            ordering,
            page,
        })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    /// `FROM`, joins and `WHERE` clause shared by the count and page queries.
    fn push_from_where<'args, DB>(&self, query: &mut QueryBuilder<'args, DB>)
    where
        DB: Database,
        String: Encode<'args, DB> + Type<DB>,
        bool: Encode<'args, DB> + Type<DB>,
    {
        query.push(format!(
            " FROM {} t {} WHERE 1 = 1",
            self.admin.kind.table(),
            self.admin.joins_sql()
        ));
        push_search(query, self.admin, &self.terms);

        for applied in &self.filters {
            query.push(" AND ").push(applied.filter.expr).push(" = ");
            match &applied.value {
                FilterValue::Text(value) => query.push_bind(value.clone()),
                FilterValue::Bool(value) => query.push_bind(*value),
            };
        }
    }

    fn push_order_by<DB: Database>(&self, query: &mut QueryBuilder<'_, DB>) {
        query.push(" ORDER BY ");
        for term in &self.ordering {
            query
                .push(term.sort)
                .push(if term.descending { " DESC, " } else { " ASC, " });
        }
        query.push("t.id DESC");
    }
}

/// Adds one `AND (field LIKE … OR …)` group per search term. Matching is
/// case-insensitive on both engines.
pub(crate) fn push_search<'args, DB>(query: &mut QueryBuilder<'args, DB>, admin: &EntityAdmin, terms: &[String])
where
    DB: Database,
    String: Encode<'args, DB> + Type<DB>,
{
    if admin.search_fields.is_empty() {
        return;
    }
    for term in terms {
        let pattern = format!("%{}%", escape_like(term));
        query.push(" AND (");
        for (index, field) in admin.search_fields.iter().enumerate() {
            if index > 0 {
                query.push(" OR ");
            }
            query
                .push("LOWER(")
                .push(field.expr)
                .push(") LIKE LOWER(")
                .push_bind(pattern.clone())
                .push(") ESCAPE '\\'");
        }
        query.push(")");
    }
}

/// Splits on whitespace, keeping double-quoted phrases together.
pub fn split_terms(search: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in search.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                if !quoted && !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn filter_value(filter: &Filter, raw: &str) -> Result<FilterValue, AdminError> {
    let invalid = || AdminError::InvalidLookup(format!("invalid value '{raw}' for filter '{}'", filter.param));
    match filter.kind {
        FilterKind::Boolean => parse_bool(raw).map(FilterValue::Bool).ok_or_else(invalid),
        FilterKind::Choice(choices) => {
            let code = raw.trim();
            if choices.iter().any(|(value, _)| *value == code) {
                Ok(FilterValue::Text(code.to_string()))
            } else {
                Err(invalid())
            }
        }
        FilterKind::Values => Ok(FilterValue::Text(raw.to_string())),
    }
}

fn parse_ordering<'a>(
    admin: &EntityAdmin,
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<OrderTerm>, AdminError> {
    let mut terms = Vec::new();
    for raw in names.map(str::trim).filter(|name| !name.is_empty()) {
        let (name, descending) = match raw.strip_prefix('-') {
            Some(name) => (name, true),
            None => (raw, false),
        };
        let column = admin
            .column(name)
            .filter(|column| column.sort.is_some())
            .ok_or_else(|| AdminError::InvalidLookup(format!("cannot order {} by '{name}'", admin.kind)))?;
        if terms.iter().any(|term: &OrderTerm| term.column == column.name) {
            continue;
        }
        terms.push(OrderTerm {
            column: column.name,
            sort: column.sort.unwrap_or("t.id"),
            descending,
        });
    }
    Ok(terms)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    pub name: &'static str,
    pub label: &'static str,
    pub sortable: bool,
    /// `asc`/`desc` when the list is currently ordered by this column.
    pub sorted: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeListRow {
    pub id: i64,
    pub label: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterChoice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterView {
    pub param: &'static str,
    pub label: &'static str,
    pub choices: Vec<FilterChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionView {
    pub name: &'static str,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeList {
    pub entity: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    pub search: Option<String>,
    pub searchable: bool,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<ChangeListRow>,
    /// Rows matching the search and filters.
    pub result_count: i64,
    /// Rows in the table regardless of search and filters.
    pub full_count: i64,
    pub page: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub filters: Vec<FilterView>,
    pub actions: Vec<ActionView>,
}

/// Runs the change-list queries for `R` and renders the page.
pub async fn load<R: Record>(conn: &mut Conn, criteria: &Criteria) -> Result<ChangeList, AdminError> {
    let admin = criteria.admin;
    let full_sql = format!("SELECT COUNT(*) FROM {}", admin.kind.table());

    let (result_count, full_count): (i64, i64) = dispatch!(conn, |c, Db| {
        let mut count_query = QueryBuilder::<Db>::new("SELECT COUNT(*)");
        criteria.push_from_where(&mut count_query);
        let result_count = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *c)
            .await
            .map_err(StoreError::from)?;
        let full_count: i64 = sqlx::query_scalar(&full_sql)
            .fetch_one(&mut *c)
            .await
            .map_err(StoreError::from)?;
        (result_count, full_count)
    });

    let num_pages = ((result_count + LIST_PER_PAGE - 1) / LIST_PER_PAGE).max(1);
    if criteria.page > num_pages {
        return Err(AdminError::InvalidLookup(format!(
            "page {} is out of range (1-{num_pages})",
            criteria.page
        )));
    }

    let records: Vec<R> = dispatch!(conn, |c, Db| {
        let mut page_query = QueryBuilder::<Db>::new("SELECT t.*");
        criteria.push_from_where(&mut page_query);
        criteria.push_order_by(&mut page_query);
        page_query
            .push(" LIMIT ")
            .push_bind(LIST_PER_PAGE)
            .push(" OFFSET ")
            .push_bind((criteria.page - 1) * LIST_PER_PAGE);
        page_query
            .build_query_as::<R>()
            .fetch_all(&mut *c)
            .await
            .map_err(StoreError::from)?
    });

    let rows = render_rows(conn, admin, &records).await?;
    let filters = filter_views(conn, criteria).await?;

    Ok(ChangeList {
        entity: admin.kind.slug(),
        verbose_name: admin.verbose_name,
        verbose_name_plural: admin.verbose_name_plural,
        search: criteria.search.clone(),
        searchable: !admin.search_fields.is_empty(),
        columns: admin
            .list_display
            .iter()
            .map(|column| ColumnHeader {
                name: column.name,
                label: column.label,
                sortable: column.sort.is_some(),
                sorted: criteria
                    .ordering
                    .iter()
                    .find(|term| term.column == column.name)
                    .map(|term| if term.descending { "desc" } else { "asc" }),
            })
            .collect(),
        rows,
        result_count,
        full_count,
        page: criteria.page,
        num_pages,
        per_page: LIST_PER_PAGE,
        filters,
        actions: admin
            .actions
            .iter()
            .map(|action| ActionView {
                name: action.name(),
                description: action.description(admin),
            })
            .collect(),
    })
}

async fn render_rows<R: Record>(
    conn: &mut Conn,
    admin: &EntityAdmin,
    records: &[R],
) -> Result<Vec<ChangeListRow>, StoreError> {
    let ids: Vec<i64> = records.iter().map(Record::id).collect();
    let own_labels = display::labels(conn, admin.kind, ids.iter().copied()).await?;

    let mut foreign_labels = HashMap::new();
    let mut counts = HashMap::new();
    for column in admin.list_display {
        match column.kind {
            ColumnKind::ForeignKey(target) => {
                let referenced = records.iter().filter_map(|record| match record.field(column.name) {
                    FieldValue::Int(id) => Some(id),
                    _ => None,
                });
                foreign_labels.insert(column.name, display::labels(conn, target, referenced).await?);
            }
            ColumnKind::RelatedCount { entity, fk_column } => {
                counts.insert(
                    column.name,
                    display::related_counts(conn, entity, fk_column, &ids).await?,
                );
            }
            _ => {}
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            let cells = admin
                .list_display
                .iter()
                .map(|column| match column.kind {
                    ColumnKind::ForeignKey(_) => match record.field(column.name) {
                        FieldValue::Int(id) => foreign_labels
                            .get(column.name)
                            .and_then(|labels| labels.get(&id))
                            .cloned()
                            .unwrap_or_else(|| id.to_string()),
                        _ => EMPTY_VALUE.to_string(),
                    },
                    ColumnKind::RelatedCount { .. } => counts
                        .get(column.name)
                        .and_then(|per_parent| per_parent.get(&record.id()))
                        .copied()
                        .unwrap_or(0)
                        .to_string(),
                    ColumnKind::Score => format_score(record.derived_score()),
                    kind => render_value(&record.field(column.name), kind),
                })
                .collect();
            ChangeListRow {
                id: record.id(),
                label: own_labels.get(&record.id()).cloned().unwrap_or_default(),
                cells,
            }
        })
        .collect();
    Ok(rows)
}

async fn filter_views(conn: &mut Conn, criteria: &Criteria) -> Result<Vec<FilterView>, StoreError> {
    let admin = criteria.admin;
    let mut views = Vec::with_capacity(admin.list_filter.len());

    for filter in admin.list_filter {
        let selected = criteria
            .filters
            .iter()
            .find(|applied| applied.filter.param == filter.param);
        let is_selected = |value: &str| match selected.map(|applied| &applied.value) {
            Some(FilterValue::Bool(flag)) => parse_bool(value) == Some(*flag),
            Some(FilterValue::Text(text)) => text == value,
            None => false,
        };

        let options: Vec<(String, String)> = match filter.kind {
            FilterKind::Boolean => pairs(BOOLEAN_CHOICES),
            FilterKind::Choice(choices) => pairs(choices),
            FilterKind::Values => {
                let sql = format!(
                    "SELECT DISTINCT {expr} FROM {} t {} WHERE {expr} IS NOT NULL ORDER BY 1",
                    admin.kind.table(),
                    admin.joins_sql(),
                    expr = filter.expr
                );
                let values: Vec<String> = dispatch!(conn, |c| sqlx::query_scalar(&sql).fetch_all(&mut *c).await?);
                values.into_iter().map(|value| (value.clone(), value)).collect()
            }
        };

        let mut choices = vec![FilterChoice {
            value: String::new(),
            label: "All".to_string(),
            selected: selected.is_none(),
        }];
        choices.extend(options.into_iter().map(|(value, label)| FilterChoice {
            selected: is_selected(&value),
            value,
            label,
        }));
        if let Some(applied) = selected {
            if !choices.iter().any(|choice| choice.selected) {
                // Keep a selected value visible even when no row carries it.
                choices.push(FilterChoice {
                    value: applied.raw.clone(),
                    label: applied.raw.clone(),
                    selected: true,
                });
            }
        }

        views.push(FilterView {
            param: filter.param,
            label: filter.label,
            choices,
        });
    }
    Ok(views)
}

fn pairs(choices: &[(&str, &str)]) -> Vec<(String, String)> {
    choices
        .iter()
        .map(|(value, label)| (value.to_string(), label.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::registry::{COMPANY_ADMIN, REVIEW_ADMIN};

    #[test]
    fn search_splits_terms_and_keeps_quoted_phrases() {
        assert_eq!(split_terms("acme  berlin"), vec!["acme", "berlin"]);
        assert_eq!(split_terms("\"new york\" robotics"), vec!["new york", "robotics"]);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn unknown_filters_are_invalid_lookups() {
        let params = ListParams::from_pairs([("password", "x")]);
        let err = Criteria::parse(&COMPANY_ADMIN, &params).expect_err("not a filter");
        assert!(matches!(err, AdminError::InvalidLookup(_)));
    }

    #[test]
    fn choice_filters_reject_unknown_codes() {
        let ok = ListParams::from_pairs([("sentiment", "negative")]);
        assert!(Criteria::parse(&REVIEW_ADMIN, &ok).is_ok());
        let bad = ListParams::from_pairs([("sentiment", "furious")]);
        assert!(Criteria::parse(&REVIEW_ADMIN, &bad).is_err());
    }

    #[test]
    fn ordering_defaults_to_metadata_and_rejects_unsortable_columns() {
        let criteria = Criteria::parse(&COMPANY_ADMIN, &ListParams::default()).expect("defaults");
        assert_eq!(
            criteria.ordering,
            vec![OrderTerm {
                column: "created_at",
                sort: "t.created_at",
                descending: true,
            }]
        );

        let by_name = ListParams::from_pairs([("o", "name,-city")]);
        let criteria = Criteria::parse(&COMPANY_ADMIN, &by_name).expect("sortable");
        assert_eq!(criteria.ordering.len(), 2);
        assert!(!criteria.ordering[0].descending);
        assert!(criteria.ordering[1].descending);

        let unsortable = ListParams::from_pairs([("o", "job_count")]);
        assert!(Criteria::parse(&COMPANY_ADMIN, &unsortable).is_err());
    }

    #[test]
    fn page_must_be_a_positive_number() {
        for raw in ["0", "-1", "two"] {
            let params = ListParams::from_pairs([("p", raw)]);
            assert!(Criteria::parse(&COMPANY_ADMIN, &params).is_err(), "{raw}");
        }
        let params = ListParams::from_pairs([("p", "3")]);
        assert_eq!(Criteria::parse(&COMPANY_ADMIN, &params).expect("page").page(), 3);
    }
}
