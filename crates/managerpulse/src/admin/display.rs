//! Turning stored values into the strings shown in lists and forms.

use super::registry::{Choices, ColumnKind, EntityAdmin};
use crate::domain::{EntityKind, FieldValue};
use crate::store::{dispatch, Conn, StoreError};
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use std::collections::{BTreeSet, HashMap};

/// Shown for absent values.
pub const EMPTY_VALUE: &str = "-";

pub fn choice_label(choices: Choices, code: &str) -> Option<&'static str> {
    choices
        .iter()
        .find(|(value, _)| *value == code)
        .map(|(_, label)| *label)
}

pub fn render_value(value: &FieldValue, kind: ColumnKind) -> String {
    match (value, kind) {
        (FieldValue::Null, _) => EMPTY_VALUE.to_string(),
        (FieldValue::Text(code), ColumnKind::Choice(choices)) => choice_label(choices, code)
            .map(str::to_string)
            .unwrap_or_else(|| code.clone()),
        (FieldValue::Text(raw), ColumnKind::Timestamp) => render_timestamp(raw),
        (FieldValue::Bool(true), _) => "Yes".to_string(),
        (FieldValue::Bool(false), _) => "No".to_string(),
        (FieldValue::Int(value), _) => value.to_string(),
        (FieldValue::Float(value), _) => value.to_string(),
        (FieldValue::Text(text), _) => text.clone(),
    }
}

fn render_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Labels of the given records, keyed by id. Missing ids are simply absent.
pub async fn labels(
    conn: &mut Conn,
    kind: EntityKind,
    ids: impl IntoIterator<Item = i64>,
) -> Result<HashMap<i64, String>, StoreError> {
    let ids: BTreeSet<i64> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let admin = EntityAdmin::for_kind(kind);
    let sql = format!(
        "SELECT t.id, COALESCE({}, '') FROM {} t {} WHERE t.id IN (",
        admin.label_sql,
        kind.table(),
        admin.joins_sql()
    );
    let rows: Vec<(i64, String)> = dispatch!(conn, |c, Db| {
        let mut query = QueryBuilder::<Db>::new(&sql);
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        query.build_query_as().fetch_all(&mut *c).await?
    });
    Ok(rows.into_iter().collect())
}

/// Number of `entity` rows per parent id, for the given parents.
pub async fn related_counts(
    conn: &mut Conn,
    entity: EntityKind,
    fk_column: &str,
    parent_ids: &[i64],
) -> Result<HashMap<i64, i64>, StoreError> {
    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {fk_column}, COUNT(*) FROM {} WHERE {fk_column} IN (",
        entity.table()
    );
    let rows: Vec<(i64, i64)> = dispatch!(conn, |c, Db| {
        let mut query = QueryBuilder::<Db>::new(&sql);
        let mut separated = query.separated(", ");
        for id in parent_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(format!(") GROUP BY {fk_column}"));
        query.build_query_as().fetch_all(&mut *c).await?
    });
    Ok(rows.into_iter().collect())
}
