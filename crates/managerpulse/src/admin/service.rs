use super::changelist::{self, ChangeList, Criteria, ListParams};
use super::display;
use super::form::{self, ChangeForm};
use super::registry::{AdminAction, EntityAdmin, INDEX_TITLE, SITE_HEADER, SITE_TITLE};
use super::AdminError;
use crate::accounts::{AdminUser, PasswordHasher};
use crate::aggregation::{self, AggregationPolicy};
use crate::domain::{decode_fields, EntityKind, ValidationError};
use crate::interchange::{self, Format, ImportOptions, ImportReport};
use crate::store::{self, dispatch, with_retry, CascadeEntry, Conn, Database, Repository, RetryConfig, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::QueryBuilder;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Autocomplete results per request.
pub const AUTOCOMPLETE_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminIndex {
    pub site_header: &'static str,
    pub site_title: &'static str,
    pub index_title: &'static str,
    pub entities: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub entity: &'static str,
    pub verbose_name_plural: &'static str,
    pub importable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub entity: EntityKind,
    pub id: i64,
    pub label: String,
    /// Related rows removed or detached along with the record.
    pub cascade: Vec<CascadeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutocompleteOption {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutocompleteResults {
    pub results: Vec<AutocompleteOption>,
    /// More matches exist beyond the returned page.
    pub more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action: &'static str,
    pub affected: usize,
    pub message: String,
}

/// Entry point for every admin operation. Writes run in a transaction that
/// is retried when it collides with a concurrent writer.
#[derive(Debug, Clone)]
pub struct AdminService {
    database: Database,
    policy: AggregationPolicy,
    hasher: PasswordHasher,
    retry: RetryConfig,
}

impl AdminService {
    pub fn new(database: Database, policy: AggregationPolicy) -> Self {
        Self {
            database,
            policy,
            hasher: PasswordHasher::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn password_hasher(&self) -> PasswordHasher {
        self.hasher
    }

    /// Returns the administrator when the credentials match.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<AdminUser>, AdminError> {
        let mut conn = self.database.acquire().await?;
        Ok(AdminUser::authenticate(&mut conn, self.hasher, username, password).await?)
    }

    pub fn index(&self) -> AdminIndex {
        AdminIndex {
            site_header: SITE_HEADER,
            site_title: SITE_TITLE,
            index_title: INDEX_TITLE,
            entities: EntityKind::ALL
                .iter()
                .map(|kind| {
                    let admin = EntityAdmin::for_kind(*kind);
                    IndexEntry {
                        entity: kind.slug(),
                        verbose_name_plural: admin.verbose_name_plural,
                        importable: admin.resource.is_some(),
                    }
                })
                .collect(),
        }
    }

    #[instrument(skip(self, params), fields(entity = %kind))]
    pub async fn list(&self, kind: EntityKind, params: &ListParams) -> Result<ChangeList, AdminError> {
        let criteria = Criteria::parse(EntityAdmin::for_kind(kind), params)?;
        let mut conn = self.database.acquire().await?;
        with_record!(kind, |Entity| changelist::load::<Entity>(&mut conn, &criteria).await)
    }

    pub async fn detail(&self, kind: EntityKind, id: i64) -> Result<ChangeForm, AdminError> {
        let mut conn = self.database.acquire().await?;
        let form = with_record!(kind, |Entity| {
            let record = store::get::<Entity>(&mut conn, id).await?;
            form::build(&mut conn, &record).await?
        });
        Ok(form)
    }

    /// Creates a record from a JSON object of field values.
    #[instrument(skip(self, values), fields(entity = %kind))]
    pub async fn create(&self, kind: EntityKind, values: &Map<String, Value>) -> Result<ChangeForm, AdminError> {
        let form = with_retry(&self.retry, || async move {
            let mut tx = self.database.begin().await?;
            let form = with_record!(kind, |Entity| {
                let record = save::<Entity>(&mut tx, None, values).await?;
                form::build(&mut tx, &record).await?
            });
            tx.commit().await?;
            Ok::<_, AdminError>(form)
        })
        .await?;
        info!(id = form.id, "record created");
        Ok(form)
    }

    /// Merges `values` onto the stored record; fields not named keep their
    /// current values.
    #[instrument(skip(self, values), fields(entity = %kind))]
    pub async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        values: &Map<String, Value>,
    ) -> Result<ChangeForm, AdminError> {
        let form = with_retry(&self.retry, || async move {
            let mut tx = self.database.begin().await?;
            let form = with_record!(kind, |Entity| {
                let record = save::<Entity>(&mut tx, Some(id), values).await?;
                form::build(&mut tx, &record).await?
            });
            tx.commit().await?;
            Ok::<_, AdminError>(form)
        })
        .await?;
        info!(id, "record updated");
        Ok(form)
    }

    #[instrument(skip(self), fields(entity = %kind))]
    pub async fn delete(&self, kind: EntityKind, id: i64) -> Result<DeleteSummary, AdminError> {
        let (label, cascade) = with_retry(&self.retry, || async move {
            let mut tx = self.database.begin().await?;
            if !store::exists(&mut tx, kind, id).await? {
                return Err(StoreError::NotFound { entity: kind, id });
            }

            let label = display::labels(&mut tx, kind, [id])
                .await?
                .remove(&id)
                .unwrap_or_default();
            let cascade = store::cascade_summary(&mut tx, kind, id).await?;
            store::delete(&mut tx, kind, id).await?;
            tx.commit().await?;
            Ok::<_, StoreError>((label, cascade))
        })
        .await?;

        info!(id, related = cascade.len(), "record deleted");
        Ok(DeleteSummary {
            entity: kind,
            id,
            label,
            cascade,
        })
    }

    /// Records of `kind` whose search fields match every term, by label.
    pub async fn autocomplete(&self, kind: EntityKind, term: &str) -> Result<AutocompleteResults, AdminError> {
        let admin = EntityAdmin::for_kind(kind);
        let terms = changelist::split_terms(term);

        let sql = format!(
            "SELECT t.id, COALESCE({}, '') AS label FROM {} t {} WHERE 1 = 1",
            admin.label_sql,
            kind.table(),
            admin.joins_sql()
        );

        let mut conn = self.database.acquire().await?;
        let mut rows: Vec<(i64, String)> = dispatch!(&mut conn, |c, Db| {
            let mut query = QueryBuilder::<Db>::new(&sql);
            changelist::push_search(&mut query, admin, &terms);
            query
                .push(" ORDER BY label, t.id LIMIT ")
                .push_bind((AUTOCOMPLETE_LIMIT + 1) as i64);
            query
                .build_query_as()
                .fetch_all(&mut *c)
                .await
                .map_err(StoreError::from)?
        });
        let more = rows.len() > AUTOCOMPLETE_LIMIT;
        rows.truncate(AUTOCOMPLETE_LIMIT);

        Ok(AutocompleteResults {
            results: rows
                .into_iter()
                .map(|(id, text)| AutocompleteOption { id, text })
                .collect(),
            more,
        })
    }

    /// Exports all records, or only `ids` in the given order.
    pub async fn export(
        &self,
        kind: EntityKind,
        format: Format,
        ids: Option<&[i64]>,
    ) -> Result<Vec<u8>, AdminError> {
        let mut conn = self.database.acquire().await?;
        let bytes = match ids {
            Some(ids) => interchange::export_selected(&mut conn, kind, format, ids).await?,
            None => interchange::export(&mut conn, kind, format).await?,
        };
        Ok(bytes)
    }

    pub async fn import(
        &self,
        kind: EntityKind,
        format: Format,
        data: &[u8],
        options: ImportOptions,
    ) -> Result<ImportReport, AdminError> {
        Ok(interchange::import(&self.database, kind, format, data, options).await?)
    }

    #[instrument(skip(self, ids), fields(entity = %kind, selected = ids.len()))]
    pub async fn run_action(&self, kind: EntityKind, name: &str, ids: &[i64]) -> Result<ActionOutcome, AdminError> {
        let admin = EntityAdmin::for_kind(kind);
        let action = admin.action(name).ok_or_else(|| AdminError::UnknownAction {
            entity: kind,
            action: name.to_string(),
        })?;

        let selected: BTreeSet<i64> = ids.iter().copied().collect();
        if selected.is_empty() {
            return Err(AdminError::InvalidLookup(
                "items must be selected in order to perform actions on them".to_string(),
            ));
        }

        let (affected, message) = match action {
            AdminAction::DeleteSelected => {
                let selected = &selected;
                let deleted = with_retry(&self.retry, || async move {
                    let mut tx = self.database.begin().await?;
                    let mut deleted = 0;
                    for &id in selected {
                        if store::delete(&mut tx, kind, id).await? {
                            deleted += 1;
                        }
                    }
                    tx.commit().await?;
                    Ok::<_, StoreError>(deleted)
                })
                .await?;
                let message = format!(
                    "Successfully deleted {deleted} {}.",
                    admin.verbose_name_plural.to_lowercase()
                );
                (deleted, message)
            }
            AdminAction::RecomputeAggregates => {
                let mut conn = self.database.acquire().await?;
                let company_ids = selected_companies(&mut conn, kind, &selected).await?;
                drop(conn);
                let aggregates =
                    aggregation::recompute_companies(&self.database, &company_ids, &self.policy).await?;
                let message = format!("Recomputed {} aggregates.", aggregates.len());
                (aggregates.len(), message)
            }
        };

        info!(action = action.name(), affected, "admin action finished");
        Ok(ActionOutcome {
            action: action.name(),
            affected,
            message,
        })
    }
}

/// Companies behind the selected company or aggregate ids, skipping ids that
/// no longer exist.
async fn selected_companies(
    conn: &mut Conn,
    kind: EntityKind,
    selected: &BTreeSet<i64>,
) -> Result<Vec<i64>, StoreError> {
    let column = match kind {
        EntityKind::CompanyAggregate => "company_id",
        _ => "id",
    };
    let sql = format!("SELECT DISTINCT {column} FROM {} WHERE id IN (", kind.table());
    let company_ids: Vec<i64> = dispatch!(conn, |c, Db| {
        let mut query = QueryBuilder::<Db>::new(&sql);
        let mut separated = query.separated(", ");
        for id in selected {
            separated.push_bind(*id);
        }
        separated.push_unseparated(format!(") ORDER BY {column}"));
        query.build_query_scalar().fetch_all(&mut *c).await?
    });
    Ok(company_ids)
}

/// Validates a JSON object against the entity's writable fields and writes
/// it, inserting when `id` is `None`.
async fn save<R: Repository>(
    conn: &mut Conn,
    id: Option<i64>,
    patch: &Map<String, Value>,
) -> Result<R, AdminError> {
    let admin = EntityAdmin::for_kind(R::KIND);
    let existing = match id {
        Some(id) => Some(store::get::<R>(conn, id).await?),
        None => None,
    };

    let base = existing.as_ref().map(R::to_input).unwrap_or_default();
    let base = match serde_json::to_value(&base) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(err) => return Err(ValidationError::field("__all__", err.to_string()).into()),
    };

    let mut rejected = ValidationError::default();
    let mut merged = base.clone();
    for (key, value) in patch {
        if key == "id" || admin.is_readonly(key) {
            rejected.push(key.as_str(), "this field is read-only");
        } else if !merged.contains_key(key) {
            rejected.push(key.as_str(), "unknown field");
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    rejected.into_result()?;

    let input: R::Input = decode_fields(&base, patch, merged)?;
    let record = match existing {
        Some(record) => R::update(conn, record.id(), &input).await?,
        None => R::insert(conn, None, &input).await?,
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[tokio::test]
    async fn index_lists_every_entity_with_site_titles() {
        let database = Database::in_memory().await.expect("database");
        let service = AdminService::new(database, AggregationPolicy::default());
        let index = service.index();
        assert_eq!(index.site_header, "ManagerPulse Admin");
        assert_eq!(index.entities.len(), 5);
        assert!(!index.entities[4].importable);
    }

    #[tokio::test]
    async fn create_rejects_readonly_and_unknown_fields() {
        let database = Database::in_memory().await.expect("database");
        let service = AdminService::new(database, AggregationPolicy::default());
        let values = object(json!({
            "name": "Acme",
            "created_at": "2020-01-01T00:00:00Z",
            "nickname": "A",
        }));

        let err = service
            .create(EntityKind::Company, &values)
            .await
            .expect_err("rejected");
        let AdminError::Store(StoreError::Validation(validation)) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        let fields: Vec<&str> = validation.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["created_at", "nickname"]);
    }

    #[tokio::test]
    async fn update_merges_onto_stored_values() {
        let database = Database::in_memory().await.expect("database");
        let service = AdminService::new(database, AggregationPolicy::default());
        let created = service
            .create(
                EntityKind::Company,
                &object(json!({ "name": "Acme", "city": "Berlin" })),
            )
            .await
            .expect("created");

        let updated = service
            .update(EntityKind::Company, created.id, &object(json!({ "industry": "Robotics" })))
            .await
            .expect("updated");
        assert_eq!(updated.field("city").map(|f| f.display.as_str()), Some("Berlin"));
        assert_eq!(updated.field("industry").map(|f| f.display.as_str()), Some("Robotics"));
    }

    #[tokio::test]
    async fn unknown_actions_and_empty_selections_are_rejected() {
        let database = Database::in_memory().await.expect("database");
        let service = AdminService::new(database, AggregationPolicy::default());

        let err = service
            .run_action(EntityKind::Review, "recompute_aggregates", &[1])
            .await
            .expect_err("not offered on reviews");
        assert!(matches!(err, AdminError::UnknownAction { .. }));

        let err = service
            .run_action(EntityKind::Company, "delete_selected", &[])
            .await
            .expect_err("nothing selected");
        assert!(matches!(err, AdminError::InvalidLookup(_)));
    }
}
