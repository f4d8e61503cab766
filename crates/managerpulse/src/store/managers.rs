use super::{claim_explicit_id, dispatch, insert_sql, resolve_reference, Conn, Repository, StoreError};
use crate::domain::{EntityKind, Manager, ManagerInput, Validate};
use async_trait::async_trait;
use chrono::Utc;

const COLUMNS: &[&str] = &[
    "company_id",
    "display_name",
    "title",
    "team",
    "location",
    "is_verified",
    "created_at",
    "updated_at",
];

#[async_trait]
impl Repository for Manager {
    async fn insert(conn: &mut Conn, id: Option<i64>, input: &ManagerInput) -> Result<Manager, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        let now = Utc::now();
        let sql = insert_sql(EntityKind::Manager, id.is_some(), COLUMNS);

        let manager = dispatch!(conn, |c| {
            let query = sqlx::query_as::<_, Manager>(&sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query
                .bind(company_id)
                .bind(&input.display_name)
                .bind(&input.title)
                .bind(&input.team)
                .bind(&input.location)
                .bind(input.is_verified)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *c)
                .await
        })
        .map_err(StoreError::from_write)?;
        claim_explicit_id(conn, EntityKind::Manager, id).await?;
        Ok(manager)
    }

    async fn update(conn: &mut Conn, id: i64, input: &ManagerInput) -> Result<Manager, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;

        dispatch!(conn, |c| {
            sqlx::query_as::<_, Manager>(
                "UPDATE managers SET company_id = $1, display_name = $2, title = $3, team = $4, \
                 location = $5, is_verified = $6, updated_at = $7 WHERE id = $8 RETURNING *",
            )
            .bind(company_id)
            .bind(&input.display_name)
            .bind(&input.title)
            .bind(&input.team)
            .bind(&input.location)
            .bind(input.is_verified)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)?
        .ok_or(StoreError::NotFound {
            entity: EntityKind::Manager,
            id,
        })
    }
}
