use super::{claim_explicit_id, dispatch, insert_sql, Conn, Repository, StoreError};
use crate::domain::{Company, CompanyInput, EntityKind, Validate};
use async_trait::async_trait;
use chrono::Utc;

const COLUMNS: &[&str] = &[
    "name",
    "domain",
    "lat",
    "lng",
    "city",
    "region",
    "country",
    "logo_url",
    "industry",
    "size",
    "created_at",
    "updated_at",
];

#[async_trait]
impl Repository for Company {
    async fn insert(conn: &mut Conn, id: Option<i64>, input: &CompanyInput) -> Result<Company, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let now = Utc::now();
        let sql = insert_sql(EntityKind::Company, id.is_some(), COLUMNS);

        let company = dispatch!(conn, |c| {
            let query = sqlx::query_as::<_, Company>(&sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query
                .bind(&input.name)
                .bind(&input.domain)
                .bind(input.lat)
                .bind(input.lng)
                .bind(&input.city)
                .bind(&input.region)
                .bind(&input.country)
                .bind(&input.logo_url)
                .bind(&input.industry)
                .bind(&input.size)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *c)
                .await
        })
        .map_err(StoreError::from_write)?;
        claim_explicit_id(conn, EntityKind::Company, id).await?;
        Ok(company)
    }

    async fn update(conn: &mut Conn, id: i64, input: &CompanyInput) -> Result<Company, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;

        dispatch!(conn, |c| {
            sqlx::query_as::<_, Company>(
                "UPDATE companies SET name = $1, domain = $2, lat = $3, lng = $4, city = $5, region = $6, \
                 country = $7, logo_url = $8, industry = $9, size = $10, updated_at = $11 \
                 WHERE id = $12 RETURNING *",
            )
            .bind(&input.name)
            .bind(&input.domain)
            .bind(input.lat)
            .bind(input.lng)
            .bind(&input.city)
            .bind(&input.region)
            .bind(&input.country)
            .bind(&input.logo_url)
            .bind(&input.industry)
            .bind(&input.size)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)?
        .ok_or(StoreError::NotFound {
            entity: EntityKind::Company,
            id,
        })
    }
}
