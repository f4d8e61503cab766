use super::{claim_explicit_id, dispatch, insert_sql, resolve_reference, Conn, Repository, StoreError};
use crate::domain::{EntityKind, Review, ReviewInput, Validate};
use async_trait::async_trait;
use chrono::Utc;

const COLUMNS: &[&str] = &[
    "company_id",
    "manager_id",
    "autonomy",
    "feedback_quality",
    "clarity",
    "fairness",
    "work_life_balance",
    "duration",
    "sentiment",
    "would_work_again",
    "tags",
    "summary",
    "created_at",
];

impl Review {
    /// All reviews left for a company, oldest first.
    pub async fn for_company(conn: &mut Conn, company_id: i64) -> Result<Vec<Review>, StoreError> {
        let reviews = dispatch!(conn, |c| {
            sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE company_id = $1 ORDER BY created_at, id")
                .bind(company_id)
                .fetch_all(&mut *c)
                .await?
        });
        Ok(reviews)
    }
}

/// The manager of a review is optional, but when given it must exist.
async fn resolve_manager(conn: &mut Conn, manager: Option<i64>) -> Result<Option<i64>, StoreError> {
    match manager {
        Some(id) => Ok(Some(
            resolve_reference(conn, "manager", EntityKind::Manager, Some(id)).await?,
        )),
        None => Ok(None),
    }
}

#[async_trait]
impl Repository for Review {
    async fn insert(conn: &mut Conn, id: Option<i64>, input: &ReviewInput) -> Result<Review, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        let manager_id = resolve_manager(conn, input.manager).await?;
        let sql = insert_sql(EntityKind::Review, id.is_some(), COLUMNS);

        let review = dispatch!(conn, |c| {
            let query = sqlx::query_as::<_, Review>(&sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query
                .bind(company_id)
                .bind(manager_id)
                .bind(input.autonomy)
                .bind(input.feedback_quality)
                .bind(input.clarity)
                .bind(input.fairness)
                .bind(input.work_life_balance)
                .bind(input.duration)
                .bind(input.sentiment)
                .bind(input.would_work_again)
                .bind(&input.tags)
                .bind(&input.summary)
                .bind(Utc::now())
                .fetch_one(&mut *c)
                .await
        })
        .map_err(StoreError::from_write)?;
        claim_explicit_id(conn, EntityKind::Review, id).await?;
        Ok(review)
    }

    async fn update(conn: &mut Conn, id: i64, input: &ReviewInput) -> Result<Review, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        let manager_id = resolve_manager(conn, input.manager).await?;

        dispatch!(conn, |c| {
            sqlx::query_as::<_, Review>(
                "UPDATE reviews SET company_id = $1, manager_id = $2, autonomy = $3, feedback_quality = $4, \
                 clarity = $5, fairness = $6, work_life_balance = $7, duration = $8, sentiment = $9, \
                 would_work_again = $10, tags = $11, summary = $12 WHERE id = $13 RETURNING *",
            )
            .bind(company_id)
            .bind(manager_id)
            .bind(input.autonomy)
            .bind(input.feedback_quality)
            .bind(input.clarity)
            .bind(input.fairness)
            .bind(input.work_life_balance)
            .bind(input.duration)
            .bind(input.sentiment)
            .bind(input.would_work_again)
            .bind(&input.tags)
            .bind(&input.summary)
            .bind(id)
            .fetch_optional(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)?
        .ok_or(StoreError::NotFound {
            entity: EntityKind::Review,
            id,
        })
    }
}
