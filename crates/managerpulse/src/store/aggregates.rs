use super::{claim_explicit_id, dispatch, insert_sql, resolve_reference, Conn, Repository, StoreError};
use crate::aggregation::AggregateStats;
use crate::domain::{CompanyAggregate, CompanyAggregateInput, EntityKind, Validate, ValidationError};
use async_trait::async_trait;
use chrono::Utc;

const COLUMNS: &[&str] = &[
    "company_id",
    "n_contributors",
    "avg_autonomy",
    "avg_feedback_quality",
    "avg_clarity",
    "avg_fairness",
    "avg_work_life_balance",
    "confidence",
    "public_summary",
    "top_tags",
    "best_for",
    "hard_for",
    "is_publishable",
    "updated_at",
];

impl CompanyAggregate {
    pub async fn for_company(conn: &mut Conn, company_id: i64) -> Result<Option<CompanyAggregate>, StoreError> {
        let aggregate = dispatch!(conn, |c| {
            sqlx::query_as::<_, CompanyAggregate>("SELECT * FROM company_aggregates WHERE company_id = $1")
                .bind(company_id)
                .fetch_optional(&mut *c)
                .await?
        });
        Ok(aggregate)
    }
}

/// Enforces the one-aggregate-per-company rule with a field-level message.
async fn ensure_unclaimed(conn: &mut Conn, company_id: i64, current: Option<i64>) -> Result<(), StoreError> {
    match CompanyAggregate::for_company(conn, company_id).await? {
        Some(existing) if Some(existing.id) != current => Err(ValidationError::field(
            "company",
            format!("company {company_id} already has an aggregate"),
        )
        .into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl Repository for CompanyAggregate {
    async fn insert(
        conn: &mut Conn,
        id: Option<i64>,
        input: &CompanyAggregateInput,
    ) -> Result<CompanyAggregate, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        ensure_unclaimed(conn, company_id, None).await?;
        let sql = insert_sql(EntityKind::CompanyAggregate, id.is_some(), COLUMNS);

        let aggregate = dispatch!(conn, |c| {
            let query = sqlx::query_as::<_, CompanyAggregate>(&sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query
                .bind(company_id)
                .bind(input.n_contributors)
                .bind(input.avg_autonomy)
                .bind(input.avg_feedback_quality)
                .bind(input.avg_clarity)
                .bind(input.avg_fairness)
                .bind(input.avg_work_life_balance)
                .bind(input.confidence)
                .bind(&input.public_summary)
                .bind(&input.top_tags)
                .bind(&input.best_for)
                .bind(&input.hard_for)
                .bind(input.is_publishable)
                .bind(Utc::now())
                .fetch_one(&mut *c)
                .await
        })
        .map_err(StoreError::from_write)?;
        claim_explicit_id(conn, EntityKind::CompanyAggregate, id).await?;
        Ok(aggregate)
    }

    async fn update(
        conn: &mut Conn,
        id: i64,
        input: &CompanyAggregateInput,
    ) -> Result<CompanyAggregate, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        ensure_unclaimed(conn, company_id, Some(id)).await?;

        dispatch!(conn, |c| {
            sqlx::query_as::<_, CompanyAggregate>(
                "UPDATE company_aggregates SET company_id = $1, n_contributors = $2, avg_autonomy = $3, \
                 avg_feedback_quality = $4, avg_clarity = $5, avg_fairness = $6, avg_work_life_balance = $7, \
                 confidence = $8, public_summary = $9, top_tags = $10, best_for = $11, hard_for = $12, \
                 is_publishable = $13, updated_at = $14 WHERE id = $15 RETURNING *",
            )
            .bind(company_id)
            .bind(input.n_contributors)
            .bind(input.avg_autonomy)
            .bind(input.avg_feedback_quality)
            .bind(input.avg_clarity)
            .bind(input.avg_fairness)
            .bind(input.avg_work_life_balance)
            .bind(input.confidence)
            .bind(&input.public_summary)
            .bind(&input.top_tags)
            .bind(&input.best_for)
            .bind(&input.hard_for)
            .bind(input.is_publishable)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)?
        .ok_or(StoreError::NotFound {
            entity: EntityKind::CompanyAggregate,
            id,
        })
    }
}

/// Writes recomputed statistics for a company, creating the aggregate when
/// missing. Editorial text is left untouched and publication is revoked once
/// the contributor count drops below `min_publishable`.
pub async fn upsert_stats(
    conn: &mut Conn,
    stats: &AggregateStats,
    min_publishable: i64,
) -> Result<CompanyAggregate, StoreError> {
    let [autonomy, feedback_quality, clarity, fairness, work_life_balance] = stats.averages;
    let now = Utc::now();

    dispatch!(conn, |c| {
        sqlx::query_as::<_, CompanyAggregate>(
            "INSERT INTO company_aggregates \
             (company_id, n_contributors, avg_autonomy, avg_feedback_quality, avg_clarity, \
              avg_fairness, avg_work_life_balance, confidence, top_tags, is_publishable, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10) \
             ON CONFLICT (company_id) DO UPDATE SET \
               n_contributors = excluded.n_contributors, \
               avg_autonomy = excluded.avg_autonomy, \
               avg_feedback_quality = excluded.avg_feedback_quality, \
               avg_clarity = excluded.avg_clarity, \
               avg_fairness = excluded.avg_fairness, \
               avg_work_life_balance = excluded.avg_work_life_balance, \
               confidence = excluded.confidence, \
               top_tags = excluded.top_tags, \
               is_publishable = CASE WHEN excluded.n_contributors < $11 THEN FALSE \
                                     ELSE company_aggregates.is_publishable END, \
               updated_at = excluded.updated_at \
             RETURNING *",
        )
        .bind(stats.company_id)
        .bind(stats.n_contributors)
        .bind(autonomy)
        .bind(feedback_quality)
        .bind(clarity)
        .bind(fairness)
        .bind(work_life_balance)
        .bind(stats.confidence)
        .bind(&stats.top_tags)
        .bind(now)
        .bind(min_publishable)
        .fetch_one(&mut *c)
        .await
    })
    .map_err(StoreError::from_write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, CompanyInput};
    use crate::store::Database;

    #[tokio::test]
    async fn aggregate_for_missing_company_is_rejected() {
        let db = Database::in_memory().await.expect("db");
        let mut conn = db.acquire().await.expect("conn");

        let err = CompanyAggregate::insert(&mut conn, None, &CompanyAggregateInput::for_company(5))
            .await
            .expect_err("no such company");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn second_aggregate_for_a_company_is_rejected() {
        let db = Database::in_memory().await.expect("db");
        let mut conn = db.acquire().await.expect("conn");
        let acme = Company::insert(&mut conn, None, &CompanyInput::named("Acme")).await.expect("acme");

        let first = CompanyAggregate::insert(&mut conn, None, &CompanyAggregateInput::for_company(acme.id))
            .await
            .expect("first aggregate");
        let err = CompanyAggregate::insert(&mut conn, None, &CompanyAggregateInput::for_company(acme.id))
            .await
            .expect_err("duplicate aggregate");
        match err {
            StoreError::Validation(validation) => assert_eq!(validation.errors[0].field, "company"),
            other => panic!("unexpected error: {other}"),
        }

        // Re-saving the existing aggregate is not a conflict with itself.
        let updated = CompanyAggregate::update(
            &mut conn,
            first.id,
            &CompanyAggregateInput {
                public_summary: Some("Steady teams".to_string()),
                ..CompanyAggregateInput::for_company(acme.id)
            },
        )
        .await
        .expect("update");
        assert_eq!(updated.public_summary.as_deref(), Some("Steady teams"));
    }
}
