use super::{claim_explicit_id, dispatch, insert_sql, resolve_reference, Conn, Repository, StoreError};
use crate::domain::{EntityKind, JobPosting, JobPostingInput, Validate};
use async_trait::async_trait;
use chrono::Utc;

const COLUMNS: &[&str] = &[
    "company_id",
    "title",
    "team",
    "location",
    "lat",
    "lng",
    "is_remote",
    "source",
    "url",
    "salary",
    "created_at",
    "updated_at",
];

#[async_trait]
impl Repository for JobPosting {
    async fn insert(conn: &mut Conn, id: Option<i64>, input: &JobPostingInput) -> Result<JobPosting, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;
        let now = Utc::now();
        let sql = insert_sql(EntityKind::JobPosting, id.is_some(), COLUMNS);

        let posting = dispatch!(conn, |c| {
            let query = sqlx::query_as::<_, JobPosting>(&sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query
                .bind(company_id)
                .bind(&input.title)
                .bind(&input.team)
                .bind(&input.location)
                .bind(input.lat)
                .bind(input.lng)
                .bind(input.is_remote)
                .bind(input.source)
                .bind(&input.url)
                .bind(&input.salary)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *c)
                .await
        })
        .map_err(StoreError::from_write)?;
        claim_explicit_id(conn, EntityKind::JobPosting, id).await?;
        Ok(posting)
    }

    async fn update(conn: &mut Conn, id: i64, input: &JobPostingInput) -> Result<JobPosting, StoreError> {
        let input = input.clone().normalized();
        input.validate()?;
        let company_id = resolve_reference(conn, "company", EntityKind::Company, input.company).await?;

        dispatch!(conn, |c| {
            sqlx::query_as::<_, JobPosting>(
                "UPDATE job_postings SET company_id = $1, title = $2, team = $3, location = $4, lat = $5, \
                 lng = $6, is_remote = $7, source = $8, url = $9, salary = $10, updated_at = $11 \
                 WHERE id = $12 RETURNING *",
            )
            .bind(company_id)
            .bind(&input.title)
            .bind(&input.team)
            .bind(&input.location)
            .bind(input.lat)
            .bind(input.lng)
            .bind(input.is_remote)
            .bind(input.source)
            .bind(&input.url)
            .bind(&input.salary)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)?
        .ok_or(StoreError::NotFound {
            entity: EntityKind::JobPosting,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Company, CompanyInput, JobSource};
    use crate::store::Database;

    #[tokio::test]
    async fn posting_keeps_source_and_remote_flag() {
        let db = Database::in_memory().await.expect("db");
        let mut conn = db.acquire().await.expect("conn");
        let acme = Company::insert(&mut conn, None, &CompanyInput::named("Acme")).await.expect("acme");

        let posting = JobPosting::insert(
            &mut conn,
            None,
            &JobPostingInput {
                company: Some(acme.id),
                title: "Staff Engineer".to_string(),
                is_remote: true,
                source: JobSource::Greenhouse,
                url: Some("https://boards.example.com/acme/1".to_string()),
                ..JobPostingInput::default()
            },
        )
        .await
        .expect("insert");

        assert_eq!(posting.source, JobSource::Greenhouse);
        assert!(posting.is_remote);
        assert_eq!(posting.company_id, acme.id);
    }
}
