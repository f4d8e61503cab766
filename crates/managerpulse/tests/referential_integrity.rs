use managerpulse::admin::AdminService;
use managerpulse::aggregation::AggregationPolicy;
use managerpulse::domain::{
    Company, CompanyAggregate, CompanyAggregateInput, CompanyInput, EntityKind, JobPosting, JobPostingInput,
    Manager, ManagerInput, Review, ReviewInput,
};
use managerpulse::store::{self, CascadeEffect, Database, Repository};

async fn seeded() -> (Database, Company, Manager, Review) {
    let db = Database::in_memory().await.expect("database");
    let mut conn = db.acquire().await.expect("connection");

    let company = Company::insert(&mut conn, None, &CompanyInput::named("Acme"))
        .await
        .expect("company");
    let manager = Manager::insert(
        &mut conn,
        None,
        &ManagerInput {
            company: Some(company.id),
            display_name: Some("Dana".to_string()),
            ..ManagerInput::default()
        },
    )
    .await
    .expect("manager");
    JobPosting::insert(
        &mut conn,
        None,
        &JobPostingInput {
            company: Some(company.id),
            title: "Staff Engineer".to_string(),
            ..JobPostingInput::default()
        },
    )
    .await
    .expect("posting");
    let review = Review::insert(
        &mut conn,
        None,
        &ReviewInput {
            manager: Some(manager.id),
            autonomy: Some(4),
            ..ReviewInput::for_company(company.id)
        },
    )
    .await
    .expect("review");
    CompanyAggregate::insert(&mut conn, None, &CompanyAggregateInput::for_company(company.id))
        .await
        .expect("aggregate");

    drop(conn);
    (db, company, manager, review)
}

#[tokio::test]
async fn deleting_a_company_removes_everything_that_belongs_to_it() {
    let (db, company, _, _) = seeded().await;
    let mut conn = db.acquire().await.expect("connection");

    let summary = store::cascade_summary(&mut conn, EntityKind::Company, company.id)
        .await
        .expect("summary");
    assert_eq!(summary.len(), 4);
    assert!(summary
        .iter()
        .all(|entry| entry.effect == CascadeEffect::Deleted && entry.count == 1));

    assert!(store::delete(&mut conn, EntityKind::Company, company.id)
        .await
        .expect("delete"));
    for kind in [
        EntityKind::Manager,
        EntityKind::JobPosting,
        EntityKind::Review,
        EntityKind::CompanyAggregate,
    ] {
        let left = store::count_related(&mut conn, kind, "company_id", company.id)
            .await
            .expect("count");
        assert_eq!(left, 0, "{kind} rows left behind");
    }
}

#[tokio::test]
async fn deleting_a_manager_detaches_but_keeps_reviews() {
    let (db, _, manager, review) = seeded().await;
    let service = AdminService::new(db.clone(), AggregationPolicy::default());

    let summary = service
        .delete(EntityKind::Manager, manager.id)
        .await
        .expect("deleted");
    assert_eq!(summary.label, "Dana at Acme");
    assert_eq!(summary.cascade.len(), 1);
    assert_eq!(summary.cascade[0].effect, CascadeEffect::Detached);

    let mut conn = db.acquire().await.expect("connection");
    let survivor = store::get::<Review>(&mut conn, review.id).await.expect("review survives");
    assert_eq!(survivor.manager_id, None);
    assert_eq!(survivor.autonomy, Some(4));
}

#[tokio::test]
async fn acme_review_scores_four_and_goes_with_the_company() {
    let db = Database::in_memory().await.expect("database");
    let service = AdminService::new(db.clone(), AggregationPolicy::default());

    let acme = service
        .create(
            EntityKind::Company,
            &serde_json::from_str(r#"{"name": "Acme"}"#).expect("json"),
        )
        .await
        .expect("company");
    let review = service
        .create(
            EntityKind::Review,
            &serde_json::from_value(serde_json::json!({
                "company": acme.id,
                "autonomy": 5,
                "feedback_quality": 3,
            }))
            .expect("json"),
        )
        .await
        .expect("review");
    assert_eq!(review.label, "Review for Acme");
    assert_eq!(review.score.as_ref().map(|score| score.value.as_str()), Some("4.0"));

    service.delete(EntityKind::Company, acme.id).await.expect("deleted");
    let err = service
        .detail(EntityKind::Review, review.id)
        .await
        .expect_err("review is gone");
    assert_eq!(err.to_string(), format!("review {} not found", review.id));
}
