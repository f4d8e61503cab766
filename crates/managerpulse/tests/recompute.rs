use managerpulse::admin::AdminService;
use managerpulse::aggregation::{self, AggregationPolicy};
use managerpulse::domain::{
    Company, CompanyAggregate, CompanyAggregateInput, CompanyInput, Confidence, EntityKind, Review, ReviewInput,
};
use managerpulse::store::{self, Conn, Database, Repository};

async fn add_review(conn: &mut Conn, company_id: i64, autonomy: i64, tags: &str) {
    Review::insert(
        conn,
        None,
        &ReviewInput {
            autonomy: Some(autonomy),
            clarity: if autonomy > 3 { Some(5) } else { None },
            tags: Some(tags.to_string()),
            ..ReviewInput::for_company(company_id)
        },
    )
    .await
    .expect("review");
}

/// Aggregate the editors have marked publishable and annotated by hand.
async fn curated_aggregate(conn: &mut Conn, company_id: i64) -> CompanyAggregate {
    CompanyAggregate::insert(
        conn,
        None,
        &CompanyAggregateInput {
            public_summary: Some("Calm, steady teams.".to_string()),
            best_for: Some("Senior ICs".to_string()),
            is_publishable: true,
            ..CompanyAggregateInput::for_company(company_id)
        },
    )
    .await
    .expect("aggregate")
}

#[tokio::test]
async fn too_few_contributors_withdraws_publication_but_keeps_editorial_text() {
    let db = Database::in_memory().await.expect("database");
    let mut conn = db.acquire().await.expect("connection");
    let company = Company::insert(&mut conn, None, &CompanyInput::named("Acme"))
        .await
        .expect("company");
    curated_aggregate(&mut conn, company.id).await;
    add_review(&mut conn, company.id, 4, "Remote, mentorship").await;
    add_review(&mut conn, company.id, 2, "mentorship").await;

    let aggregate = aggregation::recompute_company(&mut conn, company.id, &AggregationPolicy::default())
        .await
        .expect("recompute");

    assert_eq!(aggregate.n_contributors, 2);
    assert_eq!(aggregate.avg_autonomy, Some(3.0));
    assert_eq!(aggregate.avg_clarity, Some(5.0));
    assert_eq!(aggregate.avg_fairness, None);
    assert_eq!(aggregate.confidence, Confidence::Low);
    assert_eq!(aggregate.top_tags.as_deref(), Some("mentorship, remote"));
    assert!(!aggregate.is_publishable);
    assert_eq!(aggregate.public_summary.as_deref(), Some("Calm, steady teams."));
    assert_eq!(aggregate.best_for.as_deref(), Some("Senior ICs"));
}

#[tokio::test]
async fn enough_contributors_leave_the_editorial_flag_alone() {
    let db = Database::in_memory().await.expect("database");
    let mut conn = db.acquire().await.expect("connection");
    let company = Company::insert(&mut conn, None, &CompanyInput::named("Globex"))
        .await
        .expect("company");
    curated_aggregate(&mut conn, company.id).await;
    for autonomy in [5, 4, 3] {
        add_review(&mut conn, company.id, autonomy, "ownership").await;
    }

    let aggregate = aggregation::recompute_company(&mut conn, company.id, &AggregationPolicy::default())
        .await
        .expect("recompute");

    assert_eq!(aggregate.n_contributors, 3);
    assert_eq!(aggregate.confidence, Confidence::Medium);
    assert!(aggregate.is_publishable);
    assert_eq!(aggregate.avg_autonomy, Some(4.0));
    assert_eq!(aggregate.overall_score(), Some(4.5));
}

#[tokio::test]
async fn recompute_creates_a_missing_aggregate_unpublished() {
    let db = Database::in_memory().await.expect("database");
    let mut conn = db.acquire().await.expect("connection");
    let company = Company::insert(&mut conn, None, &CompanyInput::named("Initech"))
        .await
        .expect("company");

    let aggregate = aggregation::recompute_company(&mut conn, company.id, &AggregationPolicy::default())
        .await
        .expect("recompute");

    assert_eq!(aggregate.company_id, company.id);
    assert_eq!(aggregate.n_contributors, 0);
    assert_eq!(aggregate.averages(), [None; 5]);
    assert_eq!(aggregate.top_tags, None);
    assert!(!aggregate.is_publishable);

    let missing = aggregation::recompute_company(&mut conn, company.id + 100, &AggregationPolicy::default())
        .await
        .expect_err("unknown company");
    assert!(matches!(missing, store::StoreError::NotFound { .. }));
}

#[tokio::test]
async fn admin_action_recomputes_the_companies_behind_selected_aggregates() {
    let db = Database::in_memory().await.expect("database");
    let mut conn = db.acquire().await.expect("connection");
    let acme = Company::insert(&mut conn, None, &CompanyInput::named("Acme"))
        .await
        .expect("company");
    let globex = Company::insert(&mut conn, None, &CompanyInput::named("Globex"))
        .await
        .expect("company");
    let acme_aggregate = curated_aggregate(&mut conn, acme.id).await;
    add_review(&mut conn, acme.id, 4, "remote").await;
    add_review(&mut conn, globex.id, 2, "remote").await;
    drop(conn);

    let service = AdminService::new(db.clone(), AggregationPolicy::default());
    let outcome = service
        .run_action(
            EntityKind::CompanyAggregate,
            "recompute_aggregates",
            &[acme_aggregate.id, acme_aggregate.id, 9_999],
        )
        .await
        .expect("action");
    assert_eq!(outcome.affected, 1);
    assert_eq!(outcome.message, "Recomputed 1 aggregates.");

    let mut conn = db.acquire().await.expect("connection");
    let refreshed = store::get::<CompanyAggregate>(&mut conn, acme_aggregate.id)
        .await
        .expect("aggregate");
    assert_eq!(refreshed.n_contributors, 1);
    assert!(!refreshed.is_publishable);
    let untouched = store::count_related(&mut conn, EntityKind::CompanyAggregate, "company_id", globex.id)
        .await
        .expect("count");
    assert_eq!(untouched, 0);
    drop(conn);

    let outcome = service
        .run_action(EntityKind::Company, "recompute_aggregates", &[acme.id, globex.id])
        .await
        .expect("action");
    assert_eq!(outcome.affected, 2);
}
