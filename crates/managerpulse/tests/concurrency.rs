use managerpulse::admin::AdminService;
use managerpulse::aggregation::{self, AggregationPolicy};
use managerpulse::config::DatabaseConfig;
use managerpulse::domain::{Company, CompanyAggregate, CompanyInput, EntityKind, Review, ReviewInput};
use managerpulse::store::{self, Database, Repository};
use serde_json::json;
use tempfile::TempDir;

/// File-backed database in WAL mode, so connections really run side by side.
async fn file_database(dir: &TempDir) -> Database {
    let path = dir.path().join("managerpulse.sqlite3");
    let mut config = DatabaseConfig::new(format!("sqlite://{}", path.display())).expect("config");
    config.max_connections = 8;
    let db = Database::connect(&config).await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

async fn seed_company(db: &Database, reviews: i64) -> i64 {
    let mut conn = db.acquire().await.expect("connection");
    let company = Company::insert(&mut conn, None, &CompanyInput::named("Acme"))
        .await
        .expect("company");
    for n in 0..reviews {
        Review::insert(
            &mut conn,
            None,
            &ReviewInput {
                autonomy: Some(n % 5 + 1),
                tags: Some("remote".to_string()),
                ..ReviewInput::for_company(company.id)
            },
        )
        .await
        .expect("review");
    }
    company.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recomputes_of_one_company_all_succeed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = file_database(&dir).await;
    let company_id = seed_company(&db, 50).await;

    for _round in 0..20 {
        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    aggregation::recompute_companies(&db, &[company_id], &AggregationPolicy::default()).await
                })
            })
            .collect();
        for task in tasks {
            let aggregates = task.await.expect("task").expect("recompute succeeds");
            assert_eq!(aggregates.len(), 1);
            assert_eq!(aggregates[0].n_contributors, 50);
            assert_eq!(aggregates[0].avg_autonomy, Some(3.0));
        }
    }

    let mut conn = db.acquire().await.expect("connection");
    let rows = store::count_related(&mut conn, EntityKind::CompanyAggregate, "company_id", company_id)
        .await
        .expect("count");
    assert_eq!(rows, 1);
    let aggregate = CompanyAggregate::for_company(&mut conn, company_id)
        .await
        .expect("query")
        .expect("aggregate");
    assert_eq!(aggregate.top_tags.as_deref(), Some("remote"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admin_edits_and_recomputes_all_land() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = file_database(&dir).await;
    let company_id = seed_company(&db, 10).await;
    let service = AdminService::new(db.clone(), AggregationPolicy::default());

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let service = service.clone();
            tokio::spawn(async move {
                if n % 2 == 0 {
                    let values = json!({ "city": format!("City {n}") });
                    let serde_json::Value::Object(values) = values else {
                        unreachable!("object literal");
                    };
                    service
                        .update(EntityKind::Company, company_id, &values)
                        .await
                        .map(|_| ())
                } else {
                    service
                        .run_action(EntityKind::Company, "recompute_aggregates", &[company_id])
                        .await
                        .map(|_| ())
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task").expect("write succeeds");
    }

    let mut conn = db.acquire().await.expect("connection");
    let company = store::get::<Company>(&mut conn, company_id).await.expect("company");
    assert!(company.city.as_deref().is_some_and(|city| city.starts_with("City ")));
    let aggregate = CompanyAggregate::for_company(&mut conn, company_id)
        .await
        .expect("query")
        .expect("aggregate");
    assert_eq!(aggregate.n_contributors, 10);
}
