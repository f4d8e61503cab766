use managerpulse::domain::{Company, EntityKind, FieldError};
use managerpulse::interchange::{self, Format, ImportOptions, RowOutcome};
use managerpulse::store::{self, Database};

const COMPANIES: &str = "name,city,industry\nAcme,Berlin,Robotics\nGlobex,Springfield,Energy\n";

async fn company_count(db: &Database) -> usize {
    let mut conn = db.acquire().await.expect("connection");
    store::fetch_all::<Company>(&mut conn).await.expect("companies").len()
}

#[tokio::test]
async fn reimporting_an_export_skips_every_row() {
    let db = Database::in_memory().await.expect("database");
    let first = interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("first import");
    assert_eq!(first.totals.new, 2);
    assert!(first.committed);

    let exported = {
        let mut conn = db.acquire().await.expect("connection");
        interchange::export(&mut conn, EntityKind::Company, Format::Json)
            .await
            .expect("export")
    };

    let again = interchange::import(
        &db,
        EntityKind::Company,
        Format::Json,
        &exported,
        ImportOptions::default(),
    )
    .await
    .expect("re-import");
    assert_eq!(again.totals.skip, 2);
    assert_eq!(again.totals.update, 0);
    assert!(again.rows.iter().all(|row| row.outcome == RowOutcome::Skip));
    assert_eq!(company_count(&db).await, 2);
}

#[tokio::test]
async fn changed_rows_update_and_missing_columns_keep_stored_values() {
    let db = Database::in_memory().await.expect("database");
    interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("seed");

    let report = interchange::import(
        &db,
        EntityKind::Company,
        Format::Tsv,
        b"id\tcity\n1\tMunich\n",
        ImportOptions::default(),
    )
    .await
    .expect("update");
    assert_eq!(report.totals.update, 1);

    let mut conn = db.acquire().await.expect("connection");
    let acme = store::get::<Company>(&mut conn, 1).await.expect("acme");
    assert_eq!(acme.city.as_deref(), Some("Munich"));
    assert_eq!(acme.industry.as_deref(), Some("Robotics"));
}

#[tokio::test]
async fn one_bad_row_rolls_back_the_whole_file() {
    let db = Database::in_memory().await.expect("database");
    let csv = "company,autonomy\n999,4\n";
    interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("seed");

    let mixed = "name,lat\nInitech,40.7\nBroken,north\n";
    let report = interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        mixed.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("report");
    assert!(report.has_errors());
    assert!(!report.committed);
    assert_eq!(report.rows[1].errors[0].field, "lat");
    assert_eq!(company_count(&db).await, 2);

    let orphan = interchange::import(
        &db,
        EntityKind::Review,
        Format::Csv,
        csv.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("report");
    assert_eq!(orphan.totals.error, 1);
    assert_eq!(orphan.rows[0].errors[0].field, "company");
}

#[tokio::test]
async fn dry_runs_report_without_writing() {
    let db = Database::in_memory().await.expect("database");
    let report = interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions { dry_run: true },
    )
    .await
    .expect("dry run");
    assert_eq!(report.totals.new, 2);
    assert!(!report.committed);
    assert_eq!(company_count(&db).await, 0);
}

#[tokio::test]
async fn blank_required_choice_is_reported_on_its_column() {
    let db = Database::in_memory().await.expect("database");
    interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("seed");

    let report = interchange::import(
        &db,
        EntityKind::JobPosting,
        Format::Csv,
        b"company,title,source\n1,Engineer,\n",
        ImportOptions::default(),
    )
    .await
    .expect("report");
    assert_eq!(report.totals.error, 1);
    assert_eq!(
        report.rows[0].errors,
        vec![FieldError {
            field: "source".to_string(),
            message: "this field is required".to_string(),
        }]
    );
}

#[tokio::test]
async fn unknown_choice_codes_are_reported_on_their_column() {
    let db = Database::in_memory().await.expect("database");
    interchange::import(
        &db,
        EntityKind::Company,
        Format::Csv,
        COMPANIES.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("seed");

    let csv = "company,sentiment,duration\n1,furious,<3m\n1,positive,forever\n1,neutral,1-3y\n";
    let report = interchange::import(
        &db,
        EntityKind::Review,
        Format::Csv,
        csv.as_bytes(),
        ImportOptions::default(),
    )
    .await
    .expect("report");
    assert_eq!(report.totals.error, 2);
    assert_eq!(report.totals.new, 1);
    assert!(!report.committed);

    let sentiment = &report.rows[0].errors;
    assert_eq!(sentiment.len(), 1);
    assert_eq!(sentiment[0].field, "sentiment");
    assert!(sentiment[0].message.contains("furious"), "{}", sentiment[0].message);

    let duration = &report.rows[1].errors;
    assert_eq!(duration.len(), 1);
    assert_eq!(duration[0].field, "duration");
}
