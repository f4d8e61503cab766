use crate::server;
use clap::{Args, Parser, Subcommand};
use managerpulse::accounts::{AdminUser, NewAdmin};
use managerpulse::admin::{resolve_entity, AdminService};
use managerpulse::aggregation::{self, AggregationPolicy};
use managerpulse::bootstrap;
use managerpulse::config::AppConfig;
use managerpulse::domain::ValidationError;
use managerpulse::error::AppError;
use managerpulse::interchange::{Format, ImportOptions, InterchangeError};
use managerpulse::store::{Database, StoreError};
use managerpulse::telemetry;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "ManagerPulse Admin",
    about = "Run and maintain the ManagerPulse back-office",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap and start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply pending database migrations
    Migrate,
    /// Copy static assets into the static root and write the manifest
    Collectstatic,
    /// Create an administrator account
    Createsuperuser(CreateSuperuserArgs),
    /// Export one entity's records to a file or stdout
    Export(ExportArgs),
    /// Import records from a CSV, TSV or JSON file
    Import(ImportArgs),
    /// Recompute company aggregates from their reviews
    Recompute(RecomputeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
struct CreateSuperuserArgs {
    /// Defaults to SUPERUSER_USERNAME
    #[arg(long)]
    username: Option<String>,
    /// Defaults to SUPERUSER_EMAIL
    #[arg(long)]
    email: Option<String>,
    /// Defaults to SUPERUSER_PASSWORD
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Entity slug, e.g. `companies` or `job-postings`
    entity: String,
    #[arg(long, default_value = "csv")]
    format: String,
    /// Write to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Entity slug, e.g. `companies` or `reviews`
    entity: String,
    file: PathBuf,
    /// Defaults to the file extension
    #[arg(long)]
    format: Option<String>,
    /// Validate and report without writing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct RecomputeArgs {
    /// Only these companies; all companies when omitted
    #[arg(long = "company")]
    companies: Vec<i64>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => {
            let config = prepare()?;
            Database::connect(&config.database).await?.migrate().await?;
            Ok(())
        }
        Command::Collectstatic => {
            let config = prepare()?;
            match bootstrap::collect_static(&config.static_files)? {
                Some(report) => println!(
                    "{} static files copied, manifest at {}",
                    report.copied,
                    report.manifest.display()
                ),
                None => println!("no static source directory; nothing collected"),
            }
            Ok(())
        }
        Command::Createsuperuser(args) => create_superuser(&prepare()?, args).await,
        Command::Export(args) => export(&prepare()?, args).await,
        Command::Import(args) => import(&prepare()?, args).await,
        Command::Recompute(args) => recompute(&prepare()?, args).await,
    }
}

/// Configuration and logging for the one-shot maintenance commands.
fn prepare() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

async fn open(config: &AppConfig) -> Result<Database, AppError> {
    let database = Database::connect(&config.database).await?;
    database.migrate().await?;
    Ok(database)
}

async fn create_superuser(config: &AppConfig, args: CreateSuperuserArgs) -> Result<(), AppError> {
    let username = args.username.unwrap_or_else(|| config.superuser.username.clone());
    let Some(password) = args.password.or_else(|| config.superuser.password.clone()) else {
        let missing = ValidationError::field("password", "pass --password or set SUPERUSER_PASSWORD");
        return Err(StoreError::from(missing).into());
    };

    let database = open(config).await?;
    let mut conn = database.acquire().await?;
    let user = AdminUser::create(
        &mut conn,
        config.security.password_hasher(),
        &NewAdmin {
            username,
            email: Some(args.email.unwrap_or_else(|| config.superuser.email.clone())),
            password,
            is_superuser: true,
        },
    )
    .await?;
    println!("superuser '{}' created", user.username);
    Ok(())
}

async fn export(config: &AppConfig, args: ExportArgs) -> Result<(), AppError> {
    let kind = resolve_entity(&args.entity)?;
    let format: Format = args.format.parse()?;
    let service = AdminService::new(open(config).await?, AggregationPolicy::default());
    let bytes = service.export(kind, format, None).await?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &bytes).await?;
            info!(entity = %kind, path = %path.display(), "export written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn import(config: &AppConfig, args: ImportArgs) -> Result<(), AppError> {
    let kind = resolve_entity(&args.entity)?;
    let format = match args.format {
        Some(raw) => raw.parse::<Format>()?,
        None => Format::from_path(&args.file).ok_or_else(|| {
            InterchangeError::UnsupportedFormat(args.file.display().to_string())
        })?,
    };
    let data = tokio::fs::read(&args.file).await?;

    let service = AdminService::new(open(config).await?, AggregationPolicy::default());
    let report = service
        .import(kind, format, &data, ImportOptions { dry_run: args.dry_run })
        .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| format!("{report:?}"))
    );
    if report.has_errors() {
        std::process::exit(2);
    }
    Ok(())
}

async fn recompute(config: &AppConfig, args: RecomputeArgs) -> Result<(), AppError> {
    let database = open(config).await?;
    let policy = AggregationPolicy::default();
    let aggregates = if args.companies.is_empty() {
        aggregation::recompute_all(&database, &policy).await?
    } else {
        aggregation::recompute_companies(&database, &args.companies, &policy).await?
    };
    println!("{} aggregates recomputed", aggregates.len());
    Ok(())
}
