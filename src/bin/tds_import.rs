use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tds_attendance::{
    auth::{load_env_file, Site, SiteCredentials},
    data::store::Store,
    params::{RawParams, RunParams},
    pipeline,
    report::Reporter,
    semesters::SemesterCalendar,
    tds::TdsClient,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
/// Imports attendance data from the TDS API into the database.
///
/// Site credentials come from TDS_LIVE_* or TDS_TEST_* environment variables
/// (BASE_URL, ACCESS_USERNAME, ACCESS_PASSWORD), read from .env if present.
struct Args {
    /// What the report is keyed by. Only `module` is supported
    #[arg(long)]
    reportby: String,

    /// Teaching week, 1-52
    #[arg(long, allow_hyphen_values = true)]
    week: String,

    /// Academic year, 2018-2030
    #[arg(long, allow_hyphen_values = true)]
    ay: String,

    /// `yes` to use the live TDS site, anything else for test
    #[arg(long = "live_site")]
    live_site: String,

    /// `yes` to delete ALL stored attendance before importing
    #[arg(long = "del_existing", default_value = "No")]
    del_existing: String,

    /// SQLite database holding modules, course memberships and attendance
    #[arg(long, env = "TDS_DATABASE", default_value = "attendance.sqlite3")]
    database: PathBuf,

    /// JSON map of module semester suffix to academic year
    #[arg(long, env = "TDS_SEMESTERS", default_value = "semesters.json")]
    semesters: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| ["tds_import=info", "tds_attendance=debug"].join(",").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env_file = load_env_file()?;
    let args = Args::parse();

    // nothing is read or written until the parameters check out
    let params = RunParams::try_from(&RawParams {
        reportby: args.reportby,
        week: args.week,
        ay: args.ay,
        live_site: args.live_site,
        del_existing: args.del_existing,
    })?;

    if let Some(path) = env_file {
        info!(path = %path.display(), "loaded environment");
    }
    let credentials = SiteCredentials::from_env(Site::from_flag(params.live_site))?;

    let calendar = SemesterCalendar::load(&args.semesters)?;
    let mut store = Store::open(&args.database)?;
    let client = TdsClient::new(&credentials).context("failed to build HTTP client")?;

    let summary = pipeline::run(
        &params,
        client.base_url(),
        &mut store,
        &client,
        &calendar,
        &Reporter::default(),
    )
    .await?;

    println!(
        "created {} new rows, {} rows for week {} of {}",
        summary.created, summary.total, params.week, params.ay
    );
    Ok(())
}
