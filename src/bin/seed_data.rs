//! Seed data script - loads an inventory CSV into the database
//!
//! Run with: cargo run --bin seed-data -- --file inventory.csv
//!
//! The CSV goes through the same import pipeline as `POST /api/v1/inventory/import`:
//! products, zones and bins are created on the fly and duplicate rows for one
//! bin are summed. Optionally creates the first admin user so someone can log in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use binstock_api::{
    db,
    entities::user::UserRole,
    events::EventSender,
    services::{
        csv_import::{ImportService, ImportSummary},
        users::{CreateUserRequest, UserService},
    },
};

#[derive(Debug, Parser)]
#[command(name = "seed-data", about = "Import an inventory CSV into the binstock database")]
struct Cli {
    /// Inventory CSV (Bin ID, Product Code, Product Name, Unit, NS Code, NS Name, NS SubGroup, Quantity)
    #[arg(long)]
    file: PathBuf,

    /// Database URL; falls back to DATABASE_URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Rows per upsert batch
    #[arg(long, default_value_t = 200)]
    batch_size: usize,

    /// Apply migrations before importing
    #[arg(long)]
    migrate: bool,

    /// Create this admin user if it does not exist yet
    #[arg(long)]
    admin_username: Option<String>,

    /// Auth proxy employee id for the admin user
    #[arg(long, requires = "admin_username")]
    admin_employee_id: Option<String>,
}

async fn import_file(
    pool: Arc<db::DbPool>,
    path: &Path,
    batch_size: usize,
) -> anyhow::Result<ImportSummary> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    // Nobody consumes events here; keep the receiver alive so sends succeed
    let (tx, _rx) = mpsc::channel(16);
    let service = ImportService::new(pool, EventSender::new(tx), batch_size);
    Ok(service.import_csv(&text, None).await?)
}

async fn ensure_admin(
    pool: Arc<db::DbPool>,
    username: &str,
    employee_id: Option<String>,
) -> anyhow::Result<()> {
    let users = UserService::new(pool);
    if let Some(existing) = users.find_for_login(employee_id.as_deref(), username).await? {
        info!(user_id = %existing.id, "Admin user already exists");
        return Ok(());
    }
    let created = users
        .create_user(CreateUserRequest {
            username: username.to_string(),
            display_name: username.to_string(),
            role: UserRole::Admin,
            employee_id,
        })
        .await?;
    info!(user_id = %created.id, "Created admin user");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    info!("=== Binstock Seed Data ===");

    let pool = Arc::new(db::establish_connection(&cli.database_url).await?);
    if cli.migrate {
        db::run_migrations(&pool).await?;
    }

    if let Some(username) = cli.admin_username.as_deref() {
        ensure_admin(pool.clone(), username, cli.admin_employee_id.clone()).await?;
    }

    info!(file = %cli.file.display(), batch_size = cli.batch_size, "Importing inventory");
    let summary = import_file(pool.clone(), &cli.file, cli.batch_size).await?;

    info!("  Rows read:          {}", summary.rows_total);
    info!("  Rows skipped:       {}", summary.rows_skipped);
    info!("  Products created:   {}", summary.totals.products_created);
    info!("  Products updated:   {}", summary.totals.products_updated);
    info!("  Bins created:       {}", summary.totals.bins_created);
    info!("  Inventory updated:  {}", summary.totals.inventory_updated);
    info!("  Row errors:         {}", summary.totals.errors_count);
    info!("=== Seed Data Complete ===");

    Ok(())
}
