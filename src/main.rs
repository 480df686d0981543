use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotlight::config::Config;
use spotlight::db::{create_pool, init_db, queries, AppState, DbPool};
use spotlight::handlers;
use spotlight::models::{ApprovalStatus, CreateBusiness, CreateCoupon, DiscountKind};
use spotlight::payments::{StripeClient, StripeWebhookVerifier};

#[derive(Parser, Debug)]
#[command(name = "spotlight")]
#[command(about = "Featured-listing entitlements for a business directory")]
struct Cli {
    /// Seed the database with dev data (an approved business and two coupons)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Print open reconciliation notes and exit
    #[arg(long)]
    list_reconciliation: bool,
}

/// Seeds the database with dev data for testing.
/// Only runs in dev mode and never twice for the same owner.
fn seed_dev_data(pool: &DbPool) {
    const DEV_OWNER: &str = "dev-user";

    let conn = pool.get().expect("Failed to get db connection for seeding");

    if queries::get_coupon_by_code(&conn, "LAUNCH10")
        .expect("Failed to check for seeded coupon")
        .is_some()
    {
        tracing::info!("Database already has dev data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let business = queries::create_business(
        &conn,
        &CreateBusiness {
            name: "Dev Coffee Roasters".to_string(),
            owner_id: DEV_OWNER.to_string(),
            status: ApprovalStatus::Approved,
        },
    )
    .expect("Failed to create dev business");

    let percent = queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "LAUNCH10".to_string(),
            discount_kind: DiscountKind::Percentage,
            discount_value: 10,
            max_uses: Some(100),
            valid_from: None,
            valid_until: None,
        },
    )
    .expect("Failed to create dev percentage coupon");

    let fixed = queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "FLAT5".to_string(),
            discount_kind: DiscountKind::Fixed,
            discount_value: 500,
            max_uses: Some(1),
            valid_from: None,
            valid_until: None,
        },
    )
    .expect("Failed to create dev fixed coupon");

    tracing::info!("Business: {} (id: {})", business.name, business.id);
    tracing::info!("Owner (X-User-Id): {}", DEV_OWNER);
    tracing::info!("Coupons: {} (10%), {} ($5, single use)", percent.code, fixed.code);

    // Copy-paste friendly output (no log formatting)
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  business_id: {}", business.id);
    println!("  user_id: {}", DEV_OWNER);
    println!("--- END COPY ---");
    println!();
}

fn print_open_reconciliation_notes(pool: &DbPool) {
    let conn = pool.get().expect("Failed to get db connection");
    let notes =
        queries::list_open_reconciliation_notes(&conn).expect("Failed to list reconciliation notes");

    if notes.is_empty() {
        println!("No open reconciliation notes.");
        return;
    }

    println!("{} open reconciliation note(s):", notes.len());
    for note in notes {
        println!(
            "  [{}] {} reference={} business={} listing={} coupon={} {}",
            note.id,
            note.kind.as_str(),
            note.payment_reference,
            note.business_id,
            note.featured_listing_id.as_deref().unwrap_or("-"),
            note.coupon_code.as_deref().unwrap_or("-"),
            note.details.as_deref().unwrap_or(""),
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotlight=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    if cli.list_reconciliation {
        print_open_reconciliation_notes(&db_pool);
        return;
    }

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set SPOTLIGHT_ENV=dev)");
        } else {
            seed_dev_data(&db_pool);
        }
    }

    let processor = StripeClient::new(&config.stripe, config.checkout_timeout)
        .expect("Failed to build payment processor client");

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        processor: Arc::new(processor),
        checkout_timeout: config.checkout_timeout,
        webhook_verifier: StripeWebhookVerifier::new(config.stripe.webhook_secret.clone()),
        http_client: reqwest::Client::new(),
        alert_webhook_url: config.alert_webhook_url.clone(),
    };

    let app: Router = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Track if we should clean up on exit
    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Spotlight server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
