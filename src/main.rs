use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;

use replaysell::config::Config;
use replaysell::db::{AppState, BillingSettings, WebhookSecrets, create_pool, init_db, queries};
use replaysell::email::EmailService;
use replaysell::models::{
    CreateProduct, CreateSeller, EmbedMetadata, Platform, Subscription, SubscriptionKind,
    SubscriptionStatus,
};
use replaysell::oembed::OEmbedClient;
use replaysell::payments::{PaymentGateway, StripeClient};
use replaysell::tasks::{SweepSettings, spawn_sweeper};
use replaysell::util::now;

#[derive(Parser, Debug)]
#[command(name = "replaysell")]
#[command(about = "Shoppable storefronts for live-stream replays")]
struct Cli {
    /// Seed the database with a demo seller, replay and products (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Create a seller with this email, print its API key and exit
    #[arg(long, value_name = "EMAIL", requires = "name")]
    create_seller: Option<String>,

    /// Display name for --create-seller
    #[arg(long)]
    name: Option<String>,
}

/// Create a seller from the command line and print the one-time API key.
fn create_seller_and_exit(state: &AppState, email: &str, name: &str) {
    let input = CreateSeller {
        email: email.to_string(),
        name: name.to_string(),
    };
    if let Err(e) = input.validate() {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }

    let conn = state.db.get().expect("Failed to get db connection");
    match queries::create_seller(&conn, &input) {
        Ok((seller, api_key)) => {
            println!("Seller created");
            println!("  id:      {}", seller.id);
            println!("  email:   {}", seller.email);
            println!("  API key: {}", api_key);
            println!();
            println!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

/// Seeds a demo seller with a trialing plan, a live replay and two products.
/// Skipped when the database already has sellers.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_sellers(&conn).expect("Failed to count sellers");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let (seller, api_key) = queries::create_seller(
        &conn,
        &CreateSeller {
            email: "dev@replaysell.local".to_string(),
            name: "Dev Seller".to_string(),
        },
    )
    .expect("Failed to create dev seller");

    let ts = now();
    queries::save_subscription(
        &conn,
        &Subscription {
            seller_id: seller.id.clone(),
            kind: SubscriptionKind::Platform,
            stripe_subscription_id: "sub_dev_seed".to_string(),
            status: SubscriptionStatus::Trialing,
            price_id: None,
            current_period_end: Some(ts + 30 * 86400),
            cancel_at_period_end: false,
            last_event_at: ts,
            created_at: ts,
            updated_at: ts,
        },
    )
    .expect("Failed to create dev subscription");

    let replay = queries::create_replay(
        &conn,
        &seller.id,
        &queries::NewReplay {
            title: "Spring Drop".to_string(),
            video_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            platform: Platform::Youtube,
            embed: EmbedMetadata::default(),
            expires_at: ts + state.default_replay_hours * 3600,
        },
    )
    .expect("Failed to create dev replay");

    for (name, price_cents, stock) in [("Linen Tote", 2400, 25), ("Enamel Pin Set", 1200, 50)] {
        queries::create_product(
            &conn,
            &replay,
            &CreateProduct {
                name: name.to_string(),
                description: None,
                price_cents,
                currency: None,
                stock,
                image_url: None,
            },
        )
        .expect("Failed to create dev product");
    }

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Seller: {} ({})", seller.email, seller.id);
    tracing::info!("API Key: {}", api_key);
    tracing::info!("Storefront: {}", state.storefront_url(&replay.slug));
    tracing::info!("============================================");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replaysell=debug,tower_http=debug".into()),
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

    let payments: Option<Arc<dyn PaymentGateway>> = config
        .stripe
        .secret_key
        .as_ref()
        .map(|key| {
            let client = match config.stripe.api_base.as_deref() {
                Some(base) => StripeClient::new(key).with_api_base(base),
                None => StripeClient::new(key),
            };
            Arc::new(client) as Arc<dyn PaymentGateway>
        });
    if payments.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set: billing, onboarding and checkout are disabled");
    }

    let email = EmailService::new(config.resend_api_key.clone(), config.email_from.clone());
    if !email.is_enabled() {
        tracing::warn!("RESEND_API_KEY not set: emails will be logged, not sent");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        payments,
        webhook_secrets: WebhookSecrets {
            snapshot: [
                config.stripe.webhook_secret.clone(),
                config.stripe.connect_webhook_secret.clone(),
            ]
            .into_iter()
            .flatten()
            .collect(),
            thin: config.stripe.thin_webhook_secret.clone(),
        },
        billing: BillingSettings {
            platform_price_id: config.stripe.platform_price_id.clone(),
            connect_price_id: config.stripe.connect_price_id.clone(),
            platform_fee_bps: config.stripe.platform_fee_bps,
        },
        email: Arc::new(email),
        oembed: Arc::new(OEmbedClient::new()),
        default_replay_hours: config.default_replay_hours,
    };

    if let (Some(email), Some(name)) = (cli.create_seller.as_deref(), cli.name.as_deref()) {
        create_seller_and_exit(&state, email, name);
        return;
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set REPLAYSELL_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_sweeper(
        state.db.clone(),
        SweepSettings {
            pending_order_ttl_minutes: config.pending_order_ttl_minutes,
            webhook_event_retention_days: config.webhook_event_retention_days,
        },
    );

    let app = replaysell::app(state, config.rate_limit).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("ReplaySell listening on {}", addr);

    // Peer addresses are needed for per-IP rate limiting.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        for path in [db_path.clone(), format!("{}-wal", db_path), format!("{}-shm", db_path)] {
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!("Failed to remove {}: {}", path, e);
            }
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
