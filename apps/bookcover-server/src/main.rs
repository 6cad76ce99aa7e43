//! Book cover upload server
//!
//! Accepts a PDF plus front and back cover PNGs, inserts the covers as new
//! first and last pages, and pushes the result into the Shopify store's
//! Files section through a staged upload. Provides:
//!
//! - `POST /upload` - composite covers, queue Shopify registration
//! - `GET /api/registrations/:id` - registration outcome
//! - `POST /rate` - update the configured variant's price
//! - `GET /` and `/uploads/*` - upload form and stored PDFs
//!
//! ## Architecture
//!
//! Compositing happens inside the request; the Shopify registration runs on
//! a background queue after the response has been formed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use bookcover_core::{ComposeOptions, PageSize};
use clap::Parser;
use shopify_admin::{ShopifyClient, ShopifyConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod registration;
mod state;
#[cfg(test)]
mod tests;

use api::{handle_health, handle_rate, handle_registration_status, handle_upload};
use registration::StatusRetention;
use state::{AppState, ServerConfig};

/// Upload form shipped with the crate, independent of the working directory
const DEFAULT_STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Command-line arguments for the book cover server
#[derive(Parser, Debug)]
#[command(name = "bookcover-server")]
#[command(about = "Composites book covers onto PDFs and registers them with Shopify")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory for uploaded and composited PDFs
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory containing index.html
    #[arg(long, env = "STATIC_DIR", default_value = DEFAULT_STATIC_DIR)]
    static_dir: PathBuf,

    /// Store URL, e.g. https://example.myshopify.com
    #[arg(long, env = "SHOPIFY_STORE_URL")]
    store_url: String,

    /// Admin API access token
    #[arg(long, env = "ADMIN_API_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Admin API version
    #[arg(long, env = "SHOPIFY_API_VERSION", default_value = "2024-10")]
    api_version: String,

    /// Variant whose price POST /rate updates
    #[arg(long, env = "SHOPIFY_VARIANT_ID")]
    variant_id: Option<u64>,

    /// Size of the inserted cover pages: a4 or letter
    #[arg(long, default_value = "a4")]
    cover_page_size: PageSize,

    /// Maximum request body size in megabytes
    #[arg(long, default_value = "50")]
    max_upload_mb: usize,

    /// Delete the uploaded and composited PDFs once Shopify has registered the file
    #[arg(long)]
    delete_after_register: bool,

    /// Seconds a finished registration stays visible at /api/registrations/:id
    #[arg(long, default_value = "3600")]
    status_retention_secs: u64,

    /// Maximum number of finished registrations kept in memory
    #[arg(long, default_value = "1000")]
    max_finished_statuses: usize,

    /// Timeout for each Shopify request in seconds
    #[arg(long, default_value = "60")]
    http_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Assemble routes, static file services and middleware
fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Permissive CORS for the browser upload form
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // Upload form
        .route_service("/", ServeFile::new(config.static_dir.join("index.html")))
        // API endpoints
        .route("/upload", post(handle_upload))
        .route("/rate", post(handle_rate))
        .route("/api/registrations/:id", get(handle_registration_status))
        // Stored PDFs
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .fallback_service(ServeDir::new(&config.static_dir))
        // Apply middleware
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tokio::fs::create_dir_all(&args.upload_dir).await?;

    let shopify = ShopifyConfig {
        store_url: args.store_url,
        access_token: args.access_token,
        api_version: args.api_version,
        timeout: Duration::from_secs(args.http_timeout_secs),
    };
    info!("Using Admin API at {}", shopify.graphql_url());
    let client = ShopifyClient::new(shopify)?;

    let config = ServerConfig {
        upload_dir: args.upload_dir,
        static_dir: args.static_dir,
        compose: ComposeOptions {
            page_size: args.cover_page_size,
        },
        variant_id: args.variant_id,
        delete_after_register: args.delete_after_register,
        max_upload_bytes: args.max_upload_mb * 1024 * 1024,
        status_retention: StatusRetention {
            ttl: Duration::from_secs(args.status_retention_secs),
            max_finished: args.max_finished_statuses,
        },
    };

    if config.variant_id.is_none() {
        info!("SHOPIFY_VARIANT_ID not set, POST /rate will answer 503");
    }

    let state = AppState::new(config, Arc::new(client));
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server is running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
