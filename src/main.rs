use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parishbook::config::AppConfig;
use parishbook::db;
use parishbook::handlers;
use parishbook::services::gateway::razorpay::RazorpayGateway;
use parishbook::services::gateway::sandbox::SandboxGateway;
use parishbook::services::gateway::{GatewayConfig, PaymentGateway};
use parishbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let gateway: Box<dyn PaymentGateway> = match config.gateway_provider.as_str() {
        "razorpay" => {
            anyhow::ensure!(
                !config.razorpay_key_id.is_empty() && !config.razorpay_key_secret.is_empty(),
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set when PAYMENT_GATEWAY=razorpay"
            );
            tracing::info!("using Razorpay payment gateway");
            Box::new(RazorpayGateway::new(GatewayConfig {
                key_id: config.razorpay_key_id.clone(),
                key_secret: config.razorpay_key_secret.clone(),
                webhook_secret: config.webhook_secret.clone(),
                timeout: Duration::from_secs(config.gateway_timeout_secs),
            })?)
        }
        _ => {
            tracing::info!("using sandbox payment gateway");
            Box::new(SandboxGateway::new(config.webhook_secret.clone()))
        }
    };

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        gateway,
        events_tx,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/payment", post(handlers::webhook::payment_webhook))
        .route(
            "/api/bookings",
            get(handlers::bookings::list_bookings).post(handlers::bookings::create_booking),
        )
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/review",
            post(handlers::bookings::review_booking),
        )
        .route(
            "/api/bookings/:id/approve",
            post(handlers::bookings::approve_booking),
        )
        .route(
            "/api/bookings/:id/complete",
            post(handlers::bookings::complete_booking),
        )
        .route(
            "/api/bookings/:id/decline",
            post(handlers::bookings::decline_booking),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/order",
            post(handlers::payments::create_order),
        )
        .route(
            "/api/bookings/:id/capture",
            post(handlers::payments::confirm_capture),
        )
        .route("/api/events", get(handlers::events::events_stream))
        .route("/api/dev/seed", post(handlers::dev::seed_catalog))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
