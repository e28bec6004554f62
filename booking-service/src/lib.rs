pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{routing::get, Router};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::BookingConfig;
use services::{
    BookingOrchestrator, BookingRepository, InvoiceReconciler, MongoCatalog, StripeClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: BookingConfig,
    pub orchestrator: Arc<BookingOrchestrator>,
}

/// Build the service router against an already-wired state. Kept apart
/// from `Application::build` so tests can drive the real routes with
/// in-process stores.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/booking",
            get(handlers::booking::get_booking)
                .put(handlers::booking::reschedule_booking)
                .delete(handlers::booking::cancel_booking),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    bind_address: String,
    router: Router,
}

impl Application {
    pub async fn build(config: BookingConfig) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("booking-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = Arc::new(BookingRepository::new(&db));
        repository.init_indexes().await?;

        let stripe = StripeClient::new(config.stripe.clone())?;
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!(
                "Stripe credentials not configured - invoice reconciliation will be limited"
            );
        }
        let reconciler = InvoiceReconciler::new(stripe, config.stripe.send_invoices);

        let catalog = Arc::new(MongoCatalog::new(&db));

        let orchestrator = Arc::new(BookingOrchestrator::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            catalog,
            reconciler,
        ));

        let state = AppState {
            config: config.clone(),
            orchestrator,
        };

        Ok(Self {
            bind_address: config.common.bind_address(),
            router: build_router(state),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.bind_address);

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }
}
