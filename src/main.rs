// src/main.rs

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use config::{AppConfig, StoreBackend};
use db::{DocumentStore, MemoryStore};
use services::{audit::AuditSink, distribution::DistributionEngine, ledger::AssignmentLedger};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub ledger: Arc<AssignmentLedger>,
    pub engine: Arc<DistributionEngine>,
    pub audit: AuditSink,
}

impl AppState {
    /// Wire the core around `store`. The returned handle is the audit writer.
    pub fn new(store: Arc<dyn DocumentStore>) -> (Self, JoinHandle<()>) {
        let (audit, writer) = AuditSink::spawn(store.clone());
        let ledger = Arc::new(AssignmentLedger::new(store.clone()));
        let engine = Arc::new(DistributionEngine::new(
            store.clone(),
            ledger.clone(),
            audit.clone(),
        ));
        (Self { store, ledger, engine, audit }, writer)
    }
}

pub fn app(state: AppState) -> Router {
    // Very permissive CORS for local dev (tighten for prod)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // health
        .route("/health", get(routes::health::health))
        // auth
        .route("/api/v1/auth/login", post(routes::auth::login))
        // users
        .route(
            "/api/v1/users",
            post(routes::users::create_user).get(routes::users::list_users),
        )
        .route(
            "/api/v1/users/:id",
            patch(routes::users::patch_user).delete(routes::users::delete_user),
        )
        // leads
        .route(
            "/api/v1/leads",
            post(routes::leads::create_lead).get(routes::leads::list_leads),
        )
        .route("/api/v1/leads/parse", post(routes::leads::parse_leads))
        .route("/api/v1/leads/dump", post(routes::leads::dump_leads))
        .route("/api/v1/leads/:id/status", patch(routes::leads::patch_status))
        // distribution
        .route("/api/v1/distributions", post(routes::distributions::distribute))
        // assignment ledger
        .route(
            "/api/v1/assignments",
            post(routes::assignments::create_assignment).get(routes::assignments::list_assignments),
        )
        .route(
            "/api/v1/employees/:id/assignments/today",
            get(routes::assignments::today_count),
        )
        .route("/api/v1/employees/:id/leads", get(routes::leads::list_employee_leads))
        // sales
        .route(
            "/api/v1/sales",
            post(routes::sales::create_sale).get(routes::sales::list_sales),
        )
        .route("/api/v1/sales/summary", get(routes::sales::summary))
        // state & middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leaddesk_api=info,tower_http=info")),
        )
        .init();

    let cfg = AppConfig::from_env()?;

    let store: Arc<dyn DocumentStore> = match cfg.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let url = cfg.database_url.as_deref().unwrap_or_default();
            Arc::new(db::connect(url, cfg.max_connections).await?)
        }
    };
    let (state, _audit_writer) = AppState::new(store);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, backend = ?cfg.backend, "API listening");

    axum::serve(listener, app(state).into_make_service()).await?;
    Ok(())
}
