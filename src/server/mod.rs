//! Server initialization and routing

use crate::api;
use crate::config::{Config, DatabaseConfig, PolicyConfig};
use crate::directory::{DirectoryConnector, Ldap3Connect};
use crate::middleware::ObservabilityLayer;
use crate::policy::{CasbinRuleStore, PolicyEnforcer, PolicyStore};
use crate::repository::{GroupRepositoryImpl, UserRepositoryImpl};
use crate::service::{DirectorySyncService, GroupService, PolicyCoordinator};
use anyhow::{Context, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub group_service: Arc<GroupService>,
    pub directory: Arc<DirectoryConnector>,
    pub sync_service: Arc<DirectorySyncService>,
    pub policy: Arc<dyn PolicyStore>,
    pub enforcer: Arc<PolicyEnforcer>,
}

impl AppState {
    /// Wire the MySQL, casbin and LDAP implementations together.
    ///
    /// `policy_pool` must not be `db_pool`: a group transaction holds its
    /// connection while the policy command runs on the other pool.
    /// The enforcer starts empty; call `policy.reload_policy()` before serving.
    pub async fn new(config: Config, db_pool: MySqlPool, policy_pool: MySqlPool) -> Result<Self> {
        let enforcer = Arc::new(PolicyEnforcer::empty().await?);
        let policy: Arc<dyn PolicyStore> =
            Arc::new(CasbinRuleStore::new(policy_pool, enforcer.clone()));

        let group_repo = Arc::new(GroupRepositoryImpl::new(db_pool.clone()));
        let user_repo = Arc::new(UserRepositoryImpl::new(db_pool.clone()));

        let coordinator = PolicyCoordinator::new(policy.clone(), config.policy.reload_failure);
        let group_service = Arc::new(GroupService::new(group_repo, coordinator));

        let directory = Arc::new(DirectoryConnector::new(
            Arc::new(Ldap3Connect::new(config.ldap.clone())),
            &config.ldap,
        ));
        let sync_service = Arc::new(DirectorySyncService::new(directory.clone(), user_repo));

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            group_service,
            directory,
            sync_service,
            policy,
            enforcer,
        })
    }
}

/// Create the MySQL connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;
    Ok(pool)
}

/// Create the policy store's pool on the same database
pub async fn create_policy_pool(database: &DatabaseConfig, policy: &PolicyConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(policy.pool_max_connections)
        .min_connections(1)
        .acquire_timeout(database.acquire_timeout())
        .connect(&database.url)
        .await
        .context("Failed to connect policy store to database")?;
    Ok(pool)
}

/// Connect both pools and build the application state
pub async fn connect_state(config: Config) -> Result<AppState> {
    let db_pool = create_pool(&config.database).await?;
    let policy_pool = create_policy_pool(&config.database, &config.policy).await?;
    info!("Connected to database");
    AppState::new(config, db_pool, policy_pool).await
}

/// Reload the enforcer every `period` so a failed post-commit reload
/// converges without another mutation.
pub fn spawn_policy_reload(policy: Arc<dyn PolicyStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately; the caller already loaded
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match policy.reload_policy().await {
                Ok(()) => debug!("Periodic policy reload completed"),
                Err(e) => warn!(error = %e, "Periodic policy reload failed"),
            }
        }
    })
}

/// Run the HTTP server until interrupted
pub async fn run(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Result<()> {
    let http_addr = config.http_addr();
    let reload_interval = config.policy.reload_interval();
    let state = connect_state(config).await?;

    state
        .policy
        .reload_policy()
        .await
        .context("Initial policy load failed")?;
    info!(
        generation = state.enforcer.generation(),
        "Policy loaded"
    );

    let reloader = reload_interval.map(|period| {
        info!(interval_secs = period.as_secs(), "Periodic policy reload enabled");
        spawn_policy_reload(state.policy.clone(), period)
    });

    let app = build_router(state, prometheus_handle);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(reloader) = reloader {
        reloader.abort();
    }
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the HTTP router
pub fn build_router(state: AppState, prometheus_handle: Option<PrometheusHandle>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = state.config.request_timeout();

    let metrics = Router::new()
        .route("/metrics", get(api::metrics::metrics_handler))
        .with_state(Arc::new(prometheus_handle));

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        // Groups
        .route(
            "/api/v1/groups",
            get(api::group::list).post(api::group::create),
        )
        .route(
            "/api/v1/groups/{id}",
            get(api::group::get)
                .put(api::group::update)
                .delete(api::group::delete),
        )
        .route(
            "/api/v1/groups/{id}/permissions",
            put(api::group::update_permissions),
        )
        .route("/api/v1/groups/{id}/users", put(api::group::update_users))
        // Directory
        .route("/api/v1/ldap/login", post(api::directory::login))
        .route("/api/v1/ldap/password", post(api::directory::reset_password))
        .route("/api/v1/ldap/sync", post(api::directory::sync_users))
        // Policy diagnostics
        .route("/api/v1/policy/check", get(api::policy::check))
        .route("/api/v1/policy/reload", post(api::policy::reload))
        .with_state(state)
        .merge(metrics)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(ObservabilityLayer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
