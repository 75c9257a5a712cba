use event_triggers_scheduler::{
    ExecutionLog, InMemoryExecutionLog, InMemoryTriggerStore, TokioClock, TriggerRegistry,
    TriggerStore,
};
use event_triggers_server::{
    action::LogAction,
    config::ServerConfig,
    db::{PgExecutionLog, PgTriggerStore},
    routes::{AppState, router},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let (store, log): (Arc<dyn TriggerStore>, Arc<dyn ExecutionLog>) = match &config.database_url
    {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(config.max_db_connections)
                .connect(database_url)
                .await
                .expect("failed to connect to database");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .expect("failed to run migrations");

            let store: Arc<dyn TriggerStore> = Arc::new(PgTriggerStore::new(db_pool.clone()));
            let log: Arc<dyn ExecutionLog> = Arc::new(PgExecutionLog::new(db_pool));
            (store, log)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; triggers will not survive a restart");
            let store: Arc<dyn TriggerStore> = Arc::new(InMemoryTriggerStore::new());
            let log: Arc<dyn ExecutionLog> = Arc::new(InMemoryExecutionLog::new());
            (store, log)
        }
    };

    // Rebuild the schedule from the store and start the timer engine
    let (registry, engine_task) = TriggerRegistry::start(
        store,
        log,
        Arc::new(LogAction),
        Arc::new(TokioClock::new()),
        config.scheduler,
    )
    .await
    .expect("failed to start scheduler");
    let registry = Arc::new(registry);

    let app = router(AppState::new(Arc::clone(&registry)));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("Stopping scheduler, waiting for in-flight firings");
    registry.shutdown().await;
    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "timer engine task failed");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
