use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use mood_quiz::{
    api::{create_router, AppState},
    auth::{AuthProvider, SupabaseAuth},
    config::{Config, LoggingConfig, StoreBackend},
    database::Database,
    display_name_cache::DisplayNameCache,
    log_system_event,
    quiz_service::QuizService,
    store::QuizStore,
    supabase::SupabaseStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Initialize logging with optional file output
    let _guard = setup_logging(&config.logging)?;

    config.validate()?;

    log_system_event!(startup, component = "server", "Starting mood quiz server");

    let store: Arc<dyn QuizStore> = match config.store.backend {
        StoreBackend::Supabase => {
            info!(url = %config.supabase.url, "Using managed backend store");
            Arc::new(SupabaseStore::new(&config.supabase.url, &config.supabase.anon_key))
        }
        StoreBackend::Sqlite => {
            let db = Database::new(&config.store.database_url).await?;
            info!(url = %config.store.database_url, "Local database initialized successfully");
            Arc::new(db)
        }
    };

    let auth: Arc<dyn AuthProvider> = Arc::new(SupabaseAuth::new(
        &config.supabase.url,
        &config.supabase.anon_key,
    ));

    let display_names = DisplayNameCache::new(
        config.cache.display_name_cache_size,
        config.cache.display_name_ttl_minutes,
    );

    let state = AppState {
        quiz_service: QuizService::new(store, display_names)
            .with_session_ttl(Duration::minutes(config.cache.quiz_session_ttl_minutes)),
        auth,
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,mood_quiz=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed()
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Set up file appender with daily rotation
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "mood-quiz.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        // No ANSI colors for files
        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
