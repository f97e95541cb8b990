use axum::Router;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::todo::web::{TodoState, create_todo_router};

pub mod api;

/// Builds the complete application router on top of an already migrated connection.
pub fn create_app(db: DatabaseConnection, config: &Config) -> Router {
    let todo_state = Arc::new(TodoState {
        db: Arc::new(db),
        page_size: config.page_size,
    });

    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_todo_router(todo_state.clone()))
        .merge(api::create_api_router(todo_state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = create_app(db, &config);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
