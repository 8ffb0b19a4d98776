mod authentication;
mod config;
mod data_formats;
mod db_helpers;
mod errors;
mod handlers;
mod models;
mod policy;

use std::{
    net::{SocketAddr, TcpListener},
    str::FromStr,
    sync::Arc,
};

use anyhow::Context;
pub use anyhow::Result;
use axum::http::{HeaderValue, StatusCode};
use axum::{routing::*, Extension, Json, Router};
use handlers::*;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use authentication::TokenIssuer;
pub use config::Config;
pub use db_helpers::{set_user_active_in_db, set_user_admin_in_db};
pub use errors::RequestError;

pub type JsonResponse<T> = (StatusCode, Json<T>);

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("forum=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run_app(config: Config) -> Result<()> {
    let pool = init_db(&config).await?;
    let listener = TcpListener::bind(config.bind_address)
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "server started");
    serve(listener, pool, &config).await
}

/// Serves the API on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, pool: SqlitePool, config: &Config) -> Result<()> {
    let issuer = TokenIssuer::new(config.jwt_secret.as_bytes(), config.token_lifetime);
    let app = make_router(pool, issuer, &config.cors_origins);
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

pub async fn init_db(config: &Config) -> Result<SqlitePool> {
    let db_url = config.database_url.as_str();
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        tracing::info!(url = db_url, "creating database");
        Sqlite::create_database(db_url)
            .await
            .context("Failed to create database")?;
    }
    let options = SqliteConnectOptions::from_str(db_url)
        .context("DATABASE_URL is not a valid SQLite URL")?
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.pool_size)
        .max_lifetime(config.pool_recycle)
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("migrations completed");
    Ok(pool)
}

pub fn get_random_free_port() -> Result<(u16, TcpListener)> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Could not get a free port")?;
    let addr: SocketAddr = listener.local_addr()?;
    Ok((addr.port(), listener))
}

pub fn make_router(pool: SqlitePool, issuer: TokenIssuer, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .route("/check_health", get(alive))
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/user", get(get_current_user))
        .route("/users/:id", get(get_user))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/posts/:id/pin", put(pin_post))
        .route(
            "/posts/:id/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/comments/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .fallback(not_found)
        .layer(Extension(Arc::new(pool)))
        .layer(Extension(Arc::new(issuer)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
