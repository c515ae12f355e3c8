use axum::{
    Router,
    http::{HeaderName, Request},
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::net::SocketAddr;

use foodcourt_api::{
    config::AppConfig,
    db,
    middleware::rate_limit::rate_limit_middleware,
    routes::{self, doc::scalar_docs},
    services::auth_service,
    state::AppState,
    tasks,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,foodcourt_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let host = config.host.clone();
    let port = config.port;

    let orm = db::create_orm_conn(&config.database_url).await?;
    db::run_migrations(&orm).await?;
    auth_service::ensure_superadmin(&orm).await?;

    let state = AppState::new(orm, config)?;

    let shutdown = CancellationToken::new();
    let ticker_handle = tasks::spawn_background_tasks(state.clone(), shutdown.clone());

    let api_router = routes::create_api_router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        rate_limit_middleware,
    ));

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_router)
        .merge(scalar_docs())
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(ConcurrencyLimitLayer::new(100))
        .with_state(state);

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    tracing::info!("listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = ticker_handle.await;

    Ok(())
}
