use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{Router, middleware, routing::get};
use smart_launch_auth::http::{HeaderResourceOwnerResolver, OAuthState, oauth_router};
use smart_launch_auth::storage::{InMemoryClientRegistry, MemoryTokenStore, TokenStore};
use smart_launch_auth::token::JwtService;
use tokio::task::JoinHandle;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use url::Url;

use crate::{config::AppConfig, handlers, middleware as app_middleware};

pub struct SmartLaunchServer {
    addr: SocketAddr,
    app: Router,
    store: Arc<dyn TokenStore>,
    cleanup_interval: Duration,
}

pub fn build_app(cfg: &AppConfig, state: OAuthState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    oauth_router(state)
        .route("/healthz", get(handlers::healthz))
        // Middleware stack (outermost last: request id -> trace -> timeout -> cors/compression -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(cfg.request_timeout()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    // Query strings carry codes and launch tokens; log the path only
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<SmartLaunchServer> {
        let cfg = self.config;

        let clients = cfg
            .clients
            .iter()
            .cloned()
            .map(|c| c.into_client())
            .collect::<Result<Vec<_>, String>>()
            .map_err(anyhow::Error::msg)?;
        let client_count = clients.len();
        let registry = InMemoryClientRegistry::new(clients)
            .map_err(|(id, e)| anyhow::anyhow!("client '{id}': {e}"))?;

        let jwt = JwtService::from_config(&cfg.auth).context("signing key setup failed")?;
        let base_url = Url::parse(&cfg.base_url()).context("invalid server.base_url")?;

        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let state = OAuthState::new(
            &cfg.auth,
            &base_url,
            Arc::clone(&store),
            Arc::new(registry),
            Arc::new(jwt),
            Arc::new(HeaderResourceOwnerResolver::new(cfg.identity.clone())),
        );

        tracing::info!(
            issuer = %cfg.auth.issuer,
            base_url = %base_url,
            clients = client_count,
            launch_issuance = cfg.auth.launch.issuance_enabled,
            algorithm = %cfg.auth.signing.algorithm,
            "Authorization server configured"
        );

        Ok(SmartLaunchServer {
            addr: self.addr,
            app: build_app(&cfg, state),
            store,
            cleanup_interval: cfg.store.cleanup_interval,
        })
    }
}

impl SmartLaunchServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = spawn_cleanup(Arc::clone(&self.store), self.cleanup_interval);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        cleanup.abort();
        result?;
        Ok(())
    }
}

/// Periodically removes expired entries from the store.
fn spawn_cleanup(store: Arc<dyn TokenStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Removed expired store entries"),
                Err(e) => tracing::warn!(error = %e, "Store cleanup failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.auth.signing.algorithm = smart_launch_auth::token::SigningAlgorithm::HS256;
        cfg.auth.signing.secret = Some("an-hmac-secret-that-is-long-enough!!".to_string());
        cfg.clients = vec![
            toml::from_str(
                r#"
client_id = "app"
redirect_uris = ["https://app.example.com/cb"]
scopes = ["launch", "patient/*.read"]
"#,
            )
            .unwrap(),
        ];
        cfg
    }

    #[tokio::test]
    async fn test_healthz_and_request_id() {
        let server = ServerBuilder::new().with_config(test_config()).build().unwrap();
        let response = server
            .router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_request_id_is_preserved() {
        let server = ServerBuilder::new().with_config(test_config()).build().unwrap();
        let response = server
            .router()
            .oneshot(
                Request::get("/.well-known/smart-configuration")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_launch_route_follows_config() {
        let server = ServerBuilder::new().with_config(test_config()).build().unwrap();
        let response = server
            .router()
            .oneshot(
                Request::post("/launch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"clientId":"app"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_client_fails_build() {
        let mut cfg = test_config();
        cfg.clients[0].redirect_uris.clear();
        assert!(ServerBuilder::new().with_config(cfg).build().is_err());
    }
}
