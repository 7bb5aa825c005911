//! WebSocket gateway for Brandloom.
//!
//! One live connection maps to one session. The socket carries user messages
//! in, and status events plus terminal replies out. Chat binding is a control
//! frame on the same socket.
//!
//! Built on Axum.

pub mod ws;

use std::sync::Arc;

use axum::{Router, response::Json, routing::get};
use brandloom_runtime::AgentRuntime;
use brandloom_session::SessionRegistry;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state handed to every connection.
///
/// Both the registry and the runtime are constructed once at startup and
/// passed in; the gateway never owns a global.
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub runtime: Arc<AgentRuntime>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until shutdown.
pub async fn start(
    config: &brandloom_config::GatewayConfig,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use brandloom_core::error::ModelError;
    use brandloom_core::{ChatModel, ModelRequest, ToolRegistry, stock_profiles};
    use brandloom_memory::InMemoryStore;
    use brandloom_runtime::RegistryPromptBuilder;
    use tower::ServiceExt;

    struct NullModel;

    #[async_trait::async_trait]
    impl ChatModel for NullModel {
        fn id(&self) -> &str {
            "null"
        }
        async fn complete(&self, _request: ModelRequest) -> Result<String, ModelError> {
            Err(ModelError::NotConfigured("test".into()))
        }
    }

    fn test_state() -> SharedState {
        let profiles = stock_profiles();
        let agent_names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(InMemoryStore::new()),
            agent_names,
            200,
            50,
        ));
        let tools = Arc::new(ToolRegistry::new());
        let prompts = Arc::new(RegistryPromptBuilder::new(tools.clone()));
        let runtime = Arc::new(AgentRuntime::new(
            Arc::new(NullModel),
            tools,
            prompts,
            profiles,
        ));
        Arc::new(GatewayState { registry, runtime })
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_get() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        // No upgrade headers: the handshake must be refused, not served
        assert_ne!(response.status(), StatusCode::OK);
    }
}
