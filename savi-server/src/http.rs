// HTTP server: propagation streaming, health, GraphQL and media files

use crate::static_files::asset_routes;
use crate::streaming::frame_body;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use savi_api::SaviSchema;
use savi_core::protocol::{stream_content_type, BOUNDARY};
use savi_core::{parse_propagation_request, Error, SaviConfig, VideoCatalog};
use savi_inference::{orchestrator, InferenceEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn InferenceEngine>,
    pub catalog: Arc<VideoCatalog>,
    pub schema: SaviSchema,
    pub config: Arc<SaviConfig>,
    /// Flips to `true` when the server begins shutting down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        catalog: Arc<VideoCatalog>,
        config: SaviConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let schema = savi_api::create_schema(Arc::clone(&engine), Arc::clone(&catalog));
        Self {
            engine,
            catalog,
            schema,
            config: Arc::new(config),
            shutdown,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let network = &state.config.network;

    let mut router = Router::new()
        .route("/propagate_in_video", post(propagate_in_video_handler))
        .route("/healthy", get(healthy_handler))
        .route("/graphql", post(graphql_handler))
        .merge(asset_routes(&state.config.assets))
        .layer(DefaultBodyLimit::max(network.max_request_size))
        .layer(TraceLayer::new_for_http());

    if network.enable_cors {
        router = router.layer(cors_layer());
    }

    router.with_state(state)
}

/// Any origin, with credentials. Origin, methods and headers are echoed back
/// because wildcards are not allowed alongside credentials.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn plain_text(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message.into(),
    )
        .into_response()
}

/// Text sent back for a request that failed before streaming began
fn rejection_message(err: &Error) -> String {
    match err {
        Error::MissingField(field) => format!("Missing {}", field),
        Error::InvalidPayload(message) => message.clone(),
        other => other.to_string(),
    }
}

async fn healthy_handler() -> Response {
    plain_text(StatusCode::OK, "OK")
}

async fn propagate_in_video_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let command = match parse_propagation_request(&body) {
        Ok(command) => command,
        Err(e) => {
            warn!("Rejected propagation request: {}", e);
            return plain_text(StatusCode::BAD_REQUEST, rejection_message(&e));
        }
    };

    info!(
        "Propagating session {} from frame {} (quick test: {})",
        command.session_id, command.start_frame_index, command.quick_test_mode
    );
    let session_id = command.session_id.clone();
    let mut frames = orchestrator::propagate(Arc::clone(&state.engine), command, BOUNDARY);

    // The status line depends on whether the engine can start at all, so the
    // first message is pulled before anything is committed.
    let first = match frames.next().await {
        Some(Ok(first)) => first,
        Some(Err(e @ Error::SessionNotFound(_))) => {
            warn!("Propagation for unknown session {}", session_id);
            return plain_text(StatusCode::NOT_FOUND, rejection_message(&e));
        }
        Some(Err(e)) => {
            error!("Propagation for session {} failed to start: {}", session_id, e);
            return plain_text(StatusCode::INTERNAL_SERVER_ERROR, rejection_message(&e));
        }
        None => {
            info!("Session {} produced no frames", session_id);
            return stream_response(Body::empty());
        }
    };

    let body = frame_body(session_id, first, frames, state.shutdown.clone());
    stream_response(Body::from_stream(body))
}

fn stream_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, stream_content_type(BOUNDARY))],
        body,
    )
        .into_response()
}

async fn graphql_handler(
    State(state): State<AppState>,
    Json(request): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    Json(state.schema.execute(request).await)
}
