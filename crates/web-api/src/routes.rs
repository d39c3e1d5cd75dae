use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use config::Transport;
use domain::{Message, UserId, UserProfile};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{error::ApiError, polling, state::AppState, websocket};

pub const HEALTH_BODY: &str = "Backend server is running!";

/// 构建路由；允许的来源无法解析为请求头时返回错误。
pub fn router(state: AppState) -> Result<Router, axum::http::header::InvalidHeaderValue> {
    let cors = cors_layer(&state.relay_config.allowed_origin)?;

    Ok(Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .nest("/api/v1", api_routes(&state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn api_routes(state: &AppState) -> Router<AppState> {
    let mut routes = Router::new()
        .route(
            "/conversations/{user_a}/{user_b}/messages",
            get(conversation_history),
        )
        .route("/users/{user_id}/profile", get(user_profile));

    for transport in &state.relay_config.transports {
        routes = match transport {
            Transport::WebSocket => routes.route("/ws", get(websocket::websocket_upgrade)),
            Transport::LongPolling => routes
                .route("/poll", post(polling::open_session))
                .route(
                    "/poll/{connection_id}",
                    get(polling::poll_events)
                        .post(polling::submit_event)
                        .delete(polling::close_session),
                ),
        };
    }
    routes
}

fn cors_layer(allowed_origin: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    let origin = HeaderValue::from_str(allowed_origin)?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true))
}

async fn health() -> &'static str {
    HEALTH_BODY
}

async fn conversation_history(
    State(state): State<AppState>,
    Path((user_a, user_b)): Path<(UserId, UserId)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.conversations.history(user_a, user_b).await?;
    Ok(Json(messages))
}

async fn user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.conversations.partner_profile(user_id).await?;
    Ok(Json(profile))
}
