use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{BlogId, CommentId, PortfolioId},
    error::{ApiError, ErrorCode},
    protocol::{
        BlogForm, BlogPost, Comment, CommentForm, PortfolioForm, PortfolioItem, ServerEvent,
        SkillForm, SkillSummary, SortRequest, SortResponse, TopicForm, TopicSummary,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<ServerEvent>,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext { storage };
    let (events, _) = broadcast::channel(256);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, max_body_bytes = settings.max_body_bytes, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/portfolios", get(http_list_portfolios).post(http_create_portfolio))
        .route("/portfolios/angular", get(http_list_angular))
        .route("/portfolios/sort", post(http_sort_portfolios))
        .route(
            "/portfolios/:portfolio_id",
            get(http_get_portfolio)
                .put(http_update_portfolio)
                .delete(http_delete_portfolio),
        )
        .route("/topics", get(http_list_topics).post(http_create_topic))
        .route("/blogs", get(http_list_blogs).post(http_create_blog))
        .route("/blogs/:blog", get(http_get_blog).delete(http_delete_blog))
        .route("/blogs/:blog/toggle_status", post(http_toggle_blog_status))
        .route(
            "/blogs/:blog/comments",
            get(http_list_comments).post(http_create_comment),
        )
        .route("/comments/:comment_id", delete(http_delete_comment))
        .route("/skills", get(http_list_skills).post(http_create_skill))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(err: ApiError) -> HttpError {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

/// Publish to websocket subscribers. Having no subscribers is not an error.
fn publish(state: &AppState, event: &ServerEvent) {
    if state.events.send(event.clone()).is_err() {
        debug!("no websocket subscribers for event");
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        http_error(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    Ok("ok")
}

async fn http_list_portfolios(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PortfolioItem>>, HttpError> {
    let items = server_api::list_portfolios(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(items))
}

async fn http_list_angular(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PortfolioItem>>, HttpError> {
    let items = server_api::list_angular_portfolios(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(items))
}

async fn http_get_portfolio(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> Result<Json<PortfolioItem>, HttpError> {
    let item = server_api::get_portfolio(&state.api, PortfolioId(portfolio_id))
        .await
        .map_err(http_error)?;
    Ok(Json(item))
}

async fn http_create_portfolio(
    State(state): State<Arc<AppState>>,
    Json(form): Json<PortfolioForm>,
) -> Result<(StatusCode, Json<ServerEvent>), HttpError> {
    let event = server_api::create_portfolio(&state.api, form)
        .await
        .map_err(http_error)?;
    publish(&state, &event);
    Ok((StatusCode::CREATED, Json(event)))
}

async fn http_update_portfolio(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
    Json(form): Json<PortfolioForm>,
) -> Result<Json<ServerEvent>, HttpError> {
    let event = server_api::update_portfolio(&state.api, PortfolioId(portfolio_id), form)
        .await
        .map_err(http_error)?;
    publish(&state, &event);
    Ok(Json(event))
}

async fn http_delete_portfolio(
    State(state): State<Arc<AppState>>,
    Path(portfolio_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    let event = server_api::delete_portfolio(&state.api, PortfolioId(portfolio_id))
        .await
        .map_err(http_error)?;
    publish(&state, &event);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_sort_portfolios(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SortRequest>,
) -> Result<Json<SortResponse>, HttpError> {
    let event = server_api::sort_portfolios(&state.api, req)
        .await
        .map_err(http_error)?;
    let applied = match &event {
        ServerEvent::OrderApplied { order } => order.len(),
        _ => 0,
    };
    publish(&state, &event);
    Ok(Json(SortResponse { applied }))
}

async fn http_list_topics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TopicSummary>>, HttpError> {
    let topics = server_api::list_topics(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(topics))
}

async fn http_create_topic(
    State(state): State<Arc<AppState>>,
    Json(form): Json<TopicForm>,
) -> Result<(StatusCode, Json<TopicSummary>), HttpError> {
    let topic = server_api::create_topic(&state.api, form)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(topic)))
}

async fn http_list_blogs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BlogPost>>, HttpError> {
    let blogs = server_api::list_blogs(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(blogs))
}

async fn http_get_blog(
    State(state): State<Arc<AppState>>,
    Path(blog): Path<String>,
) -> Result<Json<BlogPost>, HttpError> {
    let blog = server_api::get_blog(&state.api, &blog)
        .await
        .map_err(http_error)?;
    Ok(Json(blog))
}

async fn http_create_blog(
    State(state): State<Arc<AppState>>,
    Json(form): Json<BlogForm>,
) -> Result<(StatusCode, Json<BlogPost>), HttpError> {
    let blog = server_api::create_blog(&state.api, form)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(blog)))
}

async fn http_toggle_blog_status(
    State(state): State<Arc<AppState>>,
    Path(blog): Path<i64>,
) -> Result<Json<ServerEvent>, HttpError> {
    let event = server_api::toggle_blog_status(&state.api, BlogId(blog))
        .await
        .map_err(http_error)?;
    publish(&state, &event);
    Ok(Json(event))
}

async fn http_delete_blog(
    State(state): State<Arc<AppState>>,
    Path(blog): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_blog(&state.api, BlogId(blog))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_comments(
    State(state): State<Arc<AppState>>,
    Path(blog): Path<i64>,
) -> Result<Json<Vec<Comment>>, HttpError> {
    let comments = server_api::list_comments(&state.api, BlogId(blog))
        .await
        .map_err(http_error)?;
    Ok(Json(comments))
}

async fn http_create_comment(
    State(state): State<Arc<AppState>>,
    Path(blog): Path<i64>,
    Json(form): Json<CommentForm>,
) -> Result<(StatusCode, Json<Comment>), HttpError> {
    let comment = server_api::create_comment(&state.api, BlogId(blog), form)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn http_delete_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_comment(&state.api, CommentId(comment_id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_skills(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SkillSummary>>, HttpError> {
    let skills = server_api::list_skills(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(skills))
}

async fn http_create_skill(
    State(state): State<Arc<AppState>>,
    Json(form): Json<SkillForm>,
) -> Result<(StatusCode, Json<SkillSummary>), HttpError> {
    let skill = server_api::create_skill(&state.api, form)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(skill)))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

/// Forward every broadcast event to one websocket client until either side
/// goes away.
async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events.subscribe());

    let send_task = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket subscriber lagged");
                    continue;
                }
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
