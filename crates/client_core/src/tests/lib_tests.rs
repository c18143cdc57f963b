use super::*;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode as HttpStatus,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct ServerState {
    batches: Arc<Mutex<Vec<Vec<OrderEntry>>>>,
}

async fn handle_sort(
    State(state): State<ServerState>,
    Json(req): Json<SortRequest>,
) -> Result<Json<SortResponse>, (HttpStatus, Json<ApiError>)> {
    let entries = req.order.into_entries();
    if entries.iter().any(|entry| entry.id < 0) {
        return Err((
            HttpStatus::BAD_REQUEST,
            Json(ApiError::validation("negative id")),
        ));
    }
    let applied = entries.len();
    state.batches.lock().expect("lock").push(entries);
    Ok(Json(SortResponse { applied }))
}

async fn handle_ws(ws: WebSocketUpgrade) -> impl IntoResponse {
    use axum::extract::ws::Message;
    ws.on_upgrade(|mut socket| async move {
        let event = ServerEvent::OrderApplied {
            order: vec![OrderEntry { id: 5, position: 0 }],
        };
        let text = serde_json::to_string(&event).expect("json");
        let _ = socket.send(Message::Text("not json".to_string())).await;
        let _ = socket.send(Message::Text(text)).await;
        let _ = socket.send(Message::Close(None)).await;
    })
}

async fn spawn_server() -> std::io::Result<(String, ServerState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/portfolios/sort", post(handle_sort))
        .route(
            "/portfolios",
            get(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/ws", get(handle_ws))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), state))
}

#[tokio::test]
async fn submit_posts_the_whole_batch() {
    let (server_url, state) = spawn_server().await.expect("spawn server");
    let client = OrderClient::new(server_url);

    let entries = vec![
        OrderEntry { id: 2, position: 0 },
        OrderEntry { id: 1, position: 1 },
    ];
    let applied = client.submit(entries.clone()).await.expect("submit");

    assert_eq!(applied.applied, 2);
    assert_eq!(*state.batches.lock().expect("lock"), vec![entries]);
}

#[tokio::test]
async fn rejected_batch_surfaces_server_error() {
    let (server_url, state) = spawn_server().await.expect("spawn server");
    let client = OrderClient::new(server_url);

    let err = client
        .submit(vec![OrderEntry { id: -1, position: 0 }])
        .await
        .expect_err("should be rejected");

    let ClientError::Rejected { status, error } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(*status, StatusCode::BAD_REQUEST);
    assert_eq!(error.message, "negative id");
    assert_eq!(err.code(), Some(ErrorCode::Validation));
    assert!(state.batches.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn non_json_failure_still_maps_to_rejected() {
    let (server_url, _state) = spawn_server().await.expect("spawn server");
    let client = OrderClient::new(server_url);

    let err = client.list_portfolios().await.expect_err("should fail");
    assert!(matches!(
        err,
        ClientError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            ..
        }
    ));
    assert_eq!(err.code(), Some(ErrorCode::Internal));
}

#[tokio::test]
async fn subscribe_yields_decodable_events() {
    let (server_url, _state) = spawn_server().await.expect("spawn server");
    let client = OrderClient::new(server_url);

    let mut feed = client.subscribe().await.expect("subscribe");
    let event = tokio::time::timeout(std::time::Duration::from_secs(5), feed.recv())
        .await
        .expect("event in time")
        .expect("event");

    let ServerEvent::OrderApplied { order } = event else {
        panic!("unexpected event");
    };
    assert_eq!(order, vec![OrderEntry { id: 5, position: 0 }]);
}

#[test]
fn websocket_url_swaps_scheme_and_path() {
    assert_eq!(
        websocket_url("http://127.0.0.1:8443").expect("url").as_str(),
        "ws://127.0.0.1:8443/ws"
    );
    assert_eq!(
        websocket_url("https://example.com").expect("url").as_str(),
        "wss://example.com/ws"
    );
    assert!(matches!(
        websocket_url("ftp://example.com"),
        Err(ClientError::InvalidUrl(_))
    ));
    assert!(matches!(
        websocket_url("not a url"),
        Err(ClientError::InvalidUrl(_))
    ));
}

#[test]
fn server_url_drops_trailing_slash() {
    assert_eq!(
        OrderClient::new("http://localhost:8443/").server_url(),
        "http://localhost:8443"
    );
}
