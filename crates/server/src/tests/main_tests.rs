use super::*;
use axum::{body, body::Body, http::Request};
use serde::de::DeserializeOwned;
use shared::protocol::OrderEntry;
use tower::ServiceExt;

async fn test_app(max_body_bytes: usize) -> (Router, Storage, broadcast::Sender<ServerEvent>) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage: storage.clone(),
    };
    let (events, _) = broadcast::channel(32);
    let app = build_router(
        Arc::new(AppState {
            api,
            events: events.clone(),
        }),
        max_body_bytes,
    );
    (app, storage, events)
}

fn json_request(method: &str, uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .expect("request")
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn seed_portfolios(storage: &Storage, titles: &[&str]) -> Vec<i64> {
    let mut ids = Vec::new();
    for title in titles {
        let item = storage
            .create_portfolio(&PortfolioForm {
                title: title.to_string(),
                body: "body".to_string(),
                ..PortfolioForm::default()
            })
            .await
            .expect("portfolio");
        ids.push(item.id.0);
    }
    ids
}

#[test]
fn error_codes_map_to_http_statuses() {
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCode::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(
        status_for(ErrorCode::Internal),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _storage, _events) = test_app(64 * 1024).await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn sort_route_persists_order_and_broadcasts() {
    let (app, storage, events) = test_app(64 * 1024).await;
    let ids = seed_portfolios(&storage, &["a", "b", "c"]).await;
    let mut feed = events.subscribe();

    let request = json_request(
        "POST",
        "/portfolios/sort",
        serde_json::json!({
            "order": {
                "0": { "id": ids[1], "position": 0 },
                "1": { "id": ids[2], "position": 1 },
                "2": { "id": ids[0], "position": 2 }
            }
        }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let sorted: SortResponse = read_json(response).await;
    assert_eq!(sorted.applied, 3);

    let listed = app
        .oneshot(Request::get("/portfolios").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let items: Vec<PortfolioItem> = read_json(listed).await;
    assert_eq!(
        items.iter().map(|item| item.id.0).collect::<Vec<_>>(),
        vec![ids[1], ids[2], ids[0]]
    );

    let ServerEvent::OrderApplied { order } = feed.try_recv().expect("event") else {
        panic!("expected order_applied");
    };
    assert_eq!(order[0], OrderEntry { id: ids[1], position: 0 });
}

#[tokio::test]
async fn invalid_sort_batches_are_rejected_whole() {
    let (app, storage, _events) = test_app(64 * 1024).await;
    let ids = seed_portfolios(&storage, &["a", "b"]).await;

    let duplicate_position = json_request(
        "POST",
        "/portfolios/sort",
        serde_json::json!({ "order": [
            { "id": ids[1], "position": 0 },
            { "id": ids[0], "position": 0 }
        ]}),
    );
    let response = app.clone().oneshot(duplicate_position).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Validation);

    let unknown_id = json_request(
        "POST",
        "/portfolios/sort",
        serde_json::json!({ "order": [
            { "id": ids[1], "position": 0 },
            { "id": 9999, "position": 1 }
        ]}),
    );
    let response = app.clone().oneshot(unknown_id).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let empty = json_request("POST", "/portfolios/sort", serde_json::json!({ "order": [] }));
    let response = app.oneshot(empty).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let items = storage.list_portfolios_by_position().await.expect("list");
    assert_eq!(items.iter().map(|item| item.id.0).collect::<Vec<_>>(), ids);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let (app, _storage, _events) = test_app(128).await;
    let request = json_request(
        "POST",
        "/portfolios",
        serde_json::json!({ "title": "big", "body": "x".repeat(4096) }),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn portfolio_crud_routes_work() {
    let (app, _storage, _events) = test_app(64 * 1024).await;

    let create = json_request(
        "POST",
        "/portfolios",
        serde_json::json!({ "title": "Site", "subtitle": "Angular", "body": "spa" }),
    );
    let response = app.clone().oneshot(create).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: ServerEvent = read_json(response).await;
    let ServerEvent::PortfolioCreated { item } = created else {
        panic!("expected portfolio_created");
    };

    let angular = app
        .clone()
        .oneshot(
            Request::get("/portfolios/angular")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let angular: Vec<PortfolioItem> = read_json(angular).await;
    assert_eq!(angular, vec![item.clone()]);

    let update = json_request(
        "PUT",
        &format!("/portfolios/{}", item.id.0),
        serde_json::json!({ "title": "Site v2", "body": "spa" }),
    );
    let response = app.clone().oneshot(update).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let delete = Request::delete(format!("/portfolios/{}", item.id.0))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(delete).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let fetch = Request::get(format!("/portfolios/{}", item.id.0))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(fetch).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blog_routes_use_slugs_and_toggle_status() {
    let (app, _storage, _events) = test_app(64 * 1024).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/topics",
            serde_json::json!({ "title": "Rust" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let topic: TopicSummary = read_json(response).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/blogs",
            serde_json::json!({ "title": "Hello Axum", "body": "text", "topic_id": topic.id }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let blog: BlogPost = read_json(response).await;
    assert_eq!(blog.slug, "hello-axum");

    let response = app
        .clone()
        .oneshot(
            Request::get("/blogs/hello-axum")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/blogs/{}/toggle_status", blog.id.0))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let event: ServerEvent = read_json(response).await;
    assert!(matches!(
        event,
        ServerEvent::BlogStatusChanged {
            status: shared::domain::BlogStatus::Published,
            ..
        }
    ));

    let response = app
        .oneshot(
            Request::delete(format!("/blogs/{}", blog.id.0))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn skill_outside_percentage_range_is_bad_request() {
    let (app, _storage, _events) = test_app(64 * 1024).await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/skills",
            serde_json::json!({ "title": "Rails", "percent_utilized": 150 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comment_routes_add_list_and_remove() {
    let (app, storage, _events) = test_app(64 * 1024).await;
    let topic = storage.create_topic("Rust").await.expect("topic");
    let blog = storage
        .create_blog(&BlogForm {
            title: "Threads".to_string(),
            body: "text".to_string(),
            topic_id: topic.id,
        })
        .await
        .expect("blog");
    let comments_uri = format!("/blogs/{}/comments", blog.id.0);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &comments_uri,
            serde_json::json!({ "content": "first!" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let comment: Comment = read_json(response).await;

    let response = app
        .clone()
        .oneshot(Request::get(&comments_uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listed: Vec<Comment> = read_json(response).await;
    assert_eq!(listed, vec![comment.clone()]);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/blogs/999/comments",
            serde_json::json!({ "content": "lost" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::delete(format!("/comments/{}", comment.id.0))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(storage.list_comments(blog.id).await.expect("list").is_empty());
}

#[tokio::test]
async fn portfolio_routes_accept_nested_technologies() {
    let (app, _storage, _events) = test_app(64 * 1024).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/portfolios",
            serde_json::json!({
                "title": "Site",
                "body": "text",
                "technologies_attributes": [{ "name": "Rust" }, { "name": "Axum" }]
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let ServerEvent::PortfolioCreated { item } = read_json(response).await else {
        panic!("unexpected event");
    };
    assert_eq!(item.technologies.len(), 2);

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/portfolios/{}", item.id.0),
            serde_json::json!({
                "title": "Site",
                "body": "text",
                "technologies_attributes": [
                    { "id": item.technologies[0].id, "_destroy": true }
                ]
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let ServerEvent::PortfolioUpdated { item: updated } = read_json(response).await else {
        panic!("unexpected event");
    };
    assert_eq!(updated.technologies, vec![item.technologies[1].clone()]);
}
