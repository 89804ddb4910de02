//! Client tests against a fake backend served by axum on an ephemeral port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use uuid::Uuid;

use aichat_api::{ApiError, AuthSession, DEFAULT_TIMEOUT, StrapiBackend, StrapiClient};
use aichat_db::Database;
use aichat_store::{
    ConversationStore, Dispatcher, IdentityProvider, LoadOutcome, SendState,
};
use aichat_types::api::{NewMessage, ProfileUpdate};
use aichat_types::chat::MessageId;

const JWT: &str = "jwt-mia";

#[derive(Default)]
struct Recorded {
    queries: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
    unauthorized: AtomicUsize,
}

type Shared = Arc<Recorded>;

fn user_json(username: &str) -> Value {
    json!({
        "id": 7,
        "documentId": "user-7",
        "username": username,
        "email": "mia@example.com",
        "provider": "local",
        "confirmed": true,
        "blocked": false,
        "userIconUrl": null,
        "createdAt": "2025-03-01T09:00:00.000Z",
        "updatedAt": "2025-03-01T09:00:00.000Z",
        "publishedAt": "2025-03-01T09:00:00.000Z"
    })
}

fn strapi_error(status: StatusCode, name: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "data": null,
            "error": { "status": status.as_u16(), "name": name, "message": message }
        })),
    )
        .into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", JWT).as_str())
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["identifier"] == "mia@example.com" && body["password"] == "secret" {
        Json(json!({ "jwt": JWT, "user": user_json("mia") })).into_response()
    } else {
        strapi_error(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "Invalid identifier or password",
        )
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    Json(json!({ "jwt": JWT, "user": user_json(&username) })).into_response()
}

async fn provider_callback(Path(provider): Path<String>, RawQuery(query): RawQuery) -> Response {
    if provider == "google" && query.as_deref() == Some("access_token=tok") {
        Json(json!({ "jwt": JWT, "user": user_json("mia") })).into_response()
    } else {
        strapi_error(StatusCode::UNAUTHORIZED, "UnauthorizedError", "bad provider token")
    }
}

async fn me(headers: HeaderMap) -> Response {
    if authorized(&headers) {
        Json(user_json("mia")).into_response()
    } else {
        strapi_error(StatusCode::UNAUTHORIZED, "UnauthorizedError", "Missing or invalid credentials")
    }
}

async fn update_me(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return strapi_error(StatusCode::UNAUTHORIZED, "UnauthorizedError", "Missing or invalid credentials");
    }
    let username = body["data"]["username"].as_str().unwrap_or("mia").to_string();
    Json(user_json(&username)).into_response()
}

async fn characters(
    State(shared): State<Shared>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    shared.queries.lock().unwrap().push(query.unwrap_or_default());
    if !authorized(&headers) {
        shared.unauthorized.fetch_add(1, Ordering::SeqCst);
        return strapi_error(StatusCode::UNAUTHORIZED, "UnauthorizedError", "Missing or invalid credentials");
    }
    Json(json!({
        "data": [
            {
                "id": 1,
                "documentId": "char-1",
                "name": "Rin",
                "introduce": "Your study buddy",
                "coverUrl": "https://cdn.example.com/rin.png",
                "createdAt": "2025-01-01T00:00:00.000Z",
                "updatedAt": "2025-01-01T00:00:00.000Z"
            }
        ],
        "meta": {}
    }))
    .into_response()
}

async fn conversations(State(shared): State<Shared>, RawQuery(query): RawQuery) -> Json<Value> {
    shared.queries.lock().unwrap().push(query.unwrap_or_default());
    Json(json!({
        "data": [
            {
                "id": 12,
                "documentId": "rec-answer",
                "query": "hello",
                "answer": "Hello *there*",
                "message_id": "m-1",
                "createdAt": "2025-03-01T10:00:00.000Z",
                "updatedAt": "2025-03-01T10:00:05.000Z"
            },
            {
                "id": 11,
                "documentId": "rec-query",
                "query": "hello",
                "message_id": "m-1",
                "user": user_json("mia"),
                "createdAt": "2025-03-01T10:00:00.000Z",
                "updatedAt": "2025-03-01T10:00:00.000Z"
            }
        ],
        "meta": { "pagination": { "page": 1, "pageSize": 20, "pageCount": 2, "total": 21 } }
    }))
}

async fn create_message(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    shared.bodies.lock().unwrap().push(body.clone());
    let data = &body["data"];
    if data["query"] == "fail" {
        return strapi_error(StatusCode::BAD_GATEWAY, "ApplicationError", "model unavailable");
    }
    let message_id = data["message_id"].clone();
    let query = data["query"].clone();
    Json(json!({
        "data": [
            {
                "id": 21,
                "documentId": "new-query",
                "query": query,
                "message_id": message_id,
                "createdAt": "2025-03-01T11:00:00.000Z",
                "updatedAt": "2025-03-01T11:00:00.000Z"
            },
            {
                "id": 22,
                "documentId": "new-answer",
                "query": query,
                "answer": "**Noted.**",
                "message_id": message_id,
                "createdAt": "2025-03-01T11:00:00.000Z",
                "updatedAt": "2025-03-01T11:00:02.000Z"
            }
        ]
    }))
    .into_response()
}

async fn spawn_backend() -> (String, Shared) {
    let shared = Shared::default();
    let app = Router::new()
        .route("/api/auth/local", post(login))
        .route("/api/auth/local/register", post(register))
        .route("/api/auth/{provider}/callback", get(provider_callback))
        .route("/api/users/me", get(me).put(update_me))
        .route("/api/ai-characters", get(characters))
        .route("/api/chat-conversations", get(conversations))
        .route("/api/chat-conversations/create-message", post(create_message))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

async fn signed_in_session() -> (AuthSession, Shared, Arc<Database>) {
    let (url, shared) = spawn_backend().await;
    let db = Arc::new(Database::open_in_memory().unwrap());
    let client = StrapiClient::new(&url, DEFAULT_TIMEOUT).unwrap();
    let session = AuthSession::new(client, Some(db.clone()));
    session.sign_in("mia@example.com", "secret").await.unwrap();
    (session, shared, db)
}

#[tokio::test]
async fn sign_in_stores_token_and_profile() {
    let (session, _, db) = signed_in_session().await;

    assert!(session.is_signed_in());
    assert_eq!(session.client().token().as_deref(), Some(JWT));
    assert_eq!(session.current_user().unwrap().username, "mia");

    let stored = db.load_session().unwrap().unwrap();
    assert_eq!(stored.jwt, JWT);
    assert_eq!(stored.user.document_id, "user-7");
}

#[tokio::test]
async fn rejected_login_reports_backend_message() {
    let (url, _) = spawn_backend().await;
    let session = AuthSession::new(StrapiClient::new(&url, DEFAULT_TIMEOUT).unwrap(), None);

    let err = session.sign_in("mia@example.com", "wrong").await.unwrap_err();
    match err {
        ApiError::Strapi { status, name, message } => {
            assert_eq!(status, 400);
            assert_eq!(name, "ValidationError");
            assert_eq!(message, "Invalid identifier or password");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!session.is_signed_in());
}

#[tokio::test]
async fn provider_sign_in_and_register() {
    let (url, _) = spawn_backend().await;
    let session = AuthSession::new(StrapiClient::new(&url, DEFAULT_TIMEOUT).unwrap(), None);

    let user = session.sign_in_with_provider("google", "tok").await.unwrap();
    assert_eq!(user.username, "mia");

    // A failed provider exchange is an auth-route 401: no sign-out side effects.
    let err = session.sign_in_with_provider("google", "nope").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert!(session.is_signed_in());

    let user = session.register("noa", "noa@example.com", "secret").await.unwrap();
    assert_eq!(user.username, "noa");
}

#[tokio::test]
async fn restore_revalidates_stored_session() {
    let (session, _, db) = signed_in_session().await;
    let url = session.client().api_url().trim_end_matches("/api").to_string();

    let fresh = AuthSession::new(StrapiClient::new(&url, DEFAULT_TIMEOUT).unwrap(), Some(db.clone()));
    assert!(fresh.restore().await);
    assert_eq!(fresh.current_user().unwrap().username, "mia");

    db.save_session("expired", &session.current_user().unwrap()).unwrap();
    let stale = AuthSession::new(StrapiClient::new(&url, DEFAULT_TIMEOUT).unwrap(), Some(db.clone()));
    assert!(!stale.restore().await);
    assert!(!stale.is_signed_in());
    assert!(stale.client().token().is_none());
}

#[tokio::test]
async fn profile_refresh_and_update() {
    let (session, _, db) = signed_in_session().await;

    let user = session
        .update_profile(ProfileUpdate {
            username: Some("mia-chan".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(user.username, "mia-chan");
    assert_eq!(session.current_user().unwrap().username, "mia-chan");
    assert_eq!(db.load_session().unwrap().unwrap().user.username, "mia-chan");

    let user = session.refresh_profile().await.unwrap();
    assert_eq!(user.username, "mia");
}

#[tokio::test]
async fn sign_out_clears_everything() {
    let (session, _, db) = signed_in_session().await;
    session.sign_out().await;

    assert!(!session.is_signed_in());
    assert!(session.client().token().is_none());
    assert!(db.load_session().unwrap().is_none());
    assert!(matches!(
        session.refresh_profile().await,
        Err(ApiError::NotSignedIn)
    ));
}

#[tokio::test]
async fn unauthorized_on_protected_route_signs_out() {
    let (session, shared, _) = signed_in_session().await;
    session.client().set_token(Some("revoked".into()));

    let err = session.client().list_characters().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert_eq!(err.status(), Some(401));
    assert_eq!(shared.unauthorized.load(Ordering::SeqCst), 1);
    assert!(session.client().token().is_none());
    assert!(session.current_user().is_none());
}

#[tokio::test]
async fn listing_query_keeps_star_literal() {
    let (session, shared, _) = signed_in_session().await;
    let page = session
        .client()
        .list_conversations("char-1", "user-7", 1, 20)
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.pagination().page_count, 2);

    let characters = session.client().list_characters().await.unwrap();
    assert_eq!(characters[0].name, "Rin");

    let queries = shared.queries.lock().unwrap();
    let listing = &queries[0];
    assert!(listing.contains("filters%5Bai_character%5D%5BdocumentId%5D%5B%24eq%5D=char-1"));
    assert!(listing.contains("filters%5Buser%5D%5BdocumentId%5D%5B%24eq%5D=user-7"));
    assert!(listing.contains("sort=createdAt%3Adesc"));
    assert!(listing.contains("pagination%5Bpage%5D=1"));
    assert!(listing.ends_with("populate=*"));
    assert_eq!(queries[1], "populate=*");
}

#[tokio::test]
async fn create_message_posts_enveloped_body() {
    let (session, shared, _) = signed_in_session().await;
    let [query, answer] = session
        .client()
        .create_message(
            "char-1",
            NewMessage {
                query: "remember this".into(),
                message_id: "client-1".into(),
            },
        )
        .await
        .unwrap();
    assert!(!query.is_answer());
    assert!(answer.is_answer());

    let bodies = shared.bodies.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({ "data": { "character_id": "char-1", "query": "remember this", "message_id": "client-1" } })
    );
}

#[tokio::test]
async fn store_round_trip_through_http() {
    let (session, _, _) = signed_in_session().await;
    let identity: Arc<dyn IdentityProvider> = Arc::new(session.clone());
    let backend = Arc::new(StrapiBackend::new(session.client().clone(), identity.clone()));
    let store = ConversationStore::new(backend, identity, Dispatcher::new());

    let outcome = store.load_initial("char-1").await.unwrap();
    assert_eq!(outcome, LoadOutcome::Applied { count: 2 });
    let snap = store.snapshot();
    assert_eq!(snap.messages[0].id, MessageId::Server("rec-answer".into()));
    assert!(!snap.messages[0].author.is_user());
    assert_eq!(snap.messages[1].id, MessageId::Server("rec-query".into()));
    assert!(snap.messages[1].author.is_user());
    assert!(snap.has_more);

    let client_id = Uuid::new_v4();
    let exchange = store
        .send_message("char-1", "remember this", client_id)
        .await
        .unwrap();
    assert_eq!(exchange.answer.text, "**Noted.**");
    // The query record carries no user relation; it is attributed to the session user.
    assert_eq!(exchange.query.author.name(), "mia");
    assert!(matches!(
        store.send_state(client_id),
        Some(SendState::Confirmed { .. })
    ));

    let before = store.snapshot().messages;
    let failed = Uuid::new_v4();
    let err = store.send_message("char-1", "fail", failed).await.unwrap_err();
    assert!(err.to_string().contains("model unavailable"));
    assert_eq!(store.snapshot().messages, before);
}
