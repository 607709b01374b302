//! `ApiClient` and `NotesApp` against an in-process fake of the notes service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use smartnotes_client::{
    ApiClient, AuthState, ClientConfig, Credentials, Error, FileSessionStore, MemorySessionStore,
    NoteDraft, NoteId, NotesApp, Registration, RegistrationOutcome, Sentiment, SessionStore,
    SessionToken,
};

#[derive(Default)]
struct Service {
    /// username -> (id, email, password)
    users: HashMap<String, (i64, String, String)>,
    /// token -> username
    sessions: HashMap<String, String>,
    notes: Vec<Value>,
    /// (request line, authorization header)
    log: Vec<(String, Option<String>)>,
    malformed_notes: bool,
}

type Shared = Arc<Mutex<Service>>;

impl Service {
    fn with_user(username: &str, password: &str) -> Self {
        let mut service = Self::default();
        service.users.insert(
            username.into(),
            (1, format!("{username}@example.com"), password.into()),
        );
        service
    }

    fn record(&mut self, line: &str, headers: &HeaderMap) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.log.push((line.to_owned(), auth));
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<String, Response> {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| self.sessions.get(token))
            .cloned()
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }

    fn user_json(&self, username: &str) -> Value {
        let (id, email, _) = &self.users[username];
        json!({
            "id": id,
            "username": username,
            "email": email,
            "is_active": true,
            "created_at": "2024-04-30T08:00:00"
        })
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

#[derive(Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct NoteBody {
    title: String,
    content: String,
}

async fn register(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Response {
    let mut service = state.lock().unwrap();
    service.record("POST /users/register", &headers);
    if service.users.contains_key(&body.username) {
        return detail(StatusCode::BAD_REQUEST, "Username already registered");
    }
    let id = service.users.len() as i64 + 1;
    service
        .users
        .insert(body.username.clone(), (id, body.email, body.password));
    (StatusCode::CREATED, Json(service.user_json(&body.username))).into_response()
}

async fn login(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Response {
    let mut service = state.lock().unwrap();
    service.record("POST /users/login", &headers);
    let valid = matches!(
        service.users.get(&body.username),
        Some((_, _, password)) if *password == body.password
    );
    if !valid {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect username or password");
    }
    let token = format!("token-{}", body.username);
    service.sessions.insert(token.clone(), body.username);
    Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut service = state.lock().unwrap();
    service.record("GET /users/me", &headers);
    match service.authorize(&headers) {
        Ok(username) => Json(service.user_json(&username)).into_response(),
        Err(rejection) => rejection,
    }
}

async fn list_notes(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut service = state.lock().unwrap();
    service.record("GET /notes", &headers);
    if let Err(rejection) = service.authorize(&headers) {
        return rejection;
    }
    if service.malformed_notes {
        return Json(json!([{ "id": "not-a-number" }])).into_response();
    }
    Json(Value::Array(service.notes.clone())).into_response()
}

async fn create_note(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<NoteBody>,
) -> Response {
    let mut service = state.lock().unwrap();
    service.record("POST /notes", &headers);
    if let Err(rejection) = service.authorize(&headers) {
        return rejection;
    }
    let note = json!({
        "id": service.notes.len() as i64 + 1,
        "title": body.title,
        "content": body.content,
        "created_at": "2024-05-01T10:00:00.000001",
        "updated_at": null,
        "sentiment": null
    });
    service.notes.push(note.clone());
    (StatusCode::CREATED, Json(note)).into_response()
}

async fn analyze(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut service = state.lock().unwrap();
    service.record(&format!("GET /notes/{id}/analyze"), &headers);
    if let Err(rejection) = service.authorize(&headers) {
        return rejection;
    }
    if id == 999 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    match service.notes.iter_mut().find(|n| n["id"] == json!(id)) {
        Some(note) => {
            note["sentiment"] = json!("positive");
            Json(json!({ "id": id, "sentiment": "positive" })).into_response()
        }
        None => detail(StatusCode::NOT_FOUND, "Note not found"),
    }
}

async fn spawn(service: Service) -> (Shared, ClientConfig) {
    let state: Shared = Arc::new(Mutex::new(service));
    let app = Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/me", get(me))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}/analyze", get(analyze))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig::new(format!("http://{addr}").parse().unwrap());
    (state, config)
}

fn client(config: ClientConfig, store: Arc<dyn SessionStore>) -> ApiClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    ApiClient::new(config, store).with_http_client(http)
}

fn app(config: ClientConfig, store: Arc<dyn SessionStore>) -> NotesApp<ApiClient> {
    NotesApp::new(Arc::new(client(config, store)))
}

fn requests(state: &Shared) -> Vec<String> {
    state
        .lock()
        .unwrap()
        .log
        .iter()
        .map(|(line, _)| line.clone())
        .collect()
}

#[tokio::test]
async fn register_login_and_profile() {
    let (state, config) = spawn(Service::default()).await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(config, store.clone());

    let reg = Registration::new("bob", "bob@example.com", "password1", "password1").unwrap();
    let user = client.register_user(&reg).await.unwrap();
    assert_eq!(user.username, "bob");
    assert!(!client.is_authenticated());

    let creds = Credentials::new("bob", "password1").unwrap();
    let token = client.login_user(&creds).await.unwrap();
    assert_eq!(token.access_token.as_str(), "token-bob");
    assert_eq!(store.get().unwrap(), Some(SessionToken::new("token-bob")));

    let me = client.get_current_user().await.unwrap();
    assert_eq!(me.username, "bob");
    assert_eq!(me.email, "bob@example.com");

    let log = state.lock().unwrap().log.clone();
    // Unauthenticated calls carry no header; later ones carry the bearer token.
    assert_eq!(log[0].1, None);
    assert_eq!(log[1].1, None);
    assert_eq!(log[2].1.as_deref(), Some("Bearer token-bob"));
}

#[tokio::test]
async fn wrong_password_is_unauthorized_with_detail() {
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;
    let store = Arc::new(MemorySessionStore::new());
    let client = client(config, store.clone());

    let creds = Credentials::new("alice", "nope-nope").unwrap();
    let err = client.login_user(&creds).await.unwrap_err();

    assert_eq!(
        err,
        Error::Unauthorized {
            message: "Incorrect username or password".into()
        }
    );
    assert_eq!(store.get().unwrap(), None);
}

#[tokio::test]
async fn duplicate_registration_redirects_to_login() {
    let (_, config) = spawn(Service::with_user("bob", "password1")).await;
    let app = app(config, Arc::new(MemorySessionStore::new()));

    let reg = Registration::new("bob", "bob@example.com", "password1", "password1").unwrap();
    let err = app.api().register_user(&reg).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.is_already_registered());

    let outcome = app.register(&reg).await.unwrap();
    assert_eq!(
        outcome,
        RegistrationOutcome::AlreadyRegistered {
            username: "bob".into()
        }
    );
}

#[tokio::test]
async fn notes_create_list_and_analyze() {
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;
    let client = client(config, Arc::new(MemorySessionStore::new()));
    client
        .login_user(&Credentials::new("alice", "password1").unwrap())
        .await
        .unwrap();

    let draft = NoteDraft::new("Trip", "A wonderful day at the beach").unwrap();
    let created = client.create_note(&draft).await.unwrap();
    assert_eq!(created.id, NoteId(1));
    assert_eq!(created.sentiment, None);

    let listed = client.fetch_notes().await.unwrap();
    assert_eq!(listed, vec![created.clone()]);

    let analysis = client.analyze_note(created.id).await.unwrap();
    assert_eq!(analysis.sentiment, Sentiment::Positive);

    let err = client.analyze_note(NoteId(5)).await.unwrap_err();
    assert_eq!(
        err,
        Error::Http {
            status: 404,
            message: "Note not found".into()
        }
    );

    let err = client.analyze_note(NoteId(999)).await.unwrap_err();
    assert_eq!(
        err,
        Error::Http {
            status: 500,
            message: "HTTP error 500".into()
        }
    );
}

#[tokio::test]
async fn expired_token_clears_store() {
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;
    let store = Arc::new(MemorySessionStore::with_token(SessionToken::new("expired")));
    let client = client(config, store.clone());

    let err = client.fetch_notes().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Could not validate credentials");
    assert_eq!(store.get().unwrap(), None);
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn malformed_body_is_an_http_error() {
    let mut service = Service::with_user("alice", "password1");
    service.sessions.insert("t".into(), "alice".into());
    service.malformed_notes = true;
    let (_, config) = spawn(service).await;
    let client = client(
        config,
        Arc::new(MemorySessionStore::with_token(SessionToken::new("t"))),
    );

    let err = client.fetch_notes().await.unwrap_err();
    assert_eq!(err.status(), Some(200));
    assert!(err.to_string().starts_with("Invalid response format from server"));
}

#[tokio::test]
async fn app_without_token_stays_offline() {
    let (state, config) = spawn(Service::default()).await;
    let app = app(config, Arc::new(MemorySessionStore::new()));

    assert_eq!(app.start().await, AuthState::Anonymous);
    assert!(app.notes().notes().is_empty());
    assert!(requests(&state).is_empty());
}

#[tokio::test]
async fn app_rehydrates_then_loads_notes() {
    let mut service = Service::with_user("alice", "password1");
    service.sessions.insert("kept".into(), "alice".into());
    let (state, config) = spawn(service).await;
    let app = app(
        config,
        Arc::new(MemorySessionStore::with_token(SessionToken::new("kept"))),
    );

    let auth = app.start().await;
    let user = auth.user().unwrap();
    assert_eq!(user.id.0, 1);
    assert_eq!(user.username, "alice");
    assert_eq!(requests(&state), vec!["GET /users/me", "GET /notes"]);
}

#[tokio::test]
async fn app_rehydration_with_stale_token_goes_anonymous() {
    let (state, config) = spawn(Service::with_user("alice", "password1")).await;
    let store = Arc::new(MemorySessionStore::with_token(SessionToken::new("stale")));
    let app = app(config, store.clone());

    assert_eq!(app.start().await, AuthState::Anonymous);
    assert_eq!(store.get().unwrap(), None);
    assert_eq!(requests(&state), vec!["GET /users/me"]);
}

#[tokio::test]
async fn app_full_session() {
    let (state, config) = spawn(Service::with_user("alice", "password1")).await;
    let app = app(config, Arc::new(MemorySessionStore::new()));
    app.start().await;

    app.login(&Credentials::new("alice", "password1").unwrap())
        .await
        .unwrap();
    assert!(app.auth().is_authenticated());

    assert!(app.notes().add("T", "short").await.is_err());
    let first = app.notes().add("First", "first note body").await.unwrap();
    let second = app.notes().add("Second", "second note body").await.unwrap();
    assert_eq!(
        app.notes().notes().iter().map(|n| n.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );

    assert_eq!(app.notes().analyze(first.id).await, Some(Sentiment::Positive));
    assert_eq!(app.notes().analyze(first.id).await, Some(Sentiment::Positive));

    // Reload replaces with server order.
    app.notes().load().await.unwrap();
    let notes = app.notes().notes();
    assert_eq!(notes[0].id, first.id);
    assert_eq!(notes[0].sentiment, Some(Sentiment::Positive));

    let analyze_calls = requests(&state)
        .iter()
        .filter(|line| line.ends_with("/analyze"))
        .count();
    assert_eq!(analyze_calls, 1);

    // Server forgets the session: the next notes call ends it locally.
    state.lock().unwrap().sessions.clear();
    assert!(app.notes().load().await.unwrap_err().is_unauthorized());
    assert_eq!(app.auth().state(), AuthState::Anonymous);
    assert!(!app.api().is_authenticated());
    assert!(app.notes().notes().is_empty());
}

#[tokio::test]
async fn rejected_relogin_signs_out_and_drops_notes() {
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;
    let store = Arc::new(MemorySessionStore::new());
    let app = app(config, store.clone());
    app.start().await;
    app.login(&Credentials::new("alice", "password1").unwrap())
        .await
        .unwrap();
    app.notes().add("First", "first note body").await.unwrap();

    let err = app
        .auth()
        .login(&Credentials::new("alice", "wrongpass").unwrap())
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(store.get().unwrap(), None);
    assert_eq!(app.auth().state(), AuthState::Anonymous);
    assert!(app.notes().notes().is_empty());
    assert_eq!(
        app.auth().snapshot().error.as_deref(),
        Some("Incorrect username or password")
    );
}

#[tokio::test]
async fn auth_logout_clears_notes() {
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;
    let app = app(config, Arc::new(MemorySessionStore::new()));
    app.login(&Credentials::new("alice", "password1").unwrap())
        .await
        .unwrap();
    app.notes().add("First", "first note body").await.unwrap();
    assert_eq!(app.notes().notes().len(), 1);

    app.auth().logout();

    assert_eq!(app.auth().state(), AuthState::Anonymous);
    assert!(app.notes().notes().is_empty());
}

#[tokio::test]
async fn token_survives_restart_in_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let (_, config) = spawn(Service::with_user("alice", "password1")).await;

    let first = app(
        config.clone(),
        Arc::new(FileSessionStore::from_config(&path, &config)),
    );
    first
        .login(&Credentials::new("alice", "password1").unwrap())
        .await
        .unwrap();

    let second = app(
        config.clone(),
        Arc::new(FileSessionStore::from_config(&path, &config)),
    );
    let state = second.start().await;
    assert!(state.is_authenticated());

    second.logout();
    assert_eq!(
        FileSessionStore::from_config(&path, &config).get().unwrap(),
        None
    );
}
