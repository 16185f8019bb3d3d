//! Shared fixtures: a fake Spotify provider served on a random local port and
//! an application router wired against it with an in-memory database.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use playlist_gen::auth::AuthService;
use playlist_gen::config::{PlaylistConfig, RetryPolicy, SpotifyConfig};
use playlist_gen::handlers::{router, AppState};
use playlist_gen::models::{Session, User};
use playlist_gen::playlist::PlaylistGenerator;
use playlist_gen::spotify::SpotifyClient;
use playlist_gen::store::{
    self, InMemorySessionCache, SessionCache, SqliteProfileRepository, SqliteUserRepository,
    StoreError,
};

pub const PROVIDER_USER: &str = "user-1";
pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";

/// Knobs and recordings of the fake provider.
#[derive(Default)]
pub struct ProviderState {
    pub token_status: Mutex<Option<u16>>,
    /// Statuses returned by successive profile calls; 200 once exhausted.
    pub profile_statuses: Mutex<VecDeque<u16>>,
    pub profile_calls: AtomicU32,
    pub top_track_count: Mutex<usize>,
    pub top_artists_status: Mutex<Option<u16>>,
    pub add_tracks_status: Mutex<Option<u16>>,
    /// Stalls before answering profile requests.
    pub profile_delay: Mutex<Option<Duration>>,
    /// Stalls before answering top-items requests.
    pub top_items_delay: Mutex<Option<Duration>>,
    pub audio_feature_requests: Mutex<Vec<Vec<String>>>,
    pub recommendation_queries: Mutex<Vec<HashMap<String, String>>>,
    pub playlists_created: AtomicU32,
    pub appended_uris: Mutex<Vec<String>>,
    pub basic_auth_headers: Mutex<Vec<String>>,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
}

impl ProviderState {
    pub fn fail_profile_with(&self, statuses: &[u16]) {
        self.profile_statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied());
    }
}

pub struct MockProvider {
    pub base_url: String,
    pub state: Arc<ProviderState>,
}

impl MockProvider {
    pub async fn spawn() -> Self {
        let state = Arc::new(ProviderState::default());
        *state.top_track_count.lock().unwrap() = 60;

        let app = Router::new()
            .route("/accounts/api/token", post(token))
            .route("/api/me", get(profile))
            .route("/api/me/top/:kind", get(top_items))
            .route("/api/audio-features", get(audio_features))
            .route("/api/recommendations", get(recommendations))
            .route("/api/users/:user/playlists", post(create_playlist))
            .route("/api/playlists/:id/tracks", post(add_tracks))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("no local address").port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock provider failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn spotify_config(&self) -> SpotifyConfig {
        SpotifyConfig {
            client_id: CLIENT_ID.into(),
            client_secret: CLIENT_SECRET.into(),
            redirect_uri: "http://localhost:5000/api/v1/auth/auth_code_callback".into(),
            accounts_url: format!("{}/accounts", self.base_url),
            api_url: format!("{}/api", self.base_url),
            request_timeout: Duration::from_secs(5),
        }
    }
}

type Shared = State<Arc<ProviderState>>;

fn api_error(status: u16, message: &str) -> Response {
    let code = StatusCode::from_u16(status).unwrap();
    (
        code,
        Json(json!({ "error": { "status": status, "message": message } })),
    )
        .into_response()
}

async fn token(
    State(state): Shared,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if let Some(auth) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        state.basic_auth_headers.lock().unwrap().push(auth.to_string());
    }
    let grant = form.get("grant_type").cloned().unwrap_or_default();
    state.token_forms.lock().unwrap().push(form);

    if *state.token_status.lock().unwrap() == Some(400) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })),
        )
            .into_response();
    }

    let mut body = json!({
        "access_token": "access-123",
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if grant == "authorization_code" {
        body["scope"] = json!("user-top-read playlist-modify-private");
        body["refresh_token"] = json!("refresh-456");
    }
    Json(body).into_response()
}

async fn profile(State(state): Shared, headers: HeaderMap) -> Response {
    state.profile_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.profile_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    assert_eq!(
        headers.get("authorization").unwrap(),
        "Bearer access-123",
        "profile must be fetched with the freshly issued token"
    );
    match state.profile_statuses.lock().unwrap().pop_front() {
        Some(401) => api_error(401, "The access token expired"),
        Some(403) => api_error(403, "Insufficient client scope"),
        Some(429) => api_error(429, "API rate limit exceeded"),
        _ => Json(json!({
            "id": PROVIDER_USER,
            "display_name": "Ada",
            "country": "NG",
            "email": "ada@example.com",
            "product": "premium"
        }))
        .into_response(),
    }
}

fn track_json(i: usize) -> Value {
    json!({
        "id": format!("t{}", i),
        "name": format!("Track {}", i),
        "uri": format!("spotify:track:t{}", i),
        "type": "track",
    })
}

async fn top_items(State(state): Shared, Path(kind): Path<String>) -> Response {
    let delay = *state.top_items_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let items: Vec<Value> = if kind == "artists" {
        if let Some(status) = *state.top_artists_status.lock().unwrap() {
            return api_error(status, "top artists unavailable");
        }
        (0..10)
            .map(|i| json!({ "id": format!("a{}", i), "name": format!("Artist {}", i), "type": "artist" }))
            .collect()
    } else {
        let count = *state.top_track_count.lock().unwrap();
        (0..count).map(track_json).collect()
    };
    let total = items.len();
    Json(json!({ "items": items, "total": total, "limit": 50, "offset": 0 })).into_response()
}

async fn audio_features(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ids: Vec<String> = query
        .get("ids")
        .map(|s| s.split(',').map(String::from).collect())
        .unwrap_or_default();
    state.audio_feature_requests.lock().unwrap().push(ids.clone());

    // Two thirds of the tracks are quiet acoustic ones.
    let features: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let acoustic = i % 3 != 0;
            json!({
                "id": id,
                "acousticness": if acoustic { 0.75 } else { 0.25 },
                "danceability": 0.6,
                "energy": if acoustic { 0.25 } else { 0.875 },
                "instrumentalness": 0.0,
                "liveness": 0.1,
                "valence": 0.5,
                "tempo": 120.0,
            })
        })
        .collect();
    Json(json!({ "audio_features": features })).into_response()
}

async fn recommendations(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let limit: usize = query
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(20);
    state.recommendation_queries.lock().unwrap().push(query);
    let tracks: Vec<Value> = (100..100 + limit).map(track_json).collect();
    Json(json!({ "seeds": [], "tracks": tracks })).into_response()
}

async fn create_playlist(
    State(state): Shared,
    Path(user): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.playlists_created.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": "pl-1",
            "name": body["name"],
            "description": body["description"],
            "public": false,
            "owner": { "id": user },
        })),
    )
        .into_response()
}

async fn add_tracks(State(state): Shared, Json(body): Json<Value>) -> Response {
    if let Some(status) = *state.add_tracks_status.lock().unwrap() {
        return api_error(status, "could not add tracks");
    }
    let uris: Vec<String> = serde_json::from_value(body["uris"].clone()).unwrap_or_default();
    state.appended_uris.lock().unwrap().extend(uris);
    (StatusCode::CREATED, Json(json!({ "snapshot_id": "snap-1" }))).into_response()
}

/// Session cache whose backend is down.
pub struct UnavailableCache;

#[async_trait]
impl SessionCache for UnavailableCache {
    async fn get_raw(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_raw(&self, _user_id: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Session cache that never answers reads in time.
pub struct StalledCache;

#[async_trait]
impl SessionCache for StalledCache {
    async fn get_raw(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }

    async fn set_raw(&self, _user_id: &str, _value: String) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub provider: MockProvider,
    pub users: Arc<SqliteUserRepository>,
    pub cache: Arc<dyn SessionCache>,
    pub profiles: Arc<SqliteProfileRepository>,
}

/// Caller-level time limits the app is built with.
#[derive(Clone, Copy)]
pub struct Deadlines {
    pub callback: Duration,
    pub generation: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            callback: Duration::from_secs(10),
            generation: Duration::from_secs(10),
        }
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_cache(Arc::new(InMemorySessionCache::default())).await
    }

    pub async fn with_cache(cache: Arc<dyn SessionCache>) -> Self {
        Self::build(cache, Deadlines::default()).await
    }

    pub async fn with_deadlines(deadlines: Deadlines) -> Self {
        Self::build(Arc::new(InMemorySessionCache::default()), deadlines).await
    }

    async fn build(cache: Arc<dyn SessionCache>, deadlines: Deadlines) -> Self {
        let provider = MockProvider::spawn().await;
        let spotify = SpotifyClient::new(provider.spotify_config()).unwrap();
        let pool = store::connect("sqlite::memory:").await.unwrap();
        let users = Arc::new(SqliteUserRepository::new(pool.clone()));
        let profiles = Arc::new(SqliteProfileRepository::new(pool));
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        };

        let state = AppState {
            auth: AuthService::new(
                spotify.clone(),
                users.clone(),
                cache.clone(),
                retry,
                deadlines.callback,
            ),
            generator: PlaylistGenerator::new(
                spotify,
                users.clone(),
                profiles.clone(),
                PlaylistConfig::default(),
                deadlines.generation,
            ),
            cache: cache.clone(),
            cache_timeout: Duration::from_secs(1),
        };

        Self {
            router: router(state),
            provider,
            users,
            cache,
            profiles,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_authorized(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .uri(uri)
                .header("Authorization", "Bearer app-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn session(token: &str) -> Session {
    Session {
        access_token: token.into(),
        token_type: "Bearer".into(),
        scope: "user-top-read playlist-modify-private".into(),
        refresh_token: Some("refresh-456".into()),
        expires_in: 3600,
        issued_at: Utc::now(),
    }
}

pub fn user(id: &str, token: &str) -> User {
    User {
        id: id.into(),
        display_name: "Custom name".into(),
        country: "NG".into(),
        plan: "free".into(),
        email: "ada@example.com".into(),
        session: session(token),
    }
}
