//! Spotify Web API client.
//!
//! Supports the Client Credentials and Authorization Code flows and the
//! user-scoped endpoints used for playlist generation. Every failure is
//! classified into an [`ErrorKind`] here, where the HTTP status is known;
//! callers only branch on the kind.

mod types;

pub use types::*;

use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::SpotifyConfig;
use crate::error::SpotifyError;
use crate::models::RecommendationProfile;

/// Permissions requested from the user during authorization.
pub const SCOPES: &str = "playlist-read-private playlist-read-collaborative \
playlist-modify-private playlist-modify-public user-top-read user-read-recently-played \
user-library-modify user-library-read user-read-private user-read-email";

/// Maximum ids accepted by the audio-features endpoint.
pub const AUDIO_FEATURES_BATCH: usize = 100;

/// Maximum seeds (artists + genres + tracks) accepted by the recommendations endpoint.
pub const MAX_SEEDS: usize = 5;

/// Number of items requested from the top-items endpoints.
const TOP_ITEMS_LIMIT: u32 = 50;

/// Which listing of the user's top items to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopItemKind {
    Tracks,
    Artists,
}

impl TopItemKind {
    fn as_str(self) -> &'static str {
        match self {
            TopItemKind::Tracks => "tracks",
            TopItemKind::Artists => "artists",
        }
    }
}

/// Spotify API client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SpotifyClient {
    client: Client,
    config: SpotifyConfig,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Result<Self, SpotifyError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    /// URL the user is sent to in order to grant access. `state` is echoed back
    /// on the callback.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
            self.config.accounts_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(SCOPES),
        )
    }

    /// Client Credentials flow. The returned token carries no refresh token.
    pub async fn exchange_client_credentials(&self) -> Result<TokenResponse, SpotifyError> {
        self.request_token(&[("grant_type", "client_credentials")])
            .await
    }

    /// Authorization Code flow: trades the callback `code` for user tokens.
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> Result<TokenResponse, SpotifyError> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, SpotifyError> {
        let auth = base64::engine::general_purpose::STANDARD.encode(
            format!("{}:{}", self.config.client_id, self.config.client_secret).as_bytes(),
        );

        let res = self
            .client
            .post(format!("{}/api/token", self.config.accounts_url))
            .header("Authorization", format!("Basic {}", auth))
            .form(params)
            .send()
            .await
            .map_err(|e| SpotifyError::internal(format!("token request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let err = classify_token_error(status, &body);
            tracing::warn!(%status, kind = ?err.kind, "token request rejected");
            return Err(err);
        }

        res.json()
            .await
            .map_err(|e| SpotifyError::internal(format!("token parse failed: {}", e)))
    }

    /// Profile of the user owning `token`.
    pub async fn get_user_profile(&self, token: &str) -> Result<UserProfile, SpotifyError> {
        let url = format!("{}/me", self.config.api_url);
        self.send_json(self.client.get(&url), token, "profile").await
    }

    /// The user's top tracks over the short-term range.
    pub async fn get_top_tracks(&self, token: &str) -> Result<Page<Track>, SpotifyError> {
        self.get_top_items(token, TopItemKind::Tracks).await
    }

    /// The user's top artists over the short-term range.
    pub async fn get_top_artists(&self, token: &str) -> Result<Page<Artist>, SpotifyError> {
        self.get_top_items(token, TopItemKind::Artists).await
    }

    async fn get_top_items<T: DeserializeOwned>(
        &self,
        token: &str,
        kind: TopItemKind,
    ) -> Result<Page<T>, SpotifyError> {
        let url = format!(
            "{}/me/top/{}?time_range=short_term&limit={}",
            self.config.api_url,
            kind.as_str(),
            TOP_ITEMS_LIMIT,
        );
        self.send_json(self.client.get(&url), token, "top-items").await
    }

    /// Fetch audio features for up to 100 track IDs. Ids the provider does not
    /// know are skipped.
    pub async fn get_audio_features(
        &self,
        token: &str,
        ids: &[String],
    ) -> Result<Vec<AudioFeatures>, SpotifyError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        if ids.len() > AUDIO_FEATURES_BATCH {
            return Err(SpotifyError::internal(format!(
                "audio-features accepts at most {} ids, got {}",
                AUDIO_FEATURES_BATCH,
                ids.len()
            )));
        }

        let url = format!(
            "{}/audio-features?ids={}",
            self.config.api_url,
            urlencoding::encode(&ids.join(","))
        );

        let body: AudioFeaturesResponse = self
            .send_json(self.client.get(&url), token, "audio-features")
            .await?;
        Ok(body.audio_features.into_iter().flatten().collect())
    }

    /// Recommendations seeded and targeted by `profile`.
    pub async fn get_recommendations(
        &self,
        token: &str,
        profile: &RecommendationProfile,
    ) -> Result<Recommendations, SpotifyError> {
        if profile.seed_count() > MAX_SEEDS {
            return Err(SpotifyError::internal(format!(
                "recommendations accept at most {} seeds, got {}",
                MAX_SEEDS,
                profile.seed_count()
            )));
        }

        let t = &profile.targets;
        let params = [
            ("seed_artists", profile.seed_artists.join(",")),
            ("seed_tracks", profile.seed_tracks.join(",")),
            ("limit", profile.limit.to_string()),
            ("target_acousticness", t.acousticness.to_string()),
            ("target_danceability", t.danceability.to_string()),
            ("target_energy", t.energy.to_string()),
            ("target_instrumentalness", t.instrumentalness.to_string()),
            ("target_liveness", t.liveness.to_string()),
            ("target_tempo", t.tempo.to_string()),
            ("target_valence", t.valence.to_string()),
        ];

        let url = format!("{}/recommendations", self.config.api_url);
        self.send_json(self.client.get(&url).query(&params), token, "recommendations")
            .await
    }

    /// Creates an empty private playlist owned by `user_id`.
    pub async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<Playlist, SpotifyError> {
        let url = format!(
            "{}/users/{}/playlists",
            self.config.api_url,
            urlencoding::encode(user_id)
        );
        let body = json!({ "name": name, "description": description, "public": false });
        self.send_json(self.client.post(&url).json(&body), token, "create-playlist")
            .await
    }

    /// Inserts `uris` at the top of the playlist and returns the new snapshot id.
    pub async fn add_tracks_to_playlist(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String, SpotifyError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.config.api_url,
            urlencoding::encode(playlist_id)
        );
        let body = json!({ "uris": uris, "position": 0 });
        let res: SnapshotResponse = self
            .send_json(self.client.post(&url).json(&body), token, "add-tracks")
            .await?;
        Ok(res.snapshot_id)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        token: &str,
        what: &str,
    ) -> Result<T, SpotifyError> {
        let res = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SpotifyError::internal(format!("{} request failed: {}", what, e)))?;

        let res = check_status(res, what).await?;

        res.json()
            .await
            .map_err(|e| SpotifyError::internal(format!("{} parse failed: {}", what, e)))
    }
}

async fn check_status(res: Response, what: &str) -> Result<Response, SpotifyError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let err = classify_api_error(status, &body);
    tracing::warn!(%status, kind = ?err.kind, endpoint = what, "Spotify API error");
    Err(err)
}

/// Maps a failed token-endpoint response. Only a 400 means the credentials or
/// grant were rejected; anything else is a provider-side fault.
pub(crate) fn classify_token_error(status: StatusCode, body: &str) -> SpotifyError {
    if status == StatusCode::BAD_REQUEST {
        let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
        let message = if parsed.error_description.is_empty() {
            parsed.error
        } else {
            parsed.error_description
        };
        return SpotifyError::auth(message);
    }
    SpotifyError::internal(format!("token request failed: {} - {}", status, body))
}

/// Maps a failed Web API response to the recovery the caller must take.
pub(crate) fn classify_api_error(status: StatusCode, body: &str) -> SpotifyError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED => SpotifyError::auth(message),
        StatusCode::TOO_MANY_REQUESTS => SpotifyError::rate_limit(message),
        _ => SpotifyError::application(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn client() -> SpotifyClient {
        SpotifyClient::new(SpotifyConfig {
            client_id: "client id".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:5000/api/v1/auth/auth_code_callback".into(),
            accounts_url: "https://accounts.spotify.com".into(),
            api_url: "https://api.spotify.com/v1".into(),
            request_timeout: Duration::from_secs(10),
        })
        .unwrap()
    }

    #[test]
    fn unauthorized_is_auth_error() {
        let body = r#"{"error":{"status":401,"message":"The access token expired"}}"#;
        let err = classify_api_error(StatusCode::UNAUTHORIZED, body);
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(err.message, "The access token expired");
    }

    #[test]
    fn forbidden_is_application_error() {
        let body = r#"{"error":{"status":403,"message":"Insufficient client scope"}}"#;
        let err = classify_api_error(StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind, ErrorKind::Application);
    }

    #[test]
    fn too_many_requests_is_rate_limit_even_without_body() {
        let err = classify_api_error(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert!(err.message.contains("429"));
    }

    #[test]
    fn token_bad_request_carries_description() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#;
        let err = classify_token_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(err.message, "Invalid authorization code");
    }

    #[test]
    fn token_server_error_is_internal() {
        let err = classify_token_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn authorize_url_encodes_parameters() {
        let url = client().authorize_url("abc-_123");
        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=abc-_123"));
        assert!(url.contains("user-top-read"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fapi%2Fv1%2Fauth%2Fauth_code_callback"
        ));
    }

    #[tokio::test]
    async fn audio_features_rejects_oversized_batches() {
        let ids: Vec<String> = (0..101).map(|i| format!("t{}", i)).collect();
        let err = client().get_audio_features("token", &ids).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn audio_features_skips_request_for_no_ids() {
        assert!(client().get_audio_features("token", &[]).await.unwrap().is_empty());
    }
}
