//! Wire types of the Spotify Web API, limited to the fields this service reads.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// Body of a failed token request (`400 Bad Request`).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

/// Body of a failed Web API request.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub error: ApiErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

/// One page of a paginated listing.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

/// A Spotify track (simplified).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub uri: String,
}

/// Local or unavailable artists come without an id.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
}

// ---------------------------------------------------------------------------
// Audio Features (GET /v1/audio-features)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AudioFeatures {
    pub id: Option<String>,
    #[serde(default)]
    pub acousticness: f32,
    #[serde(default)]
    pub danceability: f32,
    #[serde(default)]
    pub energy: f32,
    #[serde(default)]
    pub instrumentalness: f32,
    #[serde(default)]
    pub liveness: f32,
    #[serde(default)]
    pub tempo: f32,
    #[serde(default)]
    pub valence: f32,
}

#[derive(Deserialize)]
pub(crate) struct AudioFeaturesResponse {
    pub audio_features: Vec<Option<AudioFeatures>>,
}

// ---------------------------------------------------------------------------
// Recommendations and playlists
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Recommendations {
    #[serde(default)]
    pub seeds: Vec<RecommendationSeed>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSeed {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub initial_pool_size: u32,
    #[serde(default)]
    pub after_filtering_size: u32,
    #[serde(default)]
    pub after_relinking_size: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub owner: Option<PlaylistOwner>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlaylistOwner {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SnapshotResponse {
    pub snapshot_id: String,
}
