//! Records owned by this service: users, their sessions and generated profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's OAuth credential bundle. Replaced wholesale on re-authentication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds after `issued_at` the access token stops being valid.
    pub expires_in: u64,
    pub issued_at: DateTime<Utc>,
}

/// A provider account known to this service, keyed by the provider's user id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub email: String,
    pub session: Session,
}

/// Per-feature target values sent to the recommendation endpoint.
///
/// Everything except `tempo` lies in `[0, 1]`; tempo is in BPM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioTargets {
    pub acousticness: f32,
    pub danceability: f32,
    pub energy: f32,
    pub instrumentalness: f32,
    pub liveness: f32,
    pub valence: f32,
    pub tempo: f32,
}

/// History record of one playlist generation run. Never mutated once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationProfile {
    pub id: Uuid,
    pub creator_id: String,
    pub playlist_name: String,
    pub limit: u32,
    pub seed_artists: Vec<String>,
    pub seed_genres: Vec<String>,
    pub seed_tracks: Vec<String>,
    #[serde(flatten)]
    pub targets: AudioTargets,
    pub snapshot_id: String,
    pub created_at: DateTime<Utc>,
}

impl RecommendationProfile {
    pub fn new(creator_id: impl Into<String>, targets: AudioTargets, limit: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id: creator_id.into(),
            playlist_name: String::new(),
            limit,
            seed_artists: Vec::new(),
            seed_genres: Vec::new(),
            seed_tracks: Vec::new(),
            targets,
            snapshot_id: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn seed_count(&self) -> usize {
        self.seed_artists.len() + self.seed_genres.len() + self.seed_tracks.len()
    }
}
