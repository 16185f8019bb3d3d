//! Playlist generation.
//!
//! One run fetches the user's top tracks and artists, derives a taste profile
//! from the tracks' audio features, asks the provider for recommendations,
//! writes them into a new playlist and records the profile. Nothing is rolled
//! back on failure: a playlist created before a later step fails stays on the
//! provider.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::PlaylistConfig;
use crate::error::SpotifyError;
use crate::models::{RecommendationProfile, Session};
use crate::spotify::{
    Artist, AudioFeatures, Page, Playlist, Recommendations, SpotifyClient, Track,
};
use crate::store::{ProfileRepository, StoreError, UserRepository};
use crate::taste::derive_targets;

/// Size of the top-items listings. Only the first `TOP_ITEMS_CUTOFF - 1`
/// tracks are analysed.
pub const TOP_ITEMS_CUTOFF: usize = 50;
pub const RECOMMENDATION_LIMIT: u32 = 25;
pub const SEED_TRACKS: usize = 3;
pub const SEED_ARTISTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    ResolvingSession,
    FetchingTopItems,
    FetchingAudioFeatures,
    RequestingRecommendations,
    CreatingPlaylist,
    AppendingTracks,
    Persisting,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("no session found for user {0}")]
    NotFound(String),
    #[error("{stage:?} failed: {source}")]
    Provider {
        stage: GenerationStage,
        #[source]
        source: SpotifyError,
    },
    #[error("{stage:?} failed: {source}")]
    Store {
        stage: GenerationStage,
        #[source]
        source: StoreError,
    },
    #[error("playlist generation exceeded {0:?}")]
    TimedOut(Duration),
}

impl PlaylistError {
    fn provider(stage: GenerationStage) -> impl FnOnce(SpotifyError) -> Self {
        move |source| PlaylistError::Provider { stage, source }
    }

    fn store(stage: GenerationStage) -> impl FnOnce(StoreError) -> Self {
        move |source| PlaylistError::Store { stage, source }
    }

    /// Stage that failed; `None` when the run as a whole ran out of time.
    pub fn stage(&self) -> Option<GenerationStage> {
        match self {
            PlaylistError::NotFound(_) => Some(GenerationStage::ResolvingSession),
            PlaylistError::Provider { stage, .. } | PlaylistError::Store { stage, .. } => {
                Some(*stage)
            }
            PlaylistError::TimedOut(_) => None,
        }
    }
}

/// Everything produced by one generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistGeneration {
    pub playlist: Playlist,
    pub recommendations: Recommendations,
    pub top_tracks: Page<Track>,
    pub top_artists: Page<Artist>,
    pub features: Vec<AudioFeatures>,
    #[serde(rename = "recommendationProfile")]
    pub profile: RecommendationProfile,
    pub snapshot_id: String,
}

#[derive(Clone)]
pub struct PlaylistGenerator {
    spotify: SpotifyClient,
    users: Arc<dyn UserRepository>,
    profiles: Arc<dyn ProfileRepository>,
    playlist: PlaylistConfig,
    deadline: Duration,
}

impl PlaylistGenerator {
    pub fn new(
        spotify: SpotifyClient,
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
        playlist: PlaylistConfig,
        deadline: Duration,
    ) -> Self {
        Self {
            spotify,
            users,
            profiles,
            playlist,
            deadline,
        }
    }

    /// Uses the session attached to the request when there is one, otherwise
    /// the one stored with the user.
    pub async fn resolve_session(
        &self,
        user_id: &str,
        from_request: Option<Session>,
    ) -> Result<Session, PlaylistError> {
        if let Some(session) = from_request {
            return Ok(session);
        }
        let user = self
            .users
            .find(user_id)
            .await
            .map_err(PlaylistError::store(GenerationStage::ResolvingSession))?;
        user.map(|u| u.session)
            .ok_or_else(|| PlaylistError::NotFound(user_id.to_string()))
    }

    /// Runs every generation step, bounded by the configured deadline. Steps
    /// already completed when the deadline hits are not undone.
    pub async fn generate(
        &self,
        user_id: &str,
        session: &Session,
    ) -> Result<PlaylistGeneration, PlaylistError> {
        match tokio::time::timeout(self.deadline, self.run(user_id, session)).await {
            Ok(result) => result,
            Err(_) => Err(PlaylistError::TimedOut(self.deadline)),
        }
    }

    async fn run(
        &self,
        user_id: &str,
        session: &Session,
    ) -> Result<PlaylistGeneration, PlaylistError> {
        let token = session.access_token.as_str();

        // Both listings are awaited before either result is looked at.
        let (tracks, artists) = tokio::join!(
            self.spotify.get_top_tracks(token),
            self.spotify.get_top_artists(token),
        );
        let top_tracks = tracks.map_err(PlaylistError::provider(GenerationStage::FetchingTopItems))?;
        let top_artists =
            artists.map_err(PlaylistError::provider(GenerationStage::FetchingTopItems))?;
        tracing::debug!(
            user_id,
            tracks = top_tracks.items.len(),
            artists = top_artists.items.len(),
            "top items fetched"
        );

        let analysed = tracks_to_analyse(&top_tracks.items);
        let features = self
            .spotify
            .get_audio_features(token, &analysed)
            .await
            .map_err(PlaylistError::provider(GenerationStage::FetchingAudioFeatures))?;

        let mut profile =
            RecommendationProfile::new(user_id, derive_targets(&features), RECOMMENDATION_LIMIT);
        let (seed_tracks, seed_artists) = select_seeds(&top_tracks.items, &top_artists.items);
        profile.seed_tracks = seed_tracks;
        profile.seed_artists = seed_artists;
        tracing::debug!(user_id, targets = ?profile.targets, "taste profile derived");

        let recommendations = self
            .spotify
            .get_recommendations(token, &profile)
            .await
            .map_err(PlaylistError::provider(GenerationStage::RequestingRecommendations))?;

        let playlist = self
            .spotify
            .create_playlist(
                token,
                user_id,
                &self.playlist.name,
                &self.playlist.description,
            )
            .await
            .map_err(PlaylistError::provider(GenerationStage::CreatingPlaylist))?;
        tracing::info!(user_id, playlist_id = %playlist.id, "playlist created");

        let uris: Vec<String> = recommendations
            .tracks
            .iter()
            .map(|t| t.uri.clone())
            .collect();
        let snapshot_id = self
            .spotify
            .add_tracks_to_playlist(token, &playlist.id, &uris)
            .await
            .map_err(PlaylistError::provider(GenerationStage::AppendingTracks))?;

        profile.snapshot_id = snapshot_id.clone();
        profile.playlist_name = self.playlist.name.clone();

        self.profiles
            .insert(profile.clone())
            .await
            .map_err(PlaylistError::store(GenerationStage::Persisting))?;
        tracing::info!(user_id, tracks = uris.len(), "playlist generated");

        Ok(PlaylistGeneration {
            playlist,
            recommendations,
            top_tracks,
            top_artists,
            features,
            profile,
            snapshot_id,
        })
    }
}

/// Ids of the tracks whose audio features feed the taste profile.
// One short of TOP_ITEMS_CUTOFF.
pub fn tracks_to_analyse(top_tracks: &[Track]) -> Vec<String> {
    top_tracks
        .iter()
        .take(TOP_ITEMS_CUTOFF - 1)
        .map(|t| t.id.clone())
        .collect()
}

/// First three tracks and first two artists, the provider's five-seed maximum.
pub fn select_seeds(top_tracks: &[Track], top_artists: &[Artist]) -> (Vec<String>, Vec<String>) {
    let tracks = top_tracks
        .iter()
        .take(SEED_TRACKS)
        .map(|t| t.id.clone())
        .collect();
    let artists = top_artists
        .iter()
        .filter_map(|a| a.id.clone())
        .take(SEED_ARTISTS)
        .collect();
    (tracks, artists)
}
