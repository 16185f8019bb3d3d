use std::env;
use std::time::Duration;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/api/v1/auth/auth_code_callback";
const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_DATABASE_URL: &str = "sqlite:playlist-gen.db";

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub spotify: SpotifyConfig,
    pub playlist: PlaylistConfig,
    pub retry: RetryPolicy,
    /// Wall-clock ceiling for the authorization callback, retries included.
    pub callback_timeout: Duration,
    /// Wall-clock ceiling for one playlist generation run.
    pub generation_timeout: Duration,
    /// Ceiling for the session cache lookup on per-user routes.
    pub cache_timeout: Duration,
}

/// Credentials and endpoints of the music provider.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub accounts_url: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

/// Name and description given to generated playlists.
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub name: String,
    pub description: String,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            name: "Nubari radio for you".into(),
            description: "A custom playlist built just for you".into(),
        }
    }
}

/// Bounded backoff used when the provider answers 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(3),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed("PORT").unwrap_or(5000);
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());

        let client_id = env::var("SPOTIFY_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_ID is required"))?;

        let client_secret = env::var("SPOTIFY_CLIENT_SECRET")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_SECRET is required"))?;

        let spotify = SpotifyConfig {
            client_id,
            client_secret,
            redirect_uri: env::var("SPOTIFY_REDIRECT_URI")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.into()),
            accounts_url: env::var("SPOTIFY_ACCOUNTS_URL")
                .unwrap_or_else(|_| DEFAULT_ACCOUNTS_URL.into()),
            api_url: env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            request_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS").unwrap_or(10)),
        };

        let defaults = PlaylistConfig::default();
        let playlist = PlaylistConfig {
            name: env::var("PLAYLIST_NAME").unwrap_or(defaults.name),
            description: env::var("PLAYLIST_DESCRIPTION").unwrap_or(defaults.description),
        };

        let retry = RetryPolicy {
            max_retries: parsed("RATE_LIMIT_RETRIES").unwrap_or(3),
            base_delay: Duration::from_millis(parsed("RATE_LIMIT_BASE_DELAY_MS").unwrap_or(3000)),
        };

        let callback_timeout = Duration::from_secs(parsed("CALLBACK_TIMEOUT_SECS").unwrap_or(20));
        let generation_timeout =
            Duration::from_secs(parsed("PLAYLIST_TIMEOUT_SECS").unwrap_or(15));
        let cache_timeout = Duration::from_millis(parsed("CACHE_TIMEOUT_MS").unwrap_or(2000));

        Ok(Self {
            port,
            database_url,
            spotify,
            playlist,
            retry,
            callback_timeout,
            generation_timeout,
            cache_timeout,
        })
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
