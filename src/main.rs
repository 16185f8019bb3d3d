use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playlist_gen::auth::AuthService;
use playlist_gen::config::Config;
use playlist_gen::handlers::{router, AppState};
use playlist_gen::playlist::PlaylistGenerator;
use playlist_gen::spotify::SpotifyClient;
use playlist_gen::store::{
    self, InMemorySessionCache, ProfileRepository, SessionCache, SqliteProfileRepository,
    SqliteUserRepository, UserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let spotify = SpotifyClient::new(config.spotify.clone())?;

    let pool = store::connect(&config.database_url).await?;
    let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(pool.clone()));
    let profiles: Arc<dyn ProfileRepository> = Arc::new(SqliteProfileRepository::new(pool.clone()));
    let cache: Arc<dyn SessionCache> = Arc::new(InMemorySessionCache::default());

    let state = AppState {
        auth: AuthService::new(
            spotify.clone(),
            users.clone(),
            cache.clone(),
            config.retry,
            config.callback_timeout,
        ),
        generator: PlaylistGenerator::new(
            spotify,
            users,
            profiles,
            config.playlist.clone(),
            config.generation_timeout,
        ),
        cache,
        cache_timeout: config.cache_timeout,
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
