//! Playlist generation service: authenticates users against Spotify, derives a
//! taste profile from their listening history and builds a playlist of
//! recommendations on their behalf.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod playlist;
pub mod retry;
pub mod spotify;
pub mod store;
pub mod taste;
