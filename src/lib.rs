//! Core library for pomodorify: time-boxed playlists built from a Spotify library
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod token;
pub mod api;
pub mod selector;
pub mod builder;
pub mod session;
pub mod server;
pub mod util;

pub use error::{PomoError, Result};
