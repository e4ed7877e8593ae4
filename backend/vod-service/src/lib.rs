//! VOD Service
//!
//! Backend for the video platform: HTTP API (login, video metadata,
//! upload URL issuance, search), AMQP consumers reacting to object-storage
//! upload notifications and transcode-completion events, and the search
//! index synchronizer.

pub mod amqp;
pub mod auth;
pub mod config;
pub mod consumers;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
