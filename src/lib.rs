//! shopchat: conversational shopping client
//!
//! This library provides:
//! - Credential persistence and a login/chat-session lifecycle manager
//! - Multi-modal product queries (text, image, text+image, similarity)
//! - Normalization of the backend's product payloads
//! - Automatic invalidation of credentials when the backend answers 401

pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod transport;

pub use api::ClientError;
pub use auth::{AuthState, CredentialStore, Credentials, SessionManager};
pub use chat::{ImageInput, NormalizedResponse, ProductResult, QueryDispatcher, QueryRequest};
pub use client::ShopClient;
pub use config::Config;
