//! Client for the upstream public activity API.
//!
//! Fetches the public event feed and per-resource metadata, rotating
//! through a pool of bearer credentials.

pub mod client;
pub mod config;
pub mod credentials;
pub mod dto;
pub mod health;

pub use client::{SourceClient, UpstreamSource};
pub use config::UpstreamConfig;
pub use credentials::{Credential, CredentialRotator};
