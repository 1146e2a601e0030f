//! # Allow-list Module
//!
//! Channel and playlist allow-lists consulted by the relay handlers.
//!
//! Channels are fixed at startup. Playlists are seeded from the CMS at
//! startup and refreshed from it when a lookup misses, at most once per
//! cooldown window.

pub mod cms;
pub mod validator;

pub use cms::CmsClient;
pub use validator::{AllowListValidator, PlaylistSource};

use crate::core::error::GatewayError;

/// Allow-list operation result
pub type AllowListResult<T> = Result<T, AllowListError>;

/// Errors from fetching the playlist allow-list
#[derive(Debug, thiserror::Error)]
pub enum AllowListError {
    #[error("failed to fetch shows from CMS: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS returned status {status}")]
    Status { status: u16 },

    #[error("CMS GraphQL error: {message}")]
    GraphQl { message: String },

    #[error("CMS returned no playlist ids")]
    Empty,
}

impl From<AllowListError> for GatewayError {
    fn from(err: AllowListError) -> Self {
        GatewayError::AllowList {
            message: err.to_string(),
        }
    }
}
