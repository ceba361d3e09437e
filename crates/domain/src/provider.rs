//! Seam for external OAuth identity providers.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ExternalProfile;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("authorization code is empty")]
    MissingCode,
    #[error("identity provider timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Exchanges an authorization code for the provider's view of the user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, ProviderError>;
}
