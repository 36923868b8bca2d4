//! Bearer-token validation against the external auth service
//!
//! The core only needs one call: `validate(token)` answering whether the
//! token is good and which user/device it belongs to. The trait keeps the
//! endpoint swappable in tests; the HTTP implementation posts to the auth
//! service's validation endpoint with the token as a bearer header.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use relay_core::types::ClientIdentity;
use relay_core::RegistryError;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Validation Result
// ----------------------------------------------------------------------------

/// Outcome of one token validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_id: String,
    pub device_id: String,
}

impl TokenValidation {
    /// A rejected validation
    pub fn invalid() -> Self {
        Self {
            valid: false,
            user_id: String::new(),
            device_id: String::new(),
        }
    }

    /// Canonical composite identity for a valid token
    pub fn identity(&self) -> std::result::Result<ClientIdentity, RegistryError> {
        ClientIdentity::new(self.user_id.clone(), self.device_id.clone())
    }
}

// ----------------------------------------------------------------------------
// Validator Seam
// ----------------------------------------------------------------------------

/// Capability to validate one bearer token
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<TokenValidation>;
}

// ----------------------------------------------------------------------------
// HTTP Validator
// ----------------------------------------------------------------------------

/// Shape of the auth service's validation response body
#[derive(Debug, Deserialize)]
struct ValidationBody {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    device_id: String,
}

/// Validator calling the external auth service over HTTP
pub struct HttpAuthValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthValidator {
    pub fn new<U: Into<String>>(base_url: U) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/auth/api-tokens/validate",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AuthValidator for HttpAuthValidator {
    async fn validate(&self, token: &str) -> Result<TokenValidation> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Auth service rejected token");
            return Ok(TokenValidation::invalid());
        }

        let body: ValidationBody = response.json().await?;
        if body.user_id.is_empty() || body.device_id.is_empty() {
            warn!("Auth service accepted token but returned no identity fields");
            return Ok(TokenValidation::invalid());
        }

        Ok(TokenValidation {
            valid: true,
            user_id: body.user_id,
            device_id: body.device_id,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
