//! services/api/src/adapters/google.rs
//!
//! This module contains the Google sign-in adapter, which implements the
//! `TokenVerifier` port by validating ID tokens against Google's tokeninfo
//! endpoint and checking that the token was issued for this application.

use async_trait::async_trait;
use forum_core::domain::VerifiedIdentity;
use forum_core::ports::{PortResult, TokenVerifier};
use serde::Deserialize;
use tracing::debug;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// A token verifier backed by Google's tokeninfo endpoint.
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleTokenVerifier {
    /// Creates a new `GoogleTokenVerifier` for the given OAuth client id.
    pub fn new(client_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
        }
    }
}

/// The subset of tokeninfo claims the forum cares about.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait]
impl TokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> PortResult<Option<VerifiedIdentity>> {
        // Every failure mode maps to "not verified". The caller turns `None`
        // into a 401, never a 500.
        let response = match self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("tokeninfo request failed: {e}");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            debug!("tokeninfo rejected the token: {}", response.status());
            return Ok(None);
        }

        let info: TokenInfo = match response.json().await {
            Ok(info) => info,
            Err(e) => {
                debug!("tokeninfo payload did not parse: {e}");
                return Ok(None);
            }
        };

        if info.aud != self.client_id {
            debug!("token audience does not match the configured client id");
            return Ok(None);
        }

        Ok(Some(VerifiedIdentity {
            name: info.name.unwrap_or_else(|| info.email.clone()),
            email: info.email,
            profile_photo_url: info.picture.unwrap_or_default(),
        }))
    }
}
