// Mastodon REST client: bearer-token HTTP over reqwest.
//
// Only two endpoints are used: `GET /api/v1/accounts/verify_credentials`
// and `POST /api/v1/statuses/:id/reblog`. Every request carries a timeout
// so one slow instance response can't stall a cycle indefinitely.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::traits::{Account, RepostError, SocialClient};
use crate::db::models::{AccountId, StatusId};

/// Error text Mastodon returns when the account already boosted the status.
pub const ALREADY_REBLOGGED_MESSAGE: &str = "Validation failed: Reblog of status already exists";

/// Error text Mastodon returns for a forbidden action (e.g. boosting a
/// private or direct post).
pub const NOT_ALLOWED_MESSAGE: &str = "This action is not allowed";

pub struct MastodonClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl MastodonClient {
    /// Create a client for `instance_host` (e.g. `https://example.social`).
    pub fn new(instance_host: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ambassador/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url(instance_host),
            token: token.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        debug!(path, "API GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("API request failed: GET {path}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {path} returned {status}: {}", error_message(&body));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize GET {path} response"))
    }
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account> {
        let account: CredentialAccount = self
            .get("/accounts/verify_credentials")
            .await
            .context("Error getting current user id")?;
        account.try_into()
    }

    async fn reblog(&self, id: StatusId) -> Result<(), RepostError> {
        let path = format!("/statuses/{id}/reblog");
        let url = format!("{}{}", self.api_url, path);
        debug!(path = path.as_str(), "API POST request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RepostError::Other {
                id,
                cause: anyhow::Error::new(e).context(format!("API request failed: POST {path}")),
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_rejection(id, status, &body))
    }
}

/// `INSTANCE_HOST` with the API prefix, tolerating a trailing slash.
pub fn api_url(instance_host: &str) -> String {
    format!("{}/api/v1", instance_host.trim_end_matches('/'))
}

/// Map a failed reblog response to a `RepostError`.
///
/// Only the two known messages are expected rejections. Any other 403, such
/// as a token missing the write scope, is a configuration problem and comes
/// back as `Other`.
pub fn classify_rejection(id: StatusId, status: StatusCode, body: &str) -> RepostError {
    let message = error_message(body);

    if message == ALREADY_REBLOGGED_MESSAGE {
        RepostError::AlreadyReblogged(id)
    } else if message == NOT_ALLOWED_MESSAGE {
        RepostError::NotAllowed(id)
    } else {
        RepostError::Other {
            id,
            cause: anyhow::anyhow!("POST /statuses/{id}/reblog returned {status}: {message}"),
        }
    }
}

/// The `error` field of a Mastodon error body, or the raw body if it isn't
/// one.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => err.error,
        Err(_) => body.trim().to_string(),
    }
}

// -- Serde types --

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct CredentialAccount {
    id: Option<String>,
    #[serde(default)]
    display_name: String,
}

impl TryFrom<CredentialAccount> for Account {
    type Error = anyhow::Error;

    fn try_from(account: CredentialAccount) -> Result<Self> {
        let raw = account
            .id
            .ok_or_else(|| anyhow::anyhow!("verify_credentials result has no account id"))?;
        let id = raw
            .parse::<i64>()
            .with_context(|| format!("verify_credentials returned a non-numeric id: {raw}"))?;
        Ok(Account {
            id: AccountId(id),
            display_name: account.display_name,
        })
    }
}
