use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{CacheError, Result};

/// The principal a valid session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session verification round-trip. Implementations return
/// `CacheError::AuthInvalid` for a rejected credential.
pub trait SessionVerifier: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal>>;
}

/// Verifies a bearer credential against the session endpoint.
#[derive(Clone)]
pub struct HttpSessionVerifier {
    client: Client,
    url: Url,
}

impl HttpSessionVerifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn check(&self, token: &str) -> Result<Principal> {
        let response = self
            .client
            .get(self.url.clone())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, "Session verification rejected");
            return Err(CacheError::from_status(status.as_u16(), &body));
        }

        response
            .json::<Principal>()
            .await
            .map_err(|e| CacheError::InvalidResponse(format!("Failed to parse principal: {}", e)))
    }
}

impl SessionVerifier for HttpSessionVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal>> {
        self.check(token).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_email_is_optional() {
        let principal: Principal = serde_json::from_str(r#"{"id":"u-1"}"#).unwrap();
        assert_eq!(principal.id, "u-1");
        assert_eq!(principal.email, None);
    }
}
