//! OAuth2 client-credentials authentication against the PSP.
//!
//! The PSP issues short-lived bearer tokens over the mTLS channel. The
//! [`Authenticator`] caches the current token and refreshes it under a
//! mutex, so N concurrent callers observing a stale or absent token
//! collapse into a single network round trip and share its result.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use pixcob::error::PspError;

use crate::config::PspConfig;
use crate::identity::CertificateLoader;

/// Safety margin subtracted from the token expiry: a token is refreshed
/// once fewer than this many seconds of validity remain.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// A cached PSP access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Raw bearer token value.
    pub value: String,
    /// When the PSP will stop accepting it.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable at `now`, honoring the
    /// [`EXPIRY_MARGIN_SECS`] safety margin.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// Wire format of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Obtains and caches PSP access tokens over the mTLS channel.
///
/// One authenticator owns one token cache and one client identity; never
/// share an instance across PSP configurations.
pub struct Authenticator {
    token_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    loader: Option<CertificateLoader>,
    cached: tokio::sync::Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Builds an authenticator from configuration: materializes the mTLS
    /// identity and constructs the token-endpoint HTTP client with its own
    /// (shorter) timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Certificate`] when the client identity cannot be
    /// materialized or the HTTP client cannot be built.
    pub fn from_config(config: &PspConfig) -> Result<Self, PspError> {
        let loader = CertificateLoader::from_config(config)?;
        let identity = loader.load()?;
        let http = reqwest::Client::builder()
            .identity(identity)
            .timeout(Duration::from_secs(config.token_timeout_secs))
            .build()
            .map_err(|e| PspError::Certificate(format!("failed to build mTLS client: {e}")))?;
        Ok(Self {
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http,
            loader: Some(loader),
            cached: tokio::sync::Mutex::new(None),
        })
    }

    /// Builds an authenticator around a pre-configured HTTP client.
    ///
    /// Used by tests and by callers that manage TLS themselves; no
    /// certificate loader is attached, so [`Self::cleanup`] is a no-op.
    #[must_use]
    pub fn with_http_client(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http,
            loader: None,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// The mTLS client identity this authenticator materialized, so the
    /// charge client can present the same certificate without re-parsing
    /// the container.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Certificate`] when the authenticator was built
    /// without a certificate loader ([`Self::with_http_client`]) or the
    /// cached identity cannot be loaded.
    pub fn identity(&self) -> Result<reqwest::Identity, PspError> {
        self.loader
            .as_ref()
            .ok_or_else(|| {
                PspError::Certificate(
                    "authenticator has no client identity attached".to_owned(),
                )
            })?
            .load()
    }

    /// Returns a valid bearer token, refreshing the cache when fewer than
    /// [`EXPIRY_MARGIN_SECS`] seconds of validity remain.
    ///
    /// The whole check-and-refresh runs under the instance mutex, so
    /// concurrent callers of a stale cache trigger exactly one request to
    /// the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Transport`] when the endpoint is unreachable and
    /// [`PspError::Auth`] when it rejects the credentials or returns an
    /// unparseable body.
    pub async fn token(&self) -> Result<String, PspError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(now) {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!(token_url = %self.token_url, "refreshing PSP access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PspError::Transport(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PspError::Auth {
                reason: format!("token endpoint returned {status}"),
                body: Some(body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| PspError::Auth {
            reason: format!("token response parse error: {e}"),
            body: None,
        })?;

        let acquired = AccessToken {
            value: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        };
        tracing::debug!(expires_at = %acquired.expires_at, "PSP access token refreshed");
        let value = acquired.value.clone();
        *cached = Some(acquired);
        Ok(value)
    }

    /// Clears the cached token immediately. The protocol client calls this
    /// whenever the PSP answers 401, forcing the next call to refresh
    /// regardless of the cached expiry.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            tracing::debug!("invalidated cached PSP access token");
        }
    }

    /// Discards the materialized client identity. Call on shutdown.
    pub fn cleanup(&self) {
        if let Some(loader) = &self.loader {
            loader.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_at(expires_at: DateTime<Utc>) -> AccessToken {
        AccessToken {
            value: "tok".to_owned(),
            expires_at,
        }
    }

    #[test]
    fn margin_boundaries() {
        let now = Utc::now();
        // 61s of validity left: still usable.
        assert!(token_at(now + chrono::Duration::seconds(61)).is_valid_at(now));
        // 59s left: inside the margin, must refresh.
        assert!(!token_at(now + chrono::Duration::seconds(59)).is_valid_at(now));
        // Fully expired.
        assert!(!token_at(now - chrono::Duration::seconds(1)).is_valid_at(now));
    }

    async fn mock_token_endpoint(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "expires_in": 3600,
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn authenticator(server: &MockServer) -> Authenticator {
        Authenticator::with_http_client(
            format!("{}/oauth/token", server.uri()),
            "cid",
            "csecret",
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn caches_the_token_across_calls() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        let auth = authenticator(&server);
        assert_eq!(auth.token().await.expect("first"), "fresh-token");
        assert_eq!(auth.token().await.expect("second"), "fresh-token");
        // Mock expectation (exactly one call) is verified on drop.
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_one_refresh() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 1).await;

        let auth = Arc::new(authenticator(&server));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let auth = Arc::clone(&auth);
            handles.push(tokio::spawn(async move { auth.token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.expect("join").expect("token"), "fresh-token");
        }
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let server = MockServer::start().await;
        mock_token_endpoint(&server, 2).await;

        let auth = authenticator(&server);
        auth.token().await.expect("first");
        auth.invalidate().await;
        auth.token().await.expect("after invalidate");
    }

    #[tokio::test]
    async fn rejected_credentials_surface_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
            .mount(&server)
            .await;

        let auth = authenticator(&server);
        let err = auth.token().await.expect_err("must fail");
        match err {
            PspError::Auth { body, .. } => assert_eq!(body.as_deref(), Some("bad client")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
