//! HTTP charge protocol client.
//!
//! [`PspChargeClient`] implements [`ChargeProtocol`] by calling the PSP's
//! COBV endpoints over mutual TLS with a bearer token from the
//! [`Authenticator`]. HTTP failures are mapped to the
//! [`PspError`](pixcob::error::PspError) taxonomy with the raw response
//! body preserved; a 401 additionally invalidates the cached token so the
//! next call starts from a fresh one.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use pixcob::amount;
use pixcob::error::PspError;
use pixcob::protocol::{BoxFuture, ChargeProtocol, ChargeUpdate, CreateChargeDue, PspCharge};
use pixcob::txid;

use crate::auth::Authenticator;
use crate::config::PspConfig;
use crate::wire;

/// Client for the PSP's charge-with-due-date (COBV) API.
pub struct PspChargeClient {
    base_url: String,
    http: reqwest::Client,
    auth: Arc<Authenticator>,
}

impl std::fmt::Debug for PspChargeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PspChargeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PspChargeClient {
    /// Builds the client from configuration, reusing the mTLS identity
    /// owned by `auth` and constructing the charge-API HTTP client with
    /// the configured per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Certificate`] when `auth` carries no client
    /// identity or the HTTP client cannot be built.
    pub fn from_config(config: &PspConfig, auth: Arc<Authenticator>) -> Result<Self, PspError> {
        let identity = auth.identity()?;
        let http = reqwest::Client::builder()
            .identity(identity)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PspError::Certificate(format!("failed to build mTLS client: {e}")))?;
        Ok(Self::with_http_client(&config.base_url, http, auth))
    }

    /// Builds the client around a pre-configured HTTP client. Used by
    /// tests and callers that manage TLS themselves.
    #[must_use]
    pub fn with_http_client(
        base_url: &str,
        http: reqwest::Client,
        auth: Arc<Authenticator>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
            auth,
        }
    }

    /// Returns the charge API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn charge_url(&self, txid: &str) -> String {
        format!("{}/cobv/{txid}", self.base_url)
    }

    fn ensure_txid(txid: &str) -> Result<(), PspError> {
        if txid::is_valid(txid) {
            Ok(())
        } else {
            Err(PspError::validation(format!(
                "txid {txid:?} must be 26-35 alphanumeric characters"
            )))
        }
    }

    /// Sends a prepared request and maps the outcome.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<wire::CobvResponseBody, PspError> {
        let response = request
            .send()
            .await
            .map_err(|e| PspError::Transport(format!("charge request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Stale or revoked token; the next call must refresh.
            self.auth.invalidate().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "PSP rejected charge request");
            return Err(PspError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| PspError::Protocol {
                status: status.as_u16(),
                body: format!("unparseable charge response: {e}"),
            })
    }
}

impl ChargeProtocol for PspChargeClient {
    fn create_charge_due<'a>(
        &'a self,
        request: &'a CreateChargeDue,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>> {
        Box::pin(async move {
            Self::ensure_txid(&request.txid)?;
            amount::ensure_positive(request.amount)?;
            let token = self.auth.token().await?;
            let body = wire::CobvCreateBody::from(request);
            tracing::debug!(txid = %request.txid, due_date = %request.due_date, "creating charge at PSP");
            self.execute(
                self.http
                    .put(self.charge_url(&request.txid))
                    .bearer_auth(token)
                    .json(&body),
            )
            .await?
            .into_psp_charge()
        })
    }

    fn query_charge<'a>(
        &'a self,
        txid: &'a str,
        revision: Option<u32>,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>> {
        Box::pin(async move {
            Self::ensure_txid(txid)?;
            let token = self.auth.token().await?;
            let mut request = self.http.get(self.charge_url(txid)).bearer_auth(token);
            if let Some(revision) = revision {
                request = request.query(&[("revisao", revision)]);
            }
            self.execute(request).await?.into_psp_charge()
        })
    }

    fn revise_charge<'a>(
        &'a self,
        txid: &'a str,
        update: &'a ChargeUpdate,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>> {
        Box::pin(async move {
            Self::ensure_txid(txid)?;
            let token = self.auth.token().await?;
            let body = wire::CobvPatchBody::from(update);
            tracing::debug!(txid = %txid, "revising charge at PSP");
            self.execute(
                self.http
                    .patch(self.charge_url(txid))
                    .bearer_auth(token)
                    .json(&body),
            )
            .await?
            .into_psp_charge()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pixcob::charge::{ChargeStatus, Debtor, Settlement};
    use pixcob::error::ErrorClass;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TXID: &str = "MW12345678901JOAO0ABCDE1234567890";

    async fn mock_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "test-token",
                "expires_in": 3600,
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> PspChargeClient {
        let auth = Arc::new(Authenticator::with_http_client(
            format!("{}/oauth/token", server.uri()),
            "cid",
            "csecret",
            reqwest::Client::new(),
        ));
        PspChargeClient::with_http_client(&server.uri(), reqwest::Client::new(), auth)
    }

    fn create_request() -> CreateChargeDue {
        CreateChargeDue {
            txid: TXID.to_owned(),
            amount: dec!(150.00),
            debtor: Debtor::new("João da Silva", "12345678901"),
            pix_key: "11223344000155".to_owned(),
            due_date: NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date"),
            validity_after_due_days: 30,
            late_fee_percent: dec!(2),
            monthly_interest_percent: dec!(1),
            description: "Fatura 2025-01".to_owned(),
        }
    }

    fn active_charge_body() -> serde_json::Value {
        serde_json::json!({
            "txid": TXID,
            "status": "ACTIVE",
            "revisao": 0,
            "loc": {"location": "psp.example.com/qr/v2/abc"},
        })
    }

    #[tokio::test]
    async fn create_puts_the_cobv_body_with_bearer_auth() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("PUT"))
            .and(path(format!("/cobv/{TXID}")))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "calendario": {"dataDeVencimento": "2025-01-15"},
                "valor": {"original": "150.00"},
                "chave": "11223344000155",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(active_charge_body()))
            .expect(1)
            .mount(&server)
            .await;

        let charge = client(&server)
            .create_charge_due(&create_request())
            .await
            .expect("create");
        assert_eq!(charge.txid, TXID);
        assert_eq!(charge.status, ChargeStatus::Active);
        assert_eq!(charge.location.as_deref(), Some("psp.example.com/qr/v2/abc"));
    }

    #[tokio::test]
    async fn invalid_txid_never_reaches_the_network() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and the token mock would
        // be missing, so a network call would surface as a different error.
        let mut request = create_request();
        request.txid = "short".to_owned();
        let err = client(&server)
            .create_charge_due(&request)
            .await
            .expect_err("must reject locally");
        assert!(matches!(err, PspError::Validation { body: None, .. }));
    }

    #[tokio::test]
    async fn conflict_maps_to_retryable_with_body() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("PUT"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(409).set_body_string("{\"title\":\"duplicated txid\"}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_charge_due(&create_request())
            .await
            .expect_err("conflict");
        assert_eq!(err.class(), ErrorClass::RetryableConflict);
        assert_eq!(err.body(), Some("{\"title\":\"duplicated txid\"}"));
    }

    #[tokio::test]
    async fn unauthorized_invalidates_the_token_cache() {
        let server = MockServer::start().await;
        // Two token requests: the initial one, and the refresh forced by
        // the 401-triggered invalidation.
        mock_token(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.query_charge(TXID, None).await.expect_err("first");
        assert!(matches!(err, PspError::Auth { .. }));
        let err = client.query_charge(TXID, None).await.expect_err("second");
        assert!(matches!(err, PspError::Auth { .. }));
    }

    #[tokio::test]
    async fn query_passes_the_revision_parameter() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .and(query_param("revisao", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(active_charge_body()))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .query_charge(TXID, Some(2))
            .await
            .expect("query with revision");
    }

    #[tokio::test]
    async fn revise_patches_only_supplied_fields() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("PATCH"))
            .and(path(format!("/cobv/{TXID}")))
            .and(body_partial_json(serde_json::json!({
                "valor": {"original": "99.90"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(active_charge_body()))
            .expect(1)
            .mount(&server)
            .await;

        let update = ChargeUpdate {
            amount: Some(dec!(99.90)),
            ..ChargeUpdate::default()
        };
        client(&server)
            .revise_charge(TXID, &update)
            .await
            .expect("revise");
    }

    #[tokio::test]
    async fn check_settlement_surfaces_concluded_payments() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "txid": TXID,
                "status": "CONCLUDED",
                "pix": [{
                    "endToEndId": "E12345678202501151200abcdef123456",
                    "valor": "150.00",
                    "horario": "2025-01-14T17:35:00Z",
                    "pagador": {"nome": "João da Silva", "cpf": "12345678901"},
                }],
            })))
            .mount(&server)
            .await;

        let settlement: Option<Settlement> = client(&server)
            .check_settlement(TXID)
            .await
            .expect("check settlement");
        let settlement = settlement.expect("concluded charge must settle");
        assert_eq!(settlement.amount, dec!(150.00));
        assert_eq!(settlement.payer.name.as_deref(), Some("João da Silva"));
    }

    #[tokio::test]
    async fn active_charges_have_no_settlement() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(active_charge_body()))
            .mount(&server)
            .await;

        let settlement = client(&server)
            .check_settlement(TXID)
            .await
            .expect("check settlement");
        assert!(settlement.is_none());
    }

    #[test]
    fn from_config_requires_the_authenticator_identity() {
        let config: PspConfig = toml::from_str(
            r#"
base_url = "https://api.psp.example.com/pix/v2"
token_url = "https://auth.psp.example.com/oauth/token"
client_id = "cid"
client_secret = "csecret"
pix_key = "key"
receiver_name = "Usina"
receiver_city = "BH"
"#,
        )
        .expect("parse");
        // Built without a certificate loader, so there is no identity to share.
        let auth = Arc::new(Authenticator::with_http_client(
            "https://auth.psp.example.com/oauth/token",
            "cid",
            "csecret",
            reqwest::Client::new(),
        ));
        let err = PspChargeClient::from_config(&config, auth).expect_err("no identity");
        assert!(matches!(err, PspError::Certificate(_)));
    }

    #[tokio::test]
    async fn bad_requests_map_to_validation_with_body() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("PUT"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"title\":\"chave invalida\"}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_charge_due(&create_request())
            .await
            .expect_err("400");
        assert!(matches!(err, PspError::Validation { body: Some(_), .. }));
        assert_eq!(err.body(), Some("{\"title\":\"chave invalida\"}"));
    }

    #[tokio::test]
    async fn unknown_charges_map_to_not_found() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"title\":\"cobranca nao encontrada\"}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .query_charge(TXID, None)
            .await
            .expect_err("404");
        assert!(matches!(err, PspError::NotFound { .. }));
    }

    #[tokio::test]
    async fn throttling_maps_to_rate_limit() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .query_charge(TXID, None)
            .await
            .expect_err("429");
        assert!(matches!(err, PspError::RateLimit { .. }));
        assert_eq!(err.body(), Some("slow down"));
    }

    #[tokio::test]
    async fn server_failures_map_to_service_unavailable() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(format!("/cobv/{TXID}")))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server)
            .query_charge(TXID, None)
            .await
            .expect_err("503");
        assert!(matches!(
            err,
            PspError::ServiceUnavailable { status: 503, .. }
        ));
    }
}
