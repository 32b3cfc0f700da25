//! TLS client identity materialized from a PKCS#12 container.
//!
//! The PSP requires mutual TLS: every request presents a client
//! certificate issued by the PSP. The container (certificate + private
//! key + chain) arrives either embedded in configuration as base64 or as
//! a file path, protected by a passphrase. The parsed identity is cached
//! for the lifetime of the loader and discarded by [`CertificateLoader::cleanup`];
//! there is no implicit finalization.

use std::path::PathBuf;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use reqwest::Identity;

use pixcob::error::PspError;

use crate::config::PspConfig;

/// Where the PKCS#12 container bytes come from.
#[derive(Clone)]
pub enum Pkcs12Source {
    /// Container bytes embedded in configuration.
    Embedded(Vec<u8>),
    /// Container read from disk on first load.
    Path(PathBuf),
}

impl std::fmt::Debug for Pkcs12Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(bytes) => f
                .debug_tuple("Embedded")
                .field(&format_args!("{} bytes", bytes.len()))
                .finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// Loads and caches the mTLS client identity.
pub struct CertificateLoader {
    source: Pkcs12Source,
    password: String,
    cached: Mutex<Option<Identity>>,
}

impl std::fmt::Debug for CertificateLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateLoader")
            .field("source", &self.source)
            .field("has_cached_identity", &self.cached.lock().map(|c| c.is_some()).unwrap_or(false))
            .finish_non_exhaustive()
    }
}

impl CertificateLoader {
    /// Creates a loader from raw container bytes and a passphrase.
    #[must_use]
    pub fn new(source: Pkcs12Source, password: impl Into<String>) -> Self {
        Self {
            source,
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    /// Builds a loader from configuration. Embedded base64 content takes
    /// precedence over a file path.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Certificate`] when neither `pkcs12_base64` nor
    /// `pkcs12_path` is configured, or the embedded content is not valid
    /// base64. Both are configuration mistakes and fatal.
    pub fn from_config(config: &PspConfig) -> Result<Self, PspError> {
        let source = if let Some(content) = &config.pkcs12_base64 {
            let der = b64.decode(content.trim()).map_err(|e| {
                PspError::Certificate(format!("pkcs12_base64 is not valid base64: {e}"))
            })?;
            Pkcs12Source::Embedded(der)
        } else if let Some(path) = &config.pkcs12_path {
            Pkcs12Source::Path(PathBuf::from(path))
        } else {
            return Err(PspError::Certificate(
                "neither pkcs12_base64 nor pkcs12_path is configured".to_owned(),
            ));
        };
        Ok(Self::new(source, config.pkcs12_password.clone()))
    }

    /// Returns the client identity, parsing the container on first use and
    /// the cached copy afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`PspError::Certificate`] when the container cannot be read,
    /// is corrupt, or the passphrase is wrong. Non-retryable.
    pub fn load(&self) -> Result<Identity, PspError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| PspError::Certificate("identity cache poisoned".to_owned()))?;
        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let der = match &self.source {
            Pkcs12Source::Embedded(bytes) => bytes.clone(),
            Pkcs12Source::Path(path) => std::fs::read(path).map_err(|e| {
                PspError::Certificate(format!(
                    "failed to read PKCS#12 container {}: {e}",
                    path.display()
                ))
            })?,
        };

        let identity = Identity::from_pkcs12_der(&der, &self.password).map_err(|e| {
            PspError::Certificate(format!(
                "failed to open PKCS#12 container (corrupt file or wrong passphrase): {e}"
            ))
        })?;
        tracing::debug!("materialized mTLS client identity");

        *cached = Some(identity.clone());
        Ok(identity)
    }

    /// Discards the cached identity. Call on shutdown; the next
    /// [`Self::load`] re-parses the container.
    pub fn cleanup(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            if cached.take().is_some() {
                tracing::debug!("discarded cached mTLS client identity");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_certificate() -> PspConfig {
        toml::from_str(
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
        .expect("parse")
    }

    #[test]
    fn missing_source_is_a_configuration_error() {
        let err = CertificateLoader::from_config(&config_without_certificate())
            .expect_err("must fail without a container source");
        assert!(matches!(err, PspError::Certificate(_)));
    }

    #[test]
    fn invalid_embedded_base64_is_rejected() {
        let mut config = config_without_certificate();
        config.pkcs12_base64 = Some("not base64 at all!!".to_owned());
        let err = CertificateLoader::from_config(&config).expect_err("must reject");
        assert!(matches!(err, PspError::Certificate(_)));
    }

    #[test]
    fn corrupt_container_fails_to_load() {
        let loader = CertificateLoader::new(
            Pkcs12Source::Embedded(vec![0xDE, 0xAD, 0xBE, 0xEF]),
            "passphrase",
        );
        let err = loader.load().expect_err("garbage DER must not parse");
        assert!(matches!(err, PspError::Certificate(_)));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let loader = CertificateLoader::new(
            Pkcs12Source::Path(PathBuf::from("/nonexistent/pixcob-client.p12")),
            "passphrase",
        );
        let err = loader.load().expect_err("missing file must not load");
        assert!(matches!(err, PspError::Certificate(_)));
    }
}
