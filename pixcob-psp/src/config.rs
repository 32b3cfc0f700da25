//! PSP configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax, so secrets stay out of the file itself.
//!
//! # Example Configuration
//!
//! ```toml
//! base_url = "https://api.psp.example.com/pix/v2"
//! token_url = "https://auth.psp.example.com/oauth/token"
//! client_id = "$PSP_CLIENT_ID"
//! client_secret = "$PSP_CLIENT_SECRET"
//! pkcs12_path = "/etc/pixcob/client.p12"
//! pkcs12_password = "${PSP_P12_PASSWORD}"
//! pix_key = "11223344000155"
//! receiver_name = "Usina Solar Ltda"
//! receiver_city = "Belo Horizonte"
//! ```
//!
//! # Environment Variables
//!
//! - `PIXCOB_CONFIG` — Path to the configuration file (default:
//!   `pixcob.toml`)
//! - Any variable referenced by `$VAR` / `${VAR}` inside the file

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Full configuration surface for one PSP integration.
///
/// One instance of this config owns exactly one client identity and token
/// cache; never share it across PSP environments (sandbox vs production).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PspConfig {
    /// Charge API base URL, without trailing slash.
    pub base_url: String,

    /// OAuth2 token endpoint URL.
    pub token_url: String,

    /// OAuth2 client id.
    pub client_id: String,

    /// OAuth2 client secret.
    pub client_secret: String,

    /// PKCS#12 container content, base64-encoded. Takes precedence over
    /// [`Self::pkcs12_path`] when both are set.
    #[serde(default)]
    pub pkcs12_base64: Option<String>,

    /// Path to the PKCS#12 container on disk.
    #[serde(default)]
    pub pkcs12_path: Option<String>,

    /// Passphrase protecting the PKCS#12 container.
    #[serde(default)]
    pub pkcs12_password: String,

    /// PIX key receiving the payments.
    pub pix_key: String,

    /// Receiver display name (EMV field 59).
    pub receiver_name: String,

    /// Receiver city (EMV field 60).
    pub receiver_city: String,

    /// Late fee percent applied after the due date (default: 2.0).
    #[serde(default = "default_late_fee_percent")]
    pub default_late_fee_percent: f64,

    /// Monthly interest percent applied after the due date (default: 1.0).
    #[serde(default = "default_monthly_interest_percent")]
    pub default_monthly_interest_percent: f64,

    /// Days a charge stays payable after its due date (default: 30).
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,

    /// Per-call timeout for charge API requests, seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for token endpoint requests, seconds (default: 10).
    #[serde(default = "default_token_timeout_secs")]
    pub token_timeout_secs: u64,
}

fn default_late_fee_percent() -> f64 {
    2.0
}

fn default_monthly_interest_percent() -> f64 {
    1.0
}

fn default_validity_days() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_timeout_secs() -> u64 {
    10
}

impl PspConfig {
    /// Loads configuration from the path given by the `PIXCOB_CONFIG`
    /// environment variable, falling back to `pixcob.toml` in the current
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("PIXCOB_CONFIG").unwrap_or_else(|_| "pixcob.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path, expanding `$VAR` /
    /// `${VAR}` references from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(Path::new(path))?;
        let expanded = expand_env_vars(&content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }
}

/// Expands `$VAR` / `${VAR}` references from the process environment, so
/// client secrets and the PKCS#12 passphrase stay out of the file.
///
/// A reference naming an unset variable is kept untouched in the output.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input.chars().peekable();

    while let Some(c) = rest.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let braced = rest.next_if_eq(&'{').is_some();
        let mut name = String::new();
        while let Some(&next) = rest.peek() {
            if braced && next == '}' {
                rest.next();
                break;
            }
            if !braced && !next.is_ascii_alphanumeric() && next != '_' {
                break;
            }
            name.push(next);
            rest.next();
        }

        let resolved = (!name.is_empty())
            .then(|| std::env::var(&name).ok())
            .flatten();
        match resolved {
            Some(value) => out.push_str(&value),
            None => {
                // Unset (or nameless, e.g. a trailing "$"): reproduce the
                // reference verbatim.
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(&name);
                if braced && !name.is_empty() {
                    out.push('}');
                }
            }
        }
    }

    out
}
