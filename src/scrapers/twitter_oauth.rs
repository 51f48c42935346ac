//! OAuth 1.0a request signing (HMAC-SHA1) for the Twitter REST API

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// User-context credentials (consumer app + access token)
#[derive(Clone)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl TwitterCredentials {
    /// Names of any empty fields, for configuration errors.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.consumer_key.trim().is_empty() {
            missing.push("consumer_key");
        }
        if self.consumer_secret.trim().is_empty() {
            missing.push("consumer_secret");
        }
        if self.access_token.trim().is_empty() {
            missing.push("access_token");
        }
        if self.access_token_secret.trim().is_empty() {
            missing.push("access_token_secret");
        }
        missing
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// RFC 3986 percent-encoding: everything but unreserved characters.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Signs requests for one set of credentials
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    creds: TwitterCredentials,
}

impl OAuthSigner {
    pub fn new(creds: TwitterCredentials) -> Self {
        Self { creds }
    }

    /// `Authorization` header value with a fresh nonce and timestamp.
    pub fn authorization_header(
        &self,
        method: &str,
        base_url: &str,
        query: &[(String, String)],
    ) -> Result<String> {
        let timestamp = Utc::now().timestamp();
        self.authorization_header_with(method, base_url, query, &generate_nonce(), timestamp)
    }

    pub fn authorization_header_with(
        &self,
        method: &str,
        base_url: &str,
        query: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.creds.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_token".to_string(), self.creds.access_token.clone()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let signature = self.signature(method, base_url, query, &oauth_params)?;
        oauth_params.push(("oauth_signature".to_string(), signature));

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }

    fn signature(
        &self,
        method: &str,
        base_url: &str,
        query: &[(String, String)],
        oauth_params: &[(String, String)],
    ) -> Result<String> {
        let base = signature_base_string(method, base_url, query.iter().chain(oauth_params));
        let key = format!(
            "{}&{}",
            percent_encode(&self.creds.consumer_secret),
            percent_encode(&self.creds.access_token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| anyhow!("HMAC key error: {}", e))?;
        mac.update(base.as_bytes());

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// METHOD & encoded URL & encoded, sorted parameter string.
pub fn signature_base_string<'a>(
    method: &str,
    base_url: &str,
    params: impl Iterator<Item = &'a (String, String)>,
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(base_url),
        percent_encode(&param_string)
    )
}
