//! Cookie formatting and signing.
//!
//! Signed values use the version-2 layout
//! `2|1:0|<len>:<timestamp>|<len>:<name>|<len>:<base64 value>|<hex hmac-sha256>`,
//! the same layout Tornado's `create_signed_value` produces, so Python engines
//! can verify cookies the gateway sets.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::protocol::{CookieSpec, ProtocolError};

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of signed cookies when the instruction sets none.
const SIGNED_COOKIE_DAYS: f64 = 30.0;

/// Signs cookie values with the gateway's cookie secret.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// Signer with a random per-process secret.
    pub fn ephemeral() -> Result<Self, InvalidLength> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(secret)
    }

    pub fn sign(&self, name: &str, value: &str, now: DateTime<Utc>) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
        let timestamp = now.timestamp().to_string();

        let to_sign = format!(
            "2|{}|{}|{}|{}|",
            field("0"),
            field(&timestamp),
            field(name),
            field(&encoded)
        );

        let mut mac = self.mac.clone();
        mac.update(to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("{}{}", to_sign, signature)
    }
}

fn field(s: &str) -> String {
    format!("{}:{}", s.len(), s)
}

/// One `Set-Cookie` header value.
#[derive(Debug, Clone, Default)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
}

impl SetCookie {
    /// Build from a `set_cookie` instruction, signing the value when `secure`.
    pub fn from_spec(
        spec: &CookieSpec,
        signer: &CookieSigner,
        now: DateTime<Utc>,
    ) -> Result<Self, ProtocolError> {
        validate_name(&spec.name)?;

        let value = if spec.secure {
            signer.sign(&spec.name, &spec.value, now)
        } else {
            validate_value(&spec.value)?;
            spec.value.clone()
        };

        let expires_days = match (spec.expires_days, spec.max_age, spec.secure) {
            (Some(days), _, _) => Some(days),
            (None, None, true) => Some(SIGNED_COOKIE_DAYS),
            _ => None,
        };
        let expires = expires_days.map(|days| expiry(now, days)).transpose()?;

        Ok(Self {
            name: spec.name.clone(),
            value,
            domain: spec.domain.clone(),
            path: spec.path.clone().unwrap_or_else(|| "/".to_string()),
            expires,
            max_age: spec.max_age,
            http_only: spec.http_only,
            secure: spec.secure,
            same_site: spec.same_site.clone(),
        })
    }

    /// A cookie that deletes `name` in the browser.
    pub fn expired(
        name: &str,
        domain: Option<&str>,
        path: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProtocolError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            value: String::new(),
            domain: domain.map(str::to_string),
            path: path.unwrap_or("/").to_string(),
            expires: Some(now - Duration::days(365)),
            max_age: Some(0),
            ..Default::default()
        })
    }

    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(expires) = &self.expires {
            out.push_str("; Expires=");
            out.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        out.push_str("; Path=");
        out.push_str(&self.path);
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = &self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site);
        }
        out
    }
}

fn expiry(now: DateTime<Utc>, days: f64) -> Result<DateTime<Utc>, ProtocolError> {
    let seconds = days * 86_400.0;
    if !seconds.is_finite() {
        return Err(ProtocolError::InvalidValue(format!("invalid cookie expiry {} days", days)));
    }
    Duration::try_seconds(seconds as i64)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| ProtocolError::InvalidValue(format!("cookie expiry out of range: {} days", days)))
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    const SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";
    if name.is_empty() || name.chars().any(|c| c.is_control() || !c.is_ascii() || SEPARATORS.contains(c)) {
        return Err(ProtocolError::InvalidValue(format!("invalid cookie name {:?}", name)));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), ProtocolError> {
    if value
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '"' | ',' | ';' | '\\'))
    {
        return Err(ProtocolError::InvalidValue(format!("invalid cookie value {:?}", value)));
    }
    Ok(())
}

/// Names of the cookies the client sent, in order of appearance.
pub fn request_cookie_names(headers: &HeaderMap) -> Vec<String> {
    let mut names = Vec::new();
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            let name = pair.split('=').next().unwrap_or("").trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}
