//! Request, artifact, and cache-key types (§3 of the spec).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GatewayError;

/// Output format requested for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Html,
    Mhtml,
    Pdf,
    Png,
    Jpeg,
}

impl Format {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Html => "text/html",
            Format::Mhtml => "multipart/related",
            Format::Pdf => "application/pdf",
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
        }
    }

    #[must_use]
    pub fn is_binary(self) -> bool {
        !matches!(self, Format::Html)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Html => "html",
            Format::Mhtml => "mhtml",
            Format::Pdf => "pdf",
            Format::Png => "png",
            Format::Jpeg => "jpeg",
        };
        write!(f, "{s}")
    }
}

/// Format-specific knobs that affect the produced bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub paper_width_in: Option<f64>,
    pub paper_height_in: Option<f64>,
    pub quality: Option<u8>,
}

impl RenderOptions {
    /// The part of the options that affects the *bytes* produced, used as a
    /// cache-salt (§3). Readiness-affecting knobs that don't change the
    /// output bytes are deliberately excluded so requests differing only in
    /// those share a cache key.
    fn cache_salt(&self) -> String {
        format!(
            "{}x{}:{}x{}:{}",
            self.viewport_width.unwrap_or(0),
            self.viewport_height.unwrap_or(0),
            self.paper_width_in.map(|v| v.to_bits()).unwrap_or(0),
            self.paper_height_in.map(|v| v.to_bits()).unwrap_or(0),
            self.quality.unwrap_or(0),
        )
    }
}

/// A request to render a URL to a given artifact format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub url: String,
    pub format: Format,
    pub options: RenderOptions,
}

impl RenderRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, format: Format) -> Self {
        Self {
            url: url.into(),
            format,
            options: RenderOptions::default(),
        }
    }

    /// Lowercases scheme/host, preserves path+query, strips the fragment.
    pub fn canonical_url(&self) -> Result<String, GatewayError> {
        canonicalize_url(&self.url)
    }

    pub fn cache_key(&self) -> Result<CacheKey, GatewayError> {
        Ok(CacheKey {
            canonical_url: self.canonical_url()?,
            format: self.format,
            salt: self.options.cache_salt(),
        })
    }
}

/// Lowercases scheme/host, preserves path+query, strips the fragment (§3).
pub fn canonicalize_url(raw: &str) -> Result<String, GatewayError> {
    let mut parsed =
        url::Url::parse(raw).map_err(|e| GatewayError::MalformedUrl(format!("{raw}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GatewayError::MalformedUrl(format!(
            "unsupported scheme in {raw}"
        )));
    }

    let scheme = parsed.scheme().to_ascii_lowercase();
    parsed
        .set_scheme(&scheme)
        .map_err(|()| GatewayError::MalformedUrl(format!("cannot normalize scheme of {raw}")))?;

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_ascii_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| GatewayError::MalformedUrl(format!("{raw}: {e}")))?;
    } else {
        return Err(GatewayError::MalformedUrl(format!("{raw}: no host")));
    }

    parsed.set_fragment(None);
    Ok(parsed.into())
}

/// Canonical request URL plus format and a cache-salt from bytes-affecting
/// options (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical_url: String,
    format: Format,
    salt: String,
}

impl CacheKey {
    /// Stable, filesystem- and object-store-safe string form of this key.
    #[must_use]
    pub fn to_storage_key(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.canonical_url.hash(&mut hasher);
        self.salt.hash(&mut hasher);
        format!("{}-{:016x}", self.format, hasher.finish())
    }
}

/// The bytes produced by rendering a URL, immutable once produced (§3).
#[derive(Debug, Clone)]
pub struct Artifact {
    pub format: Format,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub produced_at: chrono::DateTime<chrono::Utc>,
}

impl Artifact {
    #[must_use]
    pub fn new(format: Format, bytes: Vec<u8>) -> Self {
        Self {
            format,
            bytes,
            content_type: format.content_type(),
            produced_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases_scheme_and_host_preserves_path_query() {
        let got = canonicalize_url("HTTPS://Example.COM/Path?Query=1#frag").unwrap();
        assert_eq!(got, "https://example.com/Path?Query=1");
    }

    #[test]
    fn canonicalize_rejects_unsupported_scheme() {
        assert!(canonicalize_url("ftp://example.com").is_err());
    }

    #[test]
    fn cache_key_shares_across_readiness_only_options() {
        let a = RenderRequest::new("https://example.com", Format::Html);
        let mut b = a.clone();
        // readiness-only knobs aren't part of RenderOptions at all, so two
        // otherwise-identical requests always share a key.
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
        b.options.quality = Some(50);
        assert_ne!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }
}
