use async_trait::async_trait;
use std::time::Duration;

use super::CacheBackend;
use crate::artifact::{Artifact, CacheKey, Format};

const MAX_ATTEMPTS: u32 = 3;
const FORMAT_HEADER: &str = "x-gateway-format";

/// HTTP PUT/GET against an object-store-compatible endpoint (e.g. an S3
/// presigned-URL proxy or a simple blob server); `base_url` is joined with
/// the storage key to form the object URL. Retries transient failures with
/// a short fixed backoff, mirroring the crawler's HTTP fetch retry policy.
pub struct ObjectStoreCache {
    client: reqwest::Client,
    base_url: url::Url,
}

impl ObjectStoreCache {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: url::Url::parse(&base_url)?,
        })
    }

    fn object_url(&self, key: &CacheKey) -> anyhow::Result<url::Url> {
        Ok(self.base_url.join(&key.to_storage_key())?)
    }
}

#[async_trait]
impl CacheBackend for ObjectStoreCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Artifact>> {
        let url = self.object_url(key)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self.client.get(url.clone()).send().await;
            match response {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    let format = resp
                        .headers()
                        .get(FORMAT_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_format)
                        .unwrap_or(Format::Html);
                    let bytes = resp.bytes().await?.to_vec();
                    return Ok(Some(Artifact::new(format, bytes)));
                }
                Ok(resp) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(backoff(attempt)).await;
                    let _ = resp;
                    continue;
                }
                Ok(resp) => {
                    anyhow::bail!("object store GET failed: {}", resp.status());
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(backoff(attempt)).await;
                    let _ = e;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop always returns or errors by the final attempt")
    }

    async fn set(&self, key: &CacheKey, artifact: &Artifact, _ttl: Duration) -> anyhow::Result<()> {
        let url = self.object_url(key)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .put(url.clone())
                .header(FORMAT_HEADER, artifact.format.to_string())
                .header(reqwest::header::CONTENT_TYPE, artifact.content_type)
                .body(artifact.bytes.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(backoff(attempt)).await;
                    let _ = resp;
                    continue;
                }
                Ok(resp) => anyhow::bail!("object store PUT failed: {}", resp.status()),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(backoff(attempt)).await;
                    let _ = e;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop always returns or errors by the final attempt")
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * u64::from(attempt))
}

fn parse_format(raw: &str) -> Option<Format> {
    match raw {
        "html" => Some(Format::Html),
        "mhtml" => Some(Format::Mhtml),
        "pdf" => Some(Format::Pdf),
        "png" => Some(Format::Png),
        "jpeg" => Some(Format::Jpeg),
        _ => None,
    }
}
