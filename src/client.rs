//! Remote API client
//!
//! [`MocapApi`] is the seam between the pipeline and the remote service: the
//! harvester, processor and catalog loader only ever talk to the trait, so
//! tests substitute an in-memory implementation. [`HttpMocapClient`] is the
//! production implementation over `reqwest`, authenticating every request
//! with the bearer credential and the service's fixed API-key header.
//!
//! The client is stateless beyond its credential; retry policy lives in
//! [`crate::retry`], not here.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{AnimationListing, Character, ExportGmsHash, ExportPreferences, GmsHash};
use async_trait::async_trait;
use bytes_stream::ArtifactStream;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Export job status as reported by the per-character monitor endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportStatus {
    /// Job finished; the artifact is downloadable at this URL
    Completed {
        /// Artifact URL from the `job_result` field
        download_url: String,
    },
    /// Job failed terminally with a remote-supplied message
    Failed {
        /// The remote's explanation, or "Unknown error"
        message: String,
    },
    /// Any other status; the caller keeps polling
    Pending {
        /// The raw status string, for logging
        status: String,
    },
}

/// The remote operations the harvesting pipeline consumes.
///
/// One implementor per transport; [`HttpMocapClient`] for production,
/// in-memory fakes for tests.
#[async_trait]
pub trait MocapApi: Send + Sync {
    /// Fetch one page of the character catalog (1-based page number).
    async fn list_characters(&self, page: usize) -> Result<Vec<Character>>;

    /// Fetch one page of the animation catalog (1-based page number).
    /// An empty page signals the end of the catalog.
    async fn list_animations(&self, page: usize) -> Result<Vec<AnimationListing>>;

    /// Fetch the retargeting parameter bag for one `(animation, character)` pair.
    async fn fetch_product(&self, animation_id: &str, character_id: &str) -> Result<GmsHash>;

    /// Submit an asynchronous export job for one animation on one character.
    async fn submit_export(
        &self,
        character_id: &str,
        gms_hash: ExportGmsHash,
        product_name: &str,
    ) -> Result<()>;

    /// Read the character's current export job status (a single poll, not a loop).
    async fn poll_export(&self, character_id: &str) -> Result<ExportStatus>;

    /// Open a streaming fetch of a completed artifact.
    async fn fetch_artifact(&self, url: &str) -> Result<ArtifactStream>;
}

/// Streaming artifact body plus its declared length.
pub mod bytes_stream {
    use crate::error::Error;
    use bytes::Bytes;
    use futures::Stream;
    use std::pin::Pin;

    /// A chunked artifact body as handed to the downloader.
    ///
    /// Wraps whatever transport produced it; the downloader only consumes
    /// chunks and never holds the whole artifact in memory.
    pub struct ArtifactStream {
        /// Declared `Content-Length`, when the remote supplied one
        pub content_length: Option<u64>,
        /// The chunk stream
        pub chunks: Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>,
    }

    impl ArtifactStream {
        /// Wrap a fully-materialized body, mainly for tests and fakes.
        pub fn from_bytes(body: Bytes) -> Self {
            let len = body.len() as u64;
            Self {
                content_length: Some(len),
                chunks: Box::pin(futures::stream::once(async move { Ok(body) })),
            }
        }
    }
}

/// Read the bearer credential from its file, trimmed.
///
/// Absence is a fatal startup error: there is no anonymous mode on the
/// remote service.
pub fn read_bearer_token(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::MissingCredential(path.to_path_buf()));
    }
    let token = std::fs::read_to_string(path)?;
    Ok(token.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct PagedResults<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    details: Option<ProductDetails>,
}

#[derive(Debug, Deserialize)]
struct ProductDetails {
    gms_hash: Option<GmsHash>,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    character_id: &'a str,
    // The remote accepts a batch; this pipeline always submits exactly one.
    gms_hash: Vec<ExportGmsHash>,
    preferences: ExportPreferences,
    product_name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Deserialize)]
struct MonitorResponse {
    status: String,
    job_result: Option<serde_json::Value>,
    message: Option<String>,
}

/// Production [`MocapApi`] implementation over HTTP.
#[derive(Clone)]
pub struct HttpMocapClient {
    http: reqwest::Client,
    base_url: url::Url,
    page_size: usize,
}

impl HttpMocapClient {
    /// Build a client for the configured API, reading the bearer credential
    /// from the configured token file.
    ///
    /// Fails fast with [`Error::MissingCredential`] when the token file does
    /// not exist, and with [`Error::Config`] when the base URL is invalid.
    pub fn new(config: &ApiConfig, page_size: usize) -> Result<Self> {
        let token = read_bearer_token(&config.token_file)?;
        Self::with_token(config, page_size, &token)
    }

    /// Build a client with an explicit bearer token (used by tests).
    pub fn with_token(config: &ApiConfig, page_size: usize, token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Config {
                message: format!("bearer token is not a valid header value: {e}"),
                key: Some("token_file".to_string()),
            })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            "X-Api-Key",
            reqwest::header::HeaderValue::from_str(&config.api_key).map_err(|e| Error::Config {
                message: format!("api key is not a valid header value: {e}"),
                key: Some("api_key".to_string()),
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let base_url = url::Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {:?}: {e}", config.base_url),
            key: Some("base_url".to_string()),
        })?;

        Ok(Self {
            http,
            base_url,
            page_size,
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url> {
        // Base URLs like ".../api/v1" need a trailing slash for join() to
        // append rather than replace the last segment.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path).map_err(|e| Error::Config {
            message: format!("cannot build endpoint {path:?}: {e}"),
            key: Some("base_url".to_string()),
        })
    }

    async fn get_checked(&self, url: url::Url) -> Result<reqwest::Response> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, &url));
        }
        Ok(response)
    }
}

#[async_trait]
impl MocapApi for HttpMocapClient {
    async fn list_characters(&self, page: usize) -> Result<Vec<Character>> {
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("type", "Character");

        tracing::debug!(page, "Fetching character catalog page");
        let body: PagedResults<Character> = self.get_checked(url).await?.json().await?;
        Ok(body.results)
    }

    async fn list_animations(&self, page: usize) -> Result<Vec<AnimationListing>> {
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("order", "")
            .append_pair("type", "Motion,MotionPack")
            .append_pair("query", "");

        tracing::debug!(page, "Fetching animation catalog page");
        let body: PagedResults<AnimationListing> = self.get_checked(url).await?.json().await?;
        Ok(body.results)
    }

    async fn fetch_product(&self, animation_id: &str, character_id: &str) -> Result<GmsHash> {
        let mut url = self.endpoint(&format!("products/{animation_id}"))?;
        url.query_pairs_mut()
            .append_pair("similar", "0")
            .append_pair("character_id", character_id);

        let body: ProductResponse = self.get_checked(url).await?.json().await?;
        body.details
            .and_then(|d| d.gms_hash)
            .ok_or_else(|| Error::MalformedResponse("product detail has no gms_hash".to_string()))
    }

    async fn submit_export(
        &self,
        character_id: &str,
        gms_hash: ExportGmsHash,
        product_name: &str,
    ) -> Result<()> {
        let url = self.endpoint("animations/export")?;
        let payload = ExportRequest {
            character_id,
            gms_hash: vec![gms_hash],
            preferences: ExportPreferences::default(),
            product_name,
            kind: "Motion",
        };

        let response = self.http.post(url.clone()).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, &url));
        }
        Ok(())
    }

    async fn poll_export(&self, character_id: &str) -> Result<ExportStatus> {
        let url = self.endpoint(&format!("characters/{character_id}/monitor"))?;
        let body: MonitorResponse = self.get_checked(url).await?.json().await?;

        match body.status.as_str() {
            "completed" => {
                let download_url = match body.job_result {
                    Some(serde_json::Value::String(url)) => url,
                    other => {
                        return Err(Error::MalformedResponse(format!(
                            "completed export carried no artifact URL (job_result = {other:?})"
                        )));
                    }
                };
                Ok(ExportStatus::Completed { download_url })
            }
            "failed" => Ok(ExportStatus::Failed {
                message: body
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            }),
            other => Ok(ExportStatus::Pending {
                status: other.to_string(),
            }),
        }
    }

    async fn fetch_artifact(&self, artifact_url: &str) -> Result<ArtifactStream> {
        let url = url::Url::parse(artifact_url)
            .map_err(|e| Error::MalformedResponse(format!("bad artifact URL {artifact_url:?}: {e}")))?;
        let response = self.get_checked(url).await?;
        let content_length = response.content_length();

        use futures::TryStreamExt;
        let chunks = response.bytes_stream().map_err(Error::Network);
        Ok(ArtifactStream {
            content_length,
            chunks: Box::pin(chunks),
        })
    }
}
