use super::mime::upload_mime;
use super::{ByteStream, ProviderPayload, UploadedAsset, UpstreamService};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

const FEATURES_PATH: &str = "/api/features";
const STREAMING_FEATURES_PATH: &str = "/api/features?isStreaming=true";
const ASSETS_PATH: &str = "/api/assets";
const API_KEY_HEADER: &str = "API-KEY";
const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    file_content: Option<FileContent>,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    path: Option<String>,
}

/// HTTP client for the 1min.ai API. Every call is bounded by `timeout`.
///
/// Failures are logged at debug level only; the HTTP layer records the
/// mapped error.
pub struct OneMinClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_image_bytes: usize,
}

impl OneMinClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    pub fn with_client(client: Client, base_url: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Cap on the size of a caller-referenced image download.
    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("1min.ai call exceeded {:?}", self.timeout);
                Err(Error::UpstreamTimeout(self.timeout))
            }
        }
    }

    async fn send_feature(
        &self,
        path: &str,
        payload: &ProviderPayload,
        api_key: &str,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url(path))
            .header(API_KEY_HEADER, api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("Failed to send request to 1min.ai: {}", e);
                e
            })?;

        check_dispatch_status(response, api_key).await
    }
}

async fn check_dispatch_status(response: Response, api_key: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    tracing::debug!("1min.ai API error (status {}): {}", status, error_text);

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::authentication(api_key));
    }
    Err(Error::UpstreamHttp {
        status: status.as_u16(),
        message: error_text,
    })
}

/// Fail the stream with `UpstreamTimeout` when the gap between chunks
/// exceeds `idle`. Nothing is yielded after the first error.
fn with_idle_timeout<S>(stream: S, idle: Duration) -> ByteStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    futures_util::stream::unfold(
        (stream.boxed(), false),
        move |(mut inner, failed)| async move {
            if failed {
                return None;
            }
            match tokio::time::timeout(idle, inner.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), (inner, false))),
                Ok(Some(Err(e))) => {
                    tracing::debug!("Upstream stream error: {}", e);
                    Some((Err(Error::Http(e)), (inner, true)))
                }
                Ok(None) => None,
                Err(_) => {
                    tracing::debug!("Upstream stream idle for {:?}", idle);
                    Some((Err(Error::UpstreamTimeout(idle)), (inner, true)))
                }
            }
        },
    )
    .boxed()
}

#[async_trait]
impl UpstreamService for OneMinClient {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.with_deadline(async {
            let mut response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::UpstreamFetch(format!("{}: {}", url, e)))?;

            let status = response.status();
            if !status.is_success() {
                tracing::debug!("Image fetch from {} failed with status {}", url, status);
                return Err(Error::UpstreamFetch(format!(
                    "{} returned status {}",
                    url, status
                )));
            }

            let limit = self.max_image_bytes;
            let too_large = || {
                Error::UpstreamFetch(format!("{} is larger than {} bytes", url, limit))
            };
            if response.content_length().is_some_and(|len| len > limit as u64) {
                return Err(too_large());
            }

            let mut data = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| Error::UpstreamFetch(format!("{}: {}", url, e)))?
            {
                if data.len() + chunk.len() > limit {
                    return Err(too_large());
                }
                data.extend_from_slice(&chunk);
            }
            Ok(data)
        })
        .await
    }

    async fn upload_asset(&self, data: Vec<u8>, api_key: &str) -> Result<UploadedAsset> {
        let name = format!("relay{}", Uuid::new_v4());
        let mime = upload_mime(&data);
        tracing::debug!("Uploading {} bytes as {} ({})", data.len(), name, mime);

        let part = Part::bytes(data).file_name(name).mime_str(mime)?;
        let form = Form::new().part("asset", part);

        self.with_deadline(async move {
            let response = self
                .client
                .post(self.url(ASSETS_PATH))
                .header(API_KEY_HEADER, api_key)
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(Error::authentication(api_key));
            }
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                tracing::debug!("1min.ai asset error (status {}): {}", status, error_text);
                return Err(Error::AssetUpload(format!(
                    "status {}: {}",
                    status, error_text
                )));
            }

            let body = response.text().await?;
            let parsed: AssetResponse = serde_json::from_str(&body).map_err(|e| {
                tracing::debug!("Failed to parse asset response: {}\nBody: {}", e, body);
                Error::MalformedUpstreamResponse(format!("asset reply: {}", e))
            })?;

            parsed
                .file_content
                .and_then(|content| content.path)
                .map(|handle| UploadedAsset { handle })
                .ok_or_else(|| {
                    Error::MalformedUpstreamResponse(
                        "asset reply is missing fileContent.path".to_string(),
                    )
                })
        })
        .await
    }

    async fn complete(
        &self,
        payload: &ProviderPayload,
        api_key: &str,
    ) -> Result<serde_json::Value> {
        self.with_deadline(async {
            let response = self.send_feature(FEATURES_PATH, payload, api_key).await?;
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                tracing::debug!("Failed to parse 1min.ai response: {}\nBody: {}", e, body);
                Error::MalformedUpstreamResponse(format!("invalid JSON: {}", e))
            })
        })
        .await
    }

    async fn stream(&self, payload: &ProviderPayload, api_key: &str) -> Result<ByteStream> {
        let response = self
            .with_deadline(self.send_feature(STREAMING_FEATURES_PATH, payload, api_key))
            .await?;
        Ok(with_idle_timeout(response.bytes_stream(), self.timeout))
    }
}
