use super::{ByteStream, ProviderPayload, UploadedAsset, UpstreamService};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the 1min.ai API with call counters.
pub struct MockUpstream {
    result_text: String,
    stream_chunks: Vec<Bytes>,
    failure_status: Option<u16>,
    asset_path: String,
    image_bytes: Vec<u8>,
    dispatch_count: Arc<Mutex<usize>>,
    upload_count: Arc<Mutex<usize>>,
    fetch_count: Arc<Mutex<usize>>,
    last_payload: Arc<Mutex<Option<serde_json::Value>>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            result_text: "Mock reply".to_string(),
            stream_chunks: vec![Bytes::from_static(b"Mock "), Bytes::from_static(b"reply")],
            failure_status: None,
            asset_path: "images/mock-asset.png".to_string(),
            image_bytes: vec![0x89, 0x50, 0x4E, 0x47],
            dispatch_count: Arc::new(Mutex::new(0)),
            upload_count: Arc::new(Mutex::new(0)),
            fetch_count: Arc::new(Mutex::new(0)),
            last_payload: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_result_text(mut self, text: String) -> Self {
        self.result_text = text;
        self
    }

    pub fn with_stream_chunks(mut self, chunks: Vec<Bytes>) -> Self {
        self.stream_chunks = chunks;
        self
    }

    /// Make every dispatch fail with this upstream status.
    pub fn with_failure_status(mut self, status: u16) -> Self {
        self.failure_status = Some(status);
        self
    }

    pub fn with_asset_path(mut self, path: String) -> Self {
        self.asset_path = path;
        self
    }

    pub fn get_dispatch_count(&self) -> usize {
        *self.dispatch_count.lock().unwrap()
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn get_fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }

    pub fn last_payload(&self) -> Option<serde_json::Value> {
        self.last_payload.lock().unwrap().clone()
    }

    /// Shared handle onto the counters, usable after the mock is boxed.
    pub fn counters(&self) -> MockCounters {
        MockCounters {
            dispatch_count: Arc::clone(&self.dispatch_count),
            upload_count: Arc::clone(&self.upload_count),
            fetch_count: Arc::clone(&self.fetch_count),
            last_payload: Arc::clone(&self.last_payload),
        }
    }

    fn record_dispatch(&self, payload: &ProviderPayload, api_key: &str) -> Result<()> {
        *self.dispatch_count.lock().unwrap() += 1;
        *self.last_payload.lock().unwrap() = Some(serde_json::to_value(payload)?);

        match self.failure_status {
            Some(401) => Err(Error::authentication(api_key)),
            Some(status) => Err(Error::UpstreamHttp {
                status,
                message: "mock failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MockCounters {
    dispatch_count: Arc<Mutex<usize>>,
    upload_count: Arc<Mutex<usize>>,
    fetch_count: Arc<Mutex<usize>>,
    last_payload: Arc<Mutex<Option<serde_json::Value>>>,
}

impl MockCounters {
    pub fn dispatches(&self) -> usize {
        *self.dispatch_count.lock().unwrap()
    }

    pub fn uploads(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn fetches(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }

    pub fn last_payload(&self) -> Option<serde_json::Value> {
        self.last_payload.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamService for MockUpstream {
    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>> {
        *self.fetch_count.lock().unwrap() += 1;
        Ok(self.image_bytes.clone())
    }

    async fn upload_asset(&self, _data: Vec<u8>, _api_key: &str) -> Result<UploadedAsset> {
        let mut count = self.upload_count.lock().unwrap();
        *count += 1;
        Ok(UploadedAsset {
            handle: format!("{}#{}", self.asset_path, *count),
        })
    }

    async fn complete(
        &self,
        payload: &ProviderPayload,
        api_key: &str,
    ) -> Result<serde_json::Value> {
        self.record_dispatch(payload, api_key)?;
        Ok(serde_json::json!({
            "aiRecord": {
                "aiRecordDetail": {
                    "resultObject": [self.result_text]
                }
            }
        }))
    }

    async fn stream(&self, payload: &ProviderPayload, api_key: &str) -> Result<ByteStream> {
        self.record_dispatch(payload, api_key)?;
        let chunks: Vec<Result<Bytes>> = self.stream_chunks.iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }
}
