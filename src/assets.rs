//! Image resolution and upload
//!
//! Turns the image parts of a request into provider asset handles. Inline
//! `data:` URLs are decoded locally, anything else is fetched. Every failure
//! aborts the request; a request never continues without one of its images.

use crate::catalog::supports_vision;
use crate::upstream::{UploadedAsset, UpstreamService};
use crate::{Error, Result};
use base64::Engine as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(Vec<u8>),
    Remote(String),
}

/// Classify an image reference, decoding inline base64 payloads.
pub fn parse_image_source(url: &str) -> Result<ImageSource> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(ImageSource::Remote(url.to_string()));
    };

    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| Error::Validation("Malformed data URL in image_url".to_string()))?;

    if !meta.ends_with(";base64") {
        return Err(Error::Validation(
            "Only base64-encoded data URLs are supported for images".to_string(),
        ));
    }

    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map(ImageSource::Inline)
        .map_err(|e| Error::Validation(format!("Failed to decode base64 image: {}", e)))
}

/// Resolve and upload each image in order, returning one handle per image.
///
/// The vision check runs before any network call.
pub async fn upload_images(
    upstream: &dyn UpstreamService,
    images: &[String],
    model: &str,
    api_key: &str,
) -> Result<Vec<UploadedAsset>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    if !supports_vision(model) {
        return Err(Error::UnsupportedInput(model.to_string()));
    }

    let mut assets = Vec::with_capacity(images.len());
    for (index, url) in images.iter().enumerate() {
        let data = match parse_image_source(url)? {
            ImageSource::Inline(data) => data,
            ImageSource::Remote(url) => upstream.fetch_image(&url).await?,
        };

        let asset = upstream.upload_asset(data, api_key).await?;
        tracing::debug!("Image {} uploaded as {}", index, asset.handle);
        assets.push(asset);
    }

    Ok(assets)
}
