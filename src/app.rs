//! Application orchestration for translating one chat request.

use crate::assets::upload_images;
use crate::config::Config;
use crate::models::{ChatRequest, CompletionResponse};
use crate::prompt::normalize;
use crate::stream::{reformat, SseStream};
use crate::tokens::count_tokens;
use crate::transform::transform_response;
use crate::upstream::{OneMinClient, ProviderPayload, UpstreamService};
use crate::Result;
use tracing::{debug, info};

/// Owns the configuration and the upstream seam; one instance serves every
/// request.
pub struct App {
    upstream: Box<dyn UpstreamService>,
    config: Config,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub upstream: Box<dyn UpstreamService>,
}

/// Outcome of a chat request: a full completion or a live event stream.
pub enum Completion {
    Full(CompletionResponse),
    Stream(SseStream),
}

impl App {
    /// Build an app from concrete service dependencies.
    ///
    /// This is primarily useful for integration tests and local harnesses that
    /// need to inject mocks.
    pub fn with_services(services: AppServices, config: Config) -> Self {
        Self {
            upstream: services.upstream,
            config,
        }
    }

    /// Construct an app talking to the real upstream API.
    pub fn new(config: Config) -> Result<Self> {
        let upstream =
            OneMinClient::new(config.api_base_url.clone(), config.upstream_timeout)?;
        info!(
            "Upstream: {} (timeout {:?})",
            config.api_base_url, config.upstream_timeout
        );

        Ok(Self::with_services(
            AppServices {
                upstream: Box::new(upstream),
            },
            config,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate, linearize, upload images, dispatch, and reshape the reply.
    pub async fn chat_completion(&self, request: ChatRequest, api_key: &str) -> Result<Completion> {
        let normalized = normalize(&request, &self.config)?;
        let model = normalized.model.as_str();

        let prompt_tokens = count_tokens(&normalized.prompt, model);
        debug!(
            "Processing {} prompt tokens with model {} (multimodal: {})",
            prompt_tokens,
            model,
            normalized.is_multimodal()
        );

        let assets =
            upload_images(self.upstream.as_ref(), &normalized.images, model, api_key).await?;
        let payload = ProviderPayload::new(model, normalized.prompt.clone(), assets);

        if normalized.stream {
            debug!("Streaming AI response");
            let upstream = self.upstream.stream(&payload, api_key).await?;
            Ok(Completion::Stream(reformat(
                upstream,
                model.to_string(),
                prompt_tokens,
            )))
        } else {
            debug!("Non-streaming AI response");
            let doc = self.upstream.complete(&payload, api_key).await?;
            Ok(Completion::Full(transform_response(&doc, model, prompt_tokens)?))
        }
    }
}
