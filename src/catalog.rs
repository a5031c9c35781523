//! Upstream model catalog and the `/v1/models` listing.

use crate::config::Config;
use crate::models::{Capabilities, ModelEntry, ModelsResponse};

pub const DEFAULT_MODEL: &str = "mistral-nemo";

pub const DEFAULT_PERMITTED_MODELS: &[&str] = &["mistral-nemo", "gpt-4o", "deepseek-chat"];

pub const ALL_MODELS: &[&str] = &[
    "deepseek-chat",
    "o1-preview",
    "o1-mini",
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
    "claude-instant-1.2",
    "claude-2.1",
    "claude-3-5-sonnet-20240620",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "gemini-1.0-pro",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "mistral-large-latest",
    "mistral-small-latest",
    "mistral-nemo",
    "open-mistral-7b",
    // Replicate
    "meta/llama-2-70b-chat",
    "meta/meta-llama-3-70b-instruct",
    "meta/meta-llama-3.1-405b-instruct",
    "command",
];

pub const VISION_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

const OWNER: &str = "1minai";
const CREATED: i64 = 1727389042;

pub fn supports_vision(model: &str) -> bool {
    VISION_MODELS.contains(&model)
}

/// Build the model listing. With subset enforcement only the permitted
/// models are advertised, and without capability flags.
pub fn list_models(config: &Config) -> ModelsResponse {
    let data = if config.subset_only {
        config
            .permitted_models
            .iter()
            .map(|id| entry(id, None))
            .collect()
    } else {
        ALL_MODELS
            .iter()
            .map(|id| {
                entry(
                    id,
                    Some(Capabilities {
                        text: true,
                        vision: supports_vision(id),
                    }),
                )
            })
            .collect()
    };

    ModelsResponse {
        data,
        object: "list".to_string(),
    }
}

fn entry(id: &str, capabilities: Option<Capabilities>) -> ModelEntry {
    ModelEntry {
        id: id.to_string(),
        object: "model".to_string(),
        owned_by: OWNER.to_string(),
        created: CREATED,
        capabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_listing_has_capabilities() {
        let listing = list_models(&Config::default());
        assert_eq!(listing.object, "list");
        assert_eq!(listing.data.len(), ALL_MODELS.len());

        let gpt4o = listing.data.iter().find(|m| m.id == "gpt-4o").unwrap();
        assert!(gpt4o.capabilities.unwrap().vision);

        let nemo = listing.data.iter().find(|m| m.id == "mistral-nemo").unwrap();
        assert!(!nemo.capabilities.unwrap().vision);
    }

    #[test]
    fn test_subset_listing() {
        let config = Config {
            subset_only: true,
            permitted_models: vec!["gpt-4o".to_string()],
            ..Config::default()
        };
        let listing = list_models(&config);
        assert_eq!(listing.data.len(), 1);
        assert_eq!(listing.data[0].id, "gpt-4o");
        assert!(listing.data[0].capabilities.is_none());
    }

    #[test]
    fn test_vision_set() {
        assert!(supports_vision("gpt-4-turbo"));
        assert!(!supports_vision("deepseek-chat"));
    }
}
