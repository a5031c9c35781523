//! Token accounting
//!
//! Estimates token counts with a BPE encoder chosen per model family. Counts
//! from different families are not comparable.

use tiktoken_rs::CoreBPE;

/// Tokenization scheme, selected purely from the model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// Fallback for any unrecognized model (the `gpt-4` encoding).
    Default,
    Gpt,
    GptOmni,
    Mistral,
}

const GPT_MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo"];

impl TokenScheme {
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("mistral") || model.starts_with("open-mistral") {
            TokenScheme::Mistral
        } else if GPT_MODELS.contains(&model) {
            TokenScheme::Gpt
        } else if model.starts_with("gpt-4o") || model.starts_with("o1") {
            TokenScheme::GptOmni
        } else {
            TokenScheme::Default
        }
    }

    fn bpe(self) -> &'static CoreBPE {
        match self {
            // tiktoken-rs ships no tekken vocabulary; o200k is the nearest
            // large-vocabulary encoding.
            TokenScheme::Mistral | TokenScheme::GptOmni => tiktoken_rs::o200k_base_singleton(),
            TokenScheme::Gpt | TokenScheme::Default => tiktoken_rs::cl100k_base_singleton(),
        }
    }

    pub fn count(self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let tokens = self.bpe().encode_with_special_tokens(text).len();
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }
}

/// Count the tokens in `text` under the scheme for `model`.
pub fn count_tokens(text: &str, model: &str) -> u32 {
    TokenScheme::for_model(model).count(text)
}

/// Encoders take a noticeable time to build and are lazily loaded. This
/// loads them outside the request path.
pub fn preload() {
    let _ = tiktoken_rs::cl100k_base_singleton();
    let _ = tiktoken_rs::o200k_base_singleton();
}
