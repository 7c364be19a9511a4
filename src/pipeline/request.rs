//! Classification request construction.
//!
//! One user turn: the instruction block first, then the page images in page
//! order. No system message is used so the layout is identical across
//! providers that treat system prompts differently.

use crate::config::ClassifierConfig;
use crate::pipeline::render::DocumentRenderResult;
use crate::prompts::classification_instructions;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData};

/// Provider-agnostic request payload.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub instructions: String,
    /// Encoded pages, in page order.
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ClassificationRequest {
    /// The chat turn sent to an edgequake-llm provider.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::user_with_images(
            self.instructions.as_str(),
            self.images.clone(),
        )]
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Build the request for one rendered document.
pub fn build_request(
    rendered: &DocumentRenderResult,
    config: &ClassifierConfig,
) -> ClassificationRequest {
    ClassificationRequest {
        instructions: classification_instructions(config),
        images: rendered.images.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}
