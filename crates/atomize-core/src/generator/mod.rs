//! Generation transport interface.
//!
//! The extractor consumes upstream output through the [`Generator`] trait:
//! a streaming request that yields text fragments as the model produces
//! them. The production implementation ([`OpenAiGenerator`]) talks to an
//! OpenAI-compatible chat-completions endpoint; tests substitute scripted
//! doubles.
//!
//! ```text
//! Decomposer
//!     |
//!     v
//! Arc<dyn Generator> --stream(prompt)--> FragmentStream
//!                                             |
//!                    extractor <-- "{\"title\": ..." fragments
//! ```

pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

pub use openai::{GeneratorConfig, OpenAiGenerator};

/// Error from the upstream generation transport.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The HTTP request could not be issued or died mid-flight.
    #[error("request to generation API failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("generation API returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The transport was built with unusable settings.
    #[error("invalid generator configuration: {0}")]
    Config(String),
}

/// A lazy sequence of text fragments from the upstream generator.
///
/// Fragment boundaries are arbitrary: a fragment may hold part of a line,
/// exactly one line, or several. Mid-stream failures surface as `Err` items.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GeneratorError>> + Send>>;

/// Streaming text-generation transport.
///
/// # Object Safety
///
/// This trait is object-safe: sessions hold `Arc<dyn Generator>` so the
/// transport is injected rather than constructed where it is used.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Issue a streaming generation request for `prompt`.
    ///
    /// Errors at connection time are returned directly; errors after the
    /// stream has started surface as `Err` items on the stream.
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GeneratorError>;
}

// Compile-time check that the trait stays object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};
