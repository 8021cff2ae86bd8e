//! Core domain logic: the streaming record extractor, the generation
//! transport, field encryption, PII scrubbing, and the services that tie
//! them to persistence.

pub mod completion;
pub mod crypto;
pub mod decompose;
pub mod extractor;
pub mod generator;
pub mod profile;
pub mod prompt;
pub mod scrub;
pub mod views;
