//! PII scrubbing applied to goal text before it is stored or sent upstream.
//!
//! Scrubbing happens once, at intake: the stored goal, the generation
//! prompt, and every stream event all carry the scrubbed text, so raw PII
//! never crosses the process boundary twice.

use regex::Regex;

/// Detects sensitive spans and replaces them with bracketed category tags
/// (`[PERSON]`, `[EMAIL]`, ...).
///
/// Implementations must always succeed; text with no detected spans passes
/// through unchanged. Object-safe so services can hold `Arc<dyn PiiScrubber>`
/// and swap in an NLP-backed implementation without touching call sites.
pub trait PiiScrubber: Send + Sync {
    /// Return `text` with every detected span replaced by its tag.
    fn scrub(&self, text: &str) -> String;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PiiScrubber) {}
};

/// Pattern-based scrubber covering the spans a regex can catch reliably:
/// email addresses, phone numbers, honorific-prefixed names, and legal-suffix
/// organization names.
pub struct RegexScrubber {
    patterns: Vec<(Regex, &'static str)>,
}

impl RegexScrubber {
    pub fn new() -> Self {
        // Order matters: emails before phones so the digits in a mail host
        // are not half-eaten by the phone pattern.
        let patterns = vec![
            (
                Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
                "[EMAIL]",
            ),
            (
                Regex::new(r"\+?\d[\d\s().-]{7,}\d"),
                "[PHONE]",
            ),
            (
                Regex::new(r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?"),
                "[PERSON]",
            ),
            (
                Regex::new(r"\b[A-Z][A-Za-z&]*(?:\s+[A-Z][A-Za-z&]*)*\s+(?:Inc|LLC|Ltd|Corp|GmbH)\b\.?"),
                "[ORG]",
            ),
        ];

        let patterns = patterns
            .into_iter()
            .map(|(re, tag)| (re.expect("hard-coded pattern compiles"), tag))
            .collect();

        Self { patterns }
    }
}

impl Default for RegexScrubber {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiScrubber for RegexScrubber {
    fn scrub(&self, text: &str) -> String {
        let mut scrubbed = text.to_owned();
        for (pattern, tag) in &self.patterns {
            scrubbed = pattern.replace_all(&scrubbed, *tag).into_owned();
        }
        scrubbed
    }
}
