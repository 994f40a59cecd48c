use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters the provider is allowed to receive from a client.
///
/// Anything outside this list is dropped before the upstream URL is built.
pub const ALLOWED_PARAMS: &[&str] = &[
    "model",
    "language",
    "encoding",
    "sample_rate",
    "channels",
    "punctuate",
    "diarize",
    "smart_format",
    "interim_results",
    "utterances",
    "vad_events",
    "filler_words",
    "multichannel",
    "alternatives",
    "numerals",
    "profanity_filter",
    "redact",
    "search",
    "replace",
    "keywords",
    "endpointing",
    "tier",
    "detect_entities",
    "dictation",
    "utterance_end_ms",
    "version",
];

/// Whitelisted transcription parameters for one session.
///
/// Kept in a sorted map so the upstream query string is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptionParams(BTreeMap<String, String>);

impl TranscriptionParams {
    pub fn is_allowed(name: &str) -> bool {
        ALLOWED_PARAMS.contains(&name)
    }

    /// Build from arbitrary key/value pairs, keeping only allowed, non-empty
    /// entries. A repeated key keeps its first value, and an empty first
    /// value drops the key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut first: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in pairs {
            let k = k.as_ref();
            if Self::is_allowed(k) {
                first
                    .entry(k.to_string())
                    .or_insert_with(|| v.as_ref().to_string());
            }
        }
        first.retain(|_, v| !v.is_empty());
        Self(first)
    }

    /// Parse a raw (still percent-encoded) query string.
    pub fn from_query(query: Option<&str>) -> Self {
        match query {
            Some(query) => Self::from_pairs(url::form_urlencoded::parse(query.as_bytes())),
            None => Self::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace the query string of `url` with exactly these parameters.
    pub fn apply_to(&self, url: &mut Url) {
        url.set_query(None);
        if self.0.is_empty() {
            return;
        }
        let mut query = url.query_pairs_mut();
        for (name, value) in &self.0 {
            query.append_pair(name, value);
        }
    }
}
