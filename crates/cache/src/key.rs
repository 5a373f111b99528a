//! Fragment keys: `(kind, parameters, content hash)`.

use serde::Serialize;
use std::str::FromStr;

/// What a cached fragment represents. Used for reporting and filtering;
/// never needed to tell two keys apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Analysis,
    Enrichment,
    Context,
    Conversation,
    Instruction,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Enrichment => "enrichment",
            Self::Context => "context",
            Self::Conversation => "conversation",
            Self::Instruction => "instruction",
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FragmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            // market-data snapshots are OHLC bars
            "enrichment" | "ohlc" => Ok(Self::Enrichment),
            "context" => Ok(Self::Context),
            "conversation" => Ok(Self::Conversation),
            "instruction" => Ok(Self::Instruction),
            other => Err(format!("unknown fragment kind: {other}")),
        }
    }
}

/// Ordered `(name, value)` parameters of a fragment, e.g. `pair` then `date`.
///
/// Order is significant: prefix invalidation matches leading pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FragmentParams(Vec<(String, String)>);

impl FragmentParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a parameter (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Look up a parameter value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// True when `prefix` equals the leading parameters of `self`.
    /// The empty prefix matches everything.
    pub fn starts_with(&self, prefix: &FragmentParams) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for FragmentParams {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

impl std::fmt::Display for FragmentParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Exact cache key. Equality is structural over all three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FragmentKey {
    pub kind: FragmentKind,
    pub params: FragmentParams,
    pub content_hash: String,
}

impl FragmentKey {
    pub fn new(kind: FragmentKind, params: FragmentParams, content: &str) -> Self {
        Self {
            kind,
            params,
            content_hash: content_hash(content),
        }
    }
}

impl std::fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.params, self.content_hash)
    }
}

/// Short digest of fragment content (first 16 hex chars of blake3).
///
/// Only used for key derivation and change detection; a collision
/// degrades to a stale hit for identical parameters, never to a
/// cross-parameter hit.
pub fn content_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    hash.to_hex().as_str()[..16].to_string()
}
