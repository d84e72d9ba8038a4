use serde::{Deserialize, Serialize};
use shared::{
    domain::{Location, Params, RouteKey},
    error::ResolveError,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route pattern must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    #[error("route pattern {0:?} contains an unnamed ':' parameter segment")]
    UnnamedParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route pattern such as `/user/:id`.
///
/// Matching is exact on segment count; `:name` segments capture their value
/// into the extracted parameter set. A route registered without a pattern
/// acts as the wildcard fallback and never goes through `PathPattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }

        let mut segments = Vec::new();
        for part in split_path(raw) {
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::UnnamedParam(raw.to_string()));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete path against this pattern, extracting parameters.
    pub fn capture(&self, path: &str) -> Option<Params> {
        let parts = split_path(path);
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(expected) if expected == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Normalized result of resolving a location: extracted parameters plus the
/// winning route's identity, with behavior references stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub key: RouteKey,
    pub params: Params,
    pub pattern: Option<String>,
    pub url: String,
}

struct TableEntry {
    key: RouteKey,
    pattern: Option<PathPattern>,
}

/// Ordered route entries with first-match-wins semantics. An entry without a
/// pattern matches everything and is the fallback slot.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<TableEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: RouteKey, pattern: Option<PathPattern>) {
        self.entries.push(TableEntry { key, pattern });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a location to the first matching entry, in registration order.
    pub fn first_match(&self, location: &Location) -> Result<RouteMatch, ResolveError> {
        for entry in &self.entries {
            let captured = match &entry.pattern {
                Some(pattern) => pattern.capture(&location.path),
                None => Some(Params::new()),
            };
            if let Some(params) = captured {
                return Ok(RouteMatch {
                    key: entry.key.clone(),
                    params,
                    pattern: entry.pattern.as_ref().map(|p| p.as_str().to_string()),
                    url: location.path.clone(),
                });
            }
        }

        Err(ResolveError::NoRouteMatched {
            path: location.path.clone(),
        })
    }
}
