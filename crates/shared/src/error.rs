use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resolution failures are fatal for the navigation that triggered them and
/// are returned to the caller instead of being swallowed like hook failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolveError {
    #[error("no route matched path {path:?} and no fallback route is registered")]
    NoRouteMatched { path: String },
}
