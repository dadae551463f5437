//! Context and prefix stripping for matched routes.
//!
//! A route mounted at `/api/secom` with `parts: 2` forwards
//! `/api/secom/v1/object` to its backend as `/v1/object`.  The context path is
//! computed separately so backends that rebuild links from their mount point
//! keep resolving correctly.
//!
//! | Raw path | `parts` | Rewritten path | Context path (original source) |
//! |----------|---------|----------------|--------------------------------|
//! | `/a/b/c/d` | 2 | `/c/d` | `/c/d` |
//! | `/a/b/c/` | 1 | `/b/c/` | `/b/c` |
//! | `/a/b` | 5 | `/` | `/` |
//! | `/a/b` | 0 | `/a/b` | `/a/b` |

use serde::{Deserialize, Serialize};

/// Default number of leading segments stripped by a route.
pub const DEFAULT_PARTS: usize = 1;

/// Which path the context path is derived from.
///
/// Both variants skip the same number of leading segments; they differ only
/// in the input they tokenize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Tokenize the raw request path before any segment is removed.
    #[default]
    Original,
    /// Tokenize the already-rewritten path, skipping `parts` again.
    Rewritten,
}

/// Result of applying [`StripContextAndPrefix`] to a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPath {
    /// Path forwarded to the backend.
    pub path: String,
    /// Logical mount point seen by the backend.
    pub context_path: String,
}

/// Strips `parts` leading segments from a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripContextAndPrefix {
    parts: usize,
    context_source: ContextSource,
}

impl Default for StripContextAndPrefix {
    fn default() -> Self {
        Self::new(DEFAULT_PARTS)
    }
}

impl StripContextAndPrefix {
    /// Create a filter stripping `parts` segments, with the context path taken
    /// from the original path.
    #[must_use]
    pub fn new(parts: usize) -> Self {
        Self {
            parts,
            context_source: ContextSource::Original,
        }
    }

    /// Select the path the context path is computed from.
    #[must_use]
    pub fn with_context_source(mut self, source: ContextSource) -> Self {
        self.context_source = source;
        self
    }

    /// Number of leading segments removed.
    #[must_use]
    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Context path source in use.
    #[must_use]
    pub fn context_source(&self) -> ContextSource {
        self.context_source
    }

    /// Rewrite `raw_path` (the undecoded URI path, no query string).
    #[must_use]
    pub fn apply(&self, raw_path: &str) -> RewrittenPath {
        let path = self.strip(raw_path);

        let context_path = match self.context_source {
            ContextSource::Original => self.context_of(raw_path),
            ContextSource::Rewritten => self.context_of(&path),
        };

        RewrittenPath { path, context_path }
    }

    fn strip(&self, raw_path: &str) -> String {
        if self.parts == 0 {
            return if raw_path.is_empty() {
                "/".to_string()
            } else {
                raw_path.to_string()
            };
        }

        let mut new_path = String::from("/");
        for segment in tokenize(raw_path).skip(self.parts) {
            if new_path.len() > 1 {
                new_path.push('/');
            }
            new_path.push_str(segment);
        }

        if new_path.len() > 1 && raw_path.ends_with('/') {
            new_path.push('/');
        }

        new_path
    }

    fn context_of(&self, path: &str) -> String {
        let remainder: Vec<&str> = tokenize(path).skip(self.parts).collect();
        format!("/{}", remainder.join("/"))
    }
}

/// Split on `/`, trimming whitespace and dropping empty tokens.
fn tokenize(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').map(str::trim).filter(|s| !s.is_empty())
}
