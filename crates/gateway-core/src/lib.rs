//! API Gateway core library
//!
//! Dependency-light routing primitives shared by the gateway binary:
//!
//! - [`StripContextAndPrefix`]: removes leading path segments from a matched
//!   route and recomputes the logical context path seen by the backend.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod rewrite;

pub use rewrite::{ContextSource, RewrittenPath, StripContextAndPrefix};
