//! The rule language profiles use to pull values out of response bodies.
//!
//! A rule string compiles once into a [`RuleChain`] and is cached in a
//! [`RuleCache`]. A [`RuleEvaluator`] runs chains against [`Node`]s of a
//! parsed [`Document`]; HTML, JSON and text bodies go through the same
//! dispatcher.
//!
//! ```text
//! li.book                       CSS list
//! .name@text  a@href            CSS with accessor
//! $.data.list[*]  @json:$.name  JSONPath
//! @regex:total = (\d+)          regex capture
//! p@text##\s+## ###             regex replace (first match only)
//! a@href@js:result + "?v=1"     script post-processing
//! -ul.toc li || ol li           reversed list, alternatives
//! ```

mod evaluator;
mod json_path;
mod node;
mod step;

pub use evaluator::{NodeList, RuleCache, RuleEvaluator};
pub use json_path::JsonPath;
pub use node::{BodyFormat, Document, Node};
pub use step::{Accessor, RuleChain, RuleStep};

use thiserror::Error;

/// A rule that failed to compile or evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleError {
    /// What went wrong.
    pub message: String,
}

impl RuleError {
    /// Creates a new rule error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
