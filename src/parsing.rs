//! Reading markup into node trees
//!
//!     The engine consumes parsed trees through the [`MarkupParser`] trait; the tokenizer
//!     and reader behind it are replaceable. [`LatexLikeReader`] is the built-in reader:
//!     a logos tokenizer ([`tokens`]) feeding a vocabulary-driven recursive descent
//!     ([`reader`]).

pub mod reader;
pub mod tokens;

use crate::ast::{BlockMode, NodeList, ParsingContext};
use crate::error::Result;
use crate::specinfo::Definitions;
use std::fmt;
use std::sync::Arc;

pub use reader::LatexLikeReader;

/// Turns a source into a node list using the given vocabulary.
pub trait MarkupParser: fmt::Debug + Send + Sync {
    fn parse(
        &self,
        context: &Arc<ParsingContext>,
        definitions: &Definitions,
        mode: BlockMode,
    ) -> Result<NodeList>;
}
