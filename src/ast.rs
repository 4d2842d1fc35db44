//! Parsed markup tree
//!
//!     The tree is a closed set of node variants (see [`NodeKind`]): characters, comments,
//!     groups, macro/environment/specials invocations and math. It is built once by a
//!     [`MarkupParser`](crate::parsing::MarkupParser) and never mutated afterwards.
//!
//!     Positions follow the usual flow: the tokenizer yields byte spans, the reader turns
//!     them into [`Range`] values through [`SourceLocation`], and errors report the start
//!     [`Position`] of the offending node.

pub mod node;
pub mod range;

pub use node::{
    Argument, ArgumentValue, BlockMode, Invocation, MathDisplay, Node, NodeId, NodeKind, NodeList,
    NodeListId, ParsingContext, ResourceInfo,
};
pub use range::{Position, Range, SourceLocation};
