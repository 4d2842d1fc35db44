//! Block structure of node lists
//!
//!     A node list is either inline text or a sequence of blocks. Block-level lists are
//!     split into paragraphs and stand-alone block nodes:
//!
//!         - a block-level node ends the current paragraph and becomes its own block;
//!         - a paragraph-break marker (blank line, `\par`) ends the paragraph and is dropped;
//!         - a block heading (run-in `\paragraph{...}`) ends the paragraph and opens the next
//!           one, so that it renders inline at the start of the following text.
//!
//!     Whitespace runs collapse to a single space. Inside a paragraph the leading and
//!     trailing characters are trimmed, so no paragraph starts or ends with whitespace;
//!     inline lists are never trimmed.
//!
//!     The result is a [`ListStructure`]: the blocks plus the normalized text of every
//!     characters node, keyed by node id. Nodes themselves are never touched, so the same
//!     tree can be structured independently by any number of render contexts.

use crate::ast::{Node, NodeId, NodeKind, NodeList};
use crate::error::{FlmError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\n\r]+").unwrap());

/// Collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").into_owned()
}

#[derive(Debug, Clone)]
pub enum Block {
    Paragraph(Vec<Node>),
    Node(Node),
}

#[derive(Debug, Default)]
pub struct ListStructure {
    pub is_block_level: bool,
    pub blocks: Vec<Block>,
    chars: HashMap<NodeId, String>,
}

impl ListStructure {
    /// Normalized text of a characters node of this list.
    pub fn chars_value(&self, node: &Node) -> Option<&str> {
        self.chars.get(&node.id()).map(String::as_str)
    }
}

fn is_block_heading(node: &Node) -> bool {
    node.spec().map_or(false, |spec| spec.is_block_heading())
}

fn is_paragraph_break(node: &Node) -> bool {
    node.spec()
        .map_or(false, |spec| spec.is_paragraph_break_marker())
}

pub fn is_block_level_node(node: &Node) -> bool {
    match node.kind() {
        NodeKind::Group { nodes, .. } => list_is_block_level(nodes),
        NodeKind::Macro(_) | NodeKind::Environment(_) | NodeKind::Specials(_) => {
            node.spec().map_or(false, |spec| spec.is_block_level())
        }
        NodeKind::Characters(_) | NodeKind::Comment(_) | NodeKind::Math { .. } => false,
    }
}

/// Block-levelness a list has on its own: its declared mode, else its children.
pub fn list_is_block_level(list: &NodeList) -> bool {
    list.mode()
        .forced()
        .unwrap_or_else(|| list.iter().any(is_block_level_node))
}

/// Structure `list`. `forced` overrides the list's declared mode.
pub fn structure(list: &NodeList, forced: Option<bool>) -> Result<ListStructure> {
    let is_block_level = match forced.or(list.mode().forced()) {
        Some(flag) => flag,
        None => list.iter().any(is_block_level_node),
    };

    let mut result = ListStructure {
        is_block_level,
        ..ListStructure::default()
    };

    if !is_block_level {
        for node in list {
            if is_block_level_node(node) {
                return Err(FlmError::at_node(
                    format!(
                        "Content is not allowed in inline text (not block level): ‘{}’",
                        node.verbatim()
                    ),
                    node,
                ));
            }
            if let Some(text) = node.chars() {
                result.chars.insert(node.id(), normalize_whitespace(text));
            }
        }
        return Ok(result);
    }

    let mut builder = BlocksBuilder::default();
    for node in list {
        builder.push(node);
    }
    builder.flush();
    result.blocks = builder.blocks;
    result.chars = builder.chars;
    Ok(result)
}

/// Structure `list` and every list nested below it, returning the resolved mode of
/// `list` itself.
pub fn validate_tree(list: &NodeList, forced: Option<bool>) -> Result<bool> {
    let structure = structure(list, forced)?;
    for node in list {
        validate_node(node)?;
    }
    Ok(structure.is_block_level)
}

fn validate_node(node: &Node) -> Result<()> {
    match node.kind() {
        NodeKind::Group { nodes, .. } => {
            validate_tree(nodes, None)?;
        }
        NodeKind::Macro(inv) | NodeKind::Environment(inv) | NodeKind::Specials(inv) => {
            for arg in &inv.arguments {
                match &arg.value {
                    crate::ast::ArgumentValue::Nodes(nodes) => {
                        validate_tree(nodes, None)?;
                    }
                    crate::ast::ArgumentValue::Invocations(nodes) => {
                        for tacked in nodes {
                            validate_node(tacked)?;
                        }
                    }
                    _ => {}
                }
            }
            if let Some(body) = &inv.body {
                validate_tree(body, None)?;
            }
        }
        NodeKind::Characters(_) | NodeKind::Comment(_) | NodeKind::Math { .. } => {}
    }
    Ok(())
}

#[derive(Default)]
struct BlocksBuilder {
    blocks: Vec<Block>,
    paragraph: Vec<Node>,
    chars: HashMap<NodeId, String>,
}

impl BlocksBuilder {
    fn paragraph_started(&self) -> bool {
        self.paragraph
            .iter()
            .any(|n| !n.is_comment() && !is_block_heading(n))
    }

    fn push(&mut self, node: &Node) {
        if is_block_level_node(node) {
            self.flush();
            if is_paragraph_break(node) {
                return;
            }
            if is_block_heading(node) {
                self.paragraph.push(node.clone());
                return;
            }
            self.blocks.push(Block::Node(node.clone()));
            return;
        }
        if !self.paragraph_started() && node.is_whitespace_chars() {
            return;
        }
        self.paragraph.push(node.clone());
    }

    fn flush(&mut self) {
        let paragraph = std::mem::take(&mut self.paragraph);
        if !paragraph.iter().any(|n| !n.is_comment()) {
            return;
        }

        let mut seen_chars = false;
        for (i, node) in paragraph.iter().enumerate() {
            let Some(text) = node.chars() else {
                continue;
            };
            let mut value = normalize_whitespace(text);
            let is_head = !seen_chars
                && paragraph[..i]
                    .iter()
                    .all(|n| n.is_comment() || is_block_heading(n));
            let is_tail = paragraph[i + 1..].iter().all(Node::is_comment);
            if is_head {
                value = value.trim_start().to_string();
            }
            if is_tail {
                value = value.trim_end().to_string();
            }
            seen_chars = true;
            self.chars.insert(node.id(), value);
        }

        self.blocks.push(Block::Paragraph(paragraph));
    }
}
