//! Behavior attached to invocable nodes
//!
//!     Every macro, environment and specials known to an [`Environment`](crate::environment::Environment)
//!     is described by a [`SpecInfo`]. It tells the reader which arguments to expect
//!     and how to read an environment body; it tells the block structurer whether the node
//!     is block-level; and it renders the node when a renderer walks the tree.
//!
//!     Specs whose output depends on information gathered later in the document (a `\ref`
//!     to a section further down) declare [`SpecInfo::delayed_render`]. The render context
//!     then calls [`SpecInfo::prepare_delayed_render`] on the first pass and asks for the
//!     final content once the whole document has been seen.
//!
//!     [`Definitions`] is the lookup table of specs by macro, environment and specials name.

use crate::ast::{BlockMode, Node, NodeKind};
use crate::error::{FlmError, Result};
use crate::render_context::RenderContext;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type SpecRef = Arc<dyn SpecInfo>;

/// Shape of one argument of a macro or environment.
#[derive(Debug, Clone)]
pub enum ArgumentKind {
    /// `{...}` parsed as a node list
    Mandatory(BlockMode),
    /// `[...]` parsed as a node list, may be absent
    Optional(BlockMode),
    /// A `*` right after the name
    Star,
    /// `{...}` kept as raw characters
    Chars,
    /// `[...]` kept as raw characters, may be absent
    OptionalChars,
    /// Zero or more invocations of the given macros directly following, read with `spec`
    TackOn { macros: Vec<String>, spec: SpecRef },
}

#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    pub kind: ArgumentKind,
}

impl ArgumentSpec {
    pub fn mandatory(name: &str) -> Self {
        Self::new(name, ArgumentKind::Mandatory(BlockMode::Inline))
    }

    pub fn optional(name: &str) -> Self {
        Self::new(name, ArgumentKind::Optional(BlockMode::Inline))
    }

    pub fn star(name: &str) -> Self {
        Self::new(name, ArgumentKind::Star)
    }

    pub fn chars(name: &str) -> Self {
        Self::new(name, ArgumentKind::Chars)
    }

    pub fn optional_chars(name: &str) -> Self {
        Self::new(name, ArgumentKind::OptionalChars)
    }

    /// `\label{...}` invocations tacked onto the owner.
    pub fn labels(name: &str) -> Self {
        Self::tack_on(name, &["label"], Arc::new(LabelSpec))
    }

    pub fn tack_on(name: &str, macros: &[&str], spec: SpecRef) -> Self {
        Self::new(
            name,
            ArgumentKind::TackOn {
                macros: macros.iter().map(|m| m.to_string()).collect(),
                spec,
            },
        )
    }

    /// Change the block mode of a node-list argument.
    pub fn with_mode(mut self, mode: BlockMode) -> Self {
        self.kind = match self.kind {
            ArgumentKind::Mandatory(_) => ArgumentKind::Mandatory(mode),
            ArgumentKind::Optional(_) => ArgumentKind::Optional(mode),
            other => other,
        };
        self
    }

    fn new(name: &str, kind: ArgumentKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// How an environment body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySpec {
    Parsed(BlockMode),
    /// Kept verbatim up to the matching `\end{...}`
    Raw,
}

/// Attached render behavior of an invocable node.
pub trait SpecInfo: fmt::Debug + Send + Sync {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        Vec::new()
    }

    /// Environments only.
    fn body(&self) -> Option<BodySpec> {
        None
    }

    /// Extra vocabulary visible only inside this environment's body.
    fn body_definitions(&self) -> Option<Definitions> {
        None
    }

    fn is_block_level(&self) -> bool {
        false
    }

    /// Block-level, but rendered at the start of the following paragraph (run-in headings).
    fn is_block_heading(&self) -> bool {
        false
    }

    fn is_paragraph_break_marker(&self) -> bool {
        false
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        false
    }

    fn delayed_render(&self) -> bool {
        false
    }

    /// Called once right after the node is read. May validate and rebuild it.
    fn finalize(&self, node: Node) -> Result<Node> {
        Ok(node)
    }

    fn prepare_delayed_render(&self, _node: &Node, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String>;
}

/// Macros, environments and specials known by name.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    macros: HashMap<String, SpecRef>,
    environments: HashMap<String, SpecRef>,
    specials: HashMap<String, SpecRef>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_macro(mut self, name: &str, spec: SpecRef) -> Self {
        self.add_macro(name, spec);
        self
    }

    pub fn with_environment(mut self, name: &str, spec: SpecRef) -> Self {
        self.add_environment(name, spec);
        self
    }

    pub fn with_specials(mut self, chars: &str, spec: SpecRef) -> Self {
        self.add_specials(chars, spec);
        self
    }

    pub fn add_macro(&mut self, name: &str, spec: SpecRef) {
        if self.macros.insert(name.to_string(), spec).is_some() {
            log::debug!("macro ‘\\{}’ redefined", name);
        }
    }

    pub fn add_environment(&mut self, name: &str, spec: SpecRef) {
        if self.environments.insert(name.to_string(), spec).is_some() {
            log::debug!("environment ‘{}’ redefined", name);
        }
    }

    pub fn add_specials(&mut self, chars: &str, spec: SpecRef) {
        if self.specials.insert(chars.to_string(), spec).is_some() {
            log::debug!("specials ‘{}’ redefined", chars.escape_debug());
        }
    }

    /// Add everything from `other`; later definitions win.
    pub fn merge(&mut self, other: Definitions) {
        for (name, spec) in other.macros {
            self.add_macro(&name, spec);
        }
        for (name, spec) in other.environments {
            self.add_environment(&name, spec);
        }
        for (chars, spec) in other.specials {
            self.add_specials(&chars, spec);
        }
    }

    pub fn lookup_macro(&self, name: &str) -> Option<&SpecRef> {
        self.macros.get(name)
    }

    pub fn lookup_environment(&self, name: &str) -> Option<&SpecRef> {
        self.environments.get(name)
    }

    pub fn lookup_specials(&self, chars: &str) -> Option<&SpecRef> {
        self.specials.get(chars)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty() && self.environments.is_empty() && self.specials.is_empty()
    }
}

/// Blank line or `\par`.
#[derive(Debug, Clone, Default)]
pub struct ParagraphBreakSpec;

impl SpecInfo for ParagraphBreakSpec {
    fn is_block_level(&self) -> bool {
        true
    }

    fn is_paragraph_break_marker(&self) -> bool {
        true
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, _ctx: &RenderContext<'_>) -> Result<String> {
        Err(FlmError::at_node("Paragraph break is not allowed here", node))
    }
}

/// `\label{type:label}` as tacked onto a heading, item or equation.
#[derive(Debug, Clone, Default)]
pub struct LabelSpec;

impl SpecInfo for LabelSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::chars("label")]
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, _node: &Node, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(String::new())
    }
}

/// Split `type:label`; the type is absent if there is no colon.
pub fn split_label(label: &str) -> (Option<&str>, &str) {
    match label.split_once(':') {
        Some((ref_type, ref_label)) => (Some(ref_type), ref_label),
        None => (None, label),
    }
}

/// Collect `(type, label)` pairs from `\label` invocations, checking each type against
/// `allowed_prefixes`.
pub fn collect_labels(label_nodes: &[Node], allowed_prefixes: &[&str]) -> Result<Vec<(String, String)>> {
    let mut labels = Vec::new();
    for node in label_nodes {
        let label = match node.kind() {
            NodeKind::Macro(inv) if inv.name == "label" => inv.chars_arg("label").unwrap_or(""),
            _ => {
                return Err(FlmError::at_node(
                    format!("Bad information field macro {}", node.display_name()),
                    node,
                ))
            }
        };
        let (ref_type, ref_label) = split_label(label);
        match ref_type {
            Some(ref_type) if allowed_prefixes.contains(&ref_type) => {
                labels.push((ref_type.to_string(), ref_label.to_string()));
            }
            _ => {
                let expected = allowed_prefixes
                    .iter()
                    .map(|p| format!("‘{}:’", p))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(FlmError::at_node(
                    format!(
                        "Argument label ‘{}’ has incorrect prefix ‘{}:’; expected one of {}",
                        label,
                        ref_type.unwrap_or(""),
                        expected
                    ),
                    node,
                ));
            }
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_label() {
        assert_eq!(split_label("sec:intro"), (Some("sec"), "intro"));
        assert_eq!(split_label("eq:a:b"), (Some("eq"), "a:b"));
        assert_eq!(split_label("plain"), (None, "plain"));
    }

    #[test]
    fn test_definitions_merge_overrides() {
        let mut defs = Definitions::new().with_macro("par", Arc::new(ParagraphBreakSpec));
        defs.merge(Definitions::new().with_macro("par", Arc::new(LabelSpec)));
        let spec = defs.lookup_macro("par").unwrap();
        assert!(!spec.is_block_level());
        assert!(defs.lookup_environment("par").is_none());
        assert!(!defs.is_empty());
    }

    #[test]
    fn test_argument_mode_override() {
        let arg = ArgumentSpec::mandatory("body").with_mode(BlockMode::Block);
        assert!(matches!(arg.kind, ArgumentKind::Mandatory(BlockMode::Block)));
        let arg = ArgumentSpec::chars("label").with_mode(BlockMode::Block);
        assert!(matches!(arg.kind, ArgumentKind::Chars));
    }
}
