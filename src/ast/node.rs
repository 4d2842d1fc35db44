//! Node and node list types
//!
//!     Nodes are cheap, reference-counted handles onto immutable data. Every node and
//!     every node list gets a process-unique id at construction. The id is the identity
//!     used by side-tables (block structure, delayed render registry, counters), so
//!     derived data never has to be written back onto a node that another document may
//!     share.
//!
//!     Invocations (macros, environments, specials) carry their arguments and an optional
//!     attached [`SpecRef`] describing how they render. A node without a spec is rendered
//!     structurally (characters, groups, math, comments).

use super::range::Range;
use crate::specinfo::SpecRef;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Stable identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn fresh() -> Self {
        NodeId(next_id())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeListId(u64);

impl NodeListId {
    fn fresh() -> Self {
        NodeListId(next_id())
    }
}

/// Opaque description of where a source came from (a file path, a URL, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceInfo(pub String);

impl fmt::Display for ResourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State shared by all nodes parsed from one source.
#[derive(Debug)]
pub struct ParsingContext {
    pub source: Arc<str>,
    pub what: String,
    pub resource_info: Option<ResourceInfo>,
    pub standalone_mode: bool,
    pub line_offset: usize,
}

impl ParsingContext {
    pub fn new(source: &str, what: impl Into<String>) -> Self {
        Self {
            source: Arc::from(source),
            what: what.into(),
            resource_info: None,
            standalone_mode: false,
            line_offset: 0,
        }
    }
}

/// How a node list is laid out when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMode {
    /// Paragraph mode: content is split into blocks.
    Block,
    /// Inline text: block-level content is an error.
    Inline,
    /// Block mode iff some child is block-level.
    Infer,
}

impl BlockMode {
    pub fn forced(self) -> Option<bool> {
        match self {
            BlockMode::Block => Some(true),
            BlockMode::Inline => Some(false),
            BlockMode::Infer => None,
        }
    }

    pub fn from_forced(forced: Option<bool>) -> Self {
        match forced {
            Some(true) => BlockMode::Block,
            Some(false) => BlockMode::Inline,
            None => BlockMode::Infer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathDisplay {
    Inline,
    Display,
}

impl fmt::Display for MathDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathDisplay::Inline => f.write_str("inline"),
            MathDisplay::Display => f.write_str("display"),
        }
    }
}

/// The closed set of node variants.
#[derive(Debug)]
pub enum NodeKind {
    Characters(String),
    Comment(String),
    Group {
        delimiters: (String, String),
        nodes: NodeList,
    },
    Macro(Invocation),
    Environment(Invocation),
    Specials(Invocation),
    Math {
        display: MathDisplay,
        delimiters: (String, String),
        content: String,
    },
}

/// A macro, environment or specials invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub body: Option<NodeList>,
    pub spec: Option<SpecRef>,
}

impl Invocation {
    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    /// Node list content of an argument, if it was provided.
    pub fn nodes_arg(&self, name: &str) -> Option<&NodeList> {
        match self.argument(name) {
            Some(ArgumentValue::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    /// Raw characters of an argument, if it was provided.
    pub fn chars_arg(&self, name: &str) -> Option<&str> {
        match self.argument(name) {
            Some(ArgumentValue::Chars(chars)) => Some(chars),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.argument(name), Some(ArgumentValue::Flag))
    }

    /// Invocations that were tacked on after this one (e.g. `\label` after `\section`).
    pub fn tacked_on(&self, name: &str) -> &[Node] {
        match self.argument(name) {
            Some(ArgumentValue::Invocations(nodes)) => nodes,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub value: ArgumentValue,
}

#[derive(Debug, Clone)]
pub enum ArgumentValue {
    Absent,
    Flag,
    Nodes(NodeList),
    Chars(String),
    Invocations(Vec<Node>),
}

#[derive(Debug)]
struct NodeData {
    id: NodeId,
    range: Range,
    context: Arc<ParsingContext>,
    kind: NodeKind,
}

/// A node of the parsed tree.
#[derive(Debug, Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    pub fn new(kind: NodeKind, range: Range, context: Arc<ParsingContext>) -> Self {
        Node(Arc::new(NodeData {
            id: NodeId::fresh(),
            range,
            context,
            kind,
        }))
    }

    /// Same identity, position and context; new content. Used by spec hooks that
    /// rewrite a freshly parsed node before anyone else has seen it.
    pub fn rebuilt(&self, kind: NodeKind) -> Self {
        Node(Arc::new(NodeData {
            id: self.0.id,
            range: self.0.range.clone(),
            context: self.0.context.clone(),
            kind,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn range(&self) -> &Range {
        &self.0.range
    }

    pub fn context(&self) -> &Arc<ParsingContext> {
        &self.0.context
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    /// Exact source text this node was parsed from.
    pub fn verbatim(&self) -> &str {
        self.0
            .context
            .source
            .get(self.0.range.span.clone())
            .unwrap_or("")
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        match &self.0.kind {
            NodeKind::Macro(inv) | NodeKind::Environment(inv) | NodeKind::Specials(inv) => {
                Some(inv)
            }
            _ => None,
        }
    }

    pub fn spec(&self) -> Option<&SpecRef> {
        self.invocation().and_then(|inv| inv.spec.as_ref())
    }

    pub fn chars(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Characters(chars) => Some(chars),
            _ => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.0.kind, NodeKind::Comment(_))
    }

    pub fn is_whitespace_chars(&self) -> bool {
        self.chars()
            .map(|c| c.chars().all(char::is_whitespace))
            .unwrap_or(false)
    }

    pub fn is_macro(&self, name: &str) -> bool {
        matches!(&self.0.kind, NodeKind::Macro(inv) if inv.name == name)
    }

    /// How the node is named in messages: `\section`, `\begin{figure}`, ...
    pub fn display_name(&self) -> String {
        match &self.0.kind {
            NodeKind::Characters(_) => "characters".to_string(),
            NodeKind::Comment(_) => "comment".to_string(),
            NodeKind::Group { .. } => "group".to_string(),
            NodeKind::Macro(inv) => format!("\\{}", inv.name),
            NodeKind::Environment(inv) => format!("\\begin{{{}}}", inv.name),
            NodeKind::Specials(inv) => inv.name.escape_debug().to_string(),
            NodeKind::Math { display, .. } => format!("{} math", display),
        }
    }
}

#[derive(Debug)]
struct NodeListData {
    id: NodeListId,
    nodes: Vec<Node>,
    mode: BlockMode,
    range: Range,
}

/// An ordered list of nodes with a declared layout mode.
#[derive(Debug, Clone)]
pub struct NodeList(Arc<NodeListData>);

impl NodeList {
    pub fn new(nodes: Vec<Node>, mode: BlockMode, range: Range) -> Self {
        NodeList(Arc::new(NodeListData {
            id: NodeListId::fresh(),
            nodes,
            mode,
            range,
        }))
    }

    /// A list spanning exactly its nodes (or an empty default range).
    pub fn from_nodes(nodes: Vec<Node>, mode: BlockMode) -> Self {
        let range = Range::bounding_box(nodes.iter().map(|n| n.range())).unwrap_or_default();
        Self::new(nodes, mode, range)
    }

    pub fn id(&self) -> NodeListId {
        self.0.id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.0.nodes
    }

    pub fn mode(&self) -> BlockMode {
        self.0.mode
    }

    pub fn range(&self) -> &Range {
        &self.0.range
    }

    /// Source text spanned by the list; empty for a list without nodes.
    pub fn verbatim(&self) -> &str {
        match self.0.nodes.first() {
            Some(node) => node
                .context()
                .source
                .get(self.0.range.span.clone())
                .unwrap_or(""),
            None => "",
        }
    }

    pub fn len(&self) -> usize {
        self.0.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.nodes.iter()
    }

    /// True if there is nothing but whitespace and comments.
    pub fn is_blank(&self) -> bool {
        self.0
            .nodes
            .iter()
            .all(|n| n.is_comment() || n.is_whitespace_chars())
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::range::Position;

    fn chars(context: &Arc<ParsingContext>, text: &str, span: std::ops::Range<usize>) -> Node {
        let range = Range::new(
            span.clone(),
            Position::new(0, span.start),
            Position::new(0, span.end),
        );
        Node::new(NodeKind::Characters(text.to_string()), range, context.clone())
    }

    #[test]
    fn test_ids_are_unique_and_rebuild_keeps_identity() {
        let context = Arc::new(ParsingContext::new("hello world", "test"));
        let a = chars(&context, "hello", 0..5);
        let b = chars(&context, " world", 5..11);
        assert_ne!(a.id(), b.id());

        let rebuilt = a.rebuilt(NodeKind::Characters("HELLO".to_string()));
        assert_eq!(rebuilt.id(), a.id());
        assert_eq!(rebuilt.chars(), Some("HELLO"));
        assert_eq!(rebuilt.verbatim(), "hello");
    }

    #[test]
    fn test_verbatim_slices_source() {
        let context = Arc::new(ParsingContext::new("hello world", "test"));
        let b = chars(&context, " world", 5..11);
        assert_eq!(b.verbatim(), " world");
        assert!(!b.is_whitespace_chars());
    }

    #[test]
    fn test_nodelist_range_and_blankness() {
        let context = Arc::new(ParsingContext::new("  \n  ", "test"));
        let a = chars(&context, "  \n", 0..3);
        let b = chars(&context, "  ", 3..5);
        let list = NodeList::from_nodes(vec![a, b], BlockMode::Infer);
        assert_eq!(list.len(), 2);
        assert_eq!(list.range().span, 0..5);
        assert!(list.is_blank());
        assert_ne!(
            list.id(),
            NodeList::from_nodes(vec![], BlockMode::Infer).id()
        );
    }
}
