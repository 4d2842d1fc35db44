//! Output format backends
//!
//!     A [`FragmentRenderer`] turns node trees into one output format. The trait carries
//!     the tree walk as default methods (lists, blocks, paragraphs, nodes, invocations),
//!     so a backend mostly implements the leaf operations: escaping text, headings,
//!     links, enumerations, verbatim and math.
//!
//!     Backends differ in how they handle content that is only known at the end of the
//!     document. Backends that answer true to [`FragmentRenderer::supports_delayed_markers`]
//!     emit a marker and later substitute it textually; the others are run twice.
//!
//!     [`RendererRegistry`] looks backends up by name.

pub mod html;
pub mod text;

use crate::ast::{MathDisplay, Node, NodeKind, NodeList};
use crate::blocks::{Block, ListStructure};
use crate::error::{FlmError, Result};
use crate::fragment::Fragment;
use crate::render_context::{DelayedKey, RenderContext, RenderPass};
use flm_config::RenderConfig;
use std::collections::HashMap;
use std::fmt;

pub use html::HtmlFragmentRenderer;
pub use text::TextFragmentRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    Level(u8),
    /// Run-in heading of a theorem-like block.
    Theorem,
}

impl fmt::Display for HeadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingLevel::Level(level) => write!(f, "{}", level),
            HeadingLevel::Theorem => f.write_str("theorem"),
        }
    }
}

/// Tag of an enumeration item: plain text or markup.
#[derive(Debug, Clone)]
pub enum ItemTag {
    Text(String),
    Nodes(NodeList),
}

#[derive(Default)]
pub struct EnumerationOptions<'f> {
    /// Target id of the n-th item (1-based).
    pub target_id_generator: Option<&'f dyn Fn(usize) -> Option<String>>,
    pub annotations: Vec<String>,
    pub nested_depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerbatimOptions {
    pub is_block_level: bool,
    pub annotations: Vec<String>,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct MathContent<'m> {
    pub delimiters: (&'m str, &'m str),
    pub content: &'m str,
    pub display: MathDisplay,
    pub environment: Option<&'m str>,
    pub target_id: Option<&'m str>,
}

/// A float with all its parts already rendered.
#[derive(Debug, Clone)]
pub struct RenderedFloat {
    pub float_type: String,
    pub caption_name: String,
    /// `1`, `2.a`, ...; none for unnumbered floats
    pub number: Option<String>,
    pub caption: Option<String>,
    pub content: String,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsResource {
    pub src: String,
}

pub trait FragmentRenderer: Send + Sync {
    /// Registry name, e.g. "text"
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// True: delayed content is marked and substituted; false: documents render twice.
    fn supports_delayed_markers(&self) -> bool {
        false
    }

    fn document_render_start(&self, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }

    fn document_render_finish(&self, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }

    fn render_fragment(&self, fragment: &Fragment, ctx: &RenderContext<'_>) -> Result<String> {
        self.render_nodelist(fragment.nodes(), ctx, Some(fragment.is_block_level()))
            .map_err(|err| {
                log::debug!("error while rendering fragment ‘{}’: {}", fragment.what(), err);
                err
            })
    }

    /// Render a list as blocks or inline text. `forced` overrides the list's own mode.
    fn render_nodelist(&self, list: &NodeList, ctx: &RenderContext<'_>, forced: Option<bool>) -> Result<String> {
        let structure = ctx.block_structure(list, forced)?;
        if structure.is_block_level {
            self.render_blocks(&structure, ctx)
        } else {
            self.render_inline_content(list.nodes(), &structure, ctx)
        }
    }

    fn render_blocks(&self, structure: &ListStructure, ctx: &RenderContext<'_>) -> Result<String> {
        let mut rendered = Vec::with_capacity(structure.blocks.len());
        for block in &structure.blocks {
            rendered.push(match block {
                Block::Paragraph(nodes) => self.render_build_paragraph(nodes, structure, ctx)?,
                Block::Node(node) => self.render_node(node, structure, ctx)?,
            });
        }
        Ok(self.render_join_blocks(&rendered, ctx))
    }

    fn render_build_paragraph(
        &self,
        nodes: &[Node],
        structure: &ListStructure,
        ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let content = self.render_inline_content(nodes, structure, ctx)?;
        self.render_paragraph(&content, ctx)
    }

    /// Wrap rendered inline content as one paragraph.
    fn render_paragraph(&self, content: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(content.to_string())
    }

    /// Render `list` as blocks with `lead` run into its first paragraph and `trail`
    /// appended to its last one. Either goes into a paragraph of its own when the list
    /// does not start (end) with a paragraph.
    fn render_blocks_with(
        &self,
        lead: &str,
        list: &NodeList,
        trail: &str,
        ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let structure = ctx.block_structure(list, Some(true))?;
        let last = structure.blocks.len().saturating_sub(1);
        let mut rendered = Vec::with_capacity(structure.blocks.len() + 2);
        if !lead.is_empty() && !matches!(structure.blocks.first(), Some(Block::Paragraph(_))) {
            rendered.push(self.render_paragraph(lead, ctx)?);
        }
        for (i, block) in structure.blocks.iter().enumerate() {
            rendered.push(match block {
                Block::Paragraph(nodes) => {
                    let mut content = self.render_inline_content(nodes, &structure, ctx)?;
                    if i == 0 {
                        content.insert_str(0, lead);
                    }
                    if i == last {
                        content.push_str(trail);
                    }
                    self.render_paragraph(&content, ctx)?
                }
                Block::Node(node) => self.render_node(node, &structure, ctx)?,
            });
        }
        if !trail.is_empty() && !matches!(structure.blocks.last(), Some(Block::Paragraph(_))) {
            rendered.push(self.render_paragraph(trail, ctx)?);
        }
        Ok(self.render_join_blocks(&rendered, ctx))
    }

    fn render_inline_content(
        &self,
        nodes: &[Node],
        structure: &ListStructure,
        ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let parts = nodes
            .iter()
            .map(|node| self.render_node(node, structure, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.render_join(&parts, ctx))
    }

    fn render_node(&self, node: &Node, structure: &ListStructure, ctx: &RenderContext<'_>) -> Result<String> {
        match node.kind() {
            NodeKind::Characters(chars) => {
                self.render_value(structure.chars_value(node).unwrap_or(chars), ctx)
            }
            NodeKind::Comment(_) => Ok(String::new()),
            NodeKind::Group { nodes, .. } => self.render_nodelist(nodes, ctx, None),
            NodeKind::Macro(_) | NodeKind::Environment(_) | NodeKind::Specials(_) => {
                self.render_invocable_node(node, ctx)
            }
            NodeKind::Math {
                display,
                delimiters,
                content,
            } => self.render_math_content(
                &MathContent {
                    delimiters: (&delimiters.0, &delimiters.1),
                    content,
                    display: *display,
                    environment: None,
                    target_id: None,
                },
                ctx,
            ),
        }
    }

    /// Render through the node's spec, handling delayed content.
    fn render_invocable_node(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let spec = node.spec().ok_or_else(|| {
            FlmError::render(format!("Node {} has no attached behavior", node.display_name()))
                .or_at(node.range().start)
        })?;

        if ctx.is_standalone() && !spec.allowed_in_standalone_mode() {
            return Err(FlmError::render(format!(
                "Cannot render ‘{}’ in standalone mode.",
                node.verbatim()
            ))
            .or_at(node.range().start));
        }

        if spec.delayed_render() && ctx.pass() != RenderPass::Finalizing {
            let key = DelayedKey::from(node.id());
            if ctx.is_first_pass() {
                ctx.register_delayed(node)?;
                spec.prepare_delayed_render(node, ctx)?;
            }
            if self.supports_delayed_markers() {
                return self.render_delayed_marker(node, key, ctx);
            }
            if ctx.is_first_pass() {
                return self.render_delayed_dummy_placeholder(node, key, ctx);
            }
            return ctx.delayed_content(node);
        }

        spec.render(node, ctx)
    }

    /// Verbatim by default, annotated `inline-math` / `display-math`.
    fn render_math_content(&self, math: &MathContent<'_>, ctx: &RenderContext<'_>) -> Result<String> {
        let mut annotations = vec![format!("{}-math", math.display)];
        if let Some(env) = math.environment {
            annotations.push(format!("env-{}", env.replace('*', "-star")));
        }
        self.render_verbatim(
            &format!("{}{}{}", math.delimiters.0, math.content, math.delimiters.1),
            &VerbatimOptions {
                is_block_level: math.display == MathDisplay::Display,
                annotations,
                target_id: math.target_id.map(str::to_string),
            },
            ctx,
        )
    }

    fn render_join(&self, parts: &[String], _ctx: &RenderContext<'_>) -> String {
        parts.concat()
    }

    fn render_join_blocks(&self, parts: &[String], _ctx: &RenderContext<'_>) -> String {
        parts
            .iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn render_semantic_span(
        &self,
        content: &str,
        _role: &str,
        _annotations: &[String],
        _target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        Ok(content.to_string())
    }

    fn render_semantic_block(
        &self,
        content: &str,
        _role: &str,
        _annotations: &[String],
        _target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        Ok(content.to_string())
    }

    fn replace_delayed_markers(&self, _content: &str, _values: &HashMap<DelayedKey, String>) -> Result<String> {
        Err(FlmError::render(format!(
            "Renderer ‘{}’ does not support delayed content markers",
            self.name()
        )))
    }

    fn render_float(&self, _float: &RenderedFloat, _ctx: &RenderContext<'_>) -> Result<String> {
        Err(FlmError::render(format!(
            "Renderer ‘{}’ does not support floats",
            self.name()
        )))
    }

    fn render_graphics_block(&self, _graphics: &GraphicsResource, _ctx: &RenderContext<'_>) -> Result<String> {
        Err(FlmError::render(format!(
            "Renderer ‘{}’ does not support graphics",
            self.name()
        )))
    }

    fn render_value(&self, value: &str, ctx: &RenderContext<'_>) -> Result<String>;

    fn render_nothing(&self, annotations: &[String], ctx: &RenderContext<'_>) -> Result<String>;

    fn render_empty_error_placeholder(&self, debug: &str, ctx: &RenderContext<'_>) -> Result<String>;

    /// `formats` are `textit`, `textbf`, `emph`, ...
    fn render_text_format(&self, formats: &[&str], content: &NodeList, ctx: &RenderContext<'_>) -> Result<String>;

    fn render_verbatim(&self, value: &str, options: &VerbatimOptions, ctx: &RenderContext<'_>) -> Result<String>;

    fn render_heading(
        &self,
        content: &str,
        level: HeadingLevel,
        inline: bool,
        target_id: Option<&str>,
        ctx: &RenderContext<'_>,
    ) -> Result<String>;

    /// `href` starting with `#` points within the document.
    fn render_link(
        &self,
        kind: &str,
        href: &str,
        display: &str,
        annotations: &[String],
        ctx: &RenderContext<'_>,
    ) -> Result<String>;

    /// `tag` is called with the 1-based item number.
    fn render_enumeration(
        &self,
        items: &[NodeList],
        tag: &dyn Fn(usize) -> ItemTag,
        options: &EnumerationOptions<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<String>;

    fn render_delayed_marker(&self, node: &Node, key: DelayedKey, ctx: &RenderContext<'_>) -> Result<String>;

    fn render_delayed_dummy_placeholder(&self, node: &Node, key: DelayedKey, ctx: &RenderContext<'_>) -> Result<String>;
}

/// Render an item tag with `renderer`.
pub(crate) fn render_item_tag(
    renderer: &dyn FragmentRenderer,
    tag: ItemTag,
    ctx: &RenderContext<'_>,
) -> Result<String> {
    match tag {
        ItemTag::Text(text) => renderer.render_value(&text, ctx),
        ItemTag::Nodes(nodes) => renderer.render_nodelist(&nodes, ctx, Some(false)),
    }
}

/// Backends by name.
pub struct RendererRegistry {
    renderers: HashMap<String, Box<dyn FragmentRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        RendererRegistry {
            renderers: HashMap::new(),
        }
    }

    /// Register a renderer, replacing any with the same name.
    pub fn register<R: FragmentRenderer + 'static>(&mut self, renderer: R) {
        self.renderers
            .insert(renderer.name().to_string(), Box::new(renderer));
    }

    pub fn get(&self, name: &str) -> Option<&dyn FragmentRenderer> {
        self.renderers.get(name).map(|r| r.as_ref())
    }

    pub fn require(&self, name: &str) -> Result<&dyn FragmentRenderer> {
        self.get(name).ok_or_else(|| {
            FlmError::configuration(format!(
                "Unknown output format ‘{}’; available: {}",
                name,
                self.list_renderers().join(", ")
            ))
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.renderers.contains_key(name)
    }

    /// Sorted names.
    pub fn list_renderers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.renderers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TextFragmentRenderer::default());
        registry.register(HtmlFragmentRenderer::default());
        registry
    }

    /// Built-in backends configured from `render.*`.
    pub fn from_config(config: &RenderConfig) -> Self {
        let mut registry = Self::new();
        registry.register(TextFragmentRenderer::from_config(&config.text));
        registry.register(HtmlFragmentRenderer::from_config(&config.html));
        registry
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = RendererRegistry::default();
        assert_eq!(registry.list_renderers(), vec!["html", "text"]);
        assert!(registry.has("text"));
        assert!(registry.get("html").unwrap().supports_delayed_markers());
        assert!(!registry.get("text").unwrap().supports_delayed_markers());
    }

    #[test]
    fn test_registry_unknown_format() {
        let registry = RendererRegistry::default();
        let err = registry.require("latex").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Unknown output format ‘latex’; available: html, text"
        );
    }

    #[test]
    fn test_registry_from_config() {
        let config = flm_config::load_defaults().unwrap();
        let registry = RendererRegistry::from_config(&config.render);
        assert_eq!(registry.list_renderers(), vec!["html", "text"]);
    }

    #[test]
    fn test_join_blocks_skips_empty_parts() {
        let renderer = TextFragmentRenderer::default();
        let ctx = RenderContext::standalone(&renderer);
        let joined = renderer.render_join_blocks(
            &["a".to_string(), String::new(), "b".to_string()],
            &ctx,
        );
        assert_eq!(joined, "a\n\nb");
    }
}
