//! Figures, tables and other floats
//!
//!     Each float type is an environment whose body holds the float content, plus an
//!     optional `\caption{...}` and `\label{type:...}`. A float is numbered only when it
//!     is labelled; numbers run per float type and the target id is `{type}-{n}`.
//!
//!     What the content may be is decided by the float type's content handlers. The
//!     content is accepted if any handler accepts it.

use crate::ast::{BlockMode, Node, NodeId, NodeKind, NodeList};
use crate::counter::{Counter, CounterFormatter, FormatNum, JoinSpec};
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, RefInstance, RefsRenderManager};
use crate::feature::{DocumentManagers, EntityKey, Feature, FeatureOptions, RenderManager};
use crate::render_context::RenderContext;
use crate::renderer::{GraphicsResource, RenderedFloat};
use crate::specinfo::{split_label, ArgumentSpec, BodySpec, Definitions, LabelSpec, SpecInfo};
use flm_config::{FloatTypeConfig, FloatsConfig};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "floats";

/// Validates what a float may contain besides its caption and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHandler {
    /// Anything goes.
    Any,
    /// A single `\includegraphics`.
    IncludeGraphics,
}

impl ContentHandler {
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "any" => Ok(ContentHandler::Any),
            "includegraphics" => Ok(ContentHandler::IncludeGraphics),
            other => Err(FlmError::configuration(format!(
                "Invalid float content handler ‘{}’; expected ‘any’ or ‘includegraphics’",
                other
            ))),
        }
    }

    fn definitions(self) -> Definitions {
        match self {
            ContentHandler::Any => Definitions::new(),
            ContentHandler::IncludeGraphics => {
                Definitions::new().with_macro("includegraphics", Arc::new(IncludeGraphicsSpec))
            }
        }
    }

    /// Check the content nodes, whitespace and comments already left out.
    fn check(self, content: &[&Node]) -> std::result::Result<(), String> {
        match self {
            ContentHandler::Any => Ok(()),
            ContentHandler::IncludeGraphics => match content {
                [node] if node.is_macro("includegraphics") => Ok(()),
                _ => Err("expected exactly one \\includegraphics command".to_string()),
            },
        }
    }
}

impl fmt::Display for ContentHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentHandler::Any => f.write_str("any"),
            ContentHandler::IncludeGraphics => f.write_str("includegraphics"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FloatType {
    pub float_type: String,
    /// `Figure`, shown in captions and references
    pub caption_name: String,
    pub counter_formatter: CounterFormatter,
    pub content_handlers: Vec<ContentHandler>,
}

impl FloatType {
    pub fn new(float_type: &str, caption_name: &str, content_handlers: Vec<ContentHandler>) -> Result<Self> {
        Ok(Self {
            float_type: float_type.to_string(),
            caption_name: caption_name.to_string(),
            counter_formatter: default_counter_formatter(float_type, caption_name)?,
            content_handlers,
        })
    }

    pub fn from_config(config: &FloatTypeConfig) -> Result<Self> {
        let content_handlers = config
            .content_handlers
            .iter()
            .map(|name| ContentHandler::by_name(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            float_type: config.float_type.clone(),
            caption_name: config.float_caption_name.clone(),
            counter_formatter: CounterFormatter::from_config(
                &config.counter_formatter,
                default_counter_formatter(&config.float_type, &config.float_caption_name)?,
                &config.float_type,
            )?,
            content_handlers,
        })
    }
}

fn default_counter_formatter(float_type: &str, caption_name: &str) -> Result<CounterFormatter> {
    Ok(CounterFormatter::new(FormatNum::named("arabic")?)
        .with_prefix(&format!("{}~", caption_name), &format!("{}s~", caption_name))
        .with_join_spec(JoinSpec::compact())
        .with_id(float_type))
}

#[derive(Debug, Clone)]
pub struct FloatsFeature {
    types: Vec<FloatType>,
}

impl FloatsFeature {
    pub fn new(types: Vec<FloatType>) -> Self {
        Self { types }
    }

    pub fn from_config(config: &FloatsConfig) -> Result<Self> {
        let types = config
            .types
            .iter()
            .map(FloatType::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(types))
    }
}

impl Feature for FloatsFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Floating elements (figures & tables)"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for float_type in &self.types {
            defs.add_environment(
                &float_type.float_type,
                Arc::new(FloatSpec {
                    float_type: float_type.float_type.clone(),
                    content_handlers: float_type.content_handlers.clone(),
                }),
            );
        }
        defs
    }

    fn new_render_manager(
        &self,
        _documents: &DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        Ok(Some(Box::new(FloatsRenderManager::new(self.types.clone()))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatInstance {
    pub float_type: String,
    pub number: Option<u64>,
    /// Markup of the number, e.g. `1`
    pub formatted_counter_value: Option<String>,
    pub target_id: Option<String>,
}

#[derive(Debug)]
pub struct FloatsRenderManager {
    types: Vec<FloatType>,
    counters: HashMap<String, Counter>,
    instances: HashMap<NodeId, FloatInstance>,
}

impl RenderManager for FloatsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn initialize(&mut self, ctx: &RenderContext<'_>) -> Result<()> {
        if ctx.supports_feature(refs::FEATURE_NAME) {
            let mut refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
            for float_type in &self.types {
                refs_manager.register_counter_formatter(float_type.counter_formatter.clone())?;
            }
        }
        Ok(())
    }
}

impl FloatsRenderManager {
    pub fn new(types: Vec<FloatType>) -> Self {
        let counters = types
            .iter()
            .map(|t| (t.float_type.clone(), Counter::new(t.counter_formatter.clone())))
            .collect();
        Self {
            types,
            counters,
            instances: HashMap::new(),
        }
    }

    pub fn float_type(&self, name: &str) -> Option<&FloatType> {
        self.types.iter().find(|t| t.float_type == name)
    }

    /// Number the float if asked to. Registering the same node again returns the
    /// first instance.
    pub fn register_float(&mut self, node: &Node, float_type: &str, numbered: bool) -> Result<FloatInstance> {
        if let Some(found) = self.instances.get(&node.id()) {
            return Ok(found.clone());
        }
        let counter = self
            .counters
            .get_mut(float_type)
            .ok_or_else(|| FlmError::at_node(format!("Unknown float type ‘{}’", float_type), node))?;
        let instance = if numbered {
            let (number, formatted) = counter.step_and_format();
            FloatInstance {
                float_type: float_type.to_string(),
                number: Some(number),
                formatted_counter_value: Some(formatted),
                target_id: Some(format!("{}-{}", float_type, number)),
            }
        } else {
            FloatInstance {
                float_type: float_type.to_string(),
                number: None,
                formatted_counter_value: None,
                target_id: None,
            }
        };
        log::debug!("registered float {:?}", instance.target_id);
        self.instances.insert(node.id(), instance.clone());
        Ok(instance)
    }
}

/// A float's body, split up.
#[derive(Debug)]
pub struct FloatParts {
    pub label: Option<(String, String)>,
    pub caption: Option<NodeList>,
    pub content: NodeList,
}

fn is_ignorable(node: &Node) -> bool {
    node.is_comment()
        || node.is_whitespace_chars()
        || node.spec().map_or(false, |spec| spec.is_paragraph_break_marker())
}

#[derive(Debug, Clone)]
pub struct FloatSpec {
    pub float_type: String,
    pub content_handlers: Vec<ContentHandler>,
}

impl FloatSpec {
    /// Pick caption and label out of the body and run the content handlers on the rest.
    pub fn float_parts(&self, node: &Node) -> Result<FloatParts> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a float environment", node))?;
        let body = inv
            .body
            .as_ref()
            .ok_or_else(|| FlmError::at_node("Float environment has no body", node))?;

        let mut label = None;
        let mut caption = None;
        let mut content = Vec::new();
        for child in body {
            match child.kind() {
                NodeKind::Macro(m) if m.name == "label" => {
                    let full = m.chars_arg("label").unwrap_or("").trim();
                    match split_label(full) {
                        (Some(ref_type), ref_label) if ref_type == self.float_type => {
                            label = Some((ref_type.to_string(), ref_label.to_string()));
                        }
                        _ => {
                            return Err(FlmError::at_node(
                                format!(
                                    "{} label must start with the prefix ‘{}:...’ (got ‘{}’)",
                                    self.float_type, self.float_type, full
                                ),
                                child,
                            ))
                        }
                    }
                }
                NodeKind::Macro(m) if m.name == "caption" => {
                    caption = m.nodes_arg("caption_text").cloned();
                }
                _ => content.push(child.clone()),
            }
        }

        let significant: Vec<&Node> = content.iter().filter(|n| !is_ignorable(n)).collect();
        let mut errors = Vec::new();
        let accepted = self
            .content_handlers
            .iter()
            .any(|handler| match handler.check(&significant) {
                Ok(()) => true,
                Err(message) => {
                    errors.push(format!("*** {} error: {}", handler, message));
                    false
                }
            });
        if !accepted {
            return Err(FlmError::at_node(
                format!(
                    "Invalid {} contents! The following content handler(s) were unable to parse the float's content [other than possible \\caption and \\label commands]:\n{}",
                    self.float_type,
                    errors.join("\n")
                ),
                node,
            ));
        }

        Ok(FloatParts {
            label,
            caption,
            content: NodeList::new(content, BlockMode::Block, body.range().clone()),
        })
    }
}

impl SpecInfo for FloatSpec {
    fn body(&self) -> Option<BodySpec> {
        Some(BodySpec::Parsed(BlockMode::Block))
    }

    fn body_definitions(&self) -> Option<Definitions> {
        let mut defs = Definitions::new()
            .with_macro("caption", Arc::new(CaptionSpec))
            .with_macro("label", Arc::new(LabelSpec));
        for handler in &self.content_handlers {
            defs.merge(handler.definitions());
        }
        Some(defs)
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.float_parts(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let parts = self.float_parts(node)?;
        let (instance, caption_name) = {
            let mut manager = ctx.render_manager::<FloatsRenderManager>(FEATURE_NAME)?;
            let caption_name = manager
                .float_type(&self.float_type)
                .map(|t| t.caption_name.clone())
                .unwrap_or_else(|| self.float_type.clone());
            (
                manager.register_float(node, &self.float_type, parts.label.is_some())?,
                caption_name,
            )
        };

        if let (Some((ref_type, ref_label)), Some(number), Some(formatted), Some(target_id)) = (
            &parts.label,
            instance.number,
            &instance.formatted_counter_value,
            &instance.target_id,
        ) {
            if ctx.is_first_pass() && ctx.supports_feature(refs::FEATURE_NAME) {
                let reference = RefInstance::new(
                    ref_type,
                    ref_label,
                    &format!("{}~{}", caption_name, formatted),
                )
                .with_target_id(target_id)
                .with_counter(number, &self.float_type);
                ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?
                    .register_reference(EntityKey::from(node), reference, Some(node.range().start))?;
            }
        }

        let renderer = ctx.renderer();
        let number = match &instance.formatted_counter_value {
            Some(formatted) => Some(ctx.render_flm_text(formatted, "float number")?),
            None => None,
        };
        let caption = match &parts.caption {
            Some(caption) => Some(renderer.render_nodelist(caption, ctx, Some(false))?),
            None => None,
        };
        let content = renderer.render_nodelist(&parts.content, ctx, Some(true))?;
        renderer.render_float(
            &RenderedFloat {
                float_type: self.float_type.clone(),
                caption_name,
                number,
                caption,
                content,
                target_id: instance.target_id.clone(),
            },
            ctx,
        )
    }
}

/// `\caption{...}` inside a float; rendered by the float itself.
#[derive(Debug, Clone, Default)]
pub struct CaptionSpec;

impl SpecInfo for CaptionSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::mandatory("caption_text")]
    }

    fn render(&self, node: &Node, _ctx: &RenderContext<'_>) -> Result<String> {
        Err(FlmError::at_node("\\caption is only allowed directly inside a float", node))
    }
}

/// `\includegraphics[options]{src}`
#[derive(Debug, Clone, Default)]
pub struct IncludeGraphicsSpec;

impl SpecInfo for IncludeGraphicsSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::optional_chars("graphics_options"),
            ArgumentSpec::chars("src"),
        ]
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let src = node
            .invocation()
            .and_then(|inv| inv.chars_arg("src"))
            .map(str::trim)
            .unwrap_or("");
        if src.is_empty() {
            return Err(FlmError::at_node("\\includegraphics needs a file name", node));
        }
        ctx.renderer().render_graphics_block(
            &GraphicsResource {
                src: src.to_string(),
            },
            ctx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_html, render_text};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_labelled_figure_and_reference() {
        let html = render_html(
            "\\begin{figure}\n  \\includegraphics{plot.png}\n  \\caption{A plot}\\label{figure:plot}\n\\end{figure}\n\nSee \\ref{figure:plot}.",
        )
        .unwrap();
        insta::assert_snapshot!(html, @r###"
        <figure id="figure-1" class="float float-figure"><div class="float-contents"><img src="plot.png"></div>
        <figcaption class="float-caption-content"><span><span class="float-number">Figure&nbsp;1</span>: A plot</span></figcaption></figure>
        <p>See <a href="#figure-1" class="href-ref ref-figure">Figure&nbsp;1</a>.</p>
        "###);
    }

    #[test]
    fn test_unlabelled_figure_is_not_numbered() {
        let html = render_html(
            "\\begin{figure}\\includegraphics{a.png}\\end{figure}\n\n\\begin{figure}\\includegraphics{b.png}\\label{figure:b}\\end{figure}",
        )
        .unwrap();
        assert!(html.starts_with("<figure class=\"float float-figure\"><div class=\"float-contents\"><img src=\"a.png\"></div></figure>"));
        assert!(html.contains("<figure id=\"figure-1\" class=\"float float-figure\">"));
    }

    #[test]
    fn test_text_frame() {
        let out = render_text("\\begin{table}\\includegraphics{t.png}\\caption{Data}\\label{table:t}\\end{table}")
            .unwrap();
        let rule = "·".repeat(80);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.first(), Some(&rule.as_str()));
        assert_eq!(lines.last(), Some(&rule.as_str()));
        assert!(out.contains("Table 1: Data"));
    }

    #[test]
    fn test_bad_label_prefix() {
        let err = render_text("\\begin{figure}\\includegraphics{a.png}\\label{fig:a}\\end{figure}").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("figure label must start with the prefix ‘figure:...’ (got ‘fig:a’)"));
    }

    #[test]
    fn test_content_handlers_reject() {
        let err = render_text("\\begin{figure}Some text\\end{figure}").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Invalid figure contents!"));
        assert!(message.contains("*** includegraphics error: expected exactly one \\includegraphics command"));
    }

    #[test]
    fn test_any_handler_accepts_text() {
        let handler = ContentHandler::by_name("any").unwrap();
        assert_eq!(handler.check(&[]), Ok(()));
        assert!(ContentHandler::by_name("cells").is_err());
    }
}
