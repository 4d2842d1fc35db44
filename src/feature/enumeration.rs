//! Enumerations: `enumerate`, `itemize` and the like
//!
//!     The body is a sequence of `\item` entries. Item tags come from the environment's
//!     counter formatters, picked by nesting depth (the last one is reused for deeper
//!     levels), unless `\begin{enumerate}[(a)]` gives a tag template or `\item[tag]`
//!     overrides a single item. `\item\label{item:...}` makes an item referenceable by
//!     its tag.

use crate::ast::{BlockMode, Node, NodeKind, NodeList, Range};
use crate::counter::FormatNum;
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, safe_target_id, RefInstance, RefsRenderManager};
use crate::feature::{EntityKey, Feature};
use crate::render_context::RenderContext;
use crate::renderer::{EnumerationOptions, ItemTag};
use crate::specinfo::{collect_labels, ArgumentSpec, BodySpec, Definitions, SpecInfo};
use flm_config::{EnumerationConfig, EnumerationEnvironmentConfig};
use std::collections::HashMap;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "enumeration";

const STATE_DOMAIN: &str = "enumeration";
const STATE_DEPTH_KEY: &str = "nested_depth";
const ITEM_LABEL_PREFIXES: [&str; 1] = ["item"];

#[derive(Debug, Clone)]
pub struct EnumerationEnvironment {
    pub name: String,
    /// Tag formatter per nesting depth.
    pub counter_formatters: Vec<FormatNum>,
    pub annotations: Vec<String>,
}

impl EnumerationEnvironment {
    pub fn from_config(config: &EnumerationEnvironmentConfig) -> Result<Self> {
        let counter_formatters = config
            .counter_formatters
            .iter()
            .map(|c| FormatNum::from_config(c, true))
            .collect::<Result<Vec<_>>>()?;
        if counter_formatters.is_empty() {
            return Err(FlmError::configuration(format!(
                "Enumeration environment ‘{}’ needs at least one counter formatter",
                config.name
            )));
        }
        let mut annotations = vec![config.name.clone()];
        annotations.extend(config.annotations.iter().cloned());
        Ok(Self {
            name: config.name.clone(),
            counter_formatters,
            annotations,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnumerationFeature {
    environments: Vec<EnumerationEnvironment>,
}

impl EnumerationFeature {
    pub fn new(environments: Vec<EnumerationEnvironment>) -> Self {
        Self { environments }
    }

    pub fn from_config(config: &EnumerationConfig) -> Result<Self> {
        Ok(Self::new(
            config
                .environments
                .iter()
                .map(EnumerationEnvironment::from_config)
                .collect::<Result<Vec<_>>>()?,
        ))
    }
}

impl Feature for EnumerationFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Enumeration lists"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for env in &self.environments {
            defs.add_environment(&env.name, Arc::new(EnumerationSpec { env: env.clone() }));
        }
        defs
    }
}

/// One `\item` and the content up to the next one.
#[derive(Debug, Clone)]
pub struct EnumerationItem {
    pub custom_tag: Option<NodeList>,
    pub labels: Vec<(String, String)>,
    pub content: NodeList,
}

fn skippable_before_first_item(node: &Node) -> bool {
    node.is_comment()
        || node.is_whitespace_chars()
        || node.spec().map_or(false, |spec| spec.is_paragraph_break_marker())
}

fn finish_item(item_node: &Node, content: Vec<Node>) -> Result<EnumerationItem> {
    let inv = item_node
        .invocation()
        .ok_or_else(|| FlmError::at_node("Expected ‘\\item’", item_node))?;
    let range = Range::bounding_box(content.iter().map(|n| n.range()))
        .unwrap_or_else(|| item_node.range().clone());
    Ok(EnumerationItem {
        custom_tag: inv.nodes_arg("custom_tag").cloned(),
        labels: collect_labels(inv.tacked_on("label"), &ITEM_LABEL_PREFIXES)?,
        content: NodeList::new(content, BlockMode::Block, range),
    })
}

/// Split an enumeration body at its `\item`s.
pub fn split_items(body: &NodeList) -> Result<Vec<EnumerationItem>> {
    let mut items = Vec::new();
    let mut current: Option<(&Node, Vec<Node>)> = None;

    for node in body {
        if node.is_macro("item") {
            if let Some((item_node, content)) = current.take() {
                items.push(finish_item(item_node, content)?);
            }
            current = Some((node, Vec::new()));
            continue;
        }
        match current.as_mut() {
            Some((_, content)) => content.push(node.clone()),
            None if skippable_before_first_item(node) => {}
            None => {
                return Err(FlmError::at_node(
                    format!(
                        "Expected ‘\\item’ in enumeration environment, got ‘{}’",
                        node.verbatim().trim()
                    ),
                    node,
                ))
            }
        }
    }
    if let Some((item_node, content)) = current.take() {
        items.push(finish_item(item_node, content)?);
    }
    Ok(items)
}

/// Tag template from `[...]`, with one level of braces removed.
fn tag_template_arg(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(raw)
}

#[derive(Debug, Clone)]
pub struct EnumerationSpec {
    pub env: EnumerationEnvironment,
}

impl EnumerationSpec {
    fn formatter_at_depth(&self, depth: usize) -> Option<&FormatNum> {
        let last = self.env.counter_formatters.len().checked_sub(1)?;
        self.env.counter_formatters.get(depth.min(last))
    }
}

impl SpecInfo for EnumerationSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::optional_chars("tag_template")]
    }

    fn body(&self) -> Option<BodySpec> {
        Some(BodySpec::Parsed(BlockMode::Block))
    }

    fn body_definitions(&self) -> Option<Definitions> {
        Some(Definitions::new().with_macro("item", Arc::new(ItemSpec)))
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        if let NodeKind::Environment(inv) = node.kind() {
            if let Some(body) = &inv.body {
                split_items(body)?;
            }
        }
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected an enumeration environment", node))?;
        let items = match &inv.body {
            Some(body) => split_items(body)?,
            None => Vec::new(),
        };

        let depth = ctx
            .logical_state(STATE_DOMAIN, STATE_DEPTH_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let formatter = match inv.chars_arg("tag_template") {
            Some(template) => FormatNum::tag_template(tag_template_arg(template)),
            None => self.formatter_at_depth(depth).cloned().ok_or_else(|| {
                FlmError::at_node("Enumeration has no counter formatter", node)
            })?,
        };

        let mut target_ids = HashMap::new();
        if !ctx.is_standalone() && ctx.supports_feature(refs::FEATURE_NAME) {
            for (j, item) in items.iter().enumerate() {
                let Some((first_type, first_label)) = item.labels.first() else {
                    continue;
                };
                let n = j + 1;
                let target_id = safe_target_id(first_type, first_label);
                if ctx.is_first_pass() {
                    let tag_text = match &item.custom_tag {
                        Some(tag) => tag.verbatim().to_string(),
                        None => formatter.format(n as u64),
                    };
                    let mut refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
                    for (ref_type, ref_label) in &item.labels {
                        refs_manager.register_reference(
                            EntityKey::Key(vec![node.id().to_string(), n.to_string()]),
                            RefInstance::new(ref_type, ref_label, &tag_text).with_target_id(&target_id),
                            Some(item.content.range().start),
                        )?;
                    }
                }
                target_ids.insert(n, target_id);
            }
        }

        let contents: Vec<NodeList> = items.iter().map(|item| item.content.clone()).collect();
        let tag = |n: usize| match items.get(n - 1).and_then(|item| item.custom_tag.clone()) {
            Some(custom) => ItemTag::Nodes(custom),
            None => ItemTag::Text(formatter.format(n as u64)),
        };
        let target_id_generator = |n: usize| target_ids.get(&n).cloned();

        let _depth_guard = ctx.push_logical_state(
            STATE_DOMAIN,
            STATE_DEPTH_KEY,
            serde_json::json!(depth + 1),
        );
        ctx.renderer().render_enumeration(
            &contents,
            &tag,
            &EnumerationOptions {
                target_id_generator: Some(&target_id_generator),
                annotations: self.env.annotations.clone(),
                nested_depth: depth,
            },
            ctx,
        )
    }
}

/// `\item[custom tag]\label{item:...}`; its content is collected by the enumeration.
#[derive(Debug, Clone, Default)]
pub struct ItemSpec;

impl SpecInfo for ItemSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::optional("custom_tag"), ArgumentSpec::labels("label")]
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, _ctx: &RenderContext<'_>) -> Result<String> {
        Err(FlmError::at_node("‘\\item’ is only allowed inside an enumeration", node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_html, render_text};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_itemize_with_custom_tag() {
        let html = render_html("\\begin{itemize}\n  \\item One\n  \\item[!!!] Two\n\\end{itemize}").unwrap();
        assert_eq!(
            html,
            "<dl class=\"enumeration itemize\"><dt>•</dt><dd><p>One</p></dd><dt>!!!</dt><dd><p>Two</p></dd></dl>"
        );
    }

    #[test]
    fn test_tag_template_argument() {
        let out = render_text("\\begin{enumerate}[{(a.)}]\\item A\\item B\\end{enumerate}").unwrap();
        assert_eq!(out, "  (a.) A\n\n  (b.) B");
    }

    #[test]
    fn test_nested_depth_formatters() {
        let out = render_text(
            "\\begin{enumerate}\\item Outer\n\\begin{enumerate}\\item Inner\\end{enumerate}\\item Last\\end{enumerate}",
        )
        .unwrap();
        assert_eq!(out, "  1. Outer\n\n      (i) Inner\n\n  2. Last");
    }

    #[test]
    fn test_deep_nesting_reuses_last_formatter() {
        let spec = EnumerationSpec {
            env: EnumerationEnvironment::from_config(&EnumerationEnvironmentConfig {
                name: "enumerate".to_string(),
                counter_formatters: vec![
                    flm_config::FormatNumConfig::Name("arabic".to_string()),
                    flm_config::FormatNumConfig::Name("roman".to_string()),
                ],
                annotations: Vec::new(),
            })
            .unwrap(),
        };
        assert_eq!(spec.formatter_at_depth(0).unwrap().format(3), "3");
        assert_eq!(spec.formatter_at_depth(1).unwrap().format(3), "iii");
        assert_eq!(spec.formatter_at_depth(5).unwrap().format(3), "iii");
    }

    #[test]
    fn test_item_label_reference() {
        let out = render_text(
            "\\begin{enumerate}\\item First\\item\\label{item:second} Second\\end{enumerate}\n\nSee item \\ref{item:second}.",
        )
        .unwrap();
        assert_eq!(out, "  1. First\n\n  2. Second\n\nSee item 2..");
    }

    #[test]
    fn test_text_before_first_item() {
        let err = render_text("\\begin{itemize}oops\\item A\\end{itemize}").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Expected ‘\\item’ in enumeration environment, got ‘oops’"));
    }
}
