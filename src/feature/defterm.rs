//! Defined terms
//!
//!     `\begin{defterm}{Term} ... \end{defterm}` defines a term. The definition answers
//!     to the reference `defterm:Term` (whitespace in the term collapsed) and to any
//!     `\label{topic:...}` tacked onto it. `\term{Term}` links back to the definition,
//!     and `\term[Term]{terms}` does so with other display text.

use crate::ast::{BlockMode, Node, NodeList};
use crate::blocks::normalize_whitespace;
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, safe_target_id, ReferenceableInfo, RefsRenderManager};
use crate::feature::{EntityKey, Feature};
use crate::render_context::RenderContext;
use crate::specinfo::{collect_labels, ArgumentSpec, BodySpec, Definitions, SpecInfo};
use flm_config::DefTermConfig;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "defterm";

pub const DEFTERM_REF_TYPE: &str = "defterm";

const LABEL_PREFIXES: [&str; 1] = ["topic"];

/// Reference label of a term: its source with whitespace collapsed.
pub fn term_ref_label(term: &str) -> String {
    normalize_whitespace(term.trim())
}

#[derive(Debug, Clone)]
pub struct DefTermFeature {
    render_with_term: bool,
    render_with_term_suffix: String,
}

impl DefTermFeature {
    pub fn new(render_with_term: bool, render_with_term_suffix: &str) -> Self {
        Self {
            render_with_term,
            render_with_term_suffix: render_with_term_suffix.to_string(),
        }
    }

    pub fn from_config(config: &DefTermConfig) -> Self {
        Self::new(config.render_with_term, &config.render_with_term_suffix)
    }
}

impl Default for DefTermFeature {
    fn default() -> Self {
        Self::new(true, ": ")
    }
}

impl Feature for DefTermFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Definition terms"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        Definitions::new()
            .with_environment(
                "defterm",
                Arc::new(DefineTermSpec {
                    render_with_term: self.render_with_term,
                    render_with_term_suffix: self.render_with_term_suffix.clone(),
                }),
            )
            .with_macro("term", Arc::new(TermRefSpec))
    }
}

#[derive(Debug, Clone)]
pub struct DefineTermSpec {
    pub render_with_term: bool,
    pub render_with_term_suffix: String,
}

impl DefineTermSpec {
    fn parts<'n>(&self, node: &'n Node) -> Result<(&'n NodeList, Vec<(String, String)>)> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a defterm environment", node))?;
        let term = inv
            .nodes_arg("term")
            .ok_or_else(|| FlmError::at_node("Term definition has no term", node))?;
        let mut labels = vec![(
            DEFTERM_REF_TYPE.to_string(),
            term_ref_label(term.verbatim()),
        )];
        labels.extend(collect_labels(inv.tacked_on("label"), &LABEL_PREFIXES)?);
        Ok((term, labels))
    }
}

impl SpecInfo for DefineTermSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::mandatory("term"), ArgumentSpec::labels("label")]
    }

    fn body(&self) -> Option<BodySpec> {
        Some(BodySpec::Parsed(BlockMode::Block))
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.parts(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let (term, labels) = self.parts(node)?;
        let body = node
            .invocation()
            .and_then(|inv| inv.body.as_ref())
            .ok_or_else(|| FlmError::at_node("Term definition has no body", node))?;

        let info = ReferenceableInfo::new(term.verbatim().trim(), labels);
        let target_id = info.target_id();
        if ctx.is_first_pass() && ctx.supports_feature(refs::FEATURE_NAME) {
            ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?
                .register_referenceable(EntityKey::from(node), &info, Some(node.range().start))?;
        }

        let renderer = ctx.renderer();
        let lead = if self.render_with_term {
            let rendered_term = format!(
                "{}{}",
                renderer.render_nodelist(term, ctx, Some(false))?,
                renderer.render_value(&self.render_with_term_suffix, ctx)?
            );
            renderer.render_semantic_span(&rendered_term, "defterm-term", &[], None, ctx)?
        } else {
            String::new()
        };
        let content = renderer.render_blocks_with(&lead, body, "", ctx)?;
        renderer.render_semantic_block(&content, "defterm", &[], target_id.as_deref(), ctx)
    }
}

/// `\term[ref term]{term}`
#[derive(Debug, Clone, Default)]
pub struct TermRefSpec;

impl SpecInfo for TermRefSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::optional_chars("ref_term"), ArgumentSpec::mandatory("term")]
    }

    fn delayed_render(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a \\term command", node))?;
        let term = inv
            .nodes_arg("term")
            .ok_or_else(|| FlmError::at_node("\\term has no term", node))?;
        let renderer = ctx.renderer();
        let display = renderer.render_nodelist(term, ctx, Some(false))?;
        if !ctx.supports_feature(refs::FEATURE_NAME) {
            return Ok(display);
        }

        let ref_label = term_ref_label(inv.chars_arg("ref_term").unwrap_or(term.verbatim()));
        let instance = RefsRenderManager::get_ref(
            ctx,
            DEFTERM_REF_TYPE,
            &ref_label,
            node.context().resource_info.as_ref(),
        )
        .map_err(|err| err.or_at(node.range().start))?;
        match &instance.target_href {
            Some(href) => renderer.render_link("term", href, &display, &[], ctx),
            None => Ok(display),
        }
    }
}

/// Target id of the definition of `term`.
pub fn defterm_target_id(term: &str) -> String {
    safe_target_id(DEFTERM_REF_TYPE, &term_ref_label(term))
}
