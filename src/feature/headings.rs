//! Sectioning commands
//!
//!     Each configured command (`\section`, `\paragraph`, ...) renders a heading at its
//!     level. Run-in levels are block headings: they open the following paragraph.
//!
//!     A heading's target id comes from its first label. Unlabelled headings get a slug
//!     of their source text, `sec--First-section`, unique within the render.

use crate::ast::{Node, NodeId, NodeList};
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, safe_target_id, ReferenceableInfo, RefsRenderManager};
use crate::feature::{DocumentManagers, EntityKey, Feature, FeatureOptions, RenderManager};
use crate::render_context::RenderContext;
use crate::renderer::HeadingLevel;
use crate::specinfo::{collect_labels, ArgumentSpec, Definitions, SpecInfo};
use flm_config::{HeadingLevelConfig, HeadingsConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const FEATURE_NAME: &str = "headings";

const LABEL_PREFIXES: [&str; 2] = ["sec", "topic"];
const MAX_SLUG_LEN: usize = 32;

static SLUG_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

fn slug_for(text: &NodeList) -> String {
    let slug = format!("sec--{}", SLUG_UNSAFE.replace_all(text.verbatim().trim(), "-"));
    slug.chars().take(MAX_SLUG_LEN).collect()
}

#[derive(Debug, Clone)]
pub struct HeadingsFeature {
    levels: Vec<HeadingLevelConfig>,
}

impl HeadingsFeature {
    pub fn new(levels: Vec<HeadingLevelConfig>) -> Self {
        Self { levels }
    }

    pub fn from_config(config: &HeadingsConfig) -> Self {
        Self::new(config.levels.clone())
    }
}

impl Feature for HeadingsFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Headings: sections, paragraphs"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for level in &self.levels {
            defs.add_macro(
                &level.command,
                Arc::new(HeadingSpec {
                    level: level.level,
                    inline: level.inline,
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
        Ok(Some(Box::new(HeadingsRenderManager::default())))
    }
}

/// Keeps slug target ids unique within one render.
#[derive(Debug, Default)]
pub struct HeadingsRenderManager {
    target_ids: HashMap<NodeId, String>,
    slug_counters: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl RenderManager for HeadingsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl HeadingsRenderManager {
    /// Slug target id of a heading; the same node always gets the same id.
    pub fn default_target_id(&mut self, node: &Node, text: &NodeList) -> String {
        if let Some(found) = self.target_ids.get(&node.id()) {
            return found.clone();
        }
        let slug = slug_for(text);
        let mut count = self.slug_counters.get(&slug).copied().unwrap_or(0);
        // a numbered slug may collide with another heading's literal text
        let target_id = loop {
            count += 1;
            let candidate = if count == 1 {
                slug.clone()
            } else {
                format!("{}-{}", slug, count)
            };
            if !self.issued.contains(&candidate) {
                break candidate;
            }
        };
        self.slug_counters.insert(slug, count);
        self.issued.insert(target_id.clone());
        self.target_ids.insert(node.id(), target_id.clone());
        target_id
    }
}

#[derive(Debug, Clone)]
pub struct HeadingSpec {
    pub level: u8,
    pub inline: bool,
}

impl SpecInfo for HeadingSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::star("star"),
            ArgumentSpec::mandatory("text"),
            ArgumentSpec::labels("label"),
        ]
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn is_block_heading(&self) -> bool {
        self.inline
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        if let Some(inv) = node.invocation() {
            collect_labels(inv.tacked_on("label"), &LABEL_PREFIXES)?;
        }
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a heading command", node))?;
        let text = inv
            .nodes_arg("text")
            .ok_or_else(|| FlmError::at_node("Heading has no text", node))?;
        let labels = collect_labels(inv.tacked_on("label"), &LABEL_PREFIXES)?;

        let target_id = match labels.first() {
            Some((ref_type, ref_label)) => safe_target_id(ref_type, ref_label),
            None if ctx.is_standalone() => slug_for(text),
            None => ctx
                .render_manager::<HeadingsRenderManager>(FEATURE_NAME)?
                .default_target_id(node, text),
        };

        if !labels.is_empty() && ctx.is_first_pass() && ctx.supports_feature(refs::FEATURE_NAME) {
            let info = ReferenceableInfo::new(text.verbatim().trim(), labels);
            ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?
                .register_referenceable(EntityKey::from(node), &info, Some(node.range().start))?;
        }

        let renderer = ctx.renderer();
        let content = renderer.render_nodelist(text, ctx, Some(false))?;
        renderer.render_heading(
            &content,
            HeadingLevel::Level(self.level),
            self.inline,
            Some(&target_id),
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
    fn test_slug_target_ids_are_unique_and_truncated() {
        let html = render_html(
            "\\section{First section}\n\n\\section{First section}\n\n\\paragraph{A paragraph-level sectioning command} Text.",
        )
        .unwrap();
        insta::assert_snapshot!(html, @r###"
        <h1 id="sec--First-section" class="heading-level-1">First section</h1>
        <h1 id="sec--First-section-2" class="heading-level-1">First section</h1>
        <p><span id="sec--A-paragraph-level-sectionin" class="heading-level-4 heading-inline">A paragraph-level sectioning command</span> Text.</p>
        "###);
    }

    #[test]
    fn test_numbered_slug_skips_ids_taken_by_other_titles() {
        let html = render_html("\\section{A}\n\n\\section{A-2}\n\n\\section{A}\n\n\\section{A-2}").unwrap();
        let ids: Vec<&str> = html
            .split("id=\"")
            .skip(1)
            .filter_map(|rest| rest.split('"').next())
            .collect();
        assert_eq!(ids, vec!["sec--A", "sec--A-2", "sec--A-3", "sec--A-2-2"]);
    }

    #[test]
    fn test_labelled_heading_uses_label_target() {
        let html = render_html("\\section{Another section}\n\\label{sec:test-label-another-sec}\n\nBody.").unwrap();
        assert!(html.starts_with(
            "<h1 id=\"sec-test-label-another-sec\" class=\"heading-level-1\">Another section</h1>"
        ));
    }

    #[test]
    fn test_run_in_heading_text() {
        let out = render_text("\\paragraph{Note} This is the paragraph.").unwrap();
        assert_eq!(out, "Note:  This is the paragraph.");
    }

    #[test]
    fn test_heading_label_prefix_checked() {
        let err = render_text("\\section{Intro}\\label{fig:intro}").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Argument label ‘fig:intro’ has incorrect prefix ‘fig:’"));
    }
}
