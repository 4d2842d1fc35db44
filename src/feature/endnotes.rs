//! Footnotes and other endnotes
//!
//!     Endnotes belong to named categories (`footnote`, `citation`, ...), each numbered
//!     independently from 1 with its own counter formatter. The text shows a mark
//!     linking to `#{category}-{n}`; the listing, rendered by
//!     [`EndnotesRenderManager::render_endnotes`], shows every category as an
//!     enumeration with those target ids.
//!
//!     Categories are declared on the document manager, so other features (citations)
//!     can add theirs while the document is built.

use crate::ast::{BlockMode, Node, NodeList};
use crate::blocks;
use crate::counter::{Counter, CounterFormatter, FormatNum, LinkTarget};
use crate::document::{Document, FeatureOptionsMap};
use crate::error::{FlmError, Result};
use crate::feature::{
    option_bool, option_str, option_u8, DocumentManager, DocumentManagers, EntityKey, Feature,
    FeatureOptions, RenderManager,
};
use crate::render_context::RenderContext;
use crate::renderer::{EnumerationOptions, FragmentRenderer, HeadingLevel, ItemTag};
use crate::specinfo::{ArgumentSpec, Definitions, SpecInfo};
use flm_config::{EndnoteCategoryConfig, EndnotesConfig, EndnotesRenderConfig};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "endnotes";

#[derive(Debug, Clone)]
pub struct EndnoteCategory {
    pub name: String,
    pub counter_formatter: CounterFormatter,
    pub heading_title: String,
    /// Macro creating an endnote of this category, e.g. `footnote`
    pub endnote_command: Option<String>,
}

impl EndnoteCategory {
    pub fn new(name: &str, counter_formatter: CounterFormatter, heading_title: &str) -> Self {
        Self {
            name: name.to_string(),
            counter_formatter,
            heading_title: heading_title.to_string(),
            endnote_command: None,
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.endnote_command = Some(command.to_string());
        self
    }

    pub fn from_config(config: &EndnoteCategoryConfig) -> Result<Self> {
        let defaults = CounterFormatter::new(FormatNum::named("arabic")?);
        Ok(Self {
            name: config.name.clone(),
            counter_formatter: CounterFormatter::from_config(
                &config.counter_formatter,
                defaults,
                &config.name,
            )?,
            heading_title: config.heading_title.clone(),
            endnote_command: config.endnote_command.clone(),
        })
    }
}

/// How the endnotes listing is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndnotesRenderOptions {
    /// Heading level of each category's title; no titles when `None`.
    pub include_headings_at_level: Option<u8>,
    pub set_headings_target_ids: bool,
    /// Title above the whole listing.
    pub endnotes_heading_title: Option<String>,
    pub endnotes_heading_level: u8,
}

impl Default for EndnotesRenderOptions {
    fn default() -> Self {
        Self {
            include_headings_at_level: Some(1),
            set_headings_target_ids: true,
            endnotes_heading_title: None,
            endnotes_heading_level: 1,
        }
    }
}

impl EndnotesRenderOptions {
    pub fn from_config(config: &EndnotesRenderConfig) -> Self {
        Self {
            include_headings_at_level: config.include_headings_at_level,
            set_headings_target_ids: config.set_headings_target_ids,
            endnotes_heading_title: config.endnotes_heading_title.clone(),
            endnotes_heading_level: config.endnotes_heading_level.unwrap_or(1),
        }
    }

    /// These options with per-render overrides applied.
    pub fn with_overrides(&self, options: &FeatureOptions) -> Result<Self> {
        let mut merged = self.clone();
        if options.contains_key("include_headings_at_level") {
            merged.include_headings_at_level = option_u8(options, "include_headings_at_level")?;
        }
        merged.set_headings_target_ids =
            option_bool(options, "set_headings_target_ids", merged.set_headings_target_ids)?;
        if let Some(title) = option_str(options, "endnotes_heading_title")? {
            merged.endnotes_heading_title = Some(title.to_string());
        }
        if let Some(level) = option_u8(options, "endnotes_heading_level")? {
            merged.endnotes_heading_level = level;
        }
        Ok(merged)
    }
}

#[derive(Debug, Clone)]
pub struct EndnotesFeature {
    categories: Vec<EndnoteCategory>,
    render_options: EndnotesRenderOptions,
}

impl EndnotesFeature {
    pub fn new(categories: Vec<EndnoteCategory>, render_options: EndnotesRenderOptions) -> Self {
        Self {
            categories,
            render_options,
        }
    }

    pub fn from_config(config: &EndnotesConfig) -> Result<Self> {
        let categories = config
            .categories
            .iter()
            .map(EndnoteCategory::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(
            categories,
            EndnotesRenderOptions::from_config(&config.render),
        ))
    }
}

impl Feature for EndnotesFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Footnotes and endnotes"
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for category in &self.categories {
            if let Some(command) = &category.endnote_command {
                defs.add_macro(
                    command,
                    Arc::new(EndnoteSpec {
                        category: category.name.clone(),
                    }),
                );
            }
        }
        defs
    }

    fn new_document_manager(
        &self,
        _earlier: &mut DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn DocumentManager>>> {
        let mut manager = EndnotesDocumentManager::default();
        for category in &self.categories {
            manager.add_category(category.clone())?;
        }
        Ok(Some(Box::new(manager)))
    }

    fn new_render_manager(
        &self,
        documents: &DocumentManagers,
        options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        let categories = documents
            .get::<EndnotesDocumentManager>(FEATURE_NAME)
            .map(|manager| manager.categories().to_vec())
            .unwrap_or_else(|| self.categories.clone());
        Ok(Some(Box::new(EndnotesRenderManager::new(
            categories,
            self.render_options.with_overrides(options)?,
        ))))
    }
}

/// Categories of a document.
#[derive(Debug, Default)]
pub struct EndnotesDocumentManager {
    categories: Vec<EndnoteCategory>,
}

impl DocumentManager for EndnotesDocumentManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl EndnotesDocumentManager {
    pub fn add_category(&mut self, category: EndnoteCategory) -> Result<()> {
        if self.category(&category.name).is_some() {
            return Err(FlmError::configuration(format!(
                "Duplicate endnote category name: ‘{}’",
                category.name
            )));
        }
        log::debug!("added endnote category ‘{}’", category.name);
        self.categories.push(category);
        Ok(())
    }

    pub fn categories(&self) -> &[EndnoteCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&EndnoteCategory> {
        self.categories.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub enum EndnoteContent {
    Nodes(NodeList),
    /// Markup parsed when the listing is rendered, e.g. a citation's full text.
    FlmText(String),
}

#[derive(Debug, Clone)]
pub struct EndnoteInstance {
    pub category: String,
    pub number: u64,
    /// Markup of the number as shown in marks and in the listing, e.g. `a` or `[1]`
    pub formatted_flm_text: String,
    pub content: EndnoteContent,
}

impl EndnoteInstance {
    pub fn target_id(&self) -> String {
        format!("{}-{}", self.category, self.number)
    }
}

#[derive(Debug)]
pub struct EndnotesRenderManager {
    categories: Vec<EndnoteCategory>,
    counters: HashMap<String, Counter>,
    instances: HashMap<String, Vec<EndnoteInstance>>,
    by_key: HashMap<EntityKey, (String, usize)>,
    render_options: EndnotesRenderOptions,
}

impl RenderManager for EndnotesRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn mark_annotations(category: &str) -> Vec<String> {
    vec![
        "endnote".to_string(),
        category.to_string(),
        "endnote-marks".to_string(),
    ]
}

impl EndnotesRenderManager {
    pub fn new(categories: Vec<EndnoteCategory>, render_options: EndnotesRenderOptions) -> Self {
        let counters = categories
            .iter()
            .map(|c| (c.name.clone(), Counter::new(c.counter_formatter.clone())))
            .collect();
        Self {
            categories,
            counters,
            instances: HashMap::new(),
            by_key: HashMap::new(),
            render_options,
        }
    }

    /// Add an endnote, numbered next in its category. Adding the same key again
    /// returns the first instance.
    pub fn add_endnote(
        &mut self,
        category: &str,
        key: EntityKey,
        content: EndnoteContent,
    ) -> Result<EndnoteInstance> {
        if let Some((existing_category, index)) = self.by_key.get(&key) {
            if let Some(found) = self
                .instances
                .get(existing_category)
                .and_then(|list| list.get(*index))
            {
                return Ok(found.clone());
            }
        }
        let counter = self.counters.get_mut(category).ok_or_else(|| {
            FlmError::resolution(format!("Invalid endnote category ‘{}’", category), None)
        })?;
        let (number, formatted_flm_text) = counter.step_and_format();
        let instance = EndnoteInstance {
            category: category.to_string(),
            number,
            formatted_flm_text,
            content,
        };
        log::debug!("endnote {} for {}", instance.target_id(), key);
        let list = self.instances.entry(category.to_string()).or_default();
        self.by_key.insert(key, (category.to_string(), list.len()));
        list.push(instance.clone());
        Ok(instance)
    }

    pub fn find(&self, key: &EntityKey) -> Option<&EndnoteInstance> {
        let (category, index) = self.by_key.get(key)?;
        self.instances.get(category)?.get(*index)
    }

    /// Endnotes of `category` in number order.
    pub fn instances(&self, category: &str) -> &[EndnoteInstance] {
        self.instances.get(category).map_or(&[], Vec::as_slice)
    }

    pub fn counter_formatter(&self, category: &str) -> Option<&CounterFormatter> {
        self.counters.get(category).map(|counter| &counter.formatter)
    }

    pub fn render_options(&self) -> &EndnotesRenderOptions {
        &self.render_options
    }

    /// Link to one endnote.
    pub fn render_endnote_mark(ctx: &RenderContext<'_>, instance: &EndnoteInstance) -> Result<String> {
        let display = ctx.render_flm_text(&instance.formatted_flm_text, "endnote mark")?;
        ctx.renderer().render_link(
            "endnote",
            &format!("#{}", instance.target_id()),
            &display,
            &mark_annotations(&instance.category),
            ctx,
        )
    }

    /// Marks of several endnotes of one category, sorted and range-compressed.
    pub fn render_endnote_marks(ctx: &RenderContext<'_>, category: &str, numbers: &[u64]) -> Result<String> {
        let formatter = ctx
            .render_manager::<Self>(FEATURE_NAME)?
            .counter_formatter(category)
            .cloned()
            .ok_or_else(|| {
                FlmError::resolution(format!("Invalid endnote category ‘{}’", category), None)
            })?;
        let renderer = ctx.renderer();
        let annotations = mark_annotations(category);
        let mut pieces = Vec::new();
        for item in formatter.format_many(numbers, false, true) {
            let text = ctx.render_flm_text(&item.text, "endnote mark")?;
            match item.target {
                LinkTarget::Value(n) => pieces.push(renderer.render_link(
                    "endnote",
                    &format!("#{}-{}", category, n),
                    &text,
                    &annotations,
                    ctx,
                )?),
                LinkTarget::Any | LinkTarget::Never => pieces.push(text),
            }
        }
        Ok(renderer.render_join(&pieces, ctx))
    }

    /// The listing of all endnotes, per category. `options` default to the manager's.
    pub fn render_endnotes(ctx: &RenderContext<'_>, options: Option<&EndnotesRenderOptions>) -> Result<String> {
        let (categories, options) = {
            let manager = ctx.render_manager::<Self>(FEATURE_NAME)?;
            let categories: Vec<(EndnoteCategory, Vec<EndnoteInstance>)> = manager
                .categories
                .iter()
                .map(|c| (c.clone(), manager.instances(&c.name).to_vec()))
                .filter(|(_, instances)| !instances.is_empty())
                .collect();
            let options = options.cloned().unwrap_or_else(|| manager.render_options.clone());
            (categories, options)
        };

        let renderer = ctx.renderer();
        if categories.is_empty() {
            return renderer.render_nothing(&["no-endnotes".to_string()], ctx);
        }

        let mut blocks = Vec::new();
        if let Some(title) = &options.endnotes_heading_title {
            let content = ctx.render_flm_text(title, "endnotes heading")?;
            blocks.push(renderer.render_heading(
                &content,
                HeadingLevel::Level(options.endnotes_heading_level),
                false,
                None,
                ctx,
            )?);
        }
        for (category, instances) in &categories {
            blocks.push(render_category(ctx, renderer, category, instances, &options)?);
        }

        let content = renderer.render_join_blocks(&blocks, ctx);
        renderer.render_semantic_block(&content, "endnotes", &[], Some("endnotes"), ctx)
    }
}

fn render_category(
    ctx: &RenderContext<'_>,
    renderer: &dyn FragmentRenderer,
    category: &EndnoteCategory,
    instances: &[EndnoteInstance],
    options: &EndnotesRenderOptions,
) -> Result<String> {
    let mut blocks = Vec::new();
    if let Some(level) = options.include_headings_at_level {
        let content = ctx.render_flm_text(&category.heading_title, "endnotes heading")?;
        let target_id = options
            .set_headings_target_ids
            .then(|| format!("endnotes-{}", category.name));
        blocks.push(renderer.render_heading(
            &content,
            HeadingLevel::Level(level),
            false,
            target_id.as_deref(),
            ctx,
        )?);
    }

    let mut items = Vec::with_capacity(instances.len());
    let mut tags = Vec::with_capacity(instances.len());
    for instance in instances {
        items.push(match &instance.content {
            EndnoteContent::Nodes(nodes) if blocks::list_is_block_level(nodes) => nodes.clone(),
            EndnoteContent::Nodes(nodes) => {
                NodeList::new(nodes.nodes().to_vec(), BlockMode::Inline, nodes.range().clone())
            }
            EndnoteContent::FlmText(text) => ctx
                .parse_flm_text(text, "endnote", None)?
                .nodes()
                .clone(),
        });
        tags.push(
            ctx.parse_flm_text(&instance.formatted_flm_text, "endnote tag", Some(false))?
                .nodes()
                .clone(),
        );
    }

    let tag = |n: usize| match tags.get(n - 1) {
        Some(nodes) => ItemTag::Nodes(nodes.clone()),
        None => ItemTag::Text(String::new()),
    };
    let target_ids = |n: usize| instances.get(n - 1).map(EndnoteInstance::target_id);
    blocks.push(renderer.render_enumeration(
        &items,
        &tag,
        &EnumerationOptions {
            target_id_generator: Some(&target_ids),
            annotations: vec![format!("{}-list", category.name)],
            nested_depth: 0,
        },
        ctx,
    )?);
    Ok(renderer.render_join_blocks(&blocks, ctx))
}

/// `\footnote{text}` and the like.
#[derive(Debug, Clone)]
pub struct EndnoteSpec {
    pub category: String,
}

impl SpecInfo for EndnoteSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::mandatory("endnote_content").with_mode(BlockMode::Infer)]
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let content = node
            .invocation()
            .and_then(|inv| inv.nodes_arg("endnote_content"))
            .ok_or_else(|| FlmError::at_node("Missing endnote content", node))?;
        let instance = ctx
            .render_manager::<EndnotesRenderManager>(FEATURE_NAME)?
            .add_endnote(
                &self.category,
                EntityKey::from(node),
                EndnoteContent::Nodes(content.clone()),
            )
            .map_err(|err| err.or_at(node.range().start))?;
        EndnotesRenderManager::render_endnote_mark(ctx, &instance)
    }
}

/// Render all fragments of `doc` as blocks, followed by the endnotes listing.
pub fn render_with_endnotes(
    doc: &Document,
    renderer: &dyn FragmentRenderer,
    options: &FeatureOptionsMap,
) -> Result<String> {
    let (value, _ctx) = doc.render_with(renderer, options, |ctx| {
        let mut parts = doc
            .fragments()
            .iter()
            .map(|fragment| renderer.render_fragment(fragment, ctx))
            .collect::<Result<Vec<_>>>()?;
        if ctx.supports_feature(FEATURE_NAME) {
            parts.push(EndnotesRenderManager::render_endnotes(ctx, None)?);
        }
        Ok(renderer.render_join_blocks(&parts, ctx))
    })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_html_with_endnotes, render_text_with_endnotes};
    use pretty_assertions::assert_eq;

    fn footnote_category() -> EndnoteCategory {
        EndnoteCategory::new(
            "footnote",
            CounterFormatter::new(FormatNum::named("alph").unwrap()),
            "Footnotes",
        )
    }

    #[test]
    fn test_categories_count_independently() {
        let mut manager = EndnotesRenderManager::new(
            vec![
                footnote_category(),
                EndnoteCategory::new(
                    "citation",
                    CounterFormatter::new(FormatNum::named("arabic").unwrap()).with_delimiters("[", "]"),
                    "References",
                ),
            ],
            EndnotesRenderOptions::default(),
        );
        let note = |s: &str| EndnoteContent::FlmText(s.to_string());
        let a = manager
            .add_endnote("footnote", EntityKey::Key(vec!["1".into()]), note("x"))
            .unwrap();
        let c = manager
            .add_endnote("citation", EntityKey::Key(vec!["2".into()]), note("y"))
            .unwrap();
        let b = manager
            .add_endnote("footnote", EntityKey::Key(vec!["3".into()]), note("z"))
            .unwrap();
        assert_eq!((a.number, a.formatted_flm_text.as_str()), (1, "a"));
        assert_eq!((b.number, b.formatted_flm_text.as_str()), (2, "b"));
        assert_eq!((c.number, c.formatted_flm_text.as_str()), (1, "[1]"));

        let again = manager
            .add_endnote("footnote", EntityKey::Key(vec!["1".into()]), note("ignored"))
            .unwrap();
        assert_eq!(again.number, 1);
        assert_eq!(manager.instances("footnote").len(), 2);
        assert_eq!(b.target_id(), "footnote-2");

        let err = manager
            .add_endnote("sidenote", EntityKey::Key(vec!["4".into()]), note("w"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid endnote category ‘sidenote’");
    }

    #[test]
    fn test_add_endnote_is_idempotent_per_key() {
        let mut manager = EndnotesRenderManager::new(vec![footnote_category()], EndnotesRenderOptions::default());
        let key = EntityKey::Key(vec!["note".into()]);
        let first = manager
            .add_endnote("footnote", key.clone(), EndnoteContent::FlmText("kept".into()))
            .unwrap();
        for _ in 0..3 {
            let again = manager
                .add_endnote("footnote", key.clone(), EndnoteContent::FlmText("dropped".into()))
                .unwrap();
            assert_eq!(again.target_id(), first.target_id());
            assert!(matches!(again.content, EndnoteContent::FlmText(ref text) if text == "kept"));
        }
        let next = manager
            .add_endnote("footnote", EntityKey::Key(vec!["other".into()]), EndnoteContent::FlmText("x".into()))
            .unwrap();
        assert_eq!(next.number, 2);
        assert_eq!(manager.instances("footnote").len(), 2);
        assert_eq!(manager.find(&key).map(|i| i.number), Some(1));
    }

    #[test]
    fn test_duplicate_category() {
        let mut manager = EndnotesDocumentManager::default();
        manager.add_category(footnote_category()).unwrap();
        let err = manager.add_category(footnote_category()).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate endnote category name: ‘footnote’");
    }

    #[test]
    fn test_render_options_overrides() {
        let options: FeatureOptions = serde_json::json!({
            "include_headings_at_level": null,
            "endnotes_heading_title": "Notes",
        })
        .as_object()
        .cloned()
        .unwrap();
        let merged = EndnotesRenderOptions::default().with_overrides(&options).unwrap();
        assert_eq!(merged.include_headings_at_level, None);
        assert_eq!(merged.endnotes_heading_title.as_deref(), Some("Notes"));
        assert!(merged.set_headings_target_ids);
    }

    #[test]
    fn test_footnotes_html() {
        let html = render_html_with_endnotes(
            "We can try to add some footnotes, too.\\footnote{Like this! Does it work?}  Does it work?",
        )
        .unwrap();
        insta::assert_snapshot!(html, @r###"
        We can try to add some footnotes, too.<a href="#footnote-1" class="href-endnote endnote footnote endnote-marks">a</a> Does it work?
        <div id="endnotes" class="endnotes"><h1 id="endnotes-footnote" class="heading-level-1">Footnotes</h1>
        <dl class="enumeration footnote-list"><dt id="footnote-1">a</dt><dd>Like this! Does it work?</dd></dl></div>
        "###);
    }

    #[test]
    fn test_footnotes_text() {
        let out = render_text_with_endnotes("One\\footnote{First.} two\\footnote{Second.}").unwrap();
        assert_eq!(
            out,
            "Onea twob\n\nFootnotes\n=========\n\n  a First.\n\n  b Second."
        );
    }

    #[test]
    fn test_no_endnotes_renders_nothing() {
        // a single paragraph with no block-level content is inline text
        let html = render_html_with_endnotes("Plain.").unwrap();
        assert_eq!(html, "Plain.\n<!-- no-endnotes -->");

        let html = render_html_with_endnotes("Plain.\n\nTwo paragraphs.").unwrap();
        assert_eq!(html, "<p>Plain.</p>\n<p>Two paragraphs.</p>\n<!-- no-endnotes -->");
    }
}
