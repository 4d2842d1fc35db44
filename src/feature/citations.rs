//! Citations
//!
//!     `\cite{arxiv:1234.5678,doi:10.1000/xyz}` cites one or more `prefix:key` entries;
//!     `\cite[Theorem 3]{key}` adds extra text to a single citation, and `\cite` calls
//!     directly following one another form a single batch.
//!
//!     The full text of a citation comes from the first [`CitationProvider`] that knows
//!     it. With the `endnotes` feature, citations become numbered endnotes of category
//!     `citation` and the text shows compressed marks such as `[1–3,5]`; without it the
//!     full text is shown inline.

use crate::ast::{Node, NodeList, ResourceInfo};
use crate::counter::{CounterFormatter, FormatNum, JoinSpec};
use crate::error::{FlmError, Result};
use crate::feature::endnotes::{
    self, EndnoteCategory, EndnoteContent, EndnoteInstance, EndnotesDocumentManager,
    EndnotesRenderManager,
};
use crate::feature::{
    option_bool, DocumentManager, DocumentManagers, EntityKey, Feature, FeatureOptions,
    RenderManager,
};
use crate::render_context::RenderContext;
use crate::specinfo::{ArgumentSpec, Definitions, SpecInfo};
use flm_config::CitationsConfig;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "citations";

/// Endnote category of numbered citations.
pub const CITATION_CATEGORY: &str = "citation";

/// Source of citation full texts, as markup.
pub trait CitationProvider: fmt::Debug + Send + Sync {
    fn get_citation_full_text(
        &self,
        prefix: &str,
        key: &str,
        resource_info: Option<&ResourceInfo>,
    ) -> Option<String>;
}

/// Citations known in advance, by `(prefix, key)`.
#[derive(Debug, Clone, Default)]
pub struct StaticCitationProvider {
    entries: HashMap<(String, String), String>,
}

impl StaticCitationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_citation(mut self, prefix: &str, key: &str, full_text: &str) -> Self {
        self.entries.insert(
            (prefix.to_lowercase(), key.to_string()),
            full_text.to_string(),
        );
        self
    }
}

impl CitationProvider for StaticCitationProvider {
    fn get_citation_full_text(
        &self,
        prefix: &str,
        key: &str,
        _resource_info: Option<&ResourceInfo>,
    ) -> Option<String> {
        self.entries
            .get(&(prefix.to_string(), key.to_string()))
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct CitationsFeature {
    providers: Vec<Arc<dyn CitationProvider>>,
    counter_formatter: CounterFormatter,
    optional_text_separator: String,
    references_heading_title: String,
    sort_and_compress: bool,
    use_endnotes: bool,
}

fn default_counter_formatter() -> Result<CounterFormatter> {
    Ok(CounterFormatter::new(FormatNum::named("arabic")?)
        .with_delimiters("[", "]")
        .with_join_spec(JoinSpec::compact())
        .with_id(CITATION_CATEGORY))
}

impl CitationsFeature {
    pub fn new(providers: Vec<Arc<dyn CitationProvider>>) -> Result<Self> {
        Ok(Self {
            providers,
            counter_formatter: default_counter_formatter()?,
            optional_text_separator: "; ".to_string(),
            references_heading_title: "References".to_string(),
            sort_and_compress: true,
            use_endnotes: true,
        })
    }

    pub fn from_config(
        config: &CitationsConfig,
        providers: Vec<Arc<dyn CitationProvider>>,
    ) -> Result<Self> {
        let mut counter_formatter = CounterFormatter::from_config(
            &config.counter_formatter,
            default_counter_formatter()?,
            CITATION_CATEGORY,
        )?;
        match config.delimiters.as_slice() {
            [] => {}
            [open, close] => counter_formatter = counter_formatter.with_delimiters(open, close),
            _ => {
                return Err(FlmError::configuration(
                    "citations.delimiters must be a pair of strings",
                ))
            }
        }
        Ok(Self {
            providers,
            counter_formatter,
            optional_text_separator: config.optional_text_separator.clone(),
            references_heading_title: config.references_heading_title.clone(),
            sort_and_compress: config.sort_and_compress,
            use_endnotes: config.use_endnotes,
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn CitationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_sort_and_compress(mut self, sort_and_compress: bool) -> Self {
        self.sort_and_compress = sort_and_compress;
        self
    }

    pub fn with_use_endnotes(mut self, use_endnotes: bool) -> Self {
        self.use_endnotes = use_endnotes;
        self
    }
}

impl Feature for CitationsFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Citations"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![endnotes::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        Definitions::new().with_macro("cite", Arc::new(CiteSpec))
    }

    fn new_document_manager(
        &self,
        earlier: &mut DocumentManagers,
        options: &FeatureOptions,
    ) -> Result<Option<Box<dyn DocumentManager>>> {
        let mut use_endnotes = option_bool(options, "use_endnotes", self.use_endnotes)?;
        match earlier.get_mut::<EndnotesDocumentManager>(endnotes::FEATURE_NAME) {
            Some(endnotes_manager) if use_endnotes => {
                endnotes_manager.add_category(EndnoteCategory::new(
                    CITATION_CATEGORY,
                    self.counter_formatter.clone(),
                    &self.references_heading_title,
                ))?;
            }
            Some(_) => {}
            None => {
                if use_endnotes {
                    log::debug!("endnotes are not enabled, citations are shown in full");
                }
                use_endnotes = false;
            }
        }
        Ok(Some(Box::new(CitationsDocumentManager { use_endnotes })))
    }

    fn new_render_manager(
        &self,
        documents: &DocumentManagers,
        options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        let use_endnotes = documents
            .get::<CitationsDocumentManager>(FEATURE_NAME)
            .map_or(false, |manager| manager.use_endnotes);
        Ok(Some(Box::new(CitationsRenderManager {
            providers: self.providers.clone(),
            counter_formatter: self.counter_formatter.clone(),
            optional_text_separator: self.optional_text_separator.clone(),
            use_endnotes,
            sort_and_compress: option_bool(options, "sort_and_compress", self.sort_and_compress)?,
        })))
    }
}

#[derive(Debug)]
pub struct CitationsDocumentManager {
    use_endnotes: bool,
}

impl CitationsDocumentManager {
    pub fn use_endnotes(&self) -> bool {
        self.use_endnotes
    }
}

impl DocumentManager for CitationsDocumentManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One cited key of a `\cite` batch.
#[derive(Debug, Clone)]
pub struct CiteItem {
    /// Lowercased; empty for keys without a prefix.
    pub prefix: String,
    pub key: String,
    pub extra: Option<NodeList>,
}

impl CiteItem {
    fn entity_key(&self) -> EntityKey {
        EntityKey::Key(vec![self.prefix.clone(), self.key.clone()])
    }
}

impl fmt::Display for CiteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.key)
        } else {
            write!(f, "{}:{}", self.prefix, self.key)
        }
    }
}

/// Split a comma separated key list into cite items.
pub fn parse_cite_keys(keys: &str, extra: Option<&NodeList>) -> Vec<CiteItem> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| {
            let (prefix, key) = match key.split_once(':') {
                Some((prefix, key)) => (prefix.trim().to_lowercase(), key.trim()),
                None => (String::new(), key),
            };
            CiteItem {
                prefix,
                key: key.to_string(),
                extra: extra.cloned(),
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct CitationsRenderManager {
    providers: Vec<Arc<dyn CitationProvider>>,
    counter_formatter: CounterFormatter,
    optional_text_separator: String,
    use_endnotes: bool,
    sort_and_compress: bool,
}

impl RenderManager for CitationsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Where the compressed group goes within a batch, or a mark rendered on its own.
enum Part<'i> {
    Group,
    Single(&'i CiteItem, EndnoteInstance),
}

impl CitationsRenderManager {
    pub fn citation_full_text(&self, item: &CiteItem, resource_info: Option<&ResourceInfo>) -> Result<String> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_citation_full_text(&item.prefix, &item.key, resource_info))
            .ok_or_else(|| FlmError::resolution(format!("Citation not found: ‘{}’", item), None))
    }

    /// Render a batch of citations.
    pub fn render_citations(ctx: &RenderContext<'_>, items: &[CiteItem], node: &Node) -> Result<String> {
        let resource_info = node.context().resource_info.as_ref();
        let (use_endnotes, sort_and_compress, delimiters, separator) = {
            let manager = ctx.render_manager::<Self>(FEATURE_NAME)?;
            (
                manager.use_endnotes,
                manager.sort_and_compress,
                manager.counter_formatter.delimiters.clone(),
                manager.optional_text_separator.clone(),
            )
        };
        let renderer = ctx.renderer();

        if !use_endnotes {
            let mut parts = Vec::new();
            for item in items {
                let full_text = ctx
                    .render_manager::<Self>(FEATURE_NAME)?
                    .citation_full_text(item, resource_info)?;
                let mut pieces = vec![
                    renderer.render_value(&delimiters.0, ctx)?,
                    ctx.render_flm_text(&full_text, &format!("citation text for {}", item))?,
                ];
                if let Some(extra) = &item.extra {
                    pieces.push(renderer.render_value(&separator, ctx)?);
                    pieces.push(renderer.render_nodelist(extra, ctx, Some(false))?);
                }
                pieces.push(renderer.render_value(&delimiters.1, ctx)?);
                parts.push(renderer.render_join(&pieces, ctx));
            }
            return renderer.render_semantic_span(&renderer.render_join(&parts, ctx), "citations", &[], None, ctx);
        }

        let mut group = Vec::new();
        let mut sequence = Vec::with_capacity(items.len());
        for item in items {
            let instance = citation_endnote(ctx, item, resource_info)?;
            if sort_and_compress && item.extra.is_none() {
                if group.is_empty() {
                    sequence.push(Part::Group);
                }
                if !group.contains(&instance.number) {
                    group.push(instance.number);
                }
            } else {
                sequence.push(Part::Single(item, instance));
            }
        }

        let delimiters_in_link = group.len() <= 1;
        let mut rendered = Vec::with_capacity(sequence.len());
        for part in &sequence {
            rendered.push(match part {
                Part::Group => {
                    EndnotesRenderManager::render_endnote_marks(ctx, CITATION_CATEGORY, &group)?
                }
                Part::Single(item, instance) => render_individual_mark(
                    ctx,
                    item,
                    instance,
                    &delimiters,
                    &separator,
                    delimiters_in_link,
                )?,
            });
        }
        renderer.render_semantic_span(&renderer.render_join(&rendered, ctx), "citations", &[], None, ctx)
    }
}

/// The endnote of a citation, created on first use.
fn citation_endnote(
    ctx: &RenderContext<'_>,
    item: &CiteItem,
    resource_info: Option<&ResourceInfo>,
) -> Result<EndnoteInstance> {
    let key = item.entity_key();
    if let Some(found) = ctx
        .render_manager::<EndnotesRenderManager>(endnotes::FEATURE_NAME)?
        .find(&key)
    {
        return Ok(found.clone());
    }
    let full_text = ctx
        .render_manager::<CitationsRenderManager>(FEATURE_NAME)?
        .citation_full_text(item, resource_info)?;
    let instance = ctx
        .render_manager::<EndnotesRenderManager>(endnotes::FEATURE_NAME)?
        .add_endnote(CITATION_CATEGORY, key, EndnoteContent::FlmText(full_text))?;
    Ok(instance)
}

/// `[n]` or `[n; extra]`, linking to the citation's endnote.
fn render_individual_mark(
    ctx: &RenderContext<'_>,
    item: &CiteItem,
    instance: &EndnoteInstance,
    delimiters: &(String, String),
    separator: &str,
    delimiters_in_link: bool,
) -> Result<String> {
    if item.extra.is_none() && delimiters_in_link {
        return EndnotesRenderManager::render_endnote_mark(ctx, instance);
    }
    let renderer = ctx.renderer();
    let inner = ctx
        .render_manager::<EndnotesRenderManager>(endnotes::FEATURE_NAME)?
        .counter_formatter(CITATION_CATEGORY)
        .map(|formatter| formatter.format_flm(instance.number, false, false))
        .unwrap_or_else(|| instance.number.to_string());
    let mut pieces = vec![ctx.render_flm_text(&inner, "citation number")?];
    if let Some(extra) = &item.extra {
        pieces.push(renderer.render_value(separator, ctx)?);
        pieces.push(renderer.render_nodelist(extra, ctx, Some(false))?);
    }
    let open = renderer.render_value(&delimiters.0, ctx)?;
    let close = renderer.render_value(&delimiters.1, ctx)?;
    let annotations = vec![
        "endnote".to_string(),
        CITATION_CATEGORY.to_string(),
        "endnote-marks".to_string(),
    ];
    let href = format!("#{}", instance.target_id());
    if delimiters_in_link {
        let display = renderer.render_join(&[open, renderer.render_join(&pieces, ctx), close], ctx);
        renderer.render_link("endnote", &href, &display, &annotations, ctx)
    } else {
        let link = renderer.render_link("endnote", &href, &renderer.render_join(&pieces, ctx), &annotations, ctx)?;
        Ok(renderer.render_join(&[open, link, close], ctx))
    }
}

/// `\cite[extra]{keys}`, with any directly following `\cite` calls.
#[derive(Debug, Clone, Default)]
pub struct CiteSpec;

impl CiteSpec {
    /// All cite items of this node and of the calls tacked onto it.
    pub fn cite_items(node: &Node) -> Result<Vec<CiteItem>> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a \\cite call", node))?;
        let mut items = Self::own_items(node)?;
        for more in inv.tacked_on("cite_more") {
            items.extend(Self::own_items(more)?);
        }
        Ok(items)
    }

    fn own_items(node: &Node) -> Result<Vec<CiteItem>> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a \\cite call", node))?;
        let extra = inv.nodes_arg("cite_extra");
        let items = parse_cite_keys(inv.chars_arg("cite_keys").unwrap_or(""), extra);
        if items.is_empty() {
            return Err(FlmError::at_node("\\cite needs at least one citation key", node));
        }
        if extra.is_some() && items.len() > 1 {
            return Err(FlmError::at_node(
                "When using the syntax \\cite[extra]{citekey}, you can only specify a single citation key.",
                node,
            ));
        }
        Ok(items)
    }
}

impl SpecInfo for CiteSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::optional("cite_extra"),
            ArgumentSpec::chars("cite_keys"),
            ArgumentSpec::tack_on("cite_more", &["cite"], Arc::new(CiteSpec)),
        ]
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        Self::cite_items(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let items = Self::cite_items(node)?;
        CitationsRenderManager::render_citations(ctx, &items, node).map_err(|err| err.or_at(node.range().start))
    }
}
