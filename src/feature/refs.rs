//! Labels and cross-references
//!
//!     Features that own referenceable things (headings, floats, equations, enumeration
//!     items) register them with the [`RefsRenderManager`] under `(type, label)` pairs.
//!     `\ref` and `\hyperref` are delayed: they resolve once the whole document has been
//!     seen, so forward references work.
//!
//!     References carrying a counter value are grouped by counter formatter, so that
//!     `\ref{fig:a,fig:b,fig:c}` renders as one compressed `Figures 1–3`. A label that is
//!     not found in the document is looked up with the external resolvers, in order.

use crate::ast::{Node, NodeList, Position, ResourceInfo};
use crate::counter::{CounterFormatter, LinkTarget};
use crate::error::{FlmError, Result};
use crate::feature::{
    DocumentManagers, EntityKey, Feature, FeatureOptions, RenderManager,
};
use crate::render_context::RenderContext;
use crate::specinfo::{split_label, ArgumentSpec, Definitions, SpecInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "refs";

static UNSAFE_ID_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9-]").unwrap());

/// Target id usable in URLs and HTML ids: every character outside `[a-zA-Z0-9-]` is
/// replaced by `_{hex}X`.
pub fn safe_target_id(ref_type: &str, ref_label: &str) -> String {
    let escape = |s: &str| {
        UNSAFE_ID_CHAR
            .replace_all(s, |caps: &regex::Captures<'_>| {
                caps[0]
                    .chars()
                    .map(|c| format!("_{:x}X", c as u32))
                    .collect::<String>()
            })
            .into_owned()
    };
    format!("{}-{}", escape(ref_type), escape(ref_label))
}

fn describe_label(ref_type: &str, ref_label: &str) -> String {
    if ref_type.is_empty() {
        format!("‘{}’", ref_label)
    } else {
        format!("‘{}:{}’", ref_type, ref_label)
    }
}

/// Everything needed to render a reference to one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInstance {
    pub ref_type: String,
    pub ref_label: String,
    /// Markup shown when the reference has no counter, e.g. a section title.
    pub formatted_ref_flm_text: String,
    /// `#target-id` within the document, or an external URL.
    pub target_href: Option<String>,
    pub counter_value: Option<u64>,
    /// Registered formatter used to show `counter_value`.
    pub counter_formatter_id: Option<String>,
}

impl RefInstance {
    pub fn new(ref_type: &str, ref_label: &str, formatted_ref_flm_text: &str) -> Self {
        Self {
            ref_type: ref_type.to_string(),
            ref_label: ref_label.to_string(),
            formatted_ref_flm_text: formatted_ref_flm_text.to_string(),
            target_href: None,
            counter_value: None,
            counter_formatter_id: None,
        }
    }

    pub fn with_target_id(mut self, target_id: &str) -> Self {
        self.target_href = Some(format!("#{}", target_id));
        self
    }

    pub fn with_counter(mut self, value: u64, formatter_id: &str) -> Self {
        self.counter_value = Some(value);
        self.counter_formatter_id = Some(formatter_id.to_string());
        self
    }
}

/// One referenceable entity answering to any of its labels.
#[derive(Debug, Clone)]
pub struct ReferenceableInfo {
    pub formatted_ref_flm_text: String,
    pub labels: Vec<(String, String)>,
    pub counter: Option<(u64, String)>,
}

impl ReferenceableInfo {
    pub fn new(formatted_ref_flm_text: impl Into<String>, labels: Vec<(String, String)>) -> Self {
        Self {
            formatted_ref_flm_text: formatted_ref_flm_text.into(),
            labels,
            counter: None,
        }
    }

    pub fn with_counter(mut self, value: u64, formatter_id: &str) -> Self {
        self.counter = Some((value, formatter_id.to_string()));
        self
    }

    /// Target id derived from the first label.
    pub fn target_id(&self) -> Option<String> {
        self.labels
            .first()
            .map(|(ref_type, ref_label)| safe_target_id(ref_type, ref_label))
    }
}

/// Looks up references that live outside the document (another chapter, a wiki, ...).
pub trait RefResolver: fmt::Debug + Send + Sync {
    fn get_ref(
        &self,
        ref_type: &str,
        ref_label: &str,
        resource_info: Option<&ResourceInfo>,
        ctx: &RenderContext<'_>,
    ) -> Option<RefInstance>;
}

#[derive(Debug, Default)]
pub struct RefsFeature {
    external_ref_resolvers: Vec<Arc<dyn RefResolver>>,
}

impl RefsFeature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn RefResolver>) -> Self {
        self.external_ref_resolvers.push(resolver);
        self
    }
}

impl Feature for RefsFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Labels and cross-references"
    }

    fn definitions(&self) -> Definitions {
        Definitions::new()
            .with_macro("ref", Arc::new(RefSpec::Ref))
            .with_macro("hyperref", Arc::new(RefSpec::Hyperref))
    }

    fn new_render_manager(
        &self,
        _documents: &DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        Ok(Some(Box::new(RefsRenderManager::new(
            self.external_ref_resolvers.clone(),
        ))))
    }
}

#[derive(Debug)]
struct RegisteredRef {
    entity: EntityKey,
    instance: RefInstance,
    position: Option<Position>,
}

#[derive(Debug)]
pub struct RefsRenderManager {
    references: HashMap<(String, String), RegisteredRef>,
    counter_formatters: HashMap<String, CounterFormatter>,
    external_ref_resolvers: Vec<Arc<dyn RefResolver>>,
}

impl RenderManager for RefsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl RefsRenderManager {
    pub fn new(external_ref_resolvers: Vec<Arc<dyn RefResolver>>) -> Self {
        Self {
            references: HashMap::new(),
            counter_formatters: HashMap::new(),
            external_ref_resolvers,
        }
    }

    /// Make a formatter available to counter references. The formatter needs an id.
    pub fn register_counter_formatter(&mut self, formatter: CounterFormatter) -> Result<()> {
        let id = formatter.id.clone().ok_or_else(|| {
            FlmError::configuration("Cannot register a counter formatter without an id")
        })?;
        if self.counter_formatters.contains_key(&id) {
            return Err(FlmError::configuration(format!(
                "Counter formatter ‘{}’ is already registered",
                id
            )));
        }
        self.counter_formatters.insert(id, formatter);
        Ok(())
    }

    pub fn counter_formatter(&self, id: &str) -> Option<&CounterFormatter> {
        self.counter_formatters.get(id)
    }

    /// Register one label. Registering the same entity again is a no-op; another entity
    /// under an existing label is an error.
    pub fn register_reference(
        &mut self,
        entity: EntityKey,
        instance: RefInstance,
        position: Option<Position>,
    ) -> Result<()> {
        let key = (instance.ref_type.clone(), instance.ref_label.clone());
        if let Some(existing) = self.references.get(&key) {
            if existing.entity == entity {
                return Ok(());
            }
            let first = existing
                .position
                .map(|pos| format!(" (first defined at {})", pos))
                .unwrap_or_default();
            return Err(FlmError::resolution(
                format!(
                    "Duplicate reference label {} in the same document{}",
                    describe_label(&key.0, &key.1),
                    first
                ),
                position,
            ));
        }
        log::debug!(
            "registered reference {} → {:?}",
            describe_label(&key.0, &key.1),
            instance.target_href
        );
        self.references.insert(
            key,
            RegisteredRef {
                entity,
                instance,
                position,
            },
        );
        Ok(())
    }

    /// Register every label of `info`, all pointing at the first label's target id.
    pub fn register_referenceable(
        &mut self,
        entity: EntityKey,
        info: &ReferenceableInfo,
        position: Option<Position>,
    ) -> Result<()> {
        let Some(target_id) = info.target_id() else {
            return Ok(());
        };
        for (ref_type, ref_label) in &info.labels {
            let mut instance = RefInstance::new(ref_type, ref_label, &info.formatted_ref_flm_text)
                .with_target_id(&target_id);
            if let Some((value, formatter_id)) = &info.counter {
                instance = instance.with_counter(*value, formatter_id);
            }
            self.register_reference(entity.clone(), instance, position)?;
        }
        Ok(())
    }

    /// A reference registered in this document.
    pub fn find(&self, ref_type: &str, ref_label: &str) -> Option<&RefInstance> {
        self.references
            .get(&(ref_type.to_string(), ref_label.to_string()))
            .map(|registered| &registered.instance)
    }

    /// Look `ref_type:ref_label` up in the document, then with each external resolver.
    pub fn get_ref(
        ctx: &RenderContext<'_>,
        ref_type: &str,
        ref_label: &str,
        resource_info: Option<&ResourceInfo>,
    ) -> Result<RefInstance> {
        let resolvers = {
            let manager = ctx.render_manager::<Self>(FEATURE_NAME)?;
            if let Some(found) = manager.find(ref_type, ref_label) {
                return Ok(found.clone());
            }
            manager.external_ref_resolvers.clone()
        };
        for resolver in &resolvers {
            if let Some(found) = resolver.get_ref(ref_type, ref_label, resource_info, ctx) {
                log::debug!(
                    "reference {} resolved externally",
                    describe_label(ref_type, ref_label)
                );
                return Ok(found);
            }
        }
        Err(FlmError::resolution(
            format!(
                "Ref target {} found neither within database nor with any set external resolvers",
                describe_label(ref_type, ref_label)
            ),
            None,
        ))
    }

    /// Render references to `targets`. `display` replaces the generated text and is only
    /// allowed with a single target.
    pub fn render_refs(
        ctx: &RenderContext<'_>,
        targets: &[(String, String)],
        display: Option<&NodeList>,
        resource_info: Option<&ResourceInfo>,
        with_prefix: bool,
    ) -> Result<String> {
        let renderer = ctx.renderer();

        if let Some(display) = display {
            let (ref_type, ref_label) = match targets {
                [single] => single,
                _ => {
                    return Err(FlmError::resolution(
                        format!(
                            "Reference with custom display text must have exactly one target, got {}",
                            targets
                                .iter()
                                .map(|(t, l)| describe_label(t, l))
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        None,
                    ))
                }
            };
            let instance = Self::get_ref(ctx, ref_type, ref_label, resource_info)?;
            let content = renderer.render_nodelist(display, ctx, Some(false))?;
            return render_link_to(ctx, &instance, &content);
        }

        let instances = targets
            .iter()
            .map(|(ref_type, ref_label)| Self::get_ref(ctx, ref_type, ref_label, resource_info))
            .collect::<Result<Vec<_>>>()?;

        // Counter references, grouped by formatter in order of first appearance
        let mut groups: Vec<(CounterFormatter, Vec<RefInstance>)> = Vec::new();
        let mut parts: Vec<Option<RefInstance>> = Vec::new();
        {
            let manager = ctx.render_manager::<Self>(FEATURE_NAME)?;
            for instance in instances {
                let formatter = match (&instance.counter_value, &instance.counter_formatter_id) {
                    (Some(_), Some(id)) => manager.counter_formatter(id),
                    _ => None,
                };
                match formatter {
                    Some(formatter) => {
                        match groups.iter_mut().find(|(f, _)| f.id == formatter.id) {
                            Some((_, members)) => members.push(instance),
                            None => {
                                groups.push((formatter.clone(), vec![instance]));
                                // placeholder for the group
                                parts.push(None);
                            }
                        }
                    }
                    None => parts.push(Some(instance)),
                }
            }
        }

        let mut groups = groups.into_iter();
        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Some(instance) => {
                    let text = ctx.render_flm_text(&instance.formatted_ref_flm_text, "reference text")?;
                    rendered.push(render_link_to(ctx, &instance, &text)?);
                }
                None => {
                    if let Some((formatter, members)) = groups.next() {
                        rendered.push(render_counter_group(ctx, &formatter, &members, with_prefix)?);
                    }
                }
            }
        }

        let separator = renderer.render_value(", ", ctx)?;
        let mut joined = Vec::with_capacity(rendered.len() * 2);
        for (j, part) in rendered.into_iter().enumerate() {
            if j > 0 {
                joined.push(separator.clone());
            }
            joined.push(part);
        }
        Ok(renderer.render_join(&joined, ctx))
    }
}

fn render_link_to(ctx: &RenderContext<'_>, instance: &RefInstance, display: &str) -> Result<String> {
    match &instance.target_href {
        Some(href) => ctx.renderer().render_link(
            "ref",
            href,
            display,
            &[format!("ref-{}", instance.ref_type)],
            ctx,
        ),
        None => Ok(display.to_string()),
    }
}

fn render_counter_group(
    ctx: &RenderContext<'_>,
    formatter: &CounterFormatter,
    members: &[RefInstance],
    with_prefix: bool,
) -> Result<String> {
    let renderer = ctx.renderer();
    let mut values: Vec<u64> = members.iter().filter_map(|m| m.counter_value).collect();
    values.sort_unstable();
    values.dedup();
    let target_of = |value: u64| {
        members
            .iter()
            .find(|m| m.counter_value == Some(value) && m.target_href.is_some())
    };

    let mut pieces = Vec::new();
    for item in formatter.format_many(&values, with_prefix, true) {
        let text = ctx.render_flm_text(&item.text, "counter reference")?;
        match item.target {
            LinkTarget::Value(value) => match target_of(value) {
                Some(target) => pieces.push(render_link_to(ctx, target, &text)?),
                None => pieces.push(text),
            },
            LinkTarget::Any | LinkTarget::Never => pieces.push(text),
        }
    }
    Ok(renderer.render_join(&pieces, ctx))
}

/// Parse `a,b,type:c` into `(type, label)` pairs; labels without a type get an empty one.
pub fn parse_ref_targets(labels: &str) -> Vec<(String, String)> {
    labels
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| {
            let (ref_type, ref_label) = split_label(label);
            (
                ref_type.unwrap_or("").trim().to_string(),
                ref_label.trim().to_string(),
            )
        })
        .collect()
}

/// `\ref{labels}` and `\hyperref[label]{display text}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSpec {
    Ref,
    Hyperref,
}

impl RefSpec {
    fn targets(&self, node: &Node) -> Result<Vec<(String, String)>> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a reference macro", node))?;
        let labels = inv.chars_arg("ref_label").unwrap_or("");
        let targets = parse_ref_targets(labels);
        if targets.is_empty() {
            return Err(FlmError::at_node(
                format!("{} needs at least one label", node.display_name()),
                node,
            ));
        }
        Ok(targets)
    }
}

impl SpecInfo for RefSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        match self {
            RefSpec::Ref => vec![ArgumentSpec::chars("ref_label")],
            RefSpec::Hyperref => vec![
                ArgumentSpec::optional_chars("ref_label"),
                ArgumentSpec::mandatory("display_text"),
            ],
        }
    }

    fn delayed_render(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.targets(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let targets = self.targets(node)?;
        let display = node.invocation().and_then(|inv| inv.nodes_arg("display_text"));
        RefsRenderManager::render_refs(
            ctx,
            &targets,
            display,
            node.context().resource_info.as_ref(),
            true,
        )
        .map_err(|err| err.or_at(node.range().start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_html, render_text, render_text_with};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_safe_target_id() {
        assert_eq!(safe_target_id("sec", "intro"), "sec-intro");
        assert_eq!(safe_target_id("fig", "a b"), "fig-a_20Xb");
        assert_eq!(safe_target_id("eq", "x_1"), "eq-x_5fX1");
        assert_eq!(safe_target_id("sec", "été"), "sec-_e9Xt_e9X");
    }

    #[test]
    fn test_parse_ref_targets() {
        assert_eq!(
            parse_ref_targets("fig:a, fig:b,intro"),
            vec![
                ("fig".to_string(), "a".to_string()),
                ("fig".to_string(), "b".to_string()),
                (String::new(), "intro".to_string()),
            ]
        );
        assert!(parse_ref_targets(" , ").is_empty());
    }

    #[test]
    fn test_register_reference_is_idempotent_per_entity() {
        let mut manager = RefsRenderManager::new(Vec::new());
        let entity = EntityKey::Key(vec!["a".to_string()]);
        let instance = RefInstance::new("sec", "intro", "Intro").with_target_id("sec-intro");
        manager
            .register_reference(entity.clone(), instance.clone(), None)
            .unwrap();
        manager
            .register_reference(entity, instance.clone(), None)
            .unwrap();
        assert_eq!(manager.find("sec", "intro"), Some(&instance));

        let err = manager
            .register_reference(
                EntityKey::Key(vec!["b".to_string()]),
                instance,
                Some(Position::new(3, 1)),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate reference label ‘sec:intro’ in the same document @ 3:1"
        );
    }

    #[test]
    fn test_counter_formatter_needs_unique_id() {
        let mut manager = RefsRenderManager::new(Vec::new());
        let formatter = CounterFormatter::new(crate::counter::FormatNum::named("arabic").unwrap());
        assert!(manager.register_counter_formatter(formatter.clone()).is_err());
        manager
            .register_counter_formatter(formatter.clone().with_id("figure"))
            .unwrap();
        let err = manager
            .register_counter_formatter(formatter.with_id("figure"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Counter formatter ‘figure’ is already registered");
    }

    #[test]
    fn test_forward_and_backward_refs() {
        let out = render_text(
            "\\section{Intro}\\label{sec:intro}\n\nSee \\ref{sec:later}.\n\n\\section{Later}\\label{sec:later}\n\nBack to \\ref{sec:intro}.",
        )
        .unwrap();
        assert_eq!(
            out,
            "Intro\n=====\n\nSee Later.\n\nLater\n=====\n\nBack to Intro."
        );
    }

    #[test]
    fn test_hyperref_links_custom_text() {
        let out = render_html("\\section{Intro}\\label{sec:intro}\n\n\\hyperref[sec:intro]{this part}").unwrap();
        assert!(out.contains("<a href=\"#sec-intro\" class=\"href-ref ref-sec\">this part</a>"), "{}", out);
    }

    #[test]
    fn test_missing_ref_target() {
        let err = render_text("See \\ref{sec:nowhere}.").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Ref target ‘sec:nowhere’ found neither within database nor with any set external resolvers @ 0:4"
        );
    }

    #[derive(Debug)]
    struct Wiki;

    impl RefResolver for Wiki {
        fn get_ref(
            &self,
            ref_type: &str,
            ref_label: &str,
            _resource_info: Option<&ResourceInfo>,
            _ctx: &RenderContext<'_>,
        ) -> Option<RefInstance> {
            (ref_type == "wiki").then(|| {
                let mut instance = RefInstance::new(ref_type, ref_label, &format!("Wiki page {}", ref_label));
                instance.target_href = Some(format!("https://wiki.example/{}", ref_label));
                instance
            })
        }
    }

    #[test]
    fn test_external_resolver() {
        let out = render_text_with("See \\ref{wiki:Rust}.", Vec::new(), vec![Arc::new(Wiki)]).unwrap();
        assert_eq!(out, "See Wiki page Rust <https://wiki.example/Rust>.");
    }
}
