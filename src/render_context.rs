//! Per-render state
//!
//!     A [`RenderContext`] lives for exactly one render call. It owns the render managers
//!     of the document's features, the registry of delayed nodes, the logical state used
//!     by nested constructs, and the memoized block structure of every node list seen.
//!
//!     Managers sit in `RefCell`s. Borrows handed out by [`RenderContext::render_manager`]
//!     must be dropped before rendering any nested content, since nested content may need
//!     the same manager again.
//!
//!     Render pass transitions:
//!
//!         NotStarted → FirstPass → Finalizing → (SecondPass) → Done
//!
//!     Registration side effects are allowed while [`RenderContext::is_first_pass`] holds,
//!     i.e. in the first pass and while delayed content is computed.

use crate::ast::{Node, NodeId, NodeList, NodeListId};
use crate::blocks::{self, ListStructure};
use crate::document::Document;
use crate::environment::FragmentOptions;
use crate::error::{FlmError, Result};
use crate::feature::{DocumentManager, RenderManager};
use crate::fragment::Fragment;
use crate::renderer::FragmentRenderer;
use std::cell::{Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    NotStarted,
    FirstPass,
    /// Running `process` hooks and computing delayed content.
    Finalizing,
    SecondPass,
    Done,
}

/// Key of a delayed node in the registry and in markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelayedKey(pub u64);

impl From<NodeId> for DelayedKey {
    fn from(id: NodeId) -> Self {
        DelayedKey(id.value())
    }
}

impl fmt::Display for DelayedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type LogicalState = HashMap<String, HashMap<String, serde_json::Value>>;

pub struct RenderContext<'a> {
    doc: Option<&'a Document>,
    renderer: &'a dyn FragmentRenderer,
    pass: Cell<RenderPass>,
    managers: Vec<(String, RefCell<Box<dyn RenderManager>>)>,
    delayed_nodes: RefCell<Vec<(DelayedKey, Node)>>,
    delayed_content: RefCell<HashMap<DelayedKey, String>>,
    logical_state: RefCell<LogicalState>,
    structures: RefCell<HashMap<(NodeListId, Option<bool>), Rc<ListStructure>>>,
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("standalone", &self.doc.is_none())
            .field("pass", &self.pass.get())
            .field(
                "managers",
                &self.managers.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .field("delayed", &self.delayed_nodes.borrow().len())
            .finish()
    }
}

impl<'a> RenderContext<'a> {
    /// Context for rendering within a document. Managers are added by the document.
    pub(crate) fn for_document(doc: &'a Document, renderer: &'a dyn FragmentRenderer) -> Self {
        Self::new(Some(doc), renderer)
    }

    /// Context without a document: no features and no delayed content.
    pub fn standalone(renderer: &'a dyn FragmentRenderer) -> Self {
        let ctx = Self::new(None, renderer);
        ctx.pass.set(RenderPass::FirstPass);
        ctx
    }

    fn new(doc: Option<&'a Document>, renderer: &'a dyn FragmentRenderer) -> Self {
        Self {
            doc,
            renderer,
            pass: Cell::new(RenderPass::NotStarted),
            managers: Vec::new(),
            delayed_nodes: RefCell::new(Vec::new()),
            delayed_content: RefCell::new(HashMap::new()),
            logical_state: RefCell::new(HashMap::new()),
            structures: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn add_render_manager(&mut self, feature_name: &str, manager: Box<dyn RenderManager>) {
        self.managers
            .push((feature_name.to_string(), RefCell::new(manager)));
    }

    pub(crate) fn set_pass(&self, pass: RenderPass) {
        log::debug!("render pass {:?} → {:?}", self.pass.get(), pass);
        self.pass.set(pass);
    }

    pub(crate) fn manager_cells(&self) -> impl Iterator<Item = (&str, &RefCell<Box<dyn RenderManager>>)> {
        self.managers.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    pub fn doc(&self) -> Option<&'a Document> {
        self.doc
    }

    pub fn renderer(&self) -> &'a dyn FragmentRenderer {
        self.renderer
    }

    pub fn pass(&self) -> RenderPass {
        self.pass.get()
    }

    pub fn is_first_pass(&self) -> bool {
        matches!(self.pass.get(), RenderPass::FirstPass | RenderPass::Finalizing)
    }

    pub fn is_standalone(&self) -> bool {
        self.doc.is_none()
    }

    pub fn supports_feature(&self, feature_name: &str) -> bool {
        self.doc.map_or(false, |doc| doc.supports_feature(feature_name))
    }

    /// Mutable access to a feature's render manager. Drop the borrow before rendering
    /// anything that might need the same manager.
    pub fn render_manager<M: RenderManager>(&self, feature_name: &str) -> Result<RefMut<'_, M>> {
        if self.is_standalone() {
            return Err(FlmError::resolution(
                format!(
                    "There are no document features when rendering FLM text in standalone mode (requested ‘{}’)",
                    feature_name
                ),
                None,
            ));
        }
        let cell = self
            .managers
            .iter()
            .find(|(name, _)| name == feature_name)
            .map(|(_, cell)| cell)
            .ok_or_else(|| {
                FlmError::resolution(
                    format!("Feature ‘{}’ is not enabled for this document", feature_name),
                    None,
                )
            })?;
        let guard = cell.try_borrow_mut().map_err(|_| {
            FlmError::render(format!(
                "Render manager of feature ‘{}’ is already in use",
                feature_name
            ))
        })?;
        RefMut::filter_map(guard, |manager| manager.as_any_mut().downcast_mut::<M>()).map_err(
            |_| {
                FlmError::render(format!(
                    "Render manager of feature ‘{}’ has an unexpected type",
                    feature_name
                ))
            },
        )
    }

    pub fn document_manager<M: DocumentManager>(&self, feature_name: &str) -> Result<&'a M> {
        let doc = self.doc.ok_or_else(|| {
            FlmError::resolution(
                format!(
                    "There are no document features when rendering FLM text in standalone mode (requested ‘{}’)",
                    feature_name
                ),
                None,
            )
        })?;
        doc.managers().get::<M>(feature_name).ok_or_else(|| {
            FlmError::resolution(
                format!("Feature ‘{}’ is not enabled for this document", feature_name),
                None,
            )
        })
    }

    /// Structure of `list` under the given forced mode, computed once per context.
    pub fn block_structure(&self, list: &NodeList, forced: Option<bool>) -> Result<Rc<ListStructure>> {
        let key = (list.id(), forced);
        if let Some(found) = self.structures.borrow().get(&key) {
            return Ok(found.clone());
        }
        let structure = Rc::new(blocks::structure(list, forced)?);
        self.structures.borrow_mut().insert(key, structure.clone());
        Ok(structure)
    }

    pub fn register_delayed(&self, node: &Node) -> Result<DelayedKey> {
        if self.is_standalone() {
            return Err(FlmError::render(
                "Cannot render nodes with delayed content in standalone mode",
            ));
        }
        let key = DelayedKey::from(node.id());
        let mut nodes = self.delayed_nodes.borrow_mut();
        if !nodes.iter().any(|(k, _)| *k == key) {
            log::debug!("registered delayed node {} ({})", key, node.display_name());
            nodes.push((key, node.clone()));
        }
        Ok(key)
    }

    /// Final content of a delayed node; computed now if it was never registered.
    pub fn delayed_content(&self, node: &Node) -> Result<String> {
        let key = DelayedKey::from(node.id());
        if let Some(content) = self.delayed_content.borrow().get(&key) {
            return Ok(content.clone());
        }
        let spec = node.spec().ok_or_else(|| {
            FlmError::render(format!("Node {} has no attached behavior", node.display_name()))
        })?;
        spec.render(node, self)
    }

    /// Render every registered delayed node, including any registered meanwhile.
    pub(crate) fn compute_delayed_content(&self) -> Result<()> {
        let mut index = 0;
        loop {
            let next = self.delayed_nodes.borrow().get(index).cloned();
            let Some((key, node)) = next else {
                break;
            };
            index += 1;
            if self.delayed_content.borrow().contains_key(&key) {
                continue;
            }
            let spec = node.spec().ok_or_else(|| {
                FlmError::render(format!("Node {} has no attached behavior", node.display_name()))
            })?;
            let content = spec.render(&node, self)?;
            self.delayed_content.borrow_mut().insert(key, content);
        }
        log::debug!("computed content of {} delayed nodes", index);
        Ok(())
    }

    pub(crate) fn delayed_values(&self) -> std::cell::Ref<'_, HashMap<DelayedKey, String>> {
        self.delayed_content.borrow()
    }

    pub fn logical_state(&self, domain: &str, key: &str) -> Option<serde_json::Value> {
        self.logical_state
            .borrow()
            .get(domain)
            .and_then(|state| state.get(key))
            .cloned()
    }

    /// Set `domain.key` until the returned guard is dropped.
    pub fn push_logical_state(
        &self,
        domain: &str,
        key: &str,
        value: serde_json::Value,
    ) -> LogicalStateGuard<'_> {
        let previous = self
            .logical_state
            .borrow_mut()
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value);
        LogicalStateGuard {
            state: &self.logical_state,
            domain: domain.to_string(),
            key: key.to_string(),
            previous,
        }
    }

    /// Parse `text` as standalone markup with the document's vocabulary.
    pub fn parse_flm_text(&self, text: &str, what: &str, is_block_level: Option<bool>) -> Result<Fragment> {
        let doc = self.doc.ok_or_else(|| {
            FlmError::render("Cannot parse markup without a document environment")
        })?;
        doc.environment().make_fragment(
            text,
            FragmentOptions {
                what: what.to_string(),
                is_block_level,
                standalone_mode: true,
                ..FragmentOptions::default()
            },
        )
    }

    /// Parse `text` as inline markup with the document's vocabulary and render it.
    pub fn render_flm_text(&self, text: &str, what: &str) -> Result<String> {
        let fragment = self.parse_flm_text(text, what, Some(false))?;
        self.renderer.render_fragment(&fragment, self)
    }
}

/// Restores a logical state entry when dropped.
pub struct LogicalStateGuard<'c> {
    state: &'c RefCell<LogicalState>,
    domain: String,
    key: String,
    previous: Option<serde_json::Value>,
}

impl Drop for LogicalStateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        let domain = state.entry(std::mem::take(&mut self.domain)).or_default();
        match self.previous.take() {
            Some(value) => {
                domain.insert(std::mem::take(&mut self.key), value);
            }
            None => {
                domain.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::feature::{DocumentManagers, Feature, FeatureOptions};
    use crate::renderer::html::HtmlFragmentRenderer;
    use crate::renderer::text::TextFragmentRenderer;
    use crate::specinfo::{ArgumentSpec, Definitions, SpecInfo};
    use serde_json::json;
    use std::any::Any;
    use std::sync::Arc;

    /// `\tick` counts on the first pass; `\total{...}` shows the final count, delayed.
    #[derive(Debug)]
    struct TallyFeature;

    #[derive(Debug, Default)]
    struct TallyRenderManager {
        ticks: u64,
    }

    impl RenderManager for TallyRenderManager {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct TickSpec;

    impl SpecInfo for TickSpec {
        fn render(&self, _node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
            if ctx.is_first_pass() {
                ctx.render_manager::<TallyRenderManager>("tally")?.ticks += 1;
            }
            Ok(String::new())
        }
    }

    #[derive(Debug)]
    struct TotalSpec;

    impl SpecInfo for TotalSpec {
        fn arguments(&self) -> Vec<ArgumentSpec> {
            vec![ArgumentSpec::mandatory("content")]
        }

        fn delayed_render(&self) -> bool {
            true
        }

        fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
            let ticks = ctx.render_manager::<TallyRenderManager>("tally")?.ticks;
            let content = node
                .invocation()
                .and_then(|inv| inv.nodes_arg("content"))
                .ok_or_else(|| FlmError::at_node("Missing content", node))?;
            let inner = ctx.renderer().render_nodelist(content, ctx, Some(false))?;
            Ok(format!("total={}({})", ticks, inner))
        }
    }

    impl Feature for TallyFeature {
        fn name(&self) -> &str {
            "tally"
        }

        fn definitions(&self) -> Definitions {
            Definitions::new()
                .with_macro("tick", Arc::new(TickSpec))
                .with_macro("total", Arc::new(TotalSpec))
        }

        fn new_render_manager(
            &self,
            _documents: &DocumentManagers,
            _options: &FeatureOptions,
        ) -> Result<Option<Box<dyn RenderManager>>> {
            Ok(Some(Box::new(TallyRenderManager::default())))
        }
    }

    fn tally_document(source: &str) -> Document {
        let features: Vec<Arc<dyn Feature>> = vec![Arc::new(TallyFeature)];
        let environment = Environment::new(features).unwrap();
        let fragment = environment
            .make_fragment(source, FragmentOptions::new("tally"))
            .unwrap();
        Document::new(environment, vec![fragment]).unwrap()
    }

    #[test]
    fn test_delayed_content_inside_delayed_content() {
        let doc = tally_document("\\total{a \\total{b}}\\tick\\tick\\tick");
        let renderers: Vec<Box<dyn FragmentRenderer>> = vec![
            Box::new(TextFragmentRenderer::default()),
            Box::new(HtmlFragmentRenderer::default()),
        ];
        for renderer in &renderers {
            assert_eq!(doc.render(renderer.as_ref()).unwrap(), "total=3(a total=3(b))");
        }
    }

    #[test]
    fn test_compute_delayed_content_only_fills_missing_values() {
        let doc = tally_document("\\tick\\total{x}\\total{y}");
        let renderer = TextFragmentRenderer::default();
        let (_, ctx) = doc
            .render_with(&renderer, &Default::default(), |ctx| {
                renderer.render_fragment(&doc.fragments()[0], ctx)
            })
            .unwrap();
        assert_eq!(ctx.delayed_values().len(), 2);

        let late = tally_document("\\total{z}");
        let late_node = late.fragments()[0].nodes().nodes()[0].clone();
        ctx.set_pass(RenderPass::Finalizing);
        ctx.register_delayed(&late_node).unwrap();
        ctx.compute_delayed_content().unwrap();
        assert_eq!(ctx.delayed_values().len(), 3);
        assert_eq!(ctx.delayed_content(&late_node).unwrap(), "total=1(z)");
        let first = &doc.fragments()[0].nodes().nodes()[1];
        assert_eq!(ctx.delayed_content(first).unwrap(), "total=1(x)");
    }

    #[test]
    fn test_logical_state_nests_and_restores() {
        let renderer = TextFragmentRenderer::default();
        let ctx = RenderContext::standalone(&renderer);
        assert_eq!(ctx.logical_state("enumeration", "nested_depth"), None);
        {
            let _outer = ctx.push_logical_state("enumeration", "nested_depth", json!(1));
            {
                let _inner = ctx.push_logical_state("enumeration", "nested_depth", json!(2));
                assert_eq!(ctx.logical_state("enumeration", "nested_depth"), Some(json!(2)));
            }
            assert_eq!(ctx.logical_state("enumeration", "nested_depth"), Some(json!(1)));
        }
        assert_eq!(ctx.logical_state("enumeration", "nested_depth"), None);
    }

    #[test]
    fn test_logical_state_restored_on_error_exit() {
        let renderer = TextFragmentRenderer::default();
        let ctx = RenderContext::standalone(&renderer);
        let failing = || -> Result<()> {
            let _guard = ctx.push_logical_state("d", "k", json!("inside"));
            Err(FlmError::render("boom"))
        };
        assert!(failing().is_err());
        assert_eq!(ctx.logical_state("d", "k"), None);
    }

    #[test]
    fn test_standalone_refuses_features_and_delayed_nodes() {
        let renderer = TextFragmentRenderer::default();
        let ctx = RenderContext::standalone(&renderer);
        assert!(ctx.is_standalone());
        assert!(ctx.is_first_pass());
        assert!(!ctx.supports_feature("refs"));

        let err = ctx
            .render_manager::<crate::feature::refs::RefsRenderManager>("refs")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "There are no document features when rendering FLM text in standalone mode (requested ‘refs’)"
        );

        let context = std::sync::Arc::new(crate::ast::ParsingContext::new("x", "test"));
        let node = Node::new(
            crate::ast::NodeKind::Characters("x".to_string()),
            crate::ast::Range::default(),
            context,
        );
        let err = ctx.register_delayed(&node).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot render nodes with delayed content in standalone mode"
        );
    }

    #[test]
    fn test_delayed_key_follows_node_id() {
        let context = std::sync::Arc::new(crate::ast::ParsingContext::new("x", "test"));
        let node = Node::new(
            crate::ast::NodeKind::Characters("x".to_string()),
            crate::ast::Range::default(),
            context,
        );
        let key = DelayedKey::from(node.id());
        assert_eq!(key.0, node.id().value());
        assert_eq!(key.to_string(), node.id().to_string());
    }
}
