//! One parsed unit of markup
//!
//!     A fragment is cheap to clone and immutable. It stays bound to the environment
//!     that parsed it, since rendering needs the same vocabulary and features.

use crate::ast::{NodeList, ParsingContext, ResourceInfo};
use crate::environment::Environment;
use crate::error::Result;
use crate::render_context::RenderContext;
use crate::renderer::FragmentRenderer;
use std::fmt;
use std::sync::Arc;

struct FragmentData {
    environment: Arc<Environment>,
    nodes: NodeList,
    is_block_level: bool,
    context: Arc<ParsingContext>,
}

#[derive(Clone)]
pub struct Fragment(Arc<FragmentData>);

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("what", &self.0.context.what)
            .field("is_block_level", &self.0.is_block_level)
            .field("standalone_mode", &self.0.context.standalone_mode)
            .field("nodes", &self.0.nodes.len())
            .finish()
    }
}

impl Fragment {
    pub(crate) fn new(
        environment: Arc<Environment>,
        nodes: NodeList,
        is_block_level: bool,
        context: Arc<ParsingContext>,
    ) -> Self {
        Fragment(Arc::new(FragmentData {
            environment,
            nodes,
            is_block_level,
            context,
        }))
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.0.environment
    }

    pub fn nodes(&self) -> &NodeList {
        &self.0.nodes
    }

    pub fn is_block_level(&self) -> bool {
        self.0.is_block_level
    }

    pub fn source(&self) -> &str {
        &self.0.context.source
    }

    pub fn what(&self) -> &str {
        &self.0.context.what
    }

    pub fn standalone_mode(&self) -> bool {
        self.0.context.standalone_mode
    }

    pub fn resource_info(&self) -> Option<&ResourceInfo> {
        self.0.context.resource_info.as_ref()
    }

    pub fn line_offset(&self) -> usize {
        self.0.context.line_offset
    }

    /// Render without a document: no features, no delayed content.
    pub fn render_standalone(&self, renderer: &dyn FragmentRenderer) -> Result<String> {
        let ctx = RenderContext::standalone(renderer);
        renderer.render_fragment(self, &ctx)
    }
}
