//! Feature plugins
//!
//!     A feature bundles vocabulary (macros, environments, specials) with the state it
//!     needs while documents are built and rendered. State lives at two scopes:
//!
//!         - a [`DocumentManager`], created once per [`Document`](crate::document::Document)
//!           and shared by all its renders (endnote categories, citation providers, ...);
//!         - a [`RenderManager`], created for each render call and dropped with its
//!           [`RenderContext`] (registered references, endnote instances, counters, ...).
//!
//!     Managers are created in the environment's dependency order, so a manager may look
//!     up the managers of the features it depends on.

pub mod baseformatting;
pub mod citations;
pub mod defterm;
pub mod endnotes;
pub mod enumeration;
pub mod floats;
pub mod headings;
pub mod math;
pub mod refs;
pub mod theorems;

use crate::ast::{Node, NodeId};
use crate::error::{FlmError, Result};
use crate::render_context::RenderContext;
use crate::specinfo::Definitions;
use std::any::Any;
use std::fmt;

/// Options handed to a feature's managers.
pub type FeatureOptions = serde_json::Map<String, serde_json::Value>;

pub trait Feature: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn title(&self) -> &str {
        self.name()
    }

    /// Features that must be present in the same environment.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Features that, when present, must come first.
    fn optional_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn definitions(&self) -> Definitions {
        Definitions::new()
    }

    fn new_document_manager(
        &self,
        _earlier: &mut DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn DocumentManager>>> {
        Ok(None)
    }

    fn new_render_manager(
        &self,
        _documents: &DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        Ok(None)
    }
}

/// Per-document state of a feature.
pub trait DocumentManager: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-render state of a feature.
pub trait RenderManager: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once all render managers of the context exist.
    fn initialize(&mut self, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after the first pass, before delayed content is computed.
    fn process(&mut self, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once the final value is known.
    fn postprocess(&mut self, _ctx: &RenderContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// What a registration (a reference, an endnote, a citation) belongs to. Registering
/// twice under the same key is a no-op, so the same node may be rendered again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Node(NodeId),
    Key(Vec<String>),
}

impl From<NodeId> for EntityKey {
    fn from(id: NodeId) -> Self {
        EntityKey::Node(id)
    }
}

impl From<&Node> for EntityKey {
    fn from(node: &Node) -> Self {
        EntityKey::Node(node.id())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Node(id) => write!(f, "node #{}", id),
            EntityKey::Key(parts) => write!(f, "({})", parts.join(", ")),
        }
    }
}

/// Document managers of a document, in feature order.
#[derive(Debug, Default)]
pub struct DocumentManagers {
    managers: Vec<(String, Option<Box<dyn DocumentManager>>)>,
}

impl DocumentManagers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature_name: &str, manager: Option<Box<dyn DocumentManager>>) {
        self.managers.push((feature_name.to_string(), manager));
    }

    /// True if the feature is enabled, whether or not it has a document manager.
    pub fn contains(&self, feature_name: &str) -> bool {
        self.managers.iter().any(|(name, _)| name == feature_name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.managers.iter().map(|(name, _)| name.as_str())
    }

    pub fn get<M: DocumentManager>(&self, feature_name: &str) -> Option<&M> {
        self.managers
            .iter()
            .find(|(name, _)| name == feature_name)
            .and_then(|(_, manager)| manager.as_ref())
            .and_then(|manager| manager.as_any().downcast_ref::<M>())
    }

    pub fn get_mut<M: DocumentManager>(&mut self, feature_name: &str) -> Option<&mut M> {
        self.managers
            .iter_mut()
            .find(|(name, _)| name == feature_name)
            .and_then(|(_, manager)| manager.as_mut())
            .and_then(|manager| manager.as_any_mut().downcast_mut::<M>())
    }
}

/// Read a boolean option, falling back to `default` when absent.
pub fn option_bool(options: &FeatureOptions, key: &str, default: bool) -> Result<bool> {
    match options.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Bool(value)) => Ok(*value),
        Some(other) => Err(FlmError::configuration(format!(
            "Option ‘{}’ must be a boolean, got {}",
            key, other
        ))),
    }
}

/// Read a string option.
pub fn option_str<'o>(options: &'o FeatureOptions, key: &str) -> Result<Option<&'o str>> {
    match options.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(FlmError::configuration(format!(
            "Option ‘{}’ must be a string, got {}",
            key, other
        ))),
    }
}

/// Read a small unsigned integer option.
pub fn option_u8(options: &FeatureOptions, key: &str) -> Result<Option<u8>> {
    match options.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                FlmError::configuration(format!(
                    "Option ‘{}’ must be a small non-negative integer, got {}",
                    key, value
                ))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Counts {
        value: u32,
    }

    impl DocumentManager for Counts {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_document_managers_lookup() {
        let mut managers = DocumentManagers::new();
        managers.push("counts", Some(Box::new(Counts::default())));
        managers.push("plain", None);

        managers.get_mut::<Counts>("counts").unwrap().value = 3;
        assert_eq!(managers.get::<Counts>("counts").unwrap().value, 3);
        assert!(managers.contains("plain"));
        assert!(managers.get::<Counts>("plain").is_none());
        assert!(!managers.contains("other"));
        assert_eq!(managers.feature_names().collect::<Vec<_>>(), vec!["counts", "plain"]);
    }

    #[test]
    fn test_option_readers() {
        let options: FeatureOptions = json!({"flag": true, "title": "Notes", "level": 2, "bad": "x"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(option_bool(&options, "flag", false).unwrap());
        assert!(!option_bool(&options, "missing", false).unwrap());
        assert_eq!(option_str(&options, "title").unwrap(), Some("Notes"));
        assert_eq!(option_u8(&options, "level").unwrap(), Some(2));
        assert!(option_bool(&options, "bad", false).is_err());
        assert!(option_u8(&options, "bad").is_err());
    }
}
