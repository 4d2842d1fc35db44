//! Parsing environment
//!
//!     An [`Environment`] is the frozen combination of a markup parser, a set of features
//!     and the vocabulary they define. It is built once and shared (`Arc`) by every
//!     fragment and document created from it.
//!
//!     Features are ordered so that each comes after its dependencies. The order does not
//!     depend on the order the features were given in: independent features are taken
//!     alphabetically, and a feature whose last dependency was just placed joins the back
//!     of the queue.

use crate::ast::{BlockMode, ParsingContext, ResourceInfo};
use crate::blocks;
use crate::error::{FlmError, Result};
use crate::feature::Feature;
use crate::fragment::Fragment;
use crate::parsing::{LatexLikeReader, MarkupParser};
use crate::specinfo::{Definitions, ParagraphBreakSpec};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// How a fragment is built from source text.
#[derive(Debug, Clone)]
pub struct FragmentOptions {
    /// Short description for messages, e.g. "document body"
    pub what: String,
    /// `None` infers the mode from the content.
    pub is_block_level: Option<bool>,
    pub standalone_mode: bool,
    pub resource_info: Option<ResourceInfo>,
    /// Line of the source's first line within its enclosing file.
    pub line_offset: usize,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self {
            what: "(unknown)".to_string(),
            is_block_level: None,
            standalone_mode: false,
            resource_info: None,
            line_offset: 0,
        }
    }
}

impl FragmentOptions {
    pub fn new(what: &str) -> Self {
        Self {
            what: what.to_string(),
            ..Self::default()
        }
    }
}

pub struct Environment {
    features: Vec<Arc<dyn Feature>>,
    definitions: Definitions,
    parser: Box<dyn MarkupParser>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field(
                "features",
                &self.features.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .field("parser", &self.parser)
            .finish()
    }
}

impl Environment {
    pub fn new(features: Vec<Arc<dyn Feature>>) -> Result<Arc<Self>> {
        Self::with_parser(features, Box::new(LatexLikeReader))
    }

    pub fn with_parser(features: Vec<Arc<dyn Feature>>, parser: Box<dyn MarkupParser>) -> Result<Arc<Self>> {
        let features = sort_features(features)?;

        let mut definitions = core_definitions();
        for feature in &features {
            definitions.merge(feature.definitions());
        }

        log::debug!(
            "environment ready with features: {}",
            features.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(Arc::new(Self {
            features,
            definitions,
            parser,
        }))
    }

    /// Features in dependency order.
    pub fn features(&self) -> &[Arc<dyn Feature>] {
        &self.features
    }

    pub fn feature(&self, name: &str) -> Option<&Arc<dyn Feature>> {
        self.features.iter().find(|f| f.name() == name)
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Parse `source` and check the block structure of every node list in it.
    pub fn make_fragment(self: &Arc<Self>, source: &str, options: FragmentOptions) -> Result<Fragment> {
        let context = Arc::new(ParsingContext {
            source: Arc::from(source),
            what: options.what,
            resource_info: options.resource_info,
            standalone_mode: options.standalone_mode,
            line_offset: options.line_offset,
        });
        let mode = BlockMode::from_forced(options.is_block_level);
        let built = self
            .parser
            .parse(&context, &self.definitions, mode)
            .and_then(|nodes| {
                let is_block_level = blocks::validate_tree(&nodes, options.is_block_level)?;
                Ok((nodes, is_block_level))
            });
        match built {
            Ok((nodes, is_block_level)) => {
                Ok(Fragment::new(self.clone(), nodes, is_block_level, context))
            }
            Err(err) => {
                log::debug!("error compiling fragment for {}: {}", context.what, err);
                Err(err)
            }
        }
    }
}

/// Vocabulary every environment has.
fn core_definitions() -> Definitions {
    Definitions::new()
        .with_specials("\n\n", Arc::new(ParagraphBreakSpec))
        .with_macro("par", Arc::new(ParagraphBreakSpec))
}

/// Kahn's algorithm over the dependency graph.
fn sort_features(features: Vec<Arc<dyn Feature>>) -> Result<Vec<Arc<dyn Feature>>> {
    let mut by_name: BTreeMap<String, Arc<dyn Feature>> = BTreeMap::new();
    for feature in features {
        let name = feature.name().to_string();
        if by_name.contains_key(&name) {
            return Err(FlmError::configuration(format!(
                "Duplicate feature detected: ‘{}’",
                name
            )));
        }
        by_name.insert(name, feature);
    }

    for (name, feature) in &by_name {
        for dependency in feature.dependencies() {
            if !by_name.contains_key(&dependency) {
                return Err(FlmError::configuration(format!(
                    "Feature ‘{}’ has unmet dependency ‘{}’",
                    name, dependency
                )));
            }
        }
    }

    // Remaining incoming edges: feature → features it still waits for
    let mut waiting: BTreeMap<String, Vec<String>> = by_name
        .iter()
        .map(|(name, feature)| {
            let mut deps: Vec<String> = feature
                .dependencies()
                .into_iter()
                .chain(
                    feature
                        .optional_dependencies()
                        .into_iter()
                        .filter(|d| by_name.contains_key(d)),
                )
                .collect();
            deps.sort();
            deps.dedup();
            (name.clone(), deps)
        })
        .collect();

    let mut queue: VecDeque<String> = waiting
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| name.clone())
        .collect();

    let mut sorted = Vec::with_capacity(by_name.len());
    while let Some(name) = queue.pop_front() {
        let dependents: Vec<String> = waiting
            .iter()
            .filter(|(_, deps)| deps.contains(&name))
            .map(|(dependent, _)| dependent.clone())
            .collect();
        for dependent in dependents {
            if let Some(deps) = waiting.get_mut(&dependent) {
                deps.retain(|d| *d != name);
                if deps.is_empty() {
                    queue.push_back(dependent);
                }
            }
        }
        if let Some(feature) = by_name.get(&name) {
            sorted.push(feature.clone());
        }
    }

    let problematic: Vec<String> = waiting
        .iter()
        .filter(|(_, deps)| !deps.is_empty())
        .map(|(name, deps)| {
            format!(
                "‘{}’ → {}",
                name,
                deps.iter()
                    .map(|d| format!("‘{}’", d))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
        .collect();
    if !problematic.is_empty() {
        return Err(FlmError::configuration(format!(
            "The feature dependency graph has a cycle! Problematic dependencies: {}",
            problematic.join("; ")
        )));
    }

    Ok(sorted)
}
