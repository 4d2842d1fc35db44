//! Documents and the render driver
//!
//!     A [`Document`] groups fragments of one environment with user metadata and the
//!     document managers of its enabled features. It is created once and may be rendered
//!     any number of times, with any renderer; each render gets a fresh
//!     [`RenderContext`].
//!
//!     [`Document::render_with`] runs the whole sequence:
//!
//!         1. create the render context and every render manager, then initialize them
//!            in feature order;
//!         2. first pass: run the caller's render callback;
//!         3. `process` every render manager, then compute the content of every delayed
//!            node;
//!         4. substitute delayed markers in the result, or run the callback again for
//!            renderers without marker support;
//!         5. `postprocess` every render manager.

use crate::error::{FlmError, Result};
use crate::environment::Environment;
use crate::feature::{DocumentManagers, Feature, FeatureOptions};
use crate::fragment::Fragment;
use crate::render_context::{RenderContext, RenderPass};
use crate::renderer::FragmentRenderer;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Options per feature name.
pub type FeatureOptionsMap = HashMap<String, FeatureOptions>;

#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// Subset of the environment's features; all of them when `None`.
    pub enabled_features: Option<Vec<String>>,
    pub feature_options: FeatureOptionsMap,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct Document {
    environment: Arc<Environment>,
    features: Vec<Arc<dyn Feature>>,
    fragments: Vec<Fragment>,
    metadata: serde_json::Map<String, serde_json::Value>,
    managers: DocumentManagers,
}

impl Document {
    pub fn new(environment: Arc<Environment>, fragments: Vec<Fragment>) -> Result<Self> {
        Self::with_options(environment, fragments, DocumentOptions::default())
    }

    pub fn with_options(
        environment: Arc<Environment>,
        fragments: Vec<Fragment>,
        options: DocumentOptions,
    ) -> Result<Self> {
        for fragment in &fragments {
            if !Arc::ptr_eq(fragment.environment(), &environment) {
                return Err(FlmError::configuration(format!(
                    "Fragment ‘{}’ belongs to a different environment",
                    fragment.what()
                )));
            }
        }

        let features: Vec<Arc<dyn Feature>> = match &options.enabled_features {
            None => environment.features().to_vec(),
            Some(names) => {
                for name in names {
                    if environment.feature(name).is_none() {
                        return Err(FlmError::configuration(format!(
                            "Feature ‘{}’ is not available in this environment",
                            name
                        )));
                    }
                }
                let selected: Vec<Arc<dyn Feature>> = environment
                    .features()
                    .iter()
                    .filter(|f| names.iter().any(|n| n == f.name()))
                    .cloned()
                    .collect();
                for feature in &selected {
                    if let Some(missing) = feature
                        .dependencies()
                        .into_iter()
                        .find(|dependency| !names.contains(dependency))
                    {
                        return Err(FlmError::configuration(format!(
                            "Feature ‘{}’ has unmet dependency ‘{}’ (not enabled for this document)",
                            feature.name(),
                            missing
                        )));
                    }
                }
                selected
            }
        };

        let empty = FeatureOptions::new();
        let mut managers = DocumentManagers::new();
        for feature in &features {
            let feature_options = options.feature_options.get(feature.name()).unwrap_or(&empty);
            let manager = feature.new_document_manager(&mut managers, feature_options)?;
            managers.push(feature.name(), manager);
        }

        Ok(Self {
            environment,
            features,
            fragments,
            metadata: options.metadata,
            managers,
        })
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    pub fn managers(&self) -> &DocumentManagers {
        &self.managers
    }

    pub fn supports_feature(&self, name: &str) -> bool {
        self.managers.contains(name)
    }

    /// Render all fragments, joined as blocks.
    pub fn render(&self, renderer: &dyn FragmentRenderer) -> Result<String> {
        let (value, _ctx) = self.render_with(renderer, &FeatureOptionsMap::new(), |ctx| {
            let parts = self
                .fragments
                .iter()
                .map(|fragment| ctx.renderer().render_fragment(fragment, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(ctx.renderer().render_join_blocks(&parts, ctx))
        })?;
        Ok(value)
    }

    /// Render through `callback`, which may produce any [`Substitutable`] value and may
    /// run twice. Returns the final value and the finished context.
    pub fn render_with<'a, T, F>(
        &'a self,
        renderer: &'a dyn FragmentRenderer,
        options: &FeatureOptionsMap,
        callback: F,
    ) -> Result<(T, RenderContext<'a>)>
    where
        T: Substitutable,
        F: Fn(&RenderContext<'a>) -> Result<T>,
    {
        let mut ctx = RenderContext::for_document(self, renderer);
        let empty = FeatureOptions::new();
        for feature in &self.features {
            let feature_options = options.get(feature.name()).unwrap_or(&empty);
            if let Some(manager) = feature.new_render_manager(&self.managers, feature_options)? {
                ctx.add_render_manager(feature.name(), manager);
            }
        }
        for (_, cell) in ctx.manager_cells() {
            cell.borrow_mut().initialize(&ctx)?;
        }

        renderer.document_render_start(&ctx)?;

        ctx.set_pass(RenderPass::FirstPass);
        let mut value = callback(&ctx)?;

        ctx.set_pass(RenderPass::Finalizing);
        for (_, cell) in ctx.manager_cells() {
            cell.borrow_mut().process(&ctx)?;
        }
        ctx.compute_delayed_content()?;

        if renderer.supports_delayed_markers() {
            let values = ctx.delayed_values();
            value = value.substitute(&|s: &str| renderer.replace_delayed_markers(s, &values))?;
        } else {
            ctx.set_pass(RenderPass::SecondPass);
            value = callback(&ctx)?;
        }

        for (_, cell) in ctx.manager_cells() {
            cell.borrow_mut().postprocess(&ctx)?;
        }

        renderer.document_render_finish(&ctx)?;
        ctx.set_pass(RenderPass::Done);
        log::debug!("document render done");
        Ok((value, ctx))
    }
}

/// A render result whose strings can have delayed markers replaced.
pub trait Substitutable: Sized {
    fn substitute(self, f: &dyn Fn(&str) -> Result<String>) -> Result<Self>;
}

impl Substitutable for String {
    fn substitute(self, f: &dyn Fn(&str) -> Result<String>) -> Result<Self> {
        f(&self)
    }
}

impl<T: Substitutable> Substitutable for Vec<T> {
    fn substitute(self, f: &dyn Fn(&str) -> Result<String>) -> Result<Self> {
        self.into_iter().map(|item| item.substitute(f)).collect()
    }
}

impl<T: Substitutable> Substitutable for BTreeMap<String, T> {
    fn substitute(self, f: &dyn Fn(&str) -> Result<String>) -> Result<Self> {
        self.into_iter()
            .map(|(key, item)| Ok((key, item.substitute(f)?)))
            .collect()
    }
}

impl Substitutable for serde_json::Value {
    fn substitute(self, f: &dyn Fn(&str) -> Result<String>) -> Result<Self> {
        use serde_json::Value;
        Ok(match self {
            Value::String(s) => Value::String(f(&s)?),
            Value::Array(items) => Value::Array(items.substitute(f)?),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, item)| Ok((key, item.substitute(f)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_substitute_nested_values() {
        let upper = |s: &str| -> Result<String> { Ok(s.to_uppercase()) };
        let value = json!({"title": "a", "parts": ["b", {"c": "d"}], "n": 3});
        assert_eq!(
            value.substitute(&upper).unwrap(),
            json!({"title": "A", "parts": ["B", {"c": "D"}], "n": 3})
        );

        let mut map = BTreeMap::new();
        map.insert("body".to_string(), vec!["x".to_string()]);
        let map = map.substitute(&upper).unwrap();
        assert_eq!(map["body"], vec!["X".to_string()]);
    }

    #[derive(Debug)]
    struct Needs(&'static str, Option<&'static str>);

    impl Feature for Needs {
        fn name(&self) -> &str {
            self.0
        }

        fn dependencies(&self) -> Vec<String> {
            self.1.iter().map(|d| d.to_string()).collect()
        }
    }

    #[test]
    fn test_enabled_subset_keeps_hard_dependencies() {
        let features: Vec<Arc<dyn Feature>> = vec![
            Arc::new(Needs("refs", None)),
            Arc::new(Needs("floats", Some("refs"))),
            Arc::new(Needs("endnotes", None)),
        ];
        let env = Environment::new(features).unwrap();
        let subset = |names: &[&str]| DocumentOptions {
            enabled_features: Some(names.iter().map(|n| n.to_string()).collect()),
            ..DocumentOptions::default()
        };

        let err = Document::with_options(env.clone(), Vec::new(), subset(&["floats"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Feature ‘floats’ has unmet dependency ‘refs’ (not enabled for this document)"
        );

        let doc = Document::with_options(env, Vec::new(), subset(&["refs", "floats"])).unwrap();
        assert!(doc.supports_feature("floats"));
        assert!(!doc.supports_feature("endnotes"));
    }

    #[test]
    fn test_unknown_enabled_feature() {
        let env = Environment::new(Vec::new()).unwrap();
        let err = Document::with_options(
            env,
            Vec::new(),
            DocumentOptions {
                enabled_features: Some(vec!["refs".to_string()]),
                ..DocumentOptions::default()
            },
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Feature ‘refs’ is not available in this environment"
        );
    }
}
