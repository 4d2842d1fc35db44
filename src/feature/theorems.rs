//! Theorems, definitions, proofs and their kin
//!
//!     Each configured environment (`theorem`, `lemma`, `proof`, ...) belongs to a theorem
//!     type that decides how it is numbered and how its heading reads. Types with shared
//!     numbering draw from one counter, so a lemma after Theorem 1 is Lemma 2. The heading
//!     runs into the first paragraph of the body: `Theorem 2 (Pythagoras).  ...`
//!
//!     Labels of numbered environments are registered with refs and target `{env}-{n}`.
//!     A proof title `[*thm:main]` names the theorem it proves; `[**thm:main]` records the
//!     relation without showing it. The related theorem must come first.

use crate::ast::{BlockMode, Node, NodeId, NodeKind, NodeList};
use crate::counter::{Counter, CounterFormatter, FormatNum};
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, RefInstance, RefsRenderManager};
use crate::feature::{DocumentManagers, EntityKey, Feature, FeatureOptions, RenderManager};
use crate::render_context::RenderContext;
use crate::renderer::HeadingLevel;
use crate::specinfo::{collect_labels, split_label, ArgumentSpec, BodySpec, Definitions, SpecInfo};
use flm_config::{TheoremTypeConfig, TheoremsConfig};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "theorems";

const SHARED_COUNTER_ID: &str = "_theorems_shared";

/// Numbering and heading layout shared by a family of environments.
#[derive(Debug, Clone)]
pub struct TheoremType {
    pub name: String,
    pub numbered: bool,
    pub shared_numbering: bool,
    pub heading_title_pre: String,
    pub heading_title_post: String,
    pub title_enable_relation_ref: bool,
    pub body_final_content: String,
}

impl TheoremType {
    fn from_config(config: &TheoremTypeConfig) -> Self {
        Self {
            name: config.name.clone(),
            numbered: config.numbered,
            shared_numbering: config.shared_numbering,
            heading_title_pre: config.heading_title_pre.clone(),
            heading_title_post: config.heading_title_post.clone(),
            title_enable_relation_ref: config.title_enable_relation_ref,
            body_final_content: config.body_final_content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TheoremEnvironment {
    pub name: String,
    /// `Theorem`
    pub title: String,
    pub theorem_type: TheoremType,
    /// Formatter with the title as prefix; numbered environments only.
    pub counter_formatter: Option<CounterFormatter>,
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct TheoremsFeature {
    environments: Vec<TheoremEnvironment>,
    shared_counter_formatter: CounterFormatter,
    allowed_ref_label_prefixes: Vec<String>,
}

impl TheoremsFeature {
    pub fn from_config(config: &TheoremsConfig) -> Result<Self> {
        let shared_counter_formatter = CounterFormatter::from_config(
            &config.shared_counter_formatter,
            CounterFormatter::new(FormatNum::named("arabic")?),
            SHARED_COUNTER_ID,
        )?;

        let mut environments: Vec<TheoremEnvironment> = Vec::with_capacity(config.environments.len());
        for env in &config.environments {
            if environments.iter().any(|e| e.name == env.name) {
                return Err(FlmError::configuration(format!(
                    "Duplicate definition of theorem environment ‘{}’",
                    env.name
                )));
            }
            let type_config = config
                .types
                .iter()
                .find(|t| t.name == env.theorem_type)
                .ok_or_else(|| {
                    FlmError::configuration(format!(
                        "Theorem environment ‘{}’ has unknown theorem type ‘{}’",
                        env.name, env.theorem_type
                    ))
                })?;
            let title = env.title.clone().unwrap_or_else(|| capitalize(&env.name));
            let title_plural = env.title_plural.clone().unwrap_or_else(|| format!("{}s", title));

            let counter_formatter = if type_config.numbered {
                let defaults = shared_counter_formatter.clone();
                let formatter = match &type_config.counter_formatter {
                    Some(spec) => CounterFormatter::from_config(spec, defaults, &env.name)?,
                    None => defaults.with_id(&env.name),
                };
                Some(formatter.with_prefix(&format!("{}~", title), &format!("{}~", title_plural)))
            } else {
                None
            };

            environments.push(TheoremEnvironment {
                name: env.name.clone(),
                title,
                theorem_type: TheoremType::from_config(type_config),
                counter_formatter,
            });
        }

        Ok(Self {
            environments,
            shared_counter_formatter,
            allowed_ref_label_prefixes: config.allowed_ref_label_prefixes.clone(),
        })
    }
}

impl Feature for TheoremsFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Theorems, proofs, definitions, etc."
    }

    fn dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for env in &self.environments {
            defs.add_environment(
                &env.name,
                Arc::new(TheoremSpec {
                    environment: env.clone(),
                    allowed_ref_label_prefixes: self.allowed_ref_label_prefixes.clone(),
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
        Ok(Some(Box::new(TheoremsRenderManager::new(
            &self.environments,
            self.shared_counter_formatter.clone(),
        ))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheoremInstance {
    pub number: u64,
    /// `Theorem~1`
    pub formatted_heading: String,
    pub target_id: String,
}

#[derive(Debug)]
pub struct TheoremsRenderManager {
    shared: Counter,
    /// Environments numbered on their own.
    own: HashMap<String, Counter>,
    formatters: HashMap<String, (CounterFormatter, bool)>,
    instances: HashMap<NodeId, TheoremInstance>,
}

impl RenderManager for TheoremsRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn initialize(&mut self, ctx: &RenderContext<'_>) -> Result<()> {
        let mut refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
        for (formatter, _) in self.formatters.values() {
            refs_manager.register_counter_formatter(formatter.clone())?;
        }
        Ok(())
    }
}

impl TheoremsRenderManager {
    pub fn new(environments: &[TheoremEnvironment], shared_formatter: CounterFormatter) -> Self {
        let mut own = HashMap::new();
        let mut formatters = HashMap::new();
        for env in environments {
            let Some(formatter) = &env.counter_formatter else {
                continue;
            };
            let shared = env.theorem_type.shared_numbering;
            if !shared {
                own.insert(env.name.clone(), Counter::new(formatter.clone()));
            }
            formatters.insert(env.name.clone(), (formatter.clone(), shared));
        }
        Self {
            shared: Counter::new(shared_formatter),
            own,
            formatters,
            instances: HashMap::new(),
        }
    }

    /// Number a theorem-like node. The same node keeps its number on later passes.
    pub fn register_theorem(&mut self, node: &Node, env_name: &str) -> Result<TheoremInstance> {
        if let Some(found) = self.instances.get(&node.id()) {
            return Ok(found.clone());
        }
        let (formatter, shared) = self.formatters.get(env_name).cloned().ok_or_else(|| {
            FlmError::at_node(format!("Theorem environment ‘{}’ is not numbered", env_name), node)
        })?;
        let number = if shared {
            self.shared.step()
        } else {
            self.own
                .get_mut(env_name)
                .map(Counter::step)
                .ok_or_else(|| FlmError::at_node(format!("No counter for ‘{}’", env_name), node))?
        };
        let instance = TheoremInstance {
            number,
            formatted_heading: formatter.format_flm(number, true, true),
            target_id: format!("{}-{}", env_name, number),
        };
        log::debug!("registered {} {}", env_name, number);
        self.instances.insert(node.id(), instance.clone());
        Ok(instance)
    }
}

/// What the optional `[...]` after `\begin{theorem}` says.
#[derive(Debug)]
enum TheoremTitle<'n> {
    Absent,
    Text(&'n NodeList),
    /// `[*type:label]` shows the referenced theorem, `[**type:label]` hides it.
    RelationRef { target: (String, String), show: bool },
}

#[derive(Debug, Clone)]
pub struct TheoremSpec {
    pub environment: TheoremEnvironment,
    pub allowed_ref_label_prefixes: Vec<String>,
}

impl TheoremSpec {
    fn title<'n>(&self, node: &'n Node) -> Result<TheoremTitle<'n>> {
        let Some(title) = node.invocation().and_then(|inv| inv.nodes_arg("thmtitle")) else {
            return Ok(TheoremTitle::Absent);
        };
        if !self.environment.theorem_type.title_enable_relation_ref {
            return Ok(TheoremTitle::Text(title));
        }
        let relation = match title.nodes().first().map(Node::kind) {
            Some(NodeKind::Characters(chars)) if chars.starts_with('*') => chars,
            _ => return Ok(TheoremTitle::Text(title)),
        };
        if title.len() != 1 {
            return Err(FlmError::at_node(
                format!(
                    "When specifying a proof-ref target as optional argument (‘[*thm:xyz]’), the entire argument must consist of regular characters with no special meaning in FLM.  Got: ‘{}’",
                    title.verbatim()
                ),
                node,
            ));
        }
        let (label, show) = match relation.strip_prefix("**") {
            Some(label) => (label, false),
            None => (&relation[1..], true),
        };
        let (ref_type, ref_label) = split_label(label.trim());
        Ok(TheoremTitle::RelationRef {
            target: (ref_type.unwrap_or("").to_string(), ref_label.to_string()),
            show,
        })
    }

    fn labels(&self, node: &Node) -> Result<Vec<(String, String)>> {
        let prefixes: Vec<&str> = self.allowed_ref_label_prefixes.iter().map(String::as_str).collect();
        let labels = match node.invocation() {
            Some(inv) => collect_labels(inv.tacked_on("label"), &prefixes)?,
            None => Vec::new(),
        };
        if !labels.is_empty() && self.environment.counter_formatter.is_none() {
            return Err(FlmError::at_node(
                format!(
                    "You cannot use \\label{{}} in unnumbered theorem environment ‘{}’",
                    self.environment.name
                ),
                node,
            ));
        }
        Ok(labels)
    }

    fn render_heading(&self, node: &Node, ctx: &RenderContext<'_>, labels: &[(String, String)]) -> Result<String> {
        let env = &self.environment;
        let renderer = ctx.renderer();

        let (main, target_id) = if env.counter_formatter.is_some() {
            let instance = ctx
                .render_manager::<TheoremsRenderManager>(FEATURE_NAME)?
                .register_theorem(node, &env.name)?;
            if ctx.is_first_pass() {
                let mut refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
                for (ref_type, ref_label) in labels {
                    let reference = RefInstance::new(ref_type, ref_label, &instance.formatted_heading)
                        .with_target_id(&instance.target_id)
                        .with_counter(instance.number, &env.name);
                    refs_manager.register_reference(EntityKey::from(node), reference, Some(node.range().start))?;
                }
            }
            (
                ctx.render_flm_text(&instance.formatted_heading, "theorem heading")?,
                Some(instance.target_id),
            )
        } else {
            (renderer.render_value(&env.title, ctx)?, None)
        };

        let title = match self.title(node)? {
            TheoremTitle::Absent | TheoremTitle::RelationRef { show: false, .. } => None,
            TheoremTitle::Text(title) => Some(renderer.render_nodelist(title, ctx, Some(false))?),
            TheoremTitle::RelationRef { target, show: true } => Some(
                RefsRenderManager::render_refs(
                    ctx,
                    std::slice::from_ref(&target),
                    None,
                    node.context().resource_info.as_ref(),
                    true,
                )
                .map_err(|err| err.or_at(node.range().start))?,
            ),
        };

        let content = match title {
            Some(title) => format!(
                "{}{}{}{}",
                main,
                renderer.render_value(&env.theorem_type.heading_title_pre, ctx)?,
                title,
                renderer.render_value(&env.theorem_type.heading_title_post, ctx)?
            ),
            None => main,
        };
        renderer.render_heading(&content, HeadingLevel::Theorem, true, target_id.as_deref(), ctx)
    }
}

impl SpecInfo for TheoremSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::optional("thmtitle"), ArgumentSpec::labels("label")]
    }

    fn body(&self) -> Option<BodySpec> {
        Some(BodySpec::Parsed(BlockMode::Block))
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.title(&node)?;
        self.labels(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let env = &self.environment;
        let labels = self.labels(node)?;
        let body = node
            .invocation()
            .and_then(|inv| inv.body.as_ref())
            .ok_or_else(|| FlmError::at_node(format!("{} environment has no body", env.name), node))?;

        let renderer = ctx.renderer();
        let heading = self.render_heading(node, ctx, &labels)?;
        let trail = renderer.render_value(&env.theorem_type.body_final_content, ctx)?;
        let content = renderer.render_blocks_with(&heading, body, &trail, ctx)?;
        renderer.render_semantic_block(
            &content,
            &env.theorem_type.name,
            &[env.name.clone()],
            None,
            ctx,
        )
    }
}
