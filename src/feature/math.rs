//! Display equations and equation references
//!
//!     Math environments keep their body as raw TeX. Lines are split at top-level `\\`;
//!     each line may carry `\label{eq:...}`, `\tag{...}`, `\tag*{...}` or `\nonumber`.
//!     Numbered lines get an explicit `\tag*{(n)}` so that the output does not depend on
//!     the math renderer's own numbering.

use crate::ast::{MathDisplay, Node, NodeId};
use crate::counter::{Counter, CounterFormatter, FormatNum, JoinSpec};
use crate::error::{FlmError, Result};
use crate::feature::refs::{self, RefInstance, RefsRenderManager};
use crate::feature::{DocumentManagers, EntityKey, Feature, FeatureOptions, RenderManager};
use crate::render_context::RenderContext;
use crate::renderer::MathContent;
use crate::specinfo::{split_label, ArgumentSpec, BodySpec, Definitions, SpecInfo};
use flm_config::MathConfig;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub const FEATURE_NAME: &str = "math";

/// Counter formatter id used by equation references.
pub const EQUATION_FORMATTER_ID: &str = "eq";

pub fn default_counter_formatter() -> Result<CounterFormatter> {
    Ok(CounterFormatter::new(FormatNum::template("(${arabic})")?)
        .with_prefix("Eq.~", "Eqs.~")
        .with_delimiters("", "")
        .with_join_spec(JoinSpec::compact())
        .with_id(EQUATION_FORMATTER_ID))
}

#[derive(Debug, Clone)]
pub struct MathFeature {
    environments: Vec<String>,
    eqref_macro: Option<String>,
    eqref_ref_type: String,
    counter_formatter: CounterFormatter,
}

impl MathFeature {
    pub fn new() -> Result<Self> {
        Ok(Self {
            environments: ["equation", "equation*", "align", "align*", "gather", "gather*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            eqref_macro: Some("eqref".to_string()),
            eqref_ref_type: "eq".to_string(),
            counter_formatter: default_counter_formatter()?,
        })
    }

    pub fn from_config(config: &MathConfig) -> Result<Self> {
        Ok(Self {
            environments: config.environments.clone(),
            eqref_macro: Some(config.eqref_macro.clone()).filter(|m| !m.is_empty()),
            eqref_ref_type: config.eqref_ref_type.clone(),
            counter_formatter: CounterFormatter::from_config(
                &config.counter_formatter,
                default_counter_formatter()?,
                EQUATION_FORMATTER_ID,
            )?,
        })
    }
}

impl Feature for MathFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Mathematical typesetting: equations and equation references"
    }

    fn optional_dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new();
        for name in &self.environments {
            defs.add_environment(
                name,
                Arc::new(MathEnvironmentSpec {
                    is_numbered: !name.ends_with('*'),
                }),
            );
        }
        if let Some(eqref) = &self.eqref_macro {
            defs.add_macro(
                eqref,
                Arc::new(EqrefSpec {
                    ref_type: self.eqref_ref_type.clone(),
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
        Ok(Some(Box::new(MathRenderManager::new(
            self.counter_formatter.clone(),
        ))))
    }
}

/// Number (or custom tag) given to one equation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquationInfo {
    pub eq_id: String,
    pub formatted_ref_flm_text: String,
    pub number: Option<u64>,
}

#[derive(Debug)]
pub struct MathRenderManager {
    counter: Counter,
    equations: HashMap<(NodeId, usize), EquationInfo>,
}

impl RenderManager for MathRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn initialize(&mut self, ctx: &RenderContext<'_>) -> Result<()> {
        if ctx.supports_feature(refs::FEATURE_NAME) {
            ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?
                .register_counter_formatter(self.counter.formatter.clone())?;
        }
        Ok(())
    }
}

impl MathRenderManager {
    pub fn new(counter_formatter: CounterFormatter) -> Self {
        Self {
            counter: Counter::new(counter_formatter),
            equations: HashMap::new(),
        }
    }

    /// Number line `lineno` of `node`. The same line always gets the same number.
    pub fn new_numbered_display_math(
        &mut self,
        node: &Node,
        lineno: usize,
        custom_tag_flm_text: Option<&str>,
    ) -> EquationInfo {
        let key = (node.id(), lineno);
        if let Some(info) = self.equations.get(&key) {
            return info.clone();
        }
        let info = match custom_tag_flm_text {
            Some(tag) => EquationInfo {
                eq_id: format!("_{}-{}", node.id(), lineno),
                formatted_ref_flm_text: tag.to_string(),
                number: None,
            },
            None => {
                let (number, formatted) = self.counter.step_and_format();
                EquationInfo {
                    eq_id: number.to_string(),
                    formatted_ref_flm_text: formatted,
                    number: Some(number),
                }
            }
        };
        log::debug!("equation line {} of node #{} tagged {}", lineno, node.id(), info.formatted_ref_flm_text);
        self.equations.insert(key, info.clone());
        info
    }
}

/// What one line of a display equation carries besides its math.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquationLine {
    pub labels: Vec<(String, String)>,
    pub custom_tag: Option<String>,
    pub nonumber: bool,
    /// Byte offset in the body where the line's tag is inserted.
    pub tag_offset: usize,
}

impl EquationLine {
    fn is_annotated(&self) -> bool {
        !self.labels.is_empty() || self.custom_tag.is_some() || self.nonumber
    }
}

/// Control sequence name starting at `start` (just after the backslash) and the offset
/// after it.
fn control_sequence(body: &str, start: usize) -> (&str, usize) {
    let rest = &body[start..];
    let letters = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic())
        .map_or(rest.len(), |(j, _)| j);
    if letters > 0 {
        return (&rest[..letters], start + letters);
    }
    match rest.chars().next() {
        Some(c) => (&rest[..c.len_utf8()], start + c.len_utf8()),
        None => ("", start),
    }
}

/// Content of a `{...}` group starting at `start` (after optional whitespace).
fn braced_argument(body: &str, start: usize) -> Option<(&str, usize)> {
    let open = start + body[start..].len() - body[start..].trim_start().len();
    if !body[open..].starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut escaped = false;
    for (j, c) in body[open..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&body[open + 1..open + j], open + j + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn describe_labels(labels: &[(String, String)]) -> String {
    labels
        .iter()
        .map(|(t, l)| if t.is_empty() { format!("‘{}’", l) } else { format!("‘{}:{}’", t, l) })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a math environment body into lines and collect each line's labels and tags.
///
/// Only top-level `\\`, `\label`, `\tag` and `\nonumber` count; the last line is dropped
/// when nothing follows the final `\\`. The last line's tag goes after its last character
/// outside comments.
pub fn scan_equation_lines(body: &str) -> std::result::Result<Vec<EquationLine>, String> {
    let bytes = body.as_bytes();
    let mut lines = Vec::new();
    let mut line = EquationLine::default();
    let mut has_content = false;
    let mut depth = 0usize;
    // end of the last character outside comments
    let mut content_end = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                i = body[i..].find('\n').map_or(bytes.len(), |j| i + j + 1);
                continue;
            }
            b'{' => {
                depth += 1;
                has_content = true;
                content_end = i + 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                has_content = true;
                content_end = i + 1;
            }
            b'\\' => {
                let (name, next) = control_sequence(body, i + 1);
                if depth == 0 {
                    match name {
                        "\\" => {
                            line.tag_offset = i;
                            lines.push(std::mem::take(&mut line));
                            has_content = false;
                            i = next;
                            continue;
                        }
                        "label" => {
                            let (label, after) = braced_argument(body, next)
                                .ok_or_else(|| "Expected ‘{’ after \\label".to_string())?;
                            let (ref_type, ref_label) = split_label(label.trim());
                            line.labels
                                .push((ref_type.unwrap_or("").to_string(), ref_label.to_string()));
                            i = after;
                            content_end = after;
                            continue;
                        }
                        "tag" => {
                            let (starred, arg_start) = match body[next..].strip_prefix('*') {
                                Some(_) => (true, next + 1),
                                None => (false, next),
                            };
                            let (tag, after) = braced_argument(body, arg_start)
                                .ok_or_else(|| "Expected ‘{’ after \\tag".to_string())?;
                            line.custom_tag = Some(if starred {
                                tag.to_string()
                            } else {
                                format!("({})", tag)
                            });
                            i = after;
                            content_end = after;
                            continue;
                        }
                        "nonumber" | "notag" => {
                            line.nonumber = true;
                            i = next;
                            content_end = next;
                            continue;
                        }
                        _ => {}
                    }
                }
                has_content = true;
                i = next;
                content_end = next;
                continue;
            }
            b if !b.is_ascii_whitespace() => {
                has_content = true;
                content_end = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if has_content || line.is_annotated() || lines.is_empty() {
        line.tag_offset = content_end;
        lines.push(line);
    }

    let mut seen: Vec<&(String, String)> = Vec::new();
    for line in &lines {
        for label in &line.labels {
            if seen.contains(&label) {
                return Err(format!(
                    "Duplicate label {} in the same equation",
                    describe_labels(std::slice::from_ref(label))
                ));
            }
            seen.push(label);
        }
        if line.nonumber && (!line.labels.is_empty() || line.custom_tag.is_some()) {
            let mut found = Vec::new();
            if !line.labels.is_empty() {
                found.push(format!("\\label label(s) {}", describe_labels(&line.labels)));
            }
            if let Some(tag) = &line.custom_tag {
                found.push(format!("custom \\tag “{}”", tag));
            }
            return Err(format!(
                "You can't have \\nonumber and \\label/\\tag on the same equation line, found {}",
                found.join(" and ")
            ));
        }
    }
    Ok(lines)
}

/// `equation`, `align*`, ...; starred environments are unnumbered.
#[derive(Debug, Clone)]
pub struct MathEnvironmentSpec {
    pub is_numbered: bool,
}

impl MathEnvironmentSpec {
    fn body_and_lines<'n>(&self, node: &'n Node) -> Result<(&'n str, Vec<EquationLine>)> {
        let body = node
            .invocation()
            .and_then(|inv| inv.body.as_ref())
            .and_then(|body| body.nodes().first())
            .and_then(|n| n.chars())
            .unwrap_or("");
        if !self.is_numbered {
            return Ok((body, Vec::new()));
        }
        let lines = scan_equation_lines(body).map_err(|msg| FlmError::at_node(msg, node))?;
        Ok((body, lines))
    }
}

impl SpecInfo for MathEnvironmentSpec {
    fn body(&self) -> Option<BodySpec> {
        Some(BodySpec::Raw)
    }

    fn is_block_level(&self) -> bool {
        true
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        !self.is_numbered
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.body_and_lines(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let (body, lines) = self.body_and_lines(node)?;
        let env_name = node.invocation().map_or("", |inv| inv.name.as_str());
        let with_refs = ctx.supports_feature(refs::FEATURE_NAME);

        let mut content = String::with_capacity(body.len() + 16 * lines.len());
        let mut copied = 0;
        let mut target_id: Option<String> = None;
        let mut lineno = 0;
        for line in lines.iter().filter(|line| !line.nonumber) {
            let info = ctx
                .render_manager::<MathRenderManager>(FEATURE_NAME)?
                .new_numbered_display_math(node, lineno, line.custom_tag.as_deref());
            lineno += 1;

            // a single target for the whole environment
            let target = target_id
                .get_or_insert_with(|| format!("equation-{}", info.eq_id))
                .clone();

            if line.custom_tag.is_none() {
                content.push_str(&body[copied..line.tag_offset]);
                content.push_str(&format!("\\tag*{{{}}}", info.formatted_ref_flm_text));
                copied = line.tag_offset;
            }

            if with_refs && ctx.is_first_pass() {
                let mut refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
                for (ref_type, ref_label) in &line.labels {
                    let mut reference = RefInstance::new(ref_type, ref_label, &info.formatted_ref_flm_text)
                        .with_target_id(&target);
                    if let Some(number) = info.number {
                        reference = reference.with_counter(number, EQUATION_FORMATTER_ID);
                    }
                    refs_manager.register_reference(
                        EntityKey::from(node),
                        reference,
                        Some(node.range().start),
                    )?;
                }
            }
        }
        content.push_str(&body[copied..]);

        let begin = format!("\\begin{{{}}}", env_name);
        let end = format!("\\end{{{}}}", env_name);
        ctx.renderer().render_math_content(
            &MathContent {
                delimiters: (&begin, &end),
                content: &content,
                display: MathDisplay::Display,
                environment: Some(env_name),
                target_id: target_id.as_deref(),
            },
            ctx,
        )
    }
}

/// `\eqref{eq:label}`: the equation's tag, without the `Eq.~` prefix.
#[derive(Debug, Clone)]
pub struct EqrefSpec {
    pub ref_type: String,
}

impl EqrefSpec {
    fn target(&self, node: &Node) -> Result<(String, String)> {
        let label = node
            .invocation()
            .and_then(|inv| inv.chars_arg("ref_label"))
            .unwrap_or("")
            .trim();
        match split_label(label) {
            (Some(ref_type), ref_label) if ref_type == self.ref_type => {
                Ok((ref_type.to_string(), ref_label.to_string()))
            }
            _ => Err(FlmError::at_node(
                format!(
                    "Equation labels must begin with “{}:” (error in ‘{}’)",
                    self.ref_type,
                    node.display_name()
                ),
                node,
            )),
        }
    }
}

impl SpecInfo for EqrefSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::chars("ref_label")]
    }

    fn delayed_render(&self) -> bool {
        true
    }

    fn finalize(&self, node: Node) -> Result<Node> {
        self.target(&node)?;
        Ok(node)
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let target = self.target(node)?;
        RefsRenderManager::render_refs(
            ctx,
            std::slice::from_ref(&target),
            None,
            node.context().resource_info.as_ref(),
            false,
        )
        .map_err(|err| err.or_at(node.range().start))
    }
}
