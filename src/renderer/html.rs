//! HTML backend
//!
//!     Delayed content is written as `<FLM:DLYD:key/>` markers, which cannot occur in any
//!     HTML this backend produces, and substituted once the document is complete. Math is
//!     left as escaped TeX inside `<span class="inline-math">` / `display-math` for
//!     MathJax to pick up.

use super::{
    render_item_tag, EnumerationOptions, FragmentRenderer, GraphicsResource, HeadingLevel,
    ItemTag, MathContent, RenderedFloat, VerbatimOptions,
};
use crate::ast::{Node, NodeList};
use crate::error::{FlmError, Result};
use crate::render_context::{DelayedKey, RenderContext};
use flm_config::HtmlRenderConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static DELAYED_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<FLM:DLYD:(?P<key>\d+)\s*/>").unwrap());

const SPACE_ENTITIES: [(char, &str); 7] = [
    ('\u{00A0}', "&nbsp;"),
    ('\u{200A}', "&hairsp;"),
    ('\u{2009}', "&thinsp;"),
    ('\u{2008}', "&puncsp;"),
    ('\u{2002}', "&ensp;"),
    ('\u{2003}', "&emsp;"),
    ('\u{2007}', "&numsp;"),
];

#[derive(Debug, Clone)]
pub struct HtmlFragmentRenderer {
    /// Open external links in a new tab.
    pub use_link_target_blank: bool,
    /// Tag for heading levels 1 to 6.
    pub heading_tags_by_level: Vec<String>,
    pub inline_heading_add_space: bool,
    pub render_nothing_as_comment_with_annotations: bool,
    pub blocks_joiner: String,
}

impl Default for HtmlFragmentRenderer {
    fn default() -> Self {
        Self {
            use_link_target_blank: false,
            heading_tags_by_level: ["h1", "h2", "h3", "span", "span", "span"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            inline_heading_add_space: true,
            render_nothing_as_comment_with_annotations: true,
            blocks_joiner: "\n".to_string(),
        }
    }
}

impl HtmlFragmentRenderer {
    pub fn from_config(config: &HtmlRenderConfig) -> Self {
        Self {
            use_link_target_blank: config.use_link_target_blank,
            heading_tags_by_level: config.heading_tags_by_level.clone(),
            inline_heading_add_space: config.inline_heading_add_space,
            render_nothing_as_comment_with_annotations: config
                .render_nothing_as_comment_with_annotations,
            ..Self::default()
        }
    }

    pub fn htmlescape(&self, value: &str) -> String {
        let mut escaped = html_escape::encode_text(value).into_owned();
        for (space, entity) in SPACE_ENTITIES {
            if escaped.contains(space) {
                escaped = escaped.replace(space, entity);
            }
        }
        escaped
    }

    fn open_tag(&self, tag: &str, attrs: &[(&str, &str)], class_names: &[String]) -> String {
        let mut s = format!("<{}", tag);
        for (name, value) in attrs {
            s.push_str(&format!(
                " {}=\"{}\"",
                name,
                html_escape::encode_double_quoted_attribute(value)
            ));
        }
        if !class_names.is_empty() {
            s.push_str(&format!(
                " class=\"{}\"",
                html_escape::encode_double_quoted_attribute(&class_names.join(" "))
            ));
        }
        s
    }

    pub fn wrap_in_tag(&self, tag: &str, content: &str, attrs: &[(&str, &str)], class_names: &[String]) -> String {
        format!("{}>{}</{}>", self.open_tag(tag, attrs, class_names), content, tag)
    }

    fn heading_tag(&self, level: HeadingLevel) -> Result<&str> {
        match level {
            HeadingLevel::Theorem => Ok("span"),
            HeadingLevel::Level(n) => n
                .checked_sub(1)
                .and_then(|i| self.heading_tags_by_level.get(i as usize))
                .map(String::as_str)
                .ok_or_else(|| {
                    FlmError::render(format!(
                        "Bad heading level {}, expected 1..{}",
                        n,
                        self.heading_tags_by_level.len()
                    ))
                }),
        }
    }
}

fn id_attr(target_id: Option<&str>) -> Vec<(&str, &str)> {
    target_id.map(|id| ("id", id)).into_iter().collect()
}

fn role_classes(role: &str, annotations: &[String]) -> Vec<String> {
    std::iter::once(role.to_string())
        .chain(annotations.iter().filter(|a| a.as_str() != role).cloned())
        .collect()
}

impl FragmentRenderer for HtmlFragmentRenderer {
    fn name(&self) -> &str {
        "html"
    }

    fn description(&self) -> &str {
        "HTML fragments"
    }

    fn supports_delayed_markers(&self) -> bool {
        true
    }

    fn render_paragraph(&self, content: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(format!("<p>{}</p>", content))
    }

    fn render_join_blocks(&self, parts: &[String], _ctx: &RenderContext<'_>) -> String {
        parts
            .iter()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&self.blocks_joiner)
    }

    fn render_value(&self, value: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(self.htmlescape(value))
    }

    fn render_nothing(&self, annotations: &[String], _ctx: &RenderContext<'_>) -> Result<String> {
        if !self.render_nothing_as_comment_with_annotations {
            return Ok(String::new());
        }
        let annotations: Vec<String> = annotations.iter().map(|a| a.replace("--", "- - ")).collect();
        Ok(format!("<!-- {} -->", annotations.join(" ")))
    }

    fn render_empty_error_placeholder(&self, debug: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(format!(
            "<span class=\"empty-error-placeholder\"><!-- {} -->(?)</span>",
            debug.replace("--", "- - ")
        ))
    }

    fn render_text_format(&self, formats: &[&str], content: &NodeList, ctx: &RenderContext<'_>) -> Result<String> {
        let content = self.render_nodelist(content, ctx, Some(false))?;
        let classes: Vec<String> = formats.iter().map(|f| f.to_string()).collect();
        Ok(self.wrap_in_tag("span", &content, &[], &classes))
    }

    fn render_verbatim(&self, value: &str, options: &VerbatimOptions, _ctx: &RenderContext<'_>) -> Result<String> {
        let escaped = self.htmlescape(value).replace('\\', "<span>\\</span>");
        let tag = if options.is_block_level { "div" } else { "span" };
        let classes = if options.annotations.is_empty() {
            vec!["verbatimtext".to_string()]
        } else {
            options.annotations.clone()
        };
        Ok(self.wrap_in_tag(tag, &escaped, &id_attr(options.target_id.as_deref()), &classes))
    }

    fn render_math_content(&self, math: &MathContent<'_>, _ctx: &RenderContext<'_>) -> Result<String> {
        let mut classes = vec![format!("{}-math", math.display)];
        if let Some(env) = math.environment {
            classes.push(format!("env-{}", env.replace('*', "-star")));
        }
        let content = self.htmlescape(&format!(
            "{}{}{}",
            math.delimiters.0, math.content, math.delimiters.1
        ));
        Ok(self.wrap_in_tag("span", &content, &id_attr(math.target_id), &classes))
    }

    fn render_semantic_span(
        &self,
        content: &str,
        role: &str,
        annotations: &[String],
        target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        Ok(self.wrap_in_tag("span", content, &id_attr(target_id), &role_classes(role, annotations)))
    }

    fn render_semantic_block(
        &self,
        content: &str,
        role: &str,
        annotations: &[String],
        target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        if matches!(role, "section" | "main" | "article") {
            let classes: Vec<String> = annotations.iter().filter(|a| a.as_str() != role).cloned().collect();
            return Ok(self.wrap_in_tag(role, content, &id_attr(target_id), &classes));
        }
        Ok(self.wrap_in_tag("div", content, &id_attr(target_id), &role_classes(role, annotations)))
    }

    fn render_heading(
        &self,
        content: &str,
        level: HeadingLevel,
        inline: bool,
        target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let tag = self.heading_tag(level)?;
        let mut classes = vec![format!("heading-level-{}", level)];
        if inline {
            classes.push("heading-inline".to_string());
        }
        let mut html = self.wrap_in_tag(tag, content, &id_attr(target_id), &classes);
        if inline && self.inline_heading_add_space {
            html.push(' ');
        }
        Ok(html)
    }

    fn render_link(
        &self,
        kind: &str,
        href: &str,
        display: &str,
        annotations: &[String],
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let href = if href.is_empty() { "#" } else { href };
        let mut attrs = vec![("href", href)];
        if self.use_link_target_blank && !href.starts_with('#') {
            attrs.push(("target", "_blank"));
        }
        let classes: Vec<String> = std::iter::once(format!("href-{}", kind))
            .chain(annotations.iter().cloned())
            .collect();
        Ok(self.wrap_in_tag("a", display, &attrs, &classes))
    }

    fn render_enumeration(
        &self,
        items: &[NodeList],
        tag: &dyn Fn(usize) -> ItemTag,
        options: &EnumerationOptions<'_>,
        ctx: &RenderContext<'_>,
    ) -> Result<String> {
        let mut rendered = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            let number = j + 1;
            let forced = match item.mode().forced() {
                Some(false) => Some(false),
                _ => Some(true),
            };
            let content = self.render_nodelist(item, ctx, forced)?;
            let tag_html = render_item_tag(self, tag(number), ctx)?;
            let target_id = options
                .target_id_generator
                .and_then(|generator| generator(number));
            rendered.push(format!(
                "{}{}",
                self.wrap_in_tag("dt", &tag_html, &id_attr(target_id.as_deref()), &[]),
                self.wrap_in_tag("dd", &content, &[], &[])
            ));
        }
        let classes: Vec<String> = std::iter::once("enumeration".to_string())
            .chain(options.annotations.iter().cloned())
            .collect();
        Ok(self.wrap_in_tag("dl", &self.render_join(&rendered, ctx), &[], &classes))
    }

    fn render_delayed_marker(&self, _node: &Node, key: DelayedKey, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(format!("<FLM:DLYD:{}/>", key))
    }

    fn render_delayed_dummy_placeholder(
        &self,
        _node: &Node,
        key: DelayedKey,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        Ok(format!("<!-- delayed:{} -->", key))
    }

    fn replace_delayed_markers(&self, content: &str, values: &HashMap<DelayedKey, String>) -> Result<String> {
        let mut result = String::with_capacity(content.len());
        let mut last = 0;
        for caps in DELAYED_MARKER.captures_iter(content) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let key = caps["key"]
                .parse::<u64>()
                .map(DelayedKey)
                .map_err(|_| FlmError::render(format!("Invalid delayed marker ‘{}’", &caps[0])))?;
            let value = values.get(&key).ok_or_else(|| {
                FlmError::render(format!("No delayed content was computed for key {}", key))
            })?;
            result.push_str(&content[last..whole.start]);
            result.push_str(value);
            last = whole.end;
        }
        result.push_str(&content[last..]);
        Ok(result)
    }

    fn render_float(&self, float: &RenderedFloat, ctx: &RenderContext<'_>) -> Result<String> {
        let mut caption_parts = Vec::new();
        if let Some(number) = &float.number {
            caption_parts.push(self.wrap_in_tag(
                "span",
                &format!("{}&nbsp;{}", self.htmlescape(&float.caption_name), number),
                &[],
                &["float-number".to_string()],
            ));
        } else if float.caption.is_some() {
            caption_parts.push(self.wrap_in_tag(
                "span",
                &self.htmlescape(&float.caption_name),
                &[],
                &["float-no-number".to_string()],
            ));
        }
        if let Some(caption) = &float.caption {
            caption_parts.push(": ".to_string());
            caption_parts.push(caption.clone());
        }

        let contents = self.render_semantic_block(&float.content, "float-contents", &[], None, ctx)?;
        let body = if caption_parts.is_empty() {
            contents
        } else {
            let caption = self.wrap_in_tag(
                "figcaption",
                &self.wrap_in_tag("span", &self.render_join(&caption_parts, ctx), &[], &[]),
                &[],
                &["float-caption-content".to_string()],
            );
            self.render_join_blocks(&[contents, caption], ctx)
        };

        Ok(self.wrap_in_tag(
            "figure",
            &body,
            &id_attr(float.target_id.as_deref()),
            &["float".to_string(), format!("float-{}", float.float_type)],
        ))
    }

    fn render_graphics_block(&self, graphics: &GraphicsResource, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(format!("{}>", self.open_tag("img", &[("src", &graphics.src)], &[])))
    }
}
