//! Plain text backend
//!
//!     Renders in two passes (no delayed markers). Headings of levels 1 to 3 are
//!     underlined; deeper levels are run-in with a trailing colon. Enumeration tags are
//!     right-aligned, external link targets are shown after the link text, and floats are
//!     framed by dotted rules.

use super::{
    render_item_tag, EnumerationOptions, FragmentRenderer, GraphicsResource, HeadingLevel,
    ItemTag, RenderedFloat, VerbatimOptions,
};
use crate::ast::{Node, NodeList};
use crate::error::{FlmError, Result};
use crate::render_context::{DelayedKey, RenderContext};
use flm_config::TextRenderConfig;

const FLOAT_RULE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct TextFragmentRenderer {
    /// Show `<url>` after external links.
    pub display_href_urls: bool,
}

impl Default for TextFragmentRenderer {
    fn default() -> Self {
        Self {
            display_href_urls: true,
        }
    }
}

impl TextFragmentRenderer {
    pub fn from_config(config: &TextRenderConfig) -> Self {
        Self {
            display_href_urls: config.display_href_urls,
        }
    }

    fn float_rule() -> String {
        "·".repeat(FLOAT_RULE_WIDTH)
    }
}

/// Append `punct` unless the text already ends with punctuation.
fn add_punct(text: &str, punct: char) -> String {
    match text.trim_end().chars().last() {
        Some('.' | ',' | ':' | ';' | '?' | '!') => text.to_string(),
        _ => format!("{}{}", text, punct),
    }
}

fn underline(text: &str, c: char) -> String {
    let width = text.chars().count();
    format!("{}\n{}", text, c.to_string().repeat(width))
}

fn right_align(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", " ".repeat(width.saturating_sub(len)), text)
}

fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let total = width - len;
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(total - left))
}

impl FragmentRenderer for TextFragmentRenderer {
    fn name(&self) -> &str {
        "text"
    }

    fn description(&self) -> &str {
        "Plain text"
    }

    fn render_value(&self, value: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(value.to_string())
    }

    fn render_nothing(&self, _annotations: &[String], _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(String::new())
    }

    fn render_empty_error_placeholder(&self, _debug: &str, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(String::new())
    }

    fn render_text_format(&self, _formats: &[&str], content: &NodeList, ctx: &RenderContext<'_>) -> Result<String> {
        self.render_nodelist(content, ctx, Some(false))
    }

    fn render_verbatim(&self, value: &str, _options: &VerbatimOptions, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(value.to_string())
    }

    fn render_heading(
        &self,
        content: &str,
        level: HeadingLevel,
        _inline: bool,
        _target_id: Option<&str>,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        match level {
            HeadingLevel::Level(1) => Ok(underline(content, '=')),
            HeadingLevel::Level(2) => Ok(underline(content, '-')),
            HeadingLevel::Level(3) => Ok(underline(content, '~')),
            HeadingLevel::Level(4) => Ok(format!("{}  ", add_punct(content, ':'))),
            HeadingLevel::Level(5) => Ok(format!("    {}  ", add_punct(content, ':'))),
            HeadingLevel::Level(6) => Ok(format!("        {}  ", add_punct(content, ':'))),
            HeadingLevel::Theorem => Ok(format!("{}.  ", content)),
            HeadingLevel::Level(other) => Err(FlmError::render(format!(
                "Bad heading level {}, expected 1..6",
                other
            ))),
        }
    }

    fn render_link(
        &self,
        _kind: &str,
        href: &str,
        display: &str,
        _annotations: &[String],
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        if self.display_href_urls && !href.starts_with('#') {
            return Ok(format!("{} <{}>", display, href));
        }
        Ok(display.to_string())
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
            let content = self.render_nodelist(item, ctx, Some(true))?;
            let mut tag_text = render_item_tag(self, tag(j + 1), ctx)?;
            if options.nested_depth > 0 {
                tag_text = format!("{}{}", " ".repeat(4 * options.nested_depth), tag_text);
            }
            rendered.push((tag_text, content));
        }

        if rendered.is_empty() {
            return self.render_semantic_block("", "enumeration", &options.annotations, None, ctx);
        }

        let width = rendered
            .iter()
            .map(|(tag_text, _)| tag_text.chars().count())
            .max()
            .unwrap_or(0);

        let blocks = rendered
            .into_iter()
            .map(|(tag_text, content)| {
                let line = self.render_join(
                    &[format!("{} ", right_align(&tag_text, width + 2)), content],
                    ctx,
                );
                self.render_semantic_block(&line, "enumeration", &options.annotations, None, ctx)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.render_join_blocks(&blocks, ctx))
    }

    fn render_delayed_marker(&self, _node: &Node, _key: DelayedKey, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(String::new())
    }

    fn render_delayed_dummy_placeholder(
        &self,
        _node: &Node,
        _key: DelayedKey,
        _ctx: &RenderContext<'_>,
    ) -> Result<String> {
        Ok("#DELAYED#".to_string())
    }

    fn render_float(&self, float: &RenderedFloat, ctx: &RenderContext<'_>) -> Result<String> {
        let mut caption_parts = Vec::new();
        if let Some(number) = &float.number {
            caption_parts.push(format!("{} {}", float.caption_name, number));
        } else if float.caption.is_some() {
            caption_parts.push(float.caption_name.clone());
        }
        if let Some(caption) = &float.caption {
            caption_parts.push(": ".to_string());
            caption_parts.push(caption.clone());
        }

        let body = if caption_parts.is_empty() {
            float.content.clone()
        } else {
            let caption = self.render_join(&caption_parts, ctx);
            self.render_join_blocks(&[float.content.clone(), caption], ctx)
        };

        let rule = Self::float_rule();
        Ok(format!("{}\n{}\n{}", rule, body, rule))
    }

    fn render_graphics_block(&self, graphics: &GraphicsResource, _ctx: &RenderContext<'_>) -> Result<String> {
        Ok(center(&format!("[{}]", graphics.src), FLOAT_RULE_WIDTH))
    }
}
