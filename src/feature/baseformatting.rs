//! Basic formatting
//!
//!     Emphasis and boldface, inline verbatim code, hyperlinks, escaped characters and
//!     the typographic specials `~`, `--` and `---`. Everything here is allowed in
//!     standalone mode, so counter and reference texts can use it.

use crate::ast::Node;
use crate::error::{FlmError, Result};
use crate::feature::Feature;
use crate::render_context::RenderContext;
use crate::renderer::VerbatimOptions;
use crate::specinfo::{ArgumentSpec, Definitions, SpecInfo};
use std::sync::Arc;

pub const FEATURE_NAME: &str = "baseformatting";

/// Control symbols standing for the character itself.
const ESCAPED_CHARS: [&str; 8] = ["%", "&", "#", "$", "_", "{", "}", " "];

#[derive(Debug, Clone, Default)]
pub struct BaseFormattingFeature;

impl BaseFormattingFeature {
    pub fn new() -> Self {
        Self
    }
}

impl Feature for BaseFormattingFeature {
    fn name(&self) -> &str {
        FEATURE_NAME
    }

    fn title(&self) -> &str {
        "Basic formatting"
    }

    fn definitions(&self) -> Definitions {
        let mut defs = Definitions::new()
            .with_macro("emph", Arc::new(TextFormatSpec::new(&["textit"])))
            .with_macro("textit", Arc::new(TextFormatSpec::new(&["textit"])))
            .with_macro("textbf", Arc::new(TextFormatSpec::new(&["textbf"])))
            .with_macro("verbcode", Arc::new(VerbcodeSpec))
            .with_macro("href", Arc::new(HrefSpec::Href))
            .with_macro("url", Arc::new(HrefSpec::Url))
            .with_macro("email", Arc::new(HrefSpec::Email))
            .with_macro("textbackslash", Arc::new(ConstantValueSpec::new("\\")))
            .with_specials("~", Arc::new(ConstantValueSpec::new("\u{a0}")))
            .with_specials("--", Arc::new(ConstantValueSpec::new("–")))
            .with_specials("---", Arc::new(ConstantValueSpec::new("—")));
        for c in ESCAPED_CHARS {
            defs.add_macro(c, Arc::new(ConstantValueSpec::new(c)));
        }
        defs
    }
}

/// Renders to a fixed string.
#[derive(Debug, Clone)]
pub struct ConstantValueSpec {
    value: String,
}

impl ConstantValueSpec {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

impl SpecInfo for ConstantValueSpec {
    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, _node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        ctx.renderer().render_value(&self.value, ctx)
    }
}

#[derive(Debug, Clone)]
pub struct TextFormatSpec {
    formats: Vec<&'static str>,
}

impl TextFormatSpec {
    pub fn new(formats: &[&'static str]) -> Self {
        Self {
            formats: formats.to_vec(),
        }
    }
}

impl SpecInfo for TextFormatSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::mandatory("text")]
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let text = node
            .invocation()
            .and_then(|inv| inv.nodes_arg("text"))
            .ok_or_else(|| FlmError::at_node("Missing text to format", node))?;
        ctx.renderer().render_text_format(&self.formats, text, ctx)
    }
}

/// `\verbcode{...}`
#[derive(Debug, Clone, Default)]
pub struct VerbcodeSpec;

impl SpecInfo for VerbcodeSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        vec![ArgumentSpec::chars("code")]
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let code = node
            .invocation()
            .and_then(|inv| inv.chars_arg("code"))
            .unwrap_or("");
        ctx.renderer().render_verbatim(
            code,
            &VerbatimOptions {
                is_block_level: false,
                annotations: vec!["verbatimcode".to_string(), "verbatimcode-inline".to_string()],
                target_id: None,
            },
            ctx,
        )
    }
}

/// Link display for a bare URL: no scheme, no trailing `/`, `#` or `?`.
pub fn pretty_url(url: &str) -> &str {
    let mut display = url;
    for prefix in ["http://", "https://", "mailto:"] {
        if let Some(rest) = display.strip_prefix(prefix) {
            display = rest;
            break;
        }
    }
    display.trim_end_matches(['/', '#', '?'])
}

/// `\href{url}{text}`, `\url{url}` and `\email{address}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrefSpec {
    Href,
    Url,
    Email,
}

impl SpecInfo for HrefSpec {
    fn arguments(&self) -> Vec<ArgumentSpec> {
        match self {
            HrefSpec::Href => vec![
                ArgumentSpec::chars("target_href"),
                ArgumentSpec::mandatory("display_text"),
            ],
            HrefSpec::Url => vec![ArgumentSpec::chars("target_href")],
            HrefSpec::Email => vec![ArgumentSpec::chars("target_email")],
        }
    }

    fn allowed_in_standalone_mode(&self) -> bool {
        true
    }

    fn render(&self, node: &Node, ctx: &RenderContext<'_>) -> Result<String> {
        let inv = node
            .invocation()
            .ok_or_else(|| FlmError::at_node("Expected a link macro", node))?;
        let renderer = ctx.renderer();
        let (href, display) = match self {
            HrefSpec::Href => {
                let href = inv.chars_arg("target_href").unwrap_or("").trim().to_string();
                let display = match inv.nodes_arg("display_text") {
                    Some(text) => renderer.render_nodelist(text, ctx, Some(false))?,
                    None => renderer.render_value(pretty_url(&href), ctx)?,
                };
                (href, display)
            }
            HrefSpec::Url => {
                let href = inv.chars_arg("target_href").unwrap_or("").trim().to_string();
                let display = renderer.render_value(pretty_url(&href), ctx)?;
                (href, display)
            }
            HrefSpec::Email => {
                let address = inv.chars_arg("target_email").unwrap_or("").trim();
                (
                    format!("mailto:{}", address),
                    renderer.render_value(address, ctx)?,
                )
            }
        };
        renderer.render_link("href", &href, &display, &[], ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, FragmentOptions};
    use crate::renderer::{HtmlFragmentRenderer, TextFragmentRenderer};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn standalone_text(source: &str) -> String {
        let env = Environment::new(vec![Arc::new(BaseFormattingFeature::new())]).unwrap();
        let fragment = env
            .make_fragment(
                source,
                FragmentOptions {
                    standalone_mode: true,
                    ..FragmentOptions::new("test")
                },
            )
            .unwrap();
        fragment.render_standalone(&TextFragmentRenderer::default()).unwrap()
    }

    fn standalone_html(source: &str) -> String {
        let env = Environment::new(vec![Arc::new(BaseFormattingFeature::new())]).unwrap();
        let fragment = env.make_fragment(source, FragmentOptions::new("test")).unwrap();
        fragment.render_standalone(&HtmlFragmentRenderer::default()).unwrap()
    }

    #[rstest]
    #[case("Figure~1", "Figure\u{a0}1")]
    #[case("pages 3--5", "pages 3–5")]
    #[case("wait---what", "wait—what")]
    #[case("100\\% \\& \\#1 \\$5 a\\_b \\{x\\}", "100% & #1 $5 a_b {x}")]
    #[case("a\\textbackslash{}b", "a\\b")]
    #[case("\\emph{Here} I \\textbf{am}", "Here I am")]
    fn test_text_output(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(standalone_text(source), expected);
    }

    #[test]
    fn test_html_formatting() {
        assert_eq!(
            standalone_html("Hello, \\emph{Here I am.}"),
            "Hello, <span class=\"textit\">Here I am.</span>"
        );
        assert_eq!(
            standalone_html("\\verbcode{a<b}"),
            "<span class=\"verbatimcode verbatimcode-inline\">a&lt;b</span>"
        );
        assert_eq!(standalone_html("A~B"), "A&nbsp;B");
    }

    #[test]
    fn test_links() {
        assert_eq!(
            standalone_html("\\href{https://example.com/x}{the site}"),
            "<a href=\"https://example.com/x\" class=\"href-href\">the site</a>"
        );
        assert_eq!(
            standalone_text("see \\url{https://example.com/}"),
            "see example.com <https://example.com/>"
        );
        assert_eq!(
            standalone_text("\\email{me@example.com}"),
            "me@example.com <mailto:me@example.com>"
        );
    }

    #[test]
    fn test_pretty_url() {
        assert_eq!(pretty_url("https://example.com/a/"), "example.com/a");
        assert_eq!(pretty_url("mailto:x@y.z"), "x@y.z");
        assert_eq!(pretty_url("ftp://host/?"), "ftp://host");
    }
}
