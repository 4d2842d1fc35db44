//! Configuration loader for the flm rendering engine.
//!
//! `defaults/flm.default.toml` is embedded into the crate so that documented
//! defaults and runtime behavior stay in sync. Applications layer their own
//! files on top of those defaults via [`Loader`] before deserializing into
//! [`FlmConfig`]. The resulting value is immutable and is handed to feature
//! constructors explicitly; nothing here is cached globally.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;

pub use config::ConfigError;

const DEFAULT_TOML: &str = include_str!("../defaults/flm.default.toml");

/// Top-level configuration consumed by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct FlmConfig {
    pub features: FeaturesConfig,
    pub headings: HeadingsConfig,
    pub endnotes: EndnotesConfig,
    pub citations: CitationsConfig,
    pub floats: FloatsConfig,
    pub enumeration: EnumerationConfig,
    pub math: MathConfig,
    pub defterm: DefTermConfig,
    pub theorems: TheoremsConfig,
    pub render: RenderConfig,
}

/// Which standard features get built.
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadingsConfig {
    pub levels: Vec<HeadingLevelConfig>,
}

/// One sectioning command, e.g. `\subsection` at level 2.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadingLevelConfig {
    pub level: u8,
    pub command: String,
    /// Run-in headings are rendered inline at the start of the next paragraph.
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndnotesConfig {
    pub categories: Vec<EndnoteCategoryConfig>,
    pub render: EndnotesRenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndnoteCategoryConfig {
    pub name: String,
    pub counter_formatter: CounterFormatterConfig,
    pub heading_title: String,
    /// Macro that creates an endnote of this category (`footnote` → `\footnote`).
    #[serde(default)]
    pub endnote_command: Option<String>,
}

/// Defaults for rendering the endnote listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndnotesRenderConfig {
    #[serde(default)]
    pub include_headings_at_level: Option<u8>,
    #[serde(default)]
    pub set_headings_target_ids: bool,
    #[serde(default)]
    pub endnotes_heading_title: Option<String>,
    #[serde(default)]
    pub endnotes_heading_level: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationsConfig {
    pub counter_formatter: CounterFormatterConfig,
    pub delimiters: Vec<String>,
    pub optional_text_separator: String,
    pub references_heading_title: String,
    pub sort_and_compress: bool,
    pub use_endnotes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatsConfig {
    pub types: Vec<FloatTypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatTypeConfig {
    pub float_type: String,
    pub float_caption_name: String,
    pub counter_formatter: CounterFormatterConfig,
    pub content_handlers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumerationConfig {
    pub environments: Vec<EnumerationEnvironmentConfig>,
}

/// A list environment and its cyclical tag formatters, indexed by nesting depth.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumerationEnvironmentConfig {
    pub name: String,
    pub counter_formatters: Vec<FormatNumConfig>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MathConfig {
    pub environments: Vec<String>,
    pub eqref_macro: String,
    pub eqref_ref_type: String,
    pub counter_formatter: CounterFormatterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefTermConfig {
    /// Open the definition with the term itself.
    pub render_with_term: bool,
    pub render_with_term_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TheoremsConfig {
    /// Numbers shared by every type with `shared_numbering`.
    pub shared_counter_formatter: CounterFormatterConfig,
    pub allowed_ref_label_prefixes: Vec<String>,
    pub types: Vec<TheoremTypeConfig>,
    pub environments: Vec<TheoremEnvironmentConfig>,
}

/// Behavior common to a family of theorem environments (`theoremlike`, `prooflike`).
#[derive(Debug, Clone, Deserialize)]
pub struct TheoremTypeConfig {
    pub name: String,
    pub numbered: bool,
    #[serde(default)]
    pub shared_numbering: bool,
    /// Per-environment formatter when numbering is not shared.
    #[serde(default)]
    pub counter_formatter: Option<CounterFormatterConfig>,
    pub heading_title_pre: String,
    pub heading_title_post: String,
    /// Read a title `[*thm:label]` as a reference to the related theorem.
    #[serde(default)]
    pub title_enable_relation_ref: bool,
    #[serde(default)]
    pub body_final_content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TheoremEnvironmentConfig {
    pub name: String,
    pub theorem_type: String,
    /// Defaults to the capitalized environment name.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_plural: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    pub text: TextRenderConfig,
    pub html: HtmlRenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextRenderConfig {
    pub display_href_urls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlRenderConfig {
    pub use_link_target_blank: bool,
    pub heading_tags_by_level: Vec<String>,
    pub inline_heading_add_space: bool,
    pub render_nothing_as_comment_with_annotations: bool,
}

/// How a number is turned into text: a formatter name (`roman`), a tag
/// template (`(a)`, `•`) or a `${name}` template table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FormatNumConfig {
    Template { template: String },
    Name(String),
}

/// A counter formatter given either as a bare format or as a full table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CounterFormatterConfig {
    Full(CounterFormatterSpecConfig),
    Simple(FormatNumConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterFormatterSpecConfig {
    pub format_num: FormatNumConfig,
    #[serde(default)]
    pub prefix_display: Option<PrefixDisplayConfig>,
    #[serde(default)]
    pub delimiters: Option<Vec<String>>,
    #[serde(default)]
    pub join_spec: Option<String>,
    #[serde(default)]
    pub name_in_link: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrefixDisplayConfig {
    pub singular: String,
    pub plural: String,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer configuration given as TOML text.
    pub fn with_toml_str(mut self, toml: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    /// Apply a single key/value override.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<FlmConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<FlmConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.features.enabled.len(), 10);
        assert_eq!(config.headings.levels.len(), 6);
        assert!(config.headings.levels[3].inline);
        assert_eq!(config.endnotes.categories[0].name, "footnote");
        assert_eq!(
            config.endnotes.categories[0].counter_formatter,
            CounterFormatterConfig::Simple(FormatNumConfig::Name("alph".to_string()))
        );
        assert!(config.citations.sort_and_compress);
        assert_eq!(config.floats.types[0].float_type, "figure");
    }

    #[test]
    fn parses_template_and_tag_formatters() {
        let config = load_defaults().expect("defaults to deserialize");
        let enumerate = &config.enumeration.environments[0];
        assert_eq!(
            enumerate.counter_formatters[1],
            FormatNumConfig::Template {
                template: "(${roman})".to_string()
            }
        );
        let itemize = &config.enumeration.environments[1];
        assert_eq!(itemize.counter_formatters[0], FormatNumConfig::Name("•".to_string()));

        match &config.math.counter_formatter {
            CounterFormatterConfig::Full(spec) => {
                assert_eq!(spec.join_spec.as_deref(), Some("compact"));
                let prefix = spec.prefix_display.as_ref().expect("prefix display");
                assert_eq!(prefix.plural, "Eqs.~");
            }
            other => panic!("unexpected math counter formatter {:?}", other),
        }
    }

    #[test]
    fn parses_theorem_tables() {
        let config = load_defaults().expect("defaults to deserialize");
        assert!(config.defterm.render_with_term);
        assert_eq!(config.defterm.render_with_term_suffix, ": ");
        let types: Vec<&str> = config.theorems.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(types, vec!["theoremlike", "definitionlike", "prooflike"]);
        let proof = &config.theorems.types[2];
        assert!(!proof.numbered);
        assert!(proof.title_enable_relation_ref);
        assert_eq!(proof.body_final_content, " □");
        let lemma = config
            .theorems
            .environments
            .iter()
            .find(|env| env.name == "lemma")
            .expect("lemma environment");
        assert_eq!(lemma.theorem_type, "theoremlike");
        assert_eq!(lemma.title, None);
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("citations.sort_and_compress", false)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert!(!config.citations.sort_and_compress);
    }

    #[test]
    fn layers_toml_text() {
        let config = Loader::new()
            .with_toml_str("[render.text]\ndisplay_href_urls = false\n")
            .build()
            .expect("config to build");
        assert!(!config.render.text.display_href_urls);
        assert!(config.render.html.inline_heading_add_space);
    }
}
