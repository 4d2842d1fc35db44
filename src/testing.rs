//! Rendering helpers for unit tests: whole documents built from the default
//! configuration.

use crate::document::{Document, FeatureOptionsMap};
use crate::environment::{Environment, FragmentOptions};
use crate::error::Result;
use crate::feature::citations::CitationProvider;
use crate::feature::endnotes::render_with_endnotes;
use crate::feature::refs::RefResolver;
use crate::feature::Feature;
use crate::renderer::{FragmentRenderer, HtmlFragmentRenderer, TextFragmentRenderer};
use crate::stdfeatures::standard_features_with;
use flm_config::FlmConfig;
use std::sync::Arc;

pub fn default_features_with(
    citation_providers: Vec<Arc<dyn CitationProvider>>,
    ref_resolvers: Vec<Arc<dyn RefResolver>>,
    configure: impl FnOnce(&mut FlmConfig),
) -> Vec<Arc<dyn Feature>> {
    let mut config = flm_config::load_defaults().expect("default configuration");
    configure(&mut config);
    standard_features_with(&config, citation_providers, ref_resolvers).expect("standard features")
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn document(source: &str, features: Vec<Arc<dyn Feature>>) -> Result<Document> {
    init_logging();
    let environment = Environment::new(features)?;
    let fragment = environment.make_fragment(source, FragmentOptions::new("test document"))?;
    Document::new(environment, vec![fragment])
}

fn render(source: &str, features: Vec<Arc<dyn Feature>>, renderer: &dyn FragmentRenderer) -> Result<String> {
    document(source, features)?.render(renderer)
}

pub fn render_text_with_features(source: &str, features: Vec<Arc<dyn Feature>>) -> Result<String> {
    render(source, features, &TextFragmentRenderer::default())
}

pub fn render_text_with(
    source: &str,
    citation_providers: Vec<Arc<dyn CitationProvider>>,
    ref_resolvers: Vec<Arc<dyn RefResolver>>,
) -> Result<String> {
    render_text_with_features(
        source,
        default_features_with(citation_providers, ref_resolvers, |_| {}),
    )
}

pub fn render_text(source: &str) -> Result<String> {
    render_text_with(source, Vec::new(), Vec::new())
}

pub fn render_html(source: &str) -> Result<String> {
    render(
        source,
        default_features_with(Vec::new(), Vec::new(), |_| {}),
        &HtmlFragmentRenderer::default(),
    )
}

pub fn render_text_with_endnotes(source: &str) -> Result<String> {
    let doc = document(source, default_features_with(Vec::new(), Vec::new(), |_| {}))?;
    render_with_endnotes(&doc, &TextFragmentRenderer::default(), &FeatureOptionsMap::new())
}

pub fn render_html_with_endnotes(source: &str) -> Result<String> {
    let doc = document(source, default_features_with(Vec::new(), Vec::new(), |_| {}))?;
    render_with_endnotes(&doc, &HtmlFragmentRenderer::default(), &FeatureOptionsMap::new())
}
