//! # flm
//!
//! A multi-pass rendering engine for a LaTeX-like markup language.
//!
//! Source text is parsed into an immutable node tree ([`ast`]) by a [`parsing::MarkupParser`]
//! within an [`environment::Environment`], which fixes the set of [`feature::Feature`]s and
//! the vocabulary they define. Fragments are grouped into a [`document::Document`] and
//! rendered to an output format through a [`renderer::FragmentRenderer`].
//!
//! ## Multi-pass rendering
//!
//! Content that depends on the whole document (reference numbers, citation marks,
//! endnote lists) is rendered late. Backends that can emit markers (HTML) substitute
//! them once the document is complete; the others (text) render the document twice.
//! See [`render_context`].
//!
//! ## Example
//!
//! ```text
//! let config = flm_config::load_defaults()?;
//! let environment = Environment::new(stdfeatures::standard_features(&config)?)?;
//! let fragment = environment.make_fragment(source, FragmentOptions::new("body"))?;
//! let document = Document::new(environment, vec![fragment])?;
//! let html = document.render(&HtmlFragmentRenderer::default())?;
//! ```

pub mod ast;
pub mod blocks;
pub mod counter;
pub mod document;
pub mod environment;
pub mod error;
pub mod feature;
pub mod fragment;
pub mod parsing;
pub mod render_context;
pub mod renderer;
pub mod specinfo;
pub mod stdfeatures;

#[cfg(test)]
mod testing;

pub use document::{Document, DocumentOptions, FeatureOptionsMap};
pub use environment::{Environment, FragmentOptions};
pub use error::{FlmError, Result};
pub use fragment::Fragment;
pub use render_context::RenderContext;
pub use renderer::{FragmentRenderer, HtmlFragmentRenderer, RendererRegistry, TextFragmentRenderer};
