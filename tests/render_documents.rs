//! End-to-end renders of whole documents with the standard features.

use flm::document::FeatureOptionsMap;
use flm::feature::citations::{CitationProvider, StaticCitationProvider};
use flm::feature::endnotes::render_with_endnotes;
use flm::feature::refs::{self, RefsRenderManager};
use flm::feature::{DocumentManagers, Feature, FeatureOptions, RenderManager};
use flm::stdfeatures::{standard_features, standard_features_with};
use flm::{
    Document, Environment, FragmentOptions, FragmentRenderer, HtmlFragmentRenderer, RenderContext,
    Result, TextFragmentRenderer,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::any::Any;
use std::sync::{Arc, Mutex};

fn provider() -> Arc<dyn CitationProvider> {
    Arc::new(
        StaticCitationProvider::new()
            .with_citation("x", "a", "First paper.")
            .with_citation("x", "b", "Second paper."),
    )
}

fn features() -> Vec<Arc<dyn Feature>> {
    let config = flm_config::load_defaults().unwrap();
    standard_features_with(&config, vec![provider()], Vec::new()).unwrap()
}

fn document_with(features: Vec<Arc<dyn Feature>>, source: &str) -> Result<Document> {
    let environment = Environment::new(features)?;
    let fragment = environment.make_fragment(source, FragmentOptions::new("document body"))?;
    Document::new(environment, vec![fragment])
}

fn document(source: &str) -> Result<Document> {
    document_with(features(), source)
}

const SAMPLE: &str = "\\section{Introduction}\\label{sec:intro}

Figure~\\ref{figure:plot} is shown below, see also \\ref{sec:intro}.

\\begin{figure}
  \\includegraphics{plot.png}
  \\caption{A plot}\\label{figure:plot}
\\end{figure}

\\begin{enumerate}
  \\item\\label{item:first} First
  \\item Second
\\end{enumerate}

As item \\ref{item:first} says\\footnote{A note.} \\cite{x:a}.";

#[test]
fn html_document() {
    let html = document(SAMPLE)
        .unwrap()
        .render(&HtmlFragmentRenderer::default())
        .unwrap();
    insta::assert_snapshot!(html, @r###"
    <h1 id="sec-intro" class="heading-level-1">Introduction</h1>
    <p>Figure&nbsp;<a href="#figure-1" class="href-ref ref-figure">Figure&nbsp;1</a> is shown below, see also <a href="#sec-intro" class="href-ref ref-sec">Introduction</a>.</p>
    <figure id="figure-1" class="float float-figure"><div class="float-contents"><img src="plot.png"></div>
    <figcaption class="float-caption-content"><span><span class="float-number">Figure&nbsp;1</span>: A plot</span></figcaption></figure>
    <dl class="enumeration enumerate"><dt id="item-first">1.</dt><dd><p>First</p></dd><dt>2.</dt><dd><p>Second</p></dd></dl>
    <p>As item <a href="#item-first" class="href-ref ref-item">1.</a> says<a href="#footnote-1" class="href-endnote endnote footnote endnote-marks">a</a> <span class="citations"><a href="#citation-1" class="href-endnote endnote citation endnote-marks">[1]</a></span>.</p>
    "###);
}

#[test]
fn text_document_with_endnotes() {
    let doc = document("One\\footnote{First.}\\cite{x:b} two\\footnote{Second.}\\cite{x:a,x:b}.").unwrap();
    let out = render_with_endnotes(&doc, &TextFragmentRenderer::default(), &FeatureOptionsMap::new())
        .unwrap();
    assert!(out.starts_with("Onea[1] twob[1,2]."), "got: {}", out);
    assert!(out.contains("Footnotes\n=========\n\n  a First.\n\n  b Second."));
    assert!(out.contains("References"));
    assert!(out.contains("[1] Second paper."));
    assert!(out.contains("[2] First paper."));
}

#[rstest]
#[case::text(Box::new(TextFragmentRenderer::default()))]
#[case::html(Box::new(HtmlFragmentRenderer::default()))]
fn rendering_twice_is_identical(#[case] renderer: Box<dyn FragmentRenderer>) {
    let doc = document(SAMPLE).unwrap();
    let first = doc.render(renderer.as_ref()).unwrap();
    let second = doc.render(renderer.as_ref()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn forward_and_backward_references_agree() {
    let source = "Before: \\ref{figure:a}.

\\begin{figure}\\includegraphics{a.png}\\label{figure:a}\\end{figure}

After: \\ref{figure:a}.";
    let out = document(source)
        .unwrap()
        .render(&TextFragmentRenderer::default())
        .unwrap();
    assert!(out.starts_with("Before: Figure\u{a0}1."), "got: {}", out);
    assert!(out.ends_with("After: Figure\u{a0}1."), "got: {}", out);
}

/// Records the number of `figure:watched` as seen by the refs manager after the first pass.
#[derive(Debug)]
struct WatcherFeature {
    seen: Arc<Mutex<Option<u64>>>,
}

#[derive(Debug)]
struct WatcherRenderManager {
    seen: Arc<Mutex<Option<u64>>>,
}

impl RenderManager for WatcherRenderManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process(&mut self, ctx: &RenderContext<'_>) -> Result<()> {
        let refs_manager = ctx.render_manager::<RefsRenderManager>(refs::FEATURE_NAME)?;
        let number = refs_manager
            .find("figure", "watched")
            .and_then(|instance| instance.counter_value);
        *self.seen.lock().unwrap() = number;
        Ok(())
    }
}

impl Feature for WatcherFeature {
    fn name(&self) -> &str {
        "watcher"
    }

    fn dependencies(&self) -> Vec<String> {
        vec![refs::FEATURE_NAME.to_string()]
    }

    fn new_render_manager(
        &self,
        _documents: &DocumentManagers,
        _options: &FeatureOptions,
    ) -> Result<Option<Box<dyn RenderManager>>> {
        Ok(Some(Box::new(WatcherRenderManager {
            seen: self.seen.clone(),
        })))
    }
}

#[test]
fn process_hook_sees_final_numbers() {
    let seen = Arc::new(Mutex::new(None));
    let mut features = features();
    features.push(Arc::new(WatcherFeature { seen: seen.clone() }));
    let source = "See \\ref{figure:watched}.

\\begin{figure}\\includegraphics{a.png}\\label{figure:a}\\end{figure}

\\begin{figure}\\includegraphics{b.png}\\label{figure:watched}\\end{figure}";
    let html = document_with(features, source)
        .unwrap()
        .render(&HtmlFragmentRenderer::default())
        .unwrap();
    let number = seen.lock().unwrap().expect("watcher saw the figure");
    assert_eq!(number, 2);
    assert!(html.starts_with(&format!(
        "<p>See <a href=\"#figure-{n}\" class=\"href-ref ref-figure\">Figure&nbsp;{n}</a>.</p>",
        n = number
    )));
}

#[test]
fn duplicate_labels_are_rejected() {
    let source = "\\begin{figure}\\includegraphics{a.png}\\label{figure:a}\\end{figure}

\\begin{figure}\\includegraphics{b.png}\\label{figure:a}\\end{figure}";
    let err = document(source)
        .unwrap()
        .render(&HtmlFragmentRenderer::default())
        .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Duplicate reference label ‘figure:a’ in the same document"));
}

#[test]
fn nested_itemize_tags_by_depth() {
    let source = "\\begin{itemize}\\item A
\\begin{itemize}\\item B
\\begin{itemize}\\item C
\\begin{itemize}\\item[*] D\\item E\\end{itemize}
\\end{itemize}
\\end{itemize}
\\end{itemize}";
    let html = document(source)
        .unwrap()
        .render(&HtmlFragmentRenderer::default())
        .unwrap();
    let tags: Vec<&str> = html
        .split("<dt>")
        .skip(1)
        .filter_map(|rest| rest.split("</dt>").next())
        .collect();
    assert_eq!(tags, vec!["•", "-", "▸", "*", "▸"]);
}

#[test]
fn configured_feature_subset() {
    let config = flm_config::Loader::new()
        .with_toml_str("[features]\nenabled = [\"baseformatting\"]\n")
        .build()
        .unwrap();
    let features = standard_features(&config).unwrap();
    assert_eq!(features.len(), 1);

    let err = document_with(features, "\\section{Intro}").unwrap_err();
    assert!(err.to_string().starts_with("Unknown macro ‘\\section’"));
}

#[test]
fn standalone_fragments_refuse_references() {
    let environment = Environment::new(features()).unwrap();
    let options = FragmentOptions {
        standalone_mode: true,
        ..FragmentOptions::new("snippet")
    };
    let renderer = HtmlFragmentRenderer::default();

    let fragment = environment
        .make_fragment("Some \\emph{text}.", options.clone())
        .unwrap();
    let html = fragment.render_standalone(&renderer).unwrap();
    assert!(html.contains("Some <span class=\"textit\">text</span>."), "got: {}", html);

    let refused = environment
        .make_fragment("See \\ref{sec:a}.", options)
        .and_then(|fragment| fragment.render_standalone(&renderer));
    assert!(refused.is_err());
}

#[test]
fn indented_source_lines_stay_in_the_paragraph() {
    let source = "\\begin{enumerate}
  \\item First line
    continues here.

  \\item Second
\\end{enumerate}

A paragraph
  with an indented line.
  \t
Next paragraph.";
    let html = document(source)
        .unwrap()
        .render(&HtmlFragmentRenderer::default())
        .unwrap();
    assert!(html.contains("<dd><p>First line continues here.</p></dd>"), "got: {}", html);
    assert!(html.contains("<p>A paragraph with an indented line.</p>\n<p>Next paragraph.</p>"), "got: {}", html);
}

#[test]
fn theorems_and_terms_in_one_document() {
    let source = "\\begin{defterm}{prime}\\label{topic:primes}
A number with exactly two divisors.
\\end{defterm}

\\begin{theorem}[Euclid]\\label{thm:infinite}
There are infinitely many \\term[prime]{primes}.
\\end{theorem}

\\begin{proof}[*thm:infinite]
Multiply them all and add one.
\\end{proof}

\\begin{lemma}\\label{lem:next}Every \\term{prime} is odd or two.\\end{lemma}

See \\ref{thm:infinite,lem:next} on \\ref{topic:primes}.";
    let out = document(source)
        .unwrap()
        .render(&TextFragmentRenderer::default())
        .unwrap();
    assert_eq!(
        out,
        "prime: A number with exactly two divisors.

Theorem 1 (Euclid).  There are infinitely many primes.

Proof (Theorem 1).  Multiply them all and add one. □

Lemma 2.  Every prime is odd or two.

See Theorem 1, Lemma 2 on prime."
    );
}
