//! Reference reader for the latex-like markup
//!
//!     A recursive descent over the token stream. The vocabulary drives everything:
//!     the argument list of a spec decides what is read after a macro name, and the body
//!     spec of an environment decides whether its content is parsed or kept raw.
//!
//!     Raw content (math, character arguments, raw environment bodies) is cut directly
//!     out of the source; the cursor then re-lexes from the byte after it.

use super::tokens::Token;
use super::MarkupParser;
use crate::ast::{
    Argument, ArgumentValue, BlockMode, Invocation, MathDisplay, Node, NodeKind, NodeList,
    ParsingContext, Position, Range, SourceLocation,
};
use crate::error::{FlmError, Result};
use crate::specinfo::{ArgumentKind, BodySpec, Definitions, SpecRef};
use logos::Logos;
use std::ops::Range as ByteRange;
use std::sync::Arc;

/// Reads `\macro{...}`, `\begin{env}...\end{env}`, groups, comments and math.
#[derive(Debug, Clone, Default)]
pub struct LatexLikeReader;

impl MarkupParser for LatexLikeReader {
    fn parse(
        &self,
        context: &Arc<ParsingContext>,
        definitions: &Definitions,
        mode: BlockMode,
    ) -> Result<NodeList> {
        let source: &str = &context.source;
        let mut reader = Reader::new(source, context.clone(), definitions);
        reader.read_list(&Stop::EndOfInput, mode)
    }
}

type Lexed = (std::result::Result<Token, ()>, ByteRange<usize>);

struct Cursor<'s> {
    source: &'s str,
    lexer: logos::Lexer<'s, Token>,
    base: usize,
    peeked: Option<Option<Lexed>>,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            lexer: Token::lexer(source),
            base: 0,
            peeked: None,
        }
    }

    fn seek(&mut self, offset: usize) {
        self.base = offset;
        self.lexer = Token::lexer(&self.source[offset..]);
        self.peeked = None;
    }

    fn lex(&mut self) -> Option<Lexed> {
        let token = self.lexer.next()?;
        let span = self.lexer.span();
        let span = self.base + span.start..self.base + span.end;
        match token {
            Ok(Token::Newline) | Ok(Token::BlankLine) => match blank_line_end(self.source, span.start) {
                Some(end) => {
                    self.seek(end);
                    Some((Ok(Token::BlankLine), span.start..end))
                }
                None => Some((token, span)),
            },
            _ => Some((token, span)),
        }
    }

    fn next(&mut self) -> Option<Lexed> {
        match self.peeked.take() {
            Some(lexed) => lexed,
            None => self.lex(),
        }
    }

    fn peek(&mut self) -> Option<&Lexed> {
        if self.peeked.is_none() {
            let lexed = self.lex();
            self.peeked = Some(lexed);
        }
        self.peeked.as_ref().and_then(|p| p.as_ref())
    }

    /// Byte offset of the next unread token.
    fn offset(&self) -> usize {
        match &self.peeked {
            Some(Some((_, span))) => span.start,
            _ => self.base + self.lexer.span().end,
        }
    }
}

/// End of the blank line starting with the line break at `start`, if the next line
/// holds only spaces and tabs. Following empty lines and indentation are included.
fn blank_line_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    while matches!(bytes.get(pos), Some(b' ' | b'\t')) {
        pos += 1;
    }
    if bytes.get(pos) != Some(&b'\n') {
        return None;
    }
    while matches!(bytes.get(pos), Some(b' ' | b'\t' | b'\n')) {
        pos += 1;
    }
    Some(pos)
}

#[derive(Debug, Clone, PartialEq)]
enum Stop {
    EndOfInput,
    CloseBrace,
    CloseBracket,
    End(String),
}

impl Stop {
    fn describe(&self) -> String {
        match self {
            Stop::EndOfInput => "end of input".to_string(),
            Stop::CloseBrace => "‘}’".to_string(),
            Stop::CloseBracket => "‘]’".to_string(),
            Stop::End(name) => format!("‘\\end{{{}}}’", name),
        }
    }
}

#[derive(Default)]
struct PendingText {
    span: Option<ByteRange<usize>>,
    text: String,
}

impl PendingText {
    fn push(&mut self, span: ByteRange<usize>, text: &str) {
        self.span = Some(match self.span.take() {
            Some(existing) => existing.start..span.end,
            None => span,
        });
        self.text.push_str(text);
    }
}

struct Reader<'s, 'd> {
    source: &'s str,
    context: Arc<ParsingContext>,
    location: SourceLocation,
    cursor: Cursor<'s>,
    global: &'d Definitions,
    local: Vec<Definitions>,
}

impl<'s, 'd> Reader<'s, 'd> {
    fn new(source: &'s str, context: Arc<ParsingContext>, global: &'d Definitions) -> Self {
        let location = SourceLocation::new(source).with_line_offset(context.line_offset);
        Self {
            source,
            context,
            location,
            cursor: Cursor::new(source),
            global,
            local: Vec::new(),
        }
    }

    fn position(&self, offset: usize) -> Position {
        self.location.byte_to_position(offset)
    }

    fn range(&self, span: ByteRange<usize>) -> Range {
        self.location.byte_range_to_ast_range(&span)
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> FlmError {
        FlmError::parse(message, self.position(offset))
    }

    fn lookup_macro(&self, name: &str) -> Option<SpecRef> {
        self.local
            .iter()
            .rev()
            .find_map(|defs| defs.lookup_macro(name))
            .or_else(|| self.global.lookup_macro(name))
            .cloned()
    }

    fn lookup_environment(&self, name: &str) -> Option<SpecRef> {
        self.local
            .iter()
            .rev()
            .find_map(|defs| defs.lookup_environment(name))
            .or_else(|| self.global.lookup_environment(name))
            .cloned()
    }

    fn lookup_specials(&self, chars: &str) -> Option<SpecRef> {
        self.local
            .iter()
            .rev()
            .find_map(|defs| defs.lookup_specials(chars))
            .or_else(|| self.global.lookup_specials(chars))
            .cloned()
    }

    fn flush_text(&self, pending: &mut PendingText, nodes: &mut Vec<Node>) {
        if let Some(span) = pending.span.take() {
            let text = std::mem::take(&mut pending.text);
            nodes.push(Node::new(
                NodeKind::Characters(text),
                self.range(span),
                self.context.clone(),
            ));
        }
    }

    fn read_list(&mut self, stop: &Stop, mode: BlockMode) -> Result<NodeList> {
        let start = self.cursor.offset();
        let mut nodes = Vec::new();
        let mut pending = PendingText::default();

        let end = loop {
            let offset = self.cursor.offset();
            let (token, span) = match self.cursor.peek().cloned() {
                Some(lexed) => lexed,
                None if *stop == Stop::EndOfInput => break offset,
                None => {
                    return Err(self.error(
                        format!("Unexpected end of input, expected {}", stop.describe()),
                        offset,
                    ))
                }
            };
            let token = token.map_err(|_| {
                self.error(
                    format!("Unexpected character ‘{}’", &self.source[span.clone()]),
                    span.start,
                )
            })?;

            match token {
                Token::CloseBrace => {
                    self.cursor.next();
                    if *stop == Stop::CloseBrace {
                        break span.start;
                    }
                    return Err(self.error("Unexpected ‘}’", span.start));
                }
                Token::CloseBracket if *stop == Stop::CloseBracket => {
                    self.cursor.next();
                    break span.start;
                }
                Token::OpenBrace => {
                    self.flush_text(&mut pending, &mut nodes);
                    self.cursor.next();
                    let group = self.read_group(span.start, mode)?;
                    nodes.push(group);
                }
                Token::Comment => {
                    self.flush_text(&mut pending, &mut nodes);
                    self.cursor.next();
                    let text = self.source[span.clone()]
                        .trim_start_matches('%')
                        .trim_end_matches('\n')
                        .to_string();
                    nodes.push(Node::new(
                        NodeKind::Comment(text),
                        self.range(span),
                        self.context.clone(),
                    ));
                }
                Token::MacroName | Token::ControlSymbol => {
                    self.cursor.next();
                    let name = &self.source[span.start + 1..span.end];
                    match name {
                        "(" | "[" => {
                            self.flush_text(&mut pending, &mut nodes);
                            let math = self.read_math(span, name == "[")?;
                            nodes.push(math);
                        }
                        ")" | "]" => {
                            return Err(self.error(format!("Unexpected ‘\\{}’", name), span.start))
                        }
                        "begin" => {
                            self.flush_text(&mut pending, &mut nodes);
                            let env = self.read_environment(span.start)?;
                            nodes.push(env);
                        }
                        "end" => {
                            let env_name = self
                                .try_raw_argument(b'{', b'}')?
                                .ok_or_else(|| self.error("Expected ‘{’ after \\end", span.end))?;
                            match stop {
                                Stop::End(expected) if *expected == env_name => {
                                    self.flush_text(&mut pending, &mut nodes);
                                    break span.start;
                                }
                                _ => {
                                    return Err(self.error(
                                        format!(
                                            "Unexpected ‘\\end{{{}}}’, expected {}",
                                            env_name,
                                            stop.describe()
                                        ),
                                        span.start,
                                    ))
                                }
                            }
                        }
                        _ => {
                            self.flush_text(&mut pending, &mut nodes);
                            let node = self.read_macro(name, span.start, false)?;
                            nodes.push(node);
                        }
                    }
                }
                token => {
                    let specials = token
                        .specials_chars()
                        .and_then(|chars| self.lookup_specials(chars).map(|spec| (chars, spec)));
                    self.cursor.next();
                    match specials {
                        Some((chars, spec)) => {
                            self.flush_text(&mut pending, &mut nodes);
                            let node = self.finish_invocation(
                                NodeKind::Specials,
                                chars,
                                Vec::new(),
                                None,
                                spec,
                                span.start,
                            )?;
                            nodes.push(node);
                        }
                        None => {
                            debug_assert!(token.is_text_like());
                            pending.push(span.clone(), &self.source[span]);
                        }
                    }
                }
            }
        };

        self.flush_text(&mut pending, &mut nodes);
        Ok(NodeList::new(nodes, mode, self.range(start..end)))
    }

    fn read_group(&mut self, start: usize, parent_mode: BlockMode) -> Result<Node> {
        let mode = match parent_mode {
            BlockMode::Inline => BlockMode::Inline,
            _ => BlockMode::Infer,
        };
        let nodes = self.read_list(&Stop::CloseBrace, mode)?;
        let end = self.cursor.offset();
        Ok(Node::new(
            NodeKind::Group {
                delimiters: ("{".to_string(), "}".to_string()),
                nodes,
            },
            self.range(start..end),
            self.context.clone(),
        ))
    }

    fn read_math(&mut self, open: ByteRange<usize>, display: bool) -> Result<Node> {
        let (open_delim, close_delim) = if display {
            ("\\[", "\\]")
        } else {
            ("\\(", "\\)")
        };
        let content_start = open.end;
        let close = self.source[content_start..]
            .find(close_delim)
            .map(|i| content_start + i)
            .ok_or_else(|| {
                self.error(
                    format!("Unterminated math, expected ‘{}’", close_delim),
                    open.start,
                )
            })?;
        let end = close + close_delim.len();
        self.cursor.seek(end);
        Ok(Node::new(
            NodeKind::Math {
                display: if display {
                    MathDisplay::Display
                } else {
                    MathDisplay::Inline
                },
                delimiters: (open_delim.to_string(), close_delim.to_string()),
                content: self.source[content_start..close].to_string(),
            },
            self.range(open.start..end),
            self.context.clone(),
        ))
    }

    fn read_environment(&mut self, start: usize) -> Result<Node> {
        let name = self
            .try_raw_argument(b'{', b'}')?
            .ok_or_else(|| self.error("Expected ‘{’ after \\begin", start))?;
        let spec = self
            .lookup_environment(&name)
            .ok_or_else(|| self.error(format!("Unknown environment ‘{}’", name), start))?;
        let arguments = self.read_arguments(&spec, &format!("\\begin{{{}}}", name), false, start)?;

        let body = match spec.body().unwrap_or(BodySpec::Parsed(BlockMode::Infer)) {
            BodySpec::Parsed(mode) => {
                let local = spec.body_definitions();
                let pushed = local.is_some();
                if let Some(defs) = local {
                    self.local.push(defs);
                }
                let body = self.read_list(&Stop::End(name.clone()), mode);
                if pushed {
                    self.local.pop();
                }
                body?
            }
            BodySpec::Raw => self.read_raw_body(&name, start)?,
        };

        self.finish_invocation(
            NodeKind::Environment,
            &name,
            arguments,
            Some(body),
            spec,
            start,
        )
    }

    fn read_raw_body(&mut self, name: &str, start: usize) -> Result<NodeList> {
        let body_start = self.cursor.offset();
        let needle = format!("\\end{{{}}}", name);
        let body_end = self.source[body_start..]
            .find(&needle)
            .map(|i| body_start + i)
            .ok_or_else(|| {
                self.error(
                    format!("Unexpected end of input, expected ‘{}’", needle),
                    start,
                )
            })?;
        let range = self.range(body_start..body_end);
        let content = Node::new(
            NodeKind::Characters(self.source[body_start..body_end].to_string()),
            range.clone(),
            self.context.clone(),
        );
        self.cursor.seek(body_end + needle.len());
        Ok(NodeList::new(vec![content], BlockMode::Inline, range))
    }

    fn read_macro(&mut self, name: &str, start: usize, in_tack_on: bool) -> Result<Node> {
        let spec = self
            .lookup_macro(name)
            .ok_or_else(|| self.error(format!("Unknown macro ‘\\{}’", name), start))?;
        self.read_macro_with(name, spec, start, in_tack_on)
    }

    fn read_macro_with(
        &mut self,
        name: &str,
        spec: SpecRef,
        start: usize,
        in_tack_on: bool,
    ) -> Result<Node> {
        let arguments = self.read_arguments(&spec, &format!("\\{}", name), in_tack_on, start)?;
        self.finish_invocation(NodeKind::Macro, name, arguments, None, spec, start)
    }

    fn finish_invocation(
        &mut self,
        kind: fn(Invocation) -> NodeKind,
        name: &str,
        arguments: Vec<Argument>,
        body: Option<NodeList>,
        spec: SpecRef,
        start: usize,
    ) -> Result<Node> {
        let end = self.cursor.offset();
        let node = Node::new(
            kind(Invocation {
                name: name.to_string(),
                arguments,
                body,
                spec: Some(spec.clone()),
            }),
            self.range(start..end),
            self.context.clone(),
        );
        if self.context.standalone_mode && !spec.allowed_in_standalone_mode() {
            return Err(self.error(
                format!(
                    "‘{}’ is not allowed here (standalone mode).",
                    node.display_name()
                ),
                start,
            ));
        }
        spec.finalize(node)
            .map_err(|err| err.or_at(self.position(start)))
    }

    fn read_arguments(
        &mut self,
        spec: &SpecRef,
        owner: &str,
        in_tack_on: bool,
        start: usize,
    ) -> Result<Vec<Argument>> {
        let mut arguments = Vec::new();
        for arg in spec.arguments() {
            let value = match &arg.kind {
                ArgumentKind::Star => {
                    let offset = self.cursor.offset();
                    if self.source.as_bytes().get(offset) == Some(&b'*') {
                        self.cursor.seek(offset + 1);
                        ArgumentValue::Flag
                    } else {
                        ArgumentValue::Absent
                    }
                }
                ArgumentKind::Mandatory(mode) => match self.find_opener(b'{') {
                    Some(opener) => {
                        self.cursor.seek(opener + 1);
                        ArgumentValue::Nodes(self.read_list(&Stop::CloseBrace, *mode)?)
                    }
                    None => {
                        return Err(self.error(
                            format!("Missing argument ‘{}’ for ‘{}’", arg.name, owner),
                            start,
                        ))
                    }
                },
                ArgumentKind::Optional(mode) => match self.find_opener(b'[') {
                    Some(opener) => {
                        self.cursor.seek(opener + 1);
                        ArgumentValue::Nodes(self.read_list(&Stop::CloseBracket, *mode)?)
                    }
                    None => ArgumentValue::Absent,
                },
                ArgumentKind::Chars => match self.try_raw_argument(b'{', b'}')? {
                    Some(chars) => ArgumentValue::Chars(chars),
                    None => {
                        return Err(self.error(
                            format!("Missing argument ‘{}’ for ‘{}’", arg.name, owner),
                            start,
                        ))
                    }
                },
                ArgumentKind::OptionalChars => match self.try_raw_argument(b'[', b']')? {
                    Some(chars) => ArgumentValue::Chars(chars),
                    None => ArgumentValue::Absent,
                },
                ArgumentKind::TackOn { .. } if in_tack_on => ArgumentValue::Absent,
                ArgumentKind::TackOn { macros, spec } => {
                    let mut tacked = Vec::new();
                    while let Some((name, at)) = self.find_tack_on(macros) {
                        self.cursor.seek(at + 1 + name.len());
                        tacked.push(self.read_macro_with(&name, spec.clone(), at, true)?);
                    }
                    ArgumentValue::Invocations(tacked)
                }
            };
            arguments.push(Argument {
                name: arg.name.clone(),
                value,
            });
        }
        Ok(arguments)
    }

    /// Offset after spaces, tabs and at most one line break.
    fn skip_whitespace(&self, offset: usize) -> usize {
        let bytes = self.source.as_bytes();
        let mut pos = offset;
        let mut seen_newline = false;
        while let Some(&b) = bytes.get(pos) {
            match b {
                b' ' | b'\t' => pos += 1,
                b'\n' if !seen_newline => {
                    seen_newline = true;
                    pos += 1;
                }
                _ => break,
            }
        }
        pos
    }

    /// Position of `opener` if it is the next non-blank character.
    fn find_opener(&self, opener: u8) -> Option<usize> {
        let pos = self.skip_whitespace(self.cursor.offset());
        (self.source.as_bytes().get(pos) == Some(&opener)).then_some(pos)
    }

    /// Raw characters between balanced delimiters, if the next non-blank character opens them.
    fn try_raw_argument(&mut self, open: u8, close: u8) -> Result<Option<String>> {
        let Some(opener) = self.find_opener(open) else {
            return Ok(None);
        };
        let bytes = self.source.as_bytes();
        let mut depth = 0usize;
        let mut pos = opener + 1;
        while pos < bytes.len() {
            let b = bytes[pos];
            if b == b'\\' {
                pos += 2;
                continue;
            }
            if b == open {
                depth += 1;
            } else if b == close {
                if depth == 0 {
                    let content = self.source[opener + 1..pos].to_string();
                    self.cursor.seek(pos + 1);
                    return Ok(Some(content));
                }
                depth -= 1;
            }
            pos += 1;
        }
        Err(self.error(
            format!("Missing closing ‘{}’", close as char),
            opener,
        ))
    }

    /// Name and offset of a directly following `\name` from `macros`.
    fn find_tack_on(&self, macros: &[String]) -> Option<(String, usize)> {
        let at = self.skip_whitespace(self.cursor.offset());
        let rest = self.source.get(at..)?;
        let name: String = rest
            .strip_prefix('\\')?
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        macros.contains(&name).then_some((name, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_context::RenderContext;
    use crate::specinfo::{collect_labels, ArgumentSpec, LabelSpec, ParagraphBreakSpec, SpecInfo};

    #[derive(Debug)]
    struct Plain(Vec<ArgumentSpec>, Option<BodySpec>, bool);

    impl SpecInfo for Plain {
        fn arguments(&self) -> Vec<ArgumentSpec> {
            self.0.clone()
        }
        fn body(&self) -> Option<BodySpec> {
            self.1
        }
        fn is_block_level(&self) -> bool {
            self.2
        }
        fn render(&self, _node: &Node, _ctx: &RenderContext<'_>) -> Result<String> {
            Ok(String::new())
        }
    }

    fn vocabulary() -> Definitions {
        Definitions::new()
            .with_macro(
                "section",
                Arc::new(Plain(
                    vec![
                        ArgumentSpec::star("star"),
                        ArgumentSpec::mandatory("text"),
                        ArgumentSpec::labels("label"),
                    ],
                    None,
                    true,
                )),
            )
            .with_macro(
                "cite",
                Arc::new(Plain(
                    vec![
                        ArgumentSpec::optional("extra"),
                        ArgumentSpec::chars("keys"),
                        ArgumentSpec::tack_on(
                            "more",
                            &["cite"],
                            Arc::new(Plain(
                                vec![ArgumentSpec::optional("extra"), ArgumentSpec::chars("keys")],
                                None,
                                false,
                            )),
                        ),
                    ],
                    None,
                    false,
                )),
            )
            .with_macro("emph", Arc::new(Plain(vec![ArgumentSpec::mandatory("text")], None, false)))
            .with_environment(
                "equation",
                Arc::new(Plain(vec![], Some(BodySpec::Raw), true)),
            )
            .with_environment(
                "quote",
                Arc::new(Plain(vec![], Some(BodySpec::Parsed(BlockMode::Block)), true)),
            )
            .with_specials("\n\n", Arc::new(ParagraphBreakSpec))
    }

    fn parse(source: &str) -> Result<NodeList> {
        let context = Arc::new(ParsingContext::new(source, "test"));
        LatexLikeReader.parse(&context, &vocabulary(), BlockMode::Infer)
    }

    fn kinds(list: &NodeList) -> Vec<String> {
        list.iter().map(|n| n.display_name()).collect()
    }

    #[test]
    fn test_text_is_merged_into_one_node() {
        let list = parse("Hello - world\nagain~ok").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.nodes()[0].chars(), Some("Hello - world\nagain~ok"));
        assert_eq!(list.range().span, 0..22);
    }

    #[test]
    fn test_macro_with_star_text_and_labels() {
        let list = parse("\\section*{Intro}\\label{sec:intro} Text").unwrap();
        assert_eq!(kinds(&list), vec!["\\section", "characters"]);
        let section = &list.nodes()[0];
        let inv = section.invocation().unwrap();
        assert!(inv.flag("star"));
        assert_eq!(inv.nodes_arg("text").unwrap().nodes()[0].chars(), Some("Intro"));
        assert_eq!(inv.nodes_arg("text").unwrap().mode(), BlockMode::Inline);
        let labels = collect_labels(inv.tacked_on("label"), &["sec", "topic"]).unwrap();
        assert_eq!(labels, vec![("sec".to_string(), "intro".to_string())]);
        assert_eq!(section.verbatim(), "\\section*{Intro}\\label{sec:intro}");
    }

    #[test]
    fn test_label_prefix_is_checked() {
        let list = parse("\\section{A}\\label{fig:x}").unwrap();
        let inv = list.nodes()[0].invocation().unwrap();
        let err = collect_labels(inv.tacked_on("label"), &["sec", "topic"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument label ‘fig:x’ has incorrect prefix ‘fig:’; expected one of ‘sec:’, ‘topic:’ @ 0:11"
        );
    }

    #[test]
    fn test_chained_citations_are_tacked_on() {
        let list = parse("see \\cite[p.~4]{a}\\cite{b,c} done").unwrap();
        assert_eq!(kinds(&list), vec!["characters", "\\cite", "characters"]);
        let inv = list.nodes()[1].invocation().unwrap();
        assert_eq!(inv.chars_arg("keys"), Some("a"));
        assert!(inv.nodes_arg("extra").is_some());
        let more = inv.tacked_on("more");
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].invocation().unwrap().chars_arg("keys"), Some("b,c"));
    }

    #[test]
    fn test_blank_line_becomes_specials() {
        let list = parse("one\n\ntwo").unwrap();
        assert_eq!(kinds(&list), vec!["characters", "\\n\\n", "characters"]);
        assert!(list.nodes()[1].spec().unwrap().is_paragraph_break_marker());
    }

    #[test]
    fn test_indented_lines_are_text() {
        let list = parse("First line\n  second line.").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.nodes()[0].chars(), Some("First line\n  second line."));

        let list = parse("\\begin{quote}\n  Hi \\emph{there}\n  \\section{A}\n\\end{quote}").unwrap();
        let body = list.nodes()[0].invocation().unwrap().body.clone().unwrap();
        assert_eq!(
            kinds(&body),
            vec!["characters", "\\emph", "characters", "\\section", "characters"]
        );
        assert_eq!(body.nodes()[0].chars(), Some("\n  Hi "));
    }

    #[test]
    fn test_blank_line_with_indentation() {
        let list = parse("one\n  \n\t\n   two").unwrap();
        assert_eq!(kinds(&list), vec!["characters", "\\n\\n", "characters"]);
        assert_eq!(list.nodes()[1].verbatim(), "\n  \n\t\n   ");
        assert_eq!(list.nodes()[2].chars(), Some("two"));
    }

    #[test]
    fn test_groups_comments_and_math() {
        let list = parse("a {b \\emph{c}} % note\n\\(x^2\\) \\[y\\]").unwrap();
        assert_eq!(
            kinds(&list),
            vec![
                "characters",
                "group",
                "characters",
                "comment",
                "inline math",
                "characters",
                "display math"
            ]
        );
        match list.nodes()[4].kind() {
            NodeKind::Math { content, .. } => assert_eq!(content, "x^2"),
            other => panic!("unexpected {:?}", other),
        }
        match list.nodes()[3].kind() {
            NodeKind::Comment(text) => assert_eq!(text, " note"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_raw_environment_body() {
        let list = parse("\\begin{equation}a \\\\ b \\label{eq:x}\\end{equation}").unwrap();
        let inv = list.nodes()[0].invocation().unwrap();
        assert_eq!(inv.name, "equation");
        let body = inv.body.as_ref().unwrap();
        assert_eq!(body.nodes()[0].chars(), Some("a \\\\ b \\label{eq:x}"));
    }

    #[test]
    fn test_parsed_environment_body() {
        let list = parse("\\begin{quote}\nHi \\emph{there}\n\\end{quote}").unwrap();
        let body = list.nodes()[0].invocation().unwrap().body.clone().unwrap();
        assert_eq!(body.mode(), BlockMode::Block);
        assert_eq!(kinds(&body), vec!["characters", "\\emph", "characters"]);
    }

    #[test]
    fn test_structural_errors_carry_positions() {
        let err = parse("ok\n\\unknown{x}").unwrap_err();
        assert_eq!(err.to_string(), "Unknown macro ‘\\unknown’ @ 1:0");

        let err = parse("{open").unwrap_err();
        assert!(err.to_string().starts_with("Unexpected end of input, expected ‘}’"));

        let err = parse("a}").unwrap_err();
        assert_eq!(err.position(), Some(Position::new(0, 1)));

        let err = parse("\\begin{quote}x\\end{other}").unwrap_err();
        assert!(err.to_string().contains("expected ‘\\end{quote}’"));

        let err = parse("\\emph").unwrap_err();
        assert_eq!(err.to_string(), "Missing argument ‘text’ for ‘\\emph’ @ 0:0");
    }

    #[test]
    fn test_standalone_mode_rejects_disallowed_specs() {
        let context = Arc::new(ParsingContext {
            standalone_mode: true,
            ..ParsingContext::new("\\emph{x}", "test")
        });
        let err = LatexLikeReader
            .parse(&context, &vocabulary(), BlockMode::Inline)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "‘\\emph’ is not allowed here (standalone mode). @ 0:0"
        );
    }

    #[test]
    fn test_label_spec_is_standalone_safe() {
        assert!(LabelSpec.allowed_in_standalone_mode());
    }
}
