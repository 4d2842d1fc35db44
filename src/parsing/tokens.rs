//! Token definitions for the markup reader
//!
//! The tokens are defined using the logos derive macro. Runs of ordinary text are
//! a single token; everything the reader has to look at (backslash commands, braces,
//! brackets, comments, line breaks and the specials characters) is split out.
//!
//! Every pattern is a fixed string or a simple run, so no token can claim a prefix it
//! fails to complete. Blank lines spread over several tokens (`\n`, indentation, `\n`)
//! are joined by the reader's cursor.
use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    // `\section`, `\emph`
    #[regex(r"\\[a-zA-Z]+")]
    MacroName,

    // `\%`, `\{`, `\(`, `\\`
    #[regex(r"\\[^a-zA-Z]")]
    ControlSymbol,

    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,

    // Comments swallow their line ending
    #[regex(r"%[^\n]*\n?")]
    Comment,

    // Two adjacent line breaks; the cursor extends it over surrounding indentation
    #[token("\n\n")]
    BlankLine,

    #[token("\n")]
    Newline,

    #[regex(r"[ \t]+")]
    Whitespace,

    #[token("~")]
    Tilde,
    #[token("---")]
    EmDash,
    #[token("--")]
    EnDash,
    #[token("-")]
    Hyphen,
    #[token("*")]
    Star,

    // Text content (catch-all for non-special characters)
    #[regex(r"[^\\{}\[\]%~\-*\n \t]+")]
    Text,
}

impl Token {
    /// Tokens that may stand for a specials invocation when the vocabulary defines one.
    pub fn specials_chars(&self) -> Option<&'static str> {
        match self {
            Token::BlankLine => Some("\n\n"),
            Token::Tilde => Some("~"),
            Token::EnDash => Some("--"),
            Token::EmDash => Some("---"),
            _ => None,
        }
    }

    /// Tokens that are plain characters when nothing else claims them.
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            Token::Text
                | Token::Whitespace
                | Token::Newline
                | Token::Hyphen
                | Token::Star
                | Token::Tilde
                | Token::EnDash
                | Token::EmDash
                | Token::BlankLine
                | Token::OpenBracket
                | Token::CloseBracket
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<(Token, &str)> {
        let mut lexer = Token::lexer(source);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next() {
            tokens.push((token.expect("valid token"), lexer.slice()));
        }
        tokens
    }

    #[test]
    fn test_macro_and_arguments() {
        assert_eq!(
            lex(r"\section*{Intro}"),
            vec![
                (Token::MacroName, r"\section"),
                (Token::Star, "*"),
                (Token::OpenBrace, "{"),
                (Token::Text, "Intro"),
                (Token::CloseBrace, "}"),
            ]
        );
    }

    #[test]
    fn test_control_symbols() {
        assert_eq!(
            lex(r"50\% \("),
            vec![
                (Token::Text, "50"),
                (Token::ControlSymbol, r"\%"),
                (Token::Whitespace, " "),
                (Token::ControlSymbol, r"\("),
            ]
        );
    }

    #[test]
    fn test_dashes_take_longest_match() {
        assert_eq!(
            lex("a-b--c---d"),
            vec![
                (Token::Text, "a"),
                (Token::Hyphen, "-"),
                (Token::Text, "b"),
                (Token::EnDash, "--"),
                (Token::Text, "c"),
                (Token::EmDash, "---"),
                (Token::Text, "d"),
            ]
        );
    }

    #[test]
    fn test_blank_line_vs_newline() {
        assert_eq!(
            lex("one\ntwo\n  \n\nthree"),
            vec![
                (Token::Text, "one"),
                (Token::Newline, "\n"),
                (Token::Text, "two"),
                (Token::Newline, "\n"),
                (Token::Whitespace, "  "),
                (Token::BlankLine, "\n\n"),
                (Token::Text, "three"),
            ]
        );
    }

    #[test]
    fn test_indented_line_after_newline() {
        assert_eq!(
            lex("a\n  \\item b"),
            vec![
                (Token::Text, "a"),
                (Token::Newline, "\n"),
                (Token::Whitespace, "  "),
                (Token::MacroName, r"\item"),
                (Token::Whitespace, " "),
                (Token::Text, "b"),
            ]
        );
    }

    #[test]
    fn test_comment_eats_line_ending() {
        assert_eq!(
            lex("a% note\nb"),
            vec![
                (Token::Text, "a"),
                (Token::Comment, "% note\n"),
                (Token::Text, "b"),
            ]
        );
    }

    #[test]
    fn test_lone_backslash_is_an_error() {
        let mut lexer = Token::lexer("\\");
        assert_eq!(lexer.next(), Some(Err(())));
    }

    #[test]
    fn test_token_predicates() {
        assert_eq!(Token::BlankLine.specials_chars(), Some("\n\n"));
        assert_eq!(Token::Text.specials_chars(), None);
        assert!(Token::Star.is_text_like());
        assert!(!Token::OpenBrace.is_text_like());
    }
}
