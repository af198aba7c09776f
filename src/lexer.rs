use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::MessageKind;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Activate,
    Deactivate,
    Opt,
    Alt,
    Loop,
    Else,
    Destroy,
    Note,
    Over,
    Left,
    Right,
    Of,
    Declare,
    As,
    Wait,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "activate" => Self::Activate,
            "deactivate" => Self::Deactivate,
            "opt" => Self::Opt,
            "alt" => Self::Alt,
            "loop" => Self::Loop,
            "else" => Self::Else,
            "destroy" => Self::Destroy,
            "note" => Self::Note,
            "over" => Self::Over,
            "left" => Self::Left,
            "right" => Self::Right,
            "of" => Self::Of,
            "declare" => Self::Declare,
            "as" => Self::As,
            "wait" => Self::Wait,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier that is not a reserved word: an entity reference.
    Entity(String),
    Keyword(Keyword),
    MessageType(MessageKind),
    /// Quoted string after escape processing and optional auto-wrap.
    Str(String),
    Number(u32),
    BlockOpen,
    BlockClose,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text, kept for diagnostics.
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").unwrap());
static ARROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([-~]>|<-)").unwrap());
static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"(\\"|[^"])*"(\{\d+\})?"#).unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[^\n]*").unwrap());

/// Converts source text into a token stream, or fails on the first character
/// sequence matching no rule. Whitespace is insignificant; newlines only feed
/// line/column tracking.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1usize;
    let mut column = 1usize;

    while let Some(ch) = rest.chars().next() {
        if ch == '\n' {
            line += 1;
            column = 1;
            rest = &rest[1..];
            continue;
        }
        if ch == ' ' || ch == '\t' || ch == '\r' {
            column += 1;
            rest = &rest[1..];
            continue;
        }
        if let Some(m) = COMMENT_RE.find(rest) {
            column += m.as_str().chars().count();
            rest = &rest[m.end()..];
            continue;
        }

        let (kind, lexeme) = match ch {
            '{' => (TokenKind::BlockOpen, "{".to_string()),
            '}' => (TokenKind::BlockClose, "}".to_string()),
            ',' => (TokenKind::Comma, ",".to_string()),
            '"' => match STRING_RE.find(rest) {
                Some(m) => {
                    let lexeme = m.as_str().to_string();
                    (TokenKind::Str(process_string(&lexeme)), lexeme)
                }
                None => return Err(lex_error(rest, line, column)),
            },
            '-' | '~' | '<' => match ARROW_RE.find(rest) {
                Some(m) => {
                    let kind = match m.as_str() {
                        "->" => MessageKind::Call,
                        "~>" => MessageKind::Send,
                        _ => MessageKind::Respond,
                    };
                    (TokenKind::MessageType(kind), m.as_str().to_string())
                }
                None => return Err(lex_error(rest, line, column)),
            },
            '0'..='9' => {
                let m = NUMBER_RE.find(rest).unwrap();
                let value: u32 = m
                    .as_str()
                    .parse()
                    .map_err(|_| Error::InvalidOperand(format!("number out of range: {}", m.as_str())))?;
                (TokenKind::Number(value), m.as_str().to_string())
            }
            _ => match IDENT_RE.find(rest) {
                Some(m) => {
                    let ident = m.as_str().to_string();
                    let kind = match Keyword::from_ident(&ident) {
                        Some(kw) => TokenKind::Keyword(kw),
                        None => TokenKind::Entity(ident.clone()),
                    };
                    (kind, ident)
                }
                None => return Err(lex_error(rest, line, column)),
            },
        };

        let consumed = lexeme.len();
        // Multi-line strings keep diagnostics honest.
        let newlines = lexeme.matches('\n').count();
        let next_column = match lexeme.rsplit_once('\n') {
            Some((_, tail)) => tail.chars().count() + 1,
            None => column + lexeme.chars().count(),
        };
        tokens.push(Token {
            kind,
            lexeme,
            line,
            column,
        });
        line += newlines;
        column = next_column;
        rest = &rest[consumed..];
    }

    Ok(tokens)
}

fn lex_error(rest: &str, line: usize, column: usize) -> Error {
    let text: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(20)
        .collect();
    Error::Lex { text, line, column }
}

/// Strips quotes, applies escapes, and reflows the text if the literal carried
/// a `{N}` auto-wrap suffix.
fn process_string(lexeme: &str) -> String {
    let mut body = &lexeme[1..];
    let mut wrap = 0usize;
    if body.ends_with('}') {
        if let Some(brace) = body.rfind('{') {
            wrap = body[brace + 1..body.len() - 1].parse().unwrap_or(0);
            body = &body[..brace];
        }
    }
    // Drop the closing quote.
    let body = &body[..body.len() - 1];

    let text = body
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
        .replace("\\n", "\n");

    if wrap > 0 { auto_wrap(&text, wrap) } else { text }
}

/// Greedy best-effort reflow: scan forward in `width`-character windows; an
/// existing newline inside the window restarts the scan past it, otherwise the
/// last space in the window (widening the window one character at a time when
/// it holds none) is replaced with a newline. Stops when the widened window
/// would reach end of text.
fn auto_wrap(text: &str, width: usize) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    while i + width < chars.len() {
        if let Some(pos) = (i..i + width).find(|&p| chars[p] == '\n') {
            i = pos + 1;
            continue;
        }
        let mut extend = 0usize;
        let brk = loop {
            let end = (i + width + extend).min(chars.len());
            let found = chars[i..end]
                .iter()
                .rposition(|&c| c == ' ')
                .map(|p| i + p)
                .unwrap_or(0);
            extend += 1;
            if i + width + extend == chars.len() {
                break 0;
            }
            if found >= 1 {
                break found;
            }
        };
        if brk == 0 {
            break;
        }
        chars[brk] = '\n';
        i = brk + 2;
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_keywords_and_entities() {
        let kinds = kinds("activate handler deactivate a1, b");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Activate),
                TokenKind::Entity("handler".into()),
                TokenKind::Keyword(Keyword::Deactivate),
                TokenKind::Entity("a1".into()),
                TokenKind::Comma,
                TokenKind::Entity("b".into()),
            ]
        );
    }

    #[test]
    fn maps_message_operators() {
        let kinds = kinds("a->b a~>b a<-b");
        let arrows: Vec<_> = kinds
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::MessageType(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(
            arrows,
            vec![MessageKind::Call, MessageKind::Send, MessageKind::Respond]
        );
    }

    #[test]
    fn processes_string_escapes() {
        let kinds = kinds(r#""line one\nline two\t\"quoted\"""#);
        assert_eq!(
            kinds,
            vec![TokenKind::Str("line one\nline two\t\"quoted\"".into())]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let kinds = kinds("a->b \"hi\" # comment \"not a string\"\ndestroy a");
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds[5], TokenKind::Entity("a".into()));
    }

    #[test]
    fn rejects_unknown_text() {
        let err = tokenize("a->b @oops").unwrap_err();
        match err {
            Error::Lex { text, line, column } => {
                assert_eq!(text, "@oops");
                assert_eq!(line, 1);
                assert_eq!(column, 6);
            }
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = tokenize("a->b \"x\"\n\ndestroy a").unwrap();
        let destroy = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Keyword(Keyword::Destroy))
            .unwrap();
        assert_eq!(destroy.line, 3);
        assert_eq!(destroy.column, 1);
    }

    #[test]
    fn wrap_replaces_last_space_in_window() {
        assert_eq!(auto_wrap("one two three", 8), "one two\nthree");
    }

    #[test]
    fn wrap_keeps_existing_newlines() {
        assert_eq!(auto_wrap("ab\ncd ef gh", 5), "ab\ncd\nef gh");
    }

    #[test]
    fn wrap_widens_window_when_no_space_found() {
        // No space inside the first 4-char window; the search widens until it
        // finds one, then breaks there.
        assert_eq!(auto_wrap("abcdef gh ij", 4), "abcdef\ngh ij");
    }

    #[test]
    fn wrap_stops_when_window_reaches_end() {
        assert_eq!(auto_wrap("abcdefghij", 4), "abcdefghij");
    }

    #[test]
    fn wrap_suffix_applies_to_literal() {
        let kinds = kinds("\"alpha beta gamma\"{10}");
        assert_eq!(kinds, vec![TokenKind::Str("alpha\nbeta gamma".into())]);
    }
}
