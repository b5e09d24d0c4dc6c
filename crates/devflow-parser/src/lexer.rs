//! Line-oriented tokenizer for the textual IR.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::ParseError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    /// `%name`
    Value(String),
    /// Identifier, possibly `::`-qualified: `Tensor`, `aten::add`, `block0`.
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Eq,
    Question,
    Arrow,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Value(name) => format!("'%{name}'"),
            Self::Ident(name) => format!("'{name}'"),
            Self::Int(v) => format!("'{v}'"),
            Self::Float(v) => format!("'{v:?}'"),
            Self::Str(s) => format!("{s:?}"),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Comma => "','".into(),
            Self::Colon => "':'".into(),
            Self::Eq => "'='".into(),
            Self::Question => "'?'".into(),
            Self::Arrow => "'->'".into(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Splits one source line into tokens. `#` starts a comment.
pub(crate) fn tokenize(line: &str, number: usize) -> Result<Vec<Token>, ParseError> {
    let error = |message: String| ParseError::Syntax {
        line: number,
        message,
    };
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => break,
            '(' | ')' | '[' | ']' | ',' | ':' | '=' | '?' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '=' => Token::Eq,
                    _ => Token::Question,
                });
            }
            '%' => {
                chars.next();
                let name = take_while(line, &mut chars, is_value_char);
                if name.is_empty() {
                    return Err(error("expected a value name after '%'".into()));
                }
                tokens.push(Token::Value(name.to_string()));
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(lex_string(&mut chars).map_err(error)?));
            }
            '-' if line[start + 1..].starts_with('>') => {
                chars.next();
                chars.next();
                tokens.push(Token::Arrow);
            }
            '-' if line[start + 1..].starts_with("inf")
                && !line[start + 4..].starts_with(is_ident_continue) =>
            {
                for _ in 0..4 {
                    chars.next();
                }
                tokens.push(Token::Float(f64::NEG_INFINITY));
            }
            '-' if line[start + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                chars.next();
                tokens.push(lex_number(line, start, &mut chars).map_err(error)?);
            }
            c if c.is_ascii_digit() => {
                tokens.push(lex_number(line, start, &mut chars).map_err(error)?);
            }
            c if is_ident_start(c) => {
                tokens.push(Token::Ident(lex_ident(line, start, &mut chars)));
            }
            other => return Err(error(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn take_while<'a>(
    line: &'a str,
    chars: &mut Peekable<CharIndices<'a>>,
    pred: impl Fn(char) -> bool,
) -> &'a str {
    let start = chars.peek().map_or(line.len(), |&(i, _)| i);
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    &line[start..end]
}

/// Identifiers may be qualified with `::`, as in `aten::add`.
fn lex_ident<'a>(line: &'a str, start: usize, chars: &mut Peekable<CharIndices<'a>>) -> String {
    let mut end = start + take_while(line, chars, is_ident_continue).len();
    while line[end..].starts_with("::") && line[end + 2..].starts_with(is_ident_start) {
        chars.next();
        chars.next();
        end += 2 + take_while(line, chars, is_ident_continue).len();
    }
    line[start..end].to_string()
}

/// Lexes an integer or float. `start` points at the first character, which
/// may be an already consumed `-`.
fn lex_number<'a>(
    line: &'a str,
    start: usize,
    chars: &mut Peekable<CharIndices<'a>>,
) -> Result<Token, String> {
    let mut is_float = false;
    take_while(line, chars, |c| c.is_ascii_digit());
    let mut end = chars.peek().map_or(line.len(), |&(i, _)| i);

    if line[end..].starts_with('.') && line[end + 1..].starts_with(|c: char| c.is_ascii_digit()) {
        is_float = true;
        chars.next();
        take_while(line, chars, |c| c.is_ascii_digit());
        end = chars.peek().map_or(line.len(), |&(i, _)| i);
    }
    if line[end..].starts_with(['e', 'E']) {
        is_float = true;
        chars.next();
        if let Some(&(_, '+' | '-')) = chars.peek() {
            chars.next();
        }
        take_while(line, chars, |c| c.is_ascii_digit());
        end = chars.peek().map_or(line.len(), |&(i, _)| i);
    }

    let text = &line[start..end];
    if is_float {
        text.parse()
            .map(Token::Float)
            .map_err(|_| format!("invalid float literal '{text}'"))
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| format!("invalid integer literal '{text}'"))
    }
}

/// Lexes the body of a string literal after the opening quote.
///
/// Accepts the escapes produced by `{:?}` formatting of `str`.
fn lex_string(chars: &mut Peekable<CharIndices<'_>>) -> Result<String, String> {
    let mut out = String::new();
    loop {
        let Some((_, c)) = chars.next() else {
            return Err("unterminated string literal".into());
        };
        match c {
            '"' => return Ok(out),
            '\\' => {
                let Some((_, escape)) = chars.next() else {
                    return Err("unterminated string literal".into());
                };
                out.push(match escape {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    'u' => lex_unicode_escape(chars)?,
                    other => return Err(format!("unknown escape '\\{other}'")),
                });
            }
            c => out.push(c),
        }
    }
}

fn lex_unicode_escape(chars: &mut Peekable<CharIndices<'_>>) -> Result<char, String> {
    if !matches!(chars.next(), Some((_, '{'))) {
        return Err("expected '{' after '\\u'".into());
    }
    let mut hex = String::new();
    loop {
        match chars.next() {
            Some((_, '}')) => break,
            Some((_, c)) if c.is_ascii_hexdigit() => hex.push(c),
            _ => return Err("malformed unicode escape".into()),
        }
    }
    u32::from_str_radix(&hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("invalid unicode escape '\\u{{{hex}}}'"))
}
