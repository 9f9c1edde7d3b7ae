//! Tokenizer - Splits a command line into shell-like tokens
//!
//! Tokens are separated by whitespace. The following spans are kept as
//! one token even if they contain whitespace:
//! - `'...'` and `"..."` (quotes stripped, content trimmed, escapes decoded)
//! - user mentions `@**name**`, `@_**name**`, group mentions `@_*group*`
//! - channel mentions `#**channel**`
//! - fenced code blocks (kept verbatim, fences included)
//!
//! Plain words get the same escape decoding as quoted spans, so `\\-x`
//! becomes `\-x`, which later stages treat as a literal `-x` argument.

use crate::application::errors::ParseError;
use crate::domain::entities::{Token, TokenKind};

const FENCE: &str = "```";

/// Split `raw` into tokens
pub fn tokenize(raw: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if starts_with(&chars, i, FENCE) {
            let end = find(&chars, i + FENCE.len(), FENCE)
                .ok_or(ParseError::UnterminatedCodeBlock(i))?
                + FENCE.len();
            tokens.push(Token::new(collect(&chars[i..end]), TokenKind::CodeBlock));
            i = end;
            continue;
        }

        if let Some((end, kind)) = mention_span(&chars, i) {
            tokens.push(Token::new(collect(&chars[i..end]), kind));
            i = end;
            continue;
        }

        if c == '\'' || c == '"' {
            let close = closing_quote(&chars, i).ok_or(ParseError::UnterminatedQuote(i))?;
            if let Some(&next) = chars.get(close + 1) {
                if !next.is_whitespace() {
                    return Err(ParseError::TrailingQuote {
                        position: close + 1,
                        found: next,
                    });
                }
            }
            let inner = collect(&chars[i + 1..close]);
            tokens.push(Token::quoted(unescape(inner.trim())?));
            i = close + 1;
            continue;
        }

        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push(Token::word(unescape(&collect(&chars[start..i]))?));
    }

    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(tokens)
}

/// Render tokens back into a command line that tokenizes to the same values
pub fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| match t.kind {
            TokenKind::Word if !t.text.contains(char::is_whitespace) => escape_word(&t.text),
            TokenKind::Word | TokenKind::Quoted => quote(&t.text),
            _ => t.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap `text` in double quotes, escaping what the tokenizer would decode
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_word(text: &str) -> String {
    text.replace('\\', "\\\\")
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn starts_with(chars: &[char], at: usize, pat: &str) -> bool {
    let mut idx = at;
    for p in pat.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

fn find(chars: &[char], from: usize, pat: &str) -> Option<usize> {
    (from..chars.len()).find(|&i| starts_with(chars, i, pat))
}

/// End (exclusive) and kind of a mention span starting at `at`
fn mention_span(chars: &[char], at: usize) -> Option<(usize, TokenKind)> {
    let (open, close, kind) = if starts_with(chars, at, "@_**") {
        (4, "**", TokenKind::UserMention)
    } else if starts_with(chars, at, "@**") {
        (3, "**", TokenKind::UserMention)
    } else if starts_with(chars, at, "@_*") {
        (3, "*", TokenKind::UserMention)
    } else if starts_with(chars, at, "#**") {
        (3, "**", TokenKind::ChannelMention)
    } else {
        return None;
    };

    // Mentions never span lines.
    let end = (at + open..chars.len())
        .take_while(|&i| chars[i] != '\n')
        .find(|&i| starts_with(chars, i, close))?;
    Some((end + close.len(), kind))
}

/// Index of the quote closing the one at `open`
fn closing_quote(chars: &[char], open: usize) -> Option<usize> {
    let quote = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Decode backslash escapes; unknown escapes are kept as written
pub fn unescape(s: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            return Err(ParseError::InvalidEscape("\\".to_string()));
        };
        match next {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'x' | 'u' | 'U' => {
                let len = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..len).filter_map(|_| chars.next()).collect();
                let decoded = (hex.len() == len)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::InvalidEscape(format!("\\{}{}", next, hex)))?;
                out.push(decoded);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}
