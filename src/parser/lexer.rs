//! Hand-rolled tokenizer for the grammar in §6. Every token keeps the byte
//! range it came from in the original statement text so the parser can
//! slice out verbatim substrings for subquery capture (§9 "Ownership of
//! SQL-text fragments") without re-serializing anything it parsed.

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Ident(String),
    /// Raw text of a numeric literal, not yet parsed to i64/f64 (the
    /// parser decides integer-vs-float from whether it contains `.`/`e`).
    Number(String),
    /// Content of a `'...'` string literal with `''`-escapes already
    /// collapsed to a single quote.
    Str(String),
    /// A single- or multi-character punctuation/operator token:
    /// `( ) , . ; + - * / % = <> != < > <= >= ||`.
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_ident(&self, word: &str) -> bool {
        matches!(&self.kind, TokKind::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokKind::Punct(q) if *q == p)
    }

    pub fn ident_text(&self) -> Option<&str> {
        match &self.kind {
            TokKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

pub fn tokenize(src: &str) -> crate::error::Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // `--` line comment.
        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // `/* ... */` block comment.
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                i += 1;
            }
            i = (i + 2).min(bytes.len());
            continue;
        }

        // Quoted identifier: `"name"`.
        if c == b'"' {
            let start = i;
            i += 1;
            let id_start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            let text = src[id_start..i].to_string();
            i += 1;
            out.push(Token { kind: TokKind::Ident(text), start, end: i });
            continue;
        }

        // String literal: `'...'` with `''` as an escaped quote.
        if c == b'\'' {
            let start = i;
            i += 1;
            let mut s = String::new();
            loop {
                if i >= bytes.len() {
                    return Err(crate::error::MskqlError::Syntax("unterminated string literal".to_string()));
                }
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        s.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                let ch = src[i..].chars().next().unwrap();
                s.push(ch);
                i += ch.len_utf8();
            }
            out.push(Token { kind: TokKind::Str(s), start, end: i });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.' || bytes[i] == b'e' || bytes[i] == b'E') {
                // Don't swallow a second `.` belonging to `table.column`;
                // only consume `.` if immediately followed by a digit.
                if bytes[i] == b'.' && !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    break;
                }
                i += 1;
            }
            out.push(Token { kind: TokKind::Number(src[start..i].to_string()), start, end: i });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Token { kind: TokKind::Ident(src[start..i].to_string()), start, end: i });
            continue;
        }

        let start = i;
        let two = if i + 1 < bytes.len() { &src[i..i + 2] } else { "" };
        let punct: &'static str = match two {
            "<>" => "<>",
            "!=" => "!=",
            "<=" => "<=",
            ">=" => ">=",
            "||" => "||",
            _ => match c {
                b'(' => "(",
                b')' => ")",
                b',' => ",",
                b'.' => ".",
                b';' => ";",
                b'+' => "+",
                b'-' => "-",
                b'*' => "*",
                b'/' => "/",
                b'%' => "%",
                b'=' => "=",
                b'<' => "<",
                b'>' => ">",
                _ => return Err(crate::error::MskqlError::Syntax(format!("unexpected character '{}'", c as char))),
            },
        };
        i += punct.len();
        out.push(Token { kind: TokKind::Punct(punct), start, end: i });
    }

    let eof = bytes.len();
    out.push(Token { kind: TokKind::Eof, start: eof, end: eof });
    Ok(out)
}
