//! Reader and writer for `searchindex.js` files.
//!
//! Generators emit `Search.setIndex({...})` where the argument is a
//! JavaScript object literal. Older generators leave keys unquoted
//! (`docnames:[...]`), newer ones emit strict JSON. Both are accepted; the
//! writer always emits JSON.

use crate::error::{Error, FormatError, Result};
use crate::index::SearchIndex;
use serde_json::{Map, Number, Value};

const CALL_PREFIX: &str = "Search.setIndex(";
/// Deepest object/array nesting accepted. Real indexes nest four levels.
pub const MAX_DEPTH: usize = 64;

/// Parse the contents of a `searchindex.js` file and validate the result.
pub fn parse_search_index(text: &str) -> Result<SearchIndex> {
    let value = parse_literal(strip_call(text)?)?;
    let index: SearchIndex = serde_json::from_value(value)?;
    index.validate()?;
    Ok(index)
}

/// Serialize an index in the form a browser search page loads.
pub fn to_search_index_js(index: &SearchIndex) -> Result<String> {
    let body = serde_json::to_string(index).map_err(Error::from)?;
    Ok(format!("{CALL_PREFIX}{body})"))
}

/// Returns the literal inside `Search.setIndex(...)`, or the whole text when
/// there is no call wrapper.
fn strip_call(text: &str) -> std::result::Result<&str, FormatError> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix(CALL_PREFIX) else {
        return Ok(trimmed);
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
    rest.strip_suffix(')').ok_or(FormatError::UnterminatedCall)
}

/// Parse a JavaScript object/array literal into a JSON value.
pub fn parse_literal(src: &str) -> std::result::Result<Value, FormatError> {
    let mut parser = Parser { src, pos: 0, depth: 0 };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < src.len() {
        return Err(FormatError::TrailingData { offset: parser.pos });
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn eof(&self) -> FormatError {
        FormatError::UnexpectedEof { offset: self.pos }
    }

    fn expect(&mut self, want: char, expected: &'static str) -> std::result::Result<(), FormatError> {
        match self.peek() {
            Some(c) if c == want => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(found) => Err(FormatError::Unexpected { offset: self.pos, found, expected }),
            None => Err(self.eof()),
        }
    }

    fn value(&mut self) -> std::result::Result<Value, FormatError> {
        match self.peek() {
            None => Err(self.eof()),
            Some('{') => self.nested(Self::object),
            Some('[') => self.nested(Self::array),
            Some(q @ ('"' | '\'')) => self.string(q).map(Value::String),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let word = self.ident();
                match word {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => Err(FormatError::Unexpected { offset: start, found: c, expected: "a value" }),
                }
            }
            Some(found) => Err(FormatError::Unexpected { offset: self.pos, found, expected: "a value" }),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> std::result::Result<Value, FormatError>,
    ) -> std::result::Result<Value, FormatError> {
        if self.depth >= MAX_DEPTH {
            return Err(FormatError::TooDeep { offset: self.pos });
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn object(&mut self) -> std::result::Result<Value, FormatError> {
        self.expect('{', "'{'")?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                None => return Err(self.eof()),
                _ => {}
            }
            let key = self.key()?;
            self.skip_ws();
            self.expect(':', "':'")?;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(found) => {
                    return Err(FormatError::Unexpected {
                        offset: self.pos - found.len_utf8(),
                        found,
                        expected: "',' or '}'",
                    })
                }
                None => return Err(self.eof()),
            }
        }
    }

    fn key(&mut self) -> std::result::Result<String, FormatError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.string(q),
            Some(c) if is_ident_start(c) => Ok(self.ident().to_string()),
            // Numeric keys such as `{0: ...}` are legal in JavaScript.
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                Ok(self.src[start..self.pos].to_string())
            }
            Some(found) => Err(FormatError::Unexpected { offset: self.pos, found, expected: "an object key" }),
            None => Err(self.eof()),
        }
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn array(&mut self) -> std::result::Result<Value, FormatError> {
        self.expect('[', "'['")?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err(self.eof()),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                Some(found) => {
                    return Err(FormatError::Unexpected {
                        offset: self.pos - found.len_utf8(),
                        found,
                        expected: "',' or ']'",
                    })
                }
                None => return Err(self.eof()),
            }
        }
    }

    fn string(&mut self, quote: char) -> std::result::Result<String, FormatError> {
        self.expect(quote, "a quote")?;
        let mut out = String::new();
        loop {
            let at = self.pos;
            match self.bump() {
                None => return Err(self.eof()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(self.eof()),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('u') => out.push(self.unicode_escape(at)?),
                    Some(c @ ('"' | '\'' | '\\' | '/')) => out.push(c),
                    Some(_) => return Err(FormatError::InvalidEscape { offset: at }),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn hex4(&mut self, at: usize) -> std::result::Result<u32, FormatError> {
        let end = self.pos + 4;
        let digits = self.src.get(self.pos..end).ok_or(FormatError::InvalidEscape { offset: at })?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| FormatError::InvalidEscape { offset: at })?;
        self.pos = end;
        Ok(code)
    }

    /// Decodes `XXXX` after `\u`, joining surrogate pairs.
    fn unicode_escape(&mut self, at: usize) -> std::result::Result<char, FormatError> {
        let hi = self.hex4(at)?;
        let code = if (0xD800..0xDC00).contains(&hi) {
            if !self.src[self.pos..].starts_with("\\u") {
                return Err(FormatError::InvalidEscape { offset: at });
            }
            self.pos += 2;
            let lo = self.hex4(at)?;
            if !(0xDC00..0xE000).contains(&lo) {
                return Err(FormatError::InvalidEscape { offset: at });
            }
            0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
        } else {
            hi
        };
        char::from_u32(code).ok_or(FormatError::InvalidEscape { offset: at })
    }

    fn number(&mut self) -> std::result::Result<Value, FormatError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let invalid = || FormatError::InvalidNumber { offset: start, text: text.to_string() };
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(Number::from(i)));
        }
        let f: f64 = text.parse().map_err(|_| invalid())?;
        Number::from_f64(f).map(Value::Number).ok_or_else(invalid)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
