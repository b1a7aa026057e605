//! Query-string arguments for dispatched functions
//!
//! Each query value is read as a Python-style literal when it is one
//! (`2758752`, `1.5`, `True`, `None`, `'2022:001'`, `[1, 2]`, `(1,)`,
//! `{'a': 1}`); anything else is passed on as the raw string. The parser only
//! builds data, it never evaluates names or expressions.

use std::fmt;

use serde_json::Value;

const MAX_DEPTH: usize = 64;

/// Typed keyword-argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ArgValue>),
    Tuple(Vec<ArgValue>),
    Dict(Vec<(ArgValue, ArgValue)>),
}

impl ArgValue {
    /// Parse a query value, keeping the raw text when it is not a literal
    pub fn parse(raw: &str) -> Self {
        parse_literal(raw).unwrap_or_else(|| Self::Str(raw.to_string()))
    }

    /// Python truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) | Self::Tuple(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// JSON view, with tuples as arrays and non-string dict keys as reprs
    pub fn to_json(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(x) => serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number),
            Self::Str(s) => Value::String(s.clone()),
            Self::List(items) | Self::Tuple(items) => {
                Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Dict(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        let key = k.as_str().map_or_else(|| k.to_string(), ToString::to_string);
                        (key, v.to_json())
                    })
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => {
                f.write_str("'")?;
                for c in s.chars() {
                    match c {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("'")
            }
            Self::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[ArgValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Keyword arguments in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs(Vec<(String, ArgValue)>);

impl Kwargs {
    /// Build from a raw query string; the first value of a repeated key wins
    pub fn from_query(query: Option<&str>) -> Self {
        let mut kwargs = Self::default();
        let Some(query) = query else {
            return kwargs;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if kwargs.get(&key).is_none() {
                kwargs.0.push((key.into_owned(), ArgValue::parse(&value)));
            }
        }
        kwargs
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Remove a key, returning its value
    pub fn take(&mut self, key: &str) -> Option<ArgValue> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Kwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Parse a complete literal, or `None` if the text is not one
pub fn parse_literal(text: &str) -> Option<ArgValue> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let value = parser.value(0)?;
    parser.skip_ws();
    (parser.pos == parser.chars.len()).then_some(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Option<ArgValue> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.skip_ws();
        match self.peek()? {
            '[' => {
                self.pos += 1;
                let (items, _) = self.sequence(']', depth)?;
                Some(ArgValue::List(items))
            }
            '(' => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.sequence(')', depth)?;
                // `(x)` is only grouping; `(x,)` and `()` are tuples
                if items.len() == 1 && !trailing_comma {
                    items.pop()
                } else {
                    Some(ArgValue::Tuple(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.dict(depth)
            }
            '-' | '+' => {
                let negative = self.peek() == Some('-');
                self.pos += 1;
                self.skip_ws();
                match self.number()? {
                    ArgValue::Int(i) if negative => i.checked_neg().map(ArgValue::Int),
                    ArgValue::Float(x) if negative => Some(ArgValue::Float(-x)),
                    number => Some(number),
                }
            }
            '\'' | '"' => self.strings(),
            c if c.is_ascii_digit() || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => self.name_or_prefixed_string(),
            _ => None,
        }
    }

    /// Items up to `close`; also reports whether a trailing comma was seen
    fn sequence(&mut self, close: char, depth: usize) -> Option<(Vec<ArgValue>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Some((items, trailing_comma));
            }
            if !items.is_empty() && !trailing_comma {
                return None;
            }
            items.push(self.value(depth + 1)?);
            trailing_comma = self.eat(',');
        }
    }

    fn dict(&mut self, depth: usize) -> Option<ArgValue> {
        let mut entries = Vec::new();
        let mut separated = true;
        loop {
            if self.eat('}') {
                return Some(ArgValue::Dict(entries));
            }
            if !separated {
                return None;
            }
            let key = self.value(depth + 1)?;
            if !self.eat(':') {
                return None;
            }
            let value = self.value(depth + 1)?;
            entries.push((key, value));
            separated = self.eat(',');
        }
    }

    fn name_or_prefixed_string(&mut self) -> Option<ArgValue> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match name.as_str() {
            "True" => Some(ArgValue::Bool(true)),
            "False" => Some(ArgValue::Bool(false)),
            "None" => Some(ArgValue::None),
            "r" | "R" | "u" | "U" if matches!(self.peek(), Some('\'' | '"')) => {
                self.pos = start;
                self.strings()
            }
            _ => None,
        }
    }

    /// One or more adjacent string literals, concatenated
    fn strings(&mut self) -> Option<ArgValue> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            let next_is_string = match self.peek() {
                Some('\'' | '"') => true,
                Some('r' | 'R' | 'u' | 'U') => matches!(self.peek_at(1), Some('\'' | '"')),
                _ => false,
            };
            if !next_is_string {
                self.pos = save;
                return Some(ArgValue::Str(out));
            }
            out.push_str(&self.string()?);
        }
    }

    fn string(&mut self) -> Option<String> {
        let mut raw = false;
        if let Some(prefix) = self.peek().filter(|c| c.is_alphabetic()) {
            raw = matches!(prefix, 'r' | 'R');
            self.pos += 1;
        }
        let quote = self.peek()?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = self.peek()?;
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Some(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Some(out);
                }
            }
            if c == '\n' && !triple {
                return None;
            }
            self.pos += 1;
            if c == '\\' {
                let next = self.peek()?;
                self.pos += 1;
                if raw {
                    out.push('\\');
                    out.push(next);
                } else {
                    self.escape(next, &mut out)?;
                }
            } else {
                out.push(c);
            }
        }
    }

    fn escape(&mut self, c: char, out: &mut String) -> Option<()> {
        match c {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            'x' => out.push(self.hex_escape(2)?),
            'u' => out.push(self.hex_escape(4)?),
            'U' => out.push(self.hex_escape(8)?),
            '0'..='7' => {
                let mut code = c.to_digit(8)?;
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code)?);
            }
            // Unknown escapes keep their backslash
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Some(())
    }

    fn hex_escape(&mut self, digits: usize) -> Option<char> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return None;
        }
        let text: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        char::from_u32(u32::from_str_radix(&text, 16).ok()?)
    }

    fn number(&mut self) -> Option<ArgValue> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = matches!(c, '+' | '-')
                && self.pos > start
                && matches!(self.chars[self.pos - 1], 'e' | 'E')
                && !self.chars[start..self.pos].iter().any(|&d| d == 'x' || d == 'X');
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        parse_number(&token)
    }
}

fn parse_number(token: &str) -> Option<ArgValue> {
    let lower = token.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            let digits = digits.strip_prefix('_').unwrap_or(digits);
            return i64::from_str_radix(&strip_underscores(digits)?, radix)
                .ok()
                .map(ArgValue::Int);
        }
    }

    let is_float = lower.contains('.') || lower.contains('e');
    let digits = strip_underscores(&lower)?;
    if is_float {
        if !digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-'))
            || !digits.chars().any(|c| c.is_ascii_digit())
        {
            return None;
        }
        return digits.parse::<f64>().ok().map(ArgValue::Float);
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) || digits.is_empty() {
        return None;
    }
    // Leading zeros are a syntax error unless the value is zero
    if digits.len() > 1 && digits.starts_with('0') && digits.chars().any(|c| c != '0') {
        return None;
    }
    digits.parse::<i64>().ok().map(ArgValue::Int)
}

/// Remove `_` digit separators, which must sit between two digits
fn strip_underscores(token: &str) -> Option<String> {
    let chars: Vec<char> = token.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            let before = i.checked_sub(1).and_then(|j| chars.get(j));
            let after = chars.get(i + 1);
            if !before.is_some_and(char::is_ascii_hexdigit) || !after.is_some_and(char::is_ascii_hexdigit) {
                return None;
            }
        }
    }
    Some(chars.into_iter().filter(|&c| c != '_').collect())
}
