//! Character-level scanning for DDL text
//!
//! Everything here tracks three kinds of quoting (`'strings'`, `"strings"` and
//! `` `identifiers` ``) plus parenthesis depth, so separators and comment markers
//! are only honoured in plain code.

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Remove `/* ... */` block comments and `--` line comments.
///
/// Line breaks terminating a line comment are kept so clause text stays on the
/// lines it came from; a block comment is replaced by a single space.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = State::Code;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = State::BlockComment;
                }
                '\'' | '"' | '`' => {
                    out.push(ch);
                    state = State::Quoted(ch);
                }
                _ => out.push(ch),
            },
            State::Quoted(quote) => {
                out.push(ch);
                if ch == '\\' && quote != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == quote {
                    if chars.peek() == Some(&quote) {
                        chars.next();
                        out.push(quote);
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
        }
    }

    out
}

/// Split `text` on `separator` wherever it appears outside quotes and at
/// parenthesis depth zero. Empty pieces are kept.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' && q != '`' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&text[start..]);
    parts
}

/// Split a CREATE TABLE body into its top-level clauses.
///
/// Commas inside type parameters (`decimal(12,2)`), string literals and
/// backtick identifiers never split a clause. Returned clauses are trimmed and
/// never empty.
pub fn split_definitions(body: &str) -> Vec<String> {
    split_top_level(body, ',')
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Byte index of the `)` closing the `(` at `open`, if balanced.
pub(crate) fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' && q != '`' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }

    None
}

/// Length in bytes of the quoted run at the start of `text`, closing quote included.
fn quoted_len(text: &str, quote: char) -> Option<usize> {
    let mut chars = text.char_indices().skip(1).peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch == '\\' && quote != '`' {
            chars.next();
        } else if ch == quote {
            match chars.peek() {
                Some(&(_, next)) if next == quote => {
                    chars.next();
                }
                _ => return Some(idx + ch.len_utf8()),
            }
        }
    }

    None
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Forward-only reader over a single clause or statement
pub(crate) struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Unread input, leading whitespace included
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    pub fn is_at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.text.len()
    }

    pub fn peek_char(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    pub fn eat_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// True when the next word is `keyword` (ASCII case-insensitive, whole word)
    pub fn peek_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = self.rest();
        match rest.get(..keyword.len()) {
            Some(head) if head.eq_ignore_ascii_case(keyword) => !rest[keyword.len()..]
                .chars()
                .next()
                .map_or(false, is_identifier_char),
            _ => false,
        }
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence such as `PRIMARY KEY`, all or nothing
    pub fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let saved = self.pos;
        for keyword in keywords {
            if !self.eat_keyword(keyword) {
                self.pos = saved;
                return false;
            }
        }
        true
    }

    /// A bare or quoted identifier, returned unquoted
    pub fn identifier(&mut self) -> Option<String> {
        self.skip_whitespace();
        let rest = self.rest();
        let first = rest.chars().next()?;

        if first == '`' || first == '"' {
            let len = quoted_len(rest, first)?;
            let doubled: String = [first, first].iter().collect();
            let name = rest[1..len - 1].replace(&doubled, &first.to_string());
            self.pos += len;
            return (!name.is_empty()).then_some(name);
        }

        self.word().map(str::to_string)
    }

    /// A run of identifier characters
    pub fn word(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !is_identifier_char(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    /// The contents of a parenthesized group, without the outer parentheses
    pub fn paren_group(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        if !rest.starts_with('(') {
            return None;
        }
        let close = find_matching_paren(rest, 0)?;
        self.pos += close + 1;
        Some(&rest[1..close])
    }

    /// A single- or double-quoted literal, quotes included
    pub fn quoted_string(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let len = quoted_len(rest, quote)?;
        self.pos += len;
        Some(&rest[..len])
    }

    /// Characters up to whitespace, a comma or a parenthesis
    pub fn bare_token(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    /// Skip one token of any shape; always makes progress unless at the end
    pub fn skip_token(&mut self) {
        match self.peek_char() {
            None => {}
            Some('\'') | Some('"') => {
                if self.quoted_string().is_none() {
                    self.pos = self.text.len();
                }
            }
            Some('`') => {
                if self.identifier().is_none() {
                    self.pos = self.text.len();
                }
            }
            Some('(') => {
                if self.paren_group().is_none() {
                    self.pos = self.text.len();
                }
            }
            Some(other) => {
                if self.bare_token().is_none() {
                    self.pos += other.len_utf8();
                }
            }
        }
    }
}
