//! Lightweight syntax sketch of a snippet or source file.
//!
//! Exemplars are fragments, not compilable units, so nothing here parses a
//! language properly. A sketch is a flat token stream (identifiers with
//! dotted/qualified names joined, string literals flagged when they are
//! interpolated, punctuation) plus per-line indentation and a bracket
//! matching table. Matchers work on top of that.

use crate::models::Language;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokKind {
    Ident,
    Str { interpolated: bool },
    Number,
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn is_ident(&self, s: &str) -> bool {
        self.kind == TokKind::Ident && self.text == s
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokKind::Punct(c)
    }

    pub fn is_interpolated(&self) -> bool {
        matches!(self.kind, TokKind::Str { interpolated: true })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub indent: usize,
    /// Blank or comment-only.
    pub blank: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A call site: `name(` for Python/TypeScript, `(name` for Clojure.
pub struct Call {
    pub name_tok: usize,
    pub open: usize,
    pub close: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Token index range `start..end` (exclusive) of a region body.
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn contains(&self, tok: usize) -> bool {
        tok >= self.start && tok < self.end
    }
}

#[derive(Debug, Clone)]
pub struct Sketch {
    pub language: Language,
    pub tokens: Vec<Token>,
    /// Indexed by 1-based line number; entry 0 is unused.
    pub lines: Vec<LineInfo>,
    pub source_lines: Vec<String>,
    pairs: Vec<Option<usize>>,
}

const PY_KEYWORDS: &[&str] = &[
    "def", "class", "if", "elif", "while", "for", "return", "with", "not", "and", "or", "in",
    "lambda", "assert", "del", "yield",
];
const TS_KEYWORDS: &[&str] = &[
    "function", "if", "while", "for", "switch", "return", "catch", "typeof", "new", "await",
    "super", "import",
];

impl Sketch {
    pub fn new(source: &str, language: Language) -> Self {
        let tokens = match language {
            Language::Python => tokenize_python(source),
            Language::TypeScript => tokenize_typescript(source),
            Language::Clojure => tokenize_clojure(source),
            Language::Other => Vec::new(),
        };
        let mut lines = vec![LineInfo {
            indent: 0,
            blank: true,
        }];
        let comment = match language {
            Language::Python => "#",
            Language::TypeScript => "//",
            Language::Clojure => ";",
            Language::Other => "\u{0}",
        };
        for raw in source.lines() {
            let trimmed = raw.trim();
            let indent = raw
                .chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum();
            lines.push(LineInfo {
                indent,
                blank: trimmed.is_empty() || trimmed.starts_with(comment),
            });
        }
        let pairs = match_brackets(&tokens);
        let mut sketch = Sketch {
            language,
            tokens,
            lines,
            source_lines: source.lines().map(str::to_string).collect(),
            pairs,
        };
        sketch.mark_concatenation();
        sketch
    }

    /// Matching bracket for the bracket token at `idx`, if balanced.
    pub fn matching(&self, idx: usize) -> Option<usize> {
        self.pairs.get(idx).copied().flatten()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    fn line_info(&self, line: usize) -> LineInfo {
        self.lines.get(line).copied().unwrap_or(LineInfo {
            indent: 0,
            blank: true,
        })
    }

    /// Last token index whose line is `<= line`, plus one.
    fn end_of_line_tok(&self, line: usize) -> usize {
        self.tokens.partition_point(|t| t.line <= line)
    }

    /// All call sites in token order.
    pub fn calls(&self) -> Vec<Call> {
        let mut out = Vec::new();
        let toks = &self.tokens;
        match self.language {
            Language::Clojure => {
                for i in 0..toks.len().saturating_sub(1) {
                    if toks[i].is_punct('(') && toks[i + 1].kind == TokKind::Ident {
                        let close = self.matching(i).unwrap_or(toks.len() - 1);
                        out.push(Call {
                            name_tok: i + 1,
                            open: i,
                            close,
                        });
                    }
                }
            }
            Language::Python | Language::TypeScript => {
                let keywords = if self.language == Language::Python {
                    PY_KEYWORDS
                } else {
                    TS_KEYWORDS
                };
                for i in 0..toks.len().saturating_sub(1) {
                    let t = &toks[i];
                    if t.kind != TokKind::Ident || !toks[i + 1].is_punct('(') {
                        continue;
                    }
                    if keywords.contains(&t.text.as_str()) {
                        continue;
                    }
                    if i > 0
                        && (toks[i - 1].is_ident("def")
                            || toks[i - 1].is_ident("function")
                            || toks[i - 1].is_ident("class"))
                    {
                        continue;
                    }
                    let close = self.matching(i + 1).unwrap_or(toks.len() - 1);
                    // `name(...) {` in TypeScript is a method definition.
                    if self.language == Language::TypeScript
                        && toks.get(close + 1).is_some_and(|n| n.is_punct('{'))
                    {
                        continue;
                    }
                    out.push(Call {
                        name_tok: i,
                        open: i + 1,
                        close,
                    });
                }
            }
            Language::Other => {}
        }
        out
    }

    /// Bodies of async functions (Python/TypeScript) or go blocks (Clojure).
    pub fn async_regions(&self) -> Vec<Region> {
        match self.language {
            Language::Python => self.python_async_regions(),
            Language::TypeScript => self.typescript_async_regions(),
            Language::Clojure => self.clojure_forms(&[
                "go",
                "go-loop",
                "async/go",
                "async/go-loop",
                "a/go",
                "a/go-loop",
                "clojure.core.async/go",
            ]),
            Language::Other => Vec::new(),
        }
    }

    fn python_async_regions(&self) -> Vec<Region> {
        let toks = &self.tokens;
        let mut out = Vec::new();
        for i in 0..toks.len().saturating_sub(1) {
            if toks[i].is_ident("async") && toks[i + 1].is_ident("def") {
                if let Some(r) = self.python_block_after(i + 1) {
                    out.push(r);
                }
            }
        }
        out
    }

    /// Body of a Python `def`/`class` starting at keyword token `kw`:
    /// tokens after the header colon through the last indented line.
    pub fn python_block_after(&self, kw: usize) -> Option<Region> {
        let toks = &self.tokens;
        let header_line = toks[kw].line;
        let indent = self.line_info(header_line).indent;
        // Skip a parenthesized parameter/base list, then find the colon.
        let mut j = kw + 1;
        while j < toks.len() {
            if toks[j].is_punct('(') {
                j = self.matching(j)? + 1;
                continue;
            }
            if toks[j].is_punct(':') {
                break;
            }
            j += 1;
        }
        if j >= toks.len() {
            return None;
        }
        let colon_line = toks[j].line;
        let mut end_line = colon_line;
        for line in colon_line + 1..=self.line_count() {
            let info = self.line_info(line);
            if info.blank {
                continue;
            }
            if info.indent <= indent {
                break;
            }
            end_line = line;
        }
        Some(Region {
            start: j + 1,
            end: self.end_of_line_tok(end_line),
        })
    }

    fn typescript_async_regions(&self) -> Vec<Region> {
        let toks = &self.tokens;
        let mut out = Vec::new();
        for i in 0..toks.len() {
            if !toks[i].is_ident("async") {
                continue;
            }
            let mut depth = 0i32;
            let mut j = i + 1;
            while j < toks.len() {
                let t = &toks[j];
                if t.is_punct('(') {
                    depth += 1;
                } else if t.is_punct(')') {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                } else if depth == 0 && t.is_punct('{') {
                    if let Some(close) = self.matching(j) {
                        out.push(Region {
                            start: j + 1,
                            end: close,
                        });
                    }
                    break;
                } else if depth == 0
                    && t.is_punct('=')
                    && toks.get(j + 1).is_some_and(|n| n.is_punct('>'))
                    && toks.get(j + 2).is_some_and(|n| !n.is_punct('{'))
                {
                    // Expression-bodied arrow: the rest of the line.
                    let line = t.line;
                    out.push(Region {
                        start: j + 2,
                        end: self.end_of_line_tok(line),
                    });
                    break;
                } else if depth == 0 && t.is_punct(';') {
                    break;
                }
                j += 1;
            }
        }
        out
    }

    /// Bodies of synchronous functions: `def` and `lambda` in Python,
    /// `function` in TypeScript.
    pub fn sync_function_regions(&self) -> Vec<Region> {
        let toks = &self.tokens;
        let mut out = Vec::new();
        for i in 0..toks.len() {
            let after_async = i > 0 && toks[i - 1].is_ident("async");
            match self.language {
                Language::Python if toks[i].is_ident("def") && !after_async => {
                    out.extend(self.python_block_after(i));
                }
                Language::Python if toks[i].is_ident("lambda") => {
                    out.extend(self.python_lambda_body(i));
                }
                Language::TypeScript if toks[i].is_ident("function") && !after_async => {
                    out.extend(self.typescript_function_body(i));
                }
                _ => {}
            }
        }
        out
    }

    /// Expression after a lambda's colon, up to the enclosing closer, a
    /// top-level comma or the end of the line.
    fn python_lambda_body(&self, kw: usize) -> Option<Region> {
        let toks = &self.tokens;
        let colon = (kw + 1..toks.len()).find(|&j| toks[j].is_punct(':'))?;
        let line = toks[colon].line;
        let mut depth = 0usize;
        let mut end = colon + 1;
        while end < toks.len() && toks[end].line == line {
            let t = &toks[end];
            if t.is_punct('(') || t.is_punct('[') || t.is_punct('{') {
                depth += 1;
            } else if t.is_punct(')') || t.is_punct(']') || t.is_punct('}') {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            } else if depth == 0 && t.is_punct(',') {
                break;
            }
            end += 1;
        }
        Some(Region {
            start: colon + 1,
            end,
        })
    }

    /// Braced body following a `function` keyword and its parameter list.
    fn typescript_function_body(&self, kw: usize) -> Option<Region> {
        let toks = &self.tokens;
        let open_params = (kw + 1..toks.len()).find(|&j| toks[j].is_punct('('))?;
        let close_params = self.matching(open_params)?;
        let mut j = close_params + 1;
        while j < toks.len() {
            if toks[j].is_punct('{') {
                let close = self.matching(j)?;
                return Some(Region {
                    start: j + 1,
                    end: close,
                });
            }
            if toks[j].is_punct(';') || toks[j].is_punct('=') {
                return None;
            }
            j += 1;
        }
        None
    }

    /// Interiors of Clojure forms whose head symbol is one of `heads`.
    pub fn clojure_forms(&self, heads: &[&str]) -> Vec<Region> {
        self.calls()
            .into_iter()
            .filter(|c| heads.contains(&self.tokens[c.name_tok].text.as_str()))
            .map(|c| Region {
                start: c.name_tok + 1,
                end: c.close,
            })
            .collect()
    }

    /// 1-based line span covering tokens `a..=b`.
    pub fn span(&self, a: usize, b: usize) -> (usize, usize) {
        let last = self.tokens.len().saturating_sub(1);
        let start = self.tokens.get(a.min(last)).map(|t| t.line).unwrap_or(1);
        let end = self.tokens.get(b.min(last)).map(|t| t.line).unwrap_or(start);
        (start, end.max(start))
    }

    /// Flag string literals that take part in `%`, `.format(` or `+`
    /// concatenation as interpolated.
    fn mark_concatenation(&mut self) {
        if !matches!(self.language, Language::Python | Language::TypeScript) {
            return;
        }
        let n = self.tokens.len();
        let mut flags = vec![false; n];
        for i in 0..n {
            if !matches!(self.tokens[i].kind, TokKind::Str { .. }) {
                continue;
            }
            let next = self.tokens.get(i + 1);
            let next2 = self.tokens.get(i + 2);
            let prev = if i > 0 { self.tokens.get(i - 1) } else { None };
            let percent = self.language == Language::Python
                && next.is_some_and(|t| t.is_punct('%'))
                && next2.is_some_and(|t| !t.is_punct('='));
            let format = self.language == Language::Python
                && next.is_some_and(|t| t.is_punct('.'))
                && next2.is_some_and(|t| t.is_ident("format"));
            let plus = next.is_some_and(|t| t.is_punct('+'))
                && next2.is_some_and(|t| t.kind == TokKind::Ident)
                || prev.is_some_and(|t| t.is_punct('+'));
            flags[i] = percent || format || plus;
        }
        for (i, flag) in flags.into_iter().enumerate() {
            if flag {
                self.tokens[i].kind = TokKind::Str { interpolated: true };
            }
        }
    }
}

fn match_brackets(tokens: &[Token]) -> Vec<Option<usize>> {
    let mut pairs = vec![None; tokens.len()];
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        let TokKind::Punct(c) = t.kind else { continue };
        match c {
            '(' | '[' | '{' => stack.push((c, i)),
            ')' | ']' | '}' => {
                let want = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                // Unbalanced closers are ignored; fragments are often partial.
                if let Some(pos) = stack.iter().rposition(|(o, _)| *o == want) {
                    let (_, open) = stack[pos];
                    stack.truncate(pos);
                    pairs[open] = Some(i);
                    pairs[i] = Some(open);
                }
            }
            _ => {}
        }
    }
    pairs
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    out: Vec<Token>,
}

impl Cursor {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            out: Vec::new(),
        }
    }

    fn peek(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokKind, text: String, line: usize) {
        self.out.push(Token { kind, text, line });
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Read a quoted literal starting at the opening quote; returns its body.
    fn read_quoted(&mut self, quote: char, triple: bool) -> String {
        let mut body = String::new();
        let n = if triple { 3 } else { 1 };
        for _ in 0..n {
            self.bump();
        }
        while let Some(c) = self.peek(0) {
            if c == '\\' {
                self.bump();
                if let Some(e) = self.bump() {
                    body.push('\\');
                    body.push(e);
                }
                continue;
            }
            if c == quote {
                if !triple {
                    self.bump();
                    return body;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return body;
                }
            }
            if c == '\n' && !triple && quote != '`' {
                return body;
            }
            body.push(c);
            self.bump();
        }
        body
    }

    /// Read an identifier, joining `.`-qualified segments.
    fn read_ident(&mut self, is_start: fn(char) -> bool, is_cont: fn(char) -> bool) -> String {
        let mut s = String::new();
        loop {
            while let Some(c) = self.peek(0) {
                if is_cont(c) {
                    s.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.peek(0) == Some('.') && self.peek(1).is_some_and(is_start) {
                s.push('.');
                self.pos += 1;
                continue;
            }
            break;
        }
        s
    }

    fn read_number(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                s.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        s
    }
}

fn py_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn py_ident_cont(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn ts_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn ts_ident_cont(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn tokenize_python(src: &str) -> Vec<Token> {
    let mut cur = Cursor::new(src);
    while let Some(c) = cur.peek(0) {
        let line = cur.line;
        if c.is_whitespace() {
            cur.bump();
        } else if c == '#' {
            cur.skip_to_eol();
        } else if py_ident_start(c) {
            // String prefixes such as f"", rb'', F"""
            let mut prefix_len = 0;
            while prefix_len < 2
                && cur
                    .peek(prefix_len)
                    .is_some_and(|p| matches!(p, 'f' | 'F' | 'r' | 'R' | 'b' | 'B' | 'u' | 'U'))
            {
                prefix_len += 1;
            }
            let quote = cur.peek(prefix_len);
            if prefix_len > 0 && matches!(quote, Some('"') | Some('\'')) {
                let prefix: String = (0..prefix_len).filter_map(|i| cur.peek(i)).collect();
                cur.pos += prefix_len;
                let q = quote.unwrap_or('"');
                let triple = cur.peek(1) == Some(q) && cur.peek(2) == Some(q);
                let body = cur.read_quoted(q, triple);
                let interpolated = prefix.to_ascii_lowercase().contains('f') && body.contains('{');
                cur.push(TokKind::Str { interpolated }, body, line);
            } else {
                let s = cur.read_ident(py_ident_start, py_ident_cont);
                cur.push(TokKind::Ident, s, line);
            }
        } else if c == '"' || c == '\'' {
            let triple = cur.peek(1) == Some(c) && cur.peek(2) == Some(c);
            let body = cur.read_quoted(c, triple);
            cur.push(TokKind::Str { interpolated: false }, body, line);
        } else if c.is_ascii_digit() {
            let s = cur.read_number();
            cur.push(TokKind::Number, s, line);
        } else {
            cur.bump();
            cur.push(TokKind::Punct(c), c.to_string(), line);
        }
    }
    cur.out
}

fn tokenize_typescript(src: &str) -> Vec<Token> {
    let mut cur = Cursor::new(src);
    while let Some(c) = cur.peek(0) {
        let line = cur.line;
        if c.is_whitespace() {
            cur.bump();
        } else if c == '/' && cur.peek(1) == Some('/') {
            cur.skip_to_eol();
        } else if c == '/' && cur.peek(1) == Some('*') {
            cur.bump();
            cur.bump();
            while let Some(d) = cur.peek(0) {
                if d == '*' && cur.peek(1) == Some('/') {
                    cur.bump();
                    cur.bump();
                    break;
                }
                cur.bump();
            }
        } else if ts_ident_start(c) {
            let s = cur.read_ident(ts_ident_start, ts_ident_cont);
            cur.push(TokKind::Ident, s, line);
        } else if c == '"' || c == '\'' {
            let body = cur.read_quoted(c, false);
            cur.push(TokKind::Str { interpolated: false }, body, line);
        } else if c == '`' {
            let body = cur.read_quoted('`', false);
            let interpolated = body.contains("${");
            cur.push(TokKind::Str { interpolated }, body, line);
        } else if c.is_ascii_digit() {
            let s = cur.read_number();
            cur.push(TokKind::Number, s, line);
        } else {
            cur.bump();
            cur.push(TokKind::Punct(c), c.to_string(), line);
        }
    }
    cur.out
}

fn clj_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | ',' | '\\' | '@' | '^' | '`' | '~')
}

fn tokenize_clojure(src: &str) -> Vec<Token> {
    let mut cur = Cursor::new(src);
    while let Some(c) = cur.peek(0) {
        let line = cur.line;
        if c.is_whitespace() || c == ',' {
            cur.bump();
        } else if c == ';' {
            cur.skip_to_eol();
        } else if c == '\\' {
            // Character literal: \a, \newline, \(
            cur.bump();
            cur.bump();
            while cur.peek(0).is_some_and(|d| d.is_alphanumeric()) {
                cur.bump();
            }
        } else if c == '"' {
            let body = cur.read_quoted('"', false);
            cur.push(TokKind::Str { interpolated: false }, body, line);
        } else if c == '#' && cur.peek(1) == Some('"') {
            cur.bump();
            let body = cur.read_quoted('"', false);
            cur.push(TokKind::Str { interpolated: false }, body, line);
        } else if matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '@' | '^' | '`' | '~' | '#' | '\'') {
            cur.bump();
            cur.push(TokKind::Punct(c), c.to_string(), line);
        } else if c.is_ascii_digit() {
            let s = cur.read_number();
            cur.push(TokKind::Number, s, line);
        } else {
            let mut s = String::new();
            while let Some(d) = cur.peek(0) {
                if clj_symbol_char(d) && !(d == '#' && s.is_empty()) {
                    s.push(d);
                    cur.pos += 1;
                } else {
                    break;
                }
            }
            if s.is_empty() {
                cur.bump();
                cur.push(TokKind::Punct(c), c.to_string(), line);
            } else {
                cur.push(TokKind::Ident, s, line);
            }
        }
    }
    cur.out
}
