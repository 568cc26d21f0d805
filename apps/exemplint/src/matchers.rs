//! Evaluation of rule matchers against a sketch, plus the call catalogs the
//! synthesizer draws candidates from.

use crate::models::rule::Matcher;
use crate::models::Language;
use crate::sketch::{Call, Region, Sketch, TokKind};
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// 1-based inclusive line range of a match.
pub struct Span {
    pub line_start: usize,
    pub line_end: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("matcher '{kind}' does not support {language} sources")]
    Unsupported {
        kind: &'static str,
        language: Language,
    },
}

const PY_BLOCKING: &[&str] = &[
    "time.sleep",
    "requests.get",
    "requests.post",
    "requests.put",
    "requests.patch",
    "requests.delete",
    "requests.head",
    "requests.request",
    "urllib.request.urlopen",
    "urlopen",
    "open",
    "input",
    "subprocess.run",
    "subprocess.call",
    "subprocess.check_call",
    "subprocess.check_output",
    "os.system",
    "sqlite3.connect",
    "psycopg2.connect",
];

const TS_BLOCKING: &[&str] = &["*Sync", "Atomics.wait"];

const CLJ_BLOCKING: &[&str] = &[
    "Thread/sleep",
    "<!!",
    ">!!",
    "alts!!",
    "slurp",
    "spit",
    "http/get",
    "http/post",
    "client/get",
    "client/post",
    "clj-http.client/get",
    "clj-http.client/post",
    "jdbc/execute!",
    "jdbc/query",
];

/// Sinks prefixed with `.` match on the method name regardless of receiver.
const PY_SINKS: &[&str] = &[
    ".execute",
    ".executemany",
    ".executescript",
    ".raw",
    "text",
    "os.system",
    "os.popen",
    "subprocess.run",
    "subprocess.call",
    "subprocess.Popen",
    "subprocess.check_output",
    "eval",
    "exec",
];

const TS_SINKS: &[&str] = &[
    ".query",
    ".execute",
    ".raw",
    ".$queryRawUnsafe",
    ".$executeRawUnsafe",
    "exec",
    "execSync",
    "child_process.exec",
    "child_process.execSync",
    "eval",
];

const CLJ_SINKS: &[&str] = &[
    "jdbc/execute!",
    "jdbc/execute-one!",
    "jdbc/query",
    "sql/query",
    "sh",
    "shell/sh",
    "clojure.java.shell/sh",
    "eval",
    "read-string",
];

const PY_MUTABLE_TYPES: &[&str] = &[
    "list",
    "List",
    "typing.List",
    "dict",
    "Dict",
    "typing.Dict",
    "set",
    "Set",
    "typing.Set",
    "bytearray",
    "defaultdict",
    "MutableMapping",
    "MutableSequence",
];

const CLJ_ATOMS: &[&str] = &["r/atom", "reagent/atom", "reagent.core/atom", "ratom"];

fn last_segment(name: &str) -> &str {
    name.rsplit(['.', '/']).next().unwrap_or(name)
}

/// Whether `name` is matched by catalog `entry`.
///
/// - `*Suffix`: last segment ends with `Suffix`.
/// - `.method`: last segment equals `method`.
/// - otherwise exact.
pub fn name_matches(name: &str, entry: &str) -> bool {
    if let Some(suffix) = entry.strip_prefix('*') {
        let seg = last_segment(name);
        seg.len() > suffix.len() && seg.ends_with(suffix)
    } else if let Some(method) = entry.strip_prefix('.') {
        last_segment(name) == method
    } else {
        name == entry
    }
}

pub fn blocking_catalog(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => PY_BLOCKING,
        Language::TypeScript => TS_BLOCKING,
        Language::Clojure => CLJ_BLOCKING,
        Language::Other => &[],
    }
}

pub fn sink_catalog(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => PY_SINKS,
        Language::TypeScript => TS_SINKS,
        Language::Clojure => CLJ_SINKS,
        Language::Other => &[],
    }
}

/// Evaluate `matcher` on `sketch`, returning the sorted, deduplicated spans.
pub fn find(matcher: &Matcher, sketch: &Sketch) -> Result<Vec<Span>, MatchError> {
    if !matcher.supports(sketch.language) {
        return Err(MatchError::Unsupported {
            kind: matcher.kind(),
            language: sketch.language,
        });
    }
    let mut spans = match matcher {
        Matcher::BlockingCallInAsync { calls } => blocking_calls(sketch, calls)
            .into_iter()
            .map(|(_, s)| s)
            .collect(),
        Matcher::InterpolatedSink { sinks } => interpolated_sinks(sketch, sinks)
            .into_iter()
            .map(|(_, s)| s)
            .collect(),
        Matcher::MutableFieldInFrozenModel => mutable_frozen_fields(sketch),
        Matcher::MutableDefaultArgument => mutable_defaults(sketch),
        Matcher::AsyncEffectCallback => async_effects(sketch),
        Matcher::AtomInRender => atoms_in_render(sketch),
        Matcher::Pattern { regex } => pattern_lines(sketch, &compile_pattern(regex)?),
    };
    spans.sort();
    spans.dedup();
    Ok(spans)
}

fn span_of(sketch: &Sketch, a: usize, b: usize) -> Span {
    let (line_start, line_end) = sketch.span(a, b);
    Span {
        line_start,
        line_end,
    }
}

fn in_any(regions: &[Region], tok: usize) -> bool {
    regions.iter().any(|r| r.contains(tok))
}

/// Whether the innermost function body around `tok` is an async one.
fn in_async_body(async_regions: &[Region], sync_regions: &[Region], tok: usize) -> bool {
    let innermost = |regions: &[Region]| {
        regions
            .iter()
            .filter(|r| r.contains(tok))
            .map(|r| r.end - r.start)
            .min()
    };
    match (innermost(async_regions), innermost(sync_regions)) {
        (Some(a), Some(s)) => a < s,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Calls inside async regions whose name matches one of `entries`. Calls in a
/// synchronous function nested in the async body are not counted.
/// Returns the concrete call name with its span.
pub fn blocking_calls(sketch: &Sketch, entries: &[String]) -> Vec<(String, Span)> {
    let regions = sketch.async_regions();
    if regions.is_empty() {
        return Vec::new();
    }
    let sync = sketch.sync_function_regions();
    sketch
        .calls()
        .into_iter()
        .filter(|c| in_async_body(&regions, &sync, c.name_tok))
        .filter_map(|c| {
            let name = &sketch.tokens[c.name_tok].text;
            // `await fetch(...)` style calls are already non-blocking.
            let awaited = c.name_tok > 0 && sketch.tokens[c.name_tok - 1].is_ident("await");
            if awaited {
                return None;
            }
            entries
                .iter()
                .any(|e| name_matches(name, e))
                .then(|| (name.clone(), span_of(sketch, c.name_tok, c.name_tok)))
        })
        .collect()
}

/// Names bound to an interpolated string (`q = f"..."`, `const q = `...``,
/// `[q (str ...)]`).
fn tainted_names(sketch: &Sketch) -> HashSet<(String, usize)> {
    let toks = &sketch.tokens;
    let mut out = HashSet::new();
    for i in 0..toks.len() {
        if toks[i].kind != TokKind::Ident {
            continue;
        }
        match sketch.language {
            Language::Python | Language::TypeScript => {
                let assign = toks.get(i + 1).is_some_and(|t| t.is_punct('='))
                    && toks.get(i + 2).is_some_and(|t| !t.is_punct('='));
                if assign && toks.get(i + 2).is_some_and(|t| t.is_interpolated()) {
                    out.insert((toks[i].text.clone(), i));
                }
            }
            Language::Clojure => {
                let binds = toks.get(i + 1).is_some_and(|t| t.is_punct('('))
                    && toks
                        .get(i + 2)
                        .is_some_and(|t| t.is_ident("str") || t.is_ident("format"))
                    && !(i > 0 && toks[i - 1].is_punct('('));
                if binds {
                    out.insert((toks[i].text.clone(), i));
                }
            }
            Language::Other => {}
        }
    }
    out
}

fn args_interpolated(sketch: &Sketch, call: &Call, tainted: &HashSet<(String, usize)>) -> bool {
    let toks = &sketch.tokens;
    let lo = if sketch.language == Language::Clojure {
        call.name_tok + 1
    } else {
        call.open + 1
    };
    (lo..call.close.min(toks.len())).any(|i| {
        let t = &toks[i];
        if t.is_interpolated() {
            return true;
        }
        if sketch.language == Language::Clojure
            && t.is_punct('(')
            && toks
                .get(i + 1)
                .is_some_and(|n| n.is_ident("str") || n.is_ident("format"))
        {
            return true;
        }
        t.kind == TokKind::Ident
            && tainted
                .iter()
                .any(|(name, at)| *name == t.text && *at < call.name_tok)
    })
}

/// Sink calls receiving interpolated strings. Returns the catalog entry
/// each call matched and its span.
pub fn interpolated_sinks(sketch: &Sketch, entries: &[String]) -> Vec<(String, Span)> {
    let tainted = tainted_names(sketch);
    sketch
        .calls()
        .into_iter()
        .filter_map(|c| {
            let name = &sketch.tokens[c.name_tok].text;
            let entry = entries.iter().find(|e| name_matches(name, e))?;
            args_interpolated(sketch, &c, &tainted)
                .then(|| (entry.clone(), span_of(sketch, c.name_tok, c.close)))
        })
        .collect()
}

fn mutable_frozen_fields(sketch: &Sketch) -> Vec<Span> {
    match sketch.language {
        Language::Python => python_frozen_fields(sketch),
        Language::TypeScript => typescript_readonly_fields(sketch),
        _ => Vec::new(),
    }
}

fn python_frozen_fields(sketch: &Sketch) -> Vec<Span> {
    let toks = &sketch.tokens;
    let mut out = Vec::new();
    for i in 0..toks.len() {
        if !toks[i].is_ident("class") {
            continue;
        }
        let Some(body) = sketch.python_block_after(i) else {
            continue;
        };
        let class_line = toks[i].line;
        let has_frozen = |range: std::ops::Range<usize>| {
            range.clone().any(|k| {
                toks[k].is_ident("frozen")
                    && toks.get(k + 1).is_some_and(|t| t.is_punct('='))
                    && toks.get(k + 2).is_some_and(|t| t.is_ident("True"))
            }) || range.into_iter().any(|k| {
                toks[k].is_ident("allow_mutation")
                    && toks.get(k + 2).is_some_and(|t| t.is_ident("False"))
            })
        };
        // Decorators directly above the class line.
        let mut deco_line = class_line;
        while deco_line > 1
            && sketch
                .source_lines
                .get(deco_line - 2)
                .is_some_and(|l| l.trim_start().starts_with('@'))
        {
            deco_line -= 1;
        }
        let deco_start = toks.partition_point(|t| t.line < deco_line);
        let named_tuple = (i..body.start).any(|k| toks[k].is_ident("NamedTuple"));
        if !(has_frozen(deco_start..i) || has_frozen(body.start..body.end) || named_tuple) {
            continue;
        }
        // Fields: `name: Type` at the start of a line in the class body.
        for k in body.start..body.end.saturating_sub(1) {
            let t = &toks[k];
            let first_on_line = k == 0 || toks[k - 1].line != t.line;
            if !(first_on_line && t.kind == TokKind::Ident && toks[k + 1].is_punct(':')) {
                continue;
            }
            let mutable = toks[k + 2..body.end]
                .iter()
                .take_while(|a| a.line == t.line && !a.is_punct('='))
                .any(|a| a.kind == TokKind::Ident && PY_MUTABLE_TYPES.contains(&a.text.as_str()));
            if mutable {
                out.push(span_of(sketch, k, k));
            }
        }
    }
    out
}

fn typescript_readonly_fields(sketch: &Sketch) -> Vec<Span> {
    let toks = &sketch.tokens;
    let mut out = Vec::new();
    for i in 0..toks.len() {
        if !toks[i].is_ident("readonly") || toks.get(i + 1).map(|t| &t.kind) != Some(&TokKind::Ident)
        {
            continue;
        }
        let mut j = i + 2;
        if toks.get(j).is_some_and(|t| t.is_punct('?')) {
            j += 1;
        }
        if !toks.get(j).is_some_and(|t| t.is_punct(':')) {
            continue;
        }
        let line = toks[i].line;
        let ty: Vec<_> = toks[j + 1..]
            .iter()
            .take_while(|t| {
                t.line == line && !t.is_punct(';') && !t.is_punct(',') && !t.is_punct('=')
            })
            .collect();
        let Some(first) = ty.first() else { continue };
        if first.is_ident("readonly") || first.text.starts_with("Readonly") {
            continue;
        }
        let array = ty
            .windows(2)
            .any(|w| w[0].is_punct('[') && w[1].is_punct(']'));
        let collection = ty
            .iter()
            .any(|t| t.is_ident("Array") || t.is_ident("Map") || t.is_ident("Set"));
        if array || collection {
            out.push(span_of(sketch, i, i));
        }
    }
    out
}

fn mutable_defaults(sketch: &Sketch) -> Vec<Span> {
    let toks = &sketch.tokens;
    let mut out = Vec::new();
    for i in 0..toks.len() {
        if !toks[i].is_ident("def") {
            continue;
        }
        let Some(open) = (i + 1..toks.len().min(i + 4)).find(|&k| toks[k].is_punct('(')) else {
            continue;
        };
        let Some(close) = sketch.matching(open) else {
            continue;
        };
        let mut depth = 0i32;
        for k in open + 1..close {
            let t = &toks[k];
            if t.is_punct('(') || t.is_punct('[') || t.is_punct('{') {
                depth += 1;
            } else if t.is_punct(')') || t.is_punct(']') || t.is_punct('}') {
                depth -= 1;
            }
            if depth != 0 || !t.is_punct('=') {
                continue;
            }
            let Some(v) = toks.get(k + 1) else { continue };
            let literal = v.is_punct('[') || v.is_punct('{');
            let ctor = ["list", "dict", "set", "bytearray", "defaultdict"]
                .iter()
                .any(|n| v.is_ident(n))
                && toks.get(k + 2).is_some_and(|t| t.is_punct('('));
            if literal || ctor {
                out.push(span_of(sketch, i, close));
                break;
            }
        }
    }
    out
}

fn async_effects(sketch: &Sketch) -> Vec<Span> {
    let toks = &sketch.tokens;
    sketch
        .calls()
        .into_iter()
        .filter(|c| {
            let name = &toks[c.name_tok].text;
            (name == "useEffect" || name == "React.useEffect" || name == "useLayoutEffect")
                && toks.get(c.open + 1).is_some_and(|t| t.is_ident("async"))
        })
        .map(|c| span_of(sketch, c.name_tok, c.close))
        .collect()
}

fn atoms_in_render(sketch: &Sketch) -> Vec<Span> {
    let toks = &sketch.tokens;
    let components = sketch.clojure_forms(&["defn", "defn-"]);
    let mut out = Vec::new();
    for c in sketch.calls() {
        if !toks[c.name_tok].is_ident("let") || !in_any(&components, c.open) {
            continue;
        }
        let bind_open = c.name_tok + 1;
        if !toks.get(bind_open).is_some_and(|t| t.is_punct('[')) {
            continue;
        }
        let Some(bind_close) = sketch.matching(bind_open) else {
            continue;
        };
        let atom_at = (bind_open..bind_close).find(|&k| {
            toks[k].is_punct('(')
                && toks
                    .get(k + 1)
                    .is_some_and(|t| CLJ_ATOMS.contains(&t.text.as_str()))
        });
        let hiccup_body = toks.get(bind_close + 1).is_some_and(|t| t.is_punct('['));
        if let Some(at) = atom_at {
            if hiccup_body {
                out.push(span_of(sketch, c.name_tok, at + 1));
            }
        }
    }
    out
}

/// Compile the regex of a `Pattern` matcher.
pub fn compile_pattern(pattern: &str) -> Result<Regex, MatchError> {
    Regex::new(pattern).map_err(|e| MatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Lines of `sketch` matching `re`, in order.
pub fn pattern_lines(sketch: &Sketch, re: &Regex) -> Vec<Span> {
    sketch
        .source_lines
        .iter()
        .enumerate()
        .filter(|(_, l)| re.is_match(l))
        .map(|(i, _)| Span {
            line_start: i + 1,
            line_end: i + 1,
        })
        .collect()
}
