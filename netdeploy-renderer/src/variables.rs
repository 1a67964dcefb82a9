//! Variable inference for tera/jinja templates.
//!
//! A lexical pass over `{{ ... }}` and `{% ... %}` tags that collects the
//! root names a template reads from its context. It does not evaluate
//! anything: a name used inside a branch that never runs still counts.
//!
//! Names that are never context reads are left out:
//!
//! - `for` loop targets, `set`/`set_global` targets and `macro` bodies
//! - filter, test and function names, keyword-argument names
//! - keywords, literals and the `loop` object
//! - anything in `{# comments #}` or `{% raw %}` blocks
//!
//! A read is guarded when it carries its own `is defined`, `is undefined` or
//! `| default(...)`, or when it sits in an `if` branch that only runs with
//! the name bound (`{% if x is defined %}` body, `{% if x is not defined %}`
//! `else`). A name read at least once without a guard is required; a name
//! only ever read behind one is optional.
//!
//! [`references`] lists the templates a source pulls in with `include`,
//! `import` or `extends`.

use std::collections::{BTreeSet, HashSet};
use std::mem;

use netdeploy_core::Variables;
use serde::Serialize;

/// Root context names a template reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferredVariables {
    /// Read without a guard; rendering fails if they are unbound.
    pub required: BTreeSet<String>,
    /// Only read behind `is defined`, `is undefined` or `| default`.
    pub optional: BTreeSet<String>,
}

impl InferredVariables {
    /// Required names absent from `binding`, in sorted order.
    pub fn missing(&self, binding: &Variables) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| !binding.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }

    /// Fold in the variables of an included or parent template.
    pub fn merge(&mut self, other: InferredVariables) {
        self.required.extend(other.required);
        self.optional.extend(other.optional);
        let required = &self.required;
        self.optional.retain(|name| !required.contains(name));
    }
}

/// A template named by `include`, `import` or `extends`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub name: String,
    /// `include ... ignore missing`
    pub optional: bool,
}

/// Templates referenced by `source`, in order of first appearance.
pub fn references(source: &str) -> Vec<TemplateRef> {
    let mut out: Vec<TemplateRef> = Vec::new();
    for tag in tags(source) {
        let Tag::Statement(body) = tag else { continue };
        let Some((keyword, rest)) = body.split_once(char::is_whitespace) else {
            continue;
        };
        if !matches!(keyword, "include" | "import" | "extends") {
            continue;
        }
        let optional = rest.contains("ignore missing");
        let targets = rest.split(" as ").next().unwrap_or(rest);
        for name in quoted(targets) {
            if !out.iter().any(|r| r.name == name) {
                out.push(TemplateRef { name, optional });
            }
        }
    }
    out
}

fn quoted(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if matches!(c, '"' | '\'' | '`') {
            let inner: String = chars.by_ref().take_while(|x| *x != c).collect();
            out.push(inner);
        }
    }
    out
}

/// Infer the context variables of a template source.
pub fn infer(source: &str) -> InferredVariables {
    let mut scanner = Scanner::new();
    for tag in tags(source) {
        match tag {
            Tag::Expression(body) => scanner.expression(&tokenize(body)),
            Tag::Statement(body) => scanner.statement(&tokenize(body)),
        }
    }
    scanner.finish()
}

// ---------------------------------------------------------------------------
// Tag extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag<'a> {
    Expression(&'a str),
    Statement(&'a str),
}

fn tags(source: &str) -> Vec<Tag<'_>> {
    let mut out = Vec::new();
    let mut rest = source;
    let mut in_raw = false;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = match after.as_bytes().first() {
            Some(b'{') => "}}",
            Some(b'%') => "%}",
            Some(b'#') => "#}",
            _ => {
                rest = after;
                continue;
            }
        };
        let inner = &after[1..];
        let Some(end) = inner.find(close) else { break };
        let body = inner[..end].trim().trim_matches('-').trim();
        rest = &inner[end + close.len()..];

        match close {
            "%}" if in_raw => in_raw = body != "endraw",
            "%}" if body == "raw" => in_raw = true,
            "%}" => out.push(Tag::Statement(body)),
            "}}" if !in_raw => out.push(Tag::Expression(body)),
            _ => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Ident(&'a str),
    Literal,
    Punct(&'a str),
}

const TWO_CHAR_PUNCT: &[&str] = &["==", "!=", "<=", ">=", "::", "//", "**"];

fn tokenize(expr: &str) -> Vec<Tok<'_>> {
    let bytes = expr.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Tok::Ident(&expr[start..i]));
        } else if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            out.push(Tok::Literal);
        } else if matches!(c, b'"' | b'\'' | b'`') {
            i += 1;
            while i < bytes.len() && bytes[i] != c {
                i += 1;
            }
            i += 1;
            out.push(Tok::Literal);
        } else if let Some(p) = expr.get(i..i + 2).filter(|p| TWO_CHAR_PUNCT.contains(p)) {
            out.push(Tok::Punct(p));
            i += 2;
        } else {
            let len = expr[i..].chars().next().map_or(1, char::len_utf8);
            out.push(Tok::Punct(&expr[i..i + len]));
            i += len;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "as", "if", "else", "true", "false", "True", "False",
    "none", "None", "loop", "__tera_context",
];

/// One open `{% if %}` block.
#[derive(Default)]
struct Branch {
    /// Names known to be bound in the branch being scanned.
    bound: HashSet<String>,
    /// Names known to be bound once every condition so far was false.
    bound_after: HashSet<String>,
}

struct Scanner {
    /// Innermost scope last; index 0 holds template-level `set` targets.
    scopes: Vec<HashSet<String>>,
    branches: Vec<Branch>,
    macro_depth: usize,
    /// Read at least once without a guard.
    seen: BTreeSet<String>,
    guarded: BTreeSet<String>,
}

impl Scanner {
    fn new() -> Self {
        Self {
            scopes: vec![HashSet::new()],
            branches: Vec::new(),
            macro_depth: 0,
            seen: BTreeSet::new(),
            guarded: BTreeSet::new(),
        }
    }

    fn finish(self) -> InferredVariables {
        let optional = self.guarded.difference(&self.seen).cloned().collect();
        InferredVariables {
            required: self.seen,
            optional,
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.branches.iter().any(|b| b.bound.contains(name))
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind_local(&mut self, name: &str, global: bool) {
        let scope = if global {
            self.scopes.first_mut()
        } else {
            self.scopes.last_mut()
        };
        if let Some(scope) = scope {
            scope.insert(name.to_string());
        }
    }

    fn statement(&mut self, toks: &[Tok<'_>]) {
        let Some(Tok::Ident(keyword)) = toks.first() else {
            return;
        };
        let rest = &toks[1..];
        match *keyword {
            "for" => {
                let split = rest
                    .iter()
                    .position(|t| *t == Tok::Ident("in"))
                    .unwrap_or(rest.len());
                self.expression(rest.get(split + 1..).unwrap_or(&[]));
                let targets = rest[..split].iter().filter_map(|t| match t {
                    Tok::Ident(name) => Some(name.to_string()),
                    _ => None,
                });
                self.scopes.push(targets.collect());
            }
            "endfor" => {
                if self.scopes.len() > 1 {
                    self.scopes.pop();
                }
            }
            "macro" => self.macro_depth += 1,
            "endmacro" => self.macro_depth = self.macro_depth.saturating_sub(1),
            "set" | "set_global" => {
                if let Some(Tok::Ident(target)) = rest.first() {
                    self.expression(rest.get(2..).unwrap_or(&[]));
                    self.bind_local(target, *keyword == "set_global");
                }
            }
            "if" => {
                let (then, otherwise) = condition_guards(rest);
                self.guarded_expression(rest, &then);
                self.branches.push(Branch {
                    bound: then,
                    bound_after: otherwise,
                });
            }
            "elif" => {
                let (then, otherwise) = condition_guards(rest);
                let prior = self
                    .branches
                    .last_mut()
                    .map(|b| mem::take(&mut b.bound_after))
                    .unwrap_or_default();
                let after: HashSet<String> = prior.union(&otherwise).cloned().collect();
                if let Some(branch) = self.branches.last_mut() {
                    branch.bound = prior;
                }
                self.guarded_expression(rest, &then);
                if let Some(branch) = self.branches.last_mut() {
                    branch.bound.extend(then);
                    branch.bound_after = after;
                }
            }
            "else" => {
                if let Some(branch) = self.branches.last_mut() {
                    branch.bound = mem::take(&mut branch.bound_after);
                }
            }
            "endif" => {
                self.branches.pop();
            }
            "filter" => self.expression(rest.get(1..).unwrap_or(&[])),
            "include" | "import" | "extends" | "block" | "endblock" | "endfilter" | "break"
            | "continue" => {}
            _ => self.expression(toks),
        }
    }

    fn expression(&mut self, toks: &[Tok<'_>]) {
        self.guarded_expression(toks, &HashSet::new());
    }

    /// Scan `toks`, treating reads of names in `bound` as guarded.
    fn guarded_expression(&mut self, toks: &[Tok<'_>], bound: &HashSet<String>) {
        if self.macro_depth > 0 {
            return;
        }
        for (i, tok) in toks.iter().enumerate() {
            let Tok::Ident(name) = *tok else { continue };
            let prev = i.checked_sub(1).map(|p| toks[p]);
            let next = toks.get(i + 1).copied();

            let member = matches!(
                prev,
                Some(Tok::Punct(".")) | Some(Tok::Punct("|")) | Some(Tok::Punct("::"))
            );
            let test_name = prev == Some(Tok::Ident("is"))
                || (prev == Some(Tok::Ident("not"))
                    && i >= 2
                    && toks[i - 2] == Tok::Ident("is"));
            let callee_or_kwarg = matches!(
                next,
                Some(Tok::Punct("(")) | Some(Tok::Punct("=")) | Some(Tok::Punct("::"))
            );
            if member
                || test_name
                || callee_or_kwarg
                || KEYWORDS.contains(&name)
                || self.is_local(name)
            {
                continue;
            }

            let guarded = is_guarded(toks, path_end(toks, i + 1))
                || bound.contains(name)
                || self.is_bound(name);
            if guarded {
                self.guarded.insert(name.to_string());
            } else {
                self.seen.insert(name.to_string());
            }
        }
    }
}

/// Index just past an attribute/index path such as `a.b[0].c`.
fn path_end(toks: &[Tok<'_>], mut i: usize) -> usize {
    loop {
        match toks.get(i) {
            Some(Tok::Punct(".")) => i += 2,
            Some(Tok::Punct("[")) => {
                let mut depth = 0usize;
                while let Some(tok) = toks.get(i) {
                    match tok {
                        Tok::Punct("[") => depth += 1,
                        Tok::Punct("]") => depth -= 1,
                        _ => {}
                    }
                    i += 1;
                    if depth == 0 {
                        break;
                    }
                }
            }
            _ => return i,
        }
    }
}

/// Names a condition proves bound when it holds, and when it fails.
///
/// `x is defined and y` binds `x` in its body; `x is not defined or y`
/// binds `x` in the branches after it. Anything with a bare `not` proves
/// nothing.
fn condition_guards(toks: &[Tok<'_>]) -> (HashSet<String>, HashSet<String>) {
    let mut defined = HashSet::new();
    let mut undefined = HashSet::new();
    for (i, tok) in toks.iter().enumerate() {
        match tok {
            Tok::Ident("not") if i == 0 || toks[i - 1] != Tok::Ident("is") => {
                return (HashSet::new(), HashSet::new());
            }
            Tok::Ident(name) if i == 0 || toks[i - 1] != Tok::Punct(".") => {
                let at = path_end(toks, i + 1);
                match (toks.get(at), toks.get(at + 1), toks.get(at + 2)) {
                    (Some(Tok::Ident("is")), Some(Tok::Ident("defined")), _)
                    | (Some(Tok::Ident("is")), Some(Tok::Ident("not")), Some(Tok::Ident("undefined"))) => {
                        defined.insert(name.to_string());
                    }
                    (Some(Tok::Ident("is")), Some(Tok::Ident("undefined")), _)
                    | (Some(Tok::Ident("is")), Some(Tok::Ident("not")), Some(Tok::Ident("defined"))) => {
                        undefined.insert(name.to_string());
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    let any_or = toks.contains(&Tok::Ident("or"));
    let any_and = toks.contains(&Tok::Ident("and"));
    (
        if any_or { HashSet::new() } else { defined },
        if any_and { HashSet::new() } else { undefined },
    )
}

fn is_guarded(toks: &[Tok<'_>], at: usize) -> bool {
    match (toks.get(at), toks.get(at + 1), toks.get(at + 2)) {
        (Some(Tok::Ident("is")), Some(Tok::Ident("defined" | "undefined")), _) => true,
        (Some(Tok::Ident("is")), Some(Tok::Ident("not")), Some(Tok::Ident("defined" | "undefined"))) => {
            true
        }
        (Some(Tok::Punct("|")), Some(Tok::Ident("default")), _) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
