// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: parser
//  Brace scanner and call binder: text → ExpressionTree
// ─────────────────────────────────────────────────────────────────────────────

pub mod args;
pub mod ast;

pub use args::{split_arguments, split_arguments_with_offsets};
pub use ast::*;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::error::{ParseError, Result};

/// `namespace.method(`; the method may carry interior hyphens (`kebab-case`).
static CALL_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*)\(")
        .expect("call-head pattern is valid")
});

/// `name=value`, value possibly empty or spanning lines.
static KEYWORD_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([A-Za-z0-9_]+)=(.*)$").expect("keyword pattern is valid")
});

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Deepest argument nesting accepted before `TooDeeplyNested`.
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────

pub struct Parser<'c> {
    catalog: &'c Catalog,
    config:  ParseConfig,
}

impl<'c> Parser<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog, config: ParseConfig::default() }
    }

    pub fn with_config(catalog: &'c Catalog, config: ParseConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &'c Catalog { self.catalog }

    pub fn config(&self) -> &ParseConfig { &self.config }
}

// ── Public entry ──────────────────────────────────────────────────────────────

impl<'c> Parser<'c> {
    /// Parse interpolation text into a tree.
    pub fn scan(&self, text: &str) -> Result<ExpressionTree> {
        self.scan_at(text, 0, 0)
    }

    /// Resolve `namespace.name` and bind `raw_args` (the text between the
    /// call's parentheses) to its signature.
    pub fn bind(&self, namespace: &str, name: &str, raw_args: &str) -> Result<HelperCall> {
        self.bind_at(namespace, name, raw_args, 0, 0, 0)
    }

    // ── Scanner ───────────────────────────────────────────────────────────────

    /// `base` is the absolute offset of `text[0]`, `depth` the argument
    /// nesting level.
    fn scan_at(&self, text: &str, base: usize, depth: usize) -> Result<ExpressionTree> {
        if depth > self.config.max_depth {
            return Err(ParseError::TooDeeplyNested { limit: self.config.max_depth, offset: base });
        }

        let bytes = text.as_bytes();
        let mut tree       = ExpressionTree::new();
        let mut text_start = 0usize;
        let mut i          = 0usize;

        while i < bytes.len() {
            if !bytes[i..].starts_with(b"{{") {
                i += 1;
                continue;
            }
            let end = span_end(bytes, i).ok_or(ParseError::UnmatchedBraces { offset: base + i })?;

            if text_start < i {
                tree.push(ExpressionNode::text(&text[text_start..i]));
            }

            let inner = &text[i + 2..end - 2];
            if inner.trim().is_empty() {
                return Err(ParseError::EmptyInterpolation { offset: base + i });
            }
            let lead = inner.len() - inner.trim_start().len();
            trace!(offset = base + i, content = %&text[i..end], "interpolation span");
            tree.push(self.classify(inner.trim(), base + i + 2 + lead, depth)?);

            i          = end;
            text_start = end;
        }

        if text_start < bytes.len() || tree.is_empty() {
            tree.push(ExpressionNode::text(&text[text_start..]));
        }
        Ok(tree)
    }

    /// Decide between call and variable from the span's shape alone.
    /// `content` is trimmed and non-empty.
    fn classify(&self, content: &str, offset: usize, depth: usize) -> Result<ExpressionNode> {
        let Some(head) = CALL_HEAD.captures(content) else {
            return Ok(ExpressionNode::variable(content));
        };
        let (whole, [namespace, name]) = head.extract();

        let rest     = &content[whole.len()..];
        let raw_args = rest.strip_suffix(')').unwrap_or(rest);

        let call = self.bind_at(namespace, name, raw_args, offset, offset + whole.len(), depth)?;
        Ok(ExpressionNode::Helper(call))
    }

    // ── Binder ────────────────────────────────────────────────────────────────

    /// `call_at` is where the call head starts (for `UnknownMethod`),
    /// `args_at` where `raw_args` starts.
    fn bind_at(
        &self,
        namespace: &str,
        name:      &str,
        raw_args:  &str,
        call_at:   usize,
        args_at:   usize,
        depth:     usize,
    ) -> Result<HelperCall> {
        let sig = self.catalog.lookup(namespace, name).ok_or_else(|| ParseError::UnknownMethod {
            namespace: namespace.to_owned(),
            name:      name.to_owned(),
            offset:    call_at,
        })?;

        let mut call     = HelperCall::placeholder(namespace, sig);
        let positional   = sig.positional.len();
        let mut next_pos = 0usize;
        let mut supplied = vec![false; sig.keyword.len()];

        for (rel, arg) in split_arguments_with_offsets(raw_args) {
            let at = args_at + rel;

            if let Some(caps) = KEYWORD_ARG.captures(arg) {
                let (_, [kw, value]) = caps.extract();
                let idx = sig.keyword_index(kw).ok_or_else(|| ParseError::UnknownKeywordArgument {
                    name:   kw.to_owned(),
                    offset: at,
                })?;
                if std::mem::replace(&mut supplied[idx], true) {
                    return Err(ParseError::DuplicateKeywordArgument { name: kw.to_owned(), offset: at });
                }
                trace!(keyword = kw, offset = at, "keyword argument");
                let tree = self.parse_value(value, at + kw.len() + 1, depth)?;
                call.set_argument(positional + idx, tree);
            } else {
                if next_pos >= positional {
                    return Err(ParseError::TooManyPositionalArguments {
                        namespace: namespace.to_owned(),
                        name:      name.to_owned(),
                        offset:    at,
                    });
                }
                trace!(slot = next_pos, offset = at, "positional argument");
                let tree = self.parse_value(arg, at, depth)?;
                call.set_argument(next_pos, tree);
                next_pos += 1;
            }
        }

        debug!(
            call   = %format_args!("{}.{}", namespace, name),
            filled = call.filled(),
            slots  = call.arguments().len(),
            "bound helper call"
        );
        Ok(call)
    }

    /// Blank values are placeholders; anything else is scanned verbatim.
    fn parse_value(&self, value: &str, at: usize, depth: usize) -> Result<Option<ExpressionTree>> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        self.scan_at(value, at, depth + 1).map(Some)
    }
}

/// Index just past the `}}` that closes the span opened at `start`, or
/// `None` if the text runs out first. `{{` and `}}` are consumed as pairs.
fn span_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i     = start + 2;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"}}") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Namespace, Signature};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.register(
            Namespace::new("object")
                .method(Signature::new("object", "slice")
                    .named_arg("array", "array")
                    .named_arg("start", "integer")
                    .kwarg("end", "integer"))
                .method(Signature::new("object", "length").arg("array")),
        );
        c.register(
            Namespace::new("string")
                .alias("str")
                .method(Signature::new("string", "kebab-case").arg("string"))
                .method(Signature::new("string", "upper").arg("string")),
        );
        c.register(Namespace::new("outer").method(Signature::new("outer", "call").arg("any")));
        c.register(Namespace::new("inner").method(Signature::new("inner", "call")));
        c
    }

    fn text(s: &str) -> Option<ExpressionTree> {
        Some(ExpressionTree::text(s))
    }

    #[test]
    fn plain_text_is_one_segment() {
        let c = catalog();
        let p = Parser::new(&c);
        assert_eq!(p.scan("hello, world").unwrap(), ExpressionTree::text("hello, world"));
        assert_eq!(p.scan("").unwrap(), ExpressionTree::text(""));
        assert_eq!(p.scan("close }} only").unwrap(), ExpressionTree::text("close }} only"));
    }

    #[test]
    fn variable_reference() {
        let c = catalog();
        let tree = Parser::new(&c).scan("Hi {{ user.name }}!").unwrap();
        assert_eq!(
            tree.nodes,
            vec![
                ExpressionNode::text("Hi "),
                ExpressionNode::variable("user.name"),
                ExpressionNode::text("!"),
            ]
        );
    }

    #[test]
    fn three_part_path_is_a_variable() {
        let c = catalog();
        let tree = Parser::new(&c).scan("{{a.b.c}}").unwrap();
        assert_eq!(tree.nodes, vec![ExpressionNode::variable("a.b.c")]);
    }

    #[test]
    fn slice_binds_positionals_and_leaves_end_empty() {
        let c = catalog();
        let tree = Parser::new(&c).scan("{{object.slice(myArr, 2)}}").unwrap();
        let call = tree.nodes[0].as_helper().unwrap();
        assert_eq!(call.name(), "slice");
        assert_eq!(call.arguments()[0].value(), text("myArr").as_ref());
        assert_eq!(call.arguments()[1].value(), text("2").as_ref());
        assert_eq!(call.keyword("end").unwrap().value(), None);
    }

    #[test]
    fn keyword_argument_binds_to_its_slot() {
        let c = catalog();
        let call = Parser::new(&c).bind("object", "slice", "xs, end=4").unwrap();
        assert_eq!(call.arguments()[0].value(), text("xs").as_ref());
        assert_eq!(call.arguments()[1].value(), None);
        assert_eq!(call.arguments()[2].value(), text("4").as_ref());
    }

    #[test]
    fn nested_call_is_scanned_recursively() {
        let c = catalog();
        let tree = Parser::new(&c).scan("{{outer.call({{inner.call()}})}}").unwrap();
        let outer = tree.nodes[0].as_helper().unwrap();
        let value = outer.arguments()[0].value().unwrap();
        assert_eq!(value.helper_calls().len(), 1);
        assert_eq!(value.helper_calls()[0].namespace(), "inner");
    }

    #[test]
    fn hyphenated_method_and_alias_resolve() {
        let c = catalog();
        let tree = Parser::new(&c).scan("{{str.kebab-case(title)}}").unwrap();
        let call = tree.nodes[0].as_helper().unwrap();
        assert_eq!(call.namespace(), "str");
        assert_eq!(call.signature().namespace, "string");
        assert_eq!(call.name(), "kebab-case");
    }

    #[test]
    fn missing_close_paren_keeps_trailing_text() {
        let c = catalog();
        let call = Parser::new(&c).bind("object", "length", "x) tail").unwrap();
        assert_eq!(call.arguments()[0].value(), text("x) tail").as_ref());
    }

    #[test]
    fn unmatched_braces_report_span_start() {
        let c = catalog();
        let p = Parser::new(&c);
        assert_eq!(p.scan("{{a.b(").unwrap_err(), ParseError::UnmatchedBraces { offset: 0 });
        assert_eq!(p.scan("ok {{x").unwrap_err(), ParseError::UnmatchedBraces { offset: 3 });
    }

    #[test]
    fn empty_span_is_rejected() {
        let c = catalog();
        let err = Parser::new(&c).scan("a {{  }} b").unwrap_err();
        assert_eq!(err, ParseError::EmptyInterpolation { offset: 2 });
    }

    #[test]
    fn unknown_method_reported_at_call_head() {
        let c = catalog();
        let err = Parser::new(&c).scan("x {{ foo.bar() }}").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownMethod { namespace: "foo".into(), name: "bar".into(), offset: 5 }
        );
    }

    #[test]
    fn unknown_and_duplicate_keywords() {
        let c = catalog();
        let p = Parser::new(&c);
        assert_eq!(
            p.bind("object", "slice", "xs, 1, stop=2").unwrap_err(),
            ParseError::UnknownKeywordArgument { name: "stop".into(), offset: 7 }
        );
        assert_eq!(
            p.bind("object", "slice", "end=1, end=2").unwrap_err(),
            ParseError::DuplicateKeywordArgument { name: "end".into(), offset: 7 }
        );
    }

    #[test]
    fn too_many_positionals() {
        let c = catalog();
        let err = Parser::new(&c).bind("object", "length", "a, b").unwrap_err();
        assert_eq!(
            err,
            ParseError::TooManyPositionalArguments {
                namespace: "object".into(),
                name:      "length".into(),
                offset:    3,
            }
        );
    }

    #[test]
    fn nested_errors_carry_absolute_offsets() {
        let c = catalog();
        let err = Parser::new(&c).scan("{{outer.call({{nope.x()}})}}").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownMethod { namespace: "nope".into(), name: "x".into(), offset: 15 }
        );
    }

    #[test]
    fn depth_guard_trips_instead_of_overflowing() {
        let c = catalog();
        let p = Parser::with_config(&c, ParseConfig { max_depth: 3 });

        let nest = |n: usize| {
            let mut s = String::from("v");
            for _ in 0..n {
                s = format!("{{{{outer.call({})}}}}", s);
            }
            s
        };

        assert!(p.scan(&nest(3)).is_ok());
        assert!(matches!(
            p.scan(&nest(5)).unwrap_err(),
            ParseError::TooDeeplyNested { limit: 3, .. }
        ));
    }

    #[test]
    fn blank_positional_is_a_placeholder() {
        let c = catalog();
        let call = Parser::new(&c).bind("object", "slice", " , 2").unwrap();
        assert_eq!(call.arguments()[0].value(), None);
        assert_eq!(call.arguments()[1].value(), text("2").as_ref());
    }
}
