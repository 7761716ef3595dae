// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: serializer
//  ExpressionTree → canonical interpolation text
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt;

use crate::parser::{ArgumentBinding, ExpressionNode, ExpressionTree, HelperCall};

/// Canonical text for `tree`. Never fails.
pub fn serialize(tree: &ExpressionTree) -> String {
    let mut out = String::new();
    write_tree(&mut out, tree);
    out
}

fn write_tree(out: &mut String, tree: &ExpressionTree) {
    for node in tree {
        write_node(out, node);
    }
}

fn write_node(out: &mut String, node: &ExpressionNode) {
    match node {
        ExpressionNode::Text { content } => out.push_str(content),
        ExpressionNode::Variable { path } => {
            out.push_str("{{");
            out.push_str(path);
            out.push_str("}}");
        }
        ExpressionNode::Helper(call) => write_call(out, call),
    }
}

fn write_call(out: &mut String, call: &HelperCall) {
    out.push_str("{{");
    out.push_str(call.namespace());
    out.push('.');
    out.push_str(call.name());
    out.push('(');

    // trailing placeholders emit nothing
    let args = call.arguments();
    let used = args.iter().rposition(|a| a.value().is_some()).map_or(0, |i| i + 1);
    for (i, arg) in args[..used].iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_argument(out, arg);
    }

    out.push_str(")}}");
}

fn write_argument(out: &mut String, arg: &ArgumentBinding) {
    if let ArgumentBinding::Keyword { name, .. } = arg {
        out.push_str(name);
        out.push('=');
    }
    if let Some(value) = arg.value() {
        write_tree(out, value);
    }
}

impl fmt::Display for ExpressionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize(self))
    }
}

impl fmt::Display for HelperCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_call(&mut out, self);
        f.write_str(&out)
    }
}

// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Signature;
    use pretty_assertions::assert_eq;

    fn slice() -> HelperCall {
        let sig = Signature::new("object", "slice")
            .arg("array")
            .arg("integer")
            .kwarg("end", "integer");
        HelperCall::placeholder("object", &sig)
    }

    #[test]
    fn text_and_variables() {
        let tree = ExpressionTree::text("Hi ")
            .with(ExpressionNode::variable("user.name"))
            .with(ExpressionNode::text("!"));
        assert_eq!(serialize(&tree), "Hi {{user.name}}!");
    }

    #[test]
    fn placeholder_call_has_empty_parens() {
        let tree = ExpressionTree::new().with(ExpressionNode::Helper(slice()));
        assert_eq!(serialize(&tree), "{{object.slice()}}");
    }

    #[test]
    fn trailing_placeholders_collapse() {
        let mut call = slice();
        call.set_argument(0, Some(ExpressionTree::text("xs")));
        call.set_argument(1, Some(ExpressionTree::text("2")));
        assert_eq!(call.to_string(), "{{object.slice(xs, 2)}}");
    }

    #[test]
    fn interior_placeholders_keep_their_position() {
        let mut call = slice();
        call.set_argument(2, Some(ExpressionTree::text("4")));
        assert_eq!(call.to_string(), "{{object.slice(, , end=4)}}");
    }

    #[test]
    fn interior_keyword_placeholder_renders_name() {
        let sig = Signature::new("string", "pad")
            .arg("string")
            .kwarg("width", "integer")
            .kwarg("char", "string");
        let mut call = HelperCall::placeholder("string", &sig);
        call.set_argument(0, Some(ExpressionTree::text("s")));
        call.set_argument(2, Some(ExpressionTree::text("'*'")));
        assert_eq!(call.to_string(), "{{string.pad(s, width=, char='*')}}");
    }

    #[test]
    fn nested_values_serialize_inline() {
        let mut inner = slice();
        inner.set_argument(0, Some(ExpressionTree::new().with(ExpressionNode::variable("a"))));
        let mut outer = slice();
        outer.set_argument(0, Some(ExpressionTree::new().with(ExpressionNode::Helper(inner))));
        assert_eq!(outer.to_string(), "{{object.slice({{object.slice({{a}})}})}}");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::parser::{split_arguments, Parser};
    use proptest::prelude::*;

    const METHODS: &[(&str, &str)] = &[
        ("object", "slice"),
        ("object", "join"),
        ("object", "length"),
        ("string", "replace"),
        ("string", "padStart"),
        ("string", "kebab-case"),
        ("math",   "mod"),
        ("date",   "now"),
    ];

    /// Catalog-free description of a tree; `build` turns it into the real thing.
    #[derive(Debug, Clone)]
    enum Piece {
        Text(String),
        Var(String),
        Call(usize, Vec<Option<Vec<Piece>>>),
    }

    fn arb_piece() -> impl Strategy<Value = Piece> {
        let leaf = prop_oneof![
            "[a-z0-9_]{1,6}".prop_map(Piece::Text),
            "'[a-z ,()]{0,6}'".prop_map(Piece::Text),
            "\"[a-z ,()']{0,6}\"".prop_map(Piece::Text),
            "[a-z]{1,5}(\\.[a-z]{1,5}){0,2}".prop_map(Piece::Var),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                inner.clone(),
                (
                    0..METHODS.len(),
                    prop::collection::vec(
                        prop::option::of(prop::collection::vec(inner, 1..3)),
                        0..4,
                    ),
                )
                    .prop_map(|(m, slots)| Piece::Call(m, slots)),
            ]
        })
    }

    /// Top level mixes calls with free text; braces stay out of it.
    fn arb_document() -> impl Strategy<Value = Vec<Piece>> {
        prop::collection::vec(
            prop_oneof![
                "[a-zA-Z ,.()=!?'\"]{0,12}".prop_map(Piece::Text),
                arb_piece(),
            ],
            0..5,
        )
    }

    fn build(catalog: &Catalog, pieces: &[Piece]) -> ExpressionTree {
        let mut tree = ExpressionTree::new();
        for piece in pieces {
            tree.push(match piece {
                Piece::Text(s) => ExpressionNode::text(s.clone()),
                Piece::Var(p)  => ExpressionNode::variable(p.clone()),
                Piece::Call(m, slots) => {
                    let (ns, name) = METHODS[*m];
                    let mut call = catalog.instantiate(ns, name).unwrap();
                    for (i, slot) in slots.iter().enumerate() {
                        // Slots past the arity are simply not there.
                        call.set_argument(i, slot.as_ref().map(|v| build(catalog, v)));
                    }
                    ExpressionNode::Helper(call)
                }
            });
        }
        tree
    }

    proptest! {
        #[test]
        fn canonical_text_is_a_fixed_point(doc in arb_document()) {
            let catalog = Catalog::builtin();
            let parser  = Parser::new(&catalog);

            let canonical = serialize(&build(&catalog, &doc));
            let rescanned = parser.scan(&canonical);
            prop_assert!(rescanned.is_ok(), "{canonical:?}: {rescanned:?}");
            prop_assert_eq!(serialize(&rescanned.unwrap()), canonical);
        }

        #[test]
        fn quoted_argument_survives_splitting(
            quoted in "'[a-z ,]{0,8}'",
            rest   in prop::collection::vec("[a-z0-9]{1,4}", 0..3),
        ) {
            let mut raw = quoted.clone();
            for r in &rest {
                raw.push_str(", ");
                raw.push_str(r);
            }
            let args = split_arguments(&raw);
            prop_assert_eq!(&args[0], &quoted);
            prop_assert_eq!(args.len(), rest.len() + 1);
        }
    }
}
