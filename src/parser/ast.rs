// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: parser :: ast
//  Expression tree produced by scanning interpolation text.
// ─────────────────────────────────────────────────────────────────────────────

use serde::Serialize;

use crate::catalog::Signature;

// ── Tree ──────────────────────────────────────────────────────────────────────

/// Ordered sequence of nodes; the parsed form of one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExpressionTree {
    pub nodes: Vec<ExpressionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpressionNode {
    /// Literal text outside any `{{ }}` span.
    Text     { content: String },
    /// A bare dotted path, e.g. `{{user.name}}`. Never empty.
    Variable { path: String },
    Helper   (HelperCall),
}

impl ExpressionTree {
    pub fn new() -> Self { Self::default() }

    /// A tree holding one text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self { nodes: vec![ExpressionNode::text(content)] }
    }

    pub fn push(&mut self, node: ExpressionNode) {
        self.nodes.push(node);
    }

    /// Builder form of `push`.
    pub fn with(mut self, node: ExpressionNode) -> Self {
        self.nodes.push(node); self
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, ExpressionNode> {
        self.nodes.iter()
    }

    /// Every helper call in the tree, depth-first, outer call before the
    /// calls nested in its arguments.
    pub fn helper_calls(&self) -> Vec<&HelperCall> {
        let mut out = Vec::new();
        self.collect_calls(&mut out);
        out
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a HelperCall>) {
        for node in &self.nodes {
            if let ExpressionNode::Helper(call) = node {
                out.push(call);
                for tree in call.arguments.iter().filter_map(ArgumentBinding::value) {
                    tree.collect_calls(out);
                }
            }
        }
    }

    /// Every variable path referenced anywhere in the tree, in source order.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        for node in &self.nodes {
            match node {
                ExpressionNode::Variable { path } => out.push(path.as_str()),
                ExpressionNode::Helper(call) => {
                    for tree in call.arguments.iter().filter_map(ArgumentBinding::value) {
                        tree.collect_variables(out);
                    }
                }
                ExpressionNode::Text { .. } => {}
            }
        }
    }
}

impl From<Vec<ExpressionNode>> for ExpressionTree {
    fn from(nodes: Vec<ExpressionNode>) -> Self { Self { nodes } }
}

impl<'a> IntoIterator for &'a ExpressionTree {
    type Item     = &'a ExpressionNode;
    type IntoIter = std::slice::Iter<'a, ExpressionNode>;
    fn into_iter(self) -> Self::IntoIter { self.nodes.iter() }
}

impl ExpressionNode {
    pub fn text(content: impl Into<String>) -> Self {
        ExpressionNode::Text { content: content.into() }
    }

    /// # Panics
    /// If `path` is empty; `{{}}` does not scan back.
    pub fn variable(path: impl Into<String>) -> Self {
        let path = path.into();
        assert!(!path.is_empty(), "variable reference path must not be empty");
        ExpressionNode::Variable { path }
    }

    pub fn as_helper(&self) -> Option<&HelperCall> {
        match self {
            ExpressionNode::Helper(call) => Some(call),
            _ => None,
        }
    }
}

// ── Helper calls ──────────────────────────────────────────────────────────────

/// A call bound against its catalog signature.
///
/// `arguments` always holds one binding per declared parameter: positional
/// slots first, then keyword slots, both in signature order. Fields are
/// private so that edits cannot break that shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelperCall {
    namespace: String,
    name:      String,
    #[serde(skip)]
    signature: Signature,
    arguments: Vec<ArgumentBinding>,
}

impl HelperCall {
    /// A call with every slot empty. Outside the crate, go through
    /// `Catalog::instantiate` so the signature is always a catalog entry.
    pub(crate) fn placeholder(namespace: &str, signature: &Signature) -> Self {
        let arguments = signature.positional.iter()
            .map(|p| ArgumentBinding::Positional { expected_type: p.ty.clone(), value: None })
            .chain(signature.keyword.iter().map(|k| ArgumentBinding::Keyword {
                name:          k.name.clone(),
                expected_type: k.ty.clone(),
                value:         None,
            }))
            .collect();

        Self {
            namespace: namespace.to_owned(),
            name:      signature.name.clone(),
            signature: signature.clone(),
            arguments,
        }
    }

    /// Namespace as written in the source; may be an alias of the
    /// signature's canonical namespace.
    pub fn namespace(&self) -> &str { &self.namespace }
    pub fn name(&self)      -> &str { &self.name }
    pub fn signature(&self) -> &Signature { &self.signature }
    pub fn arguments(&self) -> &[ArgumentBinding] { &self.arguments }

    /// The `index`-th positional binding.
    pub fn positional(&self, index: usize) -> Option<&ArgumentBinding> {
        self.arguments.iter().filter(|a| a.is_positional()).nth(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&ArgumentBinding> {
        self.arguments.iter().find(|a| a.keyword_name() == Some(name))
    }

    pub fn keyword_mut(&mut self, name: &str) -> Option<&mut ArgumentBinding> {
        self.arguments.iter_mut().find(|a| a.keyword_name() == Some(name))
    }

    /// Replace the value of binding `index`. Returns `false` if there is no
    /// such slot.
    pub fn set_argument(&mut self, index: usize, value: Option<ExpressionTree>) -> bool {
        match self.arguments.get_mut(index) {
            Some(slot) => { slot.set_value(value); true }
            None       => false,
        }
    }

    /// Slots that have a value.
    pub fn filled(&self) -> usize {
        self.arguments.iter().filter(|a| a.value().is_some()).count()
    }
}

// ── Argument bindings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgumentBinding {
    Positional {
        expected_type: String,
        value:         Option<ExpressionTree>,
    },
    Keyword {
        name:          String,
        expected_type: String,
        value:         Option<ExpressionTree>,
    },
}

impl ArgumentBinding {
    /// `None` is an empty placeholder.
    pub fn value(&self) -> Option<&ExpressionTree> {
        match self {
            ArgumentBinding::Positional { value, .. }
            | ArgumentBinding::Keyword  { value, .. } => value.as_ref(),
        }
    }

    pub fn set_value(&mut self, new: Option<ExpressionTree>) {
        match self {
            ArgumentBinding::Positional { value, .. }
            | ArgumentBinding::Keyword  { value, .. } => *value = new,
        }
    }

    pub fn expected_type(&self) -> &str {
        match self {
            ArgumentBinding::Positional { expected_type, .. }
            | ArgumentBinding::Keyword  { expected_type, .. } => expected_type,
        }
    }

    pub fn keyword_name(&self) -> Option<&str> {
        match self {
            ArgumentBinding::Keyword { name, .. } => Some(name),
            ArgumentBinding::Positional { .. }    => None,
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, ArgumentBinding::Positional { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
