// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: catalog
//  Read-only registry: namespace → method name → Signature.
//  Built-in namespaces ship as embedded manifests; extra ones load from disk.
// ─────────────────────────────────────────────────────────────────────────────

pub mod loader;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::parser::HelperCall;

// ── Signature types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionalParam {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name:        Option<String>,
    #[serde(rename = "type")]
    pub ty:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordParam {
    pub name:        String,
    #[serde(rename = "type")]
    pub ty:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Documented default. Never consulted when binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default:     Option<serde_json::Value>,
}

/// One catalog entry. `namespace` is stamped in when the method is
/// registered, so manifests never repeat it per method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub namespace:   String,
    #[serde(default)]
    pub name:        String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "args")]
    pub positional:  Vec<PositionalParam>,
    #[serde(default, rename = "kwargs")]
    pub keyword:     Vec<KeywordParam>,
    #[serde(default, alias = "returnType")]
    pub return_type: String,
}

impl Signature {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace:   namespace.to_owned(),
            name:        name.to_owned(),
            description: String::new(),
            positional:  Vec::new(),
            keyword:     Vec::new(),
            return_type: String::new(),
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_owned(); self
    }
    pub fn arg(mut self, ty: &str) -> Self {
        self.positional.push(PositionalParam { name: None, ty: ty.into(), description: None }); self
    }
    pub fn named_arg(mut self, name: &str, ty: &str) -> Self {
        self.positional.push(PositionalParam { name: Some(name.into()), ty: ty.into(), description: None }); self
    }
    pub fn kwarg(mut self, name: &str, ty: &str) -> Self {
        self.keyword.push(KeywordParam { name: name.into(), ty: ty.into(), description: None, default: None }); self
    }
    pub fn returns(mut self, ty: &str) -> Self {
        self.return_type = ty.to_owned(); self
    }

    /// Number of argument slots a bound call always carries.
    pub fn arity(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn keyword_index(&self, name: &str) -> Option<usize> {
        self.keyword.iter().position(|k| k.name == name)
    }

    /// True for signatures whose last positional slot is named `args`, which
    /// the docs describe as "one or more values". Binding stays strict; this
    /// only feeds listings.
    pub fn looks_variadic(&self) -> bool {
        self.positional.last().and_then(|p| p.name.as_deref()) == Some("args")
    }

    /// Human-readable form, e.g. `object.slice(array: array, start: integer, end=integer) -> array`.
    pub fn display_signature(&self) -> String {
        let mut params: Vec<String> = self.positional.iter()
            .map(|p| match &p.name {
                Some(n) => format!("{}: {}", n, p.ty),
                None    => p.ty.clone(),
            })
            .collect();
        params.extend(self.keyword.iter().map(|k| format!("{}={}", k.name, k.ty)));

        let mut out = format!("{}.{}({})", self.namespace, self.name, params.join(", "));
        if !self.return_type.is_empty() {
            out.push_str(" -> ");
            out.push_str(&self.return_type);
        }
        out
    }
}

// ── Namespaces ────────────────────────────────────────────────────────────────

/// A named group of methods inside a namespace, used for listings only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub key:         String,
    #[serde(default)]
    pub title:       String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub methods:     Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub prefix:      String,
    pub title:       String,
    pub description: String,
    pub aliases:     Vec<String>,
    pub sections:    Vec<Section>,
    methods:         BTreeMap<String, Signature>,
}

impl Namespace {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_owned(), ..Default::default() }
    }
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned(); self
    }
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_owned(); self
    }
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_owned()); self
    }
    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section); self
    }
    /// Register a method; its `namespace` is overwritten with this prefix.
    pub fn method(mut self, sig: Signature) -> Self {
        self.insert(sig); self
    }

    pub(crate) fn insert(&mut self, mut sig: Signature) -> Option<Signature> {
        sig.namespace = self.prefix.clone();
        self.methods.insert(sig.name.clone(), sig)
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.methods.get(name)
    }

    /// All methods, sorted by name.
    pub fn methods(&self) -> impl Iterator<Item = &Signature> {
        self.methods.values()
    }

    pub fn len(&self) -> usize { self.methods.len() }

    pub fn is_empty(&self) -> bool { self.methods.is_empty() }

    /// Methods not listed in any section, sorted by name.
    pub fn unsectioned(&self) -> Vec<&Signature> {
        self.methods.values()
            .filter(|m| !self.sections.iter().any(|s| s.methods.iter().any(|n| n == &m.name)))
            .collect()
    }

    /// Fold `other` into `self`; methods in `other` win on name clashes.
    fn merge(&mut self, other: Namespace) {
        if !other.title.is_empty()       { self.title = other.title; }
        if !other.description.is_empty() { self.description = other.description; }
        for alias in other.aliases {
            if !self.aliases.contains(&alias) { self.aliases.push(alias); }
        }
        self.sections.extend(other.sections);
        for sig in other.methods.into_values() {
            if self.insert(sig).is_some() {
                debug!(namespace = %self.prefix, "catalog method overridden by a later manifest");
            }
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Embedded manifests for the built-in namespaces.
const BUILTIN_MANIFESTS: &[(&str, &str)] = &[
    ("builtin/object.toml", include_str!("builtin/object.toml")),
    ("builtin/string.toml", include_str!("builtin/string.toml")),
    ("builtin/math.toml",   include_str!("builtin/math.toml")),
    ("builtin/date.toml",   include_str!("builtin/date.toml")),
    ("builtin/rfc.toml",    include_str!("builtin/rfc.toml")),
];

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    namespaces: HashMap<String, Namespace>,
    /// alias → canonical prefix
    aliases:    HashMap<String, String>,
}

impl Catalog {
    /// An empty catalog. Every call will fail with `UnknownMethod`.
    pub fn new() -> Self { Self::default() }

    /// Catalog with the `object`, `string`, `math`, `date` and `rfc` namespaces.
    ///
    /// # Panics
    /// If an embedded manifest is malformed; they ship inside the crate.
    pub fn builtin() -> Self {
        let mut c = Self::new();
        for (name, src) in BUILTIN_MANIFESTS {
            let ns = loader::load_from_str(src, Path::new(name))
                .unwrap_or_else(|e| panic!("built-in manifest {} is malformed: {}", name, e));
            c.register(ns);
        }
        c
    }

    /// Built-in namespaces plus every manifest found under `dir`.
    pub fn with_catalog_dir(dir: &Path) -> Self {
        let mut c = Self::builtin();
        c.load_catalog_dir(dir);
        c
    }

    pub fn load_catalog_dir(&mut self, dir: &Path) {
        for ns in loader::load_all(dir) {
            self.register(ns);
        }
    }

    /// Load one manifest file (`.toml` or `.json`) and register what it declares.
    pub fn load_file(&mut self, path: &Path) -> Result<(), CatalogError> {
        for ns in loader::load_from_file(path)? {
            self.register(ns);
        }
        Ok(())
    }

    /// Load a TOML manifest from a string (used in tests and by embedders).
    pub fn load_toml_str(&mut self, toml_str: &str) -> Result<(), CatalogError> {
        let ns = loader::load_from_str(toml_str, Path::new("<inline>"))?;
        self.register(ns);
        Ok(())
    }

    /// Load a JSON catalog document from a string.
    pub fn load_json_str(&mut self, json: &str) -> Result<(), CatalogError> {
        for ns in loader::load_json_from_str(json, Path::new("<inline>"))? {
            self.register(ns);
        }
        Ok(())
    }

    /// Add a namespace. A prefix that is already present is merged into.
    pub fn register(&mut self, ns: Namespace) {
        for alias in &ns.aliases {
            self.aliases.insert(alias.clone(), ns.prefix.clone());
        }
        match self.namespaces.get_mut(&ns.prefix) {
            Some(existing) => existing.merge(ns),
            None => {
                self.namespaces.insert(ns.prefix.clone(), ns);
            }
        }
    }

    // ── Lookup API ────────────────────────────────────────────────────────────

    pub fn lookup(&self, namespace: &str, name: &str) -> Option<&Signature> {
        self.namespace(namespace)?.get(name)
    }

    pub fn namespace(&self, prefix: &str) -> Option<&Namespace> {
        let canonical = self.aliases.get(prefix).map(String::as_str).unwrap_or(prefix);
        self.namespaces.get(canonical)
    }

    /// Canonical namespaces, sorted by prefix.
    pub fn namespaces(&self) -> Vec<&Namespace> {
        let mut all: Vec<&Namespace> = self.namespaces.values().collect();
        all.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        all
    }

    /// Total number of methods across canonical namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(Namespace::len).sum()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// A fresh call with every slot left as a placeholder, the way a method
    /// picked from a menu is inserted before the user fills anything in.
    pub fn instantiate(&self, namespace: &str, name: &str) -> Option<HelperCall> {
        self.lookup(namespace, name)
            .map(|sig| HelperCall::placeholder(namespace, sig))
    }
}

// ── Process-wide catalog ──────────────────────────────────────────────────────

static GLOBAL: OnceCell<Catalog> = OnceCell::new();

/// Install the process-wide catalog. Fails (handing the catalog back) if one
/// was already installed or lazily initialized.
pub fn install(catalog: Catalog) -> Result<(), Catalog> {
    GLOBAL.set(catalog)
}

/// The process-wide catalog; the built-in one unless `install` ran first.
pub fn global() -> &'static Catalog {
    GLOBAL.get_or_init(Catalog::builtin)
}

// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_has_all_namespaces() {
        let c = Catalog::builtin();
        let prefixes: Vec<&str> = c.namespaces().iter().map(|n| n.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["date", "math", "object", "rfc", "string"]);
        assert!(c.len() > 200, "only {} methods loaded", c.len());
    }

    #[test]
    fn every_embedded_manifest_parses() {
        for (name, src) in BUILTIN_MANIFESTS {
            let ns = loader::load_from_str(src, Path::new(name))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(!ns.is_empty(), "{name} declares no methods");
        }
    }

    #[test]
    fn builtin_slice_signature() {
        let c = Catalog::builtin();
        let sig = c.lookup("object", "slice").expect("object.slice");
        assert_eq!(sig.namespace, "object");
        assert_eq!(sig.positional.len(), 2);
        assert_eq!(sig.positional[1].ty, "integer");
        assert_eq!(sig.keyword.len(), 1);
        assert_eq!(sig.keyword[0].name, "end");
        assert_eq!(sig.arity(), 3);
        assert_eq!(
            sig.display_signature(),
            "object.slice(array: array, start: integer, end=integer) -> array"
        );
    }

    #[test]
    fn lookup_misses_are_none() {
        let c = Catalog::builtin();
        assert!(c.lookup("foo", "bar").is_none());
        assert!(c.lookup("object", "nope").is_none());
    }

    #[test]
    fn variadic_looking_signatures_are_flagged() {
        let c = Catalog::builtin();
        assert!(c.lookup("math", "add").unwrap().looks_variadic());
        assert!(c.lookup("math", "subtract").unwrap().looks_variadic());
        assert!(!c.lookup("math", "mod").unwrap().looks_variadic());
    }

    #[test]
    fn aliases_resolve_to_canonical_namespace() {
        let mut c = Catalog::new();
        c.register(
            Namespace::new("text")
                .alias("str")
                .method(Signature::new("", "upper").arg("string")),
        );
        let sig = c.lookup("str", "upper").expect("alias lookup");
        assert_eq!(sig.namespace, "text");
        assert_eq!(c.namespaces().len(), 1);
    }

    #[test]
    fn register_merges_existing_prefix() {
        let mut c = Catalog::new();
        c.register(Namespace::new("m").method(Signature::new("m", "a")));
        c.register(Namespace::new("m").method(Signature::new("m", "b").arg("number")));
        assert_eq!(c.len(), 2);
        assert!(c.lookup("m", "a").is_some());
        assert_eq!(c.lookup("m", "b").unwrap().positional.len(), 1);
    }

    #[test]
    fn instantiate_fills_every_slot_with_placeholders() {
        let c = Catalog::builtin();
        let call = c.instantiate("object", "slice").expect("slice");
        assert_eq!(call.arguments().len(), 3);
        assert!(call.arguments().iter().all(|a| a.value().is_none()));
    }

    #[test]
    fn unsectioned_lists_methods_missing_from_sections() {
        let ns = Namespace::new("n")
            .section(Section { key: "s".into(), title: "S".into(), description: None, methods: vec!["a".into()] })
            .method(Signature::new("n", "a"))
            .method(Signature::new("n", "b"));
        let names: Vec<&str> = ns.unsectioned().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }
}
