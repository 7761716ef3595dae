// ─────────────────────────────────────────────────────────────────────────────
//  formulary_core  —  public library API
// ─────────────────────────────────────────────────────────────────────────────

pub mod catalog;
pub mod error;
pub mod parser;
pub mod serializer;

use std::path::PathBuf;

pub use catalog::{Catalog, KeywordParam, Namespace, PositionalParam, Section, Signature};
pub use error::{CatalogError, ParseError, Result};
pub use parser::{
    split_arguments, ArgumentBinding, ExpressionNode, ExpressionTree, HelperCall, ParseConfig,
    Parser,
};
pub use serializer::serialize;

// ── Process-wide shortcuts ────────────────────────────────────────────────────

/// Parse `text` against the process-wide catalog.
pub fn scan(text: &str) -> Result<ExpressionTree> {
    Parser::new(catalog::global()).scan(text)
}

/// Bind one call against the process-wide catalog.
pub fn bind(namespace: &str, name: &str, raw_args: &str) -> Result<HelperCall> {
    Parser::new(catalog::global()).bind(namespace, name, raw_args)
}

/// `serialize(scan(text))`: the canonical spelling of `text`.
pub fn canonicalize(text: &str) -> Result<String> {
    scan(text).map(|tree| serialize(&tree))
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// A catalog plus parse settings, for callers that need something other than
/// the process-wide defaults.
///
/// # Built-in namespaces only
/// ```
/// use formulary_core::{Engine, ParseConfig};
///
/// let engine = Engine::new(ParseConfig::default());
/// let out = engine.canonicalize("First: {{ object.slice( items , 0,end=1 ) }}").unwrap();
/// assert_eq!(out, "First: {{object.slice(items, 0, end=1)}}");
/// ```
///
/// # With extra manifests
/// ```no_run
/// use formulary_core::{Engine, EngineOptions, ParseConfig};
/// use std::path::PathBuf;
///
/// let engine = Engine::new(ParseConfig::default())
///     .with_options(EngineOptions {
///         catalog_dir: Some(PathBuf::from("/home/user/.local/share/formulary/catalog")),
///         ..Default::default()
///     })
///     .unwrap();
/// ```
pub struct Engine {
    cfg:     ParseConfig,
    catalog: Catalog,
}

/// Where `Engine` finds manifests beyond the built-in ones.
#[derive(Debug, Default)]
pub struct EngineOptions {
    /// Directory scanned recursively for `*.toml` / `*.json` manifests.
    /// Malformed files are skipped.
    pub catalog_dir: Option<PathBuf>,

    /// Individual manifests; any failure aborts.
    pub manifests: Vec<PathBuf>,

    /// Start from an empty catalog instead of the built-in namespaces.
    pub no_builtin: bool,
}

impl Engine {
    pub fn new(cfg: ParseConfig) -> Self {
        Self { cfg, catalog: Catalog::builtin() }
    }

    pub fn with_catalog(cfg: ParseConfig, catalog: Catalog) -> Self {
        Self { cfg, catalog }
    }

    pub fn with_options(mut self, opts: EngineOptions) -> std::result::Result<Self, CatalogError> {
        if opts.no_builtin {
            self.catalog = Catalog::new();
        }
        if let Some(dir) = &opts.catalog_dir {
            self.catalog.load_catalog_dir(dir);
        }
        for path in &opts.manifests {
            self.catalog.load_file(path)?;
        }
        Ok(self)
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }

    pub fn config(&self) -> &ParseConfig { &self.cfg }

    pub fn parser(&self) -> Parser<'_> {
        Parser::with_config(&self.catalog, self.cfg.clone())
    }

    pub fn scan(&self, text: &str) -> Result<ExpressionTree> {
        self.parser().scan(text)
    }

    pub fn bind(&self, namespace: &str, name: &str, raw_args: &str) -> Result<HelperCall> {
        self.parser().bind(namespace, name, raw_args)
    }

    pub fn canonicalize(&self, text: &str) -> Result<String> {
        self.scan(text).map(|tree| serialize(&tree))
    }

    /// Install this engine's catalog as the process-wide one. Hands the
    /// engine back if a catalog was already in place.
    pub fn install_global(self) -> std::result::Result<(), Self> {
        let cfg = self.cfg;
        catalog::install(self.catalog).map_err(|catalog| Self { cfg, catalog })
    }
}

// ── Diagnostics helper ────────────────────────────────────────────────────────

pub fn pretty_error(err: &ParseError, source: &str) -> String {
    err.pretty(source)
}
