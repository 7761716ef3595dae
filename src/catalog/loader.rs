// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: catalog :: loader
//
//  Loads helper namespaces from manifest files on disk. The built-in
//  namespaces are embedded copies of the same format.
//
//  TOML manifest format (one namespace per file):
//
//      [namespace]
//      prefix      = "color"
//      title       = "COLOR"
//      description = "Color conversions."
//      aliases     = ["colour"]
//
//      [[section]]
//      key     = "convert"
//      title   = "Conversion"
//      methods = ["hex_to_rgb"]
//
//      [[method]]
//      name        = "hex_to_rgb"
//      description = "Converts a hex color to an RGB triple."
//      return_type = "array"
//      args   = [ { name = "hex", type = "string" } ]
//      kwargs = [ { name = "alpha", type = "boolean", default = false } ]
//
//  JSON catalogs may hold several namespaces:
//
//      { "color": { "hex_to_rgb": { "name": "hex_to_rgb", "args": [...],
//                                   "kwargs": [...], "returnType": "array" } } }
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::catalog::{Namespace, Section, Signature};
use crate::error::CatalogError;

// ── TOML schema ───────────────────────────────────────────────────────────────

/// Root of a `.toml` catalog manifest.
#[derive(Debug, Deserialize, Serialize)]
pub struct Manifest {
    pub namespace: ManifestNamespace,
    #[serde(default, rename = "section")]
    pub sections:  Vec<Section>,
    #[serde(default, rename = "method")]
    pub methods:   Vec<Signature>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManifestNamespace {
    pub prefix:      String,
    #[serde(default)]
    pub title:       Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Extra prefixes that resolve to this namespace, e.g. `aliases = ["str"]`.
    #[serde(default)]
    pub aliases:     Vec<String>,
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Load a manifest file. `.json` files are read as JSON catalogs (possibly
/// several namespaces); everything else as a single-namespace TOML manifest.
pub fn load_from_file(path: &Path) -> Result<Vec<Namespace>, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if is_json(path) {
        load_json_from_str(&raw, path)
    } else {
        load_from_str(&raw, path).map(|ns| vec![ns])
    }
}

/// Parse a TOML manifest (path is used only for error messages).
pub fn load_from_str(toml_str: &str, path: &Path) -> Result<Namespace, CatalogError> {
    let manifest: Manifest = toml::from_str(toml_str).map_err(|source| CatalogError::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    let header = manifest.namespace;
    if header.prefix.trim().is_empty() {
        return Err(CatalogError::EmptyPrefix { path: path.to_path_buf() });
    }

    let mut ns = Namespace::new(&header.prefix);
    if let Some(title) = header.title {
        ns = ns.with_title(&title);
    }
    if let Some(desc) = header.description {
        ns = ns.with_description(&desc);
    }
    for alias in &header.aliases {
        ns = ns.alias(alias);
    }
    for section in manifest.sections {
        ns = ns.section(section);
    }

    let mut seen = HashSet::new();
    for sig in manifest.methods {
        if !seen.insert(sig.name.clone()) {
            return Err(CatalogError::DuplicateMethod {
                namespace: header.prefix.clone(),
                name:      sig.name,
            });
        }
        ns = ns.method(sig);
    }

    debug!(namespace = %ns.prefix, methods = ns.len(), "loaded catalog manifest {}", path.display());
    Ok(ns)
}

/// Parse a JSON catalog document: namespace → method → signature.
///
/// A signature's own `name` wins over its map key when present.
pub fn load_json_from_str(json: &str, path: &Path) -> Result<Vec<Namespace>, CatalogError> {
    let doc: BTreeMap<String, BTreeMap<String, Signature>> =
        serde_json::from_str(json).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let mut out = Vec::with_capacity(doc.len());
    for (prefix, methods) in doc {
        if prefix.trim().is_empty() {
            return Err(CatalogError::EmptyPrefix { path: path.to_path_buf() });
        }
        let mut ns = Namespace::new(&prefix);
        for (key, mut sig) in methods {
            if sig.name.is_empty() {
                sig.name = key;
            }
            ns = ns.method(sig);
        }
        out.push(ns);
    }
    Ok(out)
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn is_manifest(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("toml") | Some("json"))
}

// ── Catalog search path ───────────────────────────────────────────────────────

/// Returns the default catalog directory.
///   `$FORMULARY_CATALOG_DIR` when set, otherwise
///   Linux/macOS: ~/.local/share/formulary/catalog
///   Windows:     %APPDATA%\formulary\catalog
pub fn default_catalog_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FORMULARY_CATALOG_DIR") {
        return PathBuf::from(dir);
    }
    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("APPDATA").unwrap_or_else(|_| ".".into());
        PathBuf::from(base).join("formulary").join("catalog")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share").join("formulary").join("catalog")
    }
}

/// Every `*.toml` / `*.json` file under `dir`, recursively, in path order.
/// A missing directory yields nothing.
pub fn scan_catalog_dir(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_manifest(e.path()))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Load every manifest under `dir`. Malformed files are skipped with a warning.
pub fn load_all(dir: &Path) -> Vec<Namespace> {
    scan_catalog_dir(dir)
        .into_iter()
        .filter_map(|p| {
            load_from_file(&p)
                .map_err(|e| warn!("skipping catalog manifest {}: {}", p.display(), e))
                .ok()
        })
        .flatten()
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
