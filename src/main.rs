// ─────────────────────────────────────────────────────────────────────────────
//  formulary  —  command-line front end
//
//  USAGE
//  ─────
//    formulary parse   template.txt [--json]
//    formulary fmt     template.txt [--write | --check]
//    formulary check   templates/ other.txt
//    formulary methods [object] [--search slice]
//    formulary split   '"a,b", {{math.add(1, 2)}}, end=3'
// ─────────────────────────────────────────────────────────────────────────────

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser as ClapParser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use walkdir::WalkDir;

use formulary_core::catalog::loader::default_catalog_dir;
use formulary_core::parser::split_arguments_with_offsets;
use formulary_core::{
    serialize, ArgumentBinding, Engine, EngineOptions, ExpressionNode, ExpressionTree,
    Namespace, ParseConfig, Signature,
};

// ─────────────────────────────────────────────────────────────────────────────
//  CLI definition (clap derive)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(ClapParser)]
#[command(
    name    = "formulary",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Parse, check and format {{namespace.method(...)}} helper formulas",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Deepest argument nesting accepted
    #[arg(long, global = true, env = "FORMULARY_MAX_DEPTH",
          default_value_t = ParseConfig::default().max_depth)]
    max_depth: usize,

    /// Only print errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Args)]
struct CatalogArgs {
    /// Extra catalog manifest (.toml or .json); may be repeated
    #[arg(long = "catalog", global = true, value_name = "FILE")]
    manifests: Vec<PathBuf>,

    /// Directory scanned for catalog manifests
    /// (default: ~/.local/share/formulary/catalog, if present)
    #[arg(long, global = true, env = "FORMULARY_CATALOG_DIR", value_name = "DIR")]
    catalog_dir: Option<PathBuf>,

    /// Do not load the built-in namespaces
    #[arg(long, global = true)]
    no_builtin: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the expression tree of a template
    Parse {
        /// Template file, or `-` for stdin
        input: String,

        /// Emit the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a template in canonical form
    Fmt {
        /// Template file, or `-` for stdin
        input: String,

        /// Rewrite the file in place
        #[arg(long, conflicts_with = "check")]
        write: bool,

        /// Exit non-zero if the file is not already canonical
        #[arg(long)]
        check: bool,
    },
    /// Parse every template under the given paths and report errors
    Check(CheckArgs),
    /// List catalog signatures
    Methods {
        /// Only this namespace (prefix or alias)
        namespace: Option<String>,

        /// Case-insensitive match on method name or description
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    /// Show how an argument list is split
    Split {
        /// Text between a call's parentheses
        raw: String,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// File extensions picked up when walking directories
    #[arg(long, value_delimiter = ',', default_value = "txt,tpl,fml")]
    ext: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_tracing(cli.verbose, cli.quiet, cli.no_color);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, no_color: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (_, 0)    => LevelFilter::WARN,
        (_, 1)    => LevelFilter::INFO,
        (_, 2)    => LevelFilter::DEBUG,
        _         => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let engine = build_engine(&cli.catalog, cli.max_depth)?;
    let quiet  = cli.quiet;

    match cli.command {
        Cmd::Parse { input, json }         => cmd_parse(&engine, &input, json),
        Cmd::Fmt { input, write, check }   => cmd_fmt(&engine, &input, write, check, quiet),
        Cmd::Check(args)                   => cmd_check(&engine, args, quiet),
        Cmd::Methods { namespace, search } => cmd_methods(&engine, namespace.as_deref(), search.as_deref()),
        Cmd::Split { raw }                 => { cmd_split(&raw); Ok(ExitCode::SUCCESS) }
    }
}

fn build_engine(args: &CatalogArgs, max_depth: usize) -> Result<Engine> {
    let catalog_dir = args.catalog_dir.clone().or_else(|| {
        let dir = default_catalog_dir();
        dir.is_dir().then_some(dir)
    });
    if let Some(dir) = &catalog_dir {
        info!("catalog directory: {}", dir.display());
    }

    let engine = Engine::new(ParseConfig { max_depth })
        .with_options(EngineOptions {
            catalog_dir,
            manifests:  args.manifests.clone(),
            no_builtin: args.no_builtin,
        })
        .context("cannot load catalog")?;

    debug!(methods = engine.catalog().len(), "catalog ready");
    Ok(engine)
}

// ─────────────────────────────────────────────────────────────────────────────
//  Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_parse(engine: &Engine, input: &str, json: bool) -> Result<ExitCode> {
    let source = read_input(input)?;
    let tree = match engine.scan(&source) {
        Ok(t)  => t,
        Err(e) => {
            eprintln!("{}", e.pretty(&source));
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree, 0);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_fmt(engine: &Engine, input: &str, write: bool, check: bool, quiet: bool) -> Result<ExitCode> {
    let source = read_input(input)?;
    let canonical = match engine.scan(&source) {
        Ok(tree) => serialize(&tree),
        Err(e)   => {
            eprintln!("{}", e.pretty(&source));
            return Ok(ExitCode::FAILURE);
        }
    };

    if check {
        if canonical == source {
            if !quiet {
                println!("{} {}", "✓".green().bold(), input);
            }
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!("{} {} is not canonical", "✗".red().bold(), input);
        return Ok(ExitCode::FAILURE);
    }

    if write {
        if input == "-" {
            bail!("--write needs a file, not stdin");
        }
        if canonical != source {
            std::fs::write(input, &canonical).with_context(|| format!("cannot write {}", input))?;
            if !quiet {
                println!("{} rewrote {}", "✓".green().bold(), input);
            }
        } else if !quiet {
            println!("{} {} {}", "✓".green().bold(), input, "(unchanged)".dimmed());
        }
        return Ok(ExitCode::SUCCESS);
    }

    print!("{}", canonical);
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(engine: &Engine, args: CheckArgs, quiet: bool) -> Result<ExitCode> {
    let files = collect_files(&args.paths, &args.ext);
    if files.is_empty() {
        bail!("no template files found");
    }
    info!("checking {} file(s)", files.len());

    let parser = engine.parser();
    let results: Vec<(&PathBuf, std::result::Result<usize, String>)> = files
        .par_iter()
        .map(|path| {
            let outcome = match std::fs::read_to_string(path) {
                Err(e)     => Err(format!("cannot read {}: {}", path.display(), e)),
                Ok(source) => parser.scan(&source)
                    .map(|tree| tree.helper_calls().len())
                    .map_err(|e| e.pretty(&source)),
            };
            (path, outcome)
        })
        .collect();

    let mut failed = 0usize;
    for (path, outcome) in &results {
        match outcome {
            Ok(calls) => {
                if !quiet {
                    println!(
                        "{} {} {}",
                        "✓".green().bold(),
                        path.display(),
                        format!("[{} call{}]", calls, if *calls == 1 { "" } else { "s" }).dimmed(),
                    );
                }
            }
            Err(report) => {
                failed += 1;
                eprintln!("{} {}", "✗".red().bold(), path.display().to_string().bold());
                eprintln!("{}\n", report);
            }
        }
    }

    if !quiet {
        println!("{}", "─".repeat(60).dimmed());
        println!("{} file(s) checked, {} with errors", results.len(), failed);
    }
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_methods(engine: &Engine, namespace: Option<&str>, search: Option<&str>) -> Result<ExitCode> {
    let catalog = engine.catalog();
    let namespaces: Vec<&Namespace> = match namespace {
        Some(ns) => match catalog.namespace(ns) {
            Some(n) => vec![n],
            None    => bail!("unknown namespace `{}`", ns),
        },
        None => catalog.namespaces(),
    };

    if let Some(q) = search {
        let q = q.to_lowercase();
        let mut hits = 0usize;
        for ns in &namespaces {
            for sig in ns.methods() {
                if sig.name.to_lowercase().contains(&q) || sig.description.to_lowercase().contains(&q) {
                    print_signature(sig);
                    hits += 1;
                }
            }
        }
        if hits == 0 {
            eprintln!("formulary: no methods match `{}`", q);
        }
        return Ok(ExitCode::SUCCESS);
    }

    for ns in namespaces {
        let title = if ns.title.is_empty() { ns.prefix.to_uppercase() } else { ns.title.clone() };
        println!("{} {}", title.cyan().bold(), format!("[{}]", ns.prefix).dimmed());
        if !ns.description.is_empty() {
            println!("{}", ns.description.dimmed());
        }

        for section in &ns.sections {
            println!("\n  {}", section.title.bold());
            for name in &section.methods {
                if let Some(sig) = ns.get(name) {
                    print!("    ");
                    print_signature(sig);
                }
            }
        }

        let rest = ns.unsectioned();
        if !rest.is_empty() {
            println!("\n  {}", "Other".bold());
            for sig in rest {
                print!("    ");
                print_signature(sig);
            }
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_split(raw: &str) {
    let parts = split_arguments_with_offsets(raw);
    if parts.is_empty() {
        println!("{}", "(no arguments)".dimmed());
    }
    for (i, (offset, arg)) in parts.iter().enumerate() {
        println!("{} {} {:?}", format!("[{}]", i).cyan(), format!("@{}", offset).dimmed(), arg);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("cannot read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("cannot read {}", input))
}

/// Explicit files are always taken; directories contribute files whose
/// extension is in `exts`. Sorted and deduplicated.
fn collect_files(paths: &[PathBuf], exts: &[String]) -> Vec<PathBuf> {
    let wanted = |p: &Path| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(|e| exts.iter().any(|x| x.trim_start_matches('.') == e))
            .unwrap_or(false)
    };

    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && wanted(e.path()))
                    .map(|e| e.into_path()),
            );
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}

fn print_signature(sig: &Signature) {
    let mark = if sig.looks_variadic() { format!(" {}", "(variadic?)".yellow()) } else { String::new() };
    println!("{}{}", sig.display_signature().green(), mark);
    if !sig.description.is_empty() {
        println!("      {}", sig.description.dimmed());
    }
}

fn print_tree(tree: &ExpressionTree, indent: usize) {
    let pad = "  ".repeat(indent);
    for node in tree {
        match node {
            ExpressionNode::Text { content } => {
                println!("{}{} {:?}", pad, "text".dimmed(), content);
            }
            ExpressionNode::Variable { path } => {
                println!("{}{} {}", pad, "var ".cyan(), path);
            }
            ExpressionNode::Helper(call) => {
                let ret = &call.signature().return_type;
                println!(
                    "{}{} {}.{}{}",
                    pad,
                    "call".green().bold(),
                    call.namespace(),
                    call.name().bold(),
                    if ret.is_empty() { String::new() } else { format!(" -> {}", ret).dimmed().to_string() },
                );
                for (i, arg) in call.arguments().iter().enumerate() {
                    let label = match arg {
                        ArgumentBinding::Positional { .. }   => format!("#{}", i),
                        ArgumentBinding::Keyword { name, .. } => format!("{}=", name),
                    };
                    match arg.value() {
                        None => println!(
                            "{}  {} {} {}",
                            pad, label.yellow(), format!(": {}", arg.expected_type()).dimmed(), "(empty)".dimmed(),
                        ),
                        Some(value) => {
                            println!("{}  {} {}", pad, label.yellow(), format!(": {}", arg.expected_type()).dimmed());
                            print_tree(value, indent + 2);
                        }
                    }
                }
            }
        }
    }
}
