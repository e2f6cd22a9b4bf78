mod config;
mod paths;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use whistle_compiler::tree::Root;
use whistle_compiler::{compile, CompileOptions};
use whistle_engine::{EngineOptions, MappingConfig, Transformer};
use whistle_json::Value;

use crate::config::WhistleConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Whistle mapping language toolchain.
#[derive(Parser)]
#[command(name = "whistle", version, about = "Whistle mapping language toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a whistle.toml (default: ./whistle.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `whistle_engine=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a parse tree (JSON) to mapping IR
    Compile {
        /// Path to the parse tree JSON file
        tree: PathBuf,
        /// Attach source positions to the emitted IR
        #[arg(long)]
        source_positions: bool,
    },

    /// Transform an input document with a mapping program
    Run {
        /// Path to the program: IR JSON, or a parse tree with --tree
        program: PathBuf,
        /// Path to the input JSON document
        input: PathBuf,
        /// Treat the program as a parse tree and compile it first
        #[arg(long)]
        tree: bool,
        /// Evaluate the mappings of each projector concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// List every leaf path of a JSON document
    Paths {
        /// Path to the JSON document
        document: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    setup_logging(cli.log_level.as_deref(), &config);

    match cli.command {
        Commands::Compile {
            tree,
            source_positions,
        } => {
            let mut options = config.compile;
            options.include_source_positions |= source_positions;
            cmd_compile(&tree, options, cli.output, cli.quiet);
        }
        Commands::Run {
            program,
            input,
            tree,
            parallel,
        } => {
            let mut options = config.engine;
            options.parallel |= parallel;
            cmd_run(
                &program,
                &input,
                tree.then_some(config.compile),
                options,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Paths { document } => {
            cmd_paths(&document, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr. `--log-level` wins over `RUST_LOG`, which wins
/// over the config file.
fn setup_logging(flag: Option<&str>, config: &WhistleConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match flag {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
    };
    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}

// ──────────────────────────────────────────────
// Subcommands
// ──────────────────────────────────────────────

fn cmd_compile(tree_path: &Path, options: CompileOptions, output: OutputFormat, quiet: bool) {
    let config = compile_tree(tree_path, options, output, quiet);
    print_json(&config, output, quiet);
}

fn cmd_run(
    program_path: &Path,
    input_path: &Path,
    compile_with: Option<CompileOptions>,
    options: EngineOptions,
    output: OutputFormat,
    quiet: bool,
) {
    let config = match compile_with {
        Some(compile_options) => compile_tree(program_path, compile_options, output, quiet),
        None => read_json::<MappingConfig>(program_path, output, quiet),
    };
    let input_text = read_file(input_path, output, quiet);
    let input = match Value::from_json_str(&input_text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", input_path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let transformer = match Transformer::new(config, options) {
        Ok(t) => t,
        Err(e) => {
            report_error(&format!("error loading program: {}", e), output, quiet);
            process::exit(1);
        }
    };
    tracing::info!(parallel = options.parallel, "transforming {}", input_path.display());
    match transformer.transform(&input) {
        Ok(result) => print_json(&result, output, quiet),
        Err(e) => {
            report_error(&format!("transform failed: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_paths(document_path: &Path, output: OutputFormat, quiet: bool) {
    let document = read_json::<Value>(document_path, output, quiet);
    let leaves = paths::leaf_paths(&document);
    match output {
        OutputFormat::Text => {
            if !leaves.is_empty() {
                println!("{}", paths::render_text(&leaves));
            }
        }
        OutputFormat::Json => print_json(&paths::render_json(&leaves), output, quiet),
    }
}

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn compile_tree(
    tree_path: &Path,
    options: CompileOptions,
    output: OutputFormat,
    quiet: bool,
) -> MappingConfig {
    let root = read_json::<Root>(tree_path, output, quiet);
    match compile(&root, &options) {
        Ok(config) => {
            tracing::debug!(
                projectors = config.projector.len(),
                "compiled {}",
                tree_path.display()
            );
            config
        }
        Err(e) => {
            let msg = format!("compile error in '{}': {}", tree_path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn read_file(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, output: OutputFormat, quiet: bool) -> T {
    let text = read_file(path, output, quiet);
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Pretty JSON for text output, one line for `--output json`.
fn print_json<T: serde::Serialize>(value: &T, output: OutputFormat, quiet: bool) {
    let rendered = match output {
        OutputFormat::Text => serde_json::to_string_pretty(value),
        OutputFormat::Json => serde_json::to_string(value),
    };
    match rendered {
        Ok(s) => println!("{}", s),
        Err(e) => {
            report_error(&format!("serialization error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
