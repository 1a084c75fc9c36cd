//! Appfile Compiler CLI
//!
//! Usage:
//!   appfile-compiler [OPTIONS] <APPFILE>
//!
//! Options:
//!   -c, --config <FILE>        Compiler configuration (TOML format)
//!   -d, --definitions <FILE>   Definitions file, may be repeated
//!   -n, --namespace <NS>       Namespace for the produced resources
//!   --compact                  Print the manifest on a single line
//!   -g, --grammar              Show template language reference
//!   -v, --verbose              Log each rendered workload and trait
//!   -h, --help                 Print help

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use appfile_compiler::{
    compile_manifest, CompileError, CompilerConfig, LoaderError, TemplateRegistry,
};

#[derive(Parser)]
#[command(name = "appfile-compiler")]
#[command(about = "Render application descriptors into OAM resources")]
struct Cli {
    /// Appfile to compile (`-` reads from stdin)
    #[arg(required_unless_present = "grammar")]
    appfile: Option<PathBuf>,

    /// Compiler configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Definitions file (TOML format), may be given more than once
    #[arg(short, long = "definitions")]
    definitions: Vec<PathBuf>,

    /// Namespace for the produced resources
    #[arg(short, long)]
    namespace: Option<String>,

    /// Print the manifest on a single line
    #[arg(long)]
    compact: bool,

    /// Show template language reference
    #[arg(short, long)]
    grammar: bool,

    /// Log each rendered workload and trait
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, env.as_deref()))
        .with_writer(io::stderr)
        .init();

    if cli.grammar {
        print_grammar();
        return;
    }

    // Load configuration, then let flags override it
    let mut config = match &cli.config {
        Some(path) => match CompilerConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };
    for path in &cli.definitions {
        config = config.with_definitions(path);
    }
    if let Some(ns) = &cli.namespace {
        config = config.with_namespace(ns);
    }
    if cli.compact {
        config = config.with_pretty(false);
    }

    let registry = match config.registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading definitions: {}", e);
            std::process::exit(1);
        }
    };

    // Read input
    let source = match cli.appfile.as_deref() {
        Some(path) if path.as_os_str() != "-" => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        _ => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    match compile(&source, &registry, &config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            report(&e);
            std::process::exit(1);
        }
    }
}

/// Log filter from `RUST_LOG`, warnings only when it is unset; `-v` adds
/// debug output on top
fn log_filter(verbose: bool, env: Option<&str>) -> EnvFilter {
    let from_env = env
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok());
    match (from_env, verbose) {
        (Some(filter), true) => filter.add_directive(Level::DEBUG.into()),
        (Some(filter), false) => filter,
        (None, true) => EnvFilter::new("debug"),
        (None, false) => EnvFilter::new("warn"),
    }
}

fn compile(
    source: &str,
    registry: &TemplateRegistry,
    config: &CompilerConfig,
) -> Result<String, CompileError> {
    let manifest = compile_manifest(source, registry, &config.namespace)?;
    let output = if config.pretty {
        serde_json::to_string_pretty(&manifest)?
    } else {
        serde_json::to_string(&manifest)?
    };
    Ok(output)
}

/// Print an error, rendering template syntax errors with their source
fn report(err: &CompileError) {
    if let CompileError::Build(build_err) = err {
        eprintln!("Error ({}): {}", build_err.category(), build_err);
        if let Some(loader_err) = build_err.loader_error() {
            if matches!(loader_err, LoaderError::Parse { .. }) {
                eprintln!("{}", loader_err.report());
            }
        }
        return;
    }
    eprintln!("Error: {}", err);
}

fn print_grammar() {
    println!(
        r#"TEMPLATE LANGUAGE
=================

FIELDS
------
label: value           Field
label?: value          Optional field (omitted from output)
a: b: value            Shorthand for a: {{ b: value }}
"quoted-label": value  Any string as a label
// comment             Line comment

VALUES
------
"text"  42  1.5  true  null     Concrete values
string  int  float  number  bool   Type constraints
_                               Any value
{{ a: 1, b: 2 }}                  Struct
[1, 2, 3]                       List
"\(context.name)-svc"           Interpolation

OPERATORS
---------
a & b           Unify: both must hold
a | b           Either value
*a | b          a is the default

REFERENCES
----------
context.name            Name of the workload being rendered
context.output          Workload output (in trait templates)
context.outputs.<name>  Named outputs rendered so far
parameter.<key>         Properties from the appfile

DEFINITIONS
-----------
output: {{ ... }}         Workload object, or a trait object
outputs: <name>: {{ ... }}  Additional named objects
patch: {{ ... }}          Unified into the workload output (traits)

EXAMPLE
-------
parameter: {{
    image: string
    port: *80 | int
}}
output: {{
    apiVersion: "apps/v1"
    kind: "Deployment"
    metadata: name: context.name
    spec: containers: [{{ image: parameter.image, port: parameter.port }}]
}}"#
    );
}
