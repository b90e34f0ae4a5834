// CLI binary: exiting on unrecoverable errors is fine here.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;

use templet::settings::{self, RenderSettings};
use templet::template::error::{ErrorBuffer, ErrorListener, LogListener};
use templet::template::vm;
use templet::template::{AutoIndentWriter, EventCollector, GroupLoader, TemplateGroup, Value};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "templet", about = "Compile and render template groups", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Render settings JSON file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Line width for `wrap` options (overrides settings)
    #[arg(long, global = true)]
    width: Option<usize>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template from a group file
    Render {
        /// Group file (.stg)
        group: PathBuf,
        /// Template name
        template: String,
        /// Attributes as a JSON object
        #[arg(long, conflicts_with = "attrs_file")]
        attrs: Option<String>,
        /// Read attributes from a JSON file
        #[arg(long)]
        attrs_file: Option<PathBuf>,
        /// Write interpreter events as JSON lines to stderr
        #[arg(long)]
        events: bool,
        /// Trace every executed instruction (implies --events output)
        #[arg(long)]
        trace: bool,
    },
    /// Load group files and report every compile error
    Check {
        #[arg(required = true)]
        groups: Vec<PathBuf>,
    },
    /// Print the bytecode of one or all templates in a group
    Disasm {
        group: PathBuf,
        template: Option<String>,
    },
    /// Print the JSON schema of the settings file
    Schema,
}

// ── Helpers ──────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_settings(cli: &Cli) -> RenderSettings {
    let mut s = match &cli.settings {
        Some(path) => settings::load_settings(path).unwrap_or_else(|e| {
            eprintln!("Failed to read settings '{}': {e}", path.display());
            process::exit(1);
        }),
        None => RenderSettings::default(),
    };
    if let Some(width) = cli.width {
        s.line_width = Some(width);
    }
    s
}

fn load_group(path: &Path, listener: Arc<dyn ErrorListener>) -> TemplateGroup {
    GroupLoader::with_listener(listener).load_file(path).unwrap_or_else(|e| {
        eprintln!("Failed to load '{}': {e}", path.display());
        process::exit(1);
    })
}

fn parse_attributes(attrs: Option<&str>, attrs_file: Option<&Path>) -> IndexMap<String, Value> {
    let text = match (attrs, attrs_file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Failed to read '{}': {e}", path.display());
            process::exit(1);
        }),
        (None, None) => return IndexMap::new(),
    };
    let json: serde_json::Value = serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Invalid attribute JSON: {e}");
        process::exit(1);
    });
    let serde_json::Value::Object(map) = json else {
        eprintln!("Attributes must be a JSON object");
        process::exit(1);
    };
    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

// ── Commands ─────────────────────────────────────────────────────

fn run_render(
    group: &TemplateGroup,
    name: &str,
    attributes: &IndexMap<String, Value>,
    settings: &RenderSettings,
    events: bool,
) {
    if !events {
        match group.render(name, attributes, settings) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let Some(mut template) = group.instance_of(name) else {
        eprintln!("Error: no such template: {name}");
        process::exit(1);
    };
    for (key, value) in attributes {
        if let Err(e) = template.add(key, value.clone()) {
            eprintln!("Skipping attribute {key}: {e}");
        }
    }
    let mut out = AutoIndentWriter::new(String::new())
        .with_newline(&settings.newline)
        .with_line_width(settings.line_width);
    let mut collector = EventCollector::new();
    let result = vm::render_debug(&template, &mut out, settings, &mut collector);
    for event in &collector.events {
        eprintln!("{}", serde_json::to_string(event).unwrap_or_default());
    }
    match result {
        Ok(_) => println!("{}", out.into_inner()),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run_check(paths: &[PathBuf]) {
    let mut failed = false;
    for path in paths {
        let errors = Arc::new(ErrorBuffer::new());
        let group = load_group(path, errors.clone());
        if errors.is_empty() {
            println!("{}: {} templates ok", path.display(), group.template_names().len());
        } else {
            failed = true;
            print!("{errors}");
        }
    }
    if failed {
        process::exit(1);
    }
}

fn run_disasm(group: &TemplateGroup, name: Option<&str>) {
    let names = match name {
        Some(n) => vec![templet::template::ast::qualify(n)],
        None => group.template_names(),
    };
    for n in names {
        match group.lookup(&n) {
            Some(compiled) => println!("{}", compiled.disassemble()),
            None => {
                eprintln!("Error: no such template: {n}");
                process::exit(1);
            }
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut render_settings = load_settings(&cli);

    match &cli.command {
        Commands::Render {
            group,
            template,
            attrs,
            attrs_file,
            events,
            trace,
        } => {
            render_settings.trace |= *trace;
            let g = load_group(group, Arc::new(LogListener));
            let attributes = parse_attributes(attrs.as_deref(), attrs_file.as_deref());
            run_render(&g, template, &attributes, &render_settings, *events || *trace);
        }
        Commands::Check { groups } => run_check(groups),
        Commands::Disasm { group, template } => {
            let g = load_group(group, Arc::new(LogListener));
            run_disasm(&g, template.as_deref());
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&settings::settings_schema()).unwrap_or_default());
        }
    }
}
