use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};

use shape_language_server::config::Config;
use shape_language_server::shape::{SHAPE_DIRECTIVE_KEY, Shape, ShapeRegistry, shape_directive};
use shape_language_server::validation::{FieldError, validate_report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Validate JSON payload files against shapes
#[derive(Debug, Parser)]
#[command(name = "shape-check")]
#[command(version)]
struct Args {
    /// Shape for files without a `$shape` directive
    #[arg(long)]
    shape: Option<String>,

    /// Extra directory of shape TOML files
    #[arg(long)]
    shape_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// List the available shapes and exit
    #[arg(long)]
    list: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Payload files to check
    files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FileReport<'a> {
    file: String,
    shape: &'a str,
    valid: bool,
    record: Map<String, Value>,
    errors: Vec<FieldError>,
    unknown_keys: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = Config::resolve(args.shape.clone(), args.shape_dir.clone(), args.log_level.clone(), &cwd)?;
    config.init_logging();

    let mut registry = ShapeRegistry::with_builtin_shapes();
    for dir in &config.shape_dirs {
        let loaded = registry.load_directory(&dir.path)?;
        if loaded > 0 {
            log::info!("Loaded {} shapes from {}", loaded, dir.path.display());
        }
    }

    if args.list {
        for name in registry.list_shapes() {
            if let Some(shape) = registry.get_shape(name) {
                println!("{}\t{}", name, shape.display_name());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.files.is_empty() {
        bail!("No payload files given");
    }

    let default_shape = config.get_effective_shape();
    let mut failed = false;

    for file in &args.files {
        match check_file(&registry, default_shape.as_deref(), file, args.format) {
            Ok(valid) => failed |= !valid,
            Err(e) => {
                eprintln!("{}: {:#}", file.display(), e);
                failed = true;
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Check one file, returning whether it passed
fn check_file(
    registry: &ShapeRegistry,
    default_shape: Option<&str>,
    file: &Path,
    format: Format,
) -> Result<bool> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let payload: Value = serde_json::from_str(&content).context("Invalid JSON")?;

    let shape = select_shape(registry, default_shape, &payload)?;
    let report = validate_report(shape, &payload);
    let valid = report.is_valid();

    let file_report = FileReport {
        file: file.display().to_string(),
        shape: &shape.name,
        valid,
        record: report.record,
        errors: report.errors.into_vec(),
        unknown_keys: report.unknown_keys,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string(&file_report)?),
        Format::Text => print_text(&file_report)?,
    }

    Ok(valid)
}

/// Directive in the payload first, then the configured default
fn select_shape<'r>(
    registry: &'r ShapeRegistry,
    default_shape: Option<&str>,
    payload: &Value,
) -> Result<&'r Shape> {
    let directive = shape_directive(payload);
    let Some(name) = directive.or(default_shape) else {
        bail!("No shape: add a \"{}\" key or pass --shape", SHAPE_DIRECTIVE_KEY);
    };

    registry
        .get_shape(name)
        .with_context(|| format!("Unknown shape '{}'", name))
}

fn print_text(report: &FileReport<'_>) -> Result<()> {
    if report.valid {
        println!("{}: ok ({})", report.file, report.shape);
        println!("{}", serde_json::to_string_pretty(&report.record)?);
    } else {
        println!(
            "{}: {} error(s) ({})",
            report.file,
            report.errors.len(),
            report.shape
        );
        for error in &report.errors {
            let path = if error.path.is_empty() { "<root>" } else { &error.path };
            println!("  {} [{}]: {}", path, error.kind, error.message);
        }
    }

    for key in &report.unknown_keys {
        println!("  warning: '{}' is not declared in shape '{}'", key, report.shape);
    }

    Ok(())
}
