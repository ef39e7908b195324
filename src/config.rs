//! Configuration management for the shape language server.
//!
//! Handles:
//! - Command-line argument parsing
//! - Project configuration (`.shape-ls.toml`)
//! - Shape directory resolution and priorities
//! - Logger initialisation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::shape::ShapePriority;

/// Project configuration file looked up in the workspace root
pub const PROJECT_CONFIG_FILE: &str = ".shape-ls.toml";

/// Command-line arguments for the shape language server
#[derive(Debug, Parser)]
#[command(name = "shape-ls")]
#[command(about = "Language server validating form payloads against declarative shapes")]
#[command(version)]
pub struct Args {
    /// Shape used for documents without a `$shape` directive
    #[arg(long, help = "Default shape (e.g., 'contract', 'invoice')")]
    pub shape: Option<String>,

    /// Custom shape directory to search for shape files
    #[arg(long, help = "Directory containing shape TOML files")]
    pub shape_dir: Option<PathBuf>,

    /// Log level for the language server
    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,
}

/// Contents of `.shape-ls.toml`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Shape used for documents without a `$shape` directive
    pub default_shape: Option<String>,
    /// Workspace shape directory, relative to the project root
    pub shape_dir: Option<PathBuf>,
}

/// A directory of shape files and the priority of what it defines
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDir {
    pub path: PathBuf,
    pub priority: ShapePriority,
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    /// Shape name explicitly set via command line
    pub cli_shape: Option<String>,
    /// Shape name from the project configuration
    pub project_shape: Option<String>,
    /// Where the project configuration was found
    pub project_config_path: Option<PathBuf>,
    /// Shape directories, lowest priority first
    pub shape_dirs: Vec<ShapeDir>,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Create configuration from command-line arguments and the current directory
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        Self::resolve(args.shape, args.shape_dir, args.log_level, &cwd)
    }

    /// Resolve configuration for a workspace root
    pub fn resolve(
        cli_shape: Option<String>,
        cli_shape_dir: Option<PathBuf>,
        log_level: String,
        workspace_root: &Path,
    ) -> Result<Self> {
        let project = load_project_config(workspace_root)?;
        let (project_config_path, project_config) = match project {
            Some((path, config)) => (Some(path), config),
            None => (None, ProjectConfig::default()),
        };

        let mut shape_dirs = Vec::new();

        // User-global shapes: ~/.config/shape-ls/shapes/
        if let Some(config_dir) = dirs::config_dir() {
            shape_dirs.push(ShapeDir {
                path: config_dir.join("shape-ls").join("shapes"),
                priority: ShapePriority::UserGlobal,
            });
        }

        // Workspace shapes: project-configured or ./.shape-ls/shapes/
        let workspace_dir = project_config
            .shape_dir
            .map(|dir| workspace_root.join(dir))
            .unwrap_or_else(|| workspace_root.join(".shape-ls").join("shapes"));
        shape_dirs.push(ShapeDir {
            path: workspace_dir,
            priority: ShapePriority::Workspace,
        });

        // Explicit directory wins over everything else
        if let Some(custom_dir) = cli_shape_dir {
            shape_dirs.push(ShapeDir {
                path: custom_dir,
                priority: ShapePriority::Workspace,
            });
        }

        Ok(Config {
            cli_shape,
            project_shape: project_config.default_shape,
            project_config_path,
            shape_dirs,
            log_level,
        })
    }

    pub fn has_project_config(&self) -> bool {
        self.project_config_path.is_some()
    }

    /// Default shape name: CLI first, then project config
    pub fn get_effective_shape(&self) -> Option<String> {
        self.cli_shape.clone().or_else(|| self.project_shape.clone())
    }

    /// Initialise `env_logger`, honouring `RUST_LOG` over the configured level
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.log_level.as_str());
        if let Err(e) = env_logger::Builder::from_env(env).try_init() {
            log::debug!("Logger already initialised: {}", e);
        }
    }
}

/// Read `.shape-ls.toml` from a workspace root, if present
pub fn load_project_config(workspace_root: &Path) -> Result<Option<(PathBuf, ProjectConfig)>> {
    let path = workspace_root.join(PROJECT_CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read project config: {}", path.display()))?;
    let config: ProjectConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse project config: {}", path.display()))?;

    Ok(Some((path, config)))
}
