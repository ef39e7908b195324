//! Shape management for the language server.
//!
//! This module handles:
//! - Loading shape definitions from TOML files
//! - File watching for live reload
//! - Loading priority: built-in < user-global < workspace
//! - Shape selection via `$shape` directive, command line or project config

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tower_lsp::Client;
use tower_lsp::lsp_types::MessageType;

use super::registry::{BUILTIN_SHAPES, detect_shape_directive, is_shape_file};
use super::schema::Shape;
use crate::config::{Config, ShapeDir};

/// Represents the loading priority of shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShapePriority {
    BuiltIn = 0,
    UserGlobal = 1,
    Workspace = 2,
}

/// A loaded shape with its source and priority
#[derive(Debug, Clone)]
pub struct LoadedShape {
    pub shape: Shape,
    pub priority: ShapePriority,
    pub source_path: Option<PathBuf>,
}

/// Events from the file watcher
#[derive(Debug)]
enum WatcherEvent {
    ShapeFileChanged(PathBuf),
    WatcherError(notify::Error),
}

/// Configuration for default shape selection
#[derive(Debug, Clone, Default)]
pub struct ShapeSelectionConfig {
    /// Shape explicitly specified via CLI
    pub cli_shape: Option<String>,
    /// Shape from project configuration
    pub project_shape: Option<String>,
    /// Path to project config (for logging)
    pub project_config_path: Option<PathBuf>,
}

type ShapeMap = HashMap<String, LoadedShape>;

/// Sends log lines to both the `log` facade and, when connected, the client
#[derive(Clone, Default)]
struct Reporter {
    client: Option<Client>,
}

impl Reporter {
    async fn report(&self, level: MessageType, message: String) {
        if level == MessageType::ERROR {
            log::error!("{}", message);
        } else if level == MessageType::WARNING {
            log::warn!("{}", message);
        } else {
            log::info!("{}", message);
        }
        if let Some(client) = &self.client {
            client.log_message(level, message).await;
        }
    }
}

/// The main shape manager that handles loading, watching, and resolving shapes
pub struct ShapeManager {
    /// Currently loaded shapes by name
    shapes: Arc<RwLock<ShapeMap>>,
    /// Directories to load and watch, lowest priority first
    shape_dirs: Vec<ShapeDir>,
    /// Default shape selection
    selection_config: ShapeSelectionConfig,
    /// File watcher
    _watcher: Option<RecommendedWatcher>,
    /// Channel to receive watcher events
    watcher_rx: Option<mpsc::UnboundedReceiver<WatcherEvent>>,
    /// Bumped after every reload
    generation: Arc<watch::Sender<u64>>,
    /// Default shapes already reported as missing
    missing_defaults: Mutex<HashSet<String>>,
    reporter: Reporter,
}

impl ShapeManager {
    /// Create a new shape manager with configuration
    pub fn new(config: &Config) -> Self {
        let selection_config = ShapeSelectionConfig {
            cli_shape: config.cli_shape.clone(),
            project_shape: config.project_shape.clone(),
            project_config_path: config.project_config_path.clone(),
        };

        Self::with_dirs(config.shape_dirs.clone(), selection_config)
    }

    /// Create a shape manager over explicit directories
    pub fn with_dirs(shape_dirs: Vec<ShapeDir>, selection_config: ShapeSelectionConfig) -> Self {
        Self {
            shapes: Arc::new(RwLock::new(HashMap::new())),
            shape_dirs,
            selection_config,
            _watcher: None,
            watcher_rx: None,
            generation: Arc::new(watch::channel(0).0),
            missing_defaults: Mutex::new(HashSet::new()),
            reporter: Reporter::default(),
        }
    }

    /// Load all shapes, without watching for changes
    pub async fn load(&mut self, client: Option<Client>) -> Result<()> {
        self.reporter = Reporter { client };
        Self::reload_shapes(&self.shapes, &self.shape_dirs, &self.reporter, &self.generation).await;
        Ok(())
    }

    /// Load all shapes and start watching the shape directories
    pub async fn initialize(&mut self, client: Option<Client>) -> Result<()> {
        self.load(client).await?;
        self.start_watching()?;
        Ok(())
    }

    /// Get the effective default shape based on configuration priority
    pub async fn get_effective_default_shape(&self) -> Option<LoadedShape> {
        // Priority: CLI > Project Config
        if let Some(cli_shape) = &self.selection_config.cli_shape {
            if let Some(shape) = self.get_shape(cli_shape).await {
                return Some(shape);
            }
            self.warn_missing_default(cli_shape, || {
                format!("CLI-specified shape '{}' not found", cli_shape)
            })
            .await;
        }

        if let Some(project_shape) = &self.selection_config.project_shape {
            if let Some(shape) = self.get_shape(project_shape).await {
                return Some(shape);
            }
            self.warn_missing_default(project_shape, || {
                let config_path = self
                    .selection_config
                    .project_config_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| crate::config::PROJECT_CONFIG_FILE.to_string());
                format!("Project shape '{}' from {} not found", project_shape, config_path)
            })
            .await;
        }

        None
    }

    /// Report a missing default shape the first time it is looked up
    async fn warn_missing_default(&self, name: &str, message: impl FnOnce() -> String) {
        let first_time = self.missing_defaults.lock().await.insert(name.to_string());
        if first_time {
            self.reporter.report(MessageType::WARNING, message()).await;
        }
    }

    /// Receiver notified after every shape reload
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Resolve the shape for a document: directive first, then the default
    pub async fn resolve_document_shape(&self, content: &str) -> ShapeResolution {
        match detect_shape_directive(content) {
            Some(name) => match self.get_shape(&name).await {
                Some(loaded) => ShapeResolution::Found(loaded),
                None => ShapeResolution::Unknown(name),
            },
            None => match self.get_effective_default_shape().await {
                Some(loaded) => ShapeResolution::Found(loaded),
                None => ShapeResolution::None,
            },
        }
    }

    /// Get a shape by name
    pub async fn get_shape(&self, name: &str) -> Option<LoadedShape> {
        let shapes = self.shapes.read().await;
        shapes.get(name).cloned()
    }

    /// List all available shape names, sorted
    pub async fn list_shape_names(&self) -> Vec<String> {
        let shapes = self.shapes.read().await;
        let mut names: Vec<String> = shapes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Reload every shape from scratch
    pub async fn reload(&self) {
        Self::reload_shapes(&self.shapes, &self.shape_dirs, &self.reporter, &self.generation).await;
    }

    /// Load built-in and directory shapes into a fresh map and swap it in
    async fn reload_shapes(
        shapes: &RwLock<ShapeMap>,
        shape_dirs: &[ShapeDir],
        reporter: &Reporter,
        generation: &watch::Sender<u64>,
    ) {
        let mut loaded = HashMap::new();

        for (name, content) in BUILTIN_SHAPES {
            match Shape::from_toml(content) {
                Ok(shape) => insert_by_priority(&mut loaded, shape, ShapePriority::BuiltIn, None),
                Err(e) => {
                    reporter
                        .report(
                            MessageType::ERROR,
                            format!("Failed to load built-in shape '{}': {}", name, e),
                        )
                        .await
                }
            }
        }

        for dir in shape_dirs {
            if let Err(e) = load_shapes_from_directory(dir, &mut loaded, reporter).await {
                reporter.report(MessageType::ERROR, format!("{:#}", e)).await;
            }
        }

        let count = loaded.len();
        *shapes.write().await = loaded;
        generation.send_modify(|g| *g += 1);

        reporter
            .report(MessageType::INFO, format!("Loaded {} shapes", count))
            .await;
    }

    /// Start file watching for shape directories
    fn start_watching(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watcher_rx = Some(rx);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) =
                        event.kind
                    {
                        for path in event.paths {
                            if is_shape_file(&path) {
                                let _ = tx.send(WatcherEvent::ShapeFileChanged(path));
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(WatcherEvent::WatcherError(e));
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        for dir in &self.shape_dirs {
            if dir.path.exists() {
                watcher
                    .watch(&dir.path, RecursiveMode::NonRecursive)
                    .with_context(|| format!("Failed to watch {}", dir.path.display()))?;
            }
        }

        self._watcher = Some(watcher);
        self.start_watcher_task();

        Ok(())
    }

    /// Start the background task that processes file watcher events
    fn start_watcher_task(&mut self) {
        if let Some(mut rx) = self.watcher_rx.take() {
            let shapes = self.shapes.clone();
            let shape_dirs = self.shape_dirs.clone();
            let reporter = self.reporter.clone();
            let generation = self.generation.clone();

            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        WatcherEvent::ShapeFileChanged(path) => {
                            reporter
                                .report(
                                    MessageType::INFO,
                                    format!("Shape file changed: {}", path.display()),
                                )
                                .await;

                            // Reload everything so priorities are re-applied
                            Self::reload_shapes(&shapes, &shape_dirs, &reporter, &generation).await;
                        }
                        WatcherEvent::WatcherError(e) => {
                            reporter
                                .report(
                                    MessageType::ERROR,
                                    format!("Shape file watcher error: {}", e),
                                )
                                .await;
                        }
                    }
                }
            });
        }
    }
}

/// Outcome of picking a shape for a document
#[derive(Debug, Clone)]
pub enum ShapeResolution {
    Found(LoadedShape),
    /// The document names a shape that is not loaded
    Unknown(String),
    /// No directive and no default shape
    None,
}

fn insert_by_priority(
    shapes: &mut ShapeMap,
    shape: Shape,
    priority: ShapePriority,
    source_path: Option<&Path>,
) {
    let should_load = match shapes.get(&shape.name) {
        Some(existing) => priority >= existing.priority,
        None => true,
    };

    if should_load {
        shapes.insert(
            shape.name.clone(),
            LoadedShape {
                shape,
                priority,
                source_path: source_path.map(Path::to_path_buf),
            },
        );
    }
}

/// Load shapes from a specific directory
async fn load_shapes_from_directory(
    dir: &ShapeDir,
    shapes: &mut ShapeMap,
    reporter: &Reporter,
) -> Result<()> {
    if !dir.path.exists() {
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(&dir.path)
        .await
        .with_context(|| format!("Failed to read shape directory: {}", dir.path.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_shape_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        match load_shape_file(&path).await {
            Ok(shape) => insert_by_priority(shapes, shape, dir.priority, Some(&path)),
            Err(e) => {
                reporter
                    .report(
                        MessageType::ERROR,
                        format!("Failed to load shape file {}: {:#}", path.display(), e),
                    )
                    .await
            }
        }
    }

    Ok(())
}

/// Load a single shape file
async fn load_shape_file(path: &Path) -> Result<Shape> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read shape file: {}", path.display()))?;

    Shape::from_toml(&content)
        .with_context(|| format!("Failed to parse shape TOML: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_default_is_reported_once() {
        let selection = ShapeSelectionConfig {
            cli_shape: Some("lease".to_string()),
            ..Default::default()
        };
        let mut manager = ShapeManager::with_dirs(Vec::new(), selection);
        manager.load(None).await.unwrap();

        for _ in 0..3 {
            assert!(manager.get_effective_default_shape().await.is_none());
        }
        assert_eq!(manager.missing_defaults.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_bumps_generation() {
        let mut manager = ShapeManager::with_dirs(Vec::new(), ShapeSelectionConfig::default());
        let mut generation = manager.subscribe();

        manager.load(None).await.unwrap();
        assert!(generation.has_changed().unwrap());
        assert_eq!(*generation.borrow_and_update(), 1);

        manager.reload().await;
        assert!(generation.has_changed().unwrap());
        assert_eq!(*generation.borrow_and_update(), 2);
    }
}
