//! The local compute session.
//!
//! A [`Session`] is the handle every read goes through. At most one session
//! is live per process: building a second one while the first is alive
//! fails, and the slot is released when the session is stopped or dropped.

mod reader;

pub use reader::DataFrameReader;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SessionSettings;
use crate::error::{Result, SnowsampleError};
use crate::provision::{artifact_version, Artifact};
use crate::source::{DataSource, SnowflakeSource, VariantSource};

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Ownership of the process-wide session slot.
#[derive(Debug)]
struct SessionSlot;

impl SessionSlot {
    fn acquire() -> Result<Self> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SessionSlot)
            .map_err(|_| {
                SnowsampleError::session(
                    "A session is already active in this process; stop it before creating another",
                )
            })
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

/// Resolved, immutable session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub master: String,
    pub app_name: String,
    /// Driver jars, in the order they were added.
    pub jars: Vec<PathBuf>,
    /// Supporting library paths appended after the jars.
    pub extra_class_path: Vec<String>,
    pub settings: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            master: settings.master,
            app_name: settings.app_name,
            jars: Vec::new(),
            extra_class_path: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// Accepts `local`, `local[N]` (N > 0) and `local[*]`.
fn is_local_master(master: &str) -> bool {
    if master == "local" {
        return true;
    }
    match master
        .strip_prefix("local[")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some("*") => true,
        Some(n) => n.parse::<u32>().map(|n| n > 0).unwrap_or(false),
        None => false,
    }
}

/// Builds a [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    sources: Vec<Arc<dyn DataSource>>,
    builtin_sources: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            builtin_sources: true,
            ..Default::default()
        }
    }

    /// Starts from configured settings.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        let mut builder = Self::new()
            .master(&settings.master)
            .app_name(&settings.app_name);
        builder.config.extra_class_path = settings.extra_class_path.clone();
        builder.config.settings = settings.settings.clone();
        builder
    }

    pub fn master(mut self, master: impl Into<String>) -> Self {
        self.config.master = master.into();
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    pub fn jar(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jars.push(path.into());
        self
    }

    /// Adds the jar of each provisioned artifact.
    pub fn artifacts(mut self, artifacts: &[Artifact]) -> Self {
        self.config
            .jars
            .extend(artifacts.iter().map(|a| a.path.clone()));
        self
    }

    pub fn extra_class_path(mut self, entry: impl Into<String>) -> Self {
        self.config.extra_class_path.push(entry.into());
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    /// Registers an additional data source.
    pub fn source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Skips registering the built-in `snowflake` and `variant` sources.
    pub fn without_builtin_sources(mut self) -> Self {
        self.builtin_sources = false;
        self
    }

    /// Validates the configuration and takes the process-wide session slot.
    pub fn build(self) -> Result<Session> {
        let config = self.config;

        if !is_local_master(&config.master) {
            return Err(SnowsampleError::session(format!(
                "Unsupported master '{}'; expected local, local[N] or local[*]",
                config.master
            )));
        }
        if config.app_name.trim().is_empty() {
            return Err(SnowsampleError::session("App name must not be empty"));
        }
        if let Some(missing) = config.jars.iter().find(|p| !p.is_file()) {
            return Err(SnowsampleError::session(format!(
                "Jar not found: {}",
                missing.display()
            )));
        }

        let mut all_sources: Vec<Arc<dyn DataSource>> = Vec::new();
        if self.builtin_sources {
            all_sources.push(Arc::new(SnowflakeSource::new()?));
            all_sources.push(Arc::new(VariantSource::default()));
        }
        all_sources.extend(self.sources);

        let slot = SessionSlot::acquire()?;

        let mut session = Session {
            config,
            sources: BTreeMap::new(),
            _slot: slot,
        };
        for source in all_sources {
            session.register_source(source);
        }

        info!(
            master = %session.config.master,
            app = %session.config.app_name,
            jars = session.config.jars.len(),
            "Session started"
        );
        Ok(session)
    }
}

/// A live local session.
pub struct Session {
    config: SessionConfig,
    sources: BTreeMap<String, Arc<dyn DataSource>>,
    _slot: SessionSlot,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("formats", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Returns true while a session is live in this process.
    pub fn is_active() -> bool {
        SESSION_ACTIVE.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Jars followed by the extra class-path entries.
    pub fn classpath(&self) -> Vec<String> {
        self.config
            .jars
            .iter()
            .map(|p| p.display().to_string())
            .chain(self.config.extra_class_path.iter().cloned())
            .collect()
    }

    /// Flat key/value view of the session configuration.
    pub fn settings(&self) -> BTreeMap<String, String> {
        let mut settings = self.config.settings.clone();
        settings.insert("master".to_string(), self.config.master.clone());
        settings.insert("app.name".to_string(), self.config.app_name.clone());
        settings.insert(
            "jars".to_string(),
            self.config
                .jars
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        settings.insert("driver.extraClassPath".to_string(), self.classpath().join(":"));
        settings
    }

    /// Registers a source under its name and aliases, replacing any previous
    /// source with the same name.
    pub fn register_source(&mut self, source: Arc<dyn DataSource>) {
        let mut names = vec![source.name().to_string()];
        names.extend(source.aliases());
        for name in names {
            debug!(format = %name, "Registering data source");
            self.sources.insert(name.to_ascii_lowercase(), Arc::clone(&source));
        }
    }

    /// Registered format names.
    pub fn formats(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    /// Looks up a source and checks its drivers are on the classpath.
    pub fn source(&self, format: &str) -> Result<Arc<dyn DataSource>> {
        let source = self
            .sources
            .get(&format.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                SnowsampleError::session(format!(
                    "Unknown data source format '{format}' (available: {})",
                    self.formats().join(", ")
                ))
            })?;

        let missing: Vec<String> = source
            .required_products()
            .into_iter()
            .filter(|product| !self.has_product(product))
            .collect();
        if !missing.is_empty() {
            return Err(SnowsampleError::session(format!(
                "Format '{format}' needs {} on the classpath; run provisioning first",
                missing.join(", ")
            )));
        }
        Ok(source)
    }

    fn has_product(&self, product: &str) -> bool {
        self.config.jars.iter().any(|jar| {
            jar.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| artifact_version(product, n))
                .is_some()
        })
    }

    /// Starts a read.
    pub fn read(&self) -> DataFrameReader<'_> {
        DataFrameReader::new(self)
    }

    /// Releases the session.
    pub fn stop(self) {
        info!(app = %self.config.app_name, "Session stopped");
    }
}
