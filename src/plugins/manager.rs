//! Plugin manager - handles plugin lifecycle and execution units

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::errors::{DependencyError, RuntimeError};
use crate::domain::entities::Event;
use crate::domain::traits::Bot;
use crate::plugins::context::{
    CommandCatalog, LoopbackSender, PluginContext, PluginDirectory, PluginInfo, PluginRegistry,
    Privileges,
};
use crate::plugins::process::ProcessUnit;
use crate::plugins::resolver;
use crate::plugins::trait_def::{ConcurrencyMode, PluginDescriptor};
use crate::plugins::worker::Worker;

/// Settings shared by every unit the manager starts
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub worker_capacity: usize,
    /// Program hosting process units; `None` uses the current executable
    pub process_host: Option<PathBuf>,
    pub disabled: Vec<String>,
    pub privileges: Arc<Privileges>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            worker_capacity: 32,
            process_host: None,
            disabled: Vec::new(),
            privileges: Arc::new(Privileges::default()),
        }
    }
}

/// Manages all plugins for the bot
pub struct PluginManager {
    descriptors: Vec<PluginDescriptor>,
    workers: HashMap<String, Worker>,
    /// Names of running workers in start order
    started: Vec<String>,
    settings: ManagerSettings,
    bot: Arc<dyn Bot>,
    loopback: LoopbackSender,
    catalog: CommandCatalog,
    directory: PluginDirectory,
    registry: PluginRegistry,
}

impl PluginManager {
    pub fn new(settings: ManagerSettings, bot: Arc<dyn Bot>, loopback: LoopbackSender) -> Self {
        Self {
            descriptors: Vec::new(),
            workers: HashMap::new(),
            started: Vec::new(),
            settings,
            bot,
            loopback,
            catalog: CommandCatalog::default(),
            directory: PluginDirectory::default(),
            registry: PluginRegistry::default(),
        }
    }

    /// Register a plugin descriptor
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), DependencyError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(DependencyError::Duplicate(descriptor.name));
        }
        info!("Registering plugin: {} ({})", descriptor.name, descriptor.mode);
        write_lock(&self.registry).insert(descriptor.name.clone());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Names of running plugins in start order
    pub fn running(&self) -> &[String] {
        &self.started
    }

    /// Descriptors to start: everything not disabled, minus plugins that
    /// depend on a disabled one
    fn enabled(&self) -> Vec<PluginDescriptor> {
        let mut skipped: HashSet<&str> = self
            .descriptors
            .iter()
            .map(|d| d.name.as_str())
            .filter(|n| self.settings.disabled.iter().any(|d| d == n))
            .collect();

        loop {
            let dependent = self.descriptors.iter().find(|d| {
                !skipped.contains(d.name.as_str())
                    && d.dependencies.iter().any(|dep| skipped.contains(dep.as_str()))
            });
            let Some(descriptor) = dependent else {
                break;
            };
            warn!(
                "Not starting {}: it depends on a disabled plugin ({})",
                descriptor.name,
                descriptor.dependencies.join(", ")
            );
            skipped.insert(descriptor.name.as_str());
        }

        self.descriptors
            .iter()
            .filter(|d| !skipped.contains(d.name.as_str()))
            .cloned()
            .collect()
    }

    /// Start every enabled plugin in dependency order
    pub async fn start_all(&mut self) -> Result<(), RuntimeError> {
        let ordered = resolver::order(&self.enabled())?;
        for descriptor in ordered {
            self.start(&descriptor).await?;
        }
        Ok(())
    }

    /// Load a registered plugin by name
    pub async fn load(&mut self, name: &str) -> Result<(), RuntimeError> {
        if self.is_running(name) {
            info!("Plugin {} is already running", name);
            return Ok(());
        }
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        for dep in &descriptor.dependencies {
            if !self.is_running(dep) {
                warn!("Loading {} while its dependency {} is not running", name, dep);
            }
        }
        self.start(&descriptor).await
    }

    async fn start(&mut self, descriptor: &PluginDescriptor) -> Result<(), RuntimeError> {
        let name = descriptor.name.clone();
        let ctx = PluginContext::new(
            name.clone(),
            descriptor.event_kinds.clone(),
            self.bot.bot_info(),
            self.loopback.clone(),
        )
        .with_privileges(Arc::clone(&self.settings.privileges))
        .with_catalog(Arc::clone(&self.catalog))
        .with_directory(Arc::clone(&self.directory))
        .with_registry(Arc::clone(&self.registry));

        let plugin = descriptor
            .build(ctx.clone())
            .map_err(|source| RuntimeError::Plugin {
                name: name.clone(),
                source,
            })?;

        if let Some(meta) = plugin.metadata() {
            write_lock(&self.catalog).insert(meta.name.clone(), meta);
        }

        let worker = match descriptor.mode {
            ConcurrencyMode::Inline => Worker::inline(plugin),
            ConcurrencyMode::Thread => Worker::thread(
                plugin,
                Arc::clone(&self.bot),
                self.settings.worker_capacity,
            )?,
            ConcurrencyMode::Process => {
                let program = match &self.settings.process_host {
                    Some(path) => path.clone(),
                    None => std::env::current_exe().map_err(|e| RuntimeError::Spawn {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?,
                };
                let unit = ProcessUnit::spawn(
                    &program,
                    ctx.seed(),
                    self.settings.worker_capacity,
                    Arc::clone(&self.bot),
                    self.loopback.clone(),
                )?;
                Worker::process(plugin, unit)
            }
        };

        write_lock(&self.directory).insert(name.clone(), descriptor.info());
        self.workers.insert(name.clone(), worker);
        self.started.push(name.clone());
        info!("Started plugin {} ({})", name, descriptor.mode);
        Ok(())
    }

    /// Stop a running plugin and forget its metadata
    pub async fn unload(&mut self, name: &str) -> Result<(), RuntimeError> {
        let worker = self
            .workers
            .remove(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        self.started.retain(|n| n != name);
        write_lock(&self.catalog).remove(name);
        write_lock(&self.directory).remove(name);
        worker.stop().await;
        info!("Unloaded plugin {}", name);
        Ok(())
    }

    /// Stop and start one plugin again
    pub async fn reload(&mut self, name: &str) -> Result<(), RuntimeError> {
        if self.is_running(name) {
            self.unload(name).await?;
        }
        self.load(name).await
    }

    /// Restart every plugin in dependency order
    pub async fn reload_all(&mut self) -> Result<(), RuntimeError> {
        self.stop_all().await;
        self.start_all().await
    }

    /// Stop every running plugin, dependents first
    pub async fn stop_all(&mut self) {
        while let Some(name) = self.started.pop() {
            if let Err(e) = self.unload(&name).await {
                error!("Failed to stop {}: {}", name, e);
            }
        }
    }

    /// Running workers whose predicate accepts `event`, in start order
    pub fn responsible(&self, event: &Event) -> Vec<&Worker> {
        self.started
            .iter()
            .filter_map(|name| self.workers.get(name))
            .filter(|w| w.is_responsible(event))
            .collect()
    }

    /// Deliver `event` to the running plugin waiting for it, if any
    pub fn answer(&self, event: &Event) -> bool {
        self.started
            .iter()
            .filter_map(|name| self.workers.get(name))
            .any(|w| w.answer(event))
    }

    /// List all running plugins
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.started
            .iter()
            .filter_map(|name| self.descriptors.iter().find(|d| &d.name == name))
            .map(PluginDescriptor::info)
            .collect()
    }

    pub fn bot(&self) -> &Arc<dyn Bot> {
        &self.bot
    }
}

fn write_lock<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
