//! Machine registry
//!
//! Remembers the machines skiff deploys to and which one is the default.
//! Stored as TOML in the config directory.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    22
}

/// A machine reachable over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub address: String,
    pub user: String,
    pub key_path: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    /// When the machine was registered
    pub added_at: Option<DateTime<Utc>>,
}

impl Machine {
    /// `user@address`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// Persisted set of machines plus the default selection.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Machine used when `--machine` is not given
    pub default_machine: Option<String>,

    #[serde(default)]
    pub machines: Vec<Machine>,

    #[serde(skip)]
    path: PathBuf,
}

impl Registry {
    /// Load the registry at `path`, or an empty one if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Registry {} does not exist, starting empty", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry: {}", path.display()))?;
        let mut registry: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse registry: {}", path.display()))?;
        registry.path = path.to_path_buf();

        log::debug!(
            "Loaded {} machine(s) from {}",
            registry.machines.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Save the registry back to where it was loaded from
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let content =
            toml::to_string_pretty(self).context("Failed to serialize registry to TOML")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write registry: {}", self.path.display()))?;

        log::debug!("Saved registry to {}", self.path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Machine> {
        self.machines.iter().find(|machine| machine.name == name)
    }

    /// Add a machine; names must be unique.
    pub fn add(&mut self, machine: Machine) -> Result<()> {
        if self.get(&machine.name).is_some() {
            bail!("Machine '{}' is already configured", machine.name);
        }
        self.machines.push(machine);
        Ok(())
    }

    /// Remove a machine, clearing the default if it pointed there.
    pub fn remove(&mut self, name: &str) -> Result<Machine> {
        let index = self
            .machines
            .iter()
            .position(|machine| machine.name == name)
            .with_context(|| format!("No machine named '{name}'"))?;
        if self.default_machine.as_deref() == Some(name) {
            self.default_machine = None;
        }
        Ok(self.machines.remove(index))
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_none() {
            bail!("No machine named '{name}'");
        }
        self.default_machine = Some(name.to_string());
        Ok(())
    }

    /// The machine named `name`, or the default one.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Machine> {
        let name = match name.or(self.default_machine.as_deref()) {
            Some(name) => name,
            None if self.machines.is_empty() => {
                bail!("No machines configured. Add one with `skiff machine add`")
            }
            None => bail!("No default machine. Pick one with `skiff machine use` or pass --machine"),
        };
        self.get(name)
            .with_context(|| format!("No machine named '{name}'"))
    }
}
