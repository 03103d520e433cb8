//! Scenario loading and run configuration.

use crate::model::Scenario;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Settings shared by every scenario of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    /// Headers added to every request, overriding step headers.
    pub headers: BTreeMap<String, String>,
    /// Variables each scenario run starts with.
    pub variables: BTreeMap<String, String>,
    /// Transport timeout in seconds.
    pub timeout: Option<u64>,
}

impl RunConfig {
    /// Add a header given as `Name: value`.
    pub fn add_header(&mut self, raw: &str) -> Result<&mut Self> {
        let (name, value) = parse_header(raw)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add a variable given as `key=value`.
    pub fn add_variable(&mut self, raw: &str) -> Result<&mut Self> {
        let (key, value) = parse_variable(raw)?;
        self.variables.insert(key, value);
        Ok(self)
    }
}

/// Parse `Name: value`.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid header '{raw}', expected 'Name: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("invalid header '{raw}', empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse `key=value`.
pub fn parse_variable(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid variable '{raw}', expected 'key=value'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("invalid variable '{raw}', empty key"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Finds and loads scenario files.
#[derive(Debug)]
pub struct ScenarioLoader {
    pub scenario_paths: Vec<PathBuf>,
}

impl ScenarioLoader {
    pub fn new() -> Self {
        Self {
            scenario_paths: vec![PathBuf::from("scenarios")],
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.scenario_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load and validate a single scenario file.
    ///
    /// `.json` files are read as JSON, everything else as YAML.
    pub fn load_scenario<P: AsRef<Path>>(&self, path: P) -> Result<Scenario> {
        let path = path.as_ref();
        info!("Loading scenario from {}", path.display());

        let content = fs::read_to_string(path)
            .context(format!("Failed to read scenario file: {}", path.display()))?;

        let scenario = if is_json(path) {
            Scenario::from_json(&content)
                .context(format!("Failed to parse JSON from {}", path.display()))?
        } else {
            Scenario::from_yaml(&content)
                .context(format!("Failed to parse YAML from {}", path.display()))?
        };
        scenario
            .validate()
            .context(format!("Invalid scenario in {}", path.display()))?;

        debug!("Successfully loaded scenario: {}", scenario.name);
        Ok(scenario)
    }

    /// Load every scenario file of `dir`, in file name order.
    /// Files that fail to load are skipped with a warning.
    pub fn load_scenarios_from_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<Scenario>> {
        let dir = dir.as_ref();
        info!("Loading scenarios from directory: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)
            .context(format!("Failed to read directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_scenario_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut scenarios = Vec::new();
        for path in paths {
            match self.load_scenario(&path) {
                Ok(scenario) => scenarios.push(scenario),
                Err(err) => {
                    warn!("Failed to load scenario from {}: {:#}", path.display(), err);
                }
            }
        }

        info!("Loaded {} scenarios from {}", scenarios.len(), dir.display());
        Ok(scenarios)
    }

    /// Load scenarios from every configured directory that exists.
    pub fn load_all_scenarios(&self) -> Result<Vec<Scenario>> {
        let mut all_scenarios = Vec::new();

        for path in &self.scenario_paths {
            if path.is_dir() {
                match self.load_scenarios_from_dir(path) {
                    Ok(mut scenarios) => all_scenarios.append(&mut scenarios),
                    Err(err) => {
                        debug!("Failed to load scenarios from {}: {}", path.display(), err);
                    }
                }
            }
        }

        info!("Loaded {} scenarios in total", all_scenarios.len());
        Ok(all_scenarios)
    }
}

impl Default for ScenarioLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "json" || ext == "yaml" || ext == "yml")
}
