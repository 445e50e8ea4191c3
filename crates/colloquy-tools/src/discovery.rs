use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::registry::{ToolRegistry, ToolStatus};
use crate::tool::{Modality, Tool};

/// Scans a directory of TOML tool definitions into the registry.
///
/// Each file's SHA-256 is tracked so unchanged files are not reloaded on a
/// rescan; the scan itself is serialized by a mutex so two scans are never
/// in flight together.
pub struct ToolDiscovery {
    dir: PathBuf,
    hashes: Mutex<HashMap<PathBuf, String>>,
    scan_guard: Mutex<()>,
}

/// What one scan did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub loaded: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Deserialize)]
struct ToolDefinition {
    name: String,
    description: String,
    #[serde(default)]
    usage: String,
    version: String,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    modalities: Vec<String>,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    min_compatible: Option<String>,
    /// Response template; `{key}` placeholders are substituted from the
    /// string-valued arguments at run time.
    response: String,
}

fn default_status() -> String {
    "stable".to_string()
}

impl ToolDiscovery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            hashes: Mutex::new(HashMap::new()),
            scan_guard: Mutex::new(()),
        }
    }

    /// Scan the definitions directory, registering new or changed files.
    /// A missing directory is an empty (not failed) scan.
    pub fn scan(&self, registry: &ToolRegistry) -> Result<ScanReport> {
        let _serialized = self.scan_guard.lock().unwrap();
        let mut report = ScanReport::default();

        if !self.dir.is_dir() {
            return Ok(report);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
            .collect();
        paths.sort();

        for path in paths {
            let raw = match std::fs::read_to_string(&path) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable tool definition");
                    report.failed += 1;
                    continue;
                }
            };

            let digest = hex::encode(Sha256::digest(raw.as_bytes()));
            {
                let hashes = self.hashes.lock().unwrap();
                if hashes.get(&path).map(|h| h == &digest).unwrap_or(false) {
                    report.unchanged += 1;
                    continue;
                }
            }

            match load_definition(&path, &raw, registry) {
                Ok(name) => {
                    info!(tool = %name, path = %path.display(), "tool definition loaded");
                    self.hashes.lock().unwrap().insert(path, digest);
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "bad tool definition");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

fn load_definition(path: &Path, raw: &str, registry: &ToolRegistry) -> Result<String> {
    let def: ToolDefinition =
        toml::from_str(raw).map_err(|e| ToolError::InvalidDefinition {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let status: ToolStatus = def.status.parse().map_err(|e: String| {
        ToolError::InvalidDefinition {
            path: path.display().to_string(),
            reason: e,
        }
    })?;

    let modalities: Vec<Modality> = def
        .modalities
        .iter()
        .map(|m| m.parse())
        .collect::<std::result::Result<_, String>>()
        .map_err(|e| ToolError::InvalidDefinition {
            path: path.display().to_string(),
            reason: e,
        })?;

    let name = def.name.clone();
    let version = def.version.clone();
    let tool = DefinitionTool {
        modalities: if modalities.is_empty() {
            vec![Modality::Text]
        } else {
            modalities
        },
        def,
    };
    registry.register(Arc::new(tool), &version, status, false)?;
    Ok(name)
}

/// A tool backed by a declarative definition file: running it renders the
/// response template with the string-valued arguments.
struct DefinitionTool {
    def: ToolDefinition,
    modalities: Vec<Modality>,
}

#[async_trait]
impl Tool for DefinitionTool {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn usage(&self) -> &str {
        &self.def.usage
    }

    fn modalities(&self) -> Vec<Modality> {
        self.modalities.clone()
    }

    fn triggers(&self) -> Vec<String> {
        self.def.triggers.clone()
    }

    fn min_compatible(&self) -> Option<&str> {
        self.def.min_compatible.as_deref()
    }

    async fn run(&self, args: serde_json::Value) -> Result<String> {
        let mut out = self.def.response.clone();
        if let serde_json::Value::Object(map) = &args {
            for (key, value) in map {
                let needle = format!("{{{key}}}");
                let replacement = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&needle, &replacement);
            }
        }
        Ok(out)
    }
}
