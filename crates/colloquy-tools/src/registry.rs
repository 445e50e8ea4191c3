use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::tool::{Modality, Tool, ToolDescriptor};

/// Release maturity of one registered tool version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Stable,
    Experimental,
    /// Still runs, but every resolution emits a warning record.
    Deprecated,
    Legacy,
}

impl std::str::FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stable" => Ok(ToolStatus::Stable),
            "experimental" => Ok(ToolStatus::Experimental),
            "deprecated" => Ok(ToolStatus::Deprecated),
            "legacy" => Ok(ToolStatus::Legacy),
            other => Err(format!("unknown tool status: {other}")),
        }
    }
}

struct Entry {
    tool: Arc<dyn Tool>,
    version: Version,
    status: ToolStatus,
}

pub type MigrationFn = Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>;

struct Migration {
    from: Version,
    to: Version,
    apply: MigrationFn,
}

#[derive(Default)]
struct Inner {
    /// name → versions, kept sorted ascending.
    entries: HashMap<String, Vec<Entry>>,
    /// name → pinned default version.
    defaults: HashMap<String, Version>,
    /// name → argument migrations, kept sorted ascending by `from`.
    migrations: HashMap<String, Vec<Migration>>,
}

/// Process-wide owner of all registered tools and chains.
///
/// Guarded by a read-write lock; lookups take the read side, registration
/// and discovery swaps take the write side briefly.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one version of a tool. Re-registering the same
    /// `(name, version)` replaces the entry (discovery rescans rely on this).
    pub fn register(
        &self,
        tool: Arc<dyn Tool>,
        version: &str,
        status: ToolStatus,
        make_default: bool,
    ) -> Result<()> {
        let version =
            Version::parse(version).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;
        let name = tool.name().to_string();

        let mut inner = self.inner.write().unwrap();
        let versions = inner.entries.entry(name.clone()).or_default();
        versions.retain(|e| e.version != version);
        versions.push(Entry {
            tool,
            version: version.clone(),
            status,
        });
        versions.sort_by(|a, b| a.version.cmp(&b.version));

        if make_default {
            inner.defaults.insert(name.clone(), version.clone());
        }
        debug!(tool = %name, version = %version, ?status, "tool registered");
        Ok(())
    }

    /// Resolve a tool. An unspecified version yields the pinned default,
    /// else the newest stable version, else the newest version of any
    /// status. An explicit version older than the tool's declared minimum
    /// compatible version fails.
    pub fn get(&self, name: &str, version: Option<&str>) -> Result<Arc<dyn Tool>> {
        let inner = self.inner.read().unwrap();
        let versions = inner.entries.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        // The newest entry declares how far back callers may pin.
        let minimum = versions
            .last()
            .and_then(|e| e.tool.min_compatible())
            .map(Version::parse)
            .transpose()
            .map_err(|e| ToolError::InvalidVersion(e.to_string()))?;

        let entry = match version {
            Some(v) => {
                let requested =
                    Version::parse(v).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;
                if let Some(min) = &minimum {
                    if requested < *min {
                        return Err(ToolError::IncompatibleVersion {
                            name: name.to_string(),
                            requested: requested.to_string(),
                            minimum: min.to_string(),
                        });
                    }
                }
                versions
                    .iter()
                    .find(|e| e.version == requested)
                    .ok_or_else(|| ToolError::VersionNotFound {
                        name: name.to_string(),
                        version: requested.to_string(),
                    })?
            }
            None => {
                if let Some(pinned) = inner.defaults.get(name) {
                    versions
                        .iter()
                        .find(|e| e.version == *pinned)
                        .ok_or_else(|| ToolError::VersionNotFound {
                            name: name.to_string(),
                            version: pinned.to_string(),
                        })?
                } else {
                    versions
                        .iter()
                        .rev()
                        .find(|e| e.status == ToolStatus::Stable)
                        .or_else(|| versions.last())
                        .ok_or_else(|| ToolError::NotFound {
                            name: name.to_string(),
                        })?
                }
            }
        };

        if entry.status == ToolStatus::Deprecated {
            warn!(tool = name, version = %entry.version, "deprecated tool resolved");
        }

        Ok(Arc::clone(&entry.tool))
    }

    /// Descriptors of the default resolution of every registered tool,
    /// optionally filtered by supported modality. Feeds the prompt's tool
    /// section and the tools listing endpoint.
    pub fn list(&self, modality: Option<Modality>) -> Vec<ToolDescriptor> {
        let inner = self.inner.read().unwrap();
        let mut out: Vec<ToolDescriptor> = inner
            .entries
            .iter()
            .filter_map(|(name, versions)| {
                let entry = inner
                    .defaults
                    .get(name)
                    .and_then(|pinned| versions.iter().find(|e| e.version == *pinned))
                    .or_else(|| {
                        versions
                            .iter()
                            .rev()
                            .find(|e| e.status == ToolStatus::Stable)
                    })
                    .or_else(|| versions.last())?;
                Some(ToolDescriptor {
                    name: name.clone(),
                    description: entry.tool.description().to_string(),
                    usage: entry.tool.usage().to_string(),
                    version: entry.version.to_string(),
                    status: entry.status,
                    kind: entry.tool.kind(),
                    modalities: entry.tool.modalities(),
                    triggers: entry.tool.triggers(),
                })
            })
            .filter(|d| match modality {
                Some(m) => d.modalities.contains(&m) || d.modalities.contains(&Modality::Mixed),
                None => true,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Register an argument migration step for one tool.
    pub fn register_migration(
        &self,
        name: &str,
        from: &str,
        to: &str,
        apply: MigrationFn,
    ) -> Result<()> {
        let from = Version::parse(from).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;
        let to = Version::parse(to).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;
        let mut inner = self.inner.write().unwrap();
        let steps = inner.migrations.entry(name.to_string()).or_default();
        steps.push(Migration { from, to, apply });
        steps.sort_by(|a, b| a.from.cmp(&b.from));
        Ok(())
    }

    /// Re-shape arguments recorded against `from` for use with `to` by
    /// applying every registered step inside the interval in version order.
    /// Tools with no migrations registered pass arguments through unchanged.
    pub fn migrate_args(
        &self,
        name: &str,
        from: &str,
        to: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let from = Version::parse(from).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;
        let to = Version::parse(to).map_err(|e| ToolError::InvalidVersion(e.to_string()))?;

        let inner = self.inner.read().unwrap();
        let Some(steps) = inner.migrations.get(name) else {
            return Ok(args);
        };

        let mut current = args;
        for step in steps {
            if step.from >= from && step.to <= to {
                current = (step.apply)(current);
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeTool {
        name: String,
        min: Option<String>,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "a fake tool"
        }
        fn min_compatible(&self) -> Option<&str> {
            self.min.as_deref()
        }
        async fn run(&self, _args: serde_json::Value) -> Result<String> {
            Ok("ok".to_string())
        }
    }

    fn fake(name: &str, min: Option<&str>) -> Arc<dyn Tool> {
        Arc::new(FakeTool {
            name: name.to_string(),
            min: min.map(String::from),
        })
    }

    #[test]
    fn unversioned_get_prefers_newest_stable() {
        let reg = ToolRegistry::new();
        reg.register(fake("t", None), "1.0.0", ToolStatus::Stable, false)
            .unwrap();
        reg.register(fake("t", None), "2.0.0", ToolStatus::Experimental, false)
            .unwrap();
        reg.register(fake("t", None), "1.5.0", ToolStatus::Stable, false)
            .unwrap();

        // Newest stable is 1.5.0, not the experimental 2.0.0.
        let listed = reg.list(None);
        assert_eq!(listed[0].version, "1.5.0");
        assert!(reg.get("t", None).is_ok());
    }

    #[test]
    fn pinned_default_wins() {
        let reg = ToolRegistry::new();
        reg.register(fake("t", None), "1.0.0", ToolStatus::Stable, true)
            .unwrap();
        reg.register(fake("t", None), "2.0.0", ToolStatus::Stable, false)
            .unwrap();
        assert_eq!(reg.list(None)[0].version, "1.0.0");
    }

    #[test]
    fn old_version_below_minimum_fails() {
        let reg = ToolRegistry::new();
        reg.register(fake("t", None), "1.0.0", ToolStatus::Legacy, false)
            .unwrap();
        reg.register(fake("t", Some("1.2.0")), "2.0.0", ToolStatus::Stable, false)
            .unwrap();

        assert!(matches!(
            reg.get("t", Some("1.0.0")),
            Err(ToolError::IncompatibleVersion { .. })
        ));
        assert!(reg.get("t", Some("2.0.0")).is_ok());
    }

    #[test]
    fn deprecated_resolution_succeeds() {
        let reg = ToolRegistry::new();
        reg.register(fake("t", None), "1.0.0", ToolStatus::Deprecated, false)
            .unwrap();
        assert!(reg.get("t", None).is_ok());
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let reg = ToolRegistry::new();
        assert!(matches!(
            reg.get("nope", None),
            Err(ToolError::NotFound { .. })
        ));
    }

    #[test]
    fn migrations_apply_in_order() {
        let reg = ToolRegistry::new();
        reg.register(fake("t", None), "3.0.0", ToolStatus::Stable, false)
            .unwrap();
        reg.register_migration(
            "t",
            "1.0.0",
            "2.0.0",
            Box::new(|mut v| {
                v["renamed"] = v["old"].take();
                v
            }),
        )
        .unwrap();
        reg.register_migration(
            "t",
            "2.0.0",
            "3.0.0",
            Box::new(|mut v| {
                v["wrapped"] = serde_json::json!({ "value": v["renamed"].take() });
                v
            }),
        )
        .unwrap();

        let out = reg
            .migrate_args("t", "1.0.0", "3.0.0", serde_json::json!({"old": 7}))
            .unwrap();
        assert_eq!(out["wrapped"]["value"], 7);
    }

    #[test]
    fn migrate_without_steps_is_identity() {
        let reg = ToolRegistry::new();
        let args = serde_json::json!({"x": 1});
        let out = reg
            .migrate_args("t", "1.0.0", "2.0.0", args.clone())
            .unwrap();
        assert_eq!(out, args);
    }
}
