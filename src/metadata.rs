use crate::errors::RegistryError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Closed set of three values; immutable for the lifetime of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOrigin {
    Local,
    External,
    Remote,
}

impl ToolOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolOrigin::Local => "local",
            ToolOrigin::External => "external",
            ToolOrigin::Remote => "remote",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, RegistryError> {
        match s {
            "local" => Ok(ToolOrigin::Local),
            "external" => Ok(ToolOrigin::External),
            "remote" => Ok(ToolOrigin::Remote),
            other => Err(RegistryError::validation(format!(
                "unknown tool origin: {other}"
            ))),
        }
    }
}

/// A parsed `major.minor.patch` version, ordered numerically rather than
/// lexicographically so `versions_of` sorts ascending the way semver expects
/// (`1.9.0 < 1.10.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ToolVersion {
    pub fn parse(s: &str) -> std::result::Result<Self, RegistryError> {
        let mut parts = s.splitn(3, '.');
        let mut next = |label: &str| -> std::result::Result<u64, RegistryError> {
            parts
                .next()
                .ok_or_else(|| RegistryError::validation(format!("invalid version: {s}")))?
                .parse::<u64>()
                .map_err(|_| {
                    RegistryError::validation(format!("invalid {label} in version: {s}"))
                })
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Deterministic `tool_id` given `(origin, name, version)`.
pub fn tool_id(origin: ToolOrigin, name: &str, version: &str) -> String {
    format!("{}.{name}.{version}", origin.as_str())
}

/// Descriptive record attached to every registered tool. Value type only —
/// no behaviour beyond (de)serialization. `auth_reference` is elided on
/// export (spec invariant 4); it is never the credential itself, only an
/// opaque handle a credential provider can resolve later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub tool_id: String,
    pub name: String,
    pub version: String,
    pub origin: ToolOrigin,
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_access_level")]
    pub access_level: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(skip_serializing, default)]
    pub auth_reference: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_access_level() -> String {
    "standard".to_string()
}

fn default_owner() -> String {
    "system".to_string()
}

impl ToolMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        origin: ToolOrigin,
        description: impl Into<String>,
        capabilities: BTreeSet<String>,
        tags: BTreeSet<String>,
        endpoint: Option<String>,
        auth_reference: Option<String>,
        now: i64,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let id = tool_id(origin, &name, &version);
        Self {
            tool_id: id,
            name,
            version,
            origin,
            description: description.into(),
            category: default_category(),
            access_level: default_access_level(),
            owner: default_owner(),
            capabilities,
            tags,
            endpoint,
            auth_reference,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: i64) {
        self.updated_at = now;
    }

    pub fn parsed_version(&self) -> std::result::Result<ToolVersion, RegistryError> {
        ToolVersion::parse(&self.version)
    }
}

/// Ascending semver order for `versions_of`; ties broken by `created_at` so
/// the ordering is a total order even for malformed duplicate versions.
pub fn compare_versions(a: &ToolMetadata, b: &ToolMetadata) -> Ordering {
    match (a.parsed_version(), b.parsed_version()) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then(a.created_at.cmp(&b.created_at)),
        _ => a.version.cmp(&b.version).then(a.created_at.cmp(&b.created_at)),
    }
}
