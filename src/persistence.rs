use crate::metadata::ToolMetadata;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;

/// On-disk form of the registry's configuration (C8). Local entries are
/// informational only: they describe what was registered at export time but
/// are never re-registered from disk, since local tools come from
/// in-process discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub local_tools: Vec<ToolMetadata>,
    #[serde(default)]
    pub external_tools: Vec<ToolMetadata>,
    #[serde(default)]
    pub remote_tools: Vec<ToolMetadata>,
}

/// Writes `path` atomically: temp file in the same directory, restrictive
/// permissions applied before the content is written (so there's no window
/// where the file is readable with the default umask), then renamed into
/// place. A separate `.lock` file guards concurrent writers, since `rename`
/// invalidates an flock held on the original inode.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let lock_path = path.with_extension("json.lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire exclusive lock on config lock file")?;

    let content = serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;

    let parent = path.parent().context("config path has no parent")?;
    let mut retries_left = 2;
    loop {
        let result = write_atomic(parent, path, &content);
        match result {
            Ok(()) => break,
            Err(e) if retries_left > 0 => {
                retries_left -= 1;
                tracing::warn!("transient error writing registry config, retrying: {e}");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn write_atomic(parent: &Path, dest: &Path, content: &str) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .context("failed to set temp file permissions")?;
    }

    use std::io::Write;
    tmp.write_all(content.as_bytes())
        .context("failed to write temp file contents")?;
    tmp.persist(dest)
        .map_err(|e| anyhow::anyhow!("failed to persist temp file: {e}"))?;
    Ok(())
}

/// Directory holding one config document per external tool, read back on
/// reimport (spec §4.8: external entries are re-registered from "an
/// accompanying per-tool config document", not from the metadata snapshot
/// alone, since metadata doesn't carry the action recipe).
pub fn external_config_dir(snapshot_path: &Path) -> Option<std::path::PathBuf> {
    snapshot_path.parent().map(|p| p.join("external"))
}

pub fn save_external_config(
    snapshot_path: &Path,
    name: &str,
    config: &crate::adapter::external::ExternalConfig,
) -> Result<()> {
    let Some(dir) = external_config_dir(snapshot_path) else {
        return Ok(());
    };
    fs::create_dir_all(&dir).with_context(|| format!("failed to create directory {}", dir.display()))?;
    let path = dir.join(format!("{name}.json"));
    let content = serde_json::to_string_pretty(config).context("failed to serialize external config")?;
    write_atomic(&dir, &path, &content)
}

pub fn load_external_config(
    snapshot_path: &Path,
    name: &str,
) -> Result<crate::adapter::external::ExternalConfig> {
    let dir = external_config_dir(snapshot_path)
        .context("snapshot path has no parent directory for external configs")?;
    let path = dir.join(format!("{name}.json"));
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read external config at {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse external config for {name}"))
}

/// Reads a previously exported snapshot, if present. A missing file is not
/// an error — the registry simply starts empty.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open config at {}", path.display()))?;
    file.lock_shared()
        .context("failed to acquire shared lock on config file")?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    let snapshot: Snapshot =
        serde_json::from_str(&content).with_context(|| "failed to parse registry config JSON")?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ToolOrigin;
    use std::collections::BTreeSet;

    #[test]
    fn export_then_import_round_trips_external_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry_config.json");

        let snapshot = Snapshot {
            local_tools: vec![ToolMetadata::new(
                "echo",
                "1.0.0",
                ToolOrigin::Local,
                "echo",
                BTreeSet::new(),
                BTreeSet::new(),
                None,
                None,
                0,
            )],
            external_tools: vec![ToolMetadata::new(
                "stub",
                "1.0.0",
                ToolOrigin::External,
                "stub",
                BTreeSet::new(),
                BTreeSet::new(),
                Some("https://example.com".into()),
                Some("secret".into()),
                0,
            )],
            remote_tools: vec![],
        };

        save_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap().unwrap();

        assert_eq!(loaded.external_tools.len(), 1);
        assert_eq!(loaded.external_tools[0].name, "stub");
        // auth_reference is elided on export — round-tripping through disk
        // loses it, by design (spec invariant 4).
        assert!(loaded.external_tools[0].auth_reference.is_none());
    }

    #[test]
    fn missing_file_yields_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(load_snapshot(&path).unwrap().is_none());
    }
}
