use crate::error::BridgeError;
use crate::protocol::PresetBank;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads the preset file, creating an empty one on first use.
pub fn read_presets(path: &Path) -> Result<PresetBank, BridgeError> {
    if !path.exists() {
        info!("creating empty presets file at {}", path.display());
        fs::write(path, "{}").map_err(|source| BridgeError::File {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(PresetBank::new());
    }

    let text = fs::read_to_string(path).map_err(|source| BridgeError::File {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(PresetBank::new());
    }
    serde_json::from_str(&text).map_err(|source| BridgeError::Presets {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces the preset file atomically (write to a sibling, then rename).
pub fn write_presets(path: &Path, presets: &PresetBank) -> Result<(), BridgeError> {
    let json = serde_json::to_string_pretty(presets).map_err(|source| BridgeError::Presets {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = tmp_path(path);
    fs::write(&tmp, json).map_err(|source| BridgeError::File {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| BridgeError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "presets.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
