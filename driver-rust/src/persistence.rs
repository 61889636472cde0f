use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::calibration::CalibrationSet;

/// Load the calibration store. Returns defaults if the file is missing or corrupt.
pub async fn load_calibration(path: &Path) -> CalibrationSet {
    if !path.exists() {
        info!("No {} found, using identity calibration", path.display());
        return CalibrationSet::default();
    }

    match fs::read_to_string(path).await {
        Ok(data) => match serde_json::from_str::<CalibrationSet>(&data) {
            Ok(set) => {
                info!(
                    "Loaded calibration from {} (non-identity: left={} right={} hmd={})",
                    path.display(),
                    !set.left.is_identity(),
                    !set.right.is_identity(),
                    !set.hmd.is_identity()
                );
                set
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}, using identity calibration", path.display());
                CalibrationSet::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {e}, using identity calibration", path.display());
            CalibrationSet::default()
        }
    }
}

/// Write the calibration store (pretty JSON), replacing the previous file.
pub async fn save_calibration(path: &Path, set: &CalibrationSet) -> Result<()> {
    let json = serde_json::to_string_pretty(set)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pose_types::Vec3;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let set = load_calibration(&dir.path().join("nope.json")).await;
        assert_eq!(set, CalibrationSet::default());
    }

    #[tokio::test]
    async fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_calibration(&path).await, CalibrationSet::default());
    }

    #[tokio::test]
    async fn saved_calibration_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let mut set = CalibrationSet::default();
        set.right.recenter(Vec3::new(0.25, 1.0, -0.5));
        set.hmd.axis_invert = [false, true, false];

        save_calibration(&path, &set).await.unwrap();
        assert_eq!(load_calibration(&path).await, set);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, r#"{"left":{"offset":{"x":0.0,"y":1.0,"z":0.0}}}"#).unwrap();
        let set = load_calibration(&path).await;
        assert_eq!(set.left.offset, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(set.left.scale, Vec3::ONE);
        assert!(set.right.is_identity());
    }
}
