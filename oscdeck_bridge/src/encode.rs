use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Final file name for a capture: the UTC time of its millisecond timestamp.
pub fn export_name(timestamp_ms: i64) -> Result<String, BridgeError> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| BridgeError::Encode(format!("timestamp out of range: {timestamp_ms}")))?;
    Ok(format!("{}.mov", at.format("%Y-%m-%d-%H-%M-%S")))
}

/// Muxes a captured video/audio pair into one file.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub dir: PathBuf,
    pub timestamp: i64,
    pub ffmpeg: PathBuf,
}

impl EncodeJob {
    pub fn video(&self) -> PathBuf {
        self.dir.join(format!("{}.mov", self.timestamp))
    }

    pub fn audio(&self) -> PathBuf {
        self.dir.join(format!("{}.wav", self.timestamp))
    }

    fn intermediate(&self) -> PathBuf {
        self.dir.join(format!("{}-exp.mov", self.timestamp))
    }

    pub fn run(&self) -> Result<PathBuf, BridgeError> {
        let video = self.video();
        let audio = self.audio();
        for input in [&video, &audio] {
            if !input.is_file() {
                return Err(BridgeError::Encode(format!(
                    "missing capture input {}",
                    input.display()
                )));
            }
        }
        let target = self.dir.join(export_name(self.timestamp)?);
        let muxed = self.intermediate();

        let status = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(&video)
            .arg("-i")
            .arg(&audio)
            .args(["-c:v", "copy", "-c:a", "copy", "-map", "0:v:0", "-map", "1:a:0"])
            .arg(&muxed)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| BridgeError::Encode(format!("failed to start {}: {e}", self.ffmpeg.display())))?;
        if !status.success() {
            return Err(BridgeError::Encode(format!("ffmpeg exited with {status}")));
        }

        remove(&video)?;
        remove(&audio)?;
        fs::rename(&muxed, &target).map_err(|source| BridgeError::File {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }

    /// Runs the job off the main loop; the outcome is only logged.
    pub fn spawn(self) -> Result<JoinHandle<()>, BridgeError> {
        let handle = thread::Builder::new()
            .name(format!("oscdeck-encode-{}", self.timestamp))
            .spawn(move || match self.run() {
                Ok(path) => info!("encoded capture {} -> {}", self.timestamp, path.display()),
                Err(e) => error!("encoding capture {} failed: {e}", self.timestamp),
            })?;
        Ok(handle)
    }
}

fn remove(path: &Path) -> Result<(), BridgeError> {
    fs::remove_file(path).map_err(|source| BridgeError::File {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_names_use_utc_seconds() {
        assert_eq!(export_name(0).unwrap(), "1970-01-01-00-00-00.mov");
        assert_eq!(
            export_name(1_700_000_000_123).unwrap(),
            "2023-11-14-22-13-20.mov"
        );
        assert!(export_name(i64::MAX).is_err());
    }

    #[test]
    fn missing_inputs_fail_before_running_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("42.mov"), b"v").unwrap();
        let job = EncodeJob {
            dir: dir.path().to_path_buf(),
            timestamp: 42,
            ffmpeg: PathBuf::from("ffmpeg-that-does-not-exist"),
        };
        let err = job.run().unwrap_err();
        assert!(err.to_string().contains("42.wav"), "{err}");
        assert!(job.video().exists());
    }

    #[test]
    fn unavailable_encoder_leaves_sources_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("7.mov"), b"v").unwrap();
        fs::write(dir.path().join("7.wav"), b"a").unwrap();
        let job = EncodeJob {
            dir: dir.path().to_path_buf(),
            timestamp: 7,
            ffmpeg: PathBuf::from("ffmpeg-that-does-not-exist"),
        };
        assert!(job.run().is_err());
        assert!(job.video().exists() && job.audio().exists());
    }
}
