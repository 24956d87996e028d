use crate::encode::EncodeJob;
use crate::error::BridgeError;
use crate::osc::OscSender;
use crate::presets;
use crate::protocol::{OscTarget, ParamValue, PresetBank};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::{Component, Path, PathBuf};

/// The path panels ask for when naming capture files. It always resolves to
/// the configured exports directory so recorders and the encoder agree.
pub const EXPORTS_QUERY: &str = "./exports";

/// Side effects the main loop performs. Kept behind a trait so the loop can
/// be driven without sockets, files or ffmpeg.
pub trait BridgeHost {
    fn send_osc(
        &self,
        target: OscTarget,
        address: &str,
        values: &[ParamValue],
    ) -> Result<(), BridgeError>;
    fn read_presets(&self) -> Result<PresetBank, BridgeError>;
    fn write_presets(&self, presets: &PresetBank) -> Result<(), BridgeError>;
    fn resolve_path(&self, relative_path: &str) -> PathBuf;
    fn start_encode(&self, timestamp: i64) -> Result<(), BridgeError>;
}

pub struct SystemHost {
    osc: OscSender,
    base_dir: PathBuf,
    presets_path: PathBuf,
    exports_dir: PathBuf,
    ffmpeg: PathBuf,
}

impl SystemHost {
    /// Relative `presets_path` and `exports_dir` are taken from `base_dir`.
    pub fn new(
        osc: OscSender,
        base_dir: PathBuf,
        presets_path: &Path,
        exports_dir: &Path,
        ffmpeg: PathBuf,
    ) -> Self {
        Self {
            presets_path: resolve_under(&base_dir, presets_path),
            exports_dir: resolve_under(&base_dir, exports_dir),
            osc,
            base_dir,
            ffmpeg,
        }
    }

    pub fn presets_path(&self) -> &Path {
        &self.presets_path
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }
}

impl BridgeHost for SystemHost {
    fn send_osc(
        &self,
        target: OscTarget,
        address: &str,
        values: &[ParamValue],
    ) -> Result<(), BridgeError> {
        self.osc.send(target, address, values)
    }

    fn read_presets(&self) -> Result<PresetBank, BridgeError> {
        presets::read_presets(&self.presets_path)
    }

    fn write_presets(&self, bank: &PresetBank) -> Result<(), BridgeError> {
        presets::write_presets(&self.presets_path, bank)
    }

    fn resolve_path(&self, relative_path: &str) -> PathBuf {
        let resolved = resolve_under(&self.base_dir, Path::new(relative_path));
        if resolved == resolve_under(&self.base_dir, Path::new(EXPORTS_QUERY)) {
            return self.exports_dir.clone();
        }
        resolved
    }

    fn start_encode(&self, timestamp: i64) -> Result<(), BridgeError> {
        EncodeJob {
            dir: self.exports_dir.clone(),
            timestamp,
            ffmpeg: self.ffmpeg.clone(),
        }
        .spawn()
        .map(|_| ())
    }
}

/// Joins `path` onto `base` and folds `.` and `..` lexically.
pub fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Best guess at the address other machines on the LAN can reach us on.
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn lan_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("192.0.2.1:9")?;
            s.local_addr()
        })
        .map(|a| a.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_against_base() {
        let base = Path::new("/srv/show");
        assert_eq!(
            resolve_under(base, Path::new("./exports")),
            PathBuf::from("/srv/show/exports")
        );
        assert_eq!(
            resolve_under(base, Path::new("../exports")),
            PathBuf::from("/srv/exports")
        );
        assert_eq!(
            resolve_under(base, Path::new("/tmp/x")),
            PathBuf::from("/tmp/x")
        );
    }

    #[test]
    fn system_host_keeps_files_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let sender = OscSender::new(
            "127.0.0.1:9".parse().unwrap(),
            "127.0.0.1:9".parse().unwrap(),
        )
        .unwrap();
        let host = SystemHost::new(
            sender,
            dir.path().to_path_buf(),
            Path::new("presets.json"),
            Path::new("./exports"),
            PathBuf::from("ffmpeg"),
        );
        assert_eq!(host.presets_path(), dir.path().join("presets.json"));
        assert_eq!(host.exports_dir(), dir.path().join("exports"));
        assert!(host.read_presets().unwrap().is_empty());
        assert!(host.presets_path().exists());
    }

    #[test]
    fn exports_query_follows_configured_exports_dir() {
        let dir = tempfile::tempdir().unwrap();
        let caps = tempfile::tempdir().unwrap();
        let sender = OscSender::new(
            "127.0.0.1:9".parse().unwrap(),
            "127.0.0.1:9".parse().unwrap(),
        )
        .unwrap();
        let host = SystemHost::new(
            sender,
            dir.path().to_path_buf(),
            Path::new("presets.json"),
            caps.path(),
            PathBuf::from("ffmpeg"),
        );
        assert_eq!(host.exports_dir(), caps.path());
        assert_eq!(host.resolve_path(EXPORTS_QUERY), caps.path());
        assert_eq!(host.resolve_path("exports"), caps.path());
        assert_eq!(host.resolve_path("./media"), dir.path().join("media"));
    }
}
