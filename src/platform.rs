//! Platform identifiers used to select the correct remote artifact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// No known platform id matches the host (or the operator override).
    #[error("unsupported platform: {0}")]
    Unsupported(String),
}

/// OS + CPU architecture combination a package artifact is built for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PlatformId {
    #[serde(rename = "linux-x86-64")]
    LinuxX8664,
    #[serde(rename = "linux-aarch64")]
    LinuxAarch64,
    #[serde(rename = "darwin-x86-64")]
    DarwinX8664,
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
    #[serde(rename = "windows-x86-64")]
    WindowsX8664,
}

impl PlatformId {
    pub const ALL: [PlatformId; 5] = [
        PlatformId::LinuxX8664,
        PlatformId::LinuxAarch64,
        PlatformId::DarwinX8664,
        PlatformId::DarwinArm64,
        PlatformId::WindowsX8664,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::LinuxX8664 => "linux-x86-64",
            PlatformId::LinuxAarch64 => "linux-aarch64",
            PlatformId::DarwinX8664 => "darwin-x86-64",
            PlatformId::DarwinArm64 => "darwin-arm64",
            PlatformId::WindowsX8664 => "windows-x86-64",
        }
    }

    /// Resolve the effective platform id for this run.
    ///
    /// An operator-supplied override wins when it names a known id; this is
    /// what allows staging packages for another machine. Without an override
    /// the host OS and architecture are inspected.
    pub fn resolve(override_id: Option<&str>) -> Result<Self, PlatformError> {
        match override_id {
            Some(id) => id.parse(),
            None => Self::detect(),
        }
    }

    /// Detect the platform id of the running host.
    pub fn detect() -> Result<Self, PlatformError> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            Ok(PlatformId::LinuxX8664)
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            Ok(PlatformId::LinuxAarch64)
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            Ok(PlatformId::DarwinX8664)
        }
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Ok(PlatformId::DarwinArm64)
        }
        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        {
            Ok(PlatformId::WindowsX8664)
        }
        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64"),
        )))]
        {
            Err(PlatformError::Unsupported(format!(
                "{}-{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )))
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformId {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformId::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| PlatformError::Unsupported(s.to_string()))
    }
}
