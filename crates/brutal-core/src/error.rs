use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure of one of the two socket calls that switch a connection to brutal.
///
/// Both variants keep the errno reported by the kernel. The selection error is
/// what a host without the brutal module loaded produces, so it is kept apart
/// from the parameter error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnforceError {
    #[error("selecting the brutal congestion control failed: {errno}")]
    CongestionSelection { errno: Errno },
    #[error("applying brutal congestion params failed: {errno}")]
    CongestionParams { errno: Errno },
}

impl EnforceError {
    pub fn errno(&self) -> Errno {
        match *self {
            EnforceError::CongestionSelection { errno } | EnforceError::CongestionParams { errno } => errno,
        }
    }

    /// Short stable label, suitable for a response header or a log field.
    pub fn category(&self) -> &'static str {
        match self {
            EnforceError::CongestionSelection { .. } => "congestion-selection",
            EnforceError::CongestionParams { .. } => "congestion-params",
        }
    }
}
