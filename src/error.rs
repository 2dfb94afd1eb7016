// error.rs — Harness-level error kinds and their process exit codes.

use std::path::PathBuf;

use crate::accel::AccelError;
use crate::config::ConfigError;

/// Everything that can abort a benchmark run.
///
/// Each variant maps to a distinct exit status so scripts can tell a bad
/// input from a broken accelerator.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The input file is missing, unreadable or not a decodable image.
    #[error("cannot load image '{}'", path.display())]
    LoadFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Acquiring the accelerator or moving data between host and
    /// accelerator memory failed.
    #[error("accelerator transfer failed")]
    TransferFailure(#[source] AccelError),

    /// The accelerator rejected or failed the blur dispatch.
    #[error("accelerator blur failed")]
    BlurFailure(#[source] AccelError),

    /// An output file could not be created or encoded.
    #[error("cannot write image '{}'", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// Writing the console report failed (closed stdout).
    #[error("cannot write report")]
    Report(#[from] std::io::Error),
}

impl HarnessError {
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::LoadFailure { .. } => 2,
            HarnessError::TransferFailure(_) => 3,
            HarnessError::BlurFailure(_) => 4,
            HarnessError::WriteFailure { .. } => 5,
            HarnessError::Config(_) => 64,
            HarnessError::Report(_) => 1,
        }
    }
}
