// config.rs — Harness configuration.
//
// Values come from three layers, highest wins:
//   command-line flags  >  TOML file (--config)  >  built-in defaults
//
// The defaults reproduce the classic benchmark exactly: example.png in the
// working directory, a 91-tap kernel with sigma derived from the size, and
// the two JPEG outputs next to it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::accel::AcceleratorKind;
use crate::convolution::{BorderMode, GaussianParams, KernelError};
use crate::image::ChannelLayout;

/// Errors from loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{}'", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file '{}'", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error("jpeg quality must be in 1..=100, got {0}")]
    JpegQuality(u8),
    #[error("at least one timed sample is required")]
    ZeroSamples,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub input_path: PathBuf,
    pub cpu_output_path: PathBuf,
    pub accelerator_output_path: PathBuf,
    /// Taps per side-to-side window; even values are bumped to the next odd.
    pub kernel_size: usize,
    /// Standard deviation in pixels; 0 derives it from `kernel_size`.
    #[serde(alias = "variance")]
    pub sigma: f32,
    pub border: BorderMode,
    pub accelerator: AcceleratorKind,
    /// Load the input as a single luma channel instead of RGB.
    pub grayscale: bool,
    pub jpeg_quality: u8,
    /// Timed repetitions per path after one untimed warm-up.
    pub samples: usize,
    /// Wait for Enter before exiting.
    pub interactive: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            input_path: PathBuf::from("example.png"),
            cpu_output_path: PathBuf::from("cvMatResult.jpg"),
            accelerator_output_path: PathBuf::from("cvUMatResult.jpg"),
            kernel_size: 91,
            sigma: 0.0,
            border: BorderMode::Reflect101,
            accelerator: AcceleratorKind::Auto,
            grayscale: false,
            jpeg_quality: 95,
            samples: 1,
            interactive: false,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the numeric fields and resolve the blur parameters.
    pub fn validate(&self) -> Result<GaussianParams, ConfigError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        if self.samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        Ok(GaussianParams::new(self.kernel_size, self.sigma, self.border)?)
    }

    pub fn layout(&self) -> ChannelLayout {
        if self.grayscale { ChannelLayout::Gray } else { ChannelLayout::Rgb }
    }
}
