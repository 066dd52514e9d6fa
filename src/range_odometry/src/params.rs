//! Odometry parameters
//!
//! One flat JSON record carries the rasterizer, ICP and solver settings under
//! their external key names (`data_width`, `icp-max-angle`, `max iterations`,
//! ...) next to the driver's own options.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use range_icp::{IcpConfig, RasterizerConfig, SolverConfig};
use serde::{Deserialize, Serialize};

/// All odometry parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryParams {
    #[serde(flatten)]
    pub rasterizer: RasterizerConfig,

    #[serde(flatten)]
    pub icp: IcpConfig,

    #[serde(flatten)]
    pub solver: SolverConfig,

    /// Coarse-to-fine levels; 1 registers on the full image only
    #[serde(default = "default_pyramid_levels")]
    pub pyramid_levels: u32,

    /// Scale applied to `JᵀJ` when used as an edge information matrix
    #[serde(default = "default_information_scale")]
    pub information_scale: f64,
}

fn default_pyramid_levels() -> u32 {
    3
}

fn default_information_scale() -> f64 {
    1.0
}

impl Default for OdometryParams {
    fn default() -> Self {
        Self {
            rasterizer: RasterizerConfig::default(),
            icp: IcpConfig::default(),
            solver: SolverConfig::default(),
            pyramid_levels: default_pyramid_levels(),
            information_scale: default_information_scale(),
        }
    }
}

impl OdometryParams {
    /// Parse and validate a JSON parameter record
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(json).context("failed to parse odometry parameters")?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read parameters from {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("invalid parameters in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.rasterizer
            .validate()
            .context("invalid rasterizer parameters")?;
        self.icp.validate().context("invalid ICP parameters")?;
        self.solver.validate().context("invalid solver parameters")?;
        ensure!(
            (1..=16).contains(&self.pyramid_levels),
            "pyramid_levels must be in 1..=16, got {}",
            self.pyramid_levels
        );
        ensure!(
            self.information_scale.is_finite() && self.information_scale > 0.0,
            "information_scale must be positive, got {}",
            self.information_scale
        );
        Ok(())
    }
}
