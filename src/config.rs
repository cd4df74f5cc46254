// FILE: src/config.rs
//! Runtime configuration, from flags or the environment.

use crate::error::{CloudError, Result};
use crate::gateway::DEFAULT_CAPACITY;
use crate::spatial::SpatialConfig;
use crate::visibility::LodThresholds;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_VIEW_DISTANCE: f64 = 600.0;

#[derive(Parser, Debug, Clone)]
#[command(name = "filecloud", version, about = "Live spatial index of a directory tree")]
pub struct Config {
    /// Directory to scan and watch (defaults to the working directory)
    #[arg(long, env = "SCAN_DIR")]
    pub root: Option<PathBuf>,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Records per `/api/files` page
    #[arg(long, env = "FILECLOUD_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Index dot-files and dot-directories too
    #[arg(long, env = "FILECLOUD_INCLUDE_HIDDEN")]
    pub include_hidden: bool,

    #[arg(long, env = "FILECLOUD_LOG", default_value = "info")]
    pub log_level: String,

    /// Messages a push client may fall behind before it is dropped
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub broadcast_capacity: usize,

    #[arg(long, default_value_t = 25.0)]
    pub lod_mid: f64,

    #[arg(long, default_value_t = 60.0)]
    pub lod_far: f64,

    #[arg(long, default_value_t = DEFAULT_VIEW_DISTANCE)]
    pub view_distance: f64,

    #[arg(long, default_value_t = 7.0)]
    pub inner_radius: f64,

    #[arg(long, default_value_t = 70.0)]
    pub outer_radius: f64,

    /// Disable the per-axis noise offset
    #[arg(long)]
    pub no_noise: bool,
}

impl Default for Config {
    fn default() -> Self {
        let lod = LodThresholds::default();
        let spatial = SpatialConfig::default();
        Self {
            root: None,
            port: DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            include_hidden: false,
            log_level: "info".to_string(),
            broadcast_capacity: DEFAULT_CAPACITY,
            lod_mid: lod.mid,
            lod_far: lod.far,
            view_distance: DEFAULT_VIEW_DISTANCE,
            inner_radius: spatial.inner_radius,
            outer_radius: spatial.outer_radius,
            no_noise: !spatial.noise,
        }
    }
}

impl Config {
    /// The scan root, falling back to the working directory.
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    pub fn lod(&self) -> LodThresholds {
        LodThresholds { mid: self.lod_mid, far: self.lod_far }
    }

    pub fn spatial(&self) -> SpatialConfig {
        SpatialConfig {
            inner_radius: self.inner_radius,
            outer_radius: self.outer_radius,
            noise: !self.no_noise,
            ..SpatialConfig::default()
        }
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| CloudError::Config(format!("invalid listen address {}:{}: {}", self.host, self.port, e)))
    }

    pub fn validate(&self) -> Result<()> {
        let root = self.root_dir()?;
        if !root.is_dir() {
            return Err(CloudError::Config(format!("scan root is not a directory: {}", root.display())));
        }
        if self.page_size == 0 {
            return Err(CloudError::Config("page size must be at least 1".into()));
        }
        if !self.lod().is_valid() {
            return Err(CloudError::Config(format!(
                "LOD thresholds must satisfy 0 <= mid <= far (mid {}, far {})",
                self.lod_mid, self.lod_far
            )));
        }
        if self.view_distance.is_nan() || self.view_distance <= 0.0 {
            return Err(CloudError::Config("view distance must be positive".into()));
        }
        if !(self.inner_radius > 0.0 && self.inner_radius <= self.outer_radius) {
            return Err(CloudError::Config(format!(
                "radii must satisfy 0 < inner <= outer (inner {}, outer {})",
                self.inner_radius, self.outer_radius
            )));
        }
        self.addr()?;
        Ok(())
    }
}
