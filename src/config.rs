//! Server Configuration
//!
//! Block size and sample rate are process-wide for a graph and never change
//! once the server is built.

use crate::block::DEFAULT_BLOCK_SIZE;
use serde::{Deserialize, Serialize};

/// Configuration for a [`Server`](crate::server::Server)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Samples per block (per tick)
    pub block_size: usize,
    /// Sample rate in Hz
    pub sample_rate: f64,
}

impl ServerConfig {
    pub fn new(sample_rate: f64, block_size: usize) -> Self {
        Self {
            block_size,
            sample_rate,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Duration of one block in seconds
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sample_rate: 44100.0,
        }
    }
}

/// Rejected server configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidBlockSize(usize),
    InvalidSampleRate(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidBlockSize(size) => write!(f, "Invalid block size: {}", size),
            ConfigError::InvalidSampleRate(rate) => write!(f, "Invalid sample rate: {}", rate),
        }
    }
}

impl std::error::Error for ConfigError {}
