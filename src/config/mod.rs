//! Runtime configuration for the gateway.
//!
//! Values come from CLI flags or `DRONEGATE_*` environment variables (see
//! `main.rs`); anything unset falls back to the defaults in
//! [`consts`](crate::consts).

use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::consts::{
    DEFAULT_BIND, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_INPUT_BYTES, DEFAULT_MAX_REQUEST_BYTES,
    default_solver_path, default_solver_timeout,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Solver executable. Fixed at startup, never taken from a request.
    pub solver_path: PathBuf,
    /// Largest problem body accepted, in bytes.
    pub max_input_bytes: usize,
    /// Transport cap on buffered request bodies.
    pub max_request_bytes: usize,
    pub solver_timeout: Duration,
    /// Solver processes allowed at once.
    pub max_concurrent: usize,
    pub bind: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            solver_path: default_solver_path(),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            solver_timeout: default_solver_timeout(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            bind: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8000))),
        }
    }
}

impl GatewayConfig {
    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            bail!("max concurrent solver runs must be at least 1");
        }
        if self.solver_timeout.is_zero() {
            bail!("solver timeout must be greater than zero");
        }
        if self.max_input_bytes == 0 {
            bail!("max input size must be greater than zero");
        }
        if self.max_request_bytes < self.max_input_bytes {
            bail!(
                "max request size ({} bytes) is smaller than max input size ({} bytes)",
                self.max_request_bytes,
                self.max_input_bytes
            );
        }
        if self.solver_path.as_os_str().is_empty() {
            bail!("solver path must not be empty");
        }
        Ok(())
    }

    /// Whether the configured solver exists right now. Not fatal when false:
    /// each request then reports the solver as unavailable.
    pub fn solver_present(&self) -> bool {
        self.solver_path.is_file()
    }
}
