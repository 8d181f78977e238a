// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel configuration for the simulated machine and swap backing
//! OWNERS: @kernel-mm-team
//! PUBLIC API: VmConfig (from_toml_str/load/validate), SwapBacking
//! DEPENDS_ON: serde, toml
//! INVARIANTS: page_size is a power of two; tlb_size <= phys_pages; all sizes non-zero

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Where evicted dirty pages are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SwapBacking {
    /// Heap-backed store; contents vanish with the kernel.
    #[default]
    Memory,
    /// File-backed store created at `path` on start and removed on shutdown.
    File {
        /// Location of the swap file.
        path: PathBuf,
    },
}

/// Machine and paging parameters.
///
/// ```toml
/// page_size = 1024
/// phys_pages = 32
/// tlb_size = 4
/// tlb_seed = 7
///
/// [swap]
/// kind = "file"
/// path = "/tmp/nexus.swap"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Bytes per page and per frame.
    pub page_size: usize,
    /// Number of physical frames in main memory.
    pub phys_pages: usize,
    /// Number of hardware TLB slots.
    pub tlb_size: usize,
    /// Seed for TLB victim selection.
    pub tlb_seed: u64,
    /// Stack pages reserved by [`crate::ProcessLayout`] after the sections.
    pub stack_pages: usize,
    /// Swap backing store.
    pub swap: SwapBacking,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            page_size: 1024,
            phys_pages: 32,
            tlb_size: 4,
            tlb_seed: 0x6e78_766d,
            stack_pages: 8,
            swap: SwapBacking::Memory,
        }
    }
}

impl VmConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&data)
    }

    /// Rejects configurations the machine cannot be built with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::Invalid("page_size must be a non-zero power of two"));
        }
        if self.phys_pages == 0 {
            return Err(ConfigError::Invalid("phys_pages must be non-zero"));
        }
        if self.tlb_size == 0 {
            return Err(ConfigError::Invalid("tlb_size must be non-zero"));
        }
        if self.tlb_size > self.phys_pages {
            return Err(ConfigError::Invalid("tlb_size must not exceed phys_pages"));
        }
        Ok(())
    }
}
