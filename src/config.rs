//! Simulator configuration.
//!
//! Configuration is resolved from multiple sources in priority order:
//! 1. Command-line options (applied by the front-end)
//! 2. Environment variables (`MR32_RAM_SIZE`, `MR32_TRACE_FILE`)
//! 3. Project-local config file (`./mr32-emu.toml`)
//! 4. User config file (`~/.config/mr32-emu/config.toml`)
//! 5. Built-in defaults
//!
//! The resolved value is passed into the CPU constructor; there is no
//! process-wide configuration singleton.
//!
//! # Config File Format
//!
//! ```toml
//! # mr32-emu.toml
//! ram_size = 0x10000000
//! verbose = true
//! # trace_file = "/tmp/mr32.trace"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolved simulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Guest RAM size in bytes. The default covers the full 32-bit address
    /// space so that the MMIO window and the argument block exist.
    pub ram_size: u64,

    /// Print load/run statistics.
    pub verbose: bool,

    /// Write a binary execution trace to this file.
    pub trace_file: Option<PathBuf>,

    /// Graphics surface for an external framebuffer presenter. The core
    /// only carries these values; it never reads the framebuffer itself.
    pub gfx_enabled: bool,
    pub gfx_addr: u32,
    pub gfx_width: u32,
    pub gfx_height: u32,
    pub gfx_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ram_size: 0x1_0000_0000,
            verbose: false,
            trace_file: None,
            gfx_enabled: false,
            gfx_addr: 0x4000_0000,
            gfx_width: 640,
            gfx_height: 400,
            gfx_depth: 8,
        }
    }
}

/// On-disk configuration: every field optional so that files only override
/// what they mention.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    ram_size: Option<u64>,
    verbose: Option<bool>,
    trace_file: Option<PathBuf>,
    gfx_enabled: Option<bool>,
    gfx_addr: Option<u32>,
    gfx_width: Option<u32>,
    gfx_height: Option<u32>,
    gfx_depth: Option<u32>,
}

impl Config {
    /// Resolve configuration from files and the environment.
    pub fn load() -> Self {
        let mut config = Self::default();

        // User config first (lowest priority of the file sources).
        if let Some(user) = Self::load_user_config() {
            config.merge(user);
        }
        if let Some(local) = Self::load_from_file(Path::new("mr32-emu.toml")) {
            config.merge(local);
        }
        config.apply_env_overrides();

        log::debug!("Resolved configuration: {:?}", config);
        config
    }

    fn load_user_config() -> Option<ConfigFile> {
        let config_dir = dirs::config_dir()?;
        Self::load_from_file(&config_dir.join("mr32-emu").join("config.toml"))
    }

    fn load_from_file(path: &Path) -> Option<ConfigFile> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(file) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(file)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(v) = file.ram_size {
            self.ram_size = v;
        }
        if let Some(v) = file.verbose {
            self.verbose = v;
        }
        if file.trace_file.is_some() {
            self.trace_file = file.trace_file;
        }
        if let Some(v) = file.gfx_enabled {
            self.gfx_enabled = v;
        }
        if let Some(v) = file.gfx_addr {
            self.gfx_addr = v;
        }
        if let Some(v) = file.gfx_width {
            self.gfx_width = v;
        }
        if let Some(v) = file.gfx_height {
            self.gfx_height = v;
        }
        if let Some(v) = file.gfx_depth {
            self.gfx_depth = v;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("MR32_RAM_SIZE") {
            match parse_u64(&size) {
                Some(v) => {
                    log::info!("Using MR32_RAM_SIZE from environment: {}", v);
                    self.ram_size = v;
                }
                None => log::warn!("Ignoring unparsable MR32_RAM_SIZE: {}", size),
            }
        }
        if let Ok(path) = std::env::var("MR32_TRACE_FILE") {
            log::info!("Using MR32_TRACE_FILE from environment: {}", path);
            self.trace_file = Some(PathBuf::from(path));
        }
    }
}

/// Parse a decimal or 0x-prefixed hexadecimal number.
pub fn parse_u64(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
