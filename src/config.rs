//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the layout tool
//! using `clap`, the parsed build-option map, and the `LayoutPolicy` struct
//! holding the address-space constants threaded through the pipeline.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;

/// Arrange firmware sections and generate linker control scripts.
///
/// Reads the objdump section/symbol/relocation dumps of the three
/// compilation units, prunes unreachable code, computes the final ROM
/// layout, and writes one linker script per addressing mode.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Objdump output for the 16-bit unit
    pub in16: PathBuf,

    /// Objdump output for the 32-bit segmented unit
    pub in32seg: PathBuf,

    /// Objdump output for the 32-bit flat unit
    pub in32flat: PathBuf,

    /// Generated build-config header (#define lines)
    pub cfgfile: PathBuf,

    /// Output linker script for the 16-bit unit
    pub out16: PathBuf,

    /// Output linker script for the 32-bit segmented unit
    pub out32seg: PathBuf,

    /// Output linker script for the 32-bit flat unit
    pub out32flat: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

/// One value from the build-config header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i64),
    Str(String),
}

/// Build options scanned from the generated config header.
///
/// Absent options read as false; integer zero is false, any other defined
/// value is true.
#[derive(Debug, Default)]
pub struct BuildOptions {
    values: HashMap<String, OptionValue>,
}

impl BuildOptions {
    pub fn new() -> BuildOptions {
        BuildOptions::default()
    }

    pub fn set(&mut self, name: &str, value: OptionValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn flag(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(OptionValue::Int(v)) => *v != 0,
            Some(OptionValue::Str(s)) => !s.is_empty(),
            None => false,
        }
    }
}

/// Address-space constants governing the layout.
///
/// Kept as an explicit struct (not process-wide constants) so the packer and
/// layout engine are reentrant and testable with synthetic address spaces.
#[derive(Debug, Clone, Copy)]
pub struct LayoutPolicy {
    /// Absolute base of the f-segment ROM region.
    pub bios_addr: u64,
    /// Size of the f-segment region; 16-bit code cannot exceed it.
    pub bios_size: u64,
    /// Lowest address the read-only ROM area may occupy.
    pub rom_start: u64,
    /// Ceiling of conventional low RAM.
    pub lowram_end: u64,
    /// Minimum f-segment bytes reserved for dynamic allocations.
    pub min_biostable: u64,
}

impl Default for LayoutPolicy {
    fn default() -> LayoutPolicy {
        LayoutPolicy {
            bios_addr: 0xf0000,
            bios_size: 0x10000,
            rom_start: 0xc0000,
            lowram_end: 0xa0000,
            min_biostable: 2048,
        }
    }
}

impl LayoutPolicy {
    /// One past the last byte of the f-segment region.
    pub fn bios_end(&self) -> u64 {
        self.bios_addr + self.bios_size
    }
}
