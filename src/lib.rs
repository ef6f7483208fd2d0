//! ROM layout planning library.
//!
//! This library provides the core components of the `romlayout` tool.
//! It is organized into several modules:
//! - `config`: CLI configuration, build options and the layout policy.
//! - `section`: The section/relocation/symbol data model.
//! - `parse`: Objdump and build-config input parsing.
//! - `reachable`: Detection of unused and init-only sections.
//! - `categorize`: Section to layout-zone assignment.
//! - `packer`: Fixed-address section packing.
//! - `layout`: The zone layout engine.
//! - `relocs`: Boot-time relocation table building.
//! - `writer`: Linker script emission.
//! - `pipeline`: End-to-end orchestration.

pub mod categorize;
pub mod config;
pub mod layout;
pub mod packer;
pub mod parse;
pub mod pipeline;
pub mod reachable;
pub mod relocs;
pub mod section;
pub mod utils;
pub mod writer;
