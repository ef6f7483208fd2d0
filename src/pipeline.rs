//! Pipeline orchestration.
//!
//! Drives the whole layout run in strict order:
//! 1. Parse the three per-unit objdump dumps and the build-config header.
//! 2. Walk the relocation graph from the entry point and the fixed-address
//!    sections to find the sections worth keeping.
//! 3. Walk again from the runtime-live anchors to split the flat unit into
//!    runtime and init-only parts.
//! 4. Categorize, pack the fixed region, and lay out every zone.
//! 5. Emit the three linker scripts; nothing is written unless the entire
//!    layout succeeded.

use anyhow::{Context, Result};
use std::fs;

use crate::categorize::categorize_sections;
use crate::config::{BuildOptions, Config, LayoutPolicy};
use crate::layout::do_layout;
use crate::parse::{parse_objdump, scan_config};
use crate::reachable::{check_keep, check_runtime, find_reachable};
use crate::section::{Section, SectionId, Symbol, SymbolTable, UnitId};
use crate::writer::{build_linker_scripts, LinkerScripts};

/// Parsed sections and symbols of all three compilation units.
#[derive(Default)]
pub struct BuildInput {
    pub sections: Vec<Section>,
    pub symbols: SymbolTable,
}

impl BuildInput {
    pub fn new() -> BuildInput {
        BuildInput::default()
    }

    pub fn parse_unit(&mut self, unit: UnitId, text: &str) {
        parse_objdump(text, unit, &mut self.sections, &mut self.symbols);
    }
}

/// Read the inputs, plan the layout, and write the three linker scripts.
pub fn run(config: &Config) -> Result<()> {
    let mut input = BuildInput::new();
    for (unit, path) in [
        (UnitId::Code16, &config.in16),
        (UnitId::Code32Seg, &config.in32seg),
        (UnitId::Code32Flat, &config.in32flat),
    ] {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        input.parse_unit(unit, &text);
    }
    let cfg_text = fs::read_to_string(&config.cfgfile)
        .with_context(|| format!("failed to read {}", config.cfgfile.display()))?;
    let options = scan_config(&cfg_text);

    let scripts = plan_rom(&mut input, &options, &LayoutPolicy::default())?;

    for (path, text) in [
        (&config.out16, &scripts.out16),
        (&config.out32seg, &scripts.out32seg),
        (&config.out32flat, &scripts.out32flat),
    ] {
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Compute the full layout over already-parsed input and render the scripts.
pub fn plan_rom(
    input: &mut BuildInput,
    options: &BuildOptions,
    policy: &LayoutPolicy,
) -> Result<LinkerScripts> {
    let entry_name = if options.flag("CONFIG_COREBOOT") {
        "entry_elf"
    } else if options.flag("CONFIG_CSM") {
        "entry_csm"
    } else {
        "reset_vector"
    };
    let entry_sym = input
        .symbols
        .get(UnitId::Code16, entry_name)
        .cloned()
        .with_context(|| format!("entry symbol {} not found in the 16bit unit", entry_name))?;
    let entry_section = entry_sym
        .section
        .with_context(|| format!("entry symbol {} has no owning section", entry_name))?;

    // Everything not reachable from the entry point or a fixed-address
    // section is dropped from the build.
    let mut anchors: Vec<SectionId> = vec![entry_section];
    anchors.extend(
        (0..input.sections.len()).filter(|&id| input.sections[id].name.starts_with(".fixedaddr.")),
    );
    let keep = find_reachable(&mut input.sections, &input.symbols, &anchors, check_keep)?;
    let kept: Vec<SectionId> = (0..input.sections.len())
        .filter(|id| keep.contains_key(id))
        .collect();
    tracing::debug!("{} of {} sections kept", kept.len(), input.sections.len());

    // Runtime/init split of the kept flat sections.
    let runtime_anchors: Vec<SectionId> = kept
        .iter()
        .copied()
        .filter(|&id| {
            let name = &input.sections[id].name;
            name.contains(".data.varlow.")
                || name.contains(".data.varfseg.")
                || name.contains(".fixedaddr.")
                || name.contains(".runtime.")
        })
        .collect();
    let runtime = find_reachable(
        &mut input.sections,
        &input.symbols,
        &runtime_anchors,
        check_runtime,
    )?;

    categorize_sections(&mut input.sections, &kept, &runtime);

    // Relocation tables are only wanted when the flat unit was compiled
    // with the relocation sentinel.
    let genreloc = input.symbols.contains(UnitId::Code32Flat, "_reloc_abs_start");
    let mut li = do_layout(&mut input.sections, kept, options, policy, genreloc)?;

    // Low-memory variable symbols exported into the flat script.
    let mut varlow_syms: Vec<Symbol> = input
        .symbols
        .unit_symbols(UnitId::Code32Flat)
        .filter(|symbol| {
            let Some(id) = symbol.section else {
                return false;
            };
            let section = &input.sections[id];
            section.final_loc.is_some()
                && section.name.contains(".data.varlow.")
                && symbol.name != section.name
        })
        .cloned()
        .collect();
    varlow_syms.sort_by(|a, b| a.name.cmp(&b.name));
    li.varlow_syms = varlow_syms;
    li.entry_sym = Some(entry_sym);

    build_linker_scripts(&li, &input.sections, &input.symbols)
}
