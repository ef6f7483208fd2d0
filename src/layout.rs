//! Zone layout engine.
//!
//! Determines the final memory addresses for every kept section. Zones are
//! laid out top-down in a fixed dependency chain, each one ending where the
//! previously computed zone starts: 16-bit code (ending at the packed fixed
//! region) -> 32-bit segmented -> f-segment flat code -> f-segment variable
//! data -> flat runtime -> flat init. The low-memory zone is laid out last;
//! its sections are copied to a separately configured base at boot, so their
//! link-time and final addresses differ by a relocation delta.

use anyhow::Result;

use crate::config::{BuildOptions, LayoutPolicy};
use crate::packer::fit_sections;
use crate::section::{
    ids_by_category, ids_by_prefix, Category, Section, SectionId, Symbol, UnitId,
};
use crate::utils::{align_up, align_up_i64};

/// Aggregate output of the layout run, consumed by the script emitter.
#[derive(Debug)]
pub struct LayoutInfo {
    /// The kept, categorized section set (ids into the arena).
    pub kept: Vec<SectionId>,
    /// Whether boot-time relocation tables are wanted.
    pub genreloc: bool,
    pub sec16_start: u64,
    pub sec32seg_start: u64,
    pub sec32textfseg_start: u64,
    pub sec32fseg_start: u64,
    pub sec32flat_start: u64,
    pub sec32init_start: u64,
    pub sec32init_end: u64,
    pub sec32init_align: u64,
    pub sec32low_start: u64,
    pub sec32low_end: u64,
    /// Base of the 64KB low-memory segment at boot.
    pub zonelow_base: u64,
    /// Offset between low-memory link-time and boot-time addresses.
    pub relocdelta: i64,
    pub final_sec32low_start: u64,
    pub zonefseg_start: u64,
    pub zonefseg_end: u64,
    pub final_readonly_start: u64,
    /// Low-memory variable symbols exported into the flat script.
    pub varlow_syms: Vec<Symbol>,
    /// The designated entry symbol (16-bit namespace).
    pub entry_sym: Option<Symbol>,
}

/// Determine the final addresses for a list of sections that end at
/// `end_addr`, packing them backward. Each section's offset is aligned to
/// its own alignment; the computed zone start is rounded down to the overall
/// alignment. Returns the zone start and that overall alignment.
pub fn set_sections_start(
    sections: &mut [Section],
    ids: &[SectionId],
    end_addr: u64,
    min_align: u64,
    seg_offset: i64,
) -> (u64, u64) {
    let mut min_align = min_align.max(1);
    let mut total: u64 = 0;
    for &id in ids {
        if sections[id].align > min_align {
            min_align = sections[id].align;
        }
        total = align_up(total, sections[id].align) + sections[id].size;
    }
    let start = (end_addr - total) / min_align * min_align;
    let mut cur = start;
    for &id in ids {
        cur = align_up(cur, sections[id].align);
        sections[id].place(cur, (cur as i64 - seg_offset) as u64);
        cur += sections[id].size;
    }
    (start, min_align)
}

fn layout_ids(sections: &[Section], pool: &[SectionId], prefixes: &[&str]) -> Vec<SectionId> {
    let mut ids = Vec::new();
    for prefix in prefixes {
        ids.extend(ids_by_prefix(sections, pool, prefix));
    }
    ids
}

/// Compute the final memory addresses of every kept section.
pub fn do_layout(
    sections: &mut [Section],
    kept: Vec<SectionId>,
    options: &BuildOptions,
    policy: &LayoutPolicy,
    genreloc: bool,
) -> Result<LayoutInfo> {
    let bios_offset = policy.bios_addr as i64;

    // 16-bit zone: pin the fixed sections, best-fit code into their gaps,
    // then stack everything left directly below the lowest fixed address.
    let sections16 = ids_by_category(sections, &kept, Category::Unit(UnitId::Code16));
    let text16 = ids_by_prefix(sections, &sections16, ".text.");
    let fixed = ids_by_category(sections, &kept, Category::Fixed);
    let first_fixed = fit_sections(sections, &fixed, &text16, policy)?;

    let mut remaining16 = layout_ids(sections, &sections16, &[".text.", ".rodata", ".data16."]);
    remaining16.retain(|&id| sections[id].final_loc.is_none());
    let (sec16_start, _) = set_sections_start(sections, &remaining16, first_fixed, 1, bios_offset);

    // 32-bit segmented zone ends where the 16-bit zone starts.
    let sections32seg = ids_by_category(sections, &kept, Category::Unit(UnitId::Code32Seg));
    let seg_ids = layout_ids(sections, &sections32seg, &[".text.", ".rodata", ".data32seg."]);
    let (sec32seg_start, _) = set_sections_start(sections, &seg_ids, sec16_start, 1, bios_offset);

    // Flat code that must stay in the f-segment.
    let textfseg_ids = ids_by_category(sections, &kept, Category::TextFseg);
    let (sec32textfseg_start, _) =
        set_sections_start(sections, &textfseg_ids, sec32seg_start, 16, 0);

    // F-segment variable data.
    let fseg_ids = ids_by_category(sections, &kept, Category::VarFseg);
    let (sec32fseg_start, _) =
        set_sections_start(sections, &fseg_ids, sec32textfseg_start, 16, bios_offset);

    // Flat runtime code/data.
    let sections32flat = ids_by_category(sections, &kept, Category::Unit(UnitId::Code32Flat));
    let flat_ids = layout_ids(
        sections,
        &sections32flat,
        &[".text.", ".rodata", ".data.", ".bss."],
    );
    let (mut sec32flat_start, _) =
        set_sections_start(sections, &flat_ids, sec32fseg_start, 16, 0);

    // Flat init-only code/data, reclaimed after boot.
    let sections32init = ids_by_category(sections, &kept, Category::Init);
    let init_ids = layout_ids(
        sections,
        &sections32init,
        &[".text.", ".rodata", ".data.", ".bss."],
    );
    let (mut sec32init_start, mut sec32init_align) =
        set_sections_start(sections, &init_ids, sec32flat_start, 16, 0);

    // F-segment dynamic-allocation zone. If the code squeezed it below the
    // minimum table reservation, push the flat zones down below the
    // f-segment variable data and lay them out again (a single corrective
    // pass, not an iterative solver).
    let mut zonefseg_end = sec32flat_start;
    if !genreloc {
        zonefseg_end = sec32init_start;
    }
    let mut zonefseg_start = policy.bios_addr;
    if zonefseg_start + policy.min_biostable > zonefseg_end {
        zonefseg_end = sec32fseg_start;
        zonefseg_start = zonefseg_end - policy.min_biostable;
        let flat = set_sections_start(sections, &flat_ids, zonefseg_start, 16, 0);
        sec32flat_start = flat.0;
        let init = set_sections_start(sections, &init_ids, sec32flat_start, 16, 0);
        sec32init_start = init.0;
        sec32init_align = init.1;
    }
    let sec32init_end = sec32flat_start;
    let mut final_readonly_start = policy.bios_addr.min(sec32flat_start);
    if !genreloc {
        final_readonly_start = policy.bios_addr.min(sec32init_start);
    }

    // Low-memory zone. Link-time addresses continue the top-down chain; the
    // boot-time copy lands either just below the read-only region (upper
    // memory allocations enabled) or just below the low-RAM ceiling.
    let low_ids = ids_by_category(sections, &kept, Category::VarLow);
    let sec32low_end = sec32init_start;
    let (final_sec32low_end, zonelow_base) = if options.flag("CONFIG_MALLOC_UPPERMEMORY") {
        let end = final_readonly_start;
        let base = align_up_i64(end as i64 - 64 * 1024, 2 * 1024);
        (end, (policy.rom_start as i64).max(base) as u64)
    } else {
        (policy.lowram_end, policy.lowram_end - 64 * 1024)
    };
    let relocdelta = final_sec32low_end as i64 - sec32low_end as i64;
    let (sec32low_start, _) = set_sections_start(
        sections,
        &low_ids,
        sec32low_end,
        16,
        zonelow_base as i64 - relocdelta,
    );
    let final_sec32low_start = (sec32low_start as i64 + relocdelta) as u64;

    let size32textfseg = sec32seg_start - sec32textfseg_start;
    tracing::info!("16bit size:           {}", policy.bios_end() - sec16_start);
    tracing::info!("32bit segmented size: {}", sec16_start - sec32seg_start);
    tracing::info!(
        "32bit flat size:      {}",
        (sec32fseg_start - sec32flat_start) + size32textfseg
    );
    tracing::info!("32bit flat init size: {}", sec32flat_start - sec32init_start);
    tracing::info!("Lowmem size:          {}", sec32low_end - sec32low_start);
    tracing::info!("f-segment var size:   {}", sec32textfseg_start - sec32fseg_start);

    Ok(LayoutInfo {
        kept,
        genreloc,
        sec16_start,
        sec32seg_start,
        sec32textfseg_start,
        sec32fseg_start,
        sec32flat_start,
        sec32init_start,
        sec32init_end,
        sec32init_align,
        sec32low_start,
        sec32low_end,
        zonelow_base,
        relocdelta,
        final_sec32low_start,
        zonefseg_start,
        zonefseg_end,
        final_readonly_start,
        varlow_syms: Vec::new(),
        entry_sym: None,
    })
}
