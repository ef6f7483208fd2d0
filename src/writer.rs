//! Linker script emitter.
//!
//! Serializes the computed layout into three linker control files, one per
//! addressing mode. Each script assigns values for every cross-referenced
//! symbol, then places every kept section at its absolute or
//! segment-relative address; the flat script instead advances relative to
//! an anchor symbol, carries the boot-time relocation tables, and declares
//! the entry point. The shared trailer discards any section that did not go
//! through the layout, turning a stray fragment into a hard link error.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::layout::LayoutInfo;
use crate::relocs::build_reloc_tables;
use crate::section::{ids_by_unit, Section, SectionId, Symbol, SymbolTable, UnitId};

const COMMON_HEADER: &str = "
/* DO NOT EDIT!  This is an autogenerated file. */
OUTPUT_FORMAT(\"elf32-i386\")
OUTPUT_ARCH(\"i386\")
SECTIONS
{
";
const COMMON_TRAILER: &str = "

        /* Discard regular data sections to force a link error if
         * code attempts to access data not placed by this layout
         */
        /DISCARD/ : {
                *(.text*) *(.data*) *(.bss*) *(.rodata*)
                *(COMMON) *(.discard*) *(.eh_frame) *(.note*)
                }
}
";

/// The three generated control files.
#[derive(Debug)]
pub struct LinkerScripts {
    pub out16: String,
    pub out32seg: String,
    pub out32flat: String,
}

/// Symbol-value assignments for every cross-referenced symbol in `ids`,
/// plus the explicitly exported `exports`.
fn out_xrefs(
    sections: &[Section],
    ids: &[SectionId],
    symbols: &SymbolTable,
    use_seg: bool,
    exports: &[Symbol],
    force_delta: i64,
) -> String {
    let mut xrefs: BTreeMap<String, Symbol> = exports
        .iter()
        .map(|symbol| (symbol.name.clone(), symbol.clone()))
        .collect();
    for &id in ids {
        for reloc in &sections[id].relocs {
            let Some(symbol) = reloc.resolved_symbol(symbols) else {
                continue;
            };
            let Some(target) = symbol.section else {
                continue;
            };
            // A reference is a cross reference when it crosses units or was
            // renamed during resolution.
            if sections[target].unit != sections[id].unit || symbol.name != reloc.symbol_name {
                xrefs.insert(reloc.symbol_name.clone(), symbol.clone());
            }
        }
    }

    let mut out = String::new();
    for (name, symbol) in &xrefs {
        let Some(target) = symbol.section else {
            continue;
        };
        let loc = if use_seg {
            sections[target].final_seg_loc
        } else {
            sections[target].final_loc
        };
        let Some(loc) = loc else {
            continue;
        };
        let value = loc as i64 + force_delta + symbol.offset as i64;
        out.push_str(&format!("{} = {:#x} ;\n", name, value as u64));
    }
    out
}

/// Placement directives addressing each section by its absolute or
/// segment-relative location.
fn out_sections(sections: &[Section], ids: &[SectionId], use_seg: bool) -> String {
    let mut out = String::new();
    for &id in ids {
        let loc = if use_seg {
            sections[id].final_seg_loc
        } else {
            sections[id].final_loc
        };
        let Some(loc) = loc else {
            continue;
        };
        out.push_str(&format!(
            "{} {:#x} : {{ *({}) }}\n",
            sections[id].name, loc, sections[id].name
        ));
    }
    out
}

/// Placement directives by relative advancement from `start_sym`, ordered
/// by ascending final address.
fn out_rel_sections(sections: &[Section], ids: &[SectionId], start_sym: &str) -> String {
    let mut placed: Vec<(u64, SectionId)> = ids
        .iter()
        .filter_map(|&id| sections[id].final_loc.map(|loc| (loc, id)))
        .collect();
    placed.sort_unstable();

    let mut out = String::new();
    for (loc, id) in placed {
        out.push_str(&format!(". = ( {:#x} - {} ) ;\n", loc, start_sym));
        if sections[id].name == ".rodata.str1.1" || sections[id].name == ".rodata" {
            out.push_str(&format!("_rodata{} = . ;\n", sections[id].unit.tag()));
        }
        out.push_str(&format!(
            "*{}.*({})\n",
            sections[id].unit.tag(),
            sections[id].name
        ));
    }
    out
}

/// Build all three linker scripts from the computed layout.
pub fn build_linker_scripts(
    li: &LayoutInfo,
    sections: &[Section],
    symbols: &SymbolTable,
) -> Result<LinkerScripts> {
    let entry = li
        .entry_sym
        .as_ref()
        .context("layout has no entry symbol")?;

    // 16-bit script: segment-relative, plus the low-memory segment base.
    let ids16 = ids_by_unit(sections, &li.kept, UnitId::Code16);
    let body16 = format!(
        "{}
    zonelow_base = {:#x} ;
    _zonelow_seg = {:#x} ;

{}
",
        out_xrefs(sections, &ids16, symbols, true, &[], 0),
        li.zonelow_base,
        li.zonelow_base / 16,
        out_sections(sections, &ids16, true)
    );
    let out16 = format!("{}{}{}", COMMON_HEADER, body16, COMMON_TRAILER);

    // 32-bit segmented script.
    let ids32seg = ids_by_unit(sections, &li.kept, UnitId::Code32Seg);
    let body32seg = format!(
        "{}{}",
        out_xrefs(sections, &ids32seg, symbols, true, &[], 0),
        out_sections(sections, &ids32seg, true)
    );
    let out32seg = format!("{}{}{}", COMMON_HEADER, body32seg, COMMON_TRAILER);

    // Flat script: everything relative to the anchor symbol, preceded by
    // the relocation tables when the flat unit asked for them.
    let mut sec32all_start = li.sec32low_start;
    let mut relocstr = String::new();
    if li.genreloc {
        let tables = build_reloc_tables(sections, &li.kept, symbols);
        sec32all_start -= tables.count as u64 * 4;
        relocstr = tables.text;
    }
    let ids32flat = ids_by_unit(sections, &li.kept, UnitId::Code32Flat);
    let mut body = out_xrefs(sections, &[], symbols, false, &li.varlow_syms, li.relocdelta);
    body.push_str(&out_xrefs(
        sections,
        &ids32flat,
        symbols,
        false,
        std::slice::from_ref(entry),
        0,
    ));
    body.push_str(&format!(
        "
    _reloc_min_align = {:#x} ;
    zonefseg_start = {:#x} ;
    zonefseg_end = {:#x} ;
    zonelow_base = {:#x} ;
    final_varlow_start = {:#x} ;
    final_readonly_start = {:#x} ;
    varlow_start = {:#x} ;
    varlow_end = {:#x} ;
    code32init_start = {:#x} ;
    code32init_end = {:#x} ;

    code32flat_start = {:#x} ;
    .text code32flat_start : {{
{}
{}
        code32flat_end = ABSOLUTE(.) ;
    }} :text
",
        li.sec32init_align,
        li.zonefseg_start,
        li.zonefseg_end,
        li.zonelow_base,
        li.final_sec32low_start,
        li.final_readonly_start,
        li.sec32low_start,
        li.sec32low_end,
        li.sec32init_start,
        li.sec32init_end,
        sec32all_start,
        relocstr,
        out_rel_sections(sections, &li.kept, "code32flat_start")
    ));
    let out32flat = format!(
        "{}{}{}
ENTRY({})
PHDRS
{{
        text PT_LOAD AT ( code32flat_start ) ;
}}
",
        COMMON_HEADER, body, COMMON_TRAILER, entry.name
    );

    Ok(LinkerScripts {
        out16,
        out32seg,
        out32flat,
    })
}
