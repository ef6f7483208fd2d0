//! Boot-time relocation table builder.
//!
//! Init code is position independent until the boot-time relocator copies it
//! to its final home. This pass derives every fixup that copy requires:
//! absolute references within init code, relative references from init code
//! out to runtime code, and references from runtime code into init code.
//! Each table is a sorted array of 32-bit words bracketed by start/end
//! marker symbols.

use std::collections::HashSet;

use crate::section::{Category, RelocKind, Section, SectionId, SymbolTable};

/// Rendered fixup tables plus the total entry count (the emitter reserves
/// four bytes per entry below the flat zone start).
pub struct RelocTables {
    pub text: String,
    pub count: usize,
}

/// Positions of relocations in `from` sections whose resolved target lies in
/// `to`, optionally restricted to one relocation kind.
pub fn collect_relocs(
    sections: &[Section],
    from: &[SectionId],
    to: &HashSet<SectionId>,
    kind: Option<RelocKind>,
    symbols: &SymbolTable,
) -> Vec<u64> {
    let mut positions = Vec::new();
    for &id in from {
        let Some(base) = sections[id].final_loc else {
            continue;
        };
        for reloc in &sections[id].relocs {
            if kind.is_some_and(|k| reloc.kind != k) {
                continue;
            }
            let target = reloc.resolved_symbol(symbols).and_then(|s| s.section);
            if target.is_some_and(|t| to.contains(&t)) {
                positions.push(base + reloc.offset);
            }
        }
    }
    positions
}

/// Render one fixup array bracketed by its start/end markers; entries are
/// emitted relative to `out_rel` in ascending address order.
pub fn str_relocs(out_name: &str, out_rel: &str, positions: &mut Vec<u64>) -> String {
    positions.sort_unstable();
    let mut out = format!("        {}_start = ABSOLUTE(.) ;\n", out_name);
    for pos in positions.iter() {
        out.push_str(&format!("LONG({:#x} - {})\n", pos, out_rel));
    }
    out.push_str(&format!("        {}_end = ABSOLUTE(.) ;\n", out_name));
    out
}

/// Build the three fixup tables over the kept section set.
pub fn build_reloc_tables(
    sections: &[Section],
    kept: &[SectionId],
    symbols: &SymbolTable,
) -> RelocTables {
    let init: Vec<SectionId> = kept
        .iter()
        .copied()
        .filter(|&id| sections[id].category == Some(Category::Init))
        .collect();
    let noninit: Vec<SectionId> = kept
        .iter()
        .copied()
        .filter(|&id| sections[id].category != Some(Category::Init))
        .collect();
    let init_set: HashSet<SectionId> = init.iter().copied().collect();
    let noninit_set: HashSet<SectionId> = noninit.iter().copied().collect();

    let mut abs = collect_relocs(sections, &init, &init_set, Some(RelocKind::Abs32), symbols);
    let mut rel = collect_relocs(sections, &init, &noninit_set, Some(RelocKind::Rel32), symbols);
    let mut init_refs = collect_relocs(sections, &noninit, &init_set, None, symbols);

    let count = abs.len() + rel.len() + init_refs.len();
    let text = format!(
        "{}{}{}",
        str_relocs("_reloc_abs", "code32init_start", &mut abs),
        str_relocs("_reloc_rel", "code32init_start", &mut rel),
        str_relocs("_reloc_init", "code32flat_start", &mut init_refs),
    );
    RelocTables { text, count }
}
