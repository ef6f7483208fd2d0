//! Detection of unused sections and init-only sections.
//!
//! One work-list traversal, two edge-acceptance predicates. The kept-section
//! pass walks from the entry point and the fixed-address sections, resolving
//! relocation targets across unit namespaces; everything it never visits is
//! dropped from the build. The runtime pass walks from the sections that must
//! stay live after boot and refuses to enter init-only code; a runtime edge
//! into init-only-verified variable data is a fatal build error.
//!
//! The two predicates stay separate on purpose: their acceptance rules are
//! not symmetric.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::section::{Reloc, Section, SectionId, SymbolRef, SymbolTable, UnitId};

/// Visited sections, each mapped to the chain of section names that reached
/// it (diagnostics only).
pub type ReachMap = HashMap<SectionId, Vec<String>>;

/// Visit all sections reachable from the anchor set.
///
/// `accept` inspects one relocation edge and returns the target section to
/// enqueue, `None` to ignore the edge, or an error to abort the build.
pub fn find_reachable<F>(
    sections: &mut Vec<Section>,
    symbols: &SymbolTable,
    anchors: &[SectionId],
    mut accept: F,
) -> Result<ReachMap>
where
    F: FnMut(&mut Reloc, UnitId, &[Section], &SymbolTable, &[String]) -> Result<Option<SectionId>>,
{
    let mut visited = ReachMap::new();
    let mut pending: Vec<SectionId> = Vec::new();
    for &id in anchors {
        if visited.insert(id, Vec::new()).is_none() {
            pending.push(id);
        }
    }

    while let Some(id) = pending.pop() {
        let mut chain = visited[&id].clone();
        chain.push(sections[id].name.clone());
        let unit = sections[id].unit;
        // Detach the reloc list so the predicate can rebind targets while
        // reading other sections in the arena.
        let mut relocs = std::mem::take(&mut sections[id].relocs);
        for reloc in relocs.iter_mut() {
            let Some(next) = accept(reloc, unit, sections, symbols, &chain)? else {
                continue;
            };
            if !visited.contains_key(&next) {
                visited.insert(next, chain.clone());
                pending.push(next);
            }
        }
        sections[id].relocs = relocs;
    }
    Ok(visited)
}

/// Resolve a relocation against one unit's namespace.
///
/// `_cfunc`-prefixed references may only land on flat-mode callable code
/// sections; plain references crossing units must not.
fn check_keep_symbol(
    reloc: &mut Reloc,
    unit: UnitId,
    sections: &[Section],
    symbols: &SymbolTable,
    is_xref: bool,
) -> Option<SectionId> {
    let mut name = reloc.symbol_name.as_str();
    let must_be_cfunc = name.starts_with("_cfunc");
    if must_be_cfunc {
        let prefix = format!("_cfunc{}_", unit.tag());
        name = name.strip_prefix(prefix.as_str())?;
    }
    let symbol = symbols.get(unit, name)?;
    let target = symbol.section?;
    let target_name = &sections[target].name;
    if target_name.starts_with(".discard.") {
        return None;
    }
    let dest_cfunc = target_name.starts_with(".text.") && !target_name.starts_with(".text.asm.");
    if (must_be_cfunc && !dest_cfunc) || (!must_be_cfunc && dest_cfunc && is_xref) {
        return None;
    }
    reloc.resolved = Some(SymbolRef {
        unit,
        name: name.to_string(),
    });
    Some(target)
}

/// Kept-section predicate: resolve the target symbol, preferring the owning
/// unit's namespace and falling back to the other units for genuine
/// cross-mode references. Unresolvable relocations are dead, not errors.
pub fn check_keep(
    reloc: &mut Reloc,
    unit: UnitId,
    sections: &[Section],
    symbols: &SymbolTable,
    _chain: &[String],
) -> Result<Option<SectionId>> {
    if let Some(target) = check_keep_symbol(reloc, unit, sections, symbols, false) {
        return Ok(Some(target));
    }
    for other in UnitId::ALL {
        if other == unit {
            continue;
        }
        if let Some(target) = check_keep_symbol(reloc, other, sections, symbols, true) {
            return Ok(Some(target));
        }
    }
    Ok(None)
}

/// Runtime predicate: refuse edges into init-only code, and abort the build
/// when init-only-verified variable data turns out to be reachable from a
/// runtime-live section.
pub fn check_runtime(
    reloc: &mut Reloc,
    _unit: UnitId,
    sections: &[Section],
    symbols: &SymbolTable,
    chain: &[String],
) -> Result<Option<SectionId>> {
    let target = match reloc.resolved_symbol(symbols).and_then(|s| s.section) {
        Some(target) => target,
        None => return Ok(None),
    };
    let target_name = &sections[target].name;
    if target_name.contains(".init.") {
        return Ok(None);
    }
    if target_name.contains(".data.varinit.") {
        bail!(
            "section {} is init-only variable data but is reachable at runtime (chain: {})",
            target_name,
            chain.join(" -> ")
        );
    }
    Ok(Some(target))
}
