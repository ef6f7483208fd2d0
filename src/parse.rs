//! Input record parsing.
//!
//! Two small line-oriented parsers: one for the objdump section/symbol/
//! relocation dump of a compilation unit, one for the generated build-config
//! header. Both skip lines they cannot understand rather than failing; the
//! rest of the pipeline never sees a partially parsed record.

use std::collections::HashMap;

use crate::config::{BuildOptions, OptionValue};
use crate::section::{Reloc, RelocKind, Section, SectionId, Symbol, SymbolRef, SymbolTable, UnitId};

#[derive(Clone, Copy)]
enum State {
    Idle,
    Sections,
    Symbols,
    Relocs(SectionId),
}

/// Parse one unit's objdump output, appending its sections to the shared
/// arena and its symbols to the unit's namespace.
pub fn parse_objdump(text: &str, unit: UnitId, sections: &mut Vec<Section>, symbols: &mut SymbolTable) {
    let mut section_map: HashMap<String, SectionId> = HashMap::new();
    let mut state = State::Idle;

    for raw in text.lines() {
        let line = raw.trim_end();
        if line == "Sections:" {
            state = State::Sections;
            continue;
        }
        if line == "SYMBOL TABLE:" {
            state = State::Symbols;
            continue;
        }
        if let Some(rest) = line.strip_prefix("RELOCATION RECORDS FOR [") {
            state = State::Idle;
            let Some(name) = rest.strip_suffix("]:") else {
                continue;
            };
            // Skip debugging sections to reduce parsing time.
            if name.starts_with(".debug_") {
                continue;
            }
            match section_map.get(name) {
                Some(&id) => state = State::Relocs(id),
                None => tracing::debug!("relocation records for unknown section {}", name),
            }
            continue;
        }

        match state {
            State::Idle => {}
            State::Sections => parse_section_row(line, unit, sections, &mut section_map),
            State::Symbols => parse_symbol_row(line, unit, symbols, &section_map),
            State::Relocs(owner) => {
                parse_reloc_row(line, unit, owner, sections, symbols, &section_map)
            }
        }
    }
}

fn parse_section_row(
    line: &str,
    unit: UnitId,
    sections: &mut Vec<Section>,
    section_map: &mut HashMap<String, SectionId>,
) {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // idx name size vma lma fileoff align
    if fields.len() != 7 {
        return;
    }
    let Some(power) = fields[6].strip_prefix("2**") else {
        return;
    };
    let (Ok(size), Ok(power)) = (u64::from_str_radix(fields[2], 16), power.parse::<u32>()) else {
        return;
    };
    let Some(align) = 1u64.checked_shl(power) else {
        return;
    };
    let id = sections.len();
    sections.push(Section::new(fields[1], size, align, unit));
    section_map.insert(fields[1].to_string(), id);
}

fn parse_symbol_row(
    line: &str,
    unit: UnitId,
    symbols: &mut SymbolTable,
    section_map: &HashMap<String, SectionId>,
) {
    // Fixed-column format: 8 hex digits, flag columns, then
    // "section size name" (with an optional .hidden marker).
    let (Some(offset_text), Some(rest)) = (line.get(..8), line.get(17..)) else {
        return;
    };
    let Ok(offset) = u64::from_str_radix(offset_text, 16) else {
        return;
    };
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let (section_name, size_text, name) = match parts.len() {
        3 => (parts[0], parts[1], parts[2]),
        4 if parts[2] == ".hidden" => (parts[0], parts[1], parts[3]),
        _ => return,
    };
    if u64::from_str_radix(size_text, 16).is_err() {
        return;
    }
    symbols.insert(
        unit,
        Symbol {
            name: name.to_string(),
            offset,
            section: section_map.get(section_name).copied(),
        },
    );
}

fn parse_reloc_row(
    line: &str,
    unit: UnitId,
    owner: SectionId,
    sections: &mut Vec<Section>,
    symbols: &mut SymbolTable,
    section_map: &HashMap<String, SectionId>,
) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return;
    }
    // The column-header row fails the offset parse and is skipped with the
    // rest of the noise.
    let Ok(offset) = u64::from_str_radix(parts[0], 16) else {
        return;
    };
    let symbol_name = parts[2];
    if !symbols.contains(unit, symbol_name) {
        // Some binutils emit the section name instead of a symbol; register
        // a placeholder bound to the same-named section when one exists.
        symbols.insert(
            unit,
            Symbol {
                name: symbol_name.to_string(),
                offset: 0,
                section: section_map.get(symbol_name).copied(),
            },
        );
    }
    sections[owner].relocs.push(Reloc {
        offset,
        kind: RelocKind::from_reloc_type(parts[1]),
        symbol_name: symbol_name.to_string(),
        resolved: Some(SymbolRef {
            unit,
            name: symbol_name.to_string(),
        }),
    });
}

/// Scan `#define NAME VALUE` options from the generated config header.
pub fn scan_config(text: &str) -> BuildOptions {
    let mut options = BuildOptions::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 || parts[0] != "#define" {
            continue;
        }
        let value = parts[2];
        let parsed = if let Some(hex) = value.strip_prefix("0x") {
            i64::from_str_radix(hex, 16).ok()
        } else {
            value.parse::<i64>().ok()
        };
        match parsed {
            Some(v) => options.set(parts[1], OptionValue::Int(v)),
            None => options.set(parts[1], OptionValue::Str(value.to_string())),
        }
    }
    options
}
