//! Section categorization.
//!
//! Assigns every kept section the layout zone it belongs to. The rules are
//! a stable contract with the compiled units' section-naming scheme, so they
//! live here in one place, evaluated in priority order.

use crate::reachable::ReachMap;
use crate::section::{Category, Section, SectionId, UnitId};

pub fn categorize_sections(sections: &mut [Section], kept: &[SectionId], runtime: &ReachMap) {
    for &id in kept {
        let section = &sections[id];
        let category = if section.name.starts_with(".data.varlow.") {
            Category::VarLow
        } else if section.name.starts_with(".data.varfseg.") {
            Category::VarFseg
        } else if section.name.starts_with(".text.32fseg.") {
            Category::TextFseg
        } else if section.name.starts_with(".fixedaddr.") {
            Category::Fixed
        } else if section.unit == UnitId::Code32Flat && !runtime.contains_key(&id) {
            Category::Init
        } else {
            Category::Unit(section.unit)
        };
        sections[id].category = Some(category);
    }
}
