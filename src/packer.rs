//! Fixed-address section packing.
//!
//! The top of the f-segment holds sections with externally mandated offsets
//! (entry vectors and the like), encoded as a hexadecimal byte offset in the
//! section name. The space between them is a scarce, fragmented resource;
//! this pass pins the mandated sections and best-fits relocatable 16-bit
//! code into the gaps, smallest gap first, to minimize wasted ROM.

use anyhow::{bail, Result};

use crate::config::LayoutPolicy;
use crate::section::{Section, SectionId};
use crate::utils::align_up_i64;

/// Place the fixed sections at their mandated offsets and fill the gaps
/// between them from the `fill` pool. Returns the absolute address of the
/// lowest fixed section, which becomes the ceiling for the remaining 16-bit
/// layout. Pool sections that fit nowhere stay unplaced and fall through to
/// that later stage.
pub fn fit_sections(
    sections: &mut [Section],
    fixed: &[SectionId],
    fill: &[SectionId],
    policy: &LayoutPolicy,
) -> Result<u64> {
    let mut fixed_offsets: Vec<(u64, SectionId)> = Vec::new();
    for &id in fixed {
        let Some(hex) = sections[id].name.strip_prefix(".fixedaddr.") else {
            bail!("section {} is not a fixed-address section", sections[id].name);
        };
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let Ok(offset) = u64::from_str_radix(hex, 16) else {
            bail!("bad offset in fixed-address section name {}", sections[id].name);
        };
        if sections[id].align != 1 {
            bail!(
                "fixed section {} has non-unit alignment ({})",
                sections[id].name,
                sections[id].align
            );
        }
        sections[id].place(offset + policy.bios_addr, offset);
        fixed_offsets.push((offset, id));
    }
    if fixed_offsets.is_empty() {
        // Nothing pinned; the 16-bit zone ends at the region ceiling.
        return Ok(policy.bios_end());
    }
    fixed_offsets.sort_by_key(|&(offset, _)| offset);
    let first_fixed = fixed_offsets[0].0;

    // Free space behind each fixed section, up to the next one (the last
    // gap extends to the region boundary). Signed math so overlapping
    // mandated offsets degrade to zero-capacity gaps.
    let mut gaps: Vec<(i64, SectionId)> = Vec::new();
    for (i, &(offset, id)) in fixed_offsets.iter().enumerate() {
        let next = if i == fixed_offsets.len() - 1 {
            policy.bios_size
        } else {
            fixed_offsets[i + 1].0
        };
        gaps.push((next as i64 - offset as i64 - sections[id].size as i64, id));
    }
    gaps.sort_by_key(|&(avail, _)| avail);

    let arena: &[Section] = sections;
    let mut pool: Vec<SectionId> = fill.to_vec();
    pool.sort_by(|&a, &b| {
        (arena[a].size, arena[a].align, &arena[a].name).cmp(&(
            arena[b].size,
            arena[b].align,
            &arena[b].name,
        ))
    });

    let mut total_used: i64 = 0;
    for &(avail, fixed_id) in &gaps {
        let mut addpos =
            sections[fixed_id].final_seg_loc.unwrap_or(0) as i64 + sections[fixed_id].size as i64;
        total_used += sections[fixed_id].size as i64;
        let gap_end = addpos + avail;
        loop {
            // Take the largest pooled section that still fits; candidates
            // too big to fit are skipped, not rejected for good.
            let mut fit: Option<(i64, usize)> = None;
            for (i, &candidate) in pool.iter().enumerate() {
                if addpos + sections[candidate].size as i64 > gap_end {
                    // Pool is size-sorted; nothing further fits either.
                    break;
                }
                let next =
                    align_up_i64(addpos, sections[candidate].align as i64) + sections[candidate].size as i64;
                if next > gap_end {
                    continue;
                }
                fit = Some((next, i));
            }
            let Some((next, index)) = fit else {
                break;
            };
            let id = pool.remove(index);
            let place = align_up_i64(addpos, sections[id].align as i64);
            sections[id].place((place + policy.bios_addr as i64) as u64, place as u64);
            tracing::debug!(
                "packed {} (size {} align {}) at {:#x}",
                sections[id].name,
                sections[id].size,
                sections[id].align,
                place
            );
            total_used += sections[id].size as i64;
            addpos = next;
        }
    }
    if !pool.is_empty() {
        tracing::debug!(
            "{} fillable sections left for the regular 16-bit layout",
            pool.len()
        );
    }

    let total = policy.bios_size as i64 - first_fixed as i64;
    let slack = total - total_used;
    tracing::info!(
        "fixed space: {:#x}-{:#x}  total: {}  slack: {}  percent slack: {:.1}%",
        first_fixed,
        policy.bios_size,
        total,
        slack,
        slack as f64 / total as f64 * 100.0
    );

    Ok(first_fixed + policy.bios_addr)
}
