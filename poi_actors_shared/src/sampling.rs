// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic weighted slot assignment.
//!
//! Every replica derives the same slot owners from the same `(app_hash,
//! participant, weights)` inputs: the weight map is materialized into a
//! sorted sequence before any draw, so map iteration order cannot leak into
//! consensus-visible output.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::randomness::first_8_bytes_be;

/// Assigns `n_slots` slots across the weighted participants.
///
/// Entries with non-positive weight never own a slot. Each slot index draws
/// `sha256(app_hash || participant || base10(i))`, reduced modulo the total
/// weight, and the owner is the address whose cumulative weight range
/// contains the draw. Returns an empty vector when there are no slots or no
/// positive weights.
pub fn get_slots(
    app_hash: &str,
    participant: &str,
    weights: &HashMap<String, i64>,
    n_slots: usize,
) -> Vec<String> {
    let mut entries: Vec<(&String, i64)> = weights
        .iter()
        .filter(|(_, &w)| w > 0)
        .map(|(addr, &w)| (addr, w))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let total_weight: u64 = entries.iter().map(|(_, w)| *w as u64).sum();
    if n_slots == 0 || total_weight == 0 {
        return Vec::new();
    }

    // One draw per slot, then a single sweep over both sorted sequences.
    let mut draws: Vec<(u64, usize)> = (0..n_slots)
        .map(|slot| (slot_draw(app_hash, participant, slot, total_weight), slot))
        .collect();
    draws.sort_by_key(|&(r, _)| r);

    let mut assigned = vec![String::new(); n_slots];
    let mut cursor = 0usize;
    let mut cumulative = entries[0].1 as u64;
    for (draw, slot) in draws {
        while draw >= cumulative {
            cursor += 1;
            cumulative += entries[cursor].1 as u64;
        }
        assigned[slot] = entries[cursor].0.clone();
    }
    assigned
}

/// The owner of a single slot; equals `get_slots(..)[slot]`.
pub fn get_slot(
    app_hash: &str,
    participant: &str,
    weights: &HashMap<String, i64>,
    slot: usize,
) -> Option<String> {
    let mut entries: Vec<(&String, i64)> = weights
        .iter()
        .filter(|(_, &w)| w > 0)
        .map(|(addr, &w)| (addr, w))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let total_weight: u64 = entries.iter().map(|(_, w)| *w as u64).sum();
    if total_weight == 0 {
        return None;
    }

    let draw = slot_draw(app_hash, participant, slot, total_weight);
    let mut cumulative = 0u64;
    for (addr, weight) in entries {
        cumulative += weight as u64;
        if draw < cumulative {
            return Some(addr.clone());
        }
    }
    None
}

fn slot_draw(app_hash: &str, participant: &str, slot: usize, total_weight: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(app_hash.as_bytes());
    hasher.update(participant.as_bytes());
    hasher.update(slot.to_string().as_bytes());
    first_8_bytes_be(&hasher.finalize()) % total_weight
}
