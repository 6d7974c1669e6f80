//! Role assignment
//!
//! Casting is always recomputed from scratch. Manual overrides are applied
//! first; the remaining parts go, in the order they first speak, to whichever
//! actor currently carries the fewest cues (earliest joiner wins ties).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{Actor, ActorIdentity, PartId, Script};

/// Part to actor map as broadcast when the show begins
pub type ActorsByPart = BTreeMap<PartId, ActorIdentity>;

/// Bidirectional mapping between actors and parts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Casting {
    pub parts_by_actor: BTreeMap<ActorIdentity, Vec<PartId>>,
    /// Every part in the script; `None` when nobody plays it
    pub actors_by_part: BTreeMap<PartId, Option<ActorIdentity>>,
}

impl Casting {
    pub fn actor_for(&self, part: &str) -> Option<&ActorIdentity> {
        self.actors_by_part.get(part).and_then(Option::as_ref)
    }

    pub fn parts_for(&self, actor: &str) -> &[PartId] {
        self.parts_by_actor
            .get(actor)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Assigned parts only, in the form carried by `BeginShow`
    pub fn broadcast_form(&self) -> ActorsByPart {
        self.actors_by_part
            .iter()
            .filter_map(|(part, actor)| actor.as_ref().map(|a| (part.clone(), a.clone())))
            .collect()
    }

    /// Parts nobody plays
    pub fn uncast_parts(&self) -> Vec<PartId> {
        self.actors_by_part
            .iter()
            .filter(|(_, actor)| actor.is_none())
            .map(|(part, _)| part.clone())
            .collect()
    }
}

/// Assign parts to actors.
///
/// Deterministic for identical inputs, including roster order. Overrides
/// naming a part absent from the script are ignored.
pub fn cast(
    script: &Script,
    actors: &[Actor],
    manual_overrides: &BTreeMap<PartId, ActorIdentity>,
    auto_cast: bool,
) -> Casting {
    let cue_counts = script.cue_counts();
    let count_of: HashMap<&str, usize> = cue_counts
        .iter()
        .map(|(part, count)| (part.as_str(), *count))
        .collect();

    let mut parts_by_actor: BTreeMap<ActorIdentity, Vec<PartId>> = actors
        .iter()
        .map(|a| (a.identity.clone(), Vec::new()))
        .collect();

    // Overrides win unconditionally
    for (part, _) in &cue_counts {
        if let Some(actor) = manual_overrides.get(part) {
            parts_by_actor
                .entry(actor.clone())
                .or_default()
                .push(part.clone());
        }
    }

    if auto_cast && !actors.is_empty() {
        // Load per roster actor, kept in roster order for tie-breaking
        let mut loads: Vec<usize> = actors
            .iter()
            .map(|a| {
                parts_by_actor[&a.identity]
                    .iter()
                    .map(|p| count_of.get(p.as_str()).copied().unwrap_or(0))
                    .sum()
            })
            .collect();

        for (part, count) in &cue_counts {
            if manual_overrides.contains_key(part) {
                continue;
            }

            let mut lightest = 0;
            for (i, load) in loads.iter().enumerate() {
                if *load < loads[lightest] {
                    lightest = i;
                }
            }

            loads[lightest] += count;
            if let Some(parts) = parts_by_actor.get_mut(&actors[lightest].identity) {
                parts.push(part.clone());
            }
        }
    }

    let mut actors_by_part: BTreeMap<PartId, Option<ActorIdentity>> = cue_counts
        .iter()
        .map(|(part, _)| (part.clone(), None))
        .collect();
    for (actor, parts) in &parts_by_actor {
        for part in parts {
            actors_by_part.insert(part.clone(), Some(actor.clone()));
        }
    }

    Casting {
        parts_by_actor,
        actors_by_part,
    }
}
