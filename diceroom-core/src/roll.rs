//! Roll execution
//!
//! The roller generates every value locally and ships the finished record;
//! receivers never re-roll.

use crate::error::RollError;
use crate::types::{unix_millis, Die, DieResult, PeerId, PeerRoll, RollRecord};
use rand::Rng;
use std::collections::BTreeMap;

/// Uniform value in `1..=sides`
pub fn roll_die<R: Rng + ?Sized>(sides: u8, rng: &mut R) -> u8 {
    rng.gen_range(1..=sides)
}

/// Roll a pool snapshot. Returns `None` for an empty snapshot.
pub fn roll_pool<R: Rng + ?Sized>(dice: &[Die], roller: &str, rng: &mut R) -> Option<RollRecord> {
    let values: Vec<u8> = dice.iter().map(|d| roll_die(d.sides, rng)).collect();
    build_record(dice, roller, &values)
}

/// Build a record from caller-supplied values, one per die in order
pub fn roll_with_values(
    dice: &[Die],
    roller: &str,
    values: &[u8],
) -> Result<Option<RollRecord>, RollError> {
    if values.len() != dice.len() {
        return Err(RollError::ValueCount {
            expected: dice.len(),
            actual: values.len(),
        });
    }
    for (die, &value) in dice.iter().zip(values) {
        if value == 0 || value > die.sides {
            return Err(RollError::ValueOutOfRange {
                sides: die.sides,
                value,
            });
        }
    }
    Ok(build_record(dice, roller, values))
}

fn build_record(dice: &[Die], roller: &str, values: &[u8]) -> Option<RollRecord> {
    if dice.is_empty() {
        return None;
    }

    let mut results_by_peer: BTreeMap<PeerId, PeerRoll> = BTreeMap::new();
    for (die, &value) in dice.iter().zip(values) {
        let entry = results_by_peer.entry(die.peer_id.clone()).or_insert_with(|| PeerRoll {
            player_name: die.player_name.clone(),
            color: die.color.clone(),
            dice: Vec::new(),
            results: Vec::new(),
            total: 0,
        });
        entry.dice.push(die.sides);
        entry.results.push(DieResult {
            sides: die.sides,
            value,
        });
        entry.total += u32::from(value);
    }

    let overall_total = results_by_peer.values().map(|p| p.total).sum();
    let is_group_roll = results_by_peer.len() > 1;

    Some(RollRecord {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: unix_millis(),
        roller: roller.to_string(),
        results_by_peer,
        overall_total,
        is_group_roll,
        rolled_die_ids: dice.iter().map(|d| d.id.clone()).collect(),
    })
}
