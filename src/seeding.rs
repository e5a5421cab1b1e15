use crate::config::{normalize_teams, BracketSetup};
use crate::store::{BracketError, BracketStore};
use crate::types::*;
use tracing::info;

/// Bracket position for each seed rank, top to bottom: rank 1 meets the
/// lowest rank, and the top two ranks land in opposite halves.
pub fn seed_positions(size: u32) -> Vec<u32> {
  let mut seeds = vec![1u32];
  while seeds.len() < size as usize {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}

/// Create a fully seeded elimination bracket: first-round matches on the
/// leaves, interior nodes up to the final with no fixture yet. Fixtures
/// above round one materialize through propagation as results come in.
pub fn seed_bracket(
  store: &mut BracketStore,
  setup: &BracketSetup,
  now_ms: u64,
) -> Result<BracketId, BracketError> {
  let teams = normalize_teams(&setup.teams)?;
  if teams.len() < 2 {
    return Err(BracketError::InvalidSetup(
      "A bracket needs at least two teams.".to_string(),
    ));
  }
  if !teams.len().is_power_of_two() {
    return Err(BracketError::InvalidSetup(format!(
      "A bracket needs a power-of-two team count, got {}.",
      teams.len()
    )));
  }

  let positions = teams.len() as u32;
  let name = setup.name.clone();
  store.commit(move |next| {
    for team in &teams {
      next.upsert_team(team.clone());
    }
    let bracket_id = next.push_bracket(name, positions, now_ms);

    // teams is sorted by seed; pairing goes by rank within this bracket
    let order = seed_positions(positions);
    let mut round = Vec::with_capacity(teams.len() / 2);
    let mut first_round_matches = Vec::with_capacity(teams.len() / 2);
    for i in 0..teams.len() / 2 {
      let aka = &teams[order[i * 2] as usize - 1];
      let shiro = &teams[order[i * 2 + 1] as usize - 1];
      let match_id = next.push_match(aka.id, shiro.id, now_ms);
      round.push(next.push_node(bracket_id, Some(match_id), None, None));
      first_round_matches.push(match_id);
    }

    while round.len() > 1 {
      let mut upper = Vec::with_capacity(round.len() / 2);
      for pair in round.chunks(2) {
        upper.push(next.push_node(bracket_id, None, Some(pair[0]), Some(pair[1])));
      }
      round = upper;
    }

    // creating a first-round fixture counts as saving it
    for match_id in first_round_matches {
      next.match_saved(match_id, now_ms)?;
    }

    info!(bracket_id, positions, "seeded elimination bracket");
    Ok(bracket_id)
  })
}
