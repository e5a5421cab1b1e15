use crate::store::{BracketError, BracketStore};
use crate::types::*;
use tracing::{debug, info, warn};

impl BracketStore {
  // ── Match recording ──────────────────────────────────────────────────

  /// Create a standalone match. Fixtures inside a bracket are created by
  /// seeding or by propagation itself; this is for fights outside any
  /// elimination tree (a round-robin pool, a friendly).
  pub fn create_match(
    &mut self,
    aka_team: TeamId,
    shiro_team: TeamId,
    now_ms: u64,
  ) -> Result<MatchId, BracketError> {
    self.commit(|next| {
      let match_id = next.push_match(aka_team, shiro_team, now_ms);
      next.match_saved(match_id, now_ms)?;
      Ok(match_id)
    })
  }

  pub fn start_match(&mut self, match_id: MatchId, now_ms: u64) -> Result<(), BracketError> {
    self.commit(|next| {
      let team_match = next.match_mut(match_id)?;
      match team_match.status {
        MatchStatus::Prepared => {}
        MatchStatus::Started => {
          return Err(BracketError::InvalidTransition(format!(
            "match {match_id} has already started"
          )));
        }
        MatchStatus::Finished => {
          return Err(BracketError::InvalidTransition(format!(
            "match {match_id} is already finished"
          )));
        }
      }
      team_match.status = MatchStatus::Started;
      team_match.updated_at_ms = now_ms;
      next.match_saved(match_id, now_ms)
    })
  }

  /// Record a winner and mark the match finished. Recording again on a
  /// finished match is allowed: an overturned result re-propagates the
  /// corrected winner into the parent fixture.
  pub fn finish_match(
    &mut self,
    match_id: MatchId,
    winner: Side,
    now_ms: u64,
  ) -> Result<(), BracketError> {
    self.commit(|next| {
      let team_match = next.match_mut(match_id)?;
      team_match.winner = Some(winner);
      team_match.status = MatchStatus::Finished;
      team_match.updated_at_ms = now_ms;
      next.match_saved(match_id, now_ms)
    })
  }

  /// Notify the listener about a match row written by an outside
  /// collaborator. No fields are touched here.
  pub fn save_match(&mut self, match_id: MatchId, now_ms: u64) -> Result<(), BracketError> {
    self.commit(|next| next.match_saved(match_id, now_ms))
  }

  // ── Result listener ──────────────────────────────────────────────────

  /// Runs once per save of a match, in the same transaction as the save.
  /// Matches with no owning bracket node are ignored.
  pub(crate) fn match_saved(&mut self, match_id: MatchId, now_ms: u64) -> Result<(), BracketError> {
    if self.team_match(match_id).is_none() {
      return Err(BracketError::MatchNotFound(match_id));
    }
    let Some(node_id) = self.node_for_match(match_id) else {
      debug!(match_id, "saved match is not a bracket fixture");
      return Ok(());
    };
    self.propagate(node_id, now_ms)
  }

  // ── Propagation ──────────────────────────────────────────────────────

  /// Walk from a node toward the final, advancing winners. Each hop either
  /// materializes the parent fixture (both inputs decided for the first
  /// time) or patches the one slot this node feeds. Creating or patching a
  /// fixture counts as saving it, so the walk continues from the parent
  /// until a gate stops it.
  fn propagate(&mut self, start: NodeId, now_ms: u64) -> Result<(), BracketError> {
    let mut current = start;
    loop {
      let Some(winner_team) = self.node_winner_team(current)? else {
        // own match absent or undecided; a later save re-enters from here
        return Ok(());
      };
      let (parent_id, side) = match self.find_parent(current) {
        Ok(found) => found,
        Err(BracketError::NoParent(_)) => {
          debug!(node = current, "final decided; nothing above to advance");
          return Ok(());
        }
        Err(e) => return Err(e),
      };
      let sibling_id = self.sibling_of(current, parent_id)?;
      let Some(sibling_winner) = self.node_winner_team(sibling_id)? else {
        debug!(
          node = current,
          sibling = sibling_id,
          "sibling undecided; parent fixture waits"
        );
        return Ok(());
      };

      let parent_match = self.node(parent_id).and_then(|n| n.match_id);
      match parent_match {
        None => {
          // both inputs decided for the first time
          let (aka_team, shiro_team) = match side {
            Side::Aka => (winner_team, sibling_winner),
            Side::Shiro => (sibling_winner, winner_team),
          };
          let match_id = self.push_match(aka_team, shiro_team, now_ms);
          self.attach_match(parent_id, match_id)?;
          info!(
            node = parent_id,
            match_id, aka_team, shiro_team, "materialized parent fixture"
          );
        }
        Some(match_id) => {
          let decided = {
            let team_match = self.match_mut(match_id)?;
            if team_match.team_on(side) == winner_team {
              debug!(node = parent_id, match_id, "parent slot already current");
              return Ok(());
            }
            let decided = team_match.winner.is_some();
            match side {
              Side::Aka => team_match.aka_team = winner_team,
              Side::Shiro => team_match.shiro_team = winner_team,
            }
            team_match.updated_at_ms = now_ms;
            decided
          };
          if decided {
            // the parent already has its own result; only the team link is
            // corrected, the recorded outcome is not rewound
            warn!(
              match_id,
              team = winner_team,
              "patched a slot on an already-decided match"
            );
          }
          debug!(node = parent_id, match_id, team = winner_team, "updated parent fixture slot");
        }
      }
      current = parent_id;
    }
  }

  /// The winning team at a node, or `None` while the node has no fixture or
  /// its fixture is undecided.
  fn node_winner_team(&self, node_id: NodeId) -> Result<Option<TeamId>, BracketError> {
    let node = self.node(node_id).ok_or(BracketError::NodeNotFound(node_id))?;
    let Some(match_id) = node.match_id else {
      return Ok(None);
    };
    let team_match = self
      .team_match(match_id)
      .ok_or(BracketError::MatchNotFound(match_id))?;
    Ok(team_match.winner_team())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Teams 1-4 on leaves A (1v2) and B (3v4) under one final node.
  struct FourTeam {
    store: BracketStore,
    m1: MatchId,
    m2: MatchId,
    leaf_a: NodeId,
    leaf_b: NodeId,
    root: NodeId,
  }

  fn make_four_team() -> FourTeam {
    let mut store = BracketStore::new();
    let bracket_id = store.push_bracket("Cup".to_string(), 4, 0);
    let m1 = store.push_match(1, 2, 0);
    let m2 = store.push_match(3, 4, 0);
    let leaf_a = store.push_node(bracket_id, Some(m1), None, None);
    let leaf_b = store.push_node(bracket_id, Some(m2), None, None);
    let root = store.push_node(bracket_id, None, Some(leaf_a), Some(leaf_b));
    FourTeam { store, m1, m2, leaf_a, leaf_b, root }
  }

  // Teams 1-8 over three rounds; only the leaf fixtures exist at first.
  struct EightTeam {
    store: BracketStore,
    round_one: [MatchId; 4],
    semis: [NodeId; 2],
    root: NodeId,
  }

  fn make_eight_team() -> EightTeam {
    let mut store = BracketStore::new();
    let bracket_id = store.push_bracket("Cup".to_string(), 8, 0);
    let mut round_one = [0u64; 4];
    let mut leaves = [0u64; 4];
    for (i, pair) in [(1, 2), (3, 4), (5, 6), (7, 8)].iter().enumerate() {
      let match_id = store.push_match(pair.0, pair.1, 0);
      round_one[i] = match_id;
      leaves[i] = store.push_node(bracket_id, Some(match_id), None, None);
    }
    let semi_a = store.push_node(bracket_id, None, Some(leaves[0]), Some(leaves[1]));
    let semi_b = store.push_node(bracket_id, None, Some(leaves[2]), Some(leaves[3]));
    let root = store.push_node(bracket_id, None, Some(semi_a), Some(semi_b));
    EightTeam { store, round_one, semis: [semi_a, semi_b], root }
  }

  fn parent_match(store: &BracketStore, node: NodeId) -> Option<TeamMatch> {
    store
      .node(node)
      .and_then(|n| n.match_id)
      .and_then(|id| store.team_match(id))
      .cloned()
  }

  #[test]
  fn test_single_decided_child_does_not_create_parent() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    assert!(parent_match(&fixture.store, fixture.root).is_none());
  }

  #[test]
  fn test_both_children_decided_materializes_parent() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();

    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!(final_match.aka_team, 1);
    assert_eq!(final_match.shiro_team, 4);
    assert_eq!(final_match.winner, None);
    assert_eq!(final_match.status, MatchStatus::Prepared);
  }

  #[test]
  fn test_arrival_order_does_not_change_parent() {
    let mut forward = make_four_team();
    forward.store.finish_match(forward.m1, Side::Aka, 10).unwrap();
    forward.store.finish_match(forward.m2, Side::Shiro, 20).unwrap();

    let mut reverse = make_four_team();
    reverse.store.finish_match(reverse.m2, Side::Shiro, 10).unwrap();
    reverse.store.finish_match(reverse.m1, Side::Aka, 20).unwrap();

    let forward_final = parent_match(&forward.store, forward.root).unwrap();
    let reverse_final = parent_match(&reverse.store, reverse.root).unwrap();
    assert_eq!(forward_final.aka_team, reverse_final.aka_team);
    assert_eq!(forward_final.shiro_team, reverse_final.shiro_team);
  }

  #[test]
  fn test_final_result_is_terminal() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();
    let nodes_before = fixture.store.state(0).nodes.len();

    let final_id = fixture.store.node(fixture.root).unwrap().match_id.unwrap();
    fixture.store.finish_match(final_id, Side::Aka, 30).unwrap();

    assert_eq!(fixture.store.state(0).nodes.len(), nodes_before);
    let final_match = fixture.store.team_match(final_id).unwrap();
    assert_eq!(final_match.winner, Some(Side::Aka));
  }

  #[test]
  fn test_overturn_patches_only_triggering_slot() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();

    // team 2 wins the protest
    fixture.store.finish_match(fixture.m1, Side::Shiro, 30).unwrap();

    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!(final_match.aka_team, 2);
    assert_eq!(final_match.shiro_team, 4);
  }

  #[test]
  fn test_save_without_winner_does_not_propagate() {
    let mut fixture = make_four_team();
    fixture.store.start_match(fixture.m1, 10).unwrap();
    fixture.store.save_match(fixture.m2, 20).unwrap();
    assert!(parent_match(&fixture.store, fixture.root).is_none());
  }

  #[test]
  fn test_match_outside_bracket_is_ignored() {
    let mut fixture = make_four_team();
    let pool_fight = fixture.store.create_match(7, 8, 5).unwrap();
    fixture.store.finish_match(pool_fight, Side::Aka, 10).unwrap();

    assert!(parent_match(&fixture.store, fixture.root).is_none());
    assert_eq!(fixture.store.node_for_match(pool_fight), None);
  }

  #[test]
  fn test_multi_level_propagation() {
    let mut fixture = make_eight_team();
    // winners: 1, 4, 5, 8
    let winners = [Side::Aka, Side::Shiro, Side::Aka, Side::Shiro];
    for (match_id, side) in fixture.round_one.iter().zip(winners) {
      fixture.store.finish_match(*match_id, side, 10).unwrap();
    }

    let semi_a = parent_match(&fixture.store, fixture.semis[0]).unwrap();
    let semi_b = parent_match(&fixture.store, fixture.semis[1]).unwrap();
    assert_eq!((semi_a.aka_team, semi_a.shiro_team), (1, 4));
    assert_eq!((semi_b.aka_team, semi_b.shiro_team), (5, 8));
    // the final waits for both semi results
    assert!(parent_match(&fixture.store, fixture.root).is_none());

    fixture.store.finish_match(semi_a.id, Side::Aka, 20).unwrap();
    assert!(parent_match(&fixture.store, fixture.root).is_none());
    fixture.store.finish_match(semi_b.id, Side::Shiro, 30).unwrap();

    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!((final_match.aka_team, final_match.shiro_team), (1, 8));
  }

  #[test]
  fn test_overturn_cascades_through_decided_rounds() {
    let mut fixture = make_eight_team();
    for match_id in fixture.round_one {
      fixture.store.finish_match(match_id, Side::Aka, 10).unwrap();
    }
    let semi_a = parent_match(&fixture.store, fixture.semis[0]).unwrap();
    let semi_b = parent_match(&fixture.store, fixture.semis[1]).unwrap();
    fixture.store.finish_match(semi_a.id, Side::Aka, 20).unwrap();
    fixture.store.finish_match(semi_b.id, Side::Aka, 20).unwrap();
    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!((final_match.aka_team, final_match.shiro_team), (1, 5));

    // team 2 is reinstated in round one; the semi slot and, because the
    // semi's own aka-side result stands, the final slot both follow
    fixture.store.finish_match(fixture.round_one[0], Side::Shiro, 40).unwrap();

    let semi_a = parent_match(&fixture.store, fixture.semis[0]).unwrap();
    assert_eq!(semi_a.aka_team, 2);
    assert_eq!(semi_a.winner, Some(Side::Aka));
    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!(final_match.aka_team, 2);
    assert_eq!(final_match.shiro_team, 5);
  }

  #[test]
  fn test_idempotent_resave_of_decided_match() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();
    let before = parent_match(&fixture.store, fixture.root).unwrap();

    fixture.store.save_match(fixture.m1, 30).unwrap();

    let after = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!(before, after);
  }

  #[test]
  fn test_corrupt_tree_rolls_back_result() {
    let mut fixture = make_four_team();
    // a second node claims leaf A as a child
    let bracket_id = fixture.store.node(fixture.leaf_a).unwrap().bracket_id;
    fixture
      .store
      .push_node(bracket_id, None, Some(fixture.leaf_a), Some(fixture.leaf_b));

    let result = fixture.store.finish_match(fixture.m1, Side::Aka, 10);
    assert!(matches!(result, Err(BracketError::Corrupt(_))));
    // the triggering save rolled back with the propagation
    let m1 = fixture.store.team_match(fixture.m1).unwrap();
    assert_eq!(m1.winner, None);
    assert_eq!(m1.status, MatchStatus::Prepared);
  }

  #[test]
  fn test_delete_materialized_final_node_removes_its_match() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();
    let final_id = fixture.store.node(fixture.root).unwrap().match_id.unwrap();

    fixture.store.delete_node(fixture.root).unwrap();
    assert!(fixture.store.team_match(final_id).is_none());
    // children and their fixtures are untouched
    assert!(fixture.store.node(fixture.leaf_a).is_some());
    assert!(fixture.store.team_match(fixture.m1).is_some());
  }

  #[test]
  fn test_delete_leaf_match_leaves_materialized_final_intact() {
    let mut fixture = make_four_team();
    fixture.store.finish_match(fixture.m1, Side::Aka, 10).unwrap();
    fixture.store.finish_match(fixture.m2, Side::Shiro, 20).unwrap();

    fixture.store.delete_match(fixture.m1).unwrap();
    assert!(fixture.store.node(fixture.leaf_a).is_none());
    let final_match = parent_match(&fixture.store, fixture.root).unwrap();
    assert_eq!((final_match.aka_team, final_match.shiro_team), (1, 4));
  }

  #[test]
  fn test_start_match_transitions() {
    let mut fixture = make_four_team();
    fixture.store.start_match(fixture.m1, 10).unwrap();
    assert!(matches!(
      fixture.store.start_match(fixture.m1, 20),
      Err(BracketError::InvalidTransition(_))
    ));
    fixture.store.finish_match(fixture.m1, Side::Aka, 30).unwrap();
    assert!(matches!(
      fixture.store.start_match(fixture.m1, 40),
      Err(BracketError::InvalidTransition(_))
    ));
  }
}
