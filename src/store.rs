use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BracketError {
  #[error("bracket node {0} has no parent")]
  NoParent(NodeId),
  #[error("bracket node {0} not found")]
  NodeNotFound(NodeId),
  #[error("team match {0} not found")]
  MatchNotFound(MatchId),
  #[error("bracket {0} not found")]
  BracketNotFound(BracketId),
  #[error("team {0} not found")]
  TeamNotFound(TeamId),
  #[error("bracket structure corrupt: {0}")]
  Corrupt(String),
  #[error("invalid bracket setup: {0}")]
  InvalidSetup(String),
  #[error("invalid match transition: {0}")]
  InvalidTransition(String),
}

/// Owns the elimination trees and every record they reference. All writes to
/// bracket-linked matches go through this store so the result listener fires
/// on each save.
#[derive(Clone, Debug, Default)]
pub struct BracketStore {
  brackets: HashMap<BracketId, Bracket>,
  teams: HashMap<TeamId, Team>,
  nodes: HashMap<NodeId, BracketNode>,
  matches: HashMap<MatchId, TeamMatch>,
  node_by_match: HashMap<MatchId, NodeId>,
  next_bracket_id: BracketId,
  next_node_id: NodeId,
  next_match_id: MatchId,
}

impl BracketStore {
  pub fn new() -> Self {
    BracketStore::default()
  }

  // ── Accessors ────────────────────────────────────────────────────────

  pub fn bracket(&self, id: BracketId) -> Option<&Bracket> {
    self.brackets.get(&id)
  }

  pub fn team(&self, id: TeamId) -> Option<&Team> {
    self.teams.get(&id)
  }

  pub fn node(&self, id: NodeId) -> Option<&BracketNode> {
    self.nodes.get(&id)
  }

  pub fn team_match(&self, id: MatchId) -> Option<&TeamMatch> {
    self.matches.get(&id)
  }

  /// The bracket node whose fixture is this match, if any. Group-phase
  /// fights recorded in the same store have no owning node.
  pub fn node_for_match(&self, match_id: MatchId) -> Option<NodeId> {
    self.node_by_match.get(&match_id).copied()
  }

  pub fn nodes_in_bracket(&self, bracket_id: BracketId) -> Vec<&BracketNode> {
    let mut nodes = self
      .nodes
      .values()
      .filter(|n| n.bracket_id == bracket_id)
      .collect::<Vec<_>>();
    nodes.sort_by_key(|n| n.id);
    nodes
  }

  // ── Record creation ──────────────────────────────────────────────────

  /// Register or refresh a team record. Team identity is owned by the
  /// surrounding tournament system; the store only mirrors it.
  pub fn upsert_team(&mut self, team: Team) {
    self.teams.insert(team.id, team);
  }

  pub(crate) fn push_bracket(&mut self, name: String, positions: u32, now_ms: u64) -> BracketId {
    self.next_bracket_id += 1;
    let id = self.next_bracket_id;
    self.brackets.insert(
      id,
      Bracket {
        id,
        name,
        positions,
        created_at_ms: now_ms,
      },
    );
    id
  }

  pub(crate) fn push_node(
    &mut self,
    bracket_id: BracketId,
    match_id: Option<MatchId>,
    prev_aka: Option<NodeId>,
    prev_shiro: Option<NodeId>,
  ) -> NodeId {
    self.next_node_id += 1;
    let id = self.next_node_id;
    self.nodes.insert(
      id,
      BracketNode {
        id,
        bracket_id,
        match_id,
        prev_aka,
        prev_shiro,
      },
    );
    if let Some(match_id) = match_id {
      self.node_by_match.insert(match_id, id);
    }
    id
  }

  pub(crate) fn push_match(&mut self, aka_team: TeamId, shiro_team: TeamId, now_ms: u64) -> MatchId {
    self.next_match_id += 1;
    let id = self.next_match_id;
    self.matches.insert(
      id,
      TeamMatch {
        id,
        aka_team,
        shiro_team,
        winner: None,
        status: MatchStatus::Prepared,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
      },
    );
    id
  }

  pub(crate) fn match_mut(&mut self, id: MatchId) -> Result<&mut TeamMatch, BracketError> {
    self.matches.get_mut(&id).ok_or(BracketError::MatchNotFound(id))
  }

  pub(crate) fn attach_match(&mut self, node_id: NodeId, match_id: MatchId) -> Result<(), BracketError> {
    let node = self
      .nodes
      .get_mut(&node_id)
      .ok_or(BracketError::NodeNotFound(node_id))?;
    node.match_id = Some(match_id);
    self.node_by_match.insert(match_id, node_id);
    Ok(())
  }

  // ── Structural queries ───────────────────────────────────────────────

  /// The unique node consuming this node's winner, and the branch it feeds.
  /// `NoParent` marks the final — an expected terminal, not a fault. A
  /// single-sided or doubly-claimed child is corruption and fails fast.
  pub fn find_parent(&self, node_id: NodeId) -> Result<(NodeId, Side), BracketError> {
    if !self.nodes.contains_key(&node_id) {
      return Err(BracketError::NodeNotFound(node_id));
    }
    let mut found: Option<(NodeId, Side)> = None;
    for node in self.nodes.values() {
      let Some(side) = node.side_of(node_id) else {
        continue;
      };
      if node.prev(side.other()).is_none() {
        return Err(BracketError::Corrupt(format!(
          "node {} links child {} on one branch only",
          node.id, node_id
        )));
      }
      if let Some((other_parent, _)) = found {
        return Err(BracketError::Corrupt(format!(
          "nodes {} and {} both claim child {}",
          other_parent, node.id, node_id
        )));
      }
      found = Some((node.id, side));
    }
    found.ok_or(BracketError::NoParent(node_id))
  }

  /// The other child of an already-located parent.
  pub fn sibling_of(&self, node_id: NodeId, parent_id: NodeId) -> Result<NodeId, BracketError> {
    let parent = self
      .nodes
      .get(&parent_id)
      .ok_or(BracketError::NodeNotFound(parent_id))?;
    let side = parent.side_of(node_id).ok_or_else(|| {
      BracketError::Corrupt(format!("node {node_id} is not a child of node {parent_id}"))
    })?;
    let sibling = parent.prev(side.other()).ok_or_else(|| {
      BracketError::Corrupt(format!("node {parent_id} links child {node_id} on one branch only"))
    })?;
    if sibling == node_id {
      return Err(BracketError::Corrupt(format!(
        "node {parent_id} links node {node_id} on both branches"
      )));
    }
    Ok(sibling)
  }

  // ── Deletion cascades ────────────────────────────────────────────────

  /// Remove a node and its fixture. Parents referencing the node keep their
  /// other links; the dangling child link is nulled. Children are untouched.
  pub fn delete_node(&mut self, node_id: NodeId) -> Result<(), BracketError> {
    let node = self
      .nodes
      .remove(&node_id)
      .ok_or(BracketError::NodeNotFound(node_id))?;
    for other in self.nodes.values_mut() {
      if other.prev_aka == Some(node_id) {
        other.prev_aka = None;
      }
      if other.prev_shiro == Some(node_id) {
        other.prev_shiro = None;
      }
    }
    if let Some(match_id) = node.match_id {
      self.matches.remove(&match_id);
      self.node_by_match.remove(&match_id);
    }
    Ok(())
  }

  /// Remove a match. A match owned by a bracket node takes that node with it
  /// (one hop; parents further up are never deleted).
  pub fn delete_match(&mut self, match_id: MatchId) -> Result<(), BracketError> {
    if !self.matches.contains_key(&match_id) {
      return Err(BracketError::MatchNotFound(match_id));
    }
    match self.node_by_match.get(&match_id).copied() {
      Some(node_id) => self.delete_node(node_id),
      None => {
        self.matches.remove(&match_id);
        Ok(())
      }
    }
  }

  // ── Integrity ────────────────────────────────────────────────────────

  /// Full-store structural check. Propagation fails fast on the subset of
  /// these it touches; this walks everything, for admin tooling and tests.
  pub fn verify_integrity(&self) -> Result<(), BracketError> {
    let mut claimed: HashMap<NodeId, NodeId> = HashMap::new();
    for node in self.nodes.values() {
      if node.prev_aka.is_some() != node.prev_shiro.is_some() {
        return Err(BracketError::Corrupt(format!(
          "node {} has exactly one child link",
          node.id
        )));
      }
      if node.prev_aka.is_some() && node.prev_aka == node.prev_shiro {
        return Err(BracketError::Corrupt(format!(
          "node {} links the same child on both branches",
          node.id
        )));
      }
      for side in [Side::Aka, Side::Shiro] {
        let Some(child) = node.prev(side) else {
          continue;
        };
        let Some(child_node) = self.nodes.get(&child) else {
          return Err(BracketError::Corrupt(format!(
            "node {} links missing child {}",
            node.id, child
          )));
        };
        if child_node.bracket_id != node.bracket_id {
          return Err(BracketError::Corrupt(format!(
            "node {} links child {} from another bracket",
            node.id, child
          )));
        }
        if let Some(other_parent) = claimed.insert(child, node.id) {
          return Err(BracketError::Corrupt(format!(
            "nodes {} and {} both claim child {}",
            other_parent, node.id, child
          )));
        }
      }
      if let Some(match_id) = node.match_id {
        if !self.matches.contains_key(&match_id) {
          return Err(BracketError::Corrupt(format!(
            "node {} references missing match {}",
            node.id, match_id
          )));
        }
        if self.node_by_match.get(&match_id) != Some(&node.id) {
          return Err(BracketError::Corrupt(format!(
            "match {} is not indexed to node {}",
            match_id, node.id
          )));
        }
      }
    }
    Ok(())
  }

  // ── Transactions ─────────────────────────────────────────────────────

  /// Run a mutation against a copy of the store and swap it in on success.
  /// A failing mutation leaves the store exactly as it was.
  pub(crate) fn commit<R>(
    &mut self,
    f: impl FnOnce(&mut BracketStore) -> Result<R, BracketError>,
  ) -> Result<R, BracketError> {
    let mut next = self.clone();
    match f(&mut next) {
      Ok(out) => {
        *self = next;
        Ok(out)
      }
      Err(e) => {
        warn!("bracket transaction rolled back: {e}");
        Err(e)
      }
    }
  }

  // ── Snapshots ────────────────────────────────────────────────────────

  pub fn state(&self, now_ms: u64) -> BracketStateView {
    self.state_since(now_ms, None)
  }

  /// Snapshot for presentation layers. With `since_ms`, only matches touched
  /// after that instant are included and the team list is elided.
  pub fn state_since(&self, now_ms: u64, since_ms: Option<u64>) -> BracketStateView {
    let mut brackets = self
      .brackets
      .values()
      .map(|b| BracketView {
        id: b.id,
        name: b.name.clone(),
        positions: b.positions,
      })
      .collect::<Vec<_>>();
    brackets.sort_by_key(|b| b.id);

    let mut teams = self
      .teams
      .values()
      .map(|t| TeamView {
        id: t.id,
        name: t.name.clone(),
        seed: t.seed,
      })
      .collect::<Vec<_>>();
    teams.sort_by_key(|t| t.seed);

    let mut nodes = self
      .nodes
      .values()
      .map(|n| BracketNodeView {
        id: n.id,
        bracket_id: n.bracket_id,
        match_id: n.match_id,
        prev_aka: n.prev_aka,
        prev_shiro: n.prev_shiro,
      })
      .collect::<Vec<_>>();
    nodes.sort_by_key(|n| n.id);

    let mut matches = self
      .matches
      .values()
      .map(|m| TeamMatchView {
        id: m.id,
        aka_team: m.aka_team,
        shiro_team: m.shiro_team,
        winner: m.winner,
        status: m.status,
        updated_at_ms: m.updated_at_ms,
      })
      .collect::<Vec<_>>();
    matches.sort_by_key(|m| m.id);

    let mut view = BracketStateView {
      brackets,
      teams,
      nodes,
      matches,
      generated_at: DateTime::<Utc>::from_timestamp_millis(now_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default(),
      now_ms,
    };
    if let Some(since) = since_ms {
      if since > 0 {
        view.matches.retain(|m| m.updated_at_ms > since);
        view.teams = Vec::new();
      }
    }
    view
  }
}
