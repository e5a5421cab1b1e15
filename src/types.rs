use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::store::BracketStore;

// ── Id aliases ─────────────────────────────────────────────────────────

pub type BracketId = u32;
pub type TeamId = u32;
pub type NodeId = u64;
pub type MatchId = u64;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedBracketStore = Arc<Mutex<BracketStore>>;

// ── Match sides ────────────────────────────────────────────────────────

/// The two fixed corners of a match. Aka feeds the `prev_aka` branch of a
/// bracket node, shiro the `prev_shiro` branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Aka,
    Shiro,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Aka => Side::Shiro,
            Side::Shiro => Side::Aka,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    Prepared,
    Started,
    Finished,
}

// ── Store records ──────────────────────────────────────────────────────

/// A match between two teams. `winner` stays `None` until a result is
/// recorded; propagation keys on it and never consults `status`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamMatch {
    pub id: MatchId,
    pub aka_team: TeamId,
    pub shiro_team: TeamId,
    pub winner: Option<Side>,
    pub status: MatchStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl TeamMatch {
    pub fn team_on(&self, side: Side) -> TeamId {
        match side {
            Side::Aka => self.aka_team,
            Side::Shiro => self.shiro_team,
        }
    }

    /// The winning team, or `None` while the match is undecided.
    pub fn winner_team(&self) -> Option<TeamId> {
        self.winner.map(|side| self.team_on(side))
    }
}

/// One slot in the elimination tree. Leaves have neither `prev_*` link;
/// interior nodes have both. `match_id` is absent until the node's fixture
/// has been materialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BracketNode {
    pub id: NodeId,
    pub bracket_id: BracketId,
    pub match_id: Option<MatchId>,
    pub prev_aka: Option<NodeId>,
    pub prev_shiro: Option<NodeId>,
}

impl BracketNode {
    pub fn is_leaf(&self) -> bool {
        self.prev_aka.is_none() && self.prev_shiro.is_none()
    }

    pub fn prev(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Aka => self.prev_aka,
            Side::Shiro => self.prev_shiro,
        }
    }

    /// Which branch `child` feeds, if it is one of this node's children.
    pub fn side_of(&self, child: NodeId) -> Option<Side> {
        if self.prev_aka == Some(child) {
            Some(Side::Aka)
        } else if self.prev_shiro == Some(child) {
            Some(Side::Shiro)
        } else {
            None
        }
    }
}

/// A single-elimination phase with a fixed power-of-two starting capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bracket {
    pub id: BracketId,
    pub name: String,
    pub positions: u32,
    pub created_at_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub seed: u32,
}

// ── Snapshot views ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketView {
    pub id: BracketId,
    pub name: String,
    pub positions: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: TeamId,
    pub name: String,
    pub seed: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketNodeView {
    pub id: NodeId,
    pub bracket_id: BracketId,
    pub match_id: Option<MatchId>,
    pub prev_aka: Option<NodeId>,
    pub prev_shiro: Option<NodeId>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMatchView {
    pub id: MatchId,
    pub aka_team: TeamId,
    pub shiro_team: TeamId,
    pub winner: Option<Side>,
    pub status: MatchStatus,
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketStateView {
    pub brackets: Vec<BracketView>,
    pub teams: Vec<TeamView>,
    pub nodes: Vec<BracketNodeView>,
    pub matches: Vec<TeamMatchView>,
    pub generated_at: String,
    pub now_ms: u64,
}
