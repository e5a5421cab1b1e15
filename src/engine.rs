use crate::config::{append_audit_log, load_bracket_setup_from, now_ms, BracketSetup};
use crate::seeding::seed_bracket;
use crate::store::{BracketError, BracketStore};
use crate::types::*;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Thread-safe front door for the embedding service. One engine serializes
/// all bracket writes behind a single lock, so concurrent result saves can
/// never race a parent fixture into existence twice.
pub struct BracketEngine {
    store: SharedBracketStore,
}

impl Default for BracketEngine {
    fn default() -> Self {
        BracketEngine::new()
    }
}

impl BracketEngine {
    pub fn new() -> Self {
        BracketEngine {
            store: Arc::new(Mutex::new(BracketStore::new())),
        }
    }

    pub fn with_store(store: SharedBracketStore) -> Self {
        BracketEngine { store }
    }

    pub fn store(&self) -> SharedBracketStore {
        self.store.clone()
    }

    /// Lock the store, stamp the wall clock, then call `f`. Store mutations
    /// are transactional, so a poisoned lock still guards a coherent store.
    fn with_store_mut<F, R>(&self, f: F) -> Result<R, BracketError>
    where
        F: FnOnce(&mut BracketStore, u64) -> Result<R, BracketError>,
    {
        let now = now_ms();
        let mut guard = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard, now)
    }

    // ── Seeding ─────────────────────────────────────────────────────────

    pub fn seed_bracket(&self, setup: &BracketSetup) -> Result<BracketId, BracketError> {
        let bracket_id = self.with_store_mut(|store, now| seed_bracket(store, setup, now))?;
        append_audit_log(
            "seed_bracket",
            &format!("bracket {bracket_id}: {} ({} teams)", setup.name, setup.teams.len()),
        );
        Ok(bracket_id)
    }

    pub fn seed_bracket_from_file(&self, path: &Path) -> Result<BracketId, BracketError> {
        let setup = load_bracket_setup_from(path)?;
        self.seed_bracket(&setup)
    }

    // ── Match recording ─────────────────────────────────────────────────

    pub fn create_match(&self, aka_team: TeamId, shiro_team: TeamId) -> Result<MatchId, BracketError> {
        self.with_store_mut(|store, now| store.create_match(aka_team, shiro_team, now))
    }

    pub fn start_match(&self, match_id: MatchId) -> Result<(), BracketError> {
        self.with_store_mut(|store, now| store.start_match(match_id, now))
    }

    pub fn finish_match(&self, match_id: MatchId, winner: Side) -> Result<(), BracketError> {
        self.with_store_mut(|store, now| store.finish_match(match_id, winner, now))
    }

    pub fn save_match(&self, match_id: MatchId) -> Result<(), BracketError> {
        self.with_store_mut(|store, now| store.save_match(match_id, now))
    }

    // ── Administration ──────────────────────────────────────────────────

    pub fn delete_node(&self, node_id: NodeId) -> Result<(), BracketError> {
        self.with_store_mut(|store, _| store.delete_node(node_id))?;
        append_audit_log("delete_node", &format!("node {node_id}"));
        Ok(())
    }

    pub fn delete_match(&self, match_id: MatchId) -> Result<(), BracketError> {
        self.with_store_mut(|store, _| store.delete_match(match_id))?;
        append_audit_log("delete_match", &format!("match {match_id}"));
        Ok(())
    }

    pub fn verify_integrity(&self) -> Result<(), BracketError> {
        self.with_store_mut(|store, _| store.verify_integrity())
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn state(&self) -> Result<BracketStateView, BracketError> {
        self.with_store_mut(|store, now| Ok(store.state(now)))
    }

    pub fn state_since(&self, since_ms: Option<u64>) -> Result<BracketStateView, BracketError> {
        self.with_store_mut(|store, now| Ok(store.state_since(now, since_ms)))
    }
}
