use crate::store::BracketError;
use crate::types::*;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
  collections::HashSet,
  env, fs,
  io::Write,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

// ── Clock ──────────────────────────────────────────────────────────────

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

// ── Bracket setup files ────────────────────────────────────────────────

/// One team entry in a bracket setup file. A missing or clashing seed is
/// filled from the lowest free seed number.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSetup {
  pub id: TeamId,
  pub name: String,
  pub seed: Option<u32>,
}

/// A seeding request for one elimination bracket, usually loaded from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSetup {
  pub name: String,
  pub teams: Vec<TeamSetup>,
}

pub fn bracket_setup_path() -> Option<PathBuf> {
  let raw = env::var("SHIAI_BRACKET_SETUP_PATH").ok()?;
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(PathBuf::from(trimmed))
}

pub fn load_bracket_setup() -> Result<BracketSetup, BracketError> {
  let path = bracket_setup_path().ok_or_else(|| {
    BracketError::InvalidSetup("SHIAI_BRACKET_SETUP_PATH is not set.".to_string())
  })?;
  load_bracket_setup_from(&path)
}

pub fn load_bracket_setup_from(path: &Path) -> Result<BracketSetup, BracketError> {
  let data = fs::read_to_string(path).map_err(|e| {
    BracketError::InvalidSetup(format!("read bracket setup {}: {e}", path.display()))
  })?;
  serde_json::from_str::<BracketSetup>(&data).map_err(|e| {
    BracketError::InvalidSetup(format!("parse bracket setup {}: {e}", path.display()))
  })
}

/// Validate a setup's team list and assign any missing seeds. Returned teams
/// are sorted by seed.
pub fn normalize_teams(setup_teams: &[TeamSetup]) -> Result<Vec<Team>, BracketError> {
  if setup_teams.is_empty() {
    return Err(BracketError::InvalidSetup(
      "No teams provided for bracket setup.".to_string(),
    ));
  }

  let mut seen_ids = HashSet::new();
  for team in setup_teams {
    if !seen_ids.insert(team.id) {
      return Err(BracketError::InvalidSetup(format!(
        "Duplicate team id {} in bracket setup.",
        team.id
      )));
    }
  }

  let mut used_seeds = HashSet::new();
  let mut assigned: Vec<(TeamSetup, u32)> = Vec::with_capacity(setup_teams.len());
  for team in setup_teams {
    let seed = team.seed.filter(|s| *s > 0 && !used_seeds.contains(s));
    let final_seed = if let Some(seed) = seed {
      used_seeds.insert(seed);
      seed
    } else {
      0
    };
    assigned.push((team.clone(), final_seed));
  }

  let mut next_seed = 1u32;
  for (_, seed) in assigned.iter_mut() {
    if *seed != 0 {
      continue;
    }
    while used_seeds.contains(&next_seed) {
      next_seed += 1;
    }
    *seed = next_seed;
    used_seeds.insert(next_seed);
    next_seed += 1;
  }

  let mut teams = assigned
    .into_iter()
    .map(|(team, seed)| Team {
      id: team.id,
      name: team.name,
      seed,
    })
    .collect::<Vec<_>>();
  teams.sort_by_key(|t| t.seed);
  Ok(teams)
}

// ── Audit log ──────────────────────────────────────────────────────────

pub fn audit_logs_dir() -> Option<PathBuf> {
  let raw = env::var("SHIAI_LOGS_DIR").ok()?;
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(PathBuf::from(trimmed))
}

/// Append a timestamped entry to the bracket audit log. A missing or
/// unwritable log directory silently disables auditing.
pub fn append_audit_log(label: &str, payload: &str) {
  let Some(dir) = audit_logs_dir() else {
    return;
  };
  if fs::create_dir_all(&dir).is_err() {
    return;
  }
  let path = dir.join("bracket_audit.log");
  let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
  let entry = format!("[{timestamp}] {label}\n{payload}\n\n");
  if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&path) {
    let _ = file.write_all(entry.as_bytes());
  }
}
