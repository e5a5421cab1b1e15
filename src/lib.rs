pub mod config;
pub mod engine;
pub mod logging;
pub mod seeding;
pub mod store;
pub mod types;
mod propagation;

pub use engine::BracketEngine;
pub use store::{BracketError, BracketStore};
pub use types::{
    Bracket, BracketId, BracketNode, BracketStateView, MatchId, MatchStatus, NodeId,
    SharedBracketStore, Side, Team, TeamId, TeamMatch,
};
