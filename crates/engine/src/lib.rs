//! Core of the Warboard planner: map placements, team groups, freehand
//! drawings and their persistence. Everything here is UI-agnostic; adapters
//! drive a [`Session`] and render what it exposes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

mod board;
mod clock;
mod drawing;
mod error;
mod grouping;
mod persist;
mod roster;
mod session;
pub mod store;
mod teams;

pub use board::Board;
pub use clock::{Clock, ManualClock, SystemClock};
pub use drawing::{Drawing, HistoryStep};
pub use error::{BoardError, BoardResult};
pub use grouping::GroupChange;
pub use persist::{board_document, export_document, parse_import, restore_board, ImportedBoard};
pub use roster::Roster;
pub use session::Session;
pub use store::{KvStore, MemoryStore, SqliteStore};
pub use teams::TeamNames;

/// Individual placements plus group members.
pub const MAX_PLAYERS: usize = 30;
pub const MAX_ENEMIES: u32 = 30;
pub const ENEMIES_PER_GROUP: u32 = 5;
/// Group centers closer than this merge.
pub const GROUP_MERGE_DISTANCE: f64 = 80.0;
/// A new team group is drawn at `(x + 21, y - 21)` from the drop point.
pub const TEAM_DROP_OFFSET: f64 = 21.0;
pub const SPLIT_MEMBER_OFFSET_X: f64 = 50.0;
pub const SPLIT_TEAM_RADIUS: f64 = 45.0;
pub const AUTO_DELETE_DELAY_MS: i64 = 10_000;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// `{prefix}-{millis}-{counter}`; the counter keeps ids distinct within one
/// millisecond.
pub(crate) fn new_id(prefix: &str) -> String {
    let c = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{c}", now_ms())
}
