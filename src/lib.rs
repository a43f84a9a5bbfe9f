//! Duet Games - turn-based game session coordinator for paired players.
//!
//! Two linked users exchange an invite, open a shared session, alternate
//! validated moves over a single shared document, and receive a one-time
//! reward grant when the game ends. There is no central process that owns
//! game logic: each participant's client mutates the shared record through
//! revision-keyed compare-and-swap writes.
//!
//! # Architecture
//!
//! - **Games**: pure per-variant move validation and outcome detection
//! - **Coordinator**: session lifecycle and the conditional-write protocol
//! - **Invite broker**: invite lifecycle; acceptance creates sessions
//! - **Reward ledger**: exactly-once credit grants with an audit trail
//! - **Janitor**: periodic reclamation of stale invites and sessions
//!
//! # Example
//!
//! ```no_run
//! use duet_games::{EventBus, GameStore, SessionCoordinator, StandardSetup, TracingSink};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() {
//! let store = GameStore::new("duet_games.db".to_string());
//! let coordinator = SessionCoordinator::new(
//!     store,
//!     EventBus::new(),
//!     Arc::new(TracingSink),
//!     Arc::new(StandardSetup::new(8)),
//!     Duration::from_millis(1500),
//! );
//! # let _ = coordinator;
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod api;
mod cli;
mod config;
mod coordinator;
mod db;
mod events;
mod games;
mod invites;
mod janitor;
mod notify;
mod pairing;
mod rewards;
mod session;

// Crate-level exports - HTTP surface
pub use api::{AppState, router};

// Crate-level exports - CLI
pub use cli::{Cli, Command};

// Crate-level exports - Configuration
pub use config::{ConfigError, CoordinatorConfig};

// Crate-level exports - Session coordinator
pub use coordinator::{CoordinatorError, ResourceKind, SessionCoordinator};

// Crate-level exports - Persistence
pub use db::{DbError, GameStore, MIGRATIONS};

// Crate-level exports - Change feeds
pub use events::{EventBus, InviteEvent, SessionEvent};

// Crate-level exports - Game variant logic
pub use games::{
    AppliedMove, DeferredAction, GameMove, GameSetup, GameState, GameType, GuessEntry,
    GuessTally, MAX_WRONG_GUESSES, MatchTally, MemoryCard, MemoryState, MoveError, Outcome,
    Seat, StandardSetup, TicTacToeState, WordGuessState,
};

// Crate-level exports - Invite broker
pub use invites::{InviteBroker, InviteError, InviteRecord};

// Crate-level exports - Janitor
pub use janitor::{Janitor, SweepReport};

// Crate-level exports - Notifications
pub use notify::{ChannelSink, Notification, NotificationKind, NotificationSink, TracingSink};

// Crate-level exports - Pairing directory
pub use pairing::{PairingDirectory, StaticPairingDirectory};

// Crate-level exports - Reward ledger
pub use rewards::{RewardLedger, RewardReason, RewardRecord, RewardSchedule};

// Crate-level exports - Session records
pub use session::{
    InviteId, LifecycleStatus, SessionId, SessionRecord, UserId, Winner,
};
