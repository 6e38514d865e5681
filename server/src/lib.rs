//! # MMORPG Server Library
//!
//! Authoritative engine for a tick-driven multiplayer world. The server
//! owns all game state, simulates combat, movement and loot at a fixed
//! rate, and streams JSON snapshots to connected clients; clients only
//! ever send intents.
//!
//! ## Architecture
//!
//! The world is split into independently locked zones ([`zone::Zone`]),
//! each simulating its own monsters, projectiles, ground items and
//! occupants per tick. The registry ([`game::Game`]) owns the zone
//! table, the player directory, global id issuance and the market
//! ledger, and drives the whole world from one scheduler task.
//!
//! Player actions arrive concurrently from per-connection tasks
//! ([`network`]) and compete with the tick for the relevant locks. The
//! one rule that keeps this sound: zone locks are leaves. Cross-zone
//! portal crossings are therefore queued by the tick and applied by the
//! registry after every zone lock is released.
//!
//! Failed preconditions (wrong slot, missing item, insufficient gold,
//! not near a shop) are silent no-ops; the client simply retries.
//! Nothing is persisted; all state dies with the process.

pub mod entity;
pub mod game;
pub mod loot;
pub mod market;
pub mod network;
pub mod player;
pub mod zone;
