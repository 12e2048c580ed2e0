//! # Engine Module
//!
//! Stateful algorithms that act on a [`Deck`](crate::core::models::deck::Deck): uncertainty
//! propagation, concentration queries and the numeric planning of every pipette motion.
//!
//! ## Architecture
//!
//! - **Propagation** ([`propagation`]) - Per-pass update of volume uncertainty and stock records
//! - **Concentration** ([`concentration`]) - Concentration of a constituent with its bounds
//! - **Motion Planning** ([`motion`]) - Aspirate and dispense depths, overflow decisions, touch-tip
//!   circles
//! - **Transactions** ([`transaction`]) - Snapshot and rollback of the wells touched by a pass
//! - **Actuation** ([`actuator`]) - The seam to the liquid handler and a recording implementation
//! - **Configuration** ([`config`]) - Transfer options with their defaults and builders
//! - **Progress Monitoring** ([`progress`]) - Progress callbacks for long protocols
//! - **Error Handling** ([`error`]) - Engine error taxonomy
//!
//! Everything here is single-threaded: passes are strictly ordered by the `&mut Deck` they
//! borrow.

pub mod actuator;
pub mod concentration;
pub mod config;
pub mod error;
pub mod motion;
pub mod progress;
pub mod propagation;
pub mod transaction;
