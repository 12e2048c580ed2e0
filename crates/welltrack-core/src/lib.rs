//! # WellTrack Core Library
//!
//! Fill-level and composition tracking for containers handled by an automated pipetting process,
//! together with the statistical uncertainty on both.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that the numerics stay testable in isolation
//! from the protocol logic that drives them.
//!
//! - **[`core`]: The Foundation.** Calibration interpolants (headroom to volume, volume to
//!   pipetting error), the built-in measurement library, and the per-well records kept on the
//!   [`core::models::deck::Deck`].
//!
//! - **[`engine`]: The Logic Core.** The uncertainty propagation algorithm run before every
//!   pipetting pass, the concentration query, the motion parameters handed to the robot, and the
//!   transactional guard that keeps a cancelled pass from leaving partial bookkeeping behind.
//!
//! - **[`workflows`]: The Public API.** Forward and reverse transfers split into passes, tip
//!   wetting, mixing, and well reports. These are the entry points a protocol calls.

pub mod core;
pub mod engine;
pub mod workflows;
