//! # Core Module
//!
//! Stateless building blocks of the well-tracking model.
//!
//! ## Architecture
//!
//! - **Calibration** ([`calibration`]) - Clamped linear interpolants built from measured container
//!   gradations and pipette error profiles, and the read-only registry that owns them.
//! - **Models** ([`models`]) - The per-well record with its volume/headroom invariant, pipette
//!   capabilities, container geometry, and the [`models::deck::Deck`] that keys them by stable ids.
//!
//! ## Scientific Foundation
//!
//! - **Piecewise-linear calibration** rather than splines, so interpolated volumes never dip below
//!   zero near the bottom of tapered containers.
//! - **Random errors** combine in quadrature, **systematic errors** combine additively.

pub mod calibration;
pub mod models;
