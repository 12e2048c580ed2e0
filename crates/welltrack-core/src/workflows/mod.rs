//! # Workflows Module
//!
//! Entry points a protocol calls. Each workflow borrows the deck mutably for its whole run,
//! drives the [`Actuator`](crate::engine::actuator::Actuator) and keeps the bookkeeping in step
//! with what was actually pipetted.
//!
//! - [`transfer`] - Forward and reverse transfers, split into passes that fit the pipette
//! - [`mixing`] - Tip wetting, in-place mixing patterns and the custom touch-tip
//! - [`report`] - Point-in-time well reports with concentration estimates

pub mod mixing;
pub mod report;
pub mod transfer;
