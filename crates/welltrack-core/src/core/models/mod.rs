//! # Core Models Module
//!
//! Records describing the physical state tracked across a protocol run.
//!
//! ## Key Components
//!
//! - [`well`] - Per-container volume, headroom, composition and uncertainty record
//! - [`pipette`] - Pipette capabilities reported by the instrument (capacity, flow rates, tip)
//! - [`geometry`] - Container geometry reported by the labware definition
//! - [`deck`] - Owner of every well and pipette, keyed by stable ids
//! - [`ids`] - Id types for wells and pipettes
//!
//! ## Usage
//!
//! ```ignore
//! use welltrack::core::calibration::library::CalibrationRegistry;
//! use welltrack::core::models::deck::Deck;
//!
//! let registry = CalibrationRegistry::builtin()?;
//! let mut deck = Deck::new();
//! let stock = deck.initiate_well("stock", registry.container("ftube-50ml").unwrap(), None);
//! deck.well_mut(stock).unwrap().set_headroom(10.0);
//! deck.well_mut(stock).unwrap().set_constituent("dox", 15000.0, 150.0, 0.0);
//! ```

pub mod deck;
pub mod geometry;
pub mod ids;
pub mod pipette;
pub mod well;
