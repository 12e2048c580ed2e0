use crate::core::models::deck::Deck;
use crate::core::models::ids::WellId;
use crate::core::models::well::{StockRecord, VolumeUncertainty};
use crate::engine::concentration::{ConcentrationEstimate, get_concentration};
use crate::engine::error::EngineError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ConstituentLine {
    pub name: String,
    pub stock: StockRecord,
    /// `None` when the concentration cannot be computed, e.g. for a well drained to zero.
    pub estimate: Option<ConcentrationEstimate>,
}

impl fmt::Display for ConstituentLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.estimate {
            Some(estimate) => write!(f, "{}: {}", self.name, estimate),
            None => write!(f, "{}: n/a", self.name),
        }
    }
}

/// Point-in-time view of one well.
#[derive(Debug, Clone, PartialEq)]
pub struct WellReport {
    pub name: String,
    pub volume: f64,
    pub headroom: f64,
    pub uncertainty: VolumeUncertainty,
    pub constituents: Vec<ConstituentLine>,
}

impl WellReport {
    pub fn capture(deck: &Deck, id: WellId) -> Result<Self, EngineError> {
        let well = deck.well(id).ok_or(EngineError::WellNotFound(id))?;
        let constituents = well
            .stocks()
            .map(|(name, stock)| ConstituentLine {
                name: name.to_string(),
                stock: *stock,
                estimate: get_concentration(well, name).ok(),
            })
            .collect();

        Ok(Self {
            name: deck.well_name(id).unwrap_or_default().to_string(),
            volume: well.volume(),
            headroom: well.headroom(),
            uncertainty: well.volume_uncertainty(),
            constituents,
        })
    }

    pub fn capture_all(deck: &Deck) -> Result<Vec<Self>, EngineError> {
        let mut reports = deck
            .wells_iter()
            .map(|(id, _)| Self::capture(deck, id))
            .collect::<Result<Vec<_>, _>>()?;
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(reports)
    }
}

impl fmt::Display for WellReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {:.2} uL (headroom {:.2} mm, random \u{b1}{:.3} uL, systematic {:+.3} uL)",
            self.name,
            self.volume,
            self.headroom,
            self.uncertainty.random,
            self.uncertainty.systematic
        )?;
        for line in &self.constituents {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}
