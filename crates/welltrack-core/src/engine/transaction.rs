use super::error::EngineError;
use crate::core::models::deck::Deck;
use crate::core::models::ids::WellId;
use crate::core::models::well::WellState;

/// Snapshot of a set of wells that can be restored in one step.
///
/// A pass records its wells before touching them; dropping the transaction without calling
/// [`WellTransaction::rollback`] keeps every change.
#[derive(Debug)]
#[must_use = "a transaction must be committed or rolled back"]
pub struct WellTransaction {
    snapshots: Vec<(WellId, WellState)>,
}

impl WellTransaction {
    pub fn begin(deck: &Deck, wells: &[WellId]) -> Result<Self, EngineError> {
        let mut snapshots = Vec::with_capacity(wells.len());
        for &id in wells {
            if snapshots.iter().any(|(seen, _)| *seen == id) {
                continue;
            }
            let state = deck.well(id).ok_or(EngineError::WellNotFound(id))?;
            snapshots.push((id, state.clone()));
        }
        Ok(Self { snapshots })
    }

    pub fn commit(self) {}

    pub fn rollback(self, deck: &mut Deck) {
        for (id, state) in self.snapshots {
            deck.replace_well(id, state);
        }
    }

    /// Runs `action` and restores every snapshot if it fails.
    pub fn run<F, R>(deck: &mut Deck, wells: &[WellId], action: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut Deck) -> Result<R, EngineError>,
    {
        let transaction = Self::begin(deck, wells)?;
        match action(deck) {
            Ok(result) => {
                transaction.commit();
                Ok(result)
            }
            Err(e) => {
                transaction.rollback(deck);
                Err(e)
            }
        }
    }
}
