use super::geometry::WellGeometry;
use super::ids::{PipetteId, WellId};
use super::pipette::PipetteSpec;
use super::well::{VolumeUncertainty, WellState};
use crate::core::calibration::profile::PipetteErrorProfile;
use crate::core::calibration::table::CalibrationTable;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::sync::Arc;

/// Owner of every tracked well and pipette of a protocol run.
///
/// Per-well and per-pipette data supplied by outside collaborators (container geometry, attached
/// error profiles) live in side-tables keyed by the same stable ids, so nothing is stored on
/// foreign objects. All mutation goes through `&mut Deck`, which serializes access to shared
/// wells for free.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    wells: SlotMap<WellId, WellState>,
    well_names: HashMap<String, WellId>,
    names_by_well: SecondaryMap<WellId, String>,
    geometry: SecondaryMap<WellId, WellGeometry>,
    pipettes: SlotMap<PipetteId, PipetteSpec>,
    pipette_names: HashMap<String, PipetteId>,
    profiles: SecondaryMap<PipetteId, Arc<PipetteErrorProfile>>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the tracking record of a well before any transfer touches it.
    ///
    /// Initiating a name that already exists resets that well and keeps its id.
    pub fn initiate_well(
        &mut self,
        name: &str,
        table: Arc<CalibrationTable>,
        geometry: Option<WellGeometry>,
    ) -> WellId {
        let state = WellState::new(table);
        let id = match self.well_names.get(name) {
            Some(&id) => {
                self.wells[id] = state;
                id
            }
            None => {
                let id = self.wells.insert(state);
                self.well_names.insert(name.to_string(), id);
                self.names_by_well.insert(id, name.to_string());
                id
            }
        };
        match geometry {
            Some(g) => {
                self.geometry.insert(id, g);
            }
            None => {
                self.geometry.remove(id);
            }
        }
        id
    }

    pub fn well(&self, id: WellId) -> Option<&WellState> {
        self.wells.get(id)
    }

    pub fn well_mut(&mut self, id: WellId) -> Option<&mut WellState> {
        self.wells.get_mut(id)
    }

    pub fn find_well(&self, name: &str) -> Option<WellId> {
        self.well_names.get(name).copied()
    }

    pub fn well_name(&self, id: WellId) -> Option<&str> {
        self.names_by_well.get(id).map(String::as_str)
    }

    pub fn geometry(&self, id: WellId) -> Option<&WellGeometry> {
        self.geometry.get(id)
    }

    pub fn wells_iter(&self) -> impl Iterator<Item = (WellId, &WellState)> {
        self.wells.iter()
    }

    /// Writes a source/destination pair back in one step.
    pub(crate) fn replace_pair(
        &mut self,
        source_id: WellId,
        source: WellState,
        destination_id: WellId,
        destination: WellState,
    ) {
        self.wells[source_id] = source;
        self.wells[destination_id] = destination;
    }

    pub(crate) fn replace_well(&mut self, id: WellId, state: WellState) {
        self.wells[id] = state;
    }

    pub fn add_pipette(&mut self, spec: PipetteSpec) -> PipetteId {
        if let Some(&id) = self.pipette_names.get(&spec.name) {
            self.pipettes[id] = spec;
            return id;
        }
        let name = spec.name.clone();
        let id = self.pipettes.insert(spec);
        self.pipette_names.insert(name, id);
        id
    }

    pub fn pipette(&self, id: PipetteId) -> Option<&PipetteSpec> {
        self.pipettes.get(id)
    }

    pub fn find_pipette(&self, name: &str) -> Option<PipetteId> {
        self.pipette_names.get(name).copied()
    }

    /// Attaches an error profile to a pipette, replacing any earlier one.
    ///
    /// Returns `false` if the pipette does not exist.
    pub fn attach_profile(&mut self, id: PipetteId, profile: Arc<PipetteErrorProfile>) -> bool {
        if !self.pipettes.contains_key(id) {
            return false;
        }
        self.profiles.insert(id, profile);
        true
    }

    pub fn profile(&self, id: PipetteId) -> Option<&Arc<PipetteErrorProfile>> {
        self.profiles.get(id)
    }

    /// Transfer uncertainty of `volume` with this pipette, if a profile is attached.
    pub fn pipette_uncertainty(&self, id: PipetteId, volume: f64) -> Option<VolumeUncertainty> {
        self.profiles.get(id).map(|p| p.uncertainty_for(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::pipette::FlowRates;
    use nalgebra::Point3;

    fn table() -> Arc<CalibrationTable> {
        Arc::new(CalibrationTable::build(&[[11.0, 2000.0], [34.2, 0.0]]).unwrap())
    }

    fn spec(name: &str) -> PipetteSpec {
        PipetteSpec {
            name: name.to_string(),
            max_volume: 300.0,
            flow_rates: FlowRates {
                aspirate: 92.86,
                dispense: 92.86,
                blow_out: 92.86,
            },
            tip_length: 51.0,
        }
    }

    #[test]
    fn initiate_well_registers_name_and_geometry() {
        let mut deck = Deck::new();
        let geometry = WellGeometry::circular(12.0, Point3::new(0.0, 0.0, 60.0), 34.2);
        let id = deck.initiate_well("A1", table(), Some(geometry));

        assert_eq!(deck.find_well("A1"), Some(id));
        assert_eq!(deck.well_name(id), Some("A1"));
        assert_eq!(deck.geometry(id), Some(&geometry));
        assert_eq!(deck.well(id).unwrap().volume(), 0.0);
    }

    #[test]
    fn reinitiating_a_name_resets_the_same_well() {
        let mut deck = Deck::new();
        let id = deck.initiate_well("A1", table(), None);
        deck.well_mut(id).unwrap().set_volume(500.0);

        let again = deck.initiate_well("A1", table(), None);
        assert_eq!(again, id);
        assert_eq!(deck.well(id).unwrap().volume(), 0.0);
        assert_eq!(deck.wells_iter().count(), 1);
    }

    #[test]
    fn pipette_uncertainty_requires_an_attached_profile() {
        let mut deck = Deck::new();
        let id = deck.add_pipette(spec("p300"));
        assert!(deck.pipette_uncertainty(id, 100.0).is_none());

        let profile = PipetteErrorProfile::build(&[[0.2, -1.0, 300.0], [0.1, -0.5, 30.0]]).unwrap();
        assert!(deck.attach_profile(id, Arc::new(profile)));
        let u = deck.pipette_uncertainty(id, 300.0).unwrap();
        assert_eq!(u, VolumeUncertainty::new(0.2, -1.0));
    }

    #[test]
    fn attach_profile_fails_for_unknown_pipette() {
        let mut deck = Deck::new();
        let mut other = Deck::new();
        let foreign = other.add_pipette(spec("p50"));
        assert!(!deck.attach_profile(foreign, Arc::new(PipetteErrorProfile::exact())));
    }

    #[test]
    fn pipettes_are_found_by_name() {
        let mut deck = Deck::new();
        let id = deck.add_pipette(spec("p1000"));
        assert_eq!(deck.find_pipette("p1000"), Some(id));
        assert_eq!(deck.pipette(id).unwrap().max_volume, 300.0);
        assert!(deck.find_pipette("p20").is_none());
    }
}
