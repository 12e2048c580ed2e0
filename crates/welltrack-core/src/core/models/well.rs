use crate::core::calibration::table::CalibrationTable;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Random and systematic uncertainty on a volume, in uL.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeUncertainty {
    pub random: f64,
    pub systematic: f64,
}

impl VolumeUncertainty {
    pub fn new(random: f64, systematic: f64) -> Self {
        Self { random, systematic }
    }

    /// Adds an independent error source: random parts in quadrature, systematic parts linearly.
    pub fn combine(self, other: Self) -> Self {
        Self {
            random: self.random.hypot(other.random),
            systematic: self.systematic + other.systematic,
        }
    }
}

/// What is known about one constituent's original stock reagent, as drawn into a well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockRecord {
    /// Concentration of the undiluted stock.
    pub concentration: f64,
    pub concentration_uncertainty: f64,
    /// Volume of undiluted stock that ended up in this well.
    pub volume: f64,
    pub volume_uncertainty: f64,
}

/// Fill level, composition and uncertainty of one container.
///
/// Volume and headroom are kept consistent through the container's calibration table: every
/// write to one recomputes the other, and neither field is writable directly.
#[derive(Debug, Clone, PartialEq)]
pub struct WellState {
    volume: f64,
    headroom: f64,
    table: Arc<CalibrationTable>,
    volume_uncertainty: VolumeUncertainty,
    /// Constituent names in discovery order.
    constituents: Vec<String>,
    stock: HashMap<String, StockRecord>,
}

impl WellState {
    /// Creates an empty well with no recorded uncertainty.
    pub fn new(table: Arc<CalibrationTable>) -> Self {
        let headroom = table.full_depth_headroom();
        Self {
            volume: 0.0,
            headroom,
            table,
            volume_uncertainty: VolumeUncertainty::default(),
            constituents: Vec::new(),
            stock: HashMap::new(),
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn headroom(&self) -> f64 {
        self.headroom
    }

    pub fn table(&self) -> &Arc<CalibrationTable> {
        &self.table
    }

    /// Sets the meniscus position and derives the volume from it.
    pub fn set_headroom(&mut self, headroom: f64) {
        self.headroom = headroom;
        self.volume = self.table.volume_given_headroom(headroom);
    }

    /// Sets the volume and derives the meniscus position from it.
    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
        self.headroom = self.table.headroom_given_volume(volume);
    }

    /// Headroom this well would have after holding `volume`, without changing it.
    pub fn headroom_at(&self, volume: f64) -> f64 {
        self.table.headroom_given_volume(volume)
    }

    /// Headroom of the empty container.
    pub fn depth(&self) -> f64 {
        self.table.full_depth_headroom()
    }

    pub fn volume_uncertainty(&self) -> VolumeUncertainty {
        self.volume_uncertainty
    }

    pub fn constituents(&self) -> &[String] {
        &self.constituents
    }

    pub fn constituents_number(&self) -> usize {
        self.constituents.len()
    }

    pub fn has_constituent(&self, name: &str) -> bool {
        self.stock.contains_key(name)
    }

    pub fn stock(&self, name: &str) -> Option<&StockRecord> {
        self.stock.get(name)
    }

    /// Stock records in discovery order.
    pub fn stocks(&self) -> impl Iterator<Item = (&str, &StockRecord)> {
        self.constituents
            .iter()
            .filter_map(|name| self.stock.get(name).map(|record| (name.as_str(), record)))
    }

    /// Registers a stock reagent already present in the well at its current volume.
    ///
    /// This is the seeding path for wells that start the protocol pre-filled; set the volume or
    /// headroom first. Seeding a name twice replaces the earlier snapshot without listing the
    /// constituent twice, and returns the replaced record.
    pub fn set_constituent(
        &mut self,
        name: &str,
        concentration: f64,
        concentration_uncertainty: f64,
        volume_uncertainty: f64,
    ) -> Option<StockRecord> {
        let record = StockRecord {
            concentration,
            concentration_uncertainty,
            volume: self.volume,
            volume_uncertainty,
        };
        let previous = self.stock.insert(name.to_string(), record);
        if previous.is_some() {
            warn!(
                constituent = name,
                "Constituent re-seeded; the previous stock snapshot was replaced."
            );
        } else {
            self.constituents.push(name.to_string());
        }
        previous
    }

    pub(crate) fn set_volume_uncertainty(&mut self, uncertainty: VolumeUncertainty) {
        self.volume_uncertainty = uncertainty;
    }

    pub(crate) fn stock_mut(&mut self, name: &str) -> Option<&mut StockRecord> {
        self.stock.get_mut(name)
    }

    /// Adds a constituent discovered through a transfer.
    pub(crate) fn register_constituent(&mut self, name: &str, record: StockRecord) {
        if self.stock.insert(name.to_string(), record).is_none() {
            self.constituents.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn vial() -> Arc<CalibrationTable> {
        Arc::new(CalibrationTable::build(&[[11.0, 2000.0], [34.2, 0.0]]).unwrap())
    }

    #[test]
    fn new_well_is_empty_at_full_depth() {
        let well = WellState::new(vial());
        assert_eq!(well.volume(), 0.0);
        assert_eq!(well.headroom(), 34.2);
        assert_eq!(well.depth(), 34.2);
        assert_eq!(well.volume_uncertainty(), VolumeUncertainty::default());
        assert_eq!(well.constituents_number(), 0);
    }

    #[test]
    fn set_volume_recomputes_headroom() {
        let mut well = WellState::new(vial());
        well.set_volume(1000.0);
        assert_eq!(well.volume(), 1000.0);
        assert_eq!(well.headroom(), well.table().headroom_given_volume(1000.0));
        assert!(f64_approx_equal(well.headroom(), 22.6));
    }

    #[test]
    fn set_headroom_recomputes_volume() {
        let mut well = WellState::new(vial());
        well.set_headroom(11.0);
        assert_eq!(well.headroom(), 11.0);
        assert_eq!(well.volume(), 2000.0);
    }

    #[test]
    fn headroom_at_does_not_mutate() {
        let mut well = WellState::new(vial());
        well.set_volume(500.0);
        let before = well.clone();
        assert_eq!(well.headroom_at(2000.0), 11.0);
        assert_eq!(well, before);
    }

    #[test]
    fn set_constituent_snapshots_the_current_volume() {
        let mut well = WellState::new(vial());
        well.set_volume(1500.0);
        assert!(well.set_constituent("dox", 15000.0, 150.0, 2.0).is_none());

        let record = well.stock("dox").unwrap();
        assert_eq!(record.volume, 1500.0);
        assert_eq!(record.concentration, 15000.0);
        assert_eq!(record.concentration_uncertainty, 150.0);
        assert_eq!(record.volume_uncertainty, 2.0);
        assert_eq!(well.constituents(), ["dox".to_string()]);
    }

    #[test]
    fn reseeding_replaces_without_double_counting() {
        let mut well = WellState::new(vial());
        well.set_volume(1500.0);
        well.set_constituent("dox", 15000.0, 150.0, 0.0);
        well.set_volume(1000.0);
        let previous = well.set_constituent("dox", 12000.0, 100.0, 0.0);

        assert_eq!(previous.map(|r| r.concentration), Some(15000.0));
        assert_eq!(well.constituents_number(), 1);
        assert_eq!(well.stock("dox").unwrap().volume, 1000.0);
    }

    #[test]
    fn stocks_iterate_in_discovery_order() {
        let mut well = WellState::new(vial());
        well.set_volume(100.0);
        well.set_constituent("epi", 1.0, 0.0, 0.0);
        well.set_constituent("dox", 2.0, 0.0, 0.0);
        let names: Vec<&str> = well.stocks().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["epi", "dox"]);
    }

    #[test]
    fn combine_adds_random_in_quadrature_and_systematic_linearly() {
        let total = VolumeUncertainty::new(3.0, -1.0).combine(VolumeUncertainty::new(4.0, -0.5));
        assert!(f64_approx_equal(total.random, 5.0));
        assert!(f64_approx_equal(total.systematic, -1.5));
    }
}
