use nalgebra::{Point3, Vector3};

/// Container geometry as reported by the labware definition.
///
/// Read-only input: positions are deck coordinates in millimetres, `top` being the centre of
/// the rim. `diameter` is `None` for non-circular wells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WellGeometry {
    pub diameter: Option<f64>,
    pub top: Point3<f64>,
    pub depth: f64,
}

impl WellGeometry {
    pub fn circular(diameter: f64, top: Point3<f64>, depth: f64) -> Self {
        Self {
            diameter: Some(diameter),
            top,
            depth,
        }
    }

    /// Point `depth` millimetres below the centre of the rim.
    pub fn below_top(&self, depth: f64) -> Point3<f64> {
        self.top - Vector3::new(0.0, 0.0, depth)
    }
}
