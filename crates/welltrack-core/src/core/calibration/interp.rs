use super::CalibrationError;

/// Piecewise-linear interpolant with constant fill values outside the sampled range.
///
/// Inside the range the function passes exactly through every sample. Below the smallest
/// abscissa it returns `left`, above the largest it returns `right`; the end samples
/// themselves are returned unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ClampedLinear {
    xs: Vec<f64>,
    ys: Vec<f64>,
    left: f64,
    right: f64,
}

impl ClampedLinear {
    /// Builds the interpolant, sorting the samples ascending by abscissa.
    ///
    /// Samples sharing an abscissa keep their input order.
    pub fn new(
        mut points: Vec<(f64, f64)>,
        left: f64,
        right: f64,
    ) -> Result<Self, CalibrationError> {
        if points.is_empty() {
            return Err(CalibrationError::Empty);
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (xs, ys) = points.into_iter().unzip();
        Ok(Self {
            xs,
            ys,
            left,
            right,
        })
    }

    /// Interpolant that evaluates to `value` for every finite input.
    pub fn constant(value: f64) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
            left: value,
            right: value,
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let last = self.xs.len() - 1;
        if x < self.xs[0] {
            return self.left;
        }
        if x > self.xs[last] {
            return self.right;
        }

        let i = self.xs.partition_point(|&v| v < x);
        if self.xs[i] == x {
            return self.ys[i];
        }

        // xs[i - 1] < x < xs[i]
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}
