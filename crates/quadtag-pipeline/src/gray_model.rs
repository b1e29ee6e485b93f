//! Two-class intensity model for adaptive bit thresholding.
//!
//! Each class (light, dark) gets a bilinear fit `a + b*x + c*y + d*x*y`
//! over tag-grid coordinates, so a brightness gradient across the tag
//! shifts the threshold with it. With too few samples or a singular
//! system the class falls back to its mean.

use nalgebra::{Matrix4, Vector4};

/// Least-squares bilinear intensity model of one class.
#[derive(Debug, Clone, Default)]
pub struct GrayModel {
    ata: Matrix4<f64>,
    atb: Vector4<f64>,
    sum: f64,
    count: usize,
}

/// A fitted [`GrayModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraySurface {
    /// Bilinear coefficients `[a, b, c, d]`.
    Bilinear([f64; 4]),
    /// Constant mean.
    Constant(f64),
}

impl GraySurface {
    /// Predicted intensity at `(x, y)`.
    #[must_use]
    pub fn predict(&self, x: f64, y: f64) -> f64 {
        match *self {
            Self::Bilinear([a, b, c, d]) => d.mul_add(x * y, c.mul_add(y, b.mul_add(x, a))),
            Self::Constant(mean) => mean,
        }
    }
}

impl GrayModel {
    /// An empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation.
    pub fn add(&mut self, x: f64, y: f64, value: f64) {
        let row = Vector4::new(1.0, x, y, x * y);
        self.ata += row * row.transpose();
        self.atb += row * value;
        self.sum += value;
        self.count += 1;
    }

    /// Number of observations.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Mean of the observations, `None` if empty.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Solve the model. `None` if no observations were added.
    #[must_use]
    pub fn fit(&self) -> Option<GraySurface> {
        let mean = self.mean()?;
        if self.count < 4 {
            return Some(GraySurface::Constant(mean));
        }
        let surface = self
            .ata
            .lu()
            .solve(&self.atb)
            .filter(|c| c.iter().all(|v| v.is_finite()))
            .map_or(GraySurface::Constant(mean), |c| {
                GraySurface::Bilinear([c[0], c[1], c[2], c[3]])
            });
        Some(surface)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn recovers_bilinear_surface() {
        let mut model = GrayModel::new();
        for i in 0..5 {
            for j in 0..5 {
                let (x, y) = (f64::from(j), f64::from(i));
                model.add(x, y, 0.1 + 0.02 * x - 0.01 * y + 0.001 * x * y);
            }
        }
        let surface = model.fit().unwrap();
        assert!((surface.predict(2.5, 3.5) - (0.1 + 0.05 - 0.035 + 0.008_75)).abs() < 1e-9);
        assert!(matches!(surface, GraySurface::Bilinear(_)));
    }

    #[test]
    fn collinear_samples_fall_back_to_mean() {
        let mut model = GrayModel::new();
        for j in 0..6 {
            model.add(f64::from(j), 0.0, 0.8);
        }
        let surface = model.fit().unwrap();
        assert!((surface.predict(10.0, 10.0) - 0.8).abs() < 1e-9, "{surface:?}");
    }

    #[test]
    fn few_samples_use_mean() {
        let mut model = GrayModel::new();
        model.add(0.0, 0.0, 0.2);
        model.add(1.0, 1.0, 0.4);
        assert_eq!(model.count(), 2);
        let surface = model.fit().unwrap();
        assert!(matches!(surface, GraySurface::Constant(m) if (m - 0.3).abs() < 1e-12));
    }

    #[test]
    fn empty_model_has_no_fit() {
        assert!(GrayModel::new().fit().is_none());
        assert!(GrayModel::new().mean().is_none());
    }
}
