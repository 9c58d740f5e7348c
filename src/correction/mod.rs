//! BRDF and topographic corrections of reflectance images.
//!
//! Both corrections fit a small linear model per band over the valid pixels of the scene and
//! then rescale every valid pixel towards a reference illumination. Pixels equal to the no-data
//! value of the raster are never modified.

mod brdf;
mod kernels;
mod topo;

use std::f32::consts::{FRAC_PI_2, TAU};

use thiserror::Error;

pub use brdf::{brdf_correct, BrdfCoefficients, BrdfOptions, BrdfResult};
pub use kernels::{LiKernel, RossKernel};
pub use topo::{topo_correct, TopoOptions, TopoResult};

/// Bands with fewer valid pixels than this are left uncorrected.
pub const DEFAULT_MIN_SAMPLES: usize = 100;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("reflectance raster is missing the {0} geometry")]
    MissingGeometry(&'static str),
    #[error("grid size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Per-pixel view and illumination angles, in radians.
#[derive(Clone, Debug)]
pub struct ViewGeometry {
    pub size: (usize, usize),
    pub sensor_azimuth: Vec<f32>,
    pub sensor_zenith: Vec<f32>,
    pub solar_azimuth: Vec<f32>,
    pub solar_zenith: Vec<f32>,
    pub slope: Option<Vec<f32>>,
    pub aspect: Option<Vec<f32>>,
}

impl ViewGeometry {
    /// Whether the angles at `idx` describe a real observation rather than a fill value.
    pub fn is_observed(&self, idx: usize) -> bool {
        let zenith = |angle: f32| (0.0..=FRAC_PI_2).contains(&angle);
        let azimuth = |angle: f32| (-TAU..=TAU).contains(&angle);
        zenith(self.solar_zenith[idx])
            && zenith(self.sensor_zenith[idx])
            && azimuth(self.solar_azimuth[idx])
            && azimuth(self.sensor_azimuth[idx])
    }

    /// Cosine of the local illumination angle, derived from the solar position and the terrain.
    pub fn cosine_of_incidence(&self) -> Result<Vec<f32>, CorrectionError> {
        let slope = self
            .slope
            .as_ref()
            .ok_or(CorrectionError::MissingGeometry("slope"))?;
        let aspect = self
            .aspect
            .as_ref()
            .ok_or(CorrectionError::MissingGeometry("aspect"))?;

        let cos_i = self
            .solar_zenith
            .iter()
            .zip(&self.solar_azimuth)
            .zip(slope.iter().zip(aspect))
            .map(|((&zenith, &azimuth), (&slope, &aspect))| {
                zenith.cos() * slope.cos() + zenith.sin() * slope.sin() * (azimuth - aspect).cos()
            })
            .collect();
        Ok(cos_i)
    }

    #[cfg(test)]
    pub fn uniform(
        size: (usize, usize),
        sensor_azimuth: f32,
        sensor_zenith: f32,
        solar_azimuth: f32,
        solar_zenith: f32,
    ) -> Self {
        let pixels = size.0 * size.1;
        Self {
            size,
            sensor_azimuth: vec![sensor_azimuth; pixels],
            sensor_zenith: vec![sensor_zenith; pixels],
            solar_azimuth: vec![solar_azimuth; pixels],
            solar_zenith: vec![solar_zenith; pixels],
            slope: None,
            aspect: None,
        }
    }
}
