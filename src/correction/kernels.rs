//! Kernels of the semi-empirical Ross/Li BRDF model.
//!
//! All angles are in radians. The relative azimuth is the sensor azimuth minus the solar
//! azimuth. The geometric kernels use a crown shape of `b/r = 1` and a relative height of
//! `h/b = 2`.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use clap::ValueEnum;
use serde::Serialize;

const RELATIVE_HEIGHT: f64 = 2.0;

/// Volumetric scattering kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RossKernel {
    Thick,
    Thin,
}

/// Geometric-optical surface scattering kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiKernel {
    Dense,
    Sparse,
}

/// Cosine of the phase angle between the illumination and view directions.
fn phase_cosine(solar_zenith: f64, view_zenith: f64, relative_azimuth: f64) -> f64 {
    let cos_xi = solar_zenith.cos() * view_zenith.cos()
        + solar_zenith.sin() * view_zenith.sin() * relative_azimuth.cos();
    cos_xi.clamp(-1.0, 1.0)
}

impl RossKernel {
    pub fn value(self, solar_zenith: f64, view_zenith: f64, relative_azimuth: f64) -> f64 {
        let cos_xi = phase_cosine(solar_zenith, view_zenith, relative_azimuth);
        let xi = cos_xi.acos();
        let scattering = (FRAC_PI_2 - xi) * cos_xi + xi.sin();

        match self {
            RossKernel::Thick => scattering / (solar_zenith.cos() + view_zenith.cos()) - FRAC_PI_4,
            RossKernel::Thin => scattering / (solar_zenith.cos() * view_zenith.cos()) - FRAC_PI_2,
        }
    }
}

impl LiKernel {
    pub fn value(self, solar_zenith: f64, view_zenith: f64, relative_azimuth: f64) -> f64 {
        let (tan_i, tan_v) = (solar_zenith.tan(), view_zenith.tan());
        let (sec_i, sec_v) = (solar_zenith.cos().recip(), view_zenith.cos().recip());

        let distance_sq =
            (tan_i * tan_i + tan_v * tan_v - 2.0 * tan_i * tan_v * relative_azimuth.cos()).max(0.0);
        let cross = tan_i * tan_v * relative_azimuth.sin();
        let cos_t = (RELATIVE_HEIGHT * (distance_sq + cross * cross).sqrt() / (sec_i + sec_v))
            .clamp(-1.0, 1.0);
        let t = cos_t.acos();
        let overlap = (t - t.sin() * cos_t) * (sec_i + sec_v) / PI;
        let cos_xi = phase_cosine(solar_zenith, view_zenith, relative_azimuth);

        match self {
            LiKernel::Sparse => overlap - sec_i - sec_v + 0.5 * (1.0 + cos_xi) * sec_i * sec_v,
            LiKernel::Dense => (1.0 + cos_xi) * sec_i * sec_v / (sec_i + sec_v - overlap) - 2.0,
        }
    }
}
