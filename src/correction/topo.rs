use std::f32::consts::FRAC_PI_2;

use gdal::raster::Buffer;
use indicatif::ProgressBar;
use linreg::linear_regression;
use rayon::iter::{
    IndexedParallelIterator as _, IntoParallelRefIterator as _, ParallelIterator as _,
};

use super::{CorrectionError, DEFAULT_MIN_SAMPLES};
use crate::raster::Raster;

#[derive(Copy, Clone, Debug)]
pub struct TopoOptions {
    pub min_samples: usize,
}

impl Default for TopoOptions {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

pub struct TopoResult {
    pub bands: Vec<Buffer<f32>>,
    /// C-correction factor per band, `None` for bands that were passed through unchanged.
    pub c_factors: Vec<Option<f64>>,
}

/// Applies the C-correction to every band of `raster`.
///
/// `cos_i` is the cosine of the local illumination angle. When it is not given, it is derived
/// from the solar geometry and the slope and aspect attached to the raster.
pub fn topo_correct(
    raster: &Raster,
    cos_i: Option<&[f32]>,
    options: &TopoOptions,
    progress: &ProgressBar,
) -> Result<TopoResult, CorrectionError> {
    let geometry = raster
        .geometry()
        .ok_or(CorrectionError::MissingGeometry("solar"))?;

    let computed;
    let cos_i = match cos_i {
        Some(cos_i) => cos_i,
        None => {
            computed = geometry.cosine_of_incidence()?;
            &computed
        }
    };
    let pixels = raster.size().0 * raster.size().1;
    if cos_i.len() != pixels {
        return Err(CorrectionError::SizeMismatch {
            expected: raster.size(),
            actual: (cos_i.len(), 1),
        });
    }
    // fill values map to NaN so they are skipped like any other unusable pixel
    let cos_solar_zenith = geometry
        .solar_zenith
        .iter()
        .map(|&zenith| {
            if (0.0..=FRAC_PI_2).contains(&zenith) {
                zenith.cos()
            } else {
                f32::NAN
            }
        })
        .collect::<Vec<_>>();

    let (bands, c_factors) = raster
        .bands
        .par_iter()
        .enumerate()
        .map(|(index, band)| {
            let corrected =
                correct_band(raster, band, cos_i, &cos_solar_zenith, options.min_samples);
            match corrected.1 {
                Some(c) => tracing::debug!(band = index + 1, c, "fitted C factor"),
                None => tracing::warn!(
                    band = index + 1,
                    "topographic fit failed, band left uncorrected"
                ),
            }
            progress.inc(1);
            corrected
        })
        .unzip();

    Ok(TopoResult { bands, c_factors })
}

fn correct_band(
    raster: &Raster,
    band: &Buffer<f32>,
    cos_i: &[f32],
    cos_solar_zenith: &[f32],
    min_samples: usize,
) -> (Buffer<f32>, Option<f64>) {
    let is_usable = |value: f32, cos_i: f32, cos_sz: f32| {
        raster.is_valid(value) && (-1.0..=1.0).contains(&cos_i) && cos_sz.is_finite()
    };

    let (xs, ys): (Vec<f64>, Vec<f64>) = band
        .data()
        .iter()
        .zip(cos_i)
        .zip(cos_solar_zenith)
        .filter(|&((&value, &cos_i), &cos_sz)| is_usable(value, cos_i, cos_sz))
        .map(|((&value, &cos_i), _)| (cos_i as f64, value as f64))
        .unzip();

    let c = if xs.len() >= min_samples && has_spread(&xs) {
        linear_regression::<f64, f64, f64>(&xs, &ys)
            .ok()
            .filter(|(slope, _)| slope.abs() > f64::EPSILON)
            .map(|(slope, intercept)| intercept / slope)
    } else {
        None
    };

    let mut output = Buffer::new(band.shape(), band.data().to_vec());
    if let Some(c) = c {
        for ((value, &cos_i), &cos_sz) in output
            .data_mut()
            .iter_mut()
            .zip(cos_i)
            .zip(cos_solar_zenith)
        {
            let denominator = cos_i as f64 + c;
            if is_usable(*value, cos_i, cos_sz) && denominator.abs() > f64::EPSILON {
                *value = (*value as f64 * (cos_sz as f64 + c) / denominator) as f32;
            }
        }
    }

    (output, c)
}

/// Whether the illumination varies enough across the samples to fit a line through them.
fn has_spread(xs: &[f64]) -> bool {
    let (min, max) = xs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
            (min.min(x), max.max(x))
        });
    max - min > 1e-6
}
