use gdal::raster::Buffer;
use indicatif::ProgressBar;
use nalgebra::{Matrix3, Vector3};
use rayon::iter::{
    IndexedParallelIterator as _, IntoParallelRefIterator as _, ParallelIterator as _,
};
use serde::Serialize;

use super::{
    kernels::{LiKernel, RossKernel},
    CorrectionError, DEFAULT_MIN_SAMPLES,
};
use crate::raster::Raster;

#[derive(Copy, Clone, Debug)]
pub struct BrdfOptions {
    pub ross: RossKernel,
    pub li: LiKernel,
    pub min_samples: usize,
}

impl Default for BrdfOptions {
    fn default() -> Self {
        Self {
            ross: RossKernel::Thick,
            li: LiKernel::Dense,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Isotropic, volumetric and geometric weights of one band.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct BrdfCoefficients {
    pub iso: f64,
    pub vol: f64,
    pub geo: f64,
}

impl BrdfCoefficients {
    fn reflectance(&self, volumetric: f64, geometric: f64) -> f64 {
        self.iso + self.vol * volumetric + self.geo * geometric
    }
}

pub struct BrdfResult {
    pub bands: Vec<Buffer<f32>>,
    /// `None` for bands that were passed through unchanged.
    pub coefficients: Vec<Option<BrdfCoefficients>>,
    /// Solar zenith of the reference geometry, in radians.
    pub reference_solar_zenith: f64,
}

/// Normalizes every band of `raster` to nadir view under the scene-mean solar zenith.
pub fn brdf_correct(
    raster: &Raster,
    options: &BrdfOptions,
    progress: &ProgressBar,
) -> Result<BrdfResult, CorrectionError> {
    let geometry = raster
        .geometry()
        .ok_or(CorrectionError::MissingGeometry("sensor and solar"))?;

    let kernels = (0..geometry.solar_zenith.len())
        .map(|idx| {
            if !geometry.is_observed(idx) {
                return None;
            }
            let solar_zenith = geometry.solar_zenith[idx] as f64;
            let view_zenith = geometry.sensor_zenith[idx] as f64;
            let relative_azimuth =
                (geometry.sensor_azimuth[idx] - geometry.solar_azimuth[idx]) as f64;
            let volumetric = options.ross.value(solar_zenith, view_zenith, relative_azimuth);
            let geometric = options.li.value(solar_zenith, view_zenith, relative_azimuth);
            (volumetric.is_finite() && geometric.is_finite()).then_some((volumetric, geometric))
        })
        .collect::<Vec<_>>();

    // only pixels with usable geometry and data in at least one band set the reference
    let (zenith_sum, zenith_count) = geometry
        .solar_zenith
        .iter()
        .zip(&kernels)
        .enumerate()
        .filter(|(idx, (_, kernel))| {
            kernel.is_some() && raster.bands.iter().any(|band| raster.is_valid(band.data()[*idx]))
        })
        .fold((0.0, 0usize), |(sum, count), (_, (&zenith, _))| {
            (sum + zenith as f64, count + 1)
        });
    let reference_solar_zenith = if zenith_count > 0 {
        zenith_sum / zenith_count as f64
    } else {
        0.0
    };
    let reference = (
        options.ross.value(reference_solar_zenith, 0.0, 0.0),
        options.li.value(reference_solar_zenith, 0.0, 0.0),
    );
    tracing::debug!(
        reference_solar_zenith = reference_solar_zenith.to_degrees(),
        "BRDF reference geometry"
    );

    let (bands, coefficients) = raster
        .bands
        .par_iter()
        .enumerate()
        .map(|(index, band)| {
            let corrected = correct_band(raster, band, &kernels, reference, options.min_samples);
            match &corrected.1 {
                Some(BrdfCoefficients { iso, vol, geo }) => {
                    tracing::debug!(band = index + 1, iso, vol, geo, "fitted BRDF coefficients")
                }
                None => tracing::warn!(band = index + 1, "BRDF fit failed, band left uncorrected"),
            }
            progress.inc(1);
            corrected
        })
        .unzip();

    Ok(BrdfResult {
        bands,
        coefficients,
        reference_solar_zenith,
    })
}

fn correct_band(
    raster: &Raster,
    band: &Buffer<f32>,
    kernels: &[Option<(f64, f64)>],
    reference: (f64, f64),
    min_samples: usize,
) -> (Buffer<f32>, Option<BrdfCoefficients>) {
    let mut xtx = Matrix3::<f64>::zeros();
    let mut xty = Vector3::<f64>::zeros();
    let mut samples = 0;
    for (&value, kernel) in band.data().iter().zip(kernels) {
        let Some((volumetric, geometric)) = *kernel else {
            continue;
        };
        if raster.is_valid(value) {
            let x = Vector3::new(1.0, volumetric, geometric);
            xtx += x * x.transpose();
            xty += x * value as f64;
            samples += 1;
        }
    }

    let coefficients = if samples >= min_samples {
        solve_normal_equations(xtx, xty).map(|solution| BrdfCoefficients {
            iso: solution.x,
            vol: solution.y,
            geo: solution.z,
        })
    } else {
        None
    };

    let mut output = Buffer::new(band.shape(), band.data().to_vec());
    if let Some(coefficients) = &coefficients {
        let target = coefficients.reflectance(reference.0, reference.1);
        for (value, kernel) in output.data_mut().iter_mut().zip(kernels) {
            let Some((volumetric, geometric)) = *kernel else {
                continue;
            };
            let modelled = coefficients.reflectance(volumetric, geometric);
            if raster.is_valid(*value) && modelled.abs() > f64::EPSILON {
                *value = (*value as f64 * target / modelled) as f32;
            }
        }
    }

    (output, coefficients)
}

/// Returns `None` when the kernels do not vary enough across the scene to separate the weights.
fn solve_normal_equations(xtx: Matrix3<f64>, xty: Vector3<f64>) -> Option<Vector3<f64>> {
    let tolerance = xtx.amax() * 1e-12;
    if xtx.rank(tolerance) < 3 {
        return None;
    }
    xtx.lu().solve(&xty)
}

#[cfg(test)]
mod tests {
    use approx_eq::assert_approx_eq;
    use gdal::raster::Buffer;
    use indicatif::ProgressBar;

    use super::{brdf_correct, BrdfOptions};
    use crate::{
        correction::{CorrectionError, LiKernel, RossKernel, ViewGeometry},
        raster::Raster,
    };

    const SIZE: (usize, usize) = (20, 15);
    const NO_DATA: f32 = -9999.0;

    fn synthetic_geometry() -> ViewGeometry {
        let mut geometry = ViewGeometry::uniform(SIZE, 0.0, 0.0, 2.5, 40f32.to_radians());
        for y in 0..SIZE.1 {
            for x in 0..SIZE.0 {
                let idx = y * SIZE.0 + x;
                geometry.sensor_zenith[idx] = (x as f32 * 1.5).to_radians();
                geometry.sensor_azimuth[idx] = (y as f32 * 12.0).to_radians();
                geometry.solar_zenith[idx] = (35.0 + y as f32 * 0.5).to_radians();
            }
        }
        geometry
    }

    fn synthetic_band(geometry: &ViewGeometry, iso: f64, vol: f64, geo: f64) -> Buffer<f32> {
        let data = (0..SIZE.0 * SIZE.1)
            .map(|idx| {
                let solar_zenith = geometry.solar_zenith[idx] as f64;
                let view_zenith = geometry.sensor_zenith[idx] as f64;
                let relative_azimuth =
                    (geometry.sensor_azimuth[idx] - geometry.solar_azimuth[idx]) as f64;
                let volumetric =
                    RossKernel::Thick.value(solar_zenith, view_zenith, relative_azimuth);
                let geometric = LiKernel::Dense.value(solar_zenith, view_zenith, relative_azimuth);
                (iso + vol * volumetric + geo * geometric) as f32
            })
            .collect();
        Buffer::new(SIZE, data)
    }

    #[test]
    fn recovers_coefficients() {
        let geometry = synthetic_geometry();
        let mut band = synthetic_band(&geometry, 0.2, 0.05, 0.02);
        band.data_mut()[7] = NO_DATA;
        let second = synthetic_band(&geometry, 0.4, 0.1, 0.03);

        let mut raster = Raster::from_bands(SIZE, vec![band, second], NO_DATA);
        raster.attach_geometry(geometry).unwrap();

        let result =
            brdf_correct(&raster, &BrdfOptions::default(), &ProgressBar::hidden()).unwrap();
        let coefficients = result.coefficients[0].unwrap();
        assert_approx_eq!(coefficients.iso, 0.2, 1e-3);
        assert_approx_eq!(coefficients.vol, 0.05, 1e-2);
        assert_approx_eq!(coefficients.geo, 0.02, 1e-2);
        assert_approx_eq!(result.coefficients[1].unwrap().iso, 0.4, 1e-3);

        let reference = result.reference_solar_zenith;
        assert_approx_eq!(reference.to_degrees(), 38.5, 1e-4);

        let corrected = result.bands[0].data();
        assert_eq!(corrected[7], NO_DATA);
        let expected = 0.2
            + 0.05 * RossKernel::Thick.value(reference, 0.0, 0.0)
            + 0.02 * LiKernel::Dense.value(reference, 0.0, 0.0);
        for (idx, &value) in corrected.iter().enumerate() {
            if idx != 7 {
                assert_approx_eq!(value as f64, expected, 1e-3);
            }
        }
    }

    #[test]
    fn too_few_samples_pass_through() {
        let geometry = synthetic_geometry();
        let band = synthetic_band(&geometry, 0.2, 0.05, 0.02);
        let original = band.data().to_vec();

        let mut raster = Raster::from_bands(SIZE, vec![band], NO_DATA);
        raster.attach_geometry(geometry).unwrap();
        let options = BrdfOptions {
            min_samples: SIZE.0 * SIZE.1 + 1,
            ..BrdfOptions::default()
        };

        let result = brdf_correct(&raster, &options, &ProgressBar::hidden()).unwrap();
        assert!(result.coefficients[0].is_none());
        assert_eq!(result.bands[0].data(), original.as_slice());
    }

    #[test]
    fn fill_geometry_is_ignored() {
        let geometry = synthetic_geometry();
        let mut band = synthetic_band(&geometry, 0.2, 0.05, 0.02);
        let mut second = synthetic_band(&geometry, 0.4, 0.1, 0.03);
        for idx in [7, 40, 41] {
            band.data_mut()[idx] = NO_DATA;
            second.data_mut()[idx] = NO_DATA;
        }
        let bands = vec![
            Buffer::new(SIZE, band.data().to_vec()),
            Buffer::new(SIZE, second.data().to_vec()),
        ];

        let mut clean = Raster::from_bands(SIZE, bands, NO_DATA);
        clean.attach_geometry(geometry.clone()).unwrap();
        let expected =
            brdf_correct(&clean, &BrdfOptions::default(), &ProgressBar::hidden()).unwrap();

        // off-scene pixels carry the fill value in every observation band
        let mut filled = geometry;
        for idx in [7, 40, 41] {
            filled.solar_zenith[idx] = (-9999f32).to_radians();
            filled.sensor_zenith[idx] = (-9999f32).to_radians();
            filled.sensor_azimuth[idx] = (-9999f32).to_radians();
            filled.solar_azimuth[idx] = (-9999f32).to_radians();
        }
        let mut raster = Raster::from_bands(SIZE, vec![band, second], NO_DATA);
        raster.attach_geometry(filled).unwrap();
        let result =
            brdf_correct(&raster, &BrdfOptions::default(), &ProgressBar::hidden()).unwrap();

        assert_eq!(
            result.reference_solar_zenith,
            expected.reference_solar_zenith
        );
        assert!(result.reference_solar_zenith.to_degrees() > 35.0);
        assert_eq!(result.coefficients, expected.coefficients);
        for (band, expected) in result.bands.iter().zip(&expected.bands) {
            assert_eq!(band.data(), expected.data());
            assert_eq!(band.data()[40], NO_DATA);
        }
    }

    #[test]
    fn constant_geometry_cannot_be_fitted() {
        let geometry = ViewGeometry::uniform(SIZE, 0.3, 0.2, 2.5, 40f32.to_radians());
        let band = synthetic_band(&geometry, 0.2, 0.05, 0.02);
        let original = band.data().to_vec();

        let mut raster = Raster::from_bands(SIZE, vec![band], NO_DATA);
        raster.attach_geometry(geometry).unwrap();

        let result =
            brdf_correct(&raster, &BrdfOptions::default(), &ProgressBar::hidden()).unwrap();
        assert!(result.coefficients[0].is_none());
        assert_eq!(result.bands[0].data(), original.as_slice());
    }

    #[test]
    fn requires_geometry() {
        let raster = Raster::from_bands(SIZE, vec![Buffer::new(SIZE, vec![0.1; 300])], NO_DATA);

        assert!(matches!(
            brdf_correct(&raster, &BrdfOptions::default(), &ProgressBar::hidden()),
            Err(CorrectionError::MissingGeometry(_))
        ));
    }
}
