//! Band layout of the observation (`*_rdn_obs_ort`) image.

use anyhow::{Context, Result};

use crate::{correction::ViewGeometry, raster::BandSource, scene::Correction};

pub const SENSOR_AZIMUTH: usize = 1;
pub const SENSOR_ZENITH: usize = 2;
pub const SOLAR_AZIMUTH: usize = 3;
pub const SOLAR_ZENITH: usize = 4;
pub const SLOPE: usize = 6;
pub const ASPECT: usize = 7;
/// Cosine of the local illumination angle. Unitless, unlike the other bands which are in degrees.
pub const COS_I: usize = 8;

/// Observation bands read for each correction, in reading order.
pub fn required_bands(correction: Correction) -> &'static [usize] {
    match correction {
        Correction::Brdf => &[SENSOR_AZIMUTH, SENSOR_ZENITH, SOLAR_AZIMUTH, SOLAR_ZENITH],
        Correction::Topographic => &[
            SENSOR_AZIMUTH,
            SENSOR_ZENITH,
            SOLAR_AZIMUTH,
            SOLAR_ZENITH,
            SLOPE,
            ASPECT,
            COS_I,
        ],
    }
}

/// Reads one observation band, converting the angle bands from degrees to radians.
fn read_observation_band<S: BandSource + ?Sized>(source: &S, index: usize) -> Result<Vec<f32>> {
    let mut band = source.read_band(index)?.into_shape_and_vec().1;
    if index != COS_I {
        for value in &mut band {
            *value = value.to_radians();
        }
    }
    Ok(band)
}

fn take_band(bands: &mut [Option<Vec<f32>>], index: usize) -> Result<Vec<f32>> {
    bands[index - 1]
        .take()
        .with_context(|| format!("observation band {index} was not read"))
}

/// Geometry read from an observation image, ready to be attached to a reflectance raster.
pub struct Observation {
    pub geometry: ViewGeometry,
    pub cos_i: Option<Vec<f32>>,
}

impl Observation {
    pub fn read<S: BandSource + ?Sized>(source: &S, correction: Correction) -> Result<Self> {
        tracing::debug!(
            bands = ?required_bands(correction),
            %correction,
            "reading observation bands"
        );

        let mut bands = vec![None; COS_I];
        for &index in required_bands(correction) {
            bands[index - 1] = Some(read_observation_band(source, index)?);
        }

        let geometry = ViewGeometry {
            size: source.size(),
            sensor_azimuth: take_band(&mut bands, SENSOR_AZIMUTH)?,
            sensor_zenith: take_band(&mut bands, SENSOR_ZENITH)?,
            solar_azimuth: take_band(&mut bands, SOLAR_AZIMUTH)?,
            solar_zenith: take_band(&mut bands, SOLAR_ZENITH)?,
            slope: bands[SLOPE - 1].take(),
            aspect: bands[ASPECT - 1].take(),
        };
        let cos_i = bands[COS_I - 1].take();

        Ok(Self { geometry, cos_i })
    }
}
