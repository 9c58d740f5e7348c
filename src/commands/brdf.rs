use std::path::{Path, PathBuf};

use anyhow::Result;
use gdal::Dataset;
use serde::Serialize;

use super::{progress_bar, write_coefficients, CorrectionArgs};
use crate::{
    correction::{brdf_correct, BrdfCoefficients, BrdfOptions, LiKernel, RossKernel},
    observation::Observation,
    raster::Raster,
    scene::{Correction, SceneFiles},
};

#[derive(Serialize)]
struct BrdfReport<'a> {
    reflectance: &'a Path,
    ross: RossKernel,
    li: LiKernel,
    reference_solar_zenith: f64,
    bands: &'a [Option<BrdfCoefficients>],
}

/// Normalizes the reflectance image of a scene to nadir view and returns the output path.
pub fn apply_brdf_correction(files: &SceneFiles, args: &CorrectionArgs) -> Result<PathBuf> {
    let output_path =
        Correction::Brdf.output_path(&files.reflectance, args.output_dir.as_deref())?;

    let mut reflectance = Raster::open(&files.reflectance, args.no_data)?;
    let observation = Observation::read(&Dataset::open(&files.observation)?, Correction::Brdf)?;
    reflectance.attach_geometry(observation.geometry)?;

    let options = BrdfOptions {
        ross: args.ross,
        li: args.li,
        ..BrdfOptions::default()
    };
    let bar = progress_bar(Correction::Brdf, reflectance.bands.len())?;
    let mut result = brdf_correct(&reflectance, &options, &bar)?;
    bar.finish_and_clear();

    reflectance.write(&output_path, &args.format, &mut result.bands)?;

    if args.export_coefficients {
        let report = BrdfReport {
            reflectance: reflectance.path(),
            ross: args.ross,
            li: args.li,
            reference_solar_zenith: result.reference_solar_zenith.to_degrees(),
            bands: &result.coefficients,
        };
        write_coefficients(&output_path, &report)?;
    }

    Ok(output_path)
}
