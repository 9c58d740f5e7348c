use std::path::{Path, PathBuf};

use anyhow::Result;
use gdal::Dataset;
use serde::Serialize;

use super::{progress_bar, write_coefficients, CorrectionArgs};
use crate::{
    correction::{topo_correct, TopoOptions},
    observation::Observation,
    raster::Raster,
    scene::{Correction, SceneFiles},
};

#[derive(Serialize)]
struct TopoReport<'a> {
    reflectance: &'a Path,
    c_factors: &'a [Option<f64>],
}

/// Removes terrain illumination from the reflectance image of a scene and returns the output path.
pub fn apply_topographic_correction(files: &SceneFiles, args: &CorrectionArgs) -> Result<PathBuf> {
    let output_path =
        Correction::Topographic.output_path(&files.reflectance, args.output_dir.as_deref())?;

    let mut reflectance = Raster::open(&files.reflectance, args.no_data)?;
    let observation = Observation::read(
        &Dataset::open(&files.observation)?,
        Correction::Topographic,
    )?;
    reflectance.attach_geometry(observation.geometry)?;

    let bar = progress_bar(Correction::Topographic, reflectance.bands.len())?;
    let mut result = topo_correct(
        &reflectance,
        observation.cos_i.as_deref(),
        &TopoOptions::default(),
        &bar,
    )?;
    bar.finish_and_clear();

    reflectance.write(&output_path, &args.format, &mut result.bands)?;

    if args.export_coefficients {
        let report = TopoReport {
            reflectance: reflectance.path(),
            c_factors: &result.c_factors,
        };
        write_coefficients(&output_path, &report)?;
    }

    Ok(output_path)
}
