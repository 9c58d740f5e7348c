mod brdf;
mod topo;

use std::{
    ffi::OsString,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::{
    correction::{LiKernel, RossKernel},
    scene::{Correction, SceneFiles},
};

pub use brdf::apply_brdf_correction;
pub use topo::apply_topographic_correction;

#[derive(Debug, Args)]
pub struct CorrectionArgs {
    /// Directory containing the scene files
    #[arg(long, env = "TOPO_BRDF_INPUT_DIR", default_value = "/data/input")]
    pub input_dir: PathBuf,

    /// Directory for the corrected images, defaults to the input directory
    #[arg(long, env = "TOPO_BRDF_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "ENVI")]
    pub format: String,

    /// Reflectance no-data value
    #[arg(long, default_value_t = -9999.0, allow_negative_numbers = true)]
    pub no_data: f32,

    /// Volumetric BRDF kernel
    #[arg(long, value_enum, default_value_t = RossKernel::Thick)]
    pub ross: RossKernel,

    /// Geometric BRDF kernel
    #[arg(long, value_enum, default_value_t = LiKernel::Dense)]
    pub li: LiKernel,

    /// Write the fitted coefficients next to each output image
    #[arg(long)]
    pub export_coefficients: bool,
}

impl CorrectionArgs {
    /// Runs one correction over a located scene and returns the output path.
    pub fn run(&self, correction: Correction, files: &SceneFiles) -> Result<PathBuf> {
        match correction {
            Correction::Brdf => apply_brdf_correction(files, self),
            Correction::Topographic => apply_topographic_correction(files, self),
        }
    }
}

fn progress_bar(correction: Correction, band_count: usize) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len}")?;
    let bar = ProgressBar::new(band_count as u64)
        .with_style(style)
        .with_message(format!("{correction} correction"));
    Ok(bar)
}

fn coefficients_path(output: &Path) -> PathBuf {
    let mut path = OsString::from(output.as_os_str());
    path.push(".coeffs.json");
    PathBuf::from(path)
}

fn write_coefficients<T: Serialize>(output: &Path, report: &T) -> Result<PathBuf> {
    let path = coefficients_path(output);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, report)?;

    {
        let path = path.display();
        tracing::debug!(%path, "wrote coefficients");
    }
    Ok(path)
}
