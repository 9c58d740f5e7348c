mod commands;
mod correction;
mod observation;
mod raster;
mod scene;

use std::process;

use anyhow::Result;
use clap::Parser;
use commands::CorrectionArgs;
use gdal::DriverManager;
use scene::Correction;
use tracing_subscriber::fmt;

#[derive(Debug, Parser)]
#[command(author, version, about)]
/// Applies BRDF and topographic corrections to a reflectance scene.
struct Args {
    /// Scene identifier, the common prefix of the input file names
    image_id: String,

    /// Apply the BRDF correction
    #[arg(long)]
    brdf: bool,

    /// Apply the topographic correction
    #[arg(long)]
    topo: bool,

    #[command(flatten)]
    correction: CorrectionArgs,
}

impl Args {
    /// Selected corrections, in the order they run.
    fn corrections(&self) -> Vec<Correction> {
        let mut corrections = Vec::new();
        if self.brdf {
            corrections.push(Correction::Brdf);
        }
        if self.topo {
            corrections.push(Correction::Topographic);
        }
        corrections
    }
}

fn main() -> Result<()> {
    fmt::init();

    let args = Args::parse();

    let corrections = args.corrections();
    if corrections.is_empty() {
        eprintln!(r#"ERROR: No options selected. Please choose either "--brdf" or "--topo"."#);
        process::exit(1);
    }

    DriverManager::register_all();

    let files = scene::locate(&args.correction.input_dir, &args.image_id)?;
    for correction in corrections {
        let output = args.correction.run(correction, &files)?;
        let path = output.display();
        tracing::info!(%correction, %path, "correction done");
    }

    Ok(())
}
