use std::path::{Path, PathBuf};

use anyhow::Result;
use gdal::{raster::Buffer, Dataset, DriverManager, Metadata};

use crate::correction::{CorrectionError, ViewGeometry};

/// Metadata domain holding the ENVI header fields (wavelengths, fwhm, ...).
const ENVI_DOMAIN: &str = "ENVI";
/// ENVI header fields carried over to corrected images. The driver writes the layout fields itself.
const SPECTRAL_KEYS: [&str; 4] = ["wavelength", "wavelength_units", "fwhm", "bbl"];

/// Per-band read access to an image.
///
/// Band indices are 1-based, as in GDAL.
pub trait BandSource {
    fn size(&self) -> (usize, usize);
    fn read_band(&self, index: usize) -> Result<Buffer<f32>>;
}

impl BandSource for Dataset {
    fn size(&self) -> (usize, usize) {
        self.raster_size()
    }

    fn read_band(&self, index: usize) -> Result<Buffer<f32>> {
        let band = self.rasterband(index)?;
        let size = band.size();
        Ok(band.read_as::<f32>((0, 0), size, size, None)?)
    }
}

/// An image loaded into memory, one `f32` buffer per band.
pub struct Raster {
    path: PathBuf,
    size: (usize, usize),
    pub no_data: f32,
    pub bands: Vec<Buffer<f32>>,
    descriptions: Vec<String>,
    projection: String,
    geo_transform: Option<[f64; 6]>,
    envi_metadata: Vec<(String, String)>,
    geometry: Option<ViewGeometry>,
}

impl Raster {
    pub fn open(path: &Path, no_data: f32) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let size = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;

        let mut bands = Vec::with_capacity(band_count);
        let mut descriptions = Vec::with_capacity(band_count);
        for index in 1..=band_count {
            bands.push(dataset.read_band(index)?);
            descriptions.push(dataset.rasterband(index)?.description()?);
        }

        let envi_metadata = dataset
            .metadata_domain(ENVI_DOMAIN)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let (key, value) = item.split_once('=')?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();

        {
            let path = path.display();
            tracing::debug!(
                %path,
                width = size.0,
                height = size.1,
                band_count,
                "loaded raster"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            size,
            no_data,
            bands,
            descriptions,
            projection: dataset.projection(),
            geo_transform: dataset.geo_transform().ok(),
            envi_metadata,
            geometry: None,
        })
    }

    /// Builds an in-memory raster without a backing dataset.
    #[cfg(test)]
    pub fn from_bands(size: (usize, usize), bands: Vec<Buffer<f32>>, no_data: f32) -> Self {
        Self {
            path: PathBuf::new(),
            size,
            no_data,
            descriptions: vec![String::new(); bands.len()],
            bands,
            projection: String::new(),
            geo_transform: None,
            envi_metadata: Vec::new(),
            geometry: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn geometry(&self) -> Option<&ViewGeometry> {
        self.geometry.as_ref()
    }

    /// Annotates the raster with per-pixel view and illumination geometry.
    pub fn attach_geometry(&mut self, geometry: ViewGeometry) -> Result<(), CorrectionError> {
        if geometry.size != self.size {
            return Err(CorrectionError::SizeMismatch {
                expected: self.size,
                actual: geometry.size,
            });
        }
        self.geometry = Some(geometry);
        Ok(())
    }

    pub fn is_valid(&self, value: f32) -> bool {
        value != self.no_data && value.is_finite()
    }

    /// Writes `bands` to `path` on the grid of this raster.
    pub fn write(&self, path: &Path, format: &str, bands: &mut [Buffer<f32>]) -> Result<()> {
        let mut output = DriverManager::get_driver_by_name(format)?
            .create_with_band_type::<f32, _>(path, self.size.0, self.size.1, bands.len())?;
        if !self.projection.is_empty() {
            output.set_projection(&self.projection)?;
        }
        if let Some(geo_transform) = &self.geo_transform {
            output.set_geo_transform(geo_transform)?;
        }
        for (key, value) in &self.envi_metadata {
            if SPECTRAL_KEYS.contains(&key.as_str()) {
                output.set_metadata_item(key, value, ENVI_DOMAIN)?;
            }
        }

        for (index, (buffer, description)) in
            bands.iter_mut().zip(&self.descriptions).enumerate()
        {
            let mut band = output.rasterband(index + 1)?;
            band.set_no_data_value(Some(self.no_data as f64))?;
            if !description.is_empty() {
                band.set_description(description)?;
            }
            band.write((0, 0), self.size, buffer)?;
        }

        let path = path.display();
        tracing::info!(%path, "wrote raster");
        Ok(())
    }
}
