//! # Sky dataset
//!
//! The result of plate scaling: for every pixel of the solved image, its right ascension and
//! declination and, when the camera location is known, its azimuth and elevation.
//!
//! ## netCDF layout
//!
//! ```text
//! dimensions:  y = rows, x = columns
//! variables:   int y(y), int x(x)                    pixel indices
//!              double ra(y, x), dec(y, x)            units = "degrees"
//!              double az(y, x), el(y, x)             only with an observer
//! attributes:  filename                               the solved image
//!              lat, lon, time                         only with an observer
//! ```
use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use ndarray::Array2;
use netcdf3::{DataSet, FileWriter, Version};
use tracing::info;

use crate::azel_errors::AzelError;
use crate::horizon::Observer;
use crate::time::format_iso_utc;

/// Layers added by the sky-to-horizon conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonLayers {
    pub az: Array2<f64>,
    pub el: Array2<f64>,
    pub observer: Observer,
    pub time: Epoch,
}

/// Per-pixel sky coordinates of one image, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyDataset {
    /// Image the coordinates were computed for
    pub filename: Utf8PathBuf,
    pub ra: Array2<f64>,
    pub dec: Array2<f64>,
    pub horizon: Option<HorizonLayers>,
}

const Y_DIM: &str = "y";
const X_DIM: &str = "x";
const UNITS: &str = "degrees";

fn nc_failed<E: std::fmt::Debug>(path: &Utf8Path, e: E) -> AzelError {
    AzelError::write_failed(path, format!("{e:?}"))
}

impl SkyDataset {
    pub fn new(filename: Utf8PathBuf, ra: Array2<f64>, dec: Array2<f64>) -> Self {
        debug_assert_eq!(ra.dim(), dec.dim());
        SkyDataset {
            filename,
            ra,
            dec,
            horizon: None,
        }
    }

    /// `(rows, columns)` of the pixel grid
    pub fn dim(&self) -> (usize, usize) {
        self.ra.dim()
    }

    /// Persist the dataset as a classic netCDF file, replacing `path` if it exists.
    pub fn write_netcdf(&self, path: &Utf8Path) -> Result<(), AzelError> {
        info!("saving {path}");
        let (rows, cols) = self.dim();

        let mut layers: Vec<(&str, &Array2<f64>)> = vec![("ra", &self.ra), ("dec", &self.dec)];
        if let Some(horizon) = &self.horizon {
            layers.push(("az", &horizon.az));
            layers.push(("el", &horizon.el));
        }

        let mut data_set = DataSet::new();
        data_set.add_fixed_dim(Y_DIM, rows).map_err(|e| nc_failed(path, e))?;
        data_set.add_fixed_dim(X_DIM, cols).map_err(|e| nc_failed(path, e))?;
        data_set.add_var_i32(Y_DIM, &[Y_DIM]).map_err(|e| nc_failed(path, e))?;
        data_set.add_var_i32(X_DIM, &[X_DIM]).map_err(|e| nc_failed(path, e))?;
        for (name, _) in &layers {
            data_set
                .add_var_f64(name, &[Y_DIM, X_DIM])
                .map_err(|e| nc_failed(path, e))?;
            data_set
                .add_var_attr_string(name, "units", UNITS)
                .map_err(|e| nc_failed(path, e))?;
        }
        data_set
            .add_global_attr_string("filename", self.filename.as_str())
            .map_err(|e| nc_failed(path, e))?;
        if let Some(horizon) = &self.horizon {
            data_set
                .add_global_attr_f64("lat", vec![horizon.observer.lat()])
                .map_err(|e| nc_failed(path, e))?;
            data_set
                .add_global_attr_f64("lon", vec![horizon.observer.lon()])
                .map_err(|e| nc_failed(path, e))?;
            data_set
                .add_global_attr_string("time", format_iso_utc(&horizon.time))
                .map_err(|e| nc_failed(path, e))?;
        }

        let mut writer = FileWriter::open(path).map_err(|e| nc_failed(path, e))?;
        writer
            .set_def(&data_set, Version::Classic, 0)
            .map_err(|e| nc_failed(path, e))?;
        let y: Vec<i32> = (0..rows as i32).collect();
        let x: Vec<i32> = (0..cols as i32).collect();
        writer.write_var_i32(Y_DIM, &y).map_err(|e| nc_failed(path, e))?;
        writer.write_var_i32(X_DIM, &x).map_err(|e| nc_failed(path, e))?;
        for (name, layer) in &layers {
            let values: Vec<f64> = layer.iter().copied().collect();
            writer
                .write_var_f64(name, &values)
                .map_err(|e| nc_failed(path, e))?;
        }
        writer.close().map_err(|e| nc_failed(path, e))?;
        Ok(())
    }
}
