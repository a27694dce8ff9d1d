//! # Plate scaling pipeline
//!
//! One invocation turns a stack of raw frames into a per-pixel coordinate dataset:
//!
//! ```text
//! stack ──collapse_stack──▶ mean image ──write_fits──▶ <stem>.fits
//!                                                         │
//!                              PlateSolver (optional) ◀───┘
//!                                                         │
//!               fits_to_radec ◀── <stem>.wcs ◀────────────┘
//!                     │
//!               radec_to_azel (when the observer is known)
//!                     │
//!               write_netcdf ──▶ <stem>.nc
//! ```
//!
//! When no time is given and the input is a FITS file, its `time_key` card is copied into the
//! aggregated image, where the header time fallback finds it.
//!
//! The observer location is the only optional input: without it the dataset carries RA/Dec
//! only and a warning is logged. Every other failure aborts the run, and nothing is written
//! past the failing step.
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::azel_errors::AzelError;
use crate::constants::{DATASET_SUFFIX, DEFAULT_TIME_KEY, FITS_SUFFIX};
use crate::fits_io::{read_key_string, write_fits_with_keys};
use crate::horizon::{radec_to_azel, Observer};
use crate::plate_solver::{PlateSolver, SolveMode};
use crate::radec::fits_to_radec;
use crate::sky_dataset::SkyDataset;
use crate::stack::{collapse_stack, read_site_location, FrameSelection, Reduction, StackFormat};
use crate::time::{FitsKeywordTime, TimeSpec};

/// Options of one plate scaling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateScaleConfig {
    /// Dataset destination; also names the intermediate FITS image
    pub outfn: Option<Utf8PathBuf>,
    /// Observer latitude and longitude in degrees, else read from the input file
    pub latlon: Option<(f64, f64)>,
    /// Observation time overriding the one stored in the input
    pub time: Option<TimeSpec>,
    pub selection: FrameSelection,
    pub reduction: Reduction,
    pub solve: SolveMode,
    /// FITS keyword holding the frame time, used when no other time is known
    pub time_key: String,
}

impl Default for PlateScaleConfig {
    fn default() -> Self {
        PlateScaleConfig {
            outfn: None,
            latlon: None,
            time: None,
            selection: FrameSelection::default(),
            reduction: Reduction::default(),
            solve: SolveMode::default(),
            time_key: DEFAULT_TIME_KEY.to_string(),
        }
    }
}

impl PlateScaleConfig {
    pub fn with_outfn(mut self, outfn: impl Into<Utf8PathBuf>) -> Self {
        self.outfn = Some(outfn.into());
        self
    }

    pub fn with_latlon(mut self, lat: f64, lon: f64) -> Self {
        self.latlon = Some((lat, lon));
        self
    }

    pub fn with_time(mut self, time: impl Into<TimeSpec>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_selection(mut self, selection: FrameSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_solve(mut self, solve: SolveMode) -> Self {
        self.solve = solve;
        self
    }

    pub fn with_time_key(mut self, key: impl Into<String>) -> Self {
        self.time_key = key.into();
        self
    }

    /// Intermediate image: `<outfn stem>.fits`, else `<input stem>.fits`.
    pub fn fits_path(&self, input: &Utf8Path) -> Utf8PathBuf {
        self.outfn
            .as_deref()
            .unwrap_or(input)
            .with_extension(FITS_SUFFIX)
    }

    /// Final dataset: `outfn`, else the solved image with the `.nc` suffix.
    pub fn dataset_path(&self, solved: &Utf8Path) -> Utf8PathBuf {
        match &self.outfn {
            Some(outfn) => outfn.clone(),
            None => solved.with_extension(DATASET_SUFFIX),
        }
    }
}

/// Outcome of [`do_platescale`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlateScale {
    pub dataset: SkyDataset,
    /// The aggregated image handed to the solver
    pub fits_path: Utf8PathBuf,
    /// Where the dataset was written
    pub output: Utf8PathBuf,
}

/// Run the whole pipeline on `input`.
///
/// Arguments
/// ---------
/// * `input`: stack or image file, see [`crate::stack::StackFormat`]
/// * `config`: run options
/// * `solver`: plate solver used when `config.solve` is [`SolveMode::Solve`]
///
/// Return
/// ------
/// * the dataset and the paths written, or the first error met; the dataset file is only
///   written when every previous step succeeded
pub fn do_platescale(
    input: &Utf8Path,
    config: &PlateScaleConfig,
    solver: &dyn PlateSolver,
) -> Result<PlateScale, AzelError> {
    fs::metadata(input)?;
    let fits_path = config.fits_path(input);

    let aggregated = collapse_stack(
        input,
        &config.selection,
        config.reduction,
        config.time.clone(),
    )?;
    let time_card = match (&aggregated.time, StackFormat::from_path(input)?) {
        (None, StackFormat::Fits) => read_key_string(input, &config.time_key)?,
        _ => None,
    };
    let keys: Vec<(&str, &str)> = time_card
        .iter()
        .map(|value| (config.time_key.as_str(), value.as_str()))
        .collect();
    write_fits_with_keys(&aggregated.image, &fits_path, &keys)?;

    let latlon = match config.latlon {
        Some(latlon) => Some(latlon),
        None => read_site_location(input)?,
    };
    let observer = latlon
        .map(|(lat, lon)| Observer::new(lat, lon))
        .transpose()?;

    let mut dataset = fits_to_radec(&fits_path, config.solve, solver)?;

    let header = FitsKeywordTime::new(config.time_key.as_str());
    if !radec_to_azel(&mut dataset, observer.as_ref(), aggregated.time.as_ref(), &header)? {
        warn!("no observer location for {input}, writing RA/Dec only (pass --latlon for az/el)");
    }

    let output = config.dataset_path(&dataset.filename);
    dataset.write_netcdf(&output)?;
    info!("plate scale of {input} done");

    Ok(PlateScale {
        dataset,
        fits_path,
        output,
    })
}
