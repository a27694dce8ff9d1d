//! # Pixel to sky
//!
//! Map every pixel of a solved image to right ascension and declination.
//!
//! The solution is looked up next to the image: `sky.fits` is solved into `sky.wcs`. A `.wcs`
//! path may also be passed directly, in which case the image size comes from the `IMAGEW` and
//! `IMAGEH` keywords astrometry.net writes into it.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::iproduct;
use ndarray::Array2;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::constants::{FITS_SUFFIX, WCS_SUFFIX};
use crate::fits_io::read_image_shape;
use crate::plate_solver::{PlateSolver, SolveMode};
use crate::sky_dataset::SkyDataset;
use crate::wcs::WcsSolution;

/// Location of the solution for `image`: the `.wcs` sidecar of a `.fits` image, or the
/// `.wcs` file itself.
pub fn solution_path(image: &Utf8Path) -> Result<Utf8PathBuf, AzelError> {
    match image.extension() {
        Some(FITS_SUFFIX) => Ok(image.with_extension(WCS_SUFFIX)),
        Some(WCS_SUFFIX) => Ok(image.to_owned()),
        _ => Err(AzelError::InvalidInput(format!(
            "please convert {image} to a grayscale .fits image"
        ))),
    }
}

/// RA and Dec grids, in degrees, of a `rows × cols` image, filled in row-major order.
pub fn radec_grid(wcs: &WcsSolution, rows: usize, cols: usize) -> (Array2<f64>, Array2<f64>) {
    let mut ra = Array2::zeros((rows, cols));
    let mut dec = Array2::zeros((rows, cols));
    for (y, x) in iproduct!(0..rows, 0..cols) {
        (ra[[y, x]], dec[[y, x]]) = wcs.pixel_to_world(x as f64, y as f64);
    }
    (ra, dec)
}

/// Compute the RA/Dec of every pixel of `image`, solving it first if asked.
///
/// Arguments
/// ---------
/// * `image`: the aggregated `.fits` image, or its `.wcs` solution
/// * `mode`: run `solver` first, or use the solution already on disk
/// * `solver`: the plate solver to run in [`SolveMode::Solve`]
///
/// Return
/// ------
/// * a [`SkyDataset`] holding the `ra`/`dec` layers over the image grid, with `filename` set to
///   `image`
/// * [`AzelError::InvalidInput`] for another suffix, [`AzelError::SolverFailed`] from the
///   solver, [`AzelError::SolutionMissing`] when no solution file exists
pub fn fits_to_radec(
    image: &Utf8Path,
    mode: SolveMode,
    solver: &dyn PlateSolver,
) -> Result<SkyDataset, AzelError> {
    let wcs_path = solution_path(image)?;

    if mode == SolveMode::Solve {
        solver.solve(image)?;
    }

    let (rows, cols) = read_image_shape(image)?;

    if !wcs_path.is_file() {
        return Err(AzelError::SolutionMissing(wcs_path));
    }
    let wcs = WcsSolution::from_fits(&wcs_path)?;
    info!("registering {rows}x{cols} pixels of {image} with {wcs_path}");

    let (ra, dec) = radec_grid(&wcs, rows, cols);
    debug!(
        "RA [{:.3}, {:.3}], Dec [{:.3}, {:.3}]",
        ra.iter().copied().fold(f64::INFINITY, f64::min),
        ra.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        dec.iter().copied().fold(f64::INFINITY, f64::min),
        dec.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    );

    Ok(SkyDataset::new(image.to_owned(), ra, dec))
}
