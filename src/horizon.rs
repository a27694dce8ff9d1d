//! # Sky to horizon
//!
//! Convert the per-pixel equatorial grid to the local horizon of the camera: azimuth measured
//! from north through east, and elevation above the horizon, both in degrees.
//!
//! ## Model
//!
//! 1. RA/Dec from the plate solution are J2000 mean positions; they are precessed to the mean
//!    equator and equinox of the observation date ([`precession_matrix`], TT).
//! 2. The local hour angle is `H = GMST(UT1) + λ − α`, UT1 approximated by UTC.
//! 3. The equatorial → horizontal rotation:
//!
//! ```text
//! sin el = sin φ sin δ + cos φ cos δ cos H
//! tan az = −sin H cos δ / (cos φ sin δ − sin φ cos δ cos H)
//! ```
//!
//! Refraction, nutation and aberration are ignored: together they stay below an arcminute
//! above 10° elevation, a fraction of a pixel for the all-sky and auroral imagers this is
//! used with.
use hifitime::Epoch;
use itertools::izip;
use nalgebra::Matrix3;
use ndarray::Array2;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::constants::{Degree, Radian};
use crate::earth_orientation::{precession_matrix, radec_to_unit, unit_to_radec};
use crate::sky_dataset::{HorizonLayers, SkyDataset};
use crate::time::{local_sidereal_time, resolve_time, HeaderTimeSource, TimeSpec};

/// Geodetic position of the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    lat: Degree,
    lon: Degree,
}

impl Observer {
    /// Arguments
    /// ---------
    /// * `lat`: geodetic latitude in degrees, in [-90, 90]
    /// * `lon`: longitude in degrees, east positive
    ///
    /// Return
    /// ------
    /// * [`AzelError::InvalidObserver`] for non-finite values or a latitude out of range
    pub fn new(lat: Degree, lon: Degree) -> Result<Self, AzelError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(AzelError::InvalidObserver(format!(
                "latitude {lat}, longitude {lon}"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AzelError::InvalidObserver(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        Ok(Observer { lat, lon })
    }

    pub fn lat(&self) -> Degree {
        self.lat
    }

    pub fn lon(&self) -> Degree {
        self.lon
    }
}

/// Everything the equatorial → horizontal transform needs for one observer and instant.
#[derive(Debug, Clone)]
pub struct HorizonFrame {
    precession: Matrix3<f64>,
    lst: Radian,
    sin_lat: f64,
    cos_lat: f64,
}

impl HorizonFrame {
    pub fn new(observer: &Observer, epoch: &Epoch) -> Self {
        let (sin_lat, cos_lat) = observer.lat.to_radians().sin_cos();
        HorizonFrame {
            precession: precession_matrix(epoch.to_mjd_tt_days()),
            lst: local_sidereal_time(epoch, observer.lon.to_radians()),
            sin_lat,
            cos_lat,
        }
    }

    /// Azimuth in [0, 360) and elevation of a J2000 position, all in degrees.
    pub fn azel(&self, ra: Degree, dec: Degree) -> (Degree, Degree) {
        let of_date = self.precession * radec_to_unit(ra.to_radians(), dec.to_radians());
        let (ra, dec) = unit_to_radec(&of_date);

        let hour_angle = self.lst - ra;
        let (sin_h, cos_h) = hour_angle.sin_cos();
        let (sin_dec, cos_dec) = dec.sin_cos();

        let sin_el = self.sin_lat * sin_dec + self.cos_lat * cos_dec * cos_h;
        let az = (-sin_h * cos_dec).atan2(self.cos_lat * sin_dec - self.sin_lat * cos_dec * cos_h);

        (
            az.to_degrees().rem_euclid(360.0),
            sin_el.clamp(-1.0, 1.0).asin().to_degrees(),
        )
    }
}

/// Azimuth/elevation grids for co-registered RA/Dec grids.
pub fn azel_grid(
    ra: &Array2<f64>,
    dec: &Array2<f64>,
    frame: &HorizonFrame,
) -> (Array2<f64>, Array2<f64>) {
    let mut az = Array2::zeros(ra.raw_dim());
    let mut el = Array2::zeros(ra.raw_dim());
    for (az, el, &ra, &dec) in izip!(az.iter_mut(), el.iter_mut(), ra.iter(), dec.iter()) {
        (*az, *el) = frame.azel(ra, dec);
    }
    (az, el)
}

/// Add azimuth/elevation layers to `dataset`.
///
/// Arguments
/// ---------
/// * `dataset`: the RA/Dec grid of a solved image
/// * `observer`: camera location; without it the dataset is left untouched
/// * `time`: caller-supplied observation time, else read through `header` from the solved image
/// * `header`: fallback time source
///
/// Return
/// ------
/// * `true` when the layers were added, `false` when no observer was given, or the time
///   resolution error ([`AzelError::MissingTime`], [`AzelError::TimeParseError`])
pub fn radec_to_azel(
    dataset: &mut SkyDataset,
    observer: Option<&Observer>,
    time: Option<&TimeSpec>,
    header: &dyn HeaderTimeSource,
) -> Result<bool, AzelError> {
    let Some(observer) = observer else {
        return Ok(false);
    };

    let resolved = resolve_time(time, &dataset.filename, header)?;
    info!("image time: {}", resolved.epoch);

    let frame = HorizonFrame::new(observer, &resolved.epoch);
    let (az, el) = azel_grid(&dataset.ra, &dataset.dec, &frame);
    debug!(
        "az/el for {:?} pixels at ({}, {})",
        az.dim(),
        observer.lat,
        observer.lon
    );

    dataset.horizon = Some(HorizonLayers {
        az,
        el,
        observer: *observer,
        time: resolved.epoch,
    });
    Ok(true)
}
