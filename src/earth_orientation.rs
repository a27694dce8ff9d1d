//! # Earth orientation: precession of the equator and equinox
//!
//! Plate solutions from astrometry.net are expressed in the ICRS/J2000 frame, while the local
//! horizon of the observer is attached to the equator and equinox *of date*. This module provides
//! the IAU 1976 precession matrix bridging the two, plus the elementary frame rotations it is
//! assembled from.
//!
//! ```text
//! x_date = P(t) · x_J2000,     P(t) = R3(−z) · R2(θ) · R3(−ζ)
//! ```
//!
//! `Ri(a)` are *frame* rotations (the coordinate axes turn by `a`, vectors stay fixed), the
//! convention of the Astronomical Almanac. Nutation (≲ 20″) is not applied.
use nalgebra::{Matrix3, Rotation3, Unit, Vector3};

use crate::constants::{Radian, DAYS_PER_CENTURY, MJD, RADEG, T2000};

/// Principal axis of a frame rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn unit(self) -> Unit<Vector3<f64>> {
        match self {
            Axis::X => Vector3::x_axis(),
            Axis::Y => Vector3::y_axis(),
            Axis::Z => Vector3::z_axis(),
        }
    }
}

/// Rotation of the coordinate frame by `angle` around `axis`.
///
/// A frame rotation by `a` is the active rotation of vectors by `−a`, so that
/// `frame_rotation(a, Axis::Z) · (1, 0, 0)ᵀ = (cos a, −sin a, 0)ᵀ`.
pub fn frame_rotation(angle: Radian, axis: Axis) -> Matrix3<f64> {
    Rotation3::from_axis_angle(&axis.unit(), -angle).into()
}

/// IAU 1976 precession angles (ζ, z, θ) in radians for an epoch in MJD (TT).
///
/// ```text
/// ζ(T) = (0.6406161 + 0.0000839·T + 0.0000050·T²) · T  [deg]
/// z(T) = (0.6406161 + 0.0003041·T + 0.0000051·T²) · T  [deg]
/// θ(T) = (0.5567530 − 0.0001185·T − 0.0000116·T²) · T  [deg]
/// ```
/// with `T` in Julian centuries since J2000.0.
pub fn precession_angles(tjm: MJD) -> (Radian, Radian, Radian) {
    let t = (tjm - T2000) / DAYS_PER_CENTURY;

    let zeta = ((0.0000050 * t + 0.0000839) * t + 0.6406161) * t * RADEG;
    let z = ((0.0000051 * t + 0.0003041) * t + 0.6406161) * t * RADEG;
    let theta = ((-0.0000116 * t - 0.0001185) * t + 0.5567530) * t * RADEG;

    (zeta, z, theta)
}

/// Precession matrix from the J2000 mean equator/equinox to the mean equator/equinox of `tjm`.
///
/// Arguments
/// ---------
/// * `tjm`: Modified Julian Date in TT
///
/// Return
/// ------
/// * `P` such that `x_date = P · x_J2000`
pub fn precession_matrix(tjm: MJD) -> Matrix3<f64> {
    let (zeta, z, theta) = precession_angles(tjm);
    frame_rotation(-z, Axis::Z) * frame_rotation(theta, Axis::Y) * frame_rotation(-zeta, Axis::Z)
}

/// Unit vector of an equatorial position given in radians
pub fn radec_to_unit(ra: Radian, dec: Radian) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Equatorial position (ra in [0, 2π), dec) in radians of a vector
pub fn unit_to_radec(v: &Vector3<f64>) -> (Radian, Radian) {
    let ra = v.y.atan2(v.x).rem_euclid(std::f64::consts::TAU);
    let dec = (v.z / v.norm()).clamp(-1.0, 1.0).asin();
    (ra, dec)
}

#[cfg(test)]
mod earth_orientation_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_frame_rotation_convention() {
        let a = 0.3f64;
        let r = frame_rotation(a, Axis::Z);
        let v = r * Vector3::x();
        assert_relative_eq!(v.x, a.cos(), epsilon = 1e-15);
        assert_relative_eq!(v.y, -a.sin(), epsilon = 1e-15);
        assert_relative_eq!(v.z, 0.0, epsilon = 1e-15);

        let r = frame_rotation(a, Axis::Y);
        let v = r * Vector3::x();
        assert_relative_eq!(v.z, a.sin(), epsilon = 1e-15);
    }

    #[test]
    fn test_precession_identity_at_j2000() {
        let p = precession_matrix(T2000);
        assert_relative_eq!(p, Matrix3::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_precession_is_orthonormal() {
        let p = precession_matrix(80000.0);
        assert_relative_eq!(p * p.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(p.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_precession_of_the_equinox_over_a_century() {
        // the J2000 vernal equinox seen from the equator of J2100
        let p = precession_matrix(T2000 + DAYS_PER_CENTURY);
        let (ra, dec) = unit_to_radec(&(p * radec_to_unit(0.0, 0.0)));
        assert_relative_eq!(ra.to_degrees(), 1.2816605333215498, epsilon = 1e-9);
        assert_relative_eq!(dec.to_degrees(), 0.5565880974415273, epsilon = 1e-9);
    }

    #[test]
    fn test_precess_m31_to_2010() {
        let p = precession_matrix(T2000 + 3652.5);
        let v = radec_to_unit(10.684708f64.to_radians(), 41.26875f64.to_radians());
        let (ra, dec) = unit_to_radec(&(p * v));
        assert_relative_eq!(ra.to_degrees(), 10.821959710153093, epsilon = 1e-9);
        assert_relative_eq!(dec.to_degrees(), 41.323446441214905, epsilon = 1e-9);
    }

    #[test]
    fn test_radec_unit_round_trip_wraps_ra() {
        let (ra, dec) = unit_to_radec(&radec_to_unit(-0.5, 0.2));
        assert_relative_eq!(ra, std::f64::consts::TAU - 0.5, epsilon = 1e-14);
        assert_relative_eq!(dec, 0.2, epsilon = 1e-14);
    }
}
