//! # World coordinate system of a solved image
//!
//! astrometry.net describes its solution as a FITS header using the gnomonic (`TAN`)
//! projection, with Simple Imaging Polynomial distortion terms (`TAN-SIP`) when asked for a
//! polynomial fit. [`WcsSolution`] holds the parameters of that header and maps pixels to
//! equatorial coordinates.
//!
//! ## Pixel to sky
//!
//! For a 0-based pixel `(x, y)`:
//!
//! ```text
//! u = x + 1 − CRPIX1,  v = y + 1 − CRPIX2
//! (u, v) += (Σ A_p_q u^p v^q,  Σ B_p_q u^p v^q)        (SIP only)
//! (ξ, η) = CD · (u, v)                                 [deg]
//! φ = atan2(ξ, −η),  θ = atan(180 / (π r)),  r = √(ξ² + η²)
//! ```
//!
//! followed by the rotation from native spherical `(φ, θ)` to celestial `(α, δ)` around the
//! pole `(CRVAL1, CRVAL2, LONPOLE)`, as defined in Calabretta & Greisen (2002).
use camino::Utf8Path;
use ndarray::Array2;
use tracing::debug;

use crate::azel_errors::AzelError;
use crate::constants::Degree;
use crate::fits_io::{open, read_key_optional};

/// SIP forward distortion polynomials.
#[derive(Debug, Clone, PartialEq)]
pub struct Sip {
    /// `a[[p, q]]` multiplies `u^p v^q` in the x correction
    pub a: Array2<f64>,
    /// `b[[p, q]]` multiplies `u^p v^q` in the y correction
    pub b: Array2<f64>,
}

impl Sip {
    /// Distortion `(f(u, v), g(u, v))` added to the relative pixel coordinates.
    pub fn distortion(&self, u: f64, v: f64) -> (f64, f64) {
        (polynomial(&self.a, u, v), polynomial(&self.b, u, v))
    }
}

fn polynomial(coeffs: &Array2<f64>, u: f64, v: f64) -> f64 {
    let mut sum = 0.0;
    let mut u_p = 1.0;
    for row in coeffs.rows() {
        let mut v_q = 1.0;
        for &c in row {
            sum += c * u_p * v_q;
            v_q *= v;
        }
        u_p *= u;
    }
    sum
}

/// A TAN or TAN-SIP plate solution.
#[derive(Debug, Clone, PartialEq)]
pub struct WcsSolution {
    /// Sky coordinates (RA, Dec) of the reference pixel, degrees
    pub crval: [Degree; 2],
    /// Reference pixel, 1-based FITS convention
    pub crpix: [f64; 2],
    /// Linear transform to intermediate world coordinates, degrees per pixel
    pub cd: [[f64; 2]; 2],
    /// Native longitude of the celestial pole, degrees
    pub lonpole: Degree,
    pub sip: Option<Sip>,
}

impl WcsSolution {
    /// Pure TAN solution with the default `LONPOLE`.
    pub fn new(crval: [Degree; 2], crpix: [f64; 2], cd: [[f64; 2]; 2]) -> Self {
        WcsSolution {
            crval,
            crpix,
            cd,
            lonpole: default_lonpole(crval[1]),
            sip: None,
        }
    }

    pub fn with_sip(mut self, sip: Sip) -> Self {
        self.sip = Some(sip);
        self
    }

    pub fn with_lonpole(mut self, lonpole: Degree) -> Self {
        self.lonpole = lonpole;
        self
    }

    /// Read the solution from the primary header of a `.wcs` (or solved `.fits`) file.
    ///
    /// Arguments
    /// ---------
    /// * `path`: FITS file whose primary header holds the solution
    ///
    /// Return
    /// ------
    /// * the solution, [`AzelError::Fits`] if the file cannot be opened, [`AzelError::InvalidWcs`]
    ///   if the projection is not `TAN`/`TAN-SIP` or a required keyword is missing
    pub fn from_fits(path: &Utf8Path) -> Result<Self, AzelError> {
        let mut fptr = open(path)?;
        let hdu = fptr.primary_hdu().map_err(|e| AzelError::fits(path, e))?;
        let invalid = |reason: String| AzelError::InvalidWcs {
            path: path.to_owned(),
            reason,
        };

        let mut key = |name: &str| -> Option<f64> { read_key_optional(&hdu, &mut fptr, name) };

        let crval = [
            key("CRVAL1").ok_or_else(|| invalid("missing CRVAL1".into()))?,
            key("CRVAL2").ok_or_else(|| invalid("missing CRVAL2".into()))?,
        ];
        let crpix = [
            key("CRPIX1").ok_or_else(|| invalid("missing CRPIX1".into()))?,
            key("CRPIX2").ok_or_else(|| invalid("missing CRPIX2".into()))?,
        ];
        let cd = match key("CD1_1") {
            Some(cd11) => [
                [cd11, key("CD1_2").unwrap_or(0.0)],
                [key("CD2_1").unwrap_or(0.0), key("CD2_2").unwrap_or(0.0)],
            ],
            None => {
                let (Some(cdelt1), Some(cdelt2)) = (key("CDELT1"), key("CDELT2")) else {
                    return Err(invalid("no CD matrix and no CDELT scale".into()));
                };
                [
                    [
                        cdelt1 * key("PC1_1").unwrap_or(1.0),
                        cdelt1 * key("PC1_2").unwrap_or(0.0),
                    ],
                    [
                        cdelt2 * key("PC2_1").unwrap_or(0.0),
                        cdelt2 * key("PC2_2").unwrap_or(1.0),
                    ],
                ]
            }
        };
        let lonpole = key("LONPOLE").unwrap_or_else(|| default_lonpole(crval[1]));
        if cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0] == 0.0 {
            return Err(invalid("singular linear transform".into()));
        }

        let ctype1: String = read_key_optional(&hdu, &mut fptr, "CTYPE1")
            .ok_or_else(|| invalid("missing CTYPE1".into()))?;
        let ctype2: String = read_key_optional(&hdu, &mut fptr, "CTYPE2")
            .ok_or_else(|| invalid("missing CTYPE2".into()))?;
        let has_sip = check_ctype(&ctype1, "RA").map_err(&invalid)?;
        check_ctype(&ctype2, "DEC").map_err(&invalid)?;

        let sip = if has_sip {
            let mut coeffs = |prefix: &str| -> Result<Array2<f64>, AzelError> {
                let order: f64 = read_key_optional(&hdu, &mut fptr, &format!("{prefix}_ORDER"))
                    .ok_or_else(|| invalid(format!("TAN-SIP without {prefix}_ORDER")))?;
                if !(0.0..=9.0).contains(&order) || order.fract() != 0.0 {
                    return Err(invalid(format!("{prefix}_ORDER = {order}")));
                }
                let n = order as usize + 1;
                let mut coeffs = Array2::zeros((n, n));
                for ((p, q), c) in coeffs.indexed_iter_mut() {
                    if p + q < n {
                        *c = read_key_optional(&hdu, &mut fptr, &format!("{prefix}_{p}_{q}"))
                            .unwrap_or(0.0);
                    }
                }
                Ok(coeffs)
            };
            let a = coeffs("A")?;
            let b = coeffs("B")?;
            Some(Sip { a, b })
        } else {
            None
        };

        debug!(
            "{path}: TAN{} at ({}, {}), crpix ({}, {})",
            if sip.is_some() { "-SIP" } else { "" },
            crval[0],
            crval[1],
            crpix[0],
            crpix[1]
        );
        Ok(WcsSolution {
            crval,
            crpix,
            cd,
            lonpole,
            sip,
        })
    }

    /// Equatorial coordinates (RA in [0, 360), Dec) in degrees of the 0-based pixel `(x, y)`.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> (Degree, Degree) {
        let mut u = x + 1.0 - self.crpix[0];
        let mut v = y + 1.0 - self.crpix[1];
        if let Some(sip) = &self.sip {
            let (f, g) = sip.distortion(u, v);
            u += f;
            v += g;
        }

        let xi = self.cd[0][0] * u + self.cd[0][1] * v;
        let eta = self.cd[1][0] * u + self.cd[1][1] * v;

        // native spherical coordinates of the gnomonic projection
        let r = xi.hypot(eta);
        let phi = if r == 0.0 { 0.0 } else { xi.atan2(-eta) };
        let theta = (180.0 / std::f64::consts::PI).atan2(r);

        let (sin_theta, cos_theta) = theta.sin_cos();
        let (sin_dp, cos_dp) = self.crval[1].to_radians().sin_cos();
        let (sin_dphi, cos_dphi) = (phi - self.lonpole.to_radians()).sin_cos();

        let sin_dec = sin_theta * sin_dp + cos_theta * cos_dp * cos_dphi;
        let dra = (-cos_theta * sin_dphi).atan2(sin_theta * cos_dp - cos_theta * sin_dp * cos_dphi);

        let ra = (self.crval[0] + dra.to_degrees()).rem_euclid(360.0);
        let dec = sin_dec.clamp(-1.0, 1.0).asin().to_degrees();
        (ra, dec)
    }
}

/// `LONPOLE` default for zenithal projections: 180° unless the reference point is the pole.
fn default_lonpole(crval2: Degree) -> Degree {
    if crval2 >= 90.0 {
        0.0
    } else {
        180.0
    }
}

/// Check `RA---TAN[-SIP]` / `DEC--TAN[-SIP]`, returning whether SIP terms are declared.
fn check_ctype(ctype: &str, axis: &str) -> Result<bool, String> {
    let ctype = ctype.trim();
    let projection = ctype.get(5..8);
    if !ctype.starts_with(axis) || projection != Some("TAN") {
        return Err(format!(
            "unsupported axis type {ctype:?}, expected {axis} with TAN or TAN-SIP projection"
        ));
    }
    match &ctype[8..] {
        "" => Ok(false),
        "-SIP" => Ok(true),
        other => Err(format!("unsupported distortion {other:?} in {ctype:?}")),
    }
}

#[cfg(test)]
mod wcs_test {
    use super::*;
    use approx::assert_relative_eq;
    use camino::Utf8PathBuf;
    use fitsio::FitsFile;
    use ndarray::array;

    fn solution() -> WcsSolution {
        WcsSolution::new([190.0, 72.0], [100.5, 64.5], [[-0.05, 0.01], [0.012, 0.05]])
    }

    fn sip() -> Sip {
        Sip {
            a: array![[0.0, 0.0, -2e-6], [0.0, 3e-6, 0.0], [1e-5, 0.0, 0.0]],
            b: array![[0.0, 0.0, 4e-6], [0.0, 2e-6, 0.0], [-1e-6, 0.0, 0.0]],
        }
    }

    #[test]
    fn test_reference_pixel_maps_to_crval() {
        let wcs = solution().with_sip(sip());
        let (ra, dec) = wcs.pixel_to_world(99.5, 63.5);
        assert_relative_eq!(ra, 190.0, epsilon = 1e-12);
        assert_relative_eq!(dec, 72.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tan_projection() {
        let wcs = solution();
        let (ra, dec) = wcs.pixel_to_world(0.0, 0.0);
        assert_relative_eq!(ra, 201.22899456915252, epsilon = 1e-9);
        assert_relative_eq!(dec, 67.2471261471139, epsilon = 1e-9);

        let (ra, dec) = wcs.pixel_to_world(10.0, 20.0);
        assert_relative_eq!(ra, 200.99414053127614, epsilon = 1e-9);
        assert_relative_eq!(dec, 68.39357276861266, epsilon = 1e-9);
    }

    #[test]
    fn test_sip_distortion() {
        let wcs = solution().with_sip(sip());
        let (ra, dec) = wcs.pixel_to_world(28.0, 32.0);
        assert_relative_eq!(ra, 199.24169203295233, epsilon = 1e-9);
        assert_relative_eq!(dec, 69.32321251925532, epsilon = 1e-9);

        let (f, g) = sip().distortion(2.0, 3.0);
        assert_relative_eq!(f, 1e-5 * 4.0 - 2e-6 * 9.0 + 3e-6 * 6.0, epsilon = 1e-18);
        assert_relative_eq!(g, -1e-6 * 4.0 + 4e-6 * 9.0 + 2e-6 * 6.0, epsilon = 1e-18);
    }

    #[test]
    fn test_ra_wraps_around_zero() {
        let wcs = WcsSolution::new([0.0, 0.0], [1.0, 1.0], [[-0.1, 0.0], [0.0, 0.1]]);
        // negative CD1_1: +x points west
        let (ra, dec) = wcs.pixel_to_world(1.0, 0.0);
        let expected = 360.0 - 0.1f64.to_radians().atan().to_degrees();
        assert_relative_eq!(ra, expected, epsilon = 1e-9);
        assert!(ra > 359.8);
        assert_relative_eq!(dec, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_check_ctype() {
        assert_eq!(check_ctype("RA---TAN", "RA"), Ok(false));
        assert_eq!(check_ctype("DEC--TAN-SIP", "DEC"), Ok(true));
        assert!(check_ctype("RA---SIN", "RA").is_err());
        assert!(check_ctype("GLON-TAN", "RA").is_err());
        assert!(check_ctype("RA---TAN-TPV", "RA").is_err());
        assert!(check_ctype("RA", "RA").is_err());
    }

    fn write_header(path: &Utf8Path, cards: &[(&str, f64)], ctypes: (&str, &str)) {
        let mut fptr = FitsFile::create(path).open().unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        hdu.write_key(&mut fptr, "CTYPE1", ctypes.0).unwrap();
        hdu.write_key(&mut fptr, "CTYPE2", ctypes.1).unwrap();
        for (name, value) in cards {
            hdu.write_key(&mut fptr, name, *value).unwrap();
        }
    }

    #[test]
    fn test_read_tan_sip_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("sky.wcs")).unwrap();
        write_header(
            &path,
            &[
                ("CRVAL1", 190.0),
                ("CRVAL2", 72.0),
                ("CRPIX1", 100.5),
                ("CRPIX2", 64.5),
                ("CD1_1", -0.05),
                ("CD1_2", 0.01),
                ("CD2_1", 0.012),
                ("CD2_2", 0.05),
                ("A_ORDER", 2.0),
                ("A_2_0", 1e-5),
                ("A_0_2", -2e-6),
                ("A_1_1", 3e-6),
                ("B_ORDER", 2.0),
                ("B_2_0", -1e-6),
                ("B_0_2", 4e-6),
                ("B_1_1", 2e-6),
            ],
            ("RA---TAN-SIP", "DEC--TAN-SIP"),
        );

        let wcs = WcsSolution::from_fits(&path).unwrap();
        assert_eq!(wcs, solution().with_sip(sip()));
    }

    #[test]
    fn test_read_pc_cdelt_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("pc.wcs")).unwrap();
        write_header(
            &path,
            &[
                ("CRVAL1", 10.0),
                ("CRVAL2", -30.0),
                ("CRPIX1", 5.0),
                ("CRPIX2", 6.0),
                ("CDELT1", -0.002),
                ("CDELT2", 0.002),
                ("PC1_2", 0.5),
            ],
            ("RA---TAN", "DEC--TAN"),
        );

        let wcs = WcsSolution::from_fits(&path).unwrap();
        assert_eq!(wcs.cd, [[-0.002, -0.001], [0.0, 0.002]]);
        assert_eq!(wcs.lonpole, 180.0);
        assert_eq!(wcs.sip, None);
    }

    #[test]
    fn test_reject_other_projection_and_missing_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("sin.wcs")).unwrap();
        let cards = [
            ("CRVAL1", 10.0),
            ("CRVAL2", -30.0),
            ("CRPIX1", 5.0),
            ("CRPIX2", 6.0),
            ("CD1_1", 1e-3),
            ("CD2_2", 1e-3),
        ];
        write_header(&path, &cards, ("RA---SIN", "DEC--SIN"));
        assert!(matches!(
            WcsSolution::from_fits(&path),
            Err(AzelError::InvalidWcs { .. })
        ));

        let path = Utf8PathBuf::from_path_buf(dir.path().join("nocd.wcs")).unwrap();
        write_header(&path, &cards[..4], ("RA---TAN", "DEC--TAN"));
        let err = WcsSolution::from_fits(&path).unwrap_err();
        assert_eq!(
            err,
            AzelError::InvalidWcs {
                path: path.clone(),
                reason: "no CD matrix and no CDELT scale".into()
            }
        );
    }
}
