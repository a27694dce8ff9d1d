#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use astrometry_azel::azel_errors::AzelError;
use astrometry_azel::plate_solver::PlateSolver;
use camino::{Utf8Path, Utf8PathBuf};
use fitsio::FitsFile;
use tempfile::TempDir;

/// Image size of the synthetic all-sky camera.
pub const ROWS: usize = 128;
pub const COLS: usize = 200;

/// Observer and instant of the reference az/el values.
pub const LATLON: (f64, f64) = (40.0, -80.0);
pub const TIME: &str = "2000-01-01T00:00:00";

/// `(row, col, ra, dec, az, el)` of a few pixels of the synthetic TAN-SIP solution.
pub const REFERENCE_PIXELS: [(usize, usize, f64, f64, f64, f64); 3] = [
    (
        32,
        28,
        199.24169203295233,
        69.32321251925532,
        0.27168880791038474,
        19.324538507698783,
    ),
    (
        51,
        92,
        190.7789890863666,
        71.28347189749957,
        3.15661921330234,
        21.477571200471637,
    ),
    (
        98,
        156,
        180.85674641328362,
        74.21150615542687,
        5.637755498132912,
        24.935253471497983,
    ),
];

pub fn tempdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

/// Write the TAN-SIP solution astrometry.net would produce for the synthetic camera.
pub fn write_solution(path: &Utf8Path) {
    let mut fptr = FitsFile::create(path).overwrite().open().unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    hdu.write_key(&mut fptr, "CTYPE1", "RA---TAN-SIP").unwrap();
    hdu.write_key(&mut fptr, "CTYPE2", "DEC--TAN-SIP").unwrap();
    for (name, value) in [
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
    ] {
        hdu.write_key(&mut fptr, name, value).unwrap();
    }
    hdu.write_key(&mut fptr, "IMAGEW", COLS as i64).unwrap();
    hdu.write_key(&mut fptr, "IMAGEH", ROWS as i64).unwrap();
}

/// Solver that drops the synthetic solution next to the image.
pub struct SidecarSolver;

impl PlateSolver for SidecarSolver {
    fn solve(&self, image: &Utf8Path) -> Result<(), AzelError> {
        write_solution(&image.with_extension("wcs"));
        Ok(())
    }
}

/// Solver that never finds a solution.
pub struct FailingSolver;

impl PlateSolver for FailingSolver {
    fn solve(&self, image: &Utf8Path) -> Result<(), AzelError> {
        Err(AzelError::SolverFailed(format!(
            "solve-field {image} exited with exit status: 1"
        )))
    }
}

/// Log sink shared between a test and the `tracing` subscriber it installs.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with every log event formatted into the returned buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}
