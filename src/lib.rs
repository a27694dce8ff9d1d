pub mod azel_errors;
pub mod constants;
pub mod earth_orientation;
pub mod fits_io;
pub mod horizon;
pub mod plate_solver;
pub mod platescale;
pub mod radec;
pub mod sky_dataset;
pub mod stack;
pub mod time;
pub mod wcs;
