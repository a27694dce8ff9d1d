use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzelError {
    #[error("Unsupported image/stack format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid frame selection: {0}")]
    InvalidSelection(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Plate solver failed: {0}")]
    SolverFailed(String),

    #[error("WCS solution not found, was the image solved? looking for: {0}")]
    SolutionMissing(Utf8PathBuf),

    #[error("Invalid WCS solution in {path}: {reason}")]
    InvalidWcs { path: Utf8PathBuf, reason: String },

    #[error("Unable to parse time: {0}")]
    TimeParseError(String),

    #[error("No observation time given and none found in the header of {0}")]
    MissingTime(Utf8PathBuf),

    #[error("Invalid observer location: {0}")]
    InvalidObserver(String),

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: Utf8PathBuf, reason: String },

    #[error("FITS error on {path}: {source}")]
    Fits {
        path: Utf8PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: Utf8PathBuf,
        source: image::ImageError,
    },

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error on {path}: {source}")]
    Hdf5 {
        path: Utf8PathBuf,
        source: hdf5::Error,
    },

    #[cfg(feature = "matlab")]
    #[error("Failed to read MATLAB file {path}: {reason}")]
    Matlab { path: Utf8PathBuf, reason: String },

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),
}

impl AzelError {
    pub(crate) fn fits(path: impl Into<Utf8PathBuf>, source: fitsio::errors::Error) -> Self {
        AzelError::Fits {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_failed(path: impl Into<Utf8PathBuf>, reason: impl ToString) -> Self {
        AzelError::WriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl PartialEq for AzelError {
    fn eq(&self, other: &Self) -> bool {
        use AzelError::*;
        match (self, other) {
            (UnsupportedFormat(a), UnsupportedFormat(b)) => a == b,
            (InvalidSelection(a), InvalidSelection(b)) => a == b,
            (InvalidInput(a), InvalidInput(b)) => a == b,
            (SolverFailed(a), SolverFailed(b)) => a == b,
            (SolutionMissing(a), SolutionMissing(b)) => a == b,
            (
                InvalidWcs {
                    path: pa,
                    reason: ra,
                },
                InvalidWcs {
                    path: pb,
                    reason: rb,
                },
            ) => pa == pb && ra == rb,
            (TimeParseError(a), TimeParseError(b)) => a == b,
            (MissingTime(a), MissingTime(b)) => a == b,
            (InvalidObserver(a), InvalidObserver(b)) => a == b,
            (WriteFailed { path: a, .. }, WriteFailed { path: b, .. }) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,

            // Library errors are not comparable: equal when the variant and path match
            (Fits { path: a, .. }, Fits { path: b, .. }) => a == b,
            (Image { path: a, .. }, Image { path: b, .. }) => a == b,
            #[cfg(feature = "hdf5")]
            (Hdf5 { path: a, .. }, Hdf5 { path: b, .. }) => a == b,
            #[cfg(feature = "matlab")]
            (Matlab { path: a, .. }, Matlab { path: b, .. }) => a == b,
            (IoError(_), IoError(_)) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod azel_errors_test {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offending_value() {
        let err = AzelError::SolutionMissing("sky/frame.wcs".into());
        assert_eq!(
            err.to_string(),
            "WCS solution not found, was the image solved? looking for: sky/frame.wcs"
        );

        let err = AzelError::write_failed("out.nc", "disk full");
        assert_eq!(err.to_string(), "Failed to write out.nc: disk full");
    }

    #[test]
    fn test_partial_eq_compares_payloads() {
        assert_eq!(
            AzelError::InvalidSelection("[0, 3)".into()),
            AzelError::InvalidSelection("[0, 3)".into())
        );
        assert_ne!(
            AzelError::InvalidSelection("[0, 3)".into()),
            AzelError::InvalidSelection("[1, 3)".into())
        );
        assert_ne!(
            AzelError::InvalidSelection("x".into()),
            AzelError::InvalidInput("x".into())
        );
        assert_eq!(
            AzelError::write_failed("a.fits", "one reason"),
            AzelError::write_failed("a.fits", "another reason")
        );
    }
}
