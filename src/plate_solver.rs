//! # Plate solving
//!
//! The astrometric solution itself is computed by an external program. [`PlateSolver`] is the
//! seam the pipeline calls through; [`AstrometryNet`] runs `solve-field` from astrometry.net,
//! which writes a `<stem>.wcs` header next to the image on success.
//!
//! A solve either succeeds or aborts the run: there is no partial result, no retry and no
//! timeout. The subprocess inherits the terminal so the solver's own progress output stays
//! visible.
use std::process::Command;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::azel_errors::AzelError;
use crate::constants::DEFAULT_SOLVER;

/// Whether the pipeline runs the solver or trusts an existing solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// Run the solver on the image before reading the solution
    Solve,
    /// Use the `.wcs` sidecar already next to the image
    #[default]
    UseExisting,
}

impl SolveMode {
    pub fn from_flag(solve: bool) -> Self {
        if solve {
            SolveMode::Solve
        } else {
            SolveMode::UseExisting
        }
    }
}

/// Something that computes a WCS solution for an image and writes it next to it.
pub trait PlateSolver {
    /// Solve `image`, blocking until done.
    ///
    /// On success the solution is expected at `image` with the `.wcs` suffix.
    fn solve(&self, image: &Utf8Path) -> Result<(), AzelError>;
}

/// The astrometry.net command-line solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstrometryNet {
    program: String,
    args: Vec<String>,
}

impl Default for AstrometryNet {
    fn default() -> Self {
        AstrometryNet {
            program: DEFAULT_SOLVER.to_string(),
            args: Vec::new(),
        }
    }
}

impl AstrometryNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another executable, e.g. a full path to `solve-field`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Extra options appended after the image path.
    ///
    /// The string is split on whitespace and nothing else: quoting is not interpreted, so
    /// an option value cannot contain spaces.
    pub fn with_args(mut self, args: &str) -> Self {
        self.args = args.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// `solve-field --overwrite <image> <args...>`
    pub fn command(&self, image: &Utf8Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--overwrite").arg(image.as_str()).args(&self.args);
        cmd
    }
}

impl PlateSolver for AstrometryNet {
    fn solve(&self, image: &Utf8Path) -> Result<(), AzelError> {
        let mut cmd = self.command(image);
        info!("running {} on {image}", self.program);
        debug!("command: {cmd:?}");

        let status = cmd
            .status()
            .map_err(|e| AzelError::SolverFailed(format!("unable to run {}: {e}", self.program)))?;
        if !status.success() {
            return Err(AzelError::SolverFailed(format!(
                "{} exited with {status} on {image}",
                self.program
            )));
        }

        info!("done with astrometry.net");
        Ok(())
    }
}

#[cfg(test)]
mod plate_solver_test {
    use super::*;

    #[test]
    fn test_command_line() {
        let solver = AstrometryNet::new().with_args("--downsample 2  --no-plots\t-L 10");
        let cmd = solver.command(Utf8Path::new("sky/mean.fits"));
        assert_eq!(cmd.get_program(), "solve-field");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            [
                "--overwrite",
                "sky/mean.fits",
                "--downsample",
                "2",
                "--no-plots",
                "-L",
                "10"
            ]
        );
    }

    #[test]
    fn test_empty_args() {
        let solver = AstrometryNet::new().with_args("   ");
        assert!(solver.args().is_empty());
        assert_eq!(solver.program(), "solve-field");
    }

    #[test]
    fn test_solve_mode_from_flag() {
        assert_eq!(SolveMode::from_flag(true), SolveMode::Solve);
        assert_eq!(SolveMode::from_flag(false), SolveMode::UseExisting);
        assert_eq!(SolveMode::default(), SolveMode::UseExisting);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status() {
        let image = Utf8Path::new("ignored.fits");
        assert!(AstrometryNet::new().with_program("true").solve(image).is_ok());
        assert!(matches!(
            AstrometryNet::new().with_program("false").solve(image),
            Err(AzelError::SolverFailed(_))
        ));
    }

    #[test]
    fn test_missing_executable() {
        let err = AstrometryNet::new()
            .with_program("/nonexistent/solve-field")
            .solve(Utf8Path::new("x.fits"))
            .unwrap_err();
        assert!(matches!(err, AzelError::SolverFailed(msg) if msg.starts_with("unable to run")));
    }
}
