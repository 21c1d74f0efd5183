//! Error types for calibration and persistence

use thiserror::Error;

/// Raw axis named in a degenerate calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Y => f.write_str("Y"),
        }
    }
}

/// Calibration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Both captures produced the same raw value on one axis
    #[error("degenerate calibration: identical raw {axis} samples ({raw})")]
    DegenerateCalibration { axis: Axis, raw: u16 },

    /// A wizard was fed a sample after it had completed
    #[error("calibration wizard already finished")]
    WizardFinished,
}

/// Key-value store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed value for {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store key: {0}")]
    InvalidKey(String),
}
