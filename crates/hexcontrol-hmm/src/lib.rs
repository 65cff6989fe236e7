//! # hexcontrol HMM
//!
//! From exposure surfaces to decoded territorial control.
//!
//! - **Observation encoding**: [`ObservationEncoder`] turns a terrorism and a
//!   conventional [`ExposureMatrix`](hexcontrol_exposure::ExposureMatrix)
//!   into one [`Symbol`] per cell and date.
//! - **Model**: [`HmmModel`] holds a validated initial distribution,
//!   transition matrix and emission matrix. [`HmmModel::territorial`] builds
//!   the five-state control model; [`CountryPriors`] maps countries to
//!   initial distributions.
//! - **Decoding**: [`viterbi`] and [`viterbi_log`] decode one sequence;
//!   [`BatchDecoder`] decodes every cell in parallel into a [`ControlMatrix`].
//!
//! ## Example
//!
//! ```rust
//! use hexcontrol_hmm::{viterbi_log, HmmModel};
//!
//! let model = HmmModel::territorial(&[0.2; 5]).unwrap();
//! let out = viterbi_log(
//!     model.initial().view(),
//!     model.transition().view(),
//!     model.emission().view(),
//!     &[0, 1, 2, 3, 3],
//! )
//! .unwrap();
//!
//! assert_eq!(out.path.len(), 5);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod model;
pub mod observation;
pub mod priors;
pub mod viterbi;

pub use batch::{BatchDecoder, CancellationToken, ControlMatrix};
pub use model::{ControlState, HmmModel, STOCHASTIC_TOLERANCE};
pub use observation::{
    median_of_medians, poisson_score, poisson_scores, EncoderParams, Encoding, ObservationEncoder,
    ObservationMatrix, Symbol, ALPHABET_SIZE,
};
pub use priors::CountryPriors;
pub use viterbi::{viterbi, viterbi_log, DecodeSpace, ViterbiOutput, TIE_TOLERANCE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common result type for encoding and decoding
pub type Result<T> = std::result::Result<T, HmmError>;

/// Unified error type for encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum HmmError {
    /// π, T or E is not a valid stochastic parameter
    #[error("Invalid model parameters ({component}): {reason}")]
    InvalidModelParameters {
        /// Offending component (`initial`, `transition`, `emission`)
        component: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Two inputs disagree on a dimension, or have the same size but
    /// different labels along it
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}{}", label_suffix(.labels))]
    ShapeMismatch {
        /// Which dimension disagrees (`cells`, `dates`, ...)
        what: &'static str,
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
        /// First disagreeing label when the sizes agree
        labels: Option<LabelDiff>,
    },

    /// A symbol is outside the emission alphabet
    #[error("Observation {symbol} at position {position} is outside the alphabet of {alphabet} symbols")]
    InvalidObservation {
        /// Offending symbol
        symbol: usize,
        /// Position in the sequence
        position: usize,
        /// Alphabet size `K`
        alphabet: usize,
    },

    /// An encoder or decoder parameter is out of range
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it is invalid
        reason: String,
    },

    /// The run was cancelled
    #[error("Decoding cancelled")]
    Cancelled,
}

impl HmmError {
    /// Creates an invalid model parameters error.
    #[must_use]
    pub fn invalid_model(component: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidModelParameters {
            component,
            reason: reason.into(),
        }
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            actual,
            labels: None,
        }
    }

    /// Creates a shape mismatch error for `len` labels that first disagree
    /// at `position`.
    #[must_use]
    pub fn label_mismatch(
        what: &'static str,
        len: usize,
        position: usize,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected: len,
            actual: len,
            labels: Some(LabelDiff {
                position,
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
        }
    }

    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// First position at which two label sequences of equal length disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDiff {
    /// Position in the sequence
    pub position: usize,
    /// Expected label
    pub expected: String,
    /// Actual label
    pub actual: String,
}

impl std::fmt::Display for LabelDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "label at position {} is '{}', expected '{}'",
            self.position, self.actual, self.expected
        )
    }
}

fn label_suffix(labels: &Option<LabelDiff>) -> String {
    labels.as_ref().map_or_else(String::new, |diff| format!(" ({diff})"))
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{BatchDecoder, CancellationToken, ControlMatrix};
    pub use crate::model::{ControlState, HmmModel};
    pub use crate::observation::{EncoderParams, ObservationEncoder, ObservationMatrix, Symbol};
    pub use crate::priors::CountryPriors;
    pub use crate::viterbi::{viterbi, viterbi_log, DecodeSpace, ViterbiOutput};
    pub use crate::{HmmError, LabelDiff, Result};
}
