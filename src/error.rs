//! Taxonomie des erreurs du moniteur PPS (§7).
//!
//! `MonitorError` couvre les conditions fatales à l'initialisation ou à
//! la boucle — le worker ne peut pas continuer. `RejectReason` n'est
//! volontairement pas une erreur : un front rejeté est un comportement
//! attendu et routinier, journalisé en `RAW` et jamais remonté comme
//! `Err` depuis la boucle du worker.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{device}: not a terminal device")]
    NotATty { device: String },

    #[error("{device}: modem-control line wait failed: {source}")]
    EdgeWaitFailed {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: failed to read host clock: {source}")]
    ClockReadFailed {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: failed to read modem-control bitmap: {source}")]
    BitmapReadFailed {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{device}: kernel PPS setup failed: {reason}")]
    KernelSetupFailed { device: String, reason: String },

    #[error("{device}: kernel PPS fetch failed: {source}")]
    KernelFetchFailed {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pourquoi un front n'a pas été publié. Pas une erreur — journalisé en
/// `RAW` et le worker passe à l'itération suivante (§7 "Classifier-reject").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NegativeCycle,
    TooShortFor5Hz,
    Rejected5HzDuration,
    InFiveToOneHzGap,
    OneHzTrailingEdge,
    OneHzSquareWrongEdge,
    InOneToHalfHzGap,
    RejectedHalfHzDuration,
    TooLongForHalfHz,
    StuckLine,
    SecondAlreadyHandled,
    ClockWentBackwards,
    TimestampOutOfRange,
    FiveHzPublicationDisabled,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::NegativeCycle => "negative cycle",
            RejectReason::TooShortFor5Hz => "too short for 5 Hz",
            RejectReason::Rejected5HzDuration => "duration out of window for 5 Hz",
            RejectReason::InFiveToOneHzGap => "in 5 Hz <-> 1 Hz gap",
            RejectReason::OneHzTrailingEdge => "1 Hz trailing edge",
            RejectReason::OneHzSquareWrongEdge => "1 Hz square wave, wrong edge",
            RejectReason::InOneToHalfHzGap => "1 Hz <-> 0.5 Hz gap",
            RejectReason::RejectedHalfHzDuration => "duration out of window for 0.5 Hz",
            RejectReason::TooLongForHalfHz => "too long for 0.5 Hz",
            RejectReason::StuckLine => "stuck line, unchanged state",
            RejectReason::SecondAlreadyHandled => "second already handled",
            RejectReason::ClockWentBackwards => "system clock went backwards",
            RejectReason::TimestampOutOfRange => "timestamp out of range",
            RejectReason::FiveHzPublicationDisabled => "5 Hz publication disabled",
        };
        f.write_str(text)
    }
}
