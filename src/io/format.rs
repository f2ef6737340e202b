//! Formatted run output for HkSym.

use std::fmt;

use log;

const HKSYM_BANNER_LENGTH: usize = 103;

/// Logs an error to both the default logger and the `hksym-output` logger.
macro_rules! hksym_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "hksym-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `hksym-output` logger.
macro_rules! hksym_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "hksym-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `hksym-output` logger.
macro_rules! hksym_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "hksym-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {hksym_error, hksym_output, hksym_warn};

/// Logs a nicely formatted section title to the `hksym-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(HKSYM_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    hksym_output!("┌──{bar}──┐");
    hksym_output!("│§ {title:^length$} §│");
    hksym_output!("└──{bar}──┘");
}

/// Logs a nicely formatted subtitle to the `hksym-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    hksym_output!("{}", subtitle);
    hksym_output!("{}", bar);
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging HkSym outputs nicely.
pub(crate) trait HkSymOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            hksym_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> HkSymOutput for T where T: fmt::Debug + fmt::Display {}
