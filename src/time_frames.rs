use std::{fmt::Display, str::FromStr};

use chrono::Days;
use enum_iterator::{all, Sequence};
use serde::Serialize;
use thiserror::Error;

/// The windows analyses report when none are requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
pub enum StandardWindow {
    Day7,
    Day30,
    Day90,
    Day180,
}

use StandardWindow::*;

impl StandardWindow {
    pub fn days(&self) -> u32 {
        match self {
            Day7 => 7,
            Day30 => 30,
            Day90 => 90,
            Day180 => 180,
        }
    }
}

/// A look-back window of a number of whole days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GrowthWindow(pub u32);

impl GrowthWindow {
    pub fn days(&self) -> u32 {
        self.0
    }

    pub fn standard() -> Vec<GrowthWindow> {
        all::<StandardWindow>().map(GrowthWindow::from).collect()
    }
}

impl From<StandardWindow> for GrowthWindow {
    fn from(standard_window: StandardWindow) -> Self {
        GrowthWindow(standard_window.days())
    }
}

impl From<GrowthWindow> for Days {
    fn from(window: GrowthWindow) -> Self {
        Days::new(window.0.into())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseWindowError {
    #[error("failed to parse window {0}, expected a day count like 30, 30d or d30")]
    UnknownWindow(String),
}

impl FromStr for GrowthWindow {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let days = trimmed
            .strip_prefix('d')
            .or_else(|| trimmed.strip_suffix('d'))
            .unwrap_or(trimmed);

        days.parse::<u32>()
            .map(GrowthWindow)
            .map_err(|_| ParseWindowError::UnknownWindow(s.to_string()))
    }
}

impl Display for GrowthWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Parses a comma separated list of windows, e.g. `7,30,90`. Duplicates are dropped, order is
/// kept.
pub fn parse_window_list(s: &str) -> Result<Vec<GrowthWindow>, ParseWindowError> {
    let mut windows: Vec<GrowthWindow> = Vec::new();
    for part in s.split(',').filter(|part| !part.trim().is_empty()) {
        let window = part.parse::<GrowthWindow>()?;
        if !windows.contains(&window) {
            windows.push(window);
        }
    }
    Ok(windows)
}

/// The requested windows, or the standard ones when none are requested.
pub fn windows_or_standard(s: Option<&str>) -> Result<Vec<GrowthWindow>, ParseWindowError> {
    let windows = match s {
        Some(s) => parse_window_list(s)?,
        None => Vec::new(),
    };

    if windows.is_empty() {
        Ok(GrowthWindow::standard())
    } else {
        Ok(windows)
    }
}
