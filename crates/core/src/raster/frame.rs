//! Time-stamped frames and frame sequences

use crate::error::{Error, Result};
use crate::raster::Raster;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Closed calendar interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window; `start` must not be after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::invalid_parameter(
                "date_window",
                format!("{}..{}", start, end),
                "start is after end",
            ));
        }
        Ok(Self { start, end })
    }

    /// January 1 to December 31 of `year`
    pub fn year(year: i32) -> Result<Self> {
        Self::new(ymd(year, 1, 1)?, ymd(year, 12, 31)?)
    }

    /// Whether `date` falls inside the window (bounds included)
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Build a calendar date, rejecting impossible ones
pub fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::invalid_parameter("date", format!("{}-{:02}-{:02}", year, month, day), "not a calendar date")
    })
}

/// A raster tagged with its acquisition time and scene cloud fraction.
#[derive(Debug, Clone)]
pub struct TemporalFrame {
    raster: Raster,
    acquired: NaiveDateTime,
    cloud_fraction: f64,
}

impl TemporalFrame {
    /// Create a frame. `cloud_fraction` is the scene-level fraction in [0, 1].
    pub fn new(raster: Raster, acquired: NaiveDateTime, cloud_fraction: f64) -> Self {
        Self {
            raster,
            acquired,
            cloud_fraction,
        }
    }

    /// Create a frame acquired at midnight of `date`
    pub fn on_date(raster: Raster, date: NaiveDate, cloud_fraction: f64) -> Self {
        Self::new(raster, date.and_time(chrono::NaiveTime::MIN), cloud_fraction)
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn acquired(&self) -> NaiveDateTime {
        self.acquired
    }

    pub fn date(&self) -> NaiveDate {
        self.acquired.date()
    }

    pub fn year(&self) -> i32 {
        self.acquired.year()
    }

    pub fn cloud_fraction(&self) -> f64 {
        self.cloud_fraction
    }

    /// Same timestamp and metadata, different pixels
    pub fn with_raster(&self, raster: Raster) -> TemporalFrame {
        TemporalFrame {
            raster,
            acquired: self.acquired,
            cloud_fraction: self.cloud_fraction,
        }
    }
}

/// Ordered sequence of frames.
///
/// Order matters for trend fitting only; reducers are order-independent.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<TemporalFrame>,
}

impl FrameSequence {
    pub fn new(frames: Vec<TemporalFrame>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: TemporalFrame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemporalFrame> {
        self.frames.iter()
    }

    pub fn frames(&self) -> &[TemporalFrame] {
        &self.frames
    }

    /// Frames acquired inside `window`
    pub fn within(&self, window: &DateWindow) -> FrameSequence {
        self.frames
            .iter()
            .filter(|f| window.contains(f.date()))
            .cloned()
            .collect()
    }

    /// Copy sorted by acquisition time (stable for equal timestamps)
    pub fn sorted_by_time(&self) -> FrameSequence {
        let mut frames = self.frames.clone();
        frames.sort_by_key(|f| f.acquired);
        FrameSequence { frames }
    }
}

impl FromIterator<TemporalFrame> for FrameSequence {
    fn from_iter<I: IntoIterator<Item = TemporalFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FrameSequence {
    type Item = TemporalFrame;
    type IntoIter = std::vec::IntoIter<TemporalFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameSequence {
    type Item = &'a TemporalFrame;
    type IntoIter = std::slice::Iter<'a, TemporalFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(y: i32, m: u32, d: u32) -> TemporalFrame {
        TemporalFrame::on_date(Raster::filled(1, 1, "B4", 0.1), ymd(y, m, d).unwrap(), 0.05)
    }

    #[test]
    fn test_window_is_closed() {
        let w = DateWindow::new(ymd(2024, 1, 1).unwrap(), ymd(2024, 5, 31).unwrap()).unwrap();
        assert!(w.contains(ymd(2024, 1, 1).unwrap()));
        assert!(w.contains(ymd(2024, 5, 31).unwrap()));
        assert!(!w.contains(ymd(2024, 6, 1).unwrap()));
    }

    #[test]
    fn test_window_rejects_reversed_bounds() {
        assert!(DateWindow::new(ymd(2024, 2, 1).unwrap(), ymd(2024, 1, 1).unwrap()).is_err());
        assert!(ymd(2023, 2, 29).is_err());
    }

    #[test]
    fn test_sequence_filter_and_sort() {
        let seq = FrameSequence::new(vec![frame(2024, 7, 1), frame(2023, 3, 1), frame(2024, 2, 1)]);
        let in_2024 = seq.within(&DateWindow::year(2024).unwrap());
        assert_eq!(in_2024.len(), 2);

        let sorted = seq.sorted_by_time();
        let years: Vec<i32> = sorted.iter().map(|f| f.year()).collect();
        assert_eq!(years, vec![2023, 2024, 2024]);
        assert_eq!(sorted.frames()[1].date(), ymd(2024, 2, 1).unwrap());
    }
}
