//! Portfolio-level total and its report baseline.

use crate::threshold::{crossing, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportReason {
    /// First total of the process
    Initial,
    /// Full-report tick
    Scheduled,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioReport {
    /// Total rounded to 8 decimal places
    pub total: f64,
    pub previous: Option<f64>,
    pub reason: ReportReason,
}

/// Applies the report threshold to the sum of all position values.
#[derive(Debug, Clone)]
pub struct PortfolioAggregator {
    percent_report_change: f64,
    baseline: Option<f64>,
}

impl PortfolioAggregator {
    pub fn new(percent_report_change: f64) -> Self {
        Self {
            percent_report_change,
            baseline: None,
        }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Feed this cycle's total. Returns a report when it should be logged,
    /// re-centering the baseline on every report.
    pub fn observe(&mut self, total: f64, force: bool) -> Option<PortfolioReport> {
        let reason = match self.baseline {
            None => ReportReason::Initial,
            Some(baseline) => match crossing(baseline, total, self.percent_report_change) {
                Some(Direction::Up) => ReportReason::Up,
                Some(Direction::Down) => ReportReason::Down,
                None if force => ReportReason::Scheduled,
                None => return None,
            },
        };

        let previous = self.baseline.replace(total);
        Some(PortfolioReport {
            total: round8(total),
            previous,
            reason,
        })
    }
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_total_always_reported() {
        let mut portfolio = PortfolioAggregator::new(3.0);
        let report = portfolio.observe(250.0, false).unwrap();
        assert_eq!(report.reason, ReportReason::Initial);
        assert_eq!(report.previous, None);
        assert_eq!(portfolio.baseline(), Some(250.0));
    }

    #[test]
    fn test_quiet_until_threshold() {
        let mut portfolio = PortfolioAggregator::new(3.0);
        portfolio.observe(100.0, false);
        assert!(portfolio.observe(102.0, false).is_none());
        assert!(portfolio.observe(97.5, false).is_none());

        let report = portfolio.observe(96.0, false).unwrap();
        assert_eq!(report.reason, ReportReason::Down);
        assert_eq!(report.previous, Some(100.0));

        // Re-centered on 96
        assert!(portfolio.observe(96.0, false).is_none());
        let report = portfolio.observe(99.5, false).unwrap();
        assert_eq!(report.reason, ReportReason::Up);
    }

    #[test]
    fn test_forced_report_without_crossing() {
        let mut portfolio = PortfolioAggregator::new(3.0);
        portfolio.observe(100.0, false);
        let report = portfolio.observe(100.5, true).unwrap();
        assert_eq!(report.reason, ReportReason::Scheduled);
        assert_eq!(portfolio.baseline(), Some(100.5));
    }

    #[test]
    fn test_total_rounded() {
        let mut portfolio = PortfolioAggregator::new(3.0);
        let report = portfolio.observe(1.123456789123, false).unwrap();
        assert_eq!(report.total, 1.12345679);
    }
}
