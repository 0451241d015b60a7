//! Multi-window multi-burn-rate alert window catalogue.
//!
//! The catalogue of (severity, long window, short window, budget consumption)
//! tuples follows the Google SRE Workbook and is parameterised only by the
//! full SLO period: the burn-rate factor of a row is
//! `budget_consumed * period / long_window`. For a 30 day period this yields
//! the canonical factors 14.4, 6, 3 and 1.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    error::Error,
    model::{DAY, SUPPORTED_WINDOW_DAYS},
};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Alert severities emitted by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fast-burn alert routed to a human immediately.
    Page,
    /// Slow-burn alert routed to a queue.
    Ticket
}

impl Severity {
    /// Returns the label value used for this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Ticket => "ticket"
        }
    }
}

/// One row of the burn-rate catalogue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertWindow {
    /// Severity of the alert this row belongs to.
    pub severity:             Severity,
    /// Sustained burn window.
    pub long_window:          Duration,
    /// Fast-trigger window that debounces the alert.
    pub short_window:         Duration,
    /// Percentage of the error budget consumed over the long window before
    /// the alert fires.
    pub error_budget_percent: f64
}

/// The four-row burn-rate catalogue for one SLO period.
#[derive(Debug, Clone, PartialEq)]
pub struct SloWindows {
    /// Full SLO period the rows are derived for.
    pub period:       Duration,
    /// Fast page condition (2% budget over the short long-window).
    pub page_quick:   AlertWindow,
    /// Sustained page condition (5% budget).
    pub page_slow:    AlertWindow,
    /// Fast ticket condition (10% budget).
    pub ticket_quick: AlertWindow,
    /// Sustained ticket condition (10% budget over three days).
    pub ticket_slow:  AlertWindow
}

impl SloWindows {
    fn new(period: Duration) -> Self {
        Self {
            period,
            page_quick: AlertWindow {
                severity:             Severity::Page,
                long_window:          HOUR,
                short_window:         5 * MINUTE,
                error_budget_percent: 2.0
            },
            page_slow: AlertWindow {
                severity:             Severity::Page,
                long_window:          6 * HOUR,
                short_window:         30 * MINUTE,
                error_budget_percent: 5.0
            },
            ticket_quick: AlertWindow {
                severity:             Severity::Ticket,
                long_window:          DAY,
                short_window:         2 * HOUR,
                error_budget_percent: 10.0
            },
            ticket_slow: AlertWindow {
                severity:             Severity::Ticket,
                long_window:          3 * DAY,
                short_window:         6 * HOUR,
                error_budget_percent: 10.0
            }
        }
    }

    /// Derives the burn-rate threshold factor for one catalogue row.
    ///
    /// The factor is the burn rate that, sustained over the row's long
    /// window, consumes the row's share of the error budget:
    /// `budget_consumed * period / long_window`.
    pub fn burn_rate_factor(&self, window: &AlertWindow) -> f64 {
        let budget = window.error_budget_percent / 100.0;
        budget * (self.period.as_secs_f64() / window.long_window.as_secs_f64())
    }

    /// Returns every window an SLI recording rule is emitted at, ascending.
    ///
    /// The set is the union of the catalogue's short and long windows plus
    /// the full period.
    pub fn sli_windows(&self) -> Vec<Duration> {
        let mut windows = vec![
            self.page_quick.short_window,
            self.page_quick.long_window,
            self.page_slow.short_window,
            self.page_slow.long_window,
            self.ticket_quick.short_window,
            self.ticket_quick.long_window,
            self.ticket_slow.short_window,
            self.ticket_slow.long_window,
            self.period,
        ];
        windows.sort();
        windows.dedup();
        windows
    }

    /// Returns the windows shorter than the full period, ascending.
    ///
    /// These feed the weighted average that materialises the full-period
    /// recording rule.
    pub fn short_windows(&self) -> Vec<Duration> {
        self.sli_windows().into_iter().filter(|window| *window < self.period).collect()
    }
}

/// Repository of burn-rate catalogues keyed by period length in days.
#[derive(Debug, Clone)]
pub struct WindowsRepo {
    windows: BTreeMap<u64, SloWindows>
}

impl Default for WindowsRepo {
    fn default() -> Self {
        let mut windows = BTreeMap::new();
        for days in SUPPORTED_WINDOW_DAYS {
            windows.insert(days, SloWindows::new(days as u32 * DAY));
        }
        Self {
            windows
        }
    }
}

impl WindowsRepo {
    /// Looks up the catalogue for the provided period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`](Error::Generation) when no catalogue
    /// exists for the period, naming the SLO the lookup was made for.
    pub fn windows_for(&self, slo_id: &str, period: Duration) -> Result<&SloWindows, Error> {
        let days = period.as_secs() / DAY.as_secs();
        self.windows.get(&days).ok_or_else(|| {
            Error::generation(slo_id, format!("missing burn-rate window table for {days}d period"))
        })
    }
}

/// Formats a duration the way PromQL expects, using the largest whole unit.
pub fn promql_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds == 0 {
        return "0s".to_owned();
    }
    if seconds % DAY.as_secs() == 0 {
        return format!("{}d", seconds / DAY.as_secs());
    }
    if seconds % HOUR.as_secs() == 0 {
        return format!("{}h", seconds / HOUR.as_secs());
    }
    if seconds % MINUTE.as_secs() == 0 {
        return format!("{}m", seconds / MINUTE.as_secs());
    }
    format!("{seconds}s")
}
