// =============================================================================
// Incremental Indicator Engine — keeps indicator state across polling cycles
// =============================================================================
//
// Every fetch returns the venue's default window of recent bars, the last of
// which is still in progress. Instead of recomputing the whole table, the
// engine:
//
//   1. Commits closed bars it has not seen yet into a long-lived
//      `IndicatorState` and a bounded ring of enriched rows.
//   2. Evaluates the in-progress bar on a clone of that state, so the
//      provisional row never leaks into the committed history.
//
// If a fetch no longer contains the last committed bar (the poller fell behind
// by more than a window, or the venue rewound), the state is rebuilt from the
// fetched window alone.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{EnrichedRow, EnrichedSnapshot, IndicatorState};
use crate::market_data::{Bar, BarSeries};

/// What an update did, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Continued from the previous cycle, committing `committed` new bars.
    Continued { committed: usize },
    /// Discarded prior state and rebuilt from `committed` closed bars.
    Rebuilt { committed: usize },
}

#[derive(Debug, Clone)]
pub struct IncrementalEngine {
    state: IndicatorState,
    history: VecDeque<EnrichedRow>,
    provisional: Option<EnrichedRow>,
    last_committed: Option<DateTime<Utc>>,
    capacity: usize,
}

impl IncrementalEngine {
    /// Create an engine retaining at most `capacity` committed rows.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: IndicatorState::new(),
            history: VecDeque::with_capacity(capacity + 1),
            provisional: None,
            last_committed: None,
            capacity,
        }
    }

    /// Fold a freshly fetched series into the engine.
    pub fn update(&mut self, series: &BarSeries) -> UpdateOutcome {
        let Some((in_progress, closed)) = series.bars().split_last() else {
            self.provisional = None;
            return UpdateOutcome::Continued { committed: 0 };
        };

        let outcome = if self.continues_from(closed, in_progress) {
            let since = self.last_committed;
            let fresh: Vec<&Bar> = closed
                .iter()
                .filter(|b| since.map_or(true, |t| b.close_time > t))
                .collect();
            let committed = fresh.len();
            for bar in fresh {
                self.commit(bar);
            }
            UpdateOutcome::Continued { committed }
        } else {
            self.reset();
            for bar in closed {
                self.commit(bar);
            }
            UpdateOutcome::Rebuilt {
                committed: closed.len(),
            }
        };

        let mut scratch = self.state.clone();
        self.provisional = Some(scratch.next(in_progress));

        debug!(
            ?outcome,
            history = self.history.len(),
            in_progress = %in_progress.close_time,
            "incremental engine updated"
        );
        outcome
    }

    /// Committed history followed by the provisional row, if any.
    pub fn snapshot(&self) -> EnrichedSnapshot {
        let mut rows: Vec<EnrichedRow> = self.history.iter().cloned().collect();
        rows.extend(self.provisional.clone());
        EnrichedSnapshot::new(rows)
    }

    fn continues_from(&self, closed: &[Bar], in_progress: &Bar) -> bool {
        let Some(last) = self.last_committed else {
            return false;
        };
        if in_progress.close_time <= last {
            return false;
        }
        if closed.is_empty() {
            // A lone bar only continues if it opens right after the last commit.
            return in_progress.open_time <= last + chrono::Duration::milliseconds(1);
        }
        closed.iter().any(|b| b.close_time == last)
    }

    fn commit(&mut self, bar: &Bar) {
        let row = self.state.next(bar);
        self.history.push_back(row);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.last_committed = Some(bar.close_time);
    }

    fn reset(&mut self) {
        self.state = IndicatorState::new();
        self.history.clear();
        self.last_committed = None;
    }
}
