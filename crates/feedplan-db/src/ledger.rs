//! Run-number and day-number bookkeeping shared by every store.

use std::collections::HashSet;

use feedplan_core::RunItem;
use uuid::Uuid;

use crate::DbError;

/// High-water marks for one campaign. Both only ever move up, so numbers
/// freed by a deleted run are never issued again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerMarks {
    pub last_run_number: u32,
    pub last_day_number: u32,
}

impl LedgerMarks {
    #[must_use]
    pub fn next_run_number(self) -> u32 {
        self.last_run_number.saturating_add(1)
    }

    #[must_use]
    pub fn next_day_number(self) -> u32 {
        self.last_day_number.saturating_add(1)
    }

    /// Validates a commit and returns the marks as they stand after it.
    ///
    /// # Errors
    ///
    /// - [`DbError::RunNumberConflict`] if `run_number` was already issued.
    /// - [`DbError::DayNumberConflict`] if a day is zero, repeated, or not
    ///   above the day mark.
    /// - [`DbError::Rejected`] if a caption is bound to a different day than
    ///   its item.
    pub fn admit(
        self,
        campaign_id: Uuid,
        run_number: u32,
        items: &[RunItem],
    ) -> Result<LedgerMarks, DbError> {
        if run_number <= self.last_run_number {
            return Err(DbError::RunNumberConflict {
                campaign_id,
                run_number,
                last: self.last_run_number,
            });
        }

        let mut seen = HashSet::with_capacity(items.len());
        let mut max_day = self.last_day_number;
        for entry in items {
            let day = entry.item.day_number;
            if day == 0 || day <= self.last_day_number || !seen.insert(day) {
                return Err(DbError::DayNumberConflict {
                    campaign_id,
                    day_number: day,
                    last: self.last_day_number,
                });
            }
            if entry.caption.day_number != day {
                return Err(DbError::Rejected(format!(
                    "caption for day {} attached to item for day {day}",
                    entry.caption.day_number
                )));
            }
            max_day = max_day.max(day);
        }

        Ok(LedgerMarks {
            last_run_number: run_number,
            last_day_number: max_day,
        })
    }
}
