use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::domain::message::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponderStat {
    pub user_id: UserId,
    pub name: String,
    pub count: u32,
    pub first_response: DateTime<Local>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyStatsSnapshot {
    pub date: NaiveDate,
    pub total_responses: u32,
    pub total_responders: usize,
    /// Highest count first; ties keep first-response order.
    pub responders: Vec<ResponderStat>,
}

impl DailyStatsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.total_responses == 0
    }
}

/// Per-day responder counters, kept in memory for the life of the process.
#[derive(Debug, Default)]
pub struct StatsTracker {
    days: Mutex<HashMap<NaiveDate, Vec<ResponderStat>>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_response(&self, responder_id: &UserId, responder_name: &str) {
        self.record_response_at(responder_id, responder_name, Local::now());
    }

    pub fn record_response_at(
        &self,
        responder_id: &UserId,
        responder_name: &str,
        at: DateTime<Local>,
    ) {
        let mut days = self.days.lock().unwrap_or_else(PoisonError::into_inner);
        let day = days.entry(at.date_naive()).or_default();

        match day.iter_mut().find(|stat| &stat.user_id == responder_id) {
            Some(stat) => stat.count += 1,
            None => day.push(ResponderStat {
                user_id: responder_id.clone(),
                name: responder_name.to_owned(),
                count: 1,
                first_response: at,
            }),
        }
    }

    pub fn today(&self) -> DailyStatsSnapshot {
        self.snapshot_for(Local::now().date_naive())
    }

    pub fn snapshot_for(&self, date: NaiveDate) -> DailyStatsSnapshot {
        let mut responders = {
            let days = self.days.lock().unwrap_or_else(PoisonError::into_inner);
            days.get(&date).cloned().unwrap_or_default()
        };
        // stable: equal counts stay in insertion order
        responders.sort_by(|left, right| right.count.cmp(&left.count));

        DailyStatsSnapshot {
            date,
            total_responses: responders.iter().map(|stat| stat.count).sum(),
            total_responders: responders.len(),
            responders,
        }
    }

    pub fn reset(&self) {
        self.days.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
