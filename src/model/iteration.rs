use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team's time-boxed sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: String,
    pub name: String,
    /// Area-style path such as `Apollo\Sprint 7`.
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<DateTime<Utc>>,
}

impl Iteration {
    /// Whole days left until the finish date, never negative.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.finish_date
            .map(|finish| (finish.date_naive() - now.date_naive()).num_days().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn days_remaining_counts_calendar_days() {
        let iteration = Iteration {
            id: "it-1".into(),
            name: "Sprint 7".into(),
            path: "Apollo\\Sprint 7".into(),
            start_date: None,
            finish_date: Some(Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()),
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 17, 30, 0).unwrap();
        assert_eq!(iteration.days_remaining(now), Some(4));

        let late = Utc.with_ymd_and_hms(2024, 5, 12, 9, 0, 0).unwrap();
        assert_eq!(iteration.days_remaining(late), Some(0));
    }
}
