use chrono::{NaiveDate, NaiveTime};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

pub type TaskId = String;

const ID_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "isDone", default)]
    pub is_done: bool,
}

/// User-entered fields for a task that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,
    #[error("description is required")]
    MissingDescription,
    #[error("date is required")]
    MissingDate,
    #[error("invalid date (use YYYY-MM-DD): {0}")]
    InvalidDate(String),
    #[error("invalid time (use HH:MM): {0}")]
    InvalidTime(String),
    #[error("date {0} is in the past")]
    DateInPast(NaiveDate),
}

impl Task {
    pub fn new(
        id: TaskId,
        title: String,
        description: String,
        date: NaiveDate,
        time: Option<String>,
    ) -> Self {
        Task {
            id,
            title,
            description,
            date: stored_date(date),
            time,
            is_done: false,
        }
    }

    /// Grouping key: the calendar date portion of `date`.
    pub fn date_key(&self) -> &str {
        self.date.split('T').next().unwrap_or(&self.date)
    }
}

impl NewTask {
    pub fn validate(&self, id: TaskId, today: NaiveDate) -> Result<Task, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let description = self.description.trim();
        if description.is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => parse_date(raw)?,
            None if title.to_lowercase().contains("today") => today,
            None => return Err(ValidationError::MissingDate),
        };
        if date < today {
            return Err(ValidationError::DateInPast(date));
        }
        let time = match self.time.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => Some(parse_time(raw)?),
            None => None,
        };
        Ok(Task::new(
            id,
            title.to_string(),
            description.to_string(),
            date,
            time,
        ))
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

/// Normalizes `H:MM` / `HH:MM` input to zero-padded `HH:MM`.
pub fn parse_time(raw: &str) -> Result<String, ValidationError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| ValidationError::InvalidTime(raw.to_string()))
}

/// The stored form of a due date: midnight UTC on that day.
pub fn stored_date(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

pub fn generate_id(existing: &[Task]) -> TaskId {
    loop {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_LEN)
            .map(char::from)
            .collect();
        if !existing.iter().any(|t| t.id == id) {
            return id;
        }
    }
}

#[cfg(test)]
pub(crate) mod strategies {
    use super::Task;
    use proptest::prelude::*;

    /// RFC 3339 timestamps, bare dates and free text that is not a date at all.
    pub fn date() -> impl Strategy<Value = String> {
        prop_oneof![
            (2024i32..2027, 1u32..13, 1u32..29, 0u32..24, 0u32..60).prop_map(
                |(y, m, d, h, min)| format!("{y}-{m:02}-{d:02}T{h:02}:{min:02}:00Z")
            ),
            (2024i32..2027, 1u32..13, 1u32..29, 0u32..24)
                .prop_map(|(y, m, d, h)| format!("{y}-{m:02}-{d:02}T{h:02}:00:00.000+02:00")),
            (2024i32..2027, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("{y}-{m:02}-{d:02}")),
            "[a-z ]{1,10}",
        ]
    }

    pub fn time() -> impl Strategy<Value = Option<String>> {
        proptest::option::of((0u32..24, 0u32..60).prop_map(|(h, m)| format!("{h:02}:{m:02}")))
    }

    /// Collections with unique ids.
    pub fn tasks(max: usize) -> impl Strategy<Value = Vec<Task>> {
        proptest::collection::vec(
            ("\\PC{1,20}", "\\PC{1,40}", date(), time(), any::<bool>()),
            0..max,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (title, description, date, time, is_done))| Task {
                    id: format!("t{i}"),
                    title,
                    description,
                    date,
                    time,
                    is_done,
                })
                .collect()
        })
    }
}
