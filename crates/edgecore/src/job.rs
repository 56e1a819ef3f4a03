use crate::ControlEnum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type JobId = String;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Constructed,
    Initialized,
    Running,
    Paused,
    Closed,
}

impl JobState {
    /// States reachable from `self` in one transition.
    pub fn successors(self) -> &'static [JobState] {
        use JobState::*;
        match self {
            Constructed => &[Initialized, Closed],
            Initialized => &[Running, Closed],
            Running => &[Paused, Closed],
            Paused => &[Running, Closed],
            Closed => &[Closed],
        }
    }

    pub fn can_reach(self, desired: JobState) -> bool {
        self.successors().contains(&desired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Constructed => "CONSTRUCTED",
            JobState::Initialized => "INITIALIZED",
            JobState::Running => "RUNNING",
            JobState::Paused => "PAUSED",
            JobState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A state change request made against a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Initialize,
    Start,
    Pause,
    Resume,
    Close,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Initialize => "INITIALIZE",
            Action::Start => "START",
            Action::Pause => "PAUSE",
            Action::Resume => "RESUME",
            Action::Close => "CLOSE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl ControlEnum for Action {
    const TYPE_NAME: &'static str = "Action";
    const CONSTANTS: &'static [(&'static str, Self)] = &[
        ("INITIALIZE", Action::Initialize),
        ("START", Action::Start),
        ("PAUSE", Action::Pause),
        ("RESUME", Action::Resume),
        ("CLOSE", Action::Close),
    ];
}

/// Point-in-time view of a job as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub current_state: JobState,
    pub next_state: Option<JobState>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn in_transition(&self) -> bool {
        self.next_state.is_some()
    }
}
