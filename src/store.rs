use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Decision,
    Bugfix,
    Feature,
    Refactor,
    Discovery,
    Change,
}

impl ObservationKind {
    pub const ALL: [Self; 6] = [
        Self::Decision,
        Self::Bugfix,
        Self::Feature,
        Self::Refactor,
        Self::Discovery,
        Self::Change,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Discovery => "discovery",
            Self::Change => "change",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or(())
    }
}

/// Something worth remembering from a coding session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Observation {
    pub id: u64,
    pub session_id: String,
    pub kind: ObservationKind,
    pub title: String,
    pub content: String,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObservation {
    pub session_id: String,
    pub kind: ObservationKind,
    pub title: String,
    pub content: String,
    pub files: Vec<String>,
}

/// Search filters. Serialized form doubles as the cache key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ObservationQuery {
    pub text: Option<String>,
    pub session_id: Option<String>,
    pub kind: Option<ObservationKind>,
    pub limit: usize,
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn record(&self, observation: NewObservation) -> Result<Observation, AppError>;

    async fn get(&self, id: u64) -> Result<Option<Observation>, AppError>;

    /// Matches newest first, at most `query.limit` of them.
    async fn search(&self, query: &ObservationQuery) -> Result<Vec<Observation>, AppError>;

    async fn count(&self) -> Result<usize, AppError>;
}

#[derive(Debug, Default)]
struct StoreState {
    observations: Vec<Observation>,
    next_id: u64,
}

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryObservationStore {
    state: Mutex<StoreState>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn record(&self, observation: NewObservation) -> Result<Observation, AppError> {
        let mut state = self.lock();
        state.next_id += 1;
        let stored = Observation {
            id: state.next_id,
            session_id: observation.session_id,
            kind: observation.kind,
            title: observation.title,
            content: observation.content,
            files: observation.files,
            created_at: Utc::now(),
        };
        state.observations.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: u64) -> Result<Option<Observation>, AppError> {
        Ok(self
            .lock()
            .observations
            .iter()
            .find(|observation| observation.id == id)
            .cloned())
    }

    async fn search(&self, query: &ObservationQuery) -> Result<Vec<Observation>, AppError> {
        let needle = query.text.as_deref().map(str::to_lowercase);
        let state = self.lock();

        Ok(state
            .observations
            .iter()
            .rev()
            .filter(|observation| {
                query
                    .session_id
                    .as_deref()
                    .map_or(true, |session| observation.session_id == session)
            })
            .filter(|observation| query.kind.map_or(true, |kind| observation.kind == kind))
            .filter(|observation| {
                needle.as_deref().map_or(true, |needle| {
                    observation.title.to_lowercase().contains(needle)
                        || observation.content.to_lowercase().contains(needle)
                })
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.lock().observations.len())
    }
}
