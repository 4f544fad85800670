//! Domain model shared by the player and its collaborators
//!
//! A [`Track`] is one audiobook: an ordered chapter table plus an optional
//! media location. A [`ProgressRecord`] is the persisted listening position
//! for one `(user, track)` pair.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Chapter marker within a track
///
/// Chapter numbers start at 1. Chapters need not cover the track
/// contiguously; a gap belongs to the nearest preceding chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter number (1-based, unique within a track)
    pub number: u32,

    /// Display title
    pub title: String,

    /// Start time within the track (seconds)
    pub start_time_seconds: f64,

    /// Nominal chapter length (seconds)
    pub duration_seconds: f64,
}

impl Chapter {
    pub fn new(number: u32, title: impl Into<String>, start_time_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            number,
            title: title.into(),
            start_time_seconds,
            duration_seconds,
        }
    }

    /// End of the chapter's nominal span (start + duration)
    pub fn end_time_seconds(&self) -> f64 {
        self.start_time_seconds + self.duration_seconds.max(0.0)
    }
}

/// An audiobook opened for playback
///
/// Immutable for the duration of a session. Construct through [`Track::new`]
/// or call [`Track::validated`] on deserialized values so that the chapter
/// table is sorted and checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track identifier
    pub id: Uuid,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Total duration in seconds (None until resolved from decoded media)
    #[serde(default)]
    pub total_duration_seconds: Option<f64>,

    /// Media location: local path or http(s) URL (None = demo mode)
    #[serde(default)]
    pub media_url: Option<String>,

    /// Chapters, sorted by `start_time_seconds` ascending
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Track {
    /// Create a validated track
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        total_duration_seconds: Option<f64>,
        media_url: Option<String>,
        chapters: Vec<Chapter>,
    ) -> Result<Self> {
        Self {
            id,
            title: title.into(),
            total_duration_seconds,
            media_url,
            chapters,
        }
        .validated()
    }

    /// Sort the chapter table and check its invariants
    ///
    /// Rejects chapter number 0, duplicate numbers, negative or non-finite
    /// start times, and a negative or non-finite total duration.
    pub fn validated(mut self) -> Result<Self> {
        if let Some(total) = self.total_duration_seconds {
            if !total.is_finite() || total < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "track {} has invalid total duration {}",
                    self.id, total
                )));
            }
        }

        let mut seen = HashSet::with_capacity(self.chapters.len());
        for chapter in &self.chapters {
            if chapter.number == 0 {
                return Err(Error::InvalidInput(format!(
                    "track {}: chapter numbers start at 1",
                    self.id
                )));
            }
            if !chapter.start_time_seconds.is_finite() || chapter.start_time_seconds < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "track {}: chapter {} has invalid start time {}",
                    self.id, chapter.number, chapter.start_time_seconds
                )));
            }
            if !seen.insert(chapter.number) {
                return Err(Error::InvalidInput(format!(
                    "track {}: duplicate chapter number {}",
                    self.id, chapter.number
                )));
            }
        }

        self.chapters
            .sort_by(|a, b| a.start_time_seconds.total_cmp(&b.start_time_seconds));
        Ok(self)
    }

    /// End of the last chapter, if any chapters are defined
    pub fn chapters_end_seconds(&self) -> Option<f64> {
        self.chapters
            .iter()
            .map(Chapter::end_time_seconds)
            .max_by(|a, b| a.total_cmp(b))
    }
}

/// Who is listening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "user_id", rename_all = "lowercase")]
pub enum UserIdentity {
    /// No authenticated user; checkpointing and progress fetch are disabled
    #[default]
    Anonymous,
    /// Authenticated user
    User(Uuid),
}

impl UserIdentity {
    /// User id if authenticated
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            UserIdentity::Anonymous => None,
            UserIdentity::User(id) => Some(*id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

/// Persisted listening position, unique per `(user_id, track_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: Uuid,
    pub track_id: Uuid,
    pub current_chapter: u32,
    pub current_position_seconds: f64,
    pub last_played_at: DateTime<Utc>,
    pub is_completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_sorts_chapters() {
        let track = Track::new(
            Uuid::new_v4(),
            "Gita",
            Some(600.0),
            None,
            vec![
                Chapter::new(2, "Two", 300.0, 300.0),
                Chapter::new(1, "One", 0.0, 300.0),
            ],
        )
        .unwrap();

        assert_eq!(track.chapters[0].number, 1);
        assert_eq!(track.chapters[1].number, 2);
        assert_eq!(track.chapters_end_seconds(), Some(600.0));
    }

    #[test]
    fn test_track_rejects_duplicate_numbers() {
        let result = Track::new(
            Uuid::new_v4(),
            "Dup",
            None,
            None,
            vec![
                Chapter::new(1, "A", 0.0, 10.0),
                Chapter::new(1, "B", 10.0, 10.0),
            ],
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_track_rejects_chapter_zero_and_negative_start() {
        let zero = Track::new(Uuid::new_v4(), "Z", None, None, vec![Chapter::new(0, "Z", 0.0, 1.0)]);
        assert!(zero.is_err());

        let negative = Track::new(Uuid::new_v4(), "N", None, None, vec![Chapter::new(1, "N", -1.0, 1.0)]);
        assert!(negative.is_err());
    }

    #[test]
    fn test_user_identity() {
        assert!(!UserIdentity::Anonymous.is_authenticated());
        let id = Uuid::new_v4();
        assert_eq!(UserIdentity::User(id).user_id(), Some(id));

        let json = serde_json::to_string(&UserIdentity::User(id)).unwrap();
        let back: UserIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserIdentity::User(id));
    }
}
