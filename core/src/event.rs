//! Completed-action events.
//!
//! An [`ActionEvent`] is produced exactly once for every dispatch whose epic
//! completed successfully. Events are the only input of the reducer pipeline
//! and are numbered in the order the resource applied them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one successfully completed action.
///
/// Events are immutable once built; fields are exposed through accessors only.
///
/// # Example
///
/// ```
/// use composable_resource_core::event::ActionEvent;
///
/// let event = ActionEvent::new(1, "add", 5);
/// assert_eq!(event.action(), "add");
/// assert_eq!(*event.data(), 5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent<D> {
    sequence: u64,
    action: String,
    data: D,
    completed_at: DateTime<Utc>,
}

impl<D> ActionEvent<D> {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(sequence: u64, action: impl Into<String>, data: D) -> Self {
        Self::at(sequence, action, data, Utc::now())
    }

    /// Build an event with an explicit completion time.
    #[must_use]
    pub fn at(sequence: u64, action: impl Into<String>, data: D, completed_at: DateTime<Utc>) -> Self {
        Self {
            sequence,
            action: action.into(),
            data,
            completed_at,
        }
    }

    /// Position of this event in the resource's event order, starting at 1.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Name of the action that produced this event.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Post-middleware result of the epic.
    #[must_use]
    pub const fn data(&self) -> &D {
        &self.data
    }

    /// When the resource applied the event.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Consume the event, returning its data.
    #[must_use]
    pub fn into_data(self) -> D {
        self.data
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_exposes_fields() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        let event = ActionEvent::at(3, "rename", "bob".to_string(), at);

        assert_eq!(event.sequence(), 3);
        assert_eq!(event.action(), "rename");
        assert_eq!(event.data(), "bob");
        assert_eq!(event.completed_at(), at);
        assert_eq!(event.into_data(), "bob");
    }
}
