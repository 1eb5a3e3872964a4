//! Domain and record types shared by the core and the store

use alior_util::{EventId, GroupId, UserId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Fixed set of event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Personal,
    Family,
    Work,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Personal, Category::Family, Category::Work];

    /// Label shown on the category buttons and stored with the event
    pub fn label(&self) -> &'static str {
        match self {
            Category::Personal => "Личное",
            Category::Family => "Семья",
            Category::Work => "Работа",
        }
    }

    /// Match user input against the category labels, ignoring case and padding
    pub fn from_label(input: &str) -> Option<Self> {
        let wanted = input.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.label().to_lowercase() == wanted)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived lifecycle status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl EventStatus {
    /// Stable storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::InProgress => "in_progress",
            EventStatus::Completed => "completed",
        }
    }

    /// User-facing label
    pub fn label(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "Запланировано",
            EventStatus::InProgress => "Идёт",
            EventStatus::Completed => "Завершено",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct UnknownValue(pub String);

impl FromStr for EventStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "in_progress" => Ok(EventStatus::InProgress),
            "completed" => Ok(EventStatus::Completed),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

impl FromStr for Category {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Category::Personal),
            "family" => Ok(Category::Family),
            "work" => Ok(Category::Work),
            other => Category::from_label(other).ok_or_else(|| UnknownValue(other.to_string())),
        }
    }
}

impl Category {
    /// Stable storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Family => "family",
            Category::Work => "work",
        }
    }
}

/// Registered chat user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
}

/// Persisted group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

/// Link between a user and a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub is_admin: bool,
}

/// A group as seen by one of its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    pub group: Group,
    pub is_admin: bool,
    pub member_count: usize,
}

/// Persisted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub group_id: GroupId,
    pub category: Category,
    pub name: String,
    pub start: DateTime<Local>,
    pub duration: Duration,
    pub all_day: bool,
    /// Cached result of the status resolver
    pub status: EventStatus,
}

/// Event ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub group_id: GroupId,
    pub category: Category,
    pub name: String,
    pub start: DateTime<Local>,
    pub duration: Duration,
    pub all_day: bool,
    pub status: EventStatus,
}

/// Outcome of removing a membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MembershipRemoval {
    /// Other members (including an admin) remain
    Removed,
    /// The leaving user was the last admin; another member was promoted
    AdminTransferred { new_admin: UserId },
    /// No memberships remained, so the group was deleted too
    GroupDeleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_label_ignores_case_and_padding() {
        assert_eq!(Category::from_label("Личное"), Some(Category::Personal));
        assert_eq!(Category::from_label("  семья "), Some(Category::Family));
        assert_eq!(Category::from_label("РАБОТА"), Some(Category::Work));
        assert_eq!(Category::from_label("Отдых"), None);
        assert_eq!(Category::from_label(""), None);
    }

    #[test]
    fn category_storage_keys_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn status_storage_keys_round_trip() {
        for status in [EventStatus::Scheduled, EventStatus::InProgress, EventStatus::Completed] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("Запланировано".parse::<EventStatus>().is_err());
    }

    #[test]
    fn membership_removal_serializes_tagged() {
        let json = serde_json::to_string(&MembershipRemoval::GroupDeleted).unwrap();
        assert_eq!(json, r#"{"outcome":"group_deleted"}"#);
    }
}
