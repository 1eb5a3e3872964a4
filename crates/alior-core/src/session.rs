//! Per-user conversation session

use alior_api::{Category, EventStatus, NewEvent};
use alior_util::{AliorError, GroupId, UserId};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Where a user is inside a dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Idle,

    // Event creation
    SelectingGroup,
    ChoosingCategory,
    EnteringEventName,
    EnteringTime,
    EnteringAllDayDate,
    EnteringDuration,

    // Group creation
    EnteringGroupName,
    EnteringMembers,

    // Pickers
    SelectingEventToDelete,
    SelectingGroupToDelete,
    SelectingGroupToLeave,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Step::Idle,
        Step::SelectingGroup,
        Step::ChoosingCategory,
        Step::EnteringEventName,
        Step::EnteringTime,
        Step::EnteringAllDayDate,
        Step::EnteringDuration,
        Step::EnteringGroupName,
        Step::EnteringMembers,
        Step::SelectingEventToDelete,
        Step::SelectingGroupToDelete,
        Step::SelectingGroupToLeave,
    ];

    pub fn is_idle(&self) -> bool {
        matches!(self, Step::Idle)
    }

    /// Steps answered with a button selection rather than typed text
    pub fn expects_selection(&self) -> bool {
        matches!(
            self,
            Step::SelectingGroup
                | Step::SelectingEventToDelete
                | Step::SelectingGroupToDelete
                | Step::SelectingGroupToLeave
        )
    }

    pub fn in_event_flow(&self) -> bool {
        matches!(
            self,
            Step::SelectingGroup
                | Step::ChoosingCategory
                | Step::EnteringEventName
                | Step::EnteringTime
                | Step::EnteringAllDayDate
                | Step::EnteringDuration
        )
    }

    pub fn in_group_flow(&self) -> bool {
        matches!(self, Step::EnteringGroupName | Step::EnteringMembers)
    }
}

/// Event being assembled by the creation flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftEvent {
    pub group: Option<GroupId>,
    pub category: Option<Category>,
    pub name: Option<String>,
    pub start: Option<DateTime<Local>>,
    pub all_day: bool,
    pub duration: Duration,
}

impl DraftEvent {
    /// Turn a completed draft into a record ready for persistence.
    ///
    /// New events always start out `Scheduled`; the status sweep corrects
    /// events created in the past.
    pub fn finish(&self) -> Result<NewEvent, AliorError> {
        let missing = |field: &str| AliorError::internal(format!("draft event has no {}", field));

        Ok(NewEvent {
            group_id: self.group.ok_or_else(|| missing("group"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            name: self.name.clone().ok_or_else(|| missing("name"))?,
            start: self.start.ok_or_else(|| missing("start"))?,
            duration: self.duration,
            all_day: self.all_day,
            status: EventStatus::Scheduled,
        })
    }
}

/// Group being assembled by the creation flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftGroup {
    pub name: Option<String>,
    /// Usernames without `@`, in the order they were entered, no duplicates
    pub members: Vec<String>,
}

impl DraftGroup {
    /// Add usernames, skipping ones already collected. Returns how many were new.
    pub fn add_members<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for name in names {
            let name = name.as_ref().trim().trim_start_matches('@');
            if name.is_empty() {
                continue;
            }
            if self.members.iter().any(|m| m.eq_ignore_ascii_case(name)) {
                continue;
            }
            self.members.push(name.to_string());
            added += 1;
        }
        added
    }
}

/// Conversation state of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub step: Step,
    pub draft_event: Option<DraftEvent>,
    pub draft_group: Option<DraftGroup>,
    pub last_activity: DateTime<Local>,
    /// Bumped by every accepted write to the session store
    generation: u64,
}

impl Session {
    pub fn new(user_id: UserId, now: DateTime<Local>) -> Self {
        Self {
            user_id,
            step: Step::Idle,
            draft_event: None,
            draft_group: None,
            last_activity: now,
            generation: 0,
        }
    }

    /// Back to Idle with no drafts
    pub fn reset(&mut self) {
        self.step = Step::Idle;
        self.draft_event = None;
        self.draft_group = None;
    }

    /// Version of the stored session this copy was taken from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new(UserId::new(1), t0());
        assert!(session.step.is_idle());
        assert!(session.draft_event.is_none());
        assert!(session.draft_group.is_none());
        assert_eq!(session.last_activity, t0());
    }

    #[test]
    fn test_reset_drops_drafts() {
        let mut session = Session::new(UserId::new(1), t0());
        session.step = Step::EnteringMembers;
        session.draft_group = Some(DraftGroup::default());
        session.draft_event = Some(DraftEvent::default());

        session.reset();
        assert_eq!(session.step, Step::Idle);
        assert!(session.draft_event.is_none());
        assert!(session.draft_group.is_none());
    }

    #[test]
    fn test_finish_requires_complete_draft() {
        let mut draft = DraftEvent {
            group: Some(GroupId::new(1)),
            category: Some(Category::Work),
            name: Some("Sync".into()),
            ..Default::default()
        };
        assert!(draft.finish().unwrap_err().is_internal());

        draft.start = Some(t0());
        let event = draft.finish().unwrap();
        assert_eq!(event.status, EventStatus::Scheduled);
        assert_eq!(event.duration, Duration::ZERO);
        assert!(!event.all_day);
    }

    #[test]
    fn test_every_step_has_one_route() {
        for step in Step::ALL {
            let routes = [
                step.is_idle(),
                step.in_event_flow(),
                step.in_group_flow(),
                step.expects_selection() && !step.in_event_flow(),
            ];
            assert_eq!(routes.iter().filter(|r| **r).count(), 1, "{:?}", step);
        }
    }

    #[test]
    fn test_add_members_dedupes() {
        let mut draft = DraftGroup::default();
        assert_eq!(draft.add_members(["@alice", "bob", ""]), 2);
        assert_eq!(draft.add_members(["Alice", "carol"]), 1);
        assert_eq!(draft.members, vec!["alice", "bob", "carol"]);
    }
}
