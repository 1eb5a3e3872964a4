//! Conversation state machine
//!
//! [`advance`] is a pure function of the session and one input. It never
//! touches persistence: reads are requested through [`Effect::Pick`] and
//! [`Effect::Show`], writes through [`Effect::Commit`], and the engine carries
//! them out after the session has been saved.

use alior_api::{Category, InboundEvent, NewEvent, Payload, Selection};
use alior_util::{
    parse_date_token, parse_datetime_token, parse_duration, DurationError, EventId, GroupId,
};
use std::time::Duration;

use crate::{Command, DraftEvent, DraftGroup, Session, Step};

/// Reply button that marks an event as lasting the whole day
pub const ALL_DAY_LABEL: &str = "Весь день";

/// Reply button that leaves the duration at zero
pub const SKIP_LABEL: &str = "Пропустить";

/// Reply button that finishes the member list
pub const DONE_LABEL: &str = "Готово";

/// One inbound interaction, classified for the current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Text(String),
    Selection(Selection),
}

impl Input {
    /// Classify an inbound event.
    ///
    /// Main menu and `/start` are recognised everywhere. Other command labels
    /// only count as commands when Idle or when the gateway flagged the
    /// message as a command, so an event may be named "Мои события".
    pub fn classify(step: Step, event: &InboundEvent) -> Input {
        match &event.payload {
            Payload::Selection { selection } => Input::Selection(*selection),
            Payload::Text { text } => match Command::lookup(text) {
                Some(command) if command.is_universal() || step.is_idle() || event.is_command => {
                    Input::Command(command)
                }
                _ => Input::Text(text.clone()),
            },
        }
    }
}

/// Text prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    MainMenu,
    Category,
    EventName,
    StartTime,
    AllDayDate,
    Duration,
    GroupName,
    Members { collected: Vec<String> },
}

/// Button lists built from stored data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picker {
    /// Groups the user administers, as the target of a new event
    GroupForEvent,
    /// Events in groups the user administers
    EventToDelete,
    /// Groups the user administers
    GroupToDelete,
    /// Every group the user belongs to
    GroupToLeave,
}

/// Read-only listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    MyEvents,
    MyGroups,
}

/// Annotation shown above a repeated prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UnknownCommand,
    FinishOrCancel,
    UseButtons,
    TypeText,
    StaleSelection,
    InvalidCategory,
    EmptyName,
    InvalidDateTime,
    InvalidDate,
    InvalidDuration(DurationError),
    NoNewMembers,
    /// Arrived together with another message from the same user and was dropped
    Superseded,
}

/// Terminal actions handed to persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRequest {
    Register,
    CreateEvent(NewEvent),
    CreateGroup { name: String, members: Vec<String> },
    DeleteEvent(EventId),
    DeleteGroup(GroupId),
    LeaveGroup(GroupId),
}

/// Side effect of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Prompt(Prompt, Option<Notice>),
    Pick(Picker, Option<Notice>),
    Show(View),
    Commit(CommitRequest),
    /// Session was inconsistent and has been reset
    Internal(String),
}

/// Advance a session by one input.
///
/// Total over every step and input. Rejected input leaves the step and the
/// drafts untouched. Commits and internal errors leave the session Idle.
pub fn advance(session: &mut Session, input: Input) -> Effect {
    match input {
        Input::Command(Command::Start) => {
            session.reset();
            Effect::Commit(CommitRequest::Register)
        }
        Input::Command(Command::MainMenu) => {
            session.reset();
            Effect::Prompt(Prompt::MainMenu, None)
        }
        input => match session.step {
            Step::Idle => idle(session, input),
            step if step.in_event_flow() => event_flow(session, input),
            step if step.in_group_flow() => group_flow(session, input),
            step if step.expects_selection() => picker_flow(session, input),
            step => internal(session, format!("{:?} has no handler", step)),
        },
    }
}

/// The prompt that asks for the current step's input again
pub fn current_prompt(step: Step, collected: &[String], notice: Option<Notice>) -> Effect {
    match step {
        Step::Idle => Effect::Prompt(Prompt::MainMenu, notice),
        Step::SelectingGroup => Effect::Pick(Picker::GroupForEvent, notice),
        Step::ChoosingCategory => Effect::Prompt(Prompt::Category, notice),
        Step::EnteringEventName => Effect::Prompt(Prompt::EventName, notice),
        Step::EnteringTime => Effect::Prompt(Prompt::StartTime, notice),
        Step::EnteringAllDayDate => Effect::Prompt(Prompt::AllDayDate, notice),
        Step::EnteringDuration => Effect::Prompt(Prompt::Duration, notice),
        Step::EnteringGroupName => Effect::Prompt(Prompt::GroupName, notice),
        Step::EnteringMembers => Effect::Prompt(
            Prompt::Members {
                collected: collected.to_vec(),
            },
            notice,
        ),
        Step::SelectingEventToDelete => Effect::Pick(Picker::EventToDelete, notice),
        Step::SelectingGroupToDelete => Effect::Pick(Picker::GroupToDelete, notice),
        Step::SelectingGroupToLeave => Effect::Pick(Picker::GroupToLeave, notice),
    }
}

fn internal(session: &mut Session, reason: String) -> Effect {
    session.reset();
    Effect::Internal(reason)
}

fn is_label(text: &str, label: &str) -> bool {
    text.trim().to_lowercase() == label.to_lowercase()
}

/// Split a members message into usernames
fn split_user_names(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|name| name.trim_start_matches('@'))
        .filter(|name| !name.is_empty())
}

fn idle(session: &mut Session, input: Input) -> Effect {
    match input {
        Input::Command(command) => match command {
            Command::CreateEvent => {
                session.draft_event = Some(DraftEvent::default());
                session.step = Step::SelectingGroup;
                Effect::Pick(Picker::GroupForEvent, None)
            }
            Command::MyEvents => Effect::Show(View::MyEvents),
            Command::MyGroups => Effect::Show(View::MyGroups),
            Command::DeleteEvent => {
                session.step = Step::SelectingEventToDelete;
                Effect::Pick(Picker::EventToDelete, None)
            }
            Command::CreateGroup => {
                session.draft_group = Some(DraftGroup::default());
                session.step = Step::EnteringGroupName;
                Effect::Prompt(Prompt::GroupName, None)
            }
            Command::DeleteGroup => {
                session.step = Step::SelectingGroupToDelete;
                Effect::Pick(Picker::GroupToDelete, None)
            }
            Command::LeaveGroup => {
                session.step = Step::SelectingGroupToLeave;
                Effect::Pick(Picker::GroupToLeave, None)
            }
            Command::Start | Command::MainMenu => Effect::Prompt(Prompt::MainMenu, None),
        },
        Input::Text(_) => Effect::Prompt(Prompt::MainMenu, Some(Notice::UnknownCommand)),
        Input::Selection(_) => Effect::Prompt(Prompt::MainMenu, Some(Notice::StaleSelection)),
    }
}

fn event_flow(session: &mut Session, input: Input) -> Effect {
    let step = session.step;
    let Some(draft) = session.draft_event.as_mut() else {
        return internal(session, format!("{:?} without a draft event", step));
    };

    match (step, input) {
        (_, Input::Command(_)) => current_prompt(step, &[], Some(Notice::FinishOrCancel)),

        (Step::SelectingGroup, Input::Selection(Selection::Group(group))) => {
            draft.group = Some(group);
            session.step = Step::ChoosingCategory;
            Effect::Prompt(Prompt::Category, None)
        }
        (Step::SelectingGroup, _) => Effect::Pick(Picker::GroupForEvent, Some(Notice::UseButtons)),

        (Step::ChoosingCategory, Input::Text(text)) => match Category::from_label(&text) {
            Some(category) => {
                draft.category = Some(category);
                session.step = Step::EnteringEventName;
                Effect::Prompt(Prompt::EventName, None)
            }
            None => Effect::Prompt(Prompt::Category, Some(Notice::InvalidCategory)),
        },
        (Step::ChoosingCategory, Input::Selection(_)) => {
            Effect::Prompt(Prompt::Category, Some(Notice::InvalidCategory))
        }

        (Step::EnteringEventName, Input::Text(text)) => {
            let name = text.trim();
            if name.is_empty() {
                return Effect::Prompt(Prompt::EventName, Some(Notice::EmptyName));
            }
            draft.name = Some(name.to_string());
            session.step = Step::EnteringTime;
            Effect::Prompt(Prompt::StartTime, None)
        }

        (Step::EnteringTime, Input::Text(text)) => {
            if is_label(&text, ALL_DAY_LABEL) {
                session.step = Step::EnteringAllDayDate;
                return Effect::Prompt(Prompt::AllDayDate, None);
            }
            match parse_datetime_token(&text) {
                Ok(start) => {
                    draft.start = Some(start);
                    draft.all_day = false;
                    session.step = Step::EnteringDuration;
                    Effect::Prompt(Prompt::Duration, None)
                }
                Err(_) => Effect::Prompt(Prompt::StartTime, Some(Notice::InvalidDateTime)),
            }
        }

        (Step::EnteringAllDayDate, Input::Text(text)) => match parse_date_token(&text) {
            Ok(day) => {
                draft.start = Some(day);
                draft.all_day = true;
                session.step = Step::EnteringDuration;
                Effect::Prompt(Prompt::Duration, None)
            }
            Err(_) => Effect::Prompt(Prompt::AllDayDate, Some(Notice::InvalidDate)),
        },

        (Step::EnteringDuration, Input::Text(text)) => {
            let duration = if is_label(&text, SKIP_LABEL) {
                Duration::ZERO
            } else {
                match parse_duration(&text) {
                    Ok(duration) => duration,
                    Err(e) => return Effect::Prompt(Prompt::Duration, Some(Notice::InvalidDuration(e))),
                }
            };

            let mut finished = draft.clone();
            finished.duration = duration;
            match finished.finish() {
                Ok(event) => {
                    session.reset();
                    Effect::Commit(CommitRequest::CreateEvent(event))
                }
                Err(e) => internal(session, e.to_string()),
            }
        }

        (_, Input::Selection(_)) => current_prompt(step, &[], Some(Notice::TypeText)),
        (_, Input::Text(_)) => internal(session, format!("{:?} is not an event flow step", step)),
    }
}

fn group_flow(session: &mut Session, input: Input) -> Effect {
    let step = session.step;
    let Some(draft) = session.draft_group.as_mut() else {
        return internal(session, format!("{:?} without a draft group", step));
    };

    match (step, input) {
        (_, Input::Command(_)) => current_prompt(step, &draft.members, Some(Notice::FinishOrCancel)),

        (Step::EnteringGroupName, Input::Text(text)) => {
            let name = text.trim();
            if name.is_empty() {
                return Effect::Prompt(Prompt::GroupName, Some(Notice::EmptyName));
            }
            draft.name = Some(name.to_string());
            session.step = Step::EnteringMembers;
            Effect::Prompt(Prompt::Members { collected: Vec::new() }, None)
        }

        (Step::EnteringMembers, Input::Text(text)) if is_label(&text, DONE_LABEL) => {
            let Some(name) = draft.name.clone() else {
                return internal(session, "member list without a group name".into());
            };
            let members = draft.members.clone();
            session.reset();
            Effect::Commit(CommitRequest::CreateGroup { name, members })
        }
        (Step::EnteringMembers, Input::Text(text)) => {
            let notice = match draft.add_members(split_user_names(&text)) {
                0 => Some(Notice::NoNewMembers),
                _ => None,
            };
            Effect::Prompt(
                Prompt::Members {
                    collected: draft.members.clone(),
                },
                notice,
            )
        }

        (_, Input::Selection(_)) => current_prompt(step, &draft.members, Some(Notice::TypeText)),
        (_, Input::Text(_)) => internal(session, format!("{:?} is not a group flow step", step)),
    }
}

fn picker_flow(session: &mut Session, input: Input) -> Effect {
    let step = session.step;
    let request = match (step, input) {
        (Step::SelectingEventToDelete, Input::Selection(Selection::Event(id))) => {
            CommitRequest::DeleteEvent(id)
        }
        (Step::SelectingGroupToDelete, Input::Selection(Selection::Group(id))) => {
            CommitRequest::DeleteGroup(id)
        }
        (Step::SelectingGroupToLeave, Input::Selection(Selection::Group(id))) => {
            CommitRequest::LeaveGroup(id)
        }
        (_, Input::Command(_)) => return current_prompt(step, &[], Some(Notice::FinishOrCancel)),
        _ => return current_prompt(step, &[], Some(Notice::UseButtons)),
    };

    session.reset();
    Effect::Commit(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alior_api::EventStatus;
    use alior_util::UserId;
    use chrono::{DateTime, Local, TimeZone};

    const USER: UserId = UserId::new(1);

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2029, 12, 1, 8, 0, 0).unwrap()
    }

    fn idle_session() -> Session {
        Session::new(USER, now())
    }

    fn text(s: &str) -> Input {
        Input::Text(s.into())
    }

    fn cmd(c: Command) -> Input {
        Input::Command(c)
    }

    /// Session walked into the event flow up to the duration step
    fn at_duration_step() -> Session {
        let mut session = idle_session();
        advance(&mut session, cmd(Command::CreateEvent));
        advance(&mut session, Input::Selection(Selection::Group(GroupId::new(4))));
        advance(&mut session, text("Личное"));
        advance(&mut session, text("Gym"));
        advance(&mut session, text("01.01.2030 10:00"));
        assert_eq!(session.step, Step::EnteringDuration);
        session
    }

    /// A session placed in `step` with whatever drafts that step needs
    fn session_at(step: Step) -> Session {
        let mut session = idle_session();
        session.step = step;
        if step.in_event_flow() {
            session.draft_event = Some(DraftEvent {
                group: Some(GroupId::new(1)),
                category: Some(Category::Family),
                name: Some("Dinner".into()),
                start: Some(now()),
                ..Default::default()
            });
        }
        if step.in_group_flow() {
            session.draft_group = Some(DraftGroup {
                name: Some("Family".into()),
                members: vec!["bob".into()],
            });
        }
        session
    }

    fn sample_inputs() -> Vec<Input> {
        let mut inputs: Vec<Input> = Command::MENU.into_iter().map(Input::Command).collect();
        inputs.extend([
            cmd(Command::Start),
            cmd(Command::MainMenu),
            text(""),
            text("   "),
            text("Работа"),
            text("Gym"),
            text("01.01.2030 10:00"),
            text("05.05.2031"),
            text("1h"),
            text(ALL_DAY_LABEL),
            text(SKIP_LABEL),
            text(DONE_LABEL),
            text("@alice, bob"),
            Input::Selection(Selection::Group(GroupId::new(1))),
            Input::Selection(Selection::Event(EventId::new(1))),
        ]);
        inputs
    }

    #[test]
    fn test_scenario_timed_event() {
        let mut session = at_duration_step();

        let effect = advance(&mut session, text("1h"));
        let Effect::Commit(CommitRequest::CreateEvent(event)) = effect else {
            panic!("expected event commit, got {:?}", effect);
        };
        assert_eq!(event.group_id, GroupId::new(4));
        assert_eq!(event.category, Category::Personal);
        assert_eq!(event.name, "Gym");
        assert_eq!(event.start, Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap());
        assert_eq!(event.duration, Duration::from_secs(3600));
        assert!(!event.all_day);
        assert_eq!(event.status, EventStatus::Scheduled);

        assert_eq!(session.step, Step::Idle);
        assert!(session.draft_event.is_none());
    }

    #[test]
    fn test_scenario_all_day_event_with_skipped_duration() {
        let mut session = idle_session();
        advance(&mut session, cmd(Command::CreateEvent));
        advance(&mut session, Input::Selection(Selection::Group(GroupId::new(2))));
        advance(&mut session, text("семья"));
        advance(&mut session, text("Birthday"));

        assert_eq!(
            advance(&mut session, text("весь день")),
            Effect::Prompt(Prompt::AllDayDate, None)
        );
        assert_eq!(session.step, Step::EnteringAllDayDate);
        advance(&mut session, text("05.05.2031"));
        assert_eq!(session.step, Step::EnteringDuration);

        let Effect::Commit(CommitRequest::CreateEvent(event)) = advance(&mut session, text(SKIP_LABEL))
        else {
            panic!("expected event commit");
        };
        assert!(event.all_day);
        assert_eq!(event.duration, Duration::ZERO);
        assert_eq!(event.category, Category::Family);
        assert_eq!(event.start, Local.with_ymd_and_hms(2031, 5, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_scenario_invalid_duration_keeps_step() {
        let mut session = at_duration_step();
        let before = session.clone();

        let effect = advance(&mut session, text("abc"));
        assert!(matches!(
            effect,
            Effect::Prompt(Prompt::Duration, Some(Notice::InvalidDuration(_)))
        ));
        assert_eq!(session, before);
    }

    #[test]
    fn test_validation_failures_do_not_mutate() {
        let cases = [
            (Step::ChoosingCategory, text("Отдых"), Notice::InvalidCategory),
            (Step::EnteringEventName, text("  "), Notice::EmptyName),
            (Step::EnteringTime, text("2030-01-01 10:00"), Notice::InvalidDateTime),
            (Step::EnteringTime, text("32.01.2030 10:00"), Notice::InvalidDateTime),
            (Step::EnteringAllDayDate, text("5.5.2031"), Notice::InvalidDate),
            (Step::EnteringGroupName, text(""), Notice::EmptyName),
            (Step::EnteringMembers, text(" , ;"), Notice::NoNewMembers),
        ];

        for (step, input, expected) in cases {
            let mut session = session_at(step);
            let before = session.clone();
            let effect = advance(&mut session, input);

            let notice = match effect {
                Effect::Prompt(_, notice) | Effect::Pick(_, notice) => notice,
                other => panic!("{:?}: expected a re-prompt, got {:?}", step, other),
            };
            assert_eq!(notice, Some(expected), "{:?}", step);
            assert_eq!(session, before, "{:?}", step);
        }
    }

    #[test]
    fn test_main_menu_from_every_step() {
        for step in Step::ALL {
            for label in ["Главное меню", "/menu", "/cancel"] {
                let mut session = session_at(step);
                let event = InboundEvent::text(USER, label);
                let input = Input::classify(step, &event);

                assert_eq!(advance(&mut session, input), Effect::Prompt(Prompt::MainMenu, None));
                assert_eq!(session.step, Step::Idle);
                assert!(session.draft_event.is_none());
                assert!(session.draft_group.is_none());
            }
        }
    }

    #[test]
    fn test_transition_is_total() {
        for step in Step::ALL {
            for input in sample_inputs() {
                let mut session = session_at(step);
                let effect = advance(&mut session, input.clone());

                // Leaving a flow always drops the drafts with it
                if session.step.is_idle() {
                    assert!(session.draft_event.is_none(), "{:?} {:?}", step, input);
                    assert!(session.draft_group.is_none(), "{:?} {:?}", step, input);
                }
                if let Effect::Internal(reason) = effect {
                    panic!("{:?} {:?} hit an internal error: {}", step, input, reason);
                }
            }
        }
    }

    #[test]
    fn test_missing_draft_is_internal() {
        let mut session = idle_session();
        session.step = Step::EnteringDuration;

        assert!(matches!(advance(&mut session, text("1h")), Effect::Internal(_)));
        assert_eq!(session.step, Step::Idle);
    }

    #[test]
    fn test_text_in_picker_asks_for_buttons() {
        for step in [
            Step::SelectingGroup,
            Step::SelectingEventToDelete,
            Step::SelectingGroupToDelete,
            Step::SelectingGroupToLeave,
        ] {
            let mut session = session_at(step);
            let before = session.clone();
            let effect = advance(&mut session, text("Family"));
            assert!(
                matches!(effect, Effect::Pick(_, Some(Notice::UseButtons))),
                "{:?}",
                step
            );
            assert_eq!(session, before);
        }
    }

    #[test]
    fn test_menu_label_mid_flow() {
        // Typed without the command hint it is just an event name
        let mut session = session_at(Step::EnteringEventName);
        let typed = InboundEvent::text(USER, "Мои события");
        let input = Input::classify(session.step, &typed);
        advance(&mut session, input);
        assert_eq!(session.step, Step::EnteringTime);

        // Pressed as a menu button it asks the user to finish first
        let mut session = session_at(Step::EnteringEventName);
        let pressed = InboundEvent::command(USER, "Мои события");
        let input = Input::classify(session.step, &pressed);
        let effect = advance(&mut session, input);
        assert_eq!(
            effect,
            Effect::Prompt(Prompt::EventName, Some(Notice::FinishOrCancel))
        );
        assert_eq!(session.step, Step::EnteringEventName);
    }

    #[test]
    fn test_group_flow_collects_members() {
        let mut session = idle_session();
        advance(&mut session, cmd(Command::CreateGroup));
        advance(&mut session, text("Family"));
        advance(&mut session, text("@alice bob"));

        let effect = advance(&mut session, text("carol, @Alice"));
        assert_eq!(
            effect,
            Effect::Prompt(
                Prompt::Members {
                    collected: vec!["alice".into(), "bob".into(), "carol".into()]
                },
                None
            )
        );

        let effect = advance(&mut session, text(DONE_LABEL));
        assert_eq!(
            effect,
            Effect::Commit(CommitRequest::CreateGroup {
                name: "Family".into(),
                members: vec!["alice".into(), "bob".into(), "carol".into()],
            })
        );
        assert!(session.step.is_idle());
        assert!(session.draft_group.is_none());
    }

    #[test]
    fn test_deletion_pickers_commit_on_selection() {
        let mut session = idle_session();
        assert_eq!(
            advance(&mut session, cmd(Command::DeleteEvent)),
            Effect::Pick(Picker::EventToDelete, None)
        );
        // A group button does not answer an event picker
        assert_eq!(
            advance(&mut session, Input::Selection(Selection::Group(GroupId::new(1)))),
            Effect::Pick(Picker::EventToDelete, Some(Notice::UseButtons))
        );
        assert_eq!(
            advance(&mut session, Input::Selection(Selection::Event(EventId::new(9)))),
            Effect::Commit(CommitRequest::DeleteEvent(EventId::new(9)))
        );

        let mut session = idle_session();
        advance(&mut session, cmd(Command::LeaveGroup));
        assert_eq!(
            advance(&mut session, Input::Selection(Selection::Group(GroupId::new(3)))),
            Effect::Commit(CommitRequest::LeaveGroup(GroupId::new(3)))
        );
    }

    #[test]
    fn test_start_registers_from_anywhere() {
        let mut session = session_at(Step::EnteringMembers);
        let event = InboundEvent::text(USER, "/start");
        let input = Input::classify(session.step, &event);
        let effect = advance(&mut session, input);
        assert_eq!(effect, Effect::Commit(CommitRequest::Register));
        assert!(session.step.is_idle());
    }

    #[test]
    fn test_idle_text_is_unknown_command() {
        let mut session = idle_session();
        assert_eq!(
            advance(&mut session, text("hello")),
            Effect::Prompt(Prompt::MainMenu, Some(Notice::UnknownCommand))
        );
        assert_eq!(
            advance(&mut session, Input::Selection(Selection::Group(GroupId::new(1)))),
            Effect::Prompt(Prompt::MainMenu, Some(Notice::StaleSelection))
        );
    }
}
