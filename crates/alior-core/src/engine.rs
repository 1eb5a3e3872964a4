//! Inbound dispatch

use alior_api::{InboundEvent, OutboundMessage, ReplyOption, Selection};
use alior_store::{normalize_user_name, Store};
use alior_util::{AliorError, GroupId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::machine::{advance, current_prompt, CommitRequest, Effect, Input, Picker, View};
use crate::{prompts, status, Notice, Sender, SessionStore, Step};

/// Conversation engine: routes each inbound event through the user's session.
///
/// Handlers for different users may run concurrently. Nothing here holds the
/// session lock while talking to the store or the sender.
pub struct Engine {
    sessions: Arc<SessionStore>,
    store: Arc<dyn Store>,
    sender: Arc<dyn Sender>,
}

impl Engine {
    pub fn new(sessions: Arc<SessionStore>, store: Arc<dyn Store>, sender: Arc<dyn Sender>) -> Self {
        Self {
            sessions,
            store,
            sender,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handle one inbound event and send exactly one reply
    pub fn handle_inbound(&self, event: InboundEvent) {
        let user = event.user_id;
        let mut session = self.sessions.get_or_create(user);
        let from = session.step;

        let input = Input::classify(from, &event);
        let mut effect = advance(&mut session, input);
        let to = session.step;

        if self.sessions.save(session) {
            debug!(user_id = %user, from = ?from, to = ?to, "Session advanced");
        } else {
            // Another message from this user got there first; its effect stands
            info!(user_id = %user, from = ?from, "Concurrent message dropped");
            effect = self.repeat_prompt(user);
        }

        let reply = self.execute(&event, effect);
        self.sender.send(reply);
    }

    /// Ask again for whatever the user's stored session is waiting for
    fn repeat_prompt(&self, user: UserId) -> Effect {
        match self.sessions.peek(user) {
            Some(latest) => {
                let collected = latest
                    .draft_group
                    .map(|draft| draft.members)
                    .unwrap_or_default();
                current_prompt(latest.step, &collected, Some(Notice::Superseded))
            }
            None => current_prompt(Step::Idle, &[], Some(Notice::Superseded)),
        }
    }

    fn execute(&self, event: &InboundEvent, effect: Effect) -> OutboundMessage {
        let user = event.user_id;
        match effect {
            Effect::Prompt(prompt, notice) => prompts::prompt(user, &prompt, notice.as_ref()),
            Effect::Pick(picker, notice) => self.pick(user, picker, notice.as_ref()),
            Effect::Show(view) => self
                .show(user, view)
                .unwrap_or_else(|e| self.fail(user, e)),
            Effect::Commit(request) => self
                .commit(event, request)
                .unwrap_or_else(|e| self.fail(user, e)),
            Effect::Internal(reason) => self.fail(user, AliorError::internal(reason)),
        }
    }

    fn fail(&self, user: UserId, error: AliorError) -> OutboundMessage {
        match &error {
            AliorError::Internal(_) => {
                error!(user_id = %user, error = %error, "Conversation state was inconsistent");
                self.sessions.clear(user);
            }
            AliorError::PersistenceError(_) | AliorError::ConfigError(_) => {
                warn!(user_id = %user, error = %error, "Action failed");
            }
            _ => info!(user_id = %user, error = %error, "Action rejected"),
        }
        prompts::failure(user, &error)
    }

    fn require_admin(&self, group: GroupId, user: UserId) -> Result<(), AliorError> {
        if self.store.is_admin(group, user)? {
            Ok(())
        } else {
            Err(AliorError::permission(format!(
                "user {} is not an admin of group {}",
                user, group
            )))
        }
    }

    fn admin_groups(&self, user: UserId) -> Result<HashSet<GroupId>, AliorError> {
        Ok(self
            .store
            .groups_for_user(user)?
            .into_iter()
            .filter(|g| g.is_admin)
            .map(|g| g.group.id)
            .collect())
    }

    fn picker_options(&self, user: UserId, picker: Picker) -> Result<Vec<ReplyOption>, AliorError> {
        let options = match picker {
            Picker::GroupForEvent | Picker::GroupToDelete | Picker::GroupToLeave => self
                .store
                .groups_for_user(user)?
                .into_iter()
                .filter(|g| g.is_admin || picker == Picker::GroupToLeave)
                .map(|g| ReplyOption::select(g.group.name, Selection::Group(g.group.id)))
                .collect(),
            Picker::EventToDelete => {
                let admin_of = self.admin_groups(user)?;
                self.store
                    .events_for_user(user)?
                    .iter()
                    .filter(|e| admin_of.contains(&e.group_id))
                    .map(|e| ReplyOption::select(prompts::event_label(e), Selection::Event(e.id)))
                    .collect()
            }
        };
        Ok(options)
    }

    fn pick(&self, user: UserId, picker: Picker, notice: Option<&Notice>) -> OutboundMessage {
        match self.picker_options(user, picker) {
            Ok(options) if options.is_empty() => {
                self.sessions.clear(user);
                prompts::empty_picker(user, picker)
            }
            Ok(options) => prompts::picker(user, picker, options, notice),
            Err(e) => {
                self.sessions.clear(user);
                self.fail(user, e)
            }
        }
    }

    fn show(&self, user: UserId, view: View) -> Result<OutboundMessage, AliorError> {
        match view {
            View::MyEvents => {
                let mut events = self.store.events_for_user(user)?;
                // A failed resync still shows the events with freshly computed statuses
                let now = self.sessions.now();
                if let Err(e) = status::sync_statuses(self.store.as_ref(), &mut events, now) {
                    warn!(user_id = %user, error = %e, "Status resync failed");
                }
                Ok(prompts::events(user, &events))
            }
            View::MyGroups => {
                let groups = self.store.groups_for_user(user)?;
                Ok(prompts::groups(user, &groups))
            }
        }
    }

    /// Register the sender if the store has never seen them
    fn ensure_registered(&self, event: &InboundEvent) -> Result<(), AliorError> {
        if self.store.get_user(event.user_id)?.is_none() {
            let name = event
                .user_name
                .clone()
                .unwrap_or_else(|| event.user_id.to_string());
            self.store.upsert_user(event.user_id, &name)?;
            info!(user_id = %event.user_id, "User registered implicitly");
        }
        Ok(())
    }

    fn commit(&self, event: &InboundEvent, request: CommitRequest) -> Result<OutboundMessage, AliorError> {
        let user = event.user_id;

        match request {
            CommitRequest::Register => {
                let name = event
                    .user_name
                    .clone()
                    .unwrap_or_else(|| user.to_string());
                let registered = self.store.upsert_user(user, &name)?;
                info!(user_id = %user, user_name = %registered.user_name, "User registered");
                Ok(prompts::welcome(user, &registered))
            }

            CommitRequest::CreateEvent(new_event) => {
                let group = self
                    .store
                    .get_group(new_event.group_id)?
                    .ok_or_else(|| AliorError::not_found(format!("group {}", new_event.group_id)))?;
                self.require_admin(group.id, user)?;

                let created = self.store.create_event(new_event)?;
                info!(user_id = %user, event_id = %created.id, group_id = %group.id, "Event created");
                Ok(prompts::event_created(user, &created, &group))
            }

            CommitRequest::CreateGroup { name, members } => {
                self.ensure_registered(event)?;

                let matched = self.store.find_users_by_name(&members)?;
                let known: HashSet<String> = matched
                    .iter()
                    .map(|u| normalize_user_name(&u.user_name))
                    .collect();
                let unknown: Vec<String> = members
                    .iter()
                    .filter(|m| !known.contains(&normalize_user_name(m)))
                    .cloned()
                    .collect();
                let found: Vec<_> = matched.into_iter().filter(|u| u.id != user).collect();

                let ids: Vec<UserId> = found.iter().map(|u| u.id).collect();
                let group = self.store.create_group(&name, user, &ids)?;
                info!(
                    user_id = %user,
                    group_id = %group.id,
                    members = ids.len(),
                    unknown = unknown.len(),
                    "Group created"
                );
                Ok(prompts::group_created(user, &group, &found, &unknown))
            }

            CommitRequest::DeleteEvent(id) => {
                let target = self
                    .store
                    .get_event(id)?
                    .ok_or_else(|| AliorError::not_found(format!("event {}", id)))?;
                self.require_admin(target.group_id, user)?;

                self.store.delete_event(id)?;
                info!(user_id = %user, event_id = %id, "Event deleted");
                Ok(prompts::event_deleted(user, &target))
            }

            CommitRequest::DeleteGroup(id) => {
                let group = self
                    .store
                    .get_group(id)?
                    .ok_or_else(|| AliorError::not_found(format!("group {}", id)))?;
                self.require_admin(id, user)?;

                self.store.delete_group(id)?;
                info!(user_id = %user, group_id = %id, "Group deleted");
                Ok(prompts::group_deleted(user, &group))
            }

            CommitRequest::LeaveGroup(id) => {
                let group = self
                    .store
                    .get_group(id)?
                    .ok_or_else(|| AliorError::not_found(format!("group {}", id)))?;

                let outcome = self.store.remove_membership(id, user)?;
                let new_admin = match &outcome {
                    alior_api::MembershipRemoval::AdminTransferred { new_admin } => {
                        self.store.get_user(*new_admin)?
                    }
                    _ => None,
                };
                info!(user_id = %user, group_id = %id, outcome = ?outcome, "Left group");
                Ok(prompts::group_left(user, &group, &outcome, new_admin.as_ref()))
            }
        }
    }
}
