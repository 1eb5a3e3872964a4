//! In-process store for unit and integration testing

use alior_api::{Event, EventStatus, Group, GroupView, Membership, MembershipRemoval, NewEvent, User};
use alior_util::{EventId, GroupId, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{normalize_user_name, Store, StoreError, StoreResult};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    groups: BTreeMap<GroupId, Group>,
    /// Join order is insertion order
    memberships: Vec<Membership>,
    events: BTreeMap<EventId, Event>,
    next_group: i64,
    next_event: i64,
}

impl State {
    fn members_of(&self, group: GroupId) -> impl Iterator<Item = &Membership> {
        self.memberships.iter().filter(move |m| m.group_id == group)
    }

    fn drop_group(&mut self, group: GroupId) {
        self.groups.remove(&group);
        self.memberships.retain(|m| m.group_id != group);
        self.events.retain(|_, e| e.group_id != group);
    }
}

/// Store kept entirely in memory, with the same semantics as [`crate::SqliteStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,

    /// Make every write fail with a database error
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unavailable database for writes
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("state lock poisoned".into()))
    }

    fn writable(&self) -> StoreResult<MutexGuard<'_, State>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("writes disabled".into()));
        }
        self.state()
    }
}

impl Store for MemoryStore {
    fn upsert_user(&self, id: UserId, user_name: &str) -> StoreResult<User> {
        let mut state = self.writable()?;
        let user = User {
            id,
            user_name: user_name.trim().trim_start_matches('@').to_string(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    fn find_users_by_name(&self, names: &[String]) -> StoreResult<Vec<User>> {
        let state = self.state()?;
        let mut found: Vec<User> = Vec::new();

        for name in names {
            let wanted = normalize_user_name(name);
            if wanted.is_empty() {
                continue;
            }
            let mut matches: Vec<&User> = state
                .users
                .values()
                .filter(|u| u.user_name.to_lowercase() == wanted)
                .collect();
            matches.sort_by_key(|u| u.id);
            if let Some(user) = matches.first()
                && !found.iter().any(|u| u.id == user.id)
            {
                found.push((*user).clone());
            }
        }

        Ok(found)
    }

    fn create_group(&self, name: &str, admin: UserId, members: &[UserId]) -> StoreResult<Group> {
        let mut state = self.writable()?;

        if !state.users.contains_key(&admin) {
            return Err(StoreError::NotFound(format!("user {}", admin)));
        }
        if let Some(missing) = members.iter().find(|m| !state.users.contains_key(m)) {
            return Err(StoreError::NotFound(format!("user {}", missing)));
        }

        state.next_group += 1;
        let group = Group {
            id: GroupId::new(state.next_group),
            name: name.to_string(),
        };
        state.groups.insert(group.id, group.clone());
        state.memberships.push(Membership {
            group_id: group.id,
            user_id: admin,
            is_admin: true,
        });
        for member in members {
            if state.members_of(group.id).any(|m| m.user_id == *member) {
                continue;
            }
            state.memberships.push(Membership {
                group_id: group.id,
                user_id: *member,
                is_admin: false,
            });
        }

        Ok(group)
    }

    fn get_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        Ok(self.state()?.groups.get(&id).cloned())
    }

    fn groups_for_user(&self, user: UserId) -> StoreResult<Vec<GroupView>> {
        let state = self.state()?;

        let mut views: Vec<GroupView> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user)
            .filter_map(|m| {
                let group = state.groups.get(&m.group_id)?;
                Some(GroupView {
                    group: group.clone(),
                    is_admin: m.is_admin,
                    member_count: state.members_of(m.group_id).count(),
                })
            })
            .collect();
        views.sort_by(|a, b| (&a.group.name, a.group.id).cmp(&(&b.group.name, b.group.id)));

        Ok(views)
    }

    fn memberships(&self, group: GroupId) -> StoreResult<Vec<Membership>> {
        Ok(self.state()?.members_of(group).cloned().collect())
    }

    fn is_admin(&self, group: GroupId, user: UserId) -> StoreResult<bool> {
        Ok(self
            .state()?
            .members_of(group)
            .any(|m| m.user_id == user && m.is_admin))
    }

    fn remove_membership(&self, group: GroupId, user: UserId) -> StoreResult<MembershipRemoval> {
        let mut state = self.writable()?;

        let position = state
            .memberships
            .iter()
            .position(|m| m.group_id == group && m.user_id == user)
            .ok_or_else(|| {
                StoreError::NotFound(format!("membership of user {} in group {}", user, group))
            })?;
        state.memberships.remove(position);

        if state.members_of(group).next().is_none() {
            state.drop_group(group);
            return Ok(MembershipRemoval::GroupDeleted);
        }

        if state.members_of(group).any(|m| m.is_admin) {
            return Ok(MembershipRemoval::Removed);
        }

        let successor = state
            .memberships
            .iter_mut()
            .find(|m| m.group_id == group)
            .ok_or_else(|| StoreError::Corrupt(format!("group {} lost its members", group)))?;
        successor.is_admin = true;

        Ok(MembershipRemoval::AdminTransferred {
            new_admin: successor.user_id,
        })
    }

    fn delete_group(&self, id: GroupId) -> StoreResult<()> {
        let mut state = self.writable()?;
        if !state.groups.contains_key(&id) {
            return Err(StoreError::NotFound(format!("group {}", id)));
        }
        state.drop_group(id);
        Ok(())
    }

    fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut state = self.writable()?;
        if !state.groups.contains_key(&event.group_id) {
            return Err(StoreError::NotFound(format!("group {}", event.group_id)));
        }

        state.next_event += 1;
        let stored = Event {
            id: EventId::new(state.next_event),
            group_id: event.group_id,
            category: event.category,
            name: event.name,
            start: event.start,
            duration: event.duration,
            all_day: event.all_day,
            status: event.status,
        };
        state.events.insert(stored.id, stored.clone());

        Ok(stored)
    }

    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.state()?.events.get(&id).cloned())
    }

    fn events_for_user(&self, user: UserId) -> StoreResult<Vec<Event>> {
        let state = self.state()?;

        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| state.members_of(e.group_id).any(|m| m.user_id == user))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.start, e.id));

        Ok(events)
    }

    fn list_events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.state()?.events.values().cloned().collect();
        events.sort_by_key(|e| (e.start, e.id));
        Ok(events)
    }

    fn set_event_status(&self, id: EventId, status: EventStatus) -> StoreResult<()> {
        let mut state = self.writable()?;
        let event = state
            .events
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("event {}", id)))?;
        event.status = status;
        Ok(())
    }

    fn delete_event(&self, id: EventId) -> StoreResult<()> {
        let mut state = self.writable()?;
        state
            .events
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("event {}", id)))
    }

    fn is_healthy(&self) -> bool {
        self.state.lock().is_ok() && !self.fail_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alior_api::Category;
    use chrono::{Local, TimeZone};
    use std::time::Duration;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_user(UserId::new(1), "alice").unwrap();
        store.upsert_user(UserId::new(2), "bob").unwrap();
        store.upsert_user(UserId::new(3), "carol").unwrap();
        store
    }

    #[test]
    fn test_admin_hand_over_and_group_removal() {
        let store = seeded();
        let group = store
            .create_group("Team", UserId::new(1), &[UserId::new(2), UserId::new(3)])
            .unwrap();

        assert_eq!(
            store.remove_membership(group.id, UserId::new(1)).unwrap(),
            MembershipRemoval::AdminTransferred {
                new_admin: UserId::new(2)
            }
        );
        assert_eq!(
            store.remove_membership(group.id, UserId::new(3)).unwrap(),
            MembershipRemoval::Removed
        );
        assert_eq!(
            store.remove_membership(group.id, UserId::new(2)).unwrap(),
            MembershipRemoval::GroupDeleted
        );
        assert!(store.get_group(group.id).unwrap().is_none());
    }

    #[test]
    fn test_every_group_keeps_an_admin() {
        let store = seeded();
        let group = store
            .create_group("Team", UserId::new(2), &[UserId::new(1), UserId::new(3)])
            .unwrap();

        for leaving in [UserId::new(2), UserId::new(1)] {
            store.remove_membership(group.id, leaving).unwrap();
            let members = store.memberships(group.id).unwrap();
            assert!(members.iter().any(|m| m.is_admin));
        }
    }

    #[test]
    fn test_find_users_by_name() {
        let store = seeded();
        let found = store
            .find_users_by_name(&["@Bob".into(), "dave".into(), "".into()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, UserId::new(2));
    }

    #[test]
    fn test_fail_writes() {
        let store = seeded();
        store.set_fail_writes(true);
        assert!(!store.is_healthy());
        assert!(matches!(
            store.create_group("Nope", UserId::new(1), &[]),
            Err(StoreError::Database(_))
        ));

        // Reads still work
        assert!(store.get_user(UserId::new(1)).unwrap().is_some());

        store.set_fail_writes(false);
        assert!(store.create_group("Yes", UserId::new(1), &[]).is_ok());
    }

    #[test]
    fn test_events_visible_to_members_only() {
        let store = seeded();
        let group = store.create_group("Team", UserId::new(1), &[UserId::new(2)]).unwrap();
        let event = store
            .create_event(NewEvent {
                group_id: group.id,
                category: Category::Work,
                name: "Review".into(),
                start: Local.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap(),
                duration: Duration::from_secs(1800),
                all_day: false,
                status: EventStatus::Scheduled,
            })
            .unwrap();

        assert_eq!(store.events_for_user(UserId::new(2)).unwrap(), vec![event.clone()]);
        assert!(store.events_for_user(UserId::new(3)).unwrap().is_empty());

        store.delete_group(group.id).unwrap();
        assert!(store.get_event(event.id).unwrap().is_none());
    }
}
