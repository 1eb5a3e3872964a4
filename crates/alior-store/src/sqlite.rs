//! SQLite-based store implementation

use alior_api::{
    Category, Event, EventStatus, Group, GroupView, Membership, MembershipRemoval, NewEvent, User,
};
use alior_util::{EventId, GroupId, UserId};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{normalize_user_name, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS todo_user (
                id_user INTEGER PRIMARY KEY,
                user_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS todo_group (
                id_group INTEGER PRIMARY KEY AUTOINCREMENT,
                group_name TEXT NOT NULL
            );

            -- rowid order doubles as join order for admin hand-over
            CREATE TABLE IF NOT EXISTS todo_membership (
                id_group INTEGER NOT NULL REFERENCES todo_group(id_group) ON DELETE CASCADE,
                id_user INTEGER NOT NULL REFERENCES todo_user(id_user) ON DELETE CASCADE,
                is_admin INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (id_group, id_user)
            );

            CREATE TABLE IF NOT EXISTS todo_event (
                id_event INTEGER PRIMARY KEY AUTOINCREMENT,
                id_group INTEGER NOT NULL REFERENCES todo_group(id_group) ON DELETE CASCADE,
                category TEXT NOT NULL,
                name_event TEXT NOT NULL,
                datetime_start TEXT NOT NULL,
                duration_secs INTEGER NOT NULL DEFAULT 0,
                is_all_day INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_membership_user ON todo_membership(id_user);
            CREATE INDEX IF NOT EXISTS idx_event_group ON todo_event(id_group);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

const EVENT_COLUMNS: &str = "e.id_event, e.id_group, e.category, e.name_event, e.datetime_start, \
                             e.duration_secs, e.is_all_day, e.status";

struct EventRow {
    id: i64,
    group_id: i64,
    category: String,
    name: String,
    start: String,
    duration_secs: i64,
    all_day: bool,
    status: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            category: row.get(2)?,
            name: row.get(3)?,
            start: row.get(4)?,
            duration_secs: row.get(5)?,
            all_day: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_event(self) -> StoreResult<Event> {
        let start = DateTime::parse_from_rfc3339(&self.start)
            .map(|dt| dt.with_timezone(&Local))
            .map_err(|e| StoreError::Corrupt(format!("event {} start: {}", self.id, e)))?;
        let category: Category = self
            .category
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("event {} category: {}", self.id, e)))?;
        let status: EventStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("event {} status: {}", self.id, e)))?;

        Ok(Event {
            id: EventId::new(self.id),
            group_id: GroupId::new(self.group_id),
            category,
            name: self.name,
            start,
            duration: Duration::from_secs(self.duration_secs.max(0) as u64),
            all_day: self.all_day,
            status,
        })
    }
}

fn collect_events(rows: Vec<EventRow>) -> StoreResult<Vec<Event>> {
    let mut events = rows
        .into_iter()
        .map(EventRow::into_event)
        .collect::<StoreResult<Vec<_>>>()?;
    events.sort_by_key(|e| (e.start, e.id));
    Ok(events)
}

fn group_exists(conn: &Connection, id: GroupId) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id_group FROM todo_group WHERE id_group = ?",
            [id.as_i64()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Store for SqliteStore {
    fn upsert_user(&self, id: UserId, user_name: &str) -> StoreResult<User> {
        let conn = self.conn()?;
        let user_name = user_name.trim().trim_start_matches('@').to_string();

        conn.execute(
            r#"
            INSERT INTO todo_user (id_user, user_name)
            VALUES (?, ?)
            ON CONFLICT(id_user)
            DO UPDATE SET user_name = excluded.user_name
            "#,
            params![id.as_i64(), user_name],
        )?;

        debug!(user_id = %id, user_name = %user_name, "User upserted");
        Ok(User { id, user_name })
    }

    fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let conn = self.conn()?;

        let name: Option<String> = conn
            .query_row(
                "SELECT user_name FROM todo_user WHERE id_user = ?",
                [id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(name.map(|user_name| User { id, user_name }))
    }

    fn find_users_by_name(&self, names: &[String]) -> StoreResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id_user, user_name FROM todo_user WHERE lower(user_name) = ?")?;

        let mut users: Vec<User> = Vec::new();
        for name in names {
            let wanted = normalize_user_name(name);
            if wanted.is_empty() {
                continue;
            }
            let found = stmt
                .query_row([&wanted], |row| {
                    Ok(User {
                        id: UserId::new(row.get(0)?),
                        user_name: row.get(1)?,
                    })
                })
                .optional()?;
            if let Some(user) = found
                && !users.iter().any(|u| u.id == user.id)
            {
                users.push(user);
            }
        }

        Ok(users)
    }

    fn create_group(&self, name: &str, admin: UserId, members: &[UserId]) -> StoreResult<Group> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let admin_known: Option<i64> = tx
            .query_row(
                "SELECT id_user FROM todo_user WHERE id_user = ?",
                [admin.as_i64()],
                |row| row.get(0),
            )
            .optional()?;
        if admin_known.is_none() {
            return Err(StoreError::NotFound(format!("user {}", admin)));
        }

        tx.execute("INSERT INTO todo_group (group_name) VALUES (?)", [name])?;
        let group_id = GroupId::new(tx.last_insert_rowid());

        tx.execute(
            "INSERT INTO todo_membership (id_group, id_user, is_admin) VALUES (?, ?, 1)",
            params![group_id.as_i64(), admin.as_i64()],
        )?;
        for member in members.iter().filter(|m| **m != admin) {
            tx.execute(
                "INSERT OR IGNORE INTO todo_membership (id_group, id_user, is_admin) VALUES (?, ?, 0)",
                params![group_id.as_i64(), member.as_i64()],
            )?;
        }

        tx.commit()?;

        info!(group_id = %group_id, admin = %admin, members = members.len(), "Group created");
        Ok(Group {
            id: group_id,
            name: name.to_string(),
        })
    }

    fn get_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        let conn = self.conn()?;

        let name: Option<String> = conn
            .query_row(
                "SELECT group_name FROM todo_group WHERE id_group = ?",
                [id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(name.map(|name| Group { id, name }))
    }

    fn groups_for_user(&self, user: UserId) -> StoreResult<Vec<GroupView>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT g.id_group, g.group_name, m.is_admin,
                   (SELECT COUNT(*) FROM todo_membership c WHERE c.id_group = g.id_group)
            FROM todo_group g
            JOIN todo_membership m ON m.id_group = g.id_group
            WHERE m.id_user = ?
            ORDER BY g.group_name, g.id_group
            "#,
        )?;

        let rows = stmt.query_map([user.as_i64()], |row| {
            let count: i64 = row.get(3)?;
            Ok(GroupView {
                group: Group {
                    id: GroupId::new(row.get(0)?),
                    name: row.get(1)?,
                },
                is_admin: row.get(2)?,
                member_count: count.max(0) as usize,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn memberships(&self, group: GroupId) -> StoreResult<Vec<Membership>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id_user, is_admin FROM todo_membership WHERE id_group = ? ORDER BY rowid",
        )?;
        let rows = stmt.query_map([group.as_i64()], |row| {
            Ok(Membership {
                group_id: group,
                user_id: UserId::new(row.get(0)?),
                is_admin: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn is_admin(&self, group: GroupId, user: UserId) -> StoreResult<bool> {
        let conn = self.conn()?;

        let admin: Option<bool> = conn
            .query_row(
                "SELECT is_admin FROM todo_membership WHERE id_group = ? AND id_user = ?",
                params![group.as_i64(), user.as_i64()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(admin.unwrap_or(false))
    }

    fn remove_membership(&self, group: GroupId, user: UserId) -> StoreResult<MembershipRemoval> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM todo_membership WHERE id_group = ? AND id_user = ?",
            params![group.as_i64(), user.as_i64()],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!(
                "membership of user {} in group {}",
                user, group
            )));
        }

        let (remaining, admins): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_admin), 0) FROM todo_membership WHERE id_group = ?",
            [group.as_i64()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let outcome = if remaining == 0 {
            tx.execute("DELETE FROM todo_group WHERE id_group = ?", [group.as_i64()])?;
            MembershipRemoval::GroupDeleted
        } else if admins == 0 {
            let successor: i64 = tx.query_row(
                "SELECT id_user FROM todo_membership WHERE id_group = ? ORDER BY rowid LIMIT 1",
                [group.as_i64()],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE todo_membership SET is_admin = 1 WHERE id_group = ? AND id_user = ?",
                params![group.as_i64(), successor],
            )?;
            MembershipRemoval::AdminTransferred {
                new_admin: UserId::new(successor),
            }
        } else {
            MembershipRemoval::Removed
        };

        tx.commit()?;

        info!(group_id = %group, user_id = %user, outcome = ?outcome, "Membership removed");
        Ok(outcome)
    }

    fn delete_group(&self, id: GroupId) -> StoreResult<()> {
        let conn = self.conn()?;

        let deleted = conn.execute("DELETE FROM todo_group WHERE id_group = ?", [id.as_i64()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("group {}", id)));
        }

        info!(group_id = %id, "Group deleted");
        Ok(())
    }

    fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let conn = self.conn()?;

        if !group_exists(&conn, event.group_id)? {
            return Err(StoreError::NotFound(format!("group {}", event.group_id)));
        }

        conn.execute(
            r#"
            INSERT INTO todo_event
                (id_group, category, name_event, datetime_start, duration_secs, is_all_day, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                event.group_id.as_i64(),
                event.category.as_str(),
                event.name,
                event.start.to_rfc3339(),
                event.duration.as_secs().min(i64::MAX as u64) as i64,
                event.all_day,
                event.status.as_str(),
            ],
        )?;
        let id = EventId::new(conn.last_insert_rowid());

        info!(event_id = %id, group_id = %event.group_id, "Event created");
        Ok(Event {
            id,
            group_id: event.group_id,
            category: event.category,
            name: event.name,
            start: event.start,
            duration: event.duration,
            all_day: event.all_day,
            status: event.status,
        })
    }

    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM todo_event e WHERE e.id_event = ?", EVENT_COLUMNS),
                [id.as_i64()],
                EventRow::from_row,
            )
            .optional()?;

        row.map(EventRow::into_event).transpose()
    }

    fn events_for_user(&self, user: UserId) -> StoreResult<Vec<Event>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM todo_event e
            JOIN todo_membership m ON m.id_group = e.id_group
            WHERE m.id_user = ?
            "#,
            EVENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([user.as_i64()], EventRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        collect_events(rows)
    }

    fn list_events(&self) -> StoreResult<Vec<Event>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!("SELECT {} FROM todo_event e", EVENT_COLUMNS))?;
        let rows = stmt
            .query_map([], EventRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        collect_events(rows)
    }

    fn set_event_status(&self, id: EventId, status: EventStatus) -> StoreResult<()> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE todo_event SET status = ? WHERE id_event = ?",
            params![status.as_str(), id.as_i64()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("event {}", id)));
        }

        debug!(event_id = %id, status = status.as_str(), "Event status updated");
        Ok(())
    }

    fn delete_event(&self, id: EventId) -> StoreResult<()> {
        let conn = self.conn()?;

        let deleted = conn.execute("DELETE FROM todo_event WHERE id_event = ?", [id.as_i64()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("event {}", id)));
        }

        info!(event_id = %id, "Event deleted");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store_with_users() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_user(UserId::new(1), "alice").unwrap();
        store.upsert_user(UserId::new(2), "@Bob").unwrap();
        store.upsert_user(UserId::new(3), "carol").unwrap();
        store
    }

    fn new_event(group_id: GroupId, name: &str) -> NewEvent {
        NewEvent {
            group_id,
            category: Category::Personal,
            name: name.into(),
            start: Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap(),
            duration: Duration::from_secs(3600),
            all_day: false,
            status: EventStatus::Scheduled,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_users() {
        let store = store_with_users();

        let bob = store.get_user(UserId::new(2)).unwrap().unwrap();
        assert_eq!(bob.user_name, "Bob");
        assert!(store.get_user(UserId::new(99)).unwrap().is_none());

        // Renaming keeps the identity
        store.upsert_user(UserId::new(2), "robert").unwrap();
        assert_eq!(store.get_user(UserId::new(2)).unwrap().unwrap().user_name, "robert");

        let found = store
            .find_users_by_name(&["@ALICE".into(), "robert".into(), "nobody".into(), "alice".into()])
            .unwrap();
        let ids: Vec<_> = found.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![UserId::new(1), UserId::new(2)]);
    }

    #[test]
    fn test_create_group_marks_creator_admin() {
        let store = store_with_users();
        let group = store
            .create_group("Family", UserId::new(1), &[UserId::new(2), UserId::new(1)])
            .unwrap();

        let members = store.memberships(group.id).unwrap();
        assert_eq!(members.len(), 2);
        assert!(members[0].is_admin);
        assert_eq!(members[0].user_id, UserId::new(1));
        assert!(!members[1].is_admin);

        assert!(store.is_admin(group.id, UserId::new(1)).unwrap());
        assert!(!store.is_admin(group.id, UserId::new(2)).unwrap());
        assert!(!store.is_admin(group.id, UserId::new(3)).unwrap());

        let views = store.groups_for_user(UserId::new(2)).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].member_count, 2);
        assert!(!views[0].is_admin);
    }

    #[test]
    fn test_create_group_requires_registered_admin() {
        let store = store_with_users();
        let result = store.create_group("Ghosts", UserId::new(404), &[]);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_last_membership_removes_group() {
        let store = store_with_users();
        let group = store.create_group("Solo", UserId::new(1), &[]).unwrap();
        store.create_event(new_event(group.id, "Gym")).unwrap();

        let outcome = store.remove_membership(group.id, UserId::new(1)).unwrap();
        assert_eq!(outcome, MembershipRemoval::GroupDeleted);
        assert!(store.get_group(group.id).unwrap().is_none());
        assert!(store.list_events().unwrap().is_empty());
    }

    #[test]
    fn test_admin_leaving_promotes_earliest_member() {
        let store = store_with_users();
        let group = store
            .create_group("Team", UserId::new(1), &[UserId::new(3), UserId::new(2)])
            .unwrap();

        let outcome = store.remove_membership(group.id, UserId::new(1)).unwrap();
        assert_eq!(
            outcome,
            MembershipRemoval::AdminTransferred {
                new_admin: UserId::new(3)
            }
        );
        assert!(store.is_admin(group.id, UserId::new(3)).unwrap());

        let outcome = store.remove_membership(group.id, UserId::new(2)).unwrap();
        assert_eq!(outcome, MembershipRemoval::Removed);

        assert!(matches!(
            store.remove_membership(group.id, UserId::new(2)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_events() {
        let store = store_with_users();
        let group = store.create_group("Team", UserId::new(1), &[UserId::new(2)]).unwrap();
        let other = store.create_group("Other", UserId::new(3), &[]).unwrap();

        let mut late = new_event(group.id, "Late");
        late.start = Local.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap();
        let late = store.create_event(late).unwrap();
        let early = store.create_event(new_event(group.id, "Early")).unwrap();
        store.create_event(new_event(other.id, "Elsewhere")).unwrap();

        let events = store.events_for_user(UserId::new(2)).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Late"]);

        let loaded = store.get_event(late.id).unwrap().unwrap();
        assert_eq!(loaded, late);

        store.set_event_status(early.id, EventStatus::Completed).unwrap();
        assert_eq!(
            store.get_event(early.id).unwrap().unwrap().status,
            EventStatus::Completed
        );

        store.delete_event(early.id).unwrap();
        assert!(store.get_event(early.id).unwrap().is_none());
        assert!(matches!(store.delete_event(early.id), Err(StoreError::NotFound(_))));
        assert_eq!(store.list_events().unwrap().len(), 2);
    }

    #[test]
    fn test_create_event_for_missing_group() {
        let store = store_with_users();
        let result = store.create_event(new_event(GroupId::new(77), "Nowhere"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_group_cascades() {
        let store = store_with_users();
        let group = store.create_group("Team", UserId::new(1), &[UserId::new(2)]).unwrap();
        store.create_event(new_event(group.id, "Standup")).unwrap();

        store.delete_group(group.id).unwrap();
        assert!(store.groups_for_user(UserId::new(2)).unwrap().is_empty());
        assert!(store.memberships(group.id).unwrap().is_empty());
        assert!(store.list_events().unwrap().is_empty());
        assert!(matches!(store.delete_group(group.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alior.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert_user(UserId::new(1), "alice").unwrap();
            store.create_group("Persisted", UserId::new(1), &[]).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let groups = store.groups_for_user(UserId::new(1)).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group.name, "Persisted");
    }
}
