//! Store trait definitions

use alior_api::{Event, EventStatus, Group, GroupView, Membership, MembershipRemoval, NewEvent, User};
use alior_util::{EventId, GroupId, UserId};

use crate::StoreResult;

/// Main store trait
pub trait Store: Send + Sync {
    // Users

    /// Register a user or refresh their username
    fn upsert_user(&self, id: UserId, user_name: &str) -> StoreResult<User>;

    /// Get a user by chat identity
    fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Resolve usernames (with or without `@`, any case) to registered users.
    /// Unknown names are skipped.
    fn find_users_by_name(&self, names: &[String]) -> StoreResult<Vec<User>>;

    // Groups and memberships

    /// Create a group with `admin` as its administrator and `members` as plain members
    fn create_group(&self, name: &str, admin: UserId, members: &[UserId]) -> StoreResult<Group>;

    /// Get a group by ID
    fn get_group(&self, id: GroupId) -> StoreResult<Option<Group>>;

    /// Groups the user belongs to, ordered by name
    fn groups_for_user(&self, user: UserId) -> StoreResult<Vec<GroupView>>;

    /// Memberships of a group in join order
    fn memberships(&self, group: GroupId) -> StoreResult<Vec<Membership>>;

    /// Whether the user administers the group
    fn is_admin(&self, group: GroupId, user: UserId) -> StoreResult<bool>;

    /// Remove a user from a group, keeping the admin invariant
    fn remove_membership(&self, group: GroupId, user: UserId) -> StoreResult<MembershipRemoval>;

    /// Delete a group with its memberships and events
    fn delete_group(&self, id: GroupId) -> StoreResult<()>;

    // Events

    /// Persist a new event
    fn create_event(&self, event: NewEvent) -> StoreResult<Event>;

    /// Get an event by ID
    fn get_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// Events of every group the user belongs to, ordered by start
    fn events_for_user(&self, user: UserId) -> StoreResult<Vec<Event>>;

    /// Every stored event
    fn list_events(&self) -> StoreResult<Vec<Event>>;

    /// Overwrite the cached status of an event
    fn set_event_status(&self, id: EventId, status: EventStatus) -> StoreResult<()>;

    /// Delete an event
    fn delete_event(&self, id: EventId) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
