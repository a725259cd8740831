//! Permission levels and access checks.
//!
//! A user's level in a category is 3 for admins, 2 for agents assigned to
//! the category and 1 otherwise. Row visibility for list queries is
//! expressed as a `Visibility` value the grid builder turns into SQL.

use crate::config::RolePermissions;
use crate::helpdesk::models::{Role, Ticket, User};

/// Owner-only rights.
pub const LEVEL_OWNER: u8 = 1;
/// Agent of the category.
pub const LEVEL_AGENT: u8 = 2;
pub const LEVEL_ADMIN: u8 = 3;

pub fn category_level(user: &User, is_category_agent: bool) -> u8 {
    match user.role {
        Role::Admin => LEVEL_ADMIN,
        Role::Agent if is_category_agent => LEVEL_AGENT,
        _ => LEVEL_OWNER,
    }
}

/// Level used to pick the editable field set: the category level, unless
/// either the global or the category level is owner-only.
pub fn effective_level(user: &User, is_category_agent: bool) -> u8 {
    let global = user.role.level();
    let in_category = category_level(user, is_category_agent);
    if global > LEVEL_OWNER && in_category > LEVEL_OWNER {
        in_category
    } else {
        LEVEL_OWNER
    }
}

/// Which ticket rows a user may see in lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    /// Tickets in the agent's categories, plus tickets they own or are assigned.
    AgentCategories(i64),
    AssignedTo(i64),
    OwnedBy(i64),
}

impl Visibility {
    pub fn for_user(user: &User, agent_restrict: bool) -> Self {
        match user.role {
            Role::Admin => Self::All,
            Role::Agent if agent_restrict => Self::AssignedTo(user.id),
            Role::Agent => Self::AgentCategories(user.id),
            Role::User => Self::OwnedBy(user.id),
        }
    }
}

/// Whether `user` may open the ticket and its attachments.
pub fn can_view(user: &User, ticket: &Ticket, is_category_agent: bool, agent_restrict: bool) -> bool {
    match Visibility::for_user(user, agent_restrict) {
        Visibility::All => true,
        Visibility::AssignedTo(id) => ticket.agent_id == Some(id),
        Visibility::AgentCategories(id) => {
            is_category_agent || ticket.agent_id == Some(id) || ticket.user_id == id
        }
        Visibility::OwnedBy(id) => ticket.user_id == id,
    }
}

fn role_allows(
    perms: &RolePermissions,
    user: &User,
    ticket: &Ticket,
    is_category_agent: bool,
) -> bool {
    if user.is_admin() && perms.admin {
        return true;
    }
    if user.is_agent()
        && perms.agent
        && (is_category_agent || ticket.agent_id == Some(user.id))
    {
        return true;
    }
    perms.owner && ticket.user_id == user.id
}

pub fn can_close(
    perms: &RolePermissions,
    user: &User,
    ticket: &Ticket,
    is_category_agent: bool,
) -> bool {
    role_allows(perms, user, ticket, is_category_agent)
}

pub fn can_reopen(
    perms: &RolePermissions,
    user: &User,
    ticket: &Ticket,
    is_category_agent: bool,
) -> bool {
    role_allows(perms, user, ticket, is_category_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            name: format!("user {}", id),
            email: format!("u{}@example.com", id),
            role,
            department_id: None,
        }
    }

    fn ticket(owner: i64, agent: Option<i64>) -> Ticket {
        let at = NaiveDateTime::parse_from_str("2024-05-01 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Ticket {
            id: 1,
            subject: "s".into(),
            content: "c".into(),
            html: String::new(),
            intervention: String::new(),
            intervention_html: String::new(),
            status_id: 1,
            priority_id: 1,
            category_id: 1,
            user_id: owner,
            creator_id: owner,
            agent_id: agent,
            start_date: at,
            limit_date: None,
            completed_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(&user(1, Role::Admin), false), LEVEL_ADMIN);
        assert_eq!(effective_level(&user(2, Role::Agent), true), LEVEL_AGENT);
        assert_eq!(effective_level(&user(2, Role::Agent), false), LEVEL_OWNER);
        assert_eq!(effective_level(&user(3, Role::User), true), LEVEL_OWNER);
    }

    #[test]
    fn test_visibility_for_roles() {
        assert_eq!(Visibility::for_user(&user(1, Role::Admin), true), Visibility::All);
        assert_eq!(
            Visibility::for_user(&user(2, Role::Agent), true),
            Visibility::AssignedTo(2)
        );
        assert_eq!(
            Visibility::for_user(&user(2, Role::Agent), false),
            Visibility::AgentCategories(2)
        );
        assert_eq!(Visibility::for_user(&user(3, Role::User), false), Visibility::OwnedBy(3));
    }

    #[test]
    fn test_can_view() {
        let t = ticket(3, Some(2));
        assert!(can_view(&user(3, Role::User), &t, false, false));
        assert!(!can_view(&user(4, Role::User), &t, false, false));
        assert!(can_view(&user(2, Role::Agent), &t, false, true));
        assert!(can_view(&user(5, Role::Agent), &t, true, false));
        assert!(!can_view(&user(5, Role::Agent), &t, true, true));
    }

    #[test]
    fn test_close_and_reopen_matrices() {
        let close = RolePermissions {
            admin: true,
            agent: true,
            owner: true,
        };
        let reopen = RolePermissions {
            admin: true,
            agent: true,
            owner: false,
        };
        let t = ticket(3, Some(2));
        let owner = user(3, Role::User);
        assert!(can_close(&close, &owner, &t, false));
        assert!(!can_reopen(&reopen, &owner, &t, false));
        assert!(can_reopen(&reopen, &user(2, Role::Agent), &t, false));
        assert!(!can_reopen(&reopen, &user(9, Role::Agent), &t, false));
        assert!(can_reopen(&reopen, &user(1, Role::Admin), &t, false));
    }
}
