use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::HelpdeskDb;
use crate::helpdesk::models::*;

const USER_COLUMNS: &str = "u.id, u.name, u.email, u.role, u.department_id";

/// Input for `create_user`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

impl NewUser {
    pub fn new(name: &str, email: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            role,
            department_id: None,
        }
    }
}

impl HelpdeskDb {
    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (name, email, role, department_id) VALUES (?1, ?2, ?3, ?4)",
                params![user.name, user.email, user.role.as_str(), user.department_id],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
        Ok(self.query_users(&sql, params![id])?.into_iter().next())
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users u ORDER BY u.name", USER_COLUMNS);
        self.query_users(&sql, [])
    }

    /// Users a level-1 requester may open tickets for: everyone without a
    /// department, plus themselves.
    pub fn list_owner_candidates(&self, user_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users u WHERE u.department_id IS NULL OR u.id = ?1 ORDER BY u.name",
            USER_COLUMNS
        );
        self.query_users(&sql, params![user_id])
    }

    pub fn set_user_department(&self, user_id: i64, department_id: Option<i64>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET department_id = ?1 WHERE id = ?2",
                params![department_id, user_id],
            )
            .context("Failed to update user department")?;
        Ok(())
    }

    fn query_users<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare user query")?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    role: row.get(3)?,
                    department_id: row.get(4)?,
                })
            })
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            let r = row.context("Failed to read user row")?;
            users.push(r.into_user()?);
        }
        Ok(users)
    }

    // ── Departments ───────────────────────────────────────────────────

    pub fn create_department(&self, department: &str, sub1: Option<&str>) -> Result<Department> {
        self.conn
            .execute(
                "INSERT INTO departments (department, sub1) VALUES (?1, ?2)",
                params![department, sub1],
            )
            .context("Failed to insert department")?;
        let id = self.conn.last_insert_rowid();
        self.get_department(id)?
            .context("Department not found after insert")
    }

    pub fn get_department(&self, id: i64) -> Result<Option<Department>> {
        self.conn
            .query_row(
                "SELECT id, department, sub1 FROM departments WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Department {
                        id: row.get(0)?,
                        department: row.get(1)?,
                        sub1: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query department")
    }

    // ── Categories ────────────────────────────────────────────────────

    pub fn create_category(&self, name: &str, color: &str) -> Result<Category> {
        self.conn
            .execute(
                "INSERT INTO categories (name, color) VALUES (?1, ?2)",
                params![name, color],
            )
            .context("Failed to insert category")?;
        let id = self.conn.last_insert_rowid();
        self.get_category(id)?
            .context("Category not found after insert")
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, name, color FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query category")
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM categories ORDER BY name")
            .context("Failed to prepare list_categories")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })
            .context("Failed to query categories")?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row.context("Failed to read category row")?);
        }
        Ok(categories)
    }

    pub fn add_category_agent(&self, category_id: i64, user_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO category_agents (category_id, user_id) VALUES (?1, ?2)",
                params![category_id, user_id],
            )
            .context("Failed to assign agent to category")?;
        Ok(())
    }

    pub fn category_agents(&self, category_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users u
             JOIN category_agents ca ON ca.user_id = u.id
             WHERE ca.category_id = ?1 ORDER BY u.name",
            USER_COLUMNS
        );
        self.query_users(&sql, params![category_id])
    }

    /// Every category with its agents, ordered by category name.
    pub fn categories_with_agents(&self) -> Result<Vec<CategoryAgents>> {
        let mut out = Vec::new();
        for category in self.list_categories()? {
            let agents = self.category_agents(category.id)?;
            out.push(CategoryAgents { category, agents });
        }
        Ok(out)
    }

    /// Ids of the categories a user is an agent of.
    pub fn agent_category_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category_id FROM category_agents WHERE user_id = ?1 ORDER BY category_id")
            .context("Failed to prepare agent_category_ids")?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get(0))
            .context("Failed to query agent categories")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read agent category row")?);
        }
        Ok(ids)
    }

    pub fn is_category_agent(&self, category_id: i64, user_id: i64) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM category_agents WHERE category_id = ?1 AND user_id = ?2",
                params![category_id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check category agent")?;
        Ok(count > 0)
    }

    /// Users assigned to at least one category, or to `category_id` when given.
    pub fn list_agents(&self, category_id: Option<i64>) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM users u
             JOIN category_agents ca ON ca.user_id = u.id
             WHERE ?1 IS NULL OR ca.category_id = ?1
             ORDER BY u.name",
            USER_COLUMNS
        );
        self.query_users(&sql, params![category_id])
    }

    // ── Statuses & priorities ─────────────────────────────────────────

    pub fn create_status(&self, name: &str, color: &str) -> Result<Status> {
        self.conn
            .execute(
                "INSERT INTO statuses (name, color) VALUES (?1, ?2)",
                params![name, color],
            )
            .context("Failed to insert status")?;
        let id = self.conn.last_insert_rowid();
        self.get_status(id)?.context("Status not found after insert")
    }

    pub fn get_status(&self, id: i64) -> Result<Option<Status>> {
        self.conn
            .query_row(
                "SELECT id, name, color FROM statuses WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Status {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query status")
    }

    pub fn list_statuses(&self) -> Result<Vec<Status>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM statuses ORDER BY id")
            .context("Failed to prepare list_statuses")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Status {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })
            .context("Failed to query statuses")?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row.context("Failed to read status row")?);
        }
        Ok(statuses)
    }

    pub fn create_priority(&self, name: &str, color: &str, magnitude: i64) -> Result<Priority> {
        self.conn
            .execute(
                "INSERT INTO priorities (name, color, magnitude) VALUES (?1, ?2, ?3)",
                params![name, color, magnitude],
            )
            .context("Failed to insert priority")?;
        let id = self.conn.last_insert_rowid();
        self.get_priority(id)?
            .context("Priority not found after insert")
    }

    pub fn get_priority(&self, id: i64) -> Result<Option<Priority>> {
        self.conn
            .query_row(
                "SELECT id, name, color, magnitude FROM priorities WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Priority {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                        magnitude: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query priority")
    }

    /// All priorities, highest magnitude first.
    pub fn list_priorities(&self) -> Result<Vec<Priority>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color, magnitude FROM priorities ORDER BY magnitude DESC, id")
            .context("Failed to prepare list_priorities")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Priority {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                    magnitude: row.get(3)?,
                })
            })
            .context("Failed to query priorities")?;
        let mut priorities = Vec::new();
        for row in rows {
            priorities.push(row.context("Failed to read priority row")?);
        }
        Ok(priorities)
    }

    /// Priority given to tickets created by level-1 users.
    pub fn first_priority_id(&self) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT MIN(id) FROM priorities", [], |row| row.get(0))
            .context("Failed to query first priority")
    }

    // ── Closing reasons ───────────────────────────────────────────────

    pub fn create_closing_reason(
        &self,
        category_id: i64,
        text: &str,
        status_id: i64,
        ordering: i64,
    ) -> Result<ClosingReason> {
        self.conn
            .execute(
                "INSERT INTO closing_reasons (category_id, text, status_id, ordering) VALUES (?1, ?2, ?3, ?4)",
                params![category_id, text, status_id, ordering],
            )
            .context("Failed to insert closing reason")?;
        let id = self.conn.last_insert_rowid();
        self.get_closing_reason(id)?
            .context("Closing reason not found after insert")
    }

    pub fn get_closing_reason(&self, id: i64) -> Result<Option<ClosingReason>> {
        self.conn
            .query_row(
                "SELECT id, category_id, text, status_id, ordering FROM closing_reasons WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ClosingReason {
                        id: row.get(0)?,
                        category_id: row.get(1)?,
                        text: row.get(2)?,
                        status_id: row.get(3)?,
                        ordering: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query closing reason")
    }

    pub fn closing_reasons(&self, category_id: i64) -> Result<Vec<ClosingReason>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, category_id, text, status_id, ordering FROM closing_reasons
                 WHERE category_id = ?1 ORDER BY ordering, id",
            )
            .context("Failed to prepare closing_reasons")?;
        let rows = stmt
            .query_map(params![category_id], |row| {
                Ok(ClosingReason {
                    id: row.get(0)?,
                    category_id: row.get(1)?,
                    text: row.get(2)?,
                    status_id: row.get(3)?,
                    ordering: row.get(4)?,
                })
            })
            .context("Failed to query closing reasons")?;
        let mut reasons = Vec::new();
        for row in rows {
            reasons.push(row.context("Failed to read closing reason row")?);
        }
        Ok(reasons)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    department_id: Option<i64>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse user role")?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            department_id: self.department_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::fixture;
    use super::*;

    #[test]
    fn test_create_and_get_user() -> Result<()> {
        let f = fixture();
        let fetched = f.db.get_user(f.agent.id)?.expect("agent should exist");
        assert_eq!(fetched.name, "Ann Agent");
        assert_eq!(fetched.role, Role::Agent);
        assert!(f.db.get_user(999)?.is_none());
        Ok(())
    }

    #[test]
    fn test_owner_candidates_exclude_department_members() -> Result<()> {
        let f = fixture();
        let dept = f.db.create_department("IT", Some("Networks"))?;
        f.db.set_user_department(f.other.id, Some(dept.id))?;

        let candidates = f.db.list_owner_candidates(f.owner.id)?;
        assert!(candidates.iter().any(|u| u.id == f.owner.id));
        assert!(!candidates.iter().any(|u| u.id == f.other.id));

        let own = f.db.list_owner_candidates(f.other.id)?;
        assert!(own.iter().any(|u| u.id == f.other.id));
        Ok(())
    }

    #[test]
    fn test_category_agents() -> Result<()> {
        let f = fixture();
        let agents = f.db.category_agents(f.category.id)?;
        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Administrator", "Ann Agent"]);
        assert!(f.db.is_category_agent(f.category.id, f.agent.id)?);
        assert!(!f.db.is_category_agent(f.second_category.id, f.agent.id)?);
        assert_eq!(f.db.agent_category_ids(f.agent.id)?, vec![f.category.id]);
        Ok(())
    }

    #[test]
    fn test_list_agents_scoped_by_category() -> Result<()> {
        let f = fixture();
        assert_eq!(f.db.list_agents(None)?.len(), 2);
        assert!(f.db.list_agents(Some(f.second_category.id))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_priorities_ordered_by_magnitude_desc() -> Result<()> {
        let f = fixture();
        f.db.create_priority("Urgent", "#ff00ff", 10)?;
        let priorities = f.db.list_priorities()?;
        assert_eq!(priorities[0].name, "Urgent");
        assert_eq!(priorities.last().unwrap().name, "Low");
        assert_eq!(f.db.first_priority_id()?, Some(1));
        Ok(())
    }

    #[test]
    fn test_closing_reasons_ordered() -> Result<()> {
        let f = fixture();
        f.db.create_closing_reason(f.category.id, "Duplicate", 3, 2)?;
        f.db.create_closing_reason(f.category.id, "Fixed", 3, 1)?;
        let reasons = f.db.closing_reasons(f.category.id)?;
        assert_eq!(reasons[0].text, "Fixed");
        assert!(f.db.closing_reasons(f.second_category.id)?.is_empty());
        Ok(())
    }
}
