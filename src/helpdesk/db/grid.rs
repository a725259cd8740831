//! Ticket list query builder.
//!
//! `TicketScope` produces the WHERE clause shared by the grid and the
//! dashboard counts: list scope, row visibility and the user's filters.
//! `GridQuery` adds search, ordering and paging on top and selects the
//! joined, aggregated row the grid renders.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::debug;

use super::HelpdeskDb;
use crate::helpdesk::calendar::CalendarBounds;
use crate::helpdesk::dialect::{SqlDialect, split_list};
use crate::helpdesk::filters::FilterContext;
use crate::helpdesk::models::{Tag, TicketList};
use crate::helpdesk::permissions::Visibility;

pub(super) fn ts(d: NaiveDateTime) -> Value {
    Value::Text(d.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Accumulates `AND`-joined conditions with positional parameters.
#[derive(Debug, Default)]
pub(super) struct Where {
    clauses: Vec<String>,
    pub(super) params: Vec<Value>,
}

impl Where {
    pub(super) fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(values);
    }

    pub(super) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Which tickets a list view covers before search and paging.
#[derive(Debug, Clone)]
pub struct TicketScope {
    pub list: TicketList,
    pub visibility: Visibility,
    pub filters: FilterContext,
    pub default_status_id: i64,
    pub bounds: CalendarBounds,
}

impl TicketScope {
    pub(super) fn where_clause(&self) -> Where {
        let mut w = Where::default();
        match self.list {
            TicketList::Active => w.push("t.completed_at IS NULL", []),
            TicketList::Newest => {
                w.push("t.completed_at IS NULL", []);
                w.push("t.status_id = ?", [Value::Integer(self.default_status_id)]);
            }
            TicketList::Complete => w.push("t.completed_at IS NOT NULL", []),
        }

        match self.visibility {
            Visibility::All => {}
            Visibility::AssignedTo(id) => w.push("t.agent_id = ?", [Value::Integer(id)]),
            Visibility::AgentCategories(id) => w.push(
                "(t.category_id IN (SELECT category_id FROM category_agents WHERE user_id = ?)
                  OR t.agent_id = ? OR t.user_id = ?)",
                [Value::Integer(id), Value::Integer(id), Value::Integer(id)],
            ),
            Visibility::OwnedBy(id) => w.push("t.user_id = ?", [Value::Integer(id)]),
        }

        if let Some(id) = self.filters.category {
            w.push("t.category_id = ?", [Value::Integer(id)]);
        }
        if let Some(id) = self.filters.agent {
            w.push("t.agent_id = ?", [Value::Integer(id)]);
        }
        if let Some(id) = self.filters.owner {
            w.push("t.user_id = ?", [Value::Integer(id)]);
        }
        if let Some(cal) = self.filters.calendar {
            let (lower, upper) = cal.range(&self.bounds);
            if let Some(lower) = lower {
                w.push("t.limit_date >= ?", [ts(lower)]);
            }
            w.push("t.limit_date < ?", [ts(upper)]);
        }
        w
    }

    /// Same scope without the category/agent/owner narrowing, as used by
    /// the sidebar counts.
    pub fn calendar_only(&self) -> Self {
        Self {
            filters: FilterContext {
                calendar: self.filters.calendar,
                ..FilterContext::default()
            },
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Ordering by a grid column name; unknown names are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub dir: SortDir,
}

#[derive(Debug, Clone)]
pub struct GridQuery {
    pub scope: TicketScope,
    pub departments: bool,
    /// Comments at or after this instant count as recent.
    pub recent_since: NaiveDateTime,
    pub search: Option<String>,
    pub search_columns: Vec<String>,
    pub order: Vec<OrderBy>,
    pub start: usize,
    /// `None` returns every row.
    pub length: Option<usize>,
}

/// One joined grid row before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub id: i64,
    pub subject: String,
    pub content: String,
    pub intervention: String,
    pub status: String,
    pub status_color: String,
    pub priority_id: i64,
    pub priority: String,
    pub priority_color: String,
    pub priority_magnitude: i64,
    pub category_id: i64,
    pub category: String,
    pub category_color: String,
    pub user_id: i64,
    pub owner_name: String,
    pub creator_id: i64,
    pub creator_name: Option<String>,
    pub agent_id: Option<i64>,
    pub agent: Option<String>,
    pub dept: Option<String>,
    pub dept_full: Option<String>,
    pub start_date: NaiveDateTime,
    pub limit_date: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
    pub calendar_order: String,
    pub has_limit: bool,
    pub attachments_count: i64,
    pub comments_count: i64,
    pub recent_comments_count: i64,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default)]
pub struct GridPage {
    /// Rows in scope, ignoring search.
    pub total: i64,
    /// Rows in scope matching the search.
    pub filtered: i64,
    pub rows: Vec<GridRow>,
}

fn order_expr(column: &str, departments: bool) -> Option<&'static str> {
    Some(match column {
        "id" => "t.id",
        "subject" => "t.subject",
        "content" => "t.content",
        "intervention" => "t.intervention",
        "status" => "s.name",
        "agent" => "a.name",
        "priority" | "priority_magnitude" => "p.magnitude",
        "owner_name" => "u.name",
        "dept_info" if departments => "dept_full",
        "complete_date" => "t.completed_at",
        "calendar" => "calendar_order",
        "has_limit" => "has_limit",
        "limit_date" => "t.limit_date",
        "start_date" => "t.start_date",
        "updated_at" => "t.updated_at",
        "category" => "c.name",
        "tags" => "tg.tags",
        _ => return None,
    })
}

fn search_expr(column: &str, departments: bool) -> Option<&'static str> {
    Some(match column {
        "id" => "CAST(t.id AS TEXT)",
        "subject" => "t.subject",
        "content" => "t.content",
        "intervention" => "t.intervention",
        "status" => "s.name",
        "agent" => "a.name",
        "priority" => "p.name",
        "owner_name" => "u.name",
        "dept_info" if departments => "d.department",
        "category" => "c.name",
        "tags" => "tg.tags",
        _ => return None,
    })
}

fn from_clause(dialect: SqlDialect, departments: bool) -> String {
    let tag_agg = format!(
        "SELECT x.ticket_id, {} AS tags_id, {} AS tags, {} AS tags_bg_color, {} AS tags_text_color
         FROM (SELECT tt.ticket_id, g.id, g.name, g.bg_color, g.text_color
               FROM ticket_tags tt JOIN tags g ON g.id = tt.tag_id
               ORDER BY tt.ticket_id, g.name) x
         GROUP BY x.ticket_id",
        dialect.group_concat("x.id"),
        dialect.group_concat("x.name"),
        dialect.group_concat("x.bg_color"),
        dialect.group_concat("x.text_color"),
    );
    let dept_join = if departments {
        "LEFT JOIN departments d ON d.id = u.department_id"
    } else {
        ""
    };
    format!(
        "tickets t
         JOIN users u ON u.id = t.user_id
         JOIN statuses s ON s.id = t.status_id
         JOIN priorities p ON p.id = t.priority_id
         JOIN categories c ON c.id = t.category_id
         LEFT JOIN users a ON a.id = t.agent_id
         LEFT JOIN users cr ON cr.id = t.creator_id
         {}
         LEFT JOIN ({}) tg ON tg.ticket_id = t.id",
        dept_join, tag_agg
    )
}

fn parse_tags(
    ids: Option<String>,
    names: Option<String>,
    bg: Option<String>,
    text: Option<String>,
) -> Vec<Tag> {
    let ids = split_list(ids.as_deref());
    let names = split_list(names.as_deref());
    let bg = split_list(bg.as_deref());
    let text = split_list(text.as_deref());
    ids.iter()
        .enumerate()
        .filter_map(|(i, id)| {
            Some(Tag {
                id: id.parse().ok()?,
                name: names.get(i)?.to_string(),
                bg_color: bg.get(i).map(|s| s.to_string()).unwrap_or_default(),
                text_color: text.get(i).map(|s| s.to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

impl HelpdeskDb {
    pub fn grid_page(&self, q: &GridQuery) -> Result<GridPage> {
        let dialect = self.dialect;
        let from = from_clause(dialect, q.departments);
        let scope = q.scope.where_clause();

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM tickets t{}", scope.sql()),
                params_from_iter(scope.params.iter()),
                |row| row.get(0),
            )
            .context("Failed to count grid rows")?;

        let mut filtered_where = q.scope.where_clause();
        if let Some(term) = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let exprs: Vec<&str> = q
                .search_columns
                .iter()
                .filter_map(|c| search_expr(c, q.departments))
                .collect();
            if !exprs.is_empty() {
                let like = format!("%{}%", term);
                let clause = exprs
                    .iter()
                    .map(|e| format!("{} LIKE ?", e))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                filtered_where.push(
                    format!("({})", clause),
                    exprs.iter().map(|_| Value::Text(like.clone())),
                );
            }
        }

        let filtered: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}{}", from, filtered_where.sql()),
                params_from_iter(filtered_where.params.iter()),
                |row| row.get(0),
            )
            .context("Failed to count filtered grid rows")?;

        let mut order: Vec<String> = q
            .order
            .iter()
            .filter_map(|o| order_expr(&o.column, q.departments).map(|e| format!("{} {}", e, o.dir.sql())))
            .collect();
        if order.is_empty() {
            order.push("t.id DESC".to_string());
        }

        let (dept_cols, dept_full) = if q.departments {
            (
                "d.department".to_string(),
                dialect.concat_ws("' - '", "d.department", "d.sub1"),
            )
        } else {
            ("NULL".to_string(), "NULL".to_string())
        };

        let mut sql = format!(
            "SELECT t.id, t.subject, t.content, t.intervention,
                    s.name, s.color, p.id, p.name, p.color, p.magnitude,
                    c.id, c.name, c.color,
                    t.user_id, u.name, t.creator_id, cr.name, t.agent_id, a.name,
                    {} AS dept, {} AS dept_full,
                    t.start_date, t.limit_date, t.completed_at, t.updated_at,
                    {} AS calendar_order,
                    CASE WHEN t.limit_date IS NULL THEN 0 ELSE 1 END AS has_limit,
                    (SELECT COUNT(*) FROM attachments at WHERE at.ticket_id = t.id) AS attachments_count,
                    (SELECT COUNT(*) FROM comments cm WHERE cm.ticket_id = t.id) AS comments_count,
                    (SELECT COUNT(*) FROM comments cm WHERE cm.ticket_id = t.id AND cm.created_at >= ?)
                        AS recent_comments_count,
                    tg.tags_id, tg.tags, tg.tags_bg_color, tg.tags_text_color
             FROM {}{}
             ORDER BY {}",
            dept_cols,
            dept_full,
            dialect.calendar_order("t.limit_date", "t.start_date"),
            from,
            filtered_where.sql(),
            order.join(", "),
        );

        let mut params = vec![ts(q.recent_since)];
        params.extend(filtered_where.params.iter().cloned());
        if let Some(length) = q.length {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(length as i64));
            params.push(Value::Integer(q.start as i64));
        }
        debug!(list = %q.scope.list, total, filtered, "grid query");

        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare grid query")?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let tags = parse_tags(row.get(30)?, row.get(31)?, row.get(32)?, row.get(33)?);
                Ok(GridRow {
                    id: row.get(0)?,
                    subject: row.get(1)?,
                    content: row.get(2)?,
                    intervention: row.get(3)?,
                    status: row.get(4)?,
                    status_color: row.get(5)?,
                    priority_id: row.get(6)?,
                    priority: row.get(7)?,
                    priority_color: row.get(8)?,
                    priority_magnitude: row.get(9)?,
                    category_id: row.get(10)?,
                    category: row.get(11)?,
                    category_color: row.get(12)?,
                    user_id: row.get(13)?,
                    owner_name: row.get(14)?,
                    creator_id: row.get(15)?,
                    creator_name: row.get(16)?,
                    agent_id: row.get(17)?,
                    agent: row.get(18)?,
                    dept: row.get(19)?,
                    dept_full: row.get(20)?,
                    start_date: row.get(21)?,
                    limit_date: row.get(22)?,
                    completed_at: row.get(23)?,
                    updated_at: row.get(24)?,
                    calendar_order: row.get(25)?,
                    has_limit: row.get::<_, i64>(26)? == 1,
                    attachments_count: row.get(27)?,
                    comments_count: row.get(28)?,
                    recent_comments_count: row.get(29)?,
                    tags,
                })
            })
            .context("Failed to run grid query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read grid row")?);
        }
        Ok(GridPage {
            total,
            filtered,
            rows: out,
        })
    }
}
