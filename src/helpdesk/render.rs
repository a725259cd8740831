//! HTML fragments for grid rows.
//!
//! The grid widget receives one JSON object per row whose values are
//! ready-to-insert markup keyed by column name. Everything user-supplied
//! goes through `escape_html`; a missing agent, creator, department or tag
//! list renders as an empty fragment.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::helpdesk::calendar::{CalendarBounds, DueState, Relative};
use crate::helpdesk::db::GridRow;
use crate::helpdesk::lang::Translator;
use crate::helpdesk::models::{CategoryAgents, Priority, User};
use crate::helpdesk::purify::escape_html;

/// More agents than this switch the agent control to a modal.
const MODAL_AGENT_THRESHOLD: usize = 4;

pub struct GridRenderer<'a> {
    pub tr: &'a Translator,
    pub bounds: CalendarBounds,
    pub datetime_format: &'a str,
    /// Content is shown under the subject instead of in its own column.
    pub subject_content_column: bool,
    pub departments: bool,
    /// Whether the viewer gets the agent and priority quick-change controls.
    pub quick_change: bool,
    agents: HashMap<i64, &'a [User]>,
    /// Ordered by magnitude, highest first.
    priorities: &'a [Priority],
}

impl<'a> GridRenderer<'a> {
    pub fn new(
        tr: &'a Translator,
        bounds: CalendarBounds,
        datetime_format: &'a str,
        categories: &'a [CategoryAgents],
        priorities: &'a [Priority],
    ) -> Self {
        Self {
            tr,
            bounds,
            datetime_format,
            subject_content_column: true,
            departments: false,
            quick_change: false,
            agents: categories
                .iter()
                .map(|c| (c.category.id, c.agents.as_slice()))
                .collect(),
            priorities,
        }
    }

    pub fn render_row(&self, row: &GridRow) -> Map<String, Value> {
        let mut out = Map::new();
        let mut put = |key: &str, html: String| {
            out.insert(key.to_string(), Value::String(html));
        };

        put("id", row.id.to_string());
        put("subject", self.subject(row));
        if !self.subject_content_column {
            put("content", escape_html(&row.content));
        }
        put("intervention", self.intervention(row));
        put("status", color_div(&row.status_color, &row.status));
        put("agent", self.agent(row));
        put("priority", self.priority(row));
        put("owner_name", self.owner(row));
        if self.departments {
            put("dept_info", self.department(row));
        }
        put("calendar", self.calendar(row));
        put("updated_at", self.updated_at(row));
        put("category", color_div(&row.category_color, &row.category));
        put("tags", tag_pills(row));
        put(
            "complete_date",
            row.completed_at
                .map(|d| d.format(self.datetime_format).to_string())
                .unwrap_or_default(),
        );
        out
    }

    fn subject(&self, row: &GridRow) -> String {
        let mut html = format!(
            "<a href=\"/tickets/{}\" class=\"ticket-subject\">{}</a>",
            row.id,
            escape_html(&row.subject)
        );
        if self.subject_content_column && !row.content.is_empty() {
            html.push_str(&format!(
                "<div class=\"ticket-content\">{}</div>",
                escape_html(&row.content)
            ));
        }
        if row.attachments_count > 0 {
            let count = row.attachments_count.to_string();
            html.push_str(&format!(
                " <span class=\"badge badge-attachments\" title=\"{}\">{}</span>",
                escape_html(&self.tr.t_with("grid.attachments", &[("count", &count)])),
                count
            ));
        }
        html
    }

    fn intervention(&self, row: &GridRow) -> String {
        let mut html = escape_html(&row.intervention);
        if row.comments_count > 0 {
            let total = row.comments_count.to_string();
            let recent = row.recent_comments_count.to_string();
            let class = if row.recent_comments_count > 0 {
                "badge badge-comments badge-recent"
            } else {
                "badge badge-comments"
            };
            html.push_str(&format!(
                " <span class=\"{}\" title=\"{}\">{}</span>",
                class,
                escape_html(
                    &self
                        .tr
                        .t_with("grid.comments", &[("total", &total), ("recent", &recent)])
                ),
                total
            ));
        }
        html
    }

    fn updated_at(&self, row: &GridRow) -> String {
        let relative = Relative::between(row.updated_at, self.bounds.now);
        let title = format!(
            "{} ({})",
            row.updated_at.format(self.datetime_format),
            self.tr
                .t_with("grid.updated", &[("relative", &self.tr.relative(&relative))])
        );
        format!(
            "<span class=\"tooltip-info\" title=\"{}\">{}</span>",
            escape_html(&title),
            relative.abbr()
        )
    }

    fn agent(&self, row: &GridRow) -> String {
        let name = escape_html(row.agent.as_deref().unwrap_or_default());
        if !self.quick_change {
            return name;
        }
        let agents = self.agents.get(&row.category_id).copied().unwrap_or(&[]);
        let title = escape_html(&self.tr.t("grid.change_agent"));

        if agents.len() > MODAL_AGENT_THRESHOLD {
            return format!(
                "<button type=\"button\" class=\"btn-link\" data-toggle=\"modal\" \
                 data-target=\"#agent-modal-{}\" data-ticket-id=\"{}\" title=\"{}\">{}</button>",
                row.category_id, row.id, title, name
            );
        }
        if agents.len() == 1 {
            return format!("<span class=\"tooltip-info\" title=\"{}\">{}</span>", title, name);
        }

        let options: String = agents
            .iter()
            .map(|a| {
                radio(
                    "agent_id",
                    a.id,
                    &escape_html(&a.name),
                    row.agent_id == Some(a.id),
                )
            })
            .collect();
        popover("changeagent", row.id, &title, &name, &options, self.tr)
    }

    fn priority(&self, row: &GridRow) -> String {
        let label = color_div(&row.priority_color, &row.priority);
        if !self.quick_change {
            return label;
        }
        let title = escape_html(&self.tr.t("grid.change_priority"));
        let options: String = self
            .priorities
            .iter()
            .map(|p| {
                radio(
                    "priority_id",
                    p.id,
                    &color_div(&p.color, &p.name),
                    p.id == row.priority_id,
                )
            })
            .collect();
        popover("changepriority", row.id, &title, &label, &options, self.tr)
    }

    fn owner(&self, row: &GridRow) -> String {
        let mut html = escape_html(&row.owner_name);
        if row.creator_id != row.user_id
            && let Some(creator) = &row.creator_name
        {
            html.push_str(&format!(
                " <span class=\"creator\" title=\"{}\">*</span>",
                escape_html(&self.tr.t_with("grid.created_by", &[("name", creator)]))
            ));
        }
        html
    }

    fn department(&self, row: &GridRow) -> String {
        match (&row.dept, &row.dept_full) {
            (Some(dept), Some(full)) => format!(
                "<span title=\"{}\">{}</span>",
                escape_html(full),
                escape_html(dept)
            ),
            (Some(dept), None) => escape_html(dept),
            _ => String::new(),
        }
    }

    fn calendar(&self, row: &GridRow) -> String {
        let time = |d: chrono::NaiveDateTime| d.format("%H:%M").to_string();
        let date = |d: chrono::NaiveDateTime| d.format(self.datetime_format).to_string();
        let (class, text) = match DueState::of(row.start_date, row.limit_date, &self.bounds) {
            DueState::NoLimit { start, started: true } => (
                "calendar-no-limit",
                format!(
                    "<span title=\"{}\">{}</span>",
                    escape_html(&date(start)),
                    escape_html(&self.tr.t("grid.calendar.no_limit"))
                ),
            ),
            DueState::NoLimit { start, started: false } => (
                "calendar-scheduled",
                escape_html(&self.tr.t_with("grid.calendar.scheduled", &[("date", &date(start))])),
            ),
            DueState::Expired { limit } => (
                "calendar-expired",
                escape_html(&self.tr.t_with("grid.calendar.expired", &[("date", &date(limit))])),
            ),
            DueState::Today { limit } => (
                "calendar-today",
                escape_html(&self.tr.t_with("grid.calendar.today", &[("time", &time(limit))])),
            ),
            DueState::Tomorrow { limit } => (
                "calendar-tomorrow",
                escape_html(&self.tr.t_with("grid.calendar.tomorrow", &[("time", &time(limit))])),
            ),
            DueState::ThisWeek { limit } => {
                let weekday = limit.format("%A").to_string();
                (
                    "calendar-week",
                    escape_html(&self.tr.t_with(
                        "grid.calendar.week",
                        &[("weekday", &weekday), ("time", &time(limit))],
                    )),
                )
            }
            DueState::Later { limit } => (
                "calendar-later",
                escape_html(&self.tr.t_with("grid.calendar.later", &[("date", &date(limit))])),
            ),
        };
        format!("<div class=\"{}\">{}</div>", class, text)
    }
}

fn color_div(color: &str, text: &str) -> String {
    format!(
        "<div style=\"color: {}\">{}</div>",
        escape_html(color),
        escape_html(text)
    )
}

fn radio(name: &str, value: i64, label: &str, checked: bool) -> String {
    format!(
        "<label><input type=\"radio\" name=\"{}\" value=\"{}\"{}> {}</label><br />",
        name,
        value,
        if checked { " checked" } else { "" },
        label
    )
}

fn popover(
    action: &str,
    ticket_id: i64,
    title: &str,
    label: &str,
    options: &str,
    tr: &Translator,
) -> String {
    let content = format!(
        "<form method=\"POST\" action=\"/tickets/{}\">\
         <input type=\"hidden\" name=\"ticket_id\" value=\"{}\">{}\
         <button type=\"submit\">{}</button></form>",
        action,
        ticket_id,
        options,
        escape_html(&tr.t("grid.submit"))
    );
    format!(
        "<a href=\"#\" class=\"quick-change\" data-toggle=\"popover\" title=\"{}\" \
         data-content=\"{}\">{}</a>",
        title,
        escape_html(&content),
        label
    )
}

fn tag_pills(row: &GridRow) -> String {
    row.tags
        .iter()
        .map(|t| {
            format!(
                "<span class=\"tag\" style=\"background-color: {}; color: {}\">{}</span>",
                escape_html(&t.bg_color),
                escape_html(&t.text_color),
                escape_html(&t.name)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::models::{Category, Role, Tag};
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn row() -> GridRow {
        GridRow {
            id: 12,
            subject: "Printer <on fire>".into(),
            content: "Smoke everywhere".into(),
            intervention: String::new(),
            status: "New".into(),
            status_color: "#e69900".into(),
            priority_id: 2,
            priority: "Normal".into(),
            priority_color: "#e1d200".into(),
            priority_magnitude: 2,
            category_id: 1,
            category: "General".into(),
            category_color: "#0014f4".into(),
            user_id: 3,
            owner_name: "Olga Owner".into(),
            creator_id: 3,
            creator_name: Some("Olga Owner".into()),
            agent_id: None,
            agent: None,
            dept: None,
            dept_full: None,
            start_date: dt("2024-05-01 08:00:00"),
            limit_date: None,
            completed_at: None,
            updated_at: dt("2024-05-15 06:00:00"),
            calendar_order: String::new(),
            has_limit: false,
            attachments_count: 0,
            comments_count: 0,
            recent_comments_count: 0,
            tags: Vec::new(),
        }
    }

    fn agent(id: i64, name: &str) -> User {
        User {
            id,
            name: name.into(),
            email: format!("{}@example.com", id),
            role: Role::Agent,
            department_id: None,
        }
    }

    fn categories(agent_count: usize) -> Vec<CategoryAgents> {
        vec![CategoryAgents {
            category: Category {
                id: 1,
                name: "General".into(),
                color: "#0014f4".into(),
            },
            agents: (0..agent_count)
                .map(|i| agent(10 + i as i64, &format!("Agent {}", i)))
                .collect(),
        }]
    }

    fn priorities() -> Vec<Priority> {
        vec![
            Priority {
                id: 3,
                name: "Critical".into(),
                color: "#e10000".into(),
                magnitude: 3,
            },
            Priority {
                id: 2,
                name: "Normal".into(),
                color: "#e1d200".into(),
                magnitude: 2,
            },
        ]
    }

    fn bounds() -> CalendarBounds {
        // Wednesday
        CalendarBounds::at(dt("2024-05-15 09:00:00"))
    }

    fn text<'m>(map: &'m Map<String, Value>, key: &str) -> &'m str {
        map.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    #[test]
    fn test_subject_escapes_and_embeds_content() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        let mut input = row();
        input.attachments_count = 2;
        let out = r.render_row(&input);
        let subject = text(&out, "subject");
        assert!(subject.contains("href=\"/tickets/12\""));
        assert!(subject.contains("Printer &lt;on fire&gt;"));
        assert!(subject.contains("Smoke everywhere"));
        assert!(subject.contains("2 attachments"));
        assert!(!out.contains_key("content"));
        assert!(!out.contains_key("dept_info"));
    }

    #[test]
    fn test_separate_content_column() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        r.subject_content_column = false;
        let out = r.render_row(&row());
        assert_eq!(text(&out, "content"), "Smoke everywhere");
        assert!(!text(&out, "subject").contains("Smoke"));
    }

    #[test]
    fn test_missing_relations_render_empty() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        r.departments = true;
        let out = r.render_row(&row());
        assert_eq!(text(&out, "agent"), "");
        assert_eq!(text(&out, "dept_info"), "");
        assert_eq!(text(&out, "tags"), "");
        assert_eq!(text(&out, "owner_name"), "Olga Owner");
        assert_eq!(text(&out, "complete_date"), "");
    }

    #[test]
    fn test_agent_control_shapes() {
        let tr = Translator::default();
        let prios = priorities();
        let mut input = row();
        input.agent_id = Some(10);
        input.agent = Some("Agent 0".into());

        let one = categories(1);
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &one, &prios);
        r.quick_change = true;
        let html = text(&r.render_row(&input), "agent").to_string();
        assert!(html.starts_with("<span class=\"tooltip-info\""));

        let three = categories(3);
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &three, &prios);
        r.quick_change = true;
        let html = text(&r.render_row(&input), "agent").to_string();
        assert!(html.contains("data-toggle=\"popover\""));
        assert!(html.contains("changeagent"));
        assert_eq!(html.matches("type=&quot;radio&quot;").count(), 3);
        assert_eq!(html.matches("name=&quot;agent_id&quot;").count(), 3);
        assert!(html.contains("value=&quot;10&quot; checked"));

        let many = categories(5);
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &many, &prios);
        r.quick_change = true;
        let html = text(&r.render_row(&input), "agent").to_string();
        assert!(html.contains("data-toggle=\"modal\""));
    }

    #[test]
    fn test_priority_popover_lists_every_priority() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let mut r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        r.quick_change = true;
        let html = text(&r.render_row(&row()), "priority").to_string();
        let critical = html.find("Critical").unwrap();
        let normal = html.find("Normal").unwrap();
        assert!(critical < normal);
        assert!(html.contains("changepriority"));
        assert!(html.contains("name=&quot;priority_id&quot;"));
    }

    #[test]
    fn test_creator_marker_and_tags() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        let mut input = row();
        input.creator_id = 1;
        input.creator_name = Some("Administrator".into());
        input.tags = vec![Tag {
            id: 4,
            name: "vpn, remote".into(),
            bg_color: "#000".into(),
            text_color: "#fff".into(),
        }];
        let out = r.render_row(&input);
        assert!(text(&out, "owner_name").contains("Created by Administrator"));
        assert!(text(&out, "tags").contains(">vpn, remote</span>"));
    }

    #[test]
    fn test_calendar_and_updated_columns() {
        let tr = Translator::default();
        let cats = categories(0);
        let prios = priorities();
        let r = GridRenderer::new(&tr, bounds(), "%d/%m/%Y %H:%M", &cats, &prios);
        let mut input = row();
        input.limit_date = Some(dt("2024-05-16 10:00:00"));
        let out = r.render_row(&input);
        assert!(text(&out, "calendar").contains("calendar-tomorrow"));
        assert!(text(&out, "calendar").contains("Tomorrow 10:00"));

        input.limit_date = Some(dt("2024-05-14 10:00:00"));
        assert!(text(&r.render_row(&input), "calendar").contains("calendar-expired"));

        input.limit_date = None;
        assert!(text(&r.render_row(&input), "calendar").contains("No limit"));

        let updated = text(&out, "updated_at");
        assert!(updated.contains(">3h</span>"));
        assert!(updated.contains("3 hours ago"));
    }
}
