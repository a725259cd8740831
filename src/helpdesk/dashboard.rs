//! List view assembly: calendar bucket counts and the sidebar category and
//! agent counts.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;

use crate::helpdesk::calendar::{CalendarBounds, CalendarFilter};
use crate::helpdesk::db::{HelpdeskDb, TicketScope, UpcomingTicket};
use crate::helpdesk::filters::{FilterContext, Flash};
use crate::helpdesk::models::{Category, CategoryAgents, Role, TicketList, User};
use crate::helpdesk::permissions::Visibility;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CalendarCounts {
    pub expired: i64,
    pub today: i64,
    pub tomorrow: i64,
    pub week: i64,
    pub month: i64,
}

impl CalendarCounts {
    /// Bucket the upcoming set in memory. Buckets overlap: a ticket due
    /// tomorrow also counts toward the week and the month.
    pub fn from_upcoming(expired: i64, upcoming: &[UpcomingTicket], b: &CalendarBounds) -> Self {
        let mut counts = Self {
            expired,
            ..Self::default()
        };
        for t in upcoming {
            for bucket in CalendarFilter::ALL {
                if bucket == CalendarFilter::Expired || !bucket.contains(b, t.limit_date) {
                    continue;
                }
                match bucket {
                    CalendarFilter::Today => counts.today += 1,
                    CalendarFilter::Tomorrow => counts.tomorrow += 1,
                    CalendarFilter::Week => counts.week += 1,
                    CalendarFilter::Month => counts.month += 1,
                    CalendarFilter::Expired => {}
                }
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentCount {
    pub agent: User,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub list: TicketList,
    pub categories: Vec<CategoryAgents>,
    /// Agent and admin views only.
    pub calendar: Option<CalendarCounts>,
    pub category_counts: Vec<CategoryCount>,
    pub agent_counts: Vec<AgentCount>,
    /// Filters after stale entries were dropped.
    pub filters: FilterContext,
    /// The stored agent filter named an agent with no tickets in view.
    #[serde(skip)]
    pub stale_agent_filter: bool,
    pub flashes: Vec<Flash>,
}

pub struct DashboardInput<'a> {
    pub user: &'a User,
    pub list: TicketList,
    pub filters: FilterContext,
    pub agent_restrict: bool,
    pub default_status_id: i64,
    pub bounds: CalendarBounds,
}

pub fn assemble(db: &HelpdeskDb, input: &DashboardInput<'_>) -> Result<Dashboard> {
    let user = input.user;
    let mut dashboard = Dashboard {
        list: input.list,
        categories: db.categories_with_agents()?,
        calendar: None,
        category_counts: Vec::new(),
        agent_counts: Vec::new(),
        filters: input.filters,
        stale_agent_filter: false,
        flashes: Vec::new(),
    };
    if user.role == Role::User {
        return Ok(dashboard);
    }

    let scope = TicketScope {
        list: input.list,
        visibility: Visibility::for_user(user, input.agent_restrict),
        filters: input.filters,
        default_status_id: input.default_status_id,
        bounds: input.bounds,
    };

    let undated = TicketScope {
        filters: FilterContext {
            calendar: None,
            ..input.filters
        },
        ..scope.clone()
    };
    let expired = db.count_scoped(&TicketScope {
        filters: FilterContext {
            calendar: Some(CalendarFilter::Expired),
            ..input.filters
        },
        ..scope.clone()
    })?;
    let upcoming = db.upcoming_tickets(&undated)?;
    dashboard.calendar = Some(CalendarCounts::from_upcoming(expired, &upcoming, &input.bounds));

    // Sidebar counts ignore the category/agent/owner selection but keep the
    // calendar bucket.
    let bucket = scope.calendar_only();
    let shown_categories: Vec<Category> = match user.role {
        Role::Admin => db.list_categories()?,
        Role::Agent if !input.agent_restrict => {
            let mine = db.agent_category_ids(user.id)?;
            db.list_categories()?
                .into_iter()
                .filter(|c| mine.contains(&c.id))
                .collect()
        }
        _ => Vec::new(),
    };
    let by_category = db.count_by_category(&bucket)?;
    dashboard.category_counts = shown_categories
        .into_iter()
        .map(|category| CategoryCount {
            count: by_category.get(&category.id).copied().unwrap_or(0),
            category,
        })
        .collect();

    let agent_scope = TicketScope {
        filters: FilterContext {
            category: input.filters.category,
            ..bucket.filters
        },
        ..bucket
    };
    let by_agent: HashMap<i64, i64> = db.count_by_agent(&agent_scope)?;
    dashboard.agent_counts = db
        .list_agents(input.filters.category)?
        .into_iter()
        .map(|agent| {
            let count = by_agent.get(&agent.id).copied().unwrap_or(0);
            AgentCount { agent, count }
        })
        .collect();

    if let Some(agent_id) = input.filters.agent
        && !dashboard.agent_counts.iter().any(|a| a.agent.id == agent_id)
    {
        dashboard.filters.agent = None;
        dashboard.stale_agent_filter = true;
    }
    Ok(dashboard)
}
