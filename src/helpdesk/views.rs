//! Read models for the ticket page and the create/edit forms.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::Settings;
use crate::errors::HelpdeskError;
use crate::helpdesk::db::HelpdeskDb;
use crate::helpdesk::models::{
    Attachment, Category, CategoryTags, ClosingReason, Comment, Department, Priority, Status, Tag,
    Ticket, User,
};
use crate::helpdesk::permissions::{
    LEVEL_AGENT, LEVEL_OWNER, can_close, can_reopen, can_view, category_level, effective_level,
};
use crate::helpdesk::validation::allowed_categories;

/// Cached lookup lists the pages embed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Lookups {
    pub priorities: Vec<Priority>,
    pub statuses: Vec<Status>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentPage {
    pub items: Vec<Comment>,
    pub page: usize,
    pub per_page: usize,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub ticket: Ticket,
    pub owner: Option<User>,
    pub agent: Option<User>,
    pub department: Option<Department>,
    pub level: u8,
    pub can_close: bool,
    pub can_reopen: bool,
    pub closing_reasons: Vec<ClosingReason>,
    pub tags: Vec<Tag>,
    pub category_tags: Vec<CategoryTags>,
    pub agents: Vec<User>,
    pub statuses: Vec<Status>,
    pub attachments: Vec<Attachment>,
    pub comments: CommentPage,
}

pub fn ticket_page(
    db: &HelpdeskDb,
    user: &User,
    id: i64,
    settings: &Settings,
    statuses: Vec<Status>,
    page: usize,
) -> Result<TicketPage> {
    let ticket = db
        .get_ticket(id)?
        .ok_or(HelpdeskError::TicketNotFound { id })?;
    let is_agent = db.is_category_agent(ticket.category_id, user.id)?;
    if !can_view(user, &ticket, is_agent, settings.agent_restrict) {
        return Err(HelpdeskError::Forbidden(format!("view ticket {}", id)).into());
    }

    let level = category_level(user, is_agent);
    let owner = db.get_user(ticket.user_id)?;
    let department = match owner.as_ref().and_then(|o| o.department_id) {
        Some(dept) if settings.departments_feature => db.get_department(dept)?,
        _ => None,
    };
    let agent = match ticket.agent_id {
        Some(agent_id) => db.get_user(agent_id)?,
        None => None,
    };

    let per_page = settings.paginate_items.max(1);
    let page = page.max(1);
    let (items, total) = db.list_comments(id, level >= LEVEL_AGENT, page, per_page)?;

    Ok(TicketPage {
        owner,
        agent,
        department,
        level,
        can_close: can_close(&settings.close_ticket_perm, user, &ticket, is_agent),
        can_reopen: can_reopen(&settings.reopen_ticket_perm, user, &ticket, is_agent),
        closing_reasons: db.closing_reasons(ticket.category_id)?,
        tags: db.ticket_tags(id)?,
        category_tags: db.category_tag_lists()?,
        agents: db.category_agents(ticket.category_id)?,
        statuses,
        attachments: db.ticket_attachments(id)?,
        comments: CommentPage {
            items,
            page,
            per_page,
            total,
        },
        ticket,
    })
}

/// Initial field values of the ticket form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormValues {
    pub owner_id: i64,
    pub category_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub status_id: i64,
    pub priority_id: Option<i64>,
    pub start_date: Option<String>,
    pub limit_date: Option<String>,
    pub complete: bool,
    pub tags: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketFormPage {
    pub level: u8,
    pub owners: Vec<User>,
    pub categories: Vec<Category>,
    pub agents: Vec<User>,
    pub category_tags: Vec<CategoryTags>,
    pub lookups: Lookups,
    pub values: FormValues,
    pub attachments: Vec<Attachment>,
    pub ticket: Option<Ticket>,
}

fn categories_in(db: &HelpdeskDb, ids: &[i64]) -> Result<Vec<Category>> {
    Ok(db
        .list_categories()?
        .into_iter()
        .filter(|c| ids.contains(&c.id))
        .collect())
}

fn owners_for(db: &HelpdeskDb, user: &User, level: u8) -> Result<Vec<User>> {
    if level > LEVEL_OWNER {
        db.list_users()
    } else {
        db.list_owner_candidates(user.id)
    }
}

/// Data for a blank form. The category defaults to the one asked for, then
/// the category of the user's latest ticket, then the first allowed one.
pub fn create_form(
    db: &HelpdeskDb,
    user: &User,
    settings: &Settings,
    requested_category: Option<i64>,
    lookups: Lookups,
) -> Result<TicketFormPage> {
    let allowed = allowed_categories(db, user, false)?;
    let categories = categories_in(db, &allowed)?;
    let latest = db.latest_ticket_category(user.id)?;
    let category_id = requested_category
        .into_iter()
        .chain(latest)
        .find(|id| allowed.contains(id))
        .or_else(|| categories.first().map(|c| c.id));

    let (level, agents) = match category_id {
        Some(cat) => (
            effective_level(user, db.is_category_agent(cat, user.id)?),
            db.category_agents(cat)?,
        ),
        None => (LEVEL_OWNER, Vec::new()),
    };
    let status_id = if level > LEVEL_OWNER {
        settings
            .default_reopen_status_id
            .unwrap_or(settings.default_status_id)
    } else {
        settings.default_status_id
    };

    Ok(TicketFormPage {
        level,
        owners: owners_for(db, user, level)?,
        categories,
        agents,
        category_tags: db.category_tag_lists()?,
        values: FormValues {
            owner_id: user.id,
            category_id,
            agent_id: (level > LEVEL_OWNER).then_some(user.id),
            status_id,
            priority_id: db.first_priority_id()?,
            start_date: None,
            limit_date: None,
            complete: false,
            tags: Vec::new(),
        },
        lookups,
        attachments: Vec::new(),
        ticket: None,
    })
}

/// Data for editing `id`. Only admins and agents of the ticket's category
/// may edit.
pub fn edit_form(
    db: &HelpdeskDb,
    user: &User,
    id: i64,
    datetime_format: &str,
    lookups: Lookups,
) -> Result<TicketFormPage> {
    let ticket = db
        .get_ticket(id)?
        .ok_or(HelpdeskError::TicketNotFound { id })?;
    let is_agent = db.is_category_agent(ticket.category_id, user.id)?;
    if !(user.is_admin() || (user.is_agent() && is_agent)) {
        return Err(HelpdeskError::Forbidden(format!("edit ticket {}", id)).into());
    }

    let level = effective_level(user, is_agent);
    let allowed = allowed_categories(db, user, true)?;
    let fmt = |d: chrono::NaiveDateTime| d.format(datetime_format).to_string();

    Ok(TicketFormPage {
        level,
        owners: owners_for(db, user, level)?,
        categories: categories_in(db, &allowed)?,
        agents: db.category_agents(ticket.category_id)?,
        category_tags: db.category_tag_lists()?,
        values: FormValues {
            owner_id: ticket.user_id,
            category_id: Some(ticket.category_id),
            agent_id: ticket.agent_id,
            status_id: ticket.status_id,
            priority_id: Some(ticket.priority_id),
            start_date: Some(fmt(ticket.start_date)),
            limit_date: ticket.limit_date.map(fmt),
            complete: ticket.is_complete(),
            tags: db.ticket_tags(id)?.into_iter().map(|t| t.id).collect(),
        },
        lookups,
        attachments: db
            .ticket_attachments(id)
            .context("Failed to load attachments for edit form")?,
        ticket: Some(ticket),
    })
}
