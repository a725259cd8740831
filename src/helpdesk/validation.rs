//! Ticket create/edit validation.
//!
//! Rules depend on the submitting user's effective level in the target
//! category. Errors from every rule are gathered into one `ErrorBag`
//! rather than stopping at the first failure.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use crate::helpdesk::db::HelpdeskDb;
use crate::helpdesk::form::TicketForm;
use crate::helpdesk::lang::Translator;
use crate::helpdesk::models::{Role, User};
use crate::helpdesk::permissions::{LEVEL_AGENT, effective_level};
use crate::helpdesk::purify::{Purified, purify};

pub const MIN_SUBJECT_CHARS: usize = 3;
pub const MIN_CONTENT_CHARS: usize = 6;
/// Dates before this year are replaced by the current time.
pub const MIN_DATE_YEAR: i32 = 2017;

/// Accumulated validation errors: every message in order, plus one
/// combined message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorBag {
    pub messages: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

impl ErrorBag {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        self.messages.push(message.clone());
        self.fields
            .entry(field.to_string())
            .and_modify(|existing| {
                existing.push_str(". ");
                existing.push_str(&message);
            })
            .or_insert(message);
    }

    /// A message not tied to a form field.
    pub fn merge(&mut self, other: ErrorBag) {
        self.messages.extend(other.messages);
        for (field, message) in other.fields {
            self.fields
                .entry(field)
                .and_modify(|existing| {
                    existing.push_str(". ");
                    existing.push_str(&message);
                })
                .or_insert(message);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentChoice {
    Auto,
    Agent(i64),
}

/// A form that passed validation, with purified text and parsed dates.
#[derive(Debug, Clone)]
pub struct ValidTicket {
    pub level: u8,
    pub subject: String,
    pub owner_id: i64,
    pub category_id: i64,
    pub content: Purified,
    /// Present at level 2 and above.
    pub intervention: Option<Purified>,
    pub status_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub agent: AgentChoice,
    pub start_date: Option<NaiveDateTime>,
    pub limit_date: Option<NaiveDateTime>,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub enum Checked {
    Valid(ValidTicket),
    Invalid(ErrorBag),
}

pub struct ValidationContext<'a> {
    pub user: &'a User,
    /// Editing an existing ticket narrows the allowed categories.
    pub editing: bool,
    pub datetime_format: &'a str,
    pub now: NaiveDateTime,
    pub tr: &'a Translator,
}

/// Parse a form date. Blank input is `Ok(None)`; years outside
/// [2017, now + 10] are replaced by `now`. The second value is the parsed
/// date before clamping, used for the start/limit comparison.
fn parse_date(
    raw: Option<&str>,
    format: &str,
    now: NaiveDateTime,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, ()> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let parsed = NaiveDateTime::parse_from_str(raw, format).map_err(|_| ())?;
    let year = parsed.year();
    let stored = if year < MIN_DATE_YEAR || year > now.year() + 10 {
        now
    } else {
        parsed
    };
    Ok(Some((stored, parsed)))
}

pub fn allowed_categories(db: &HelpdeskDb, user: &User, editing: bool) -> Result<Vec<i64>> {
    if editing && user.role == Role::Agent {
        return db.agent_category_ids(user.id);
    }
    Ok(db.list_categories()?.into_iter().map(|c| c.id).collect())
}

pub fn validate_ticket(db: &HelpdeskDb, form: &TicketForm, ctx: &ValidationContext<'_>) -> Result<Checked> {
    let tr = ctx.tr;
    let mut errors = ErrorBag::default();

    let is_category_agent = match form.category_id {
        Some(category_id) => db.is_category_agent(category_id, ctx.user.id)?,
        None => false,
    };
    let level = effective_level(ctx.user, is_category_agent);

    let subject = form.subject.trim().to_string();
    if subject.is_empty() {
        errors.add("subject", tr.t("validate.subject.required"));
    } else if subject.chars().count() < MIN_SUBJECT_CHARS {
        errors.add("subject", tr.t("validate.subject.min"));
    }

    let owner_id = match form.owner_id {
        Some(id) if db.get_user(id)?.is_some() => Some(id),
        _ => {
            errors.add("owner_id", tr.t("validate.owner"));
            None
        }
    };

    let allowed = allowed_categories(db, ctx.user, ctx.editing)?;
    let category_id = match form.category_id {
        Some(id) if allowed.contains(&id) => Some(id),
        _ => {
            errors.add("category_id", tr.t("validate.category"));
            None
        }
    };

    let content = purify(&form.content);
    if content.text.is_empty() {
        errors.add("content", tr.t("validate.content.required"));
    } else if content.text.chars().count() < MIN_CONTENT_CHARS {
        errors.add("content", tr.t("validate.content.min"));
    }

    let mut ticket = ValidTicket {
        level,
        subject,
        owner_id: owner_id.unwrap_or_default(),
        category_id: category_id.unwrap_or_default(),
        content,
        intervention: None,
        status_id: None,
        priority_id: None,
        agent: AgentChoice::Auto,
        start_date: None,
        limit_date: None,
        complete: false,
    };

    if level >= LEVEL_AGENT {
        let mut date_errors = ErrorBag::default();
        let format_hint = [("format", ctx.datetime_format)];
        let start = match parse_date(form.start_date.as_deref(), ctx.datetime_format, ctx.now) {
            Ok(d) => d,
            Err(()) => {
                date_errors.add("start_date", tr.t_with("validate.start_date.format", &format_hint));
                None
            }
        };
        let limit = match parse_date(form.limit_date.as_deref(), ctx.datetime_format, ctx.now) {
            Ok(d) => d,
            Err(()) => {
                date_errors.add("limit_date", tr.t_with("validate.limit_date.format", &format_hint));
                None
            }
        };

        match form.status_id {
            Some(id) if db.get_status(id)?.is_some() => ticket.status_id = Some(id),
            _ => errors.add("status_id", tr.t("validate.status")),
        }
        match form.priority_id {
            Some(id) if db.get_priority(id)?.is_some() => ticket.priority_id = Some(id),
            _ => errors.add("priority_id", tr.t("validate.priority")),
        }
        match form.agent_id.as_deref().map(str::trim) {
            None | Some("") | Some("auto") => ticket.agent = AgentChoice::Auto,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if db.get_user(id)?.is_some() => ticket.agent = AgentChoice::Agent(id),
                _ => errors.add("agent_id", tr.t("validate.agent")),
            },
        }

        ticket.intervention = Some(purify(&form.intervention));
        ticket.complete = form.complete;
        ticket.start_date = start.map(|(stored, _)| stored);
        ticket.limit_date = limit.map(|(stored, _)| stored);

        let mut merged = date_errors;
        merged.merge(errors);
        errors = merged;

        if let (Some((_, start)), Some((_, limit))) = (start, limit)
            && !errors.has("limit_date")
            && limit < start
        {
            errors.add("limit_date", tr.t("validate.limit_date.lower"));
        }
    }

    if errors.is_empty() {
        Ok(Checked::Valid(ticket))
    } else {
        Ok(Checked::Invalid(errors))
    }
}
