//! Ticket state transitions.
//!
//! Each transition runs synchronously against `HelpdeskDb` (callers wrap it
//! in `DbHandle::call`) and returns the event to publish and the flash
//! message to show once the write has committed. Rejections that only
//! warn the user come back as `Transition::Rejected`; missing rows and
//! access failures on JSON endpoints are `HelpdeskError`s.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::{LocaleSection, Settings};
use crate::errors::HelpdeskError;
use crate::helpdesk::attachments::{AttachmentBatch, FileStore};
use crate::helpdesk::db::{HelpdeskDb, NewComment, TicketWrite};
use crate::helpdesk::events::HelpdeskEvent;
use crate::helpdesk::form::{ChangeAgentForm, ChangePriorityForm, CompleteForm, TicketForm};
use crate::helpdesk::lang::Translator;
use crate::helpdesk::models::{CommentType, Ticket, TicketDraft, User};
use crate::helpdesk::permissions::{LEVEL_AGENT, LEVEL_OWNER, can_close, can_reopen};
use crate::helpdesk::purify::{Purified, escape_html, purify};
use crate::helpdesk::validation::{
    AgentChoice, Checked, ErrorBag, ValidTicket, ValidationContext, validate_ticket,
};

/// A create or update that reached the database.
#[derive(Debug)]
pub struct Saved {
    pub ticket: Ticket,
    /// Attachment failures; the ticket row is committed regardless.
    pub attachment_errors: ErrorBag,
    pub event: HelpdeskEvent,
    pub message: String,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Invalid(ErrorBag),
    Saved(Box<Saved>),
}

/// Where a rejected transition sends the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    List,
    Back,
}

#[derive(Debug)]
pub enum Transition {
    Applied {
        ticket: Box<Ticket>,
        event: HelpdeskEvent,
        message: String,
    },
    Rejected {
        message: String,
        redirect: Redirect,
    },
}

pub struct Workflow<'a> {
    pub db: &'a HelpdeskDb,
    pub settings: &'a Settings,
    pub locale: &'a LocaleSection,
    pub tr: &'a Translator,
    pub files: &'a FileStore,
    pub now: NaiveDateTime,
}

impl Workflow<'_> {
    // ── Create / update ───────────────────────────────────────────────

    pub fn store(&self, user: &User, form: &TicketForm) -> Result<SaveOutcome> {
        let valid = match validate_ticket(self.db, form, &self.validation(user, false))? {
            Checked::Valid(v) => v,
            Checked::Invalid(bag) => return Ok(SaveOutcome::Invalid(bag)),
        };

        let draft = self.create_draft(user, &valid)?;
        let empty = AttachmentBatch::default();
        let outcome = self.db.persist_ticket(
            TicketWrite {
                id: None,
                draft: &draft,
                tag_ids: form.tags_for(valid.category_id),
                attachments: self.attachments_for(valid.level, form, &empty),
                actor_id: user.id,
                now: self.now,
            },
            self.files,
        )?;

        let ticket = outcome.ticket;
        info!(ticket_id = ticket.id, user_id = user.id, "ticket created");
        Ok(SaveOutcome::Saved(Box::new(Saved {
            message: self.tr.t_with("flash.created", &[("ticket", &ticket.label())]),
            attachment_errors: attachment_bag(outcome.attachment_errors),
            event: HelpdeskEvent::TicketCreated {
                ticket: ticket.clone(),
            },
            ticket,
        })))
    }

    pub fn update(&self, user: &User, id: i64, form: &TicketForm) -> Result<SaveOutcome> {
        let before = self.require_ticket(id)?;
        if !self.has_agent_access(user, &before)? {
            return Err(HelpdeskError::Forbidden(format!("edit ticket {}", id)).into());
        }

        let valid = match validate_ticket(self.db, form, &self.validation(user, true))? {
            Checked::Valid(v) => v,
            Checked::Invalid(bag) => return Ok(SaveOutcome::Invalid(bag)),
        };

        let mut draft = TicketDraft::from(&before);
        draft.subject = valid.subject.clone();
        draft.content = valid.content.text.clone();
        draft.html = valid.content.html.clone();
        draft.user_id = valid.owner_id;
        draft.category_id = valid.category_id;
        if valid.level >= LEVEL_AGENT {
            if let Some(intervention) = &valid.intervention {
                draft.intervention = intervention.text.clone();
                draft.intervention_html = intervention.html.clone();
            }
            if let Some(status_id) = valid.status_id {
                draft.status_id = status_id;
            }
            if let Some(priority_id) = valid.priority_id {
                draft.priority_id = priority_id;
            }
            draft.agent_id = self.resolve_agent(valid.agent, valid.category_id)?;
            draft.start_date = valid.start_date.unwrap_or(before.created_at);
            draft.limit_date = valid.limit_date;
            draft.completed_at = if valid.complete {
                before.completed_at.or(Some(self.now))
            } else {
                None
            };
        }

        let empty = AttachmentBatch::default();
        let outcome = self.db.persist_ticket(
            TicketWrite {
                id: Some(id),
                draft: &draft,
                tag_ids: form.tags_for(valid.category_id),
                attachments: self.attachments_for(valid.level, form, &empty),
                actor_id: user.id,
                now: self.now,
            },
            self.files,
        )?;

        let after = outcome.ticket;
        info!(ticket_id = id, user_id = user.id, "ticket updated");
        Ok(SaveOutcome::Saved(Box::new(Saved {
            message: self.tr.t_with("flash.updated", &[("ticket", &after.label())]),
            attachment_errors: attachment_bag(outcome.attachment_errors),
            event: HelpdeskEvent::TicketUpdated {
                before: Box::new(before),
                after: Box::new(after.clone()),
            },
            ticket: after,
        })))
    }

    fn validation<'u>(&'u self, user: &'u User, editing: bool) -> ValidationContext<'u> {
        ValidationContext {
            user,
            editing,
            datetime_format: &self.locale.datetime_format,
            now: self.now,
            tr: self.tr,
        }
    }

    fn create_draft(&self, user: &User, v: &ValidTicket) -> Result<TicketDraft> {
        let first_priority = self
            .db
            .first_priority_id()?
            .context("No priorities configured")?;
        let mut draft = TicketDraft {
            subject: v.subject.clone(),
            content: v.content.text.clone(),
            html: v.content.html.clone(),
            intervention: String::new(),
            intervention_html: String::new(),
            status_id: self.settings.default_status_id,
            priority_id: first_priority,
            category_id: v.category_id,
            user_id: v.owner_id,
            creator_id: user.id,
            agent_id: None,
            start_date: self.now,
            limit_date: None,
            completed_at: None,
        };

        if v.level < LEVEL_AGENT {
            draft.agent_id = self.db.auto_select_agent(v.category_id)?;
            return Ok(draft);
        }

        if let Some(intervention) = &v.intervention {
            draft.intervention = intervention.text.clone();
            draft.intervention_html = intervention.html.clone();
        }
        if let Some(status_id) = v.status_id {
            draft.status_id = status_id;
        }
        if let Some(priority_id) = v.priority_id {
            draft.priority_id = priority_id;
        }
        draft.agent_id = self.resolve_agent(v.agent, v.category_id)?;
        draft.start_date = v.start_date.unwrap_or(self.now);
        draft.limit_date = v.limit_date;
        draft.completed_at = v.complete.then_some(self.now);
        Ok(draft)
    }

    fn resolve_agent(&self, choice: AgentChoice, category_id: i64) -> Result<Option<i64>> {
        match choice {
            AgentChoice::Auto => self.db.auto_select_agent(category_id),
            AgentChoice::Agent(id) => Ok(Some(id)),
        }
    }

    fn attachments_for<'f>(
        &self,
        level: u8,
        form: &'f TicketForm,
        empty: &'f AttachmentBatch,
    ) -> &'f AttachmentBatch {
        if level >= LEVEL_AGENT && self.settings.ticket_attachments_feature {
            &form.attachments
        } else {
            empty
        }
    }

    // ── Complete / reopen ─────────────────────────────────────────────

    pub fn complete(&self, user: &User, id: i64, form: &CompleteForm) -> Result<Transition> {
        let before = self.require_ticket(id)?;
        let label = before.label();
        let is_agent = self.db.is_category_agent(before.category_id, user.id)?;

        if !can_close(&self.settings.close_ticket_perm, user, &before, is_agent) {
            warn!(ticket_id = id, user_id = user.id, "complete rejected: not permitted");
            return Ok(self.reject("flash.no_close_permission", &label, Redirect::List));
        }
        if before.is_complete() {
            warn!(ticket_id = id, "complete rejected: already complete");
            return Ok(self.reject("flash.already_complete", &label, Redirect::Back));
        }

        let mut draft = TicketDraft::from(&before);
        let mut reason_text = self.tr.t_with("audit.completed_by", &[("user", &user.name)]);
        let mut reason = None;

        if user.role.level() > LEVEL_OWNER {
            if before.intervention_html.trim().is_empty() && form.blank_intervention.is_none() {
                return Ok(self.reject("flash.blank_intervention", &label, Redirect::Back));
            }
            match form.status_id() {
                Some(status_id) if self.db.get_status(status_id)?.is_some() => {
                    draft.status_id = status_id
                }
                _ => return Ok(self.reject("flash.bad_status", &label, Redirect::Back)),
            }
        } else if self.db.closing_reasons(before.category_id)?.is_empty() {
            draft.status_id = self.settings.default_close_status_id;
        } else {
            let Some(reason_id) = form.reason_id() else {
                return Ok(self.reject("validate.reason.required", &label, Redirect::Back));
            };
            let found = self
                .db
                .get_closing_reason(reason_id)?
                .filter(|r| r.category_id == before.category_id);
            let Some(r) = found else {
                return Ok(self.reject("validate.reason.invalid", &label, Redirect::Back));
            };
            reason_text.push_str(": ");
            reason_text.push_str(&r.text);
            draft.status_id = r.status_id;
            reason = Some(r);
        }

        let date = self.now.format(&self.locale.date_format).to_string();
        append_audit(&mut draft, &date, &reason_text);

        let title = self.tr.t("comment.complete");
        let mut comment = Purified {
            text: title.clone(),
            html: escape_html(&title),
        };
        if user.role.level() <= LEVEL_OWNER {
            if let Some(r) = &reason {
                comment.text.push_str(&format!(": {}", r.text));
                comment.html.push_str(&format!(": {}", escape_html(&r.text)));
            }
            let clarification = purify(&form.clarification);
            if !clarification.text.is_empty() {
                let heading = self.tr.t("audit.clarifications");
                draft.intervention = format!("{} {}: {}", draft.intervention, heading, clarification.text);
                draft.intervention_html = format!(
                    "{}<br />{}: {}",
                    draft.intervention_html,
                    escape_html(&heading),
                    clarification.html
                );
                comment.text = format!("{} {}: {}", comment.text, heading, clarification.text);
                comment.html = format!(
                    "{}<br />{}: {}",
                    comment.html,
                    escape_html(&heading),
                    clarification.html
                );
            }
        }
        draft.completed_at = Some(self.now);

        let (after, _) = self.db.update_ticket_with_comment(
            id,
            &draft,
            &NewComment {
                user_id: user.id,
                comment_type: CommentType::Complete,
                content: comment.text,
                html: comment.html,
            },
            self.now,
        )?;
        info!(ticket_id = id, user_id = user.id, status_id = after.status_id, "ticket completed");
        Ok(self.applied("flash.completed", &[("ticket", &label)], before, after))
    }

    pub fn reopen(&self, user: &User, id: i64) -> Result<Transition> {
        let before = self.require_ticket(id)?;
        let label = before.label();
        let is_agent = self.db.is_category_agent(before.category_id, user.id)?;

        if !can_reopen(&self.settings.reopen_ticket_perm, user, &before, is_agent) {
            warn!(ticket_id = id, user_id = user.id, "reopen rejected: not permitted");
            return Ok(self.reject("flash.no_reopen_permission", &label, Redirect::List));
        }
        if !before.is_complete() {
            warn!(ticket_id = id, "reopen rejected: not complete");
            return Ok(self.reject("flash.not_complete", &label, Redirect::Back));
        }

        let mut draft = TicketDraft::from(&before);
        draft.completed_at = None;
        if let Some(status_id) = self.settings.default_reopen_status_id {
            draft.status_id = status_id;
        }
        let date = self.now.format(&self.locale.date_format).to_string();
        let line = self.tr.t_with("audit.reopened_by", &[("user", &user.name)]);
        append_audit(&mut draft, &date, &line);

        let title = self.tr.t("comment.reopen");
        let (after, _) = self.db.update_ticket_with_comment(
            id,
            &draft,
            &NewComment {
                user_id: user.id,
                comment_type: CommentType::Reopen,
                html: escape_html(&title),
                content: title,
            },
            self.now,
        )?;
        info!(ticket_id = id, user_id = user.id, "ticket reopened");
        Ok(self.applied("flash.reopened", &[("ticket", &label)], before, after))
    }

    // ── Quick changes ─────────────────────────────────────────────────

    pub fn change_agent(&self, user: &User, form: &ChangeAgentForm) -> Result<Transition> {
        let before = self.require_ticket(form.ticket_id)?;
        let label = before.label();
        if !self.has_agent_access(user, &before)? {
            return Ok(self.reject("flash.forbidden", &label, Redirect::List));
        }
        let agent = self
            .db
            .get_user(form.agent_id)?
            .ok_or(HelpdeskError::AgentNotFound { id: form.agent_id })?;

        if before.agent_id == Some(agent.id) {
            return Ok(Transition::Rejected {
                message: self.tr.t_with(
                    "flash.agent_unchanged",
                    &[("ticket", &label), ("agent", &agent.name)],
                ),
                redirect: Redirect::Back,
            });
        }

        let old = match before.agent_id {
            Some(old_id) => self.db.get_user(old_id)?.map(|u| u.name),
            None => None,
        }
        .unwrap_or_else(|| self.tr.t("flash.no_agent"));

        let mut draft = TicketDraft::from(&before);
        draft.agent_id = Some(agent.id);
        if draft.status_id == self.settings.default_status_id
            && let Some(reopen) = self.settings.default_reopen_status_id
        {
            draft.status_id = reopen;
        }
        let after = self.db.update_ticket(before.id, &draft, self.now)?;
        info!(ticket_id = after.id, agent_id = agent.id, "ticket agent changed");
        Ok(self.applied(
            "flash.agent_changed",
            &[("ticket", &label), ("old", &old), ("new", &agent.name)],
            before,
            after,
        ))
    }

    pub fn change_priority(&self, user: &User, form: &ChangePriorityForm) -> Result<Transition> {
        let before = self.require_ticket(form.ticket_id)?;
        let label = before.label();
        if !self.has_agent_access(user, &before)? {
            return Ok(self.reject("flash.forbidden", &label, Redirect::List));
        }
        let priority = self
            .db
            .get_priority(form.priority_id)?
            .ok_or(HelpdeskError::PriorityNotFound {
                id: form.priority_id,
            })?;

        if before.priority_id == priority.id {
            return Ok(Transition::Rejected {
                message: self.tr.t_with(
                    "flash.priority_unchanged",
                    &[("ticket", &label), ("priority", &priority.name)],
                ),
                redirect: Redirect::Back,
            });
        }

        let old = self
            .db
            .get_priority(before.priority_id)?
            .map(|p| p.name)
            .unwrap_or_default();
        let mut draft = TicketDraft::from(&before);
        draft.priority_id = priority.id;
        let after = self.db.update_ticket(before.id, &draft, self.now)?;
        info!(ticket_id = after.id, priority_id = priority.id, "ticket priority changed");
        Ok(self.applied(
            "flash.priority_changed",
            &[("ticket", &label), ("old", &old), ("new", &priority.name)],
            before,
            after,
        ))
    }

    // ── Destroy ───────────────────────────────────────────────────────

    pub fn destroy(&self, user: &User, id: i64) -> Result<Transition> {
        let before = self.require_ticket(id)?;
        let label = before.label();
        if !user.is_admin() {
            warn!(ticket_id = id, user_id = user.id, "delete rejected: not an admin");
            return Ok(self.reject("flash.forbidden", &label, Redirect::List));
        }
        let paths = self
            .db
            .delete_ticket(id)?
            .ok_or(HelpdeskError::TicketNotFound { id })?;
        for path in paths {
            if let Err(e) = self.files.remove(&path) {
                warn!(ticket_id = id, "failed to remove attachment file: {}", e);
            }
        }
        info!(ticket_id = id, user_id = user.id, "ticket deleted");
        Ok(Transition::Applied {
            message: self.tr.t_with("flash.deleted", &[("ticket", &label)]),
            event: HelpdeskEvent::TicketDeleted {
                ticket_id: id,
                subject: before.subject.clone(),
            },
            ticket: Box::new(before),
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────

    fn require_ticket(&self, id: i64) -> Result<Ticket> {
        self.db
            .get_ticket(id)?
            .ok_or_else(|| HelpdeskError::TicketNotFound { id }.into())
    }

    /// Admins, or agents assigned to the ticket's category.
    fn has_agent_access(&self, user: &User, ticket: &Ticket) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        Ok(user.is_agent() && self.db.is_category_agent(ticket.category_id, user.id)?)
    }

    fn reject(&self, key: &str, label: &str, redirect: Redirect) -> Transition {
        Transition::Rejected {
            message: self.tr.t_with(key, &[("ticket", label)]),
            redirect,
        }
    }

    fn applied(&self, key: &str, args: &[(&str, &str)], before: Ticket, after: Ticket) -> Transition {
        Transition::Applied {
            message: self.tr.t_with(key, args),
            event: HelpdeskEvent::TicketUpdated {
                before: Box::new(before),
                after: Box::new(after.clone()),
            },
            ticket: Box::new(after),
        }
    }
}

fn append_audit(draft: &mut TicketDraft, date: &str, line: &str) {
    draft.intervention = format!("{} {} {}", draft.intervention, date, line);
    draft.intervention_html = format!(
        "{}<br />{} {}",
        draft.intervention_html,
        date,
        escape_html(line)
    );
}

fn attachment_bag(errors: Vec<String>) -> ErrorBag {
    let mut bag = ErrorBag::default();
    for e in errors {
        bag.add("attachments", e);
    }
    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::attachments::NewUpload;
    use crate::helpdesk::db::fixtures::{Fixture, draft, dt, fixture};
    use tempfile::TempDir;

    const NOW: &str = "2024-05-15 09:00:00";

    struct Env {
        f: Fixture,
        settings: Settings,
        locale: LocaleSection,
        tr: Translator,
        files: FileStore,
        _dir: TempDir,
    }

    fn env() -> Env {
        let dir = TempDir::new().unwrap();
        Env {
            f: fixture(),
            settings: Settings::default(),
            locale: LocaleSection::default(),
            tr: Translator::default(),
            files: FileStore::new(dir.path().to_path_buf(), 1024),
            _dir: dir,
        }
    }

    impl Env {
        fn wf(&self) -> Workflow<'_> {
            Workflow {
                db: &self.f.db,
                settings: &self.settings,
                locale: &self.locale,
                tr: &self.tr,
                files: &self.files,
                now: dt(NOW),
            }
        }

        fn ticket(&self, subject: &str) -> Ticket {
            self.f
                .db
                .create_ticket(&draft(&self.f.owner, self.f.category.id, subject), dt("2024-05-01 08:00:00"))
                .unwrap()
        }
    }

    fn owner_form(e: &Env) -> TicketForm {
        TicketForm {
            subject: "Printer jam".into(),
            owner_id: Some(e.f.owner.id),
            category_id: Some(e.f.category.id),
            content: "<p>Paper stuck in tray 2</p>".into(),
            ..TicketForm::default()
        }
    }

    fn agent_form(e: &Env) -> TicketForm {
        TicketForm {
            status_id: Some(2),
            priority_id: Some(3),
            agent_id: Some(e.f.agent.id.to_string()),
            start_date: Some("15/05/2024 10:00".into()),
            limit_date: Some("16/05/2024 10:00".into()),
            intervention: "<b>Replaced roller</b>".into(),
            ..owner_form(e)
        }
    }

    fn saved(outcome: SaveOutcome) -> Saved {
        match outcome {
            SaveOutcome::Saved(s) => *s,
            SaveOutcome::Invalid(bag) => panic!("unexpected validation errors: {:?}", bag),
        }
    }

    fn applied(t: Transition) -> (Ticket, HelpdeskEvent, String) {
        match t {
            Transition::Applied {
                ticket,
                event,
                message,
            } => (*ticket, event, message),
            Transition::Rejected { message, .. } => panic!("unexpected rejection: {}", message),
        }
    }

    fn rejected(t: Transition) -> (String, Redirect) {
        match t {
            Transition::Rejected { message, redirect } => (message, redirect),
            Transition::Applied { .. } => panic!("expected a rejection"),
        }
    }

    #[test]
    fn test_owner_store_uses_defaults() -> Result<()> {
        let e = env();
        let mut form = owner_form(&e);
        form.status_id = Some(3);
        form.limit_date = Some("20/05/2024 10:00".into());
        form.attachments.uploads.push(NewUpload::new("log.txt", b"boom".to_vec()));

        let s = saved(e.wf().store(&e.f.owner, &form)?);
        let t = &s.ticket;
        assert_eq!(t.status_id, e.settings.default_status_id);
        assert_eq!(t.priority_id, 1);
        // Admin and Ann both agent General with no tickets: lowest id wins.
        assert_eq!(t.agent_id, Some(e.f.admin.id));
        assert_eq!(t.start_date, dt(NOW));
        assert_eq!(t.limit_date, None);
        assert_eq!(t.intervention, "");
        assert_eq!(t.creator_id, e.f.owner.id);
        assert!(e.f.db.ticket_attachments(t.id)?.is_empty());
        assert!(matches!(s.event, HelpdeskEvent::TicketCreated { .. }));
        assert_eq!(s.message, format!("Ticket #{} Printer jam has been created", t.id));
        Ok(())
    }

    #[test]
    fn test_invalid_store_writes_nothing() -> Result<()> {
        let e = env();
        let mut form = owner_form(&e);
        form.subject = "x".into();
        match e.wf().store(&e.f.owner, &form)? {
            SaveOutcome::Invalid(bag) => assert!(bag.has("subject")),
            SaveOutcome::Saved(_) => panic!("expected validation errors"),
        }
        assert_eq!(e.f.db.latest_ticket_category(e.f.owner.id)?, None);
        Ok(())
    }

    #[test]
    fn test_agent_store_sets_full_field_set() -> Result<()> {
        let e = env();
        let mut form = agent_form(&e);
        form.complete = true;
        form.attachments.uploads.push(NewUpload::new("log.txt", b"boom".to_vec()));

        let s = saved(e.wf().store(&e.f.agent, &form)?);
        let t = &s.ticket;
        assert_eq!(t.status_id, 2);
        assert_eq!(t.priority_id, 3);
        assert_eq!(t.agent_id, Some(e.f.agent.id));
        assert_eq!(t.start_date, dt("2024-05-15 10:00:00"));
        assert_eq!(t.limit_date, Some(dt("2024-05-16 10:00:00")));
        assert_eq!(t.completed_at, Some(dt(NOW)));
        assert_eq!(t.intervention, "Replaced roller");
        assert!(s.attachment_errors.is_empty());
        assert_eq!(e.f.db.ticket_attachments(t.id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_store_clamps_year_one_start_to_now() -> Result<()> {
        let e = env();
        let mut form = agent_form(&e);
        form.start_date = Some("01/01/0001 00:00".into());
        form.limit_date = None;

        let s = saved(e.wf().store(&e.f.agent, &form)?);
        assert_eq!(s.ticket.start_date, dt(NOW));
        assert_eq!(e.f.db.get_ticket(s.ticket.id)?.unwrap().start_date, dt(NOW));
        Ok(())
    }

    #[test]
    fn test_attachment_error_still_commits() -> Result<()> {
        let e = env();
        let mut form = agent_form(&e);
        form.attachments
            .uploads
            .push(NewUpload::new("huge.bin", vec![0u8; 4096]));

        let s = saved(e.wf().store(&e.f.agent, &form)?);
        assert!(s.attachment_errors.has("attachments"));
        assert!(e.f.db.get_ticket(s.ticket.id)?.is_some());
        assert!(e.f.db.ticket_attachments(s.ticket.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_update_requires_agent_access() {
        let e = env();
        let t = e.ticket("Monitor");
        let err = e.wf().update(&e.f.owner, t.id, &owner_form(&e)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelpdeskError>(),
            Some(HelpdeskError::Forbidden(_))
        ));
        let err = e.wf().update(&e.f.agent, 999, &agent_form(&e)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelpdeskError>(),
            Some(HelpdeskError::TicketNotFound { id: 999 })
        ));
    }

    #[test]
    fn test_update_blank_start_means_created_at() -> Result<()> {
        let e = env();
        let t = e.ticket("Monitor");
        let mut form = agent_form(&e);
        form.start_date = Some(String::new());
        form.limit_date = None;
        form.complete = false;

        let s = saved(e.wf().update(&e.f.agent, t.id, &form)?);
        assert_eq!(s.ticket.start_date, t.created_at);
        assert_eq!(s.ticket.subject, "Printer jam");
        assert_eq!(s.ticket.completed_at, None);
        match s.event {
            HelpdeskEvent::TicketUpdated { before, after } => {
                assert_eq!(before.subject, "Monitor");
                assert_eq!(after.subject, "Printer jam");
            }
            other => panic!("unexpected event {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_agent_complete_needs_intervention_and_status() -> Result<()> {
        let e = env();
        let t = e.ticket("Keyboard");
        let wf = e.wf();

        let form = CompleteForm {
            status_id: Some("3".into()),
            ..CompleteForm::default()
        };
        let (_, redirect) = rejected(wf.complete(&e.f.agent, t.id, &form)?);
        assert_eq!(redirect, Redirect::Back);

        let form = CompleteForm {
            status_id: Some("99".into()),
            blank_intervention: Some("1".into()),
            ..CompleteForm::default()
        };
        rejected(wf.complete(&e.f.agent, t.id, &form)?);
        assert!(!e.f.db.get_ticket(t.id)?.unwrap().is_complete());

        let form = CompleteForm {
            status_id: Some("3".into()),
            blank_intervention: Some("1".into()),
            ..CompleteForm::default()
        };
        let (after, event, message) = applied(wf.complete(&e.f.agent, t.id, &form)?);
        assert_eq!(after.status_id, 3);
        assert_eq!(after.completed_at, Some(dt(NOW)));
        assert_eq!(after.intervention, " 15/05/2024 Completed by Ann Agent");
        assert_eq!(after.intervention_html, "<br />15/05/2024 Completed by Ann Agent");
        assert!(matches!(event, HelpdeskEvent::TicketUpdated { .. }));
        assert!(message.contains("has been completed"));

        let (comments, _) = e.f.db.list_comments(t.id, true, 1, 10)?;
        assert_eq!(comments[0].comment_type, CommentType::Complete);
        assert_eq!(comments[0].content, "Ticket completed");

        let (message, redirect) = rejected(wf.complete(&e.f.agent, t.id, &form)?);
        assert!(message.contains("already complete"));
        assert_eq!(redirect, Redirect::Back);
        Ok(())
    }

    #[test]
    fn test_owner_complete_with_closing_reasons() -> Result<()> {
        let e = env();
        let t = e.ticket("Laptop");
        let reason = e.f.db.create_closing_reason(e.f.category.id, "Solved by user", 3, 1)?;
        let foreign = e
            .f
            .db
            .create_closing_reason(e.f.second_category.id, "Wrong place", 2, 1)?;
        let wf = e.wf();

        let (message, _) = rejected(wf.complete(&e.f.owner, t.id, &CompleteForm::default())?);
        assert_eq!(message, "Select a closing reason");

        let form = CompleteForm {
            reason_id: Some(foreign.id.to_string()),
            ..CompleteForm::default()
        };
        rejected(wf.complete(&e.f.owner, t.id, &form)?);

        let form = CompleteForm {
            reason_id: Some(reason.id.to_string()),
            clarification: "<p>It was unplugged</p>".into(),
            ..CompleteForm::default()
        };
        let (after, _, _) = applied(wf.complete(&e.f.owner, t.id, &form)?);
        assert_eq!(after.status_id, 3);
        assert_eq!(
            after.intervention,
            " 15/05/2024 Completed by Olga Owner: Solved by user Closing clarifications: It was unplugged"
        );
        let (comments, _) = e.f.db.list_comments(t.id, true, 1, 10)?;
        assert_eq!(
            comments[0].content,
            "Ticket completed: Solved by user Closing clarifications: It was unplugged"
        );
        Ok(())
    }

    #[test]
    fn test_owner_complete_without_reasons_uses_close_status() -> Result<()> {
        let e = env();
        let t = e.ticket("Laptop");
        let (after, _, _) = applied(e.wf().complete(&e.f.owner, t.id, &CompleteForm::default())?);
        assert_eq!(after.status_id, e.settings.default_close_status_id);
        Ok(())
    }

    #[test]
    fn test_complete_without_permission_does_not_mutate() -> Result<()> {
        let e = env();
        let t = e.ticket("Desk");
        let (message, redirect) = rejected(e.wf().complete(&e.f.other, t.id, &CompleteForm::default())?);
        assert_eq!(redirect, Redirect::List);
        assert!(message.contains("not allowed"));
        assert_eq!(e.f.db.get_ticket(t.id)?.unwrap(), t);
        Ok(())
    }

    #[test]
    fn test_reopen_rules() -> Result<()> {
        let e = env();
        let t = e.ticket("Phone");
        let wf = e.wf();

        let (_, redirect) = rejected(wf.reopen(&e.f.agent, t.id)?);
        assert_eq!(redirect, Redirect::Back);

        let mut d = TicketDraft::from(&t);
        d.completed_at = Some(dt("2024-05-10 12:00:00"));
        d.status_id = 3;
        e.f.db.update_ticket(t.id, &d, dt("2024-05-10 12:00:00"))?;

        let (_, redirect) = rejected(wf.reopen(&e.f.owner, t.id)?);
        assert_eq!(redirect, Redirect::List);

        let (after, _, message) = applied(wf.reopen(&e.f.agent, t.id)?);
        assert_eq!(after.completed_at, None);
        assert_eq!(after.status_id, 2);
        assert!(after.intervention.ends_with("15/05/2024 Reopened by Ann Agent"));
        assert!(message.contains("reopened"));
        let (comments, _) = e.f.db.list_comments(t.id, true, 1, 10)?;
        assert_eq!(comments[0].comment_type, CommentType::Reopen);
        Ok(())
    }

    #[test]
    fn test_change_agent() -> Result<()> {
        let e = env();
        let t = e.ticket("Scanner");
        let wf = e.wf();

        let form = ChangeAgentForm {
            ticket_id: t.id,
            agent_id: e.f.agent.id,
        };
        let (after, _, message) = applied(wf.change_agent(&e.f.admin, &form)?);
        assert_eq!(after.agent_id, Some(e.f.agent.id));
        assert_eq!(after.status_id, 2);
        assert_eq!(
            message,
            format!("Ticket #{} Scanner agent changed from no agent to Ann Agent", t.id)
        );

        let (message, redirect) = rejected(wf.change_agent(&e.f.admin, &form)?);
        assert_eq!(redirect, Redirect::Back);
        assert!(message.contains("already has agent Ann Agent"));

        let (_, redirect) = rejected(wf.change_agent(&e.f.owner, &form)?);
        assert_eq!(redirect, Redirect::List);

        let err = wf
            .change_agent(
                &e.f.admin,
                &ChangeAgentForm {
                    ticket_id: t.id,
                    agent_id: 999,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelpdeskError>(),
            Some(HelpdeskError::AgentNotFound { id: 999 })
        ));
        Ok(())
    }

    #[test]
    fn test_change_priority() -> Result<()> {
        let e = env();
        let t = e.ticket("Router");
        let wf = e.wf();

        let same = ChangePriorityForm {
            ticket_id: t.id,
            priority_id: 1,
        };
        rejected(wf.change_priority(&e.f.agent, &same)?);

        let form = ChangePriorityForm {
            ticket_id: t.id,
            priority_id: 3,
        };
        let (after, _, message) = applied(wf.change_priority(&e.f.agent, &form)?);
        assert_eq!(after.priority_id, 3);
        assert!(message.ends_with("from Low to Critical"));

        let err = wf
            .change_priority(
                &e.f.agent,
                &ChangePriorityForm {
                    ticket_id: t.id,
                    priority_id: 42,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelpdeskError>(),
            Some(HelpdeskError::PriorityNotFound { id: 42 })
        ));
        Ok(())
    }

    #[test]
    fn test_destroy_is_admin_only() -> Result<()> {
        let e = env();
        let t = e.ticket("Chair");
        let wf = e.wf();

        rejected(wf.destroy(&e.f.agent, t.id)?);
        assert!(e.f.db.get_ticket(t.id)?.is_some());

        let (_, event, message) = applied(wf.destroy(&e.f.admin, t.id)?);
        assert!(matches!(event, HelpdeskEvent::TicketDeleted { ticket_id, .. } if ticket_id == t.id));
        assert!(message.contains("has been deleted"));
        assert!(e.f.db.get_ticket(t.id)?.is_none());

        let err = wf.destroy(&e.f.admin, t.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HelpdeskError>(),
            Some(HelpdeskError::TicketNotFound { .. })
        ));
        Ok(())
    }
}
