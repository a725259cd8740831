use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use super::HelpdeskDb;
use super::comments::{NewComment, insert_comment_in};
use super::tags::{delete_orphan_tags_in, sync_ticket_tags_in};
use crate::helpdesk::attachments::{AttachmentBatch, FileStore, StoredFile};
use crate::helpdesk::models::*;

const TICKET_COLUMNS: &str = "t.id, t.subject, t.content, t.html, t.intervention, t.intervention_html,
     t.status_id, t.priority_id, t.category_id, t.user_id, t.creator_id, t.agent_id,
     t.start_date, t.limit_date, t.completed_at, t.created_at, t.updated_at";

/// A ticket row write together with its attachment and tag changes.
pub struct TicketWrite<'a> {
    /// `None` inserts a new ticket.
    pub id: Option<i64>,
    pub draft: &'a TicketDraft,
    /// Tag ids submitted for the ticket's category.
    pub tag_ids: &'a [i64],
    pub attachments: &'a AttachmentBatch,
    pub actor_id: i64,
    pub now: NaiveDateTime,
}

/// Result of `persist_ticket`. The ticket row is committed even when
/// `attachment_errors` is non-empty.
#[derive(Debug)]
pub struct WriteOutcome {
    pub ticket: Ticket,
    pub attachment_errors: Vec<String>,
    pub tag_ids: Vec<i64>,
}

/// Uncommitted part of `persist_ticket`.
struct Staged {
    id: i64,
    errors: Vec<String>,
    /// Files of deleted attachments, removed once the commit succeeds.
    removed: Vec<String>,
    tag_ids: Vec<i64>,
}

/// Apply a ticket write inside `tx`. Paths of files written to disk are
/// pushed to `saved` as they are created.
fn stage_ticket_in(
    tx: &Connection,
    write: &TicketWrite<'_>,
    files: &FileStore,
    saved: &mut Vec<String>,
) -> Result<Staged> {
    let id = match write.id {
        Some(id) => {
            update_ticket_in(tx, id, write.draft, write.now)?;
            id
        }
        None => insert_ticket(tx, write.draft, write.now)?,
    };

    let mut errors = Vec::new();
    let mut removed: Vec<String> = Vec::new();
    let batch = write.attachments;

    for edit in &batch.edits {
        let changed = tx
            .execute(
                "UPDATE attachments SET new_filename = ?1, description = ?2, updated_at = ?3
                 WHERE id = ?4 AND ticket_id = ?5",
                params![edit.new_filename, edit.description, write.now, edit.id, id],
            )
            .context("Failed to update attachment")?;
        if changed == 0 {
            errors.push(format!("Attachment {} does not belong to this ticket", edit.id));
        }
    }

    for upload in &batch.uploads {
        match files.save(id, upload) {
            Ok(stored) => {
                saved.push(stored.file_path.clone());
                insert_attachment_in(tx, id, write.actor_id, &stored, write.now)?;
            }
            Err(e) => {
                warn!(ticket_id = id, file = %upload.original_filename, "attachment rejected: {}", e);
                errors.push(e.to_string());
            }
        }
    }

    if errors.is_empty() {
        for attachment_id in &batch.delete_ids {
            let path: Option<String> = tx
                .query_row(
                    "SELECT file_path FROM attachments WHERE id = ?1 AND ticket_id = ?2",
                    params![attachment_id, id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up attachment for deletion")?;
            match path {
                Some(path) => {
                    tx.execute("DELETE FROM attachments WHERE id = ?1", params![attachment_id])
                        .context("Failed to delete attachment")?;
                    removed.push(path);
                }
                None => errors.push(format!(
                    "Attachment {} does not belong to this ticket",
                    attachment_id
                )),
            }
        }
    }

    let tag_ids = sync_ticket_tags_in(tx, id, write.draft.category_id, write.tag_ids)?;
    delete_orphan_tags_in(tx)?;

    Ok(Staged {
        id,
        errors,
        removed,
        tag_ids,
    })
}

impl HelpdeskDb {
    /// Insert a ticket row without attachments or tags.
    pub fn create_ticket(&self, draft: &TicketDraft, now: NaiveDateTime) -> Result<Ticket> {
        let id = insert_ticket(&self.conn, draft, now)?;
        self.get_ticket(id)?.context("Ticket not found after insert")
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        get_ticket_in(&self.conn, id)
    }

    /// Overwrite every mutable column of a ticket.
    pub fn update_ticket(&self, id: i64, draft: &TicketDraft, now: NaiveDateTime) -> Result<Ticket> {
        update_ticket_in(&self.conn, id, draft, now)?;
        self.get_ticket(id)?.context("Ticket not found after update")
    }

    /// Rewrite a ticket and append an audit comment in one transaction.
    pub fn update_ticket_with_comment(
        &self,
        id: i64,
        draft: &TicketDraft,
        comment: &NewComment,
        now: NaiveDateTime,
    ) -> Result<(Ticket, Comment)> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin ticket transition")?;
        update_ticket_in(&tx, id, draft, now)?;
        let comment = insert_comment_in(&tx, id, comment, now)?;
        tx.commit().context("Failed to commit ticket transition")?;
        let ticket = self.get_ticket(id)?.context("Ticket not found after update")?;
        Ok((ticket, comment))
    }

    /// Save a ticket row, its attachments and its tags in one transaction.
    ///
    /// Attachment failures are collected rather than aborting: the ticket
    /// row and whatever attachment work succeeded are still committed.
    /// Checked deletions only run when every other attachment step succeeded.
    pub fn persist_ticket(&self, write: TicketWrite<'_>, files: &FileStore) -> Result<WriteOutcome> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin ticket transaction")?;

        let mut saved = Vec::new();
        let staged = stage_ticket_in(&tx, &write, files, &mut saved)
            .and_then(|staged| tx.commit().context("Failed to commit ticket").map(|()| staged));
        let Staged {
            id,
            mut errors,
            removed,
            tag_ids,
        } = match staged {
            Ok(staged) => staged,
            Err(e) => {
                // Rolled back: files written for this save have no row.
                for path in &saved {
                    if let Err(err) = files.remove(path) {
                        warn!(path = %path, "failed to discard attachment: {}", err);
                    }
                }
                return Err(e);
            }
        };

        for path in removed {
            if let Err(e) = files.remove(&path) {
                errors.push(e.to_string());
            }
        }

        let ticket = self.get_ticket(id)?.context("Ticket not found after save")?;
        Ok(WriteOutcome {
            ticket,
            attachment_errors: errors,
            tag_ids,
        })
    }

    /// Delete a ticket and sweep orphan tags. Returns the file paths of the
    /// ticket's attachments so the caller can remove them, or `None` when
    /// the ticket does not exist.
    pub fn delete_ticket(&self, id: i64) -> Result<Option<Vec<String>>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin delete transaction")?;
        let mut stmt = tx
            .prepare("SELECT file_path FROM attachments WHERE ticket_id = ?1")
            .context("Failed to prepare attachment path query")?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .context("Failed to query attachment paths")?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row.context("Failed to read attachment path")?);
        }
        drop(stmt);

        let deleted = tx
            .execute("DELETE FROM tickets WHERE id = ?1", params![id])
            .context("Failed to delete ticket")?;
        if deleted == 0 {
            return Ok(None);
        }
        delete_orphan_tags_in(&tx)?;
        tx.commit().context("Failed to commit ticket deletion")?;
        Ok(Some(paths))
    }

    /// Category agent with the fewest open tickets; ties go to the lowest id.
    pub fn auto_select_agent(&self, category_id: i64) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT ca.user_id
                 FROM category_agents ca
                 LEFT JOIN tickets t ON t.agent_id = ca.user_id AND t.completed_at IS NULL
                 WHERE ca.category_id = ?1
                 GROUP BY ca.user_id
                 ORDER BY COUNT(t.id), ca.user_id
                 LIMIT 1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to auto-select agent")
    }

    /// Category of the user's most recently created ticket.
    pub fn latest_ticket_category(&self, user_id: i64) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT category_id FROM tickets WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query latest ticket category")
    }

    /// (created_at, completed_at) of tickets completed within [from, to].
    pub fn completed_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        category_id: Option<i64>,
    ) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT created_at, completed_at FROM tickets
                 WHERE completed_at BETWEEN ?1 AND ?2
                   AND (?3 IS NULL OR category_id = ?3)",
            )
            .context("Failed to prepare completed_between")?;
        let rows = stmt
            .query_map(params![from, to, category_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .context("Failed to query completed tickets")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read completed ticket row")?);
        }
        Ok(out)
    }
}

fn insert_ticket(conn: &Connection, d: &TicketDraft, now: NaiveDateTime) -> Result<i64> {
    conn.execute(
        "INSERT INTO tickets (subject, content, html, intervention, intervention_html,
             status_id, priority_id, category_id, user_id, creator_id, agent_id,
             start_date, limit_date, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            d.subject,
            d.content,
            d.html,
            d.intervention,
            d.intervention_html,
            d.status_id,
            d.priority_id,
            d.category_id,
            d.user_id,
            d.creator_id,
            d.agent_id,
            d.start_date,
            d.limit_date,
            d.completed_at,
            now,
        ],
    )
    .context("Failed to insert ticket")?;
    Ok(conn.last_insert_rowid())
}

fn update_ticket_in(conn: &Connection, id: i64, d: &TicketDraft, now: NaiveDateTime) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE tickets SET subject = ?1, content = ?2, html = ?3, intervention = ?4,
                 intervention_html = ?5, status_id = ?6, priority_id = ?7, category_id = ?8,
                 user_id = ?9, agent_id = ?10, start_date = ?11, limit_date = ?12,
                 completed_at = ?13, updated_at = ?14
             WHERE id = ?15",
            params![
                d.subject,
                d.content,
                d.html,
                d.intervention,
                d.intervention_html,
                d.status_id,
                d.priority_id,
                d.category_id,
                d.user_id,
                d.agent_id,
                d.start_date,
                d.limit_date,
                d.completed_at,
                now,
                id,
            ],
        )
        .context("Failed to update ticket")?;
    if changed == 0 {
        return Err(crate::errors::HelpdeskError::TicketNotFound { id }.into());
    }
    Ok(())
}

fn get_ticket_in(conn: &Connection, id: i64) -> Result<Option<Ticket>> {
    let sql = format!("SELECT {} FROM tickets t WHERE t.id = ?1", TICKET_COLUMNS);
    conn.query_row(&sql, params![id], |row| {
        Ok(Ticket {
            id: row.get(0)?,
            subject: row.get(1)?,
            content: row.get(2)?,
            html: row.get(3)?,
            intervention: row.get(4)?,
            intervention_html: row.get(5)?,
            status_id: row.get(6)?,
            priority_id: row.get(7)?,
            category_id: row.get(8)?,
            user_id: row.get(9)?,
            creator_id: row.get(10)?,
            agent_id: row.get(11)?,
            start_date: row.get(12)?,
            limit_date: row.get(13)?,
            completed_at: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    })
    .optional()
    .context("Failed to query ticket")
}

fn insert_attachment_in(
    conn: &Connection,
    ticket_id: i64,
    uploaded_by_id: i64,
    stored: &StoredFile,
    now: NaiveDateTime,
) -> Result<()> {
    conn.execute(
        "INSERT INTO attachments (ticket_id, uploaded_by_id, original_filename, new_filename,
             description, file_path, mimetype, bytes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            ticket_id,
            uploaded_by_id,
            stored.original_filename,
            stored.new_filename,
            stored.description,
            stored.file_path,
            stored.mimetype,
            stored.bytes,
            now,
        ],
    )
    .context("Failed to insert attachment")?;
    Ok(())
}
