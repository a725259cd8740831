use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::HelpdeskDb;
use crate::helpdesk::models::Attachment;

const ATTACHMENT_COLUMNS: &str = "id, ticket_id, uploaded_by_id, original_filename, new_filename,
     description, file_path, mimetype, bytes, created_at, updated_at";

fn read_attachment(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        uploaded_by_id: row.get(2)?,
        original_filename: row.get(3)?,
        new_filename: row.get(4)?,
        description: row.get(5)?,
        file_path: row.get(6)?,
        mimetype: row.get(7)?,
        bytes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl HelpdeskDb {
    pub fn get_attachment(&self, id: i64) -> Result<Option<Attachment>> {
        let sql = format!("SELECT {} FROM attachments WHERE id = ?1", ATTACHMENT_COLUMNS);
        self.conn
            .query_row(&sql, params![id], read_attachment)
            .optional()
            .context("Failed to query attachment")
    }

    /// Attachments of a ticket in upload order.
    pub fn ticket_attachments(&self, ticket_id: i64) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE ticket_id = ?1 ORDER BY id",
            ATTACHMENT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare ticket_attachments")?;
        let rows = stmt
            .query_map(params![ticket_id], read_attachment)
            .context("Failed to query ticket attachments")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read attachment row")?);
        }
        Ok(out)
    }
}
