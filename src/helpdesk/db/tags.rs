use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use super::HelpdeskDb;
use crate::helpdesk::models::{CategoryTags, Tag};

fn read_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        bg_color: row.get(2)?,
        text_color: row.get(3)?,
    })
}

fn collect_ids(conn: &Connection, sql: &str, id: i64) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare tag id query")?;
    let rows = stmt
        .query_map(params![id], |row| row.get::<_, i64>(0))
        .context("Failed to query tag ids")?;
    let mut out = BTreeSet::new();
    for row in rows {
        out.insert(row.context("Failed to read tag id")?);
    }
    Ok(out)
}

/// Replace a ticket's tags with `submitted`, keeping only ids that are valid
/// for `category_id` or already sit on the ticket without any category.
/// Returns the resulting tag ids in ascending order.
pub(super) fn sync_ticket_tags_in(
    conn: &Connection,
    ticket_id: i64,
    category_id: i64,
    submitted: &[i64],
) -> Result<Vec<i64>> {
    let mut allowed = collect_ids(
        conn,
        "SELECT tag_id FROM category_tags WHERE category_id = ?1",
        category_id,
    )?;
    allowed.extend(collect_ids(
        conn,
        "SELECT tt.tag_id FROM ticket_tags tt
         WHERE tt.ticket_id = ?1
           AND NOT EXISTS (SELECT 1 FROM category_tags ct WHERE ct.tag_id = tt.tag_id)",
        ticket_id,
    )?);

    let wanted: BTreeSet<i64> = submitted
        .iter()
        .copied()
        .filter(|id| allowed.contains(id))
        .collect();
    let current = collect_ids(
        conn,
        "SELECT tag_id FROM ticket_tags WHERE ticket_id = ?1",
        ticket_id,
    )?;

    for removed in current.difference(&wanted) {
        conn.execute(
            "DELETE FROM ticket_tags WHERE ticket_id = ?1 AND tag_id = ?2",
            params![ticket_id, removed],
        )
        .context("Failed to detach tag")?;
    }
    for added in wanted.difference(&current) {
        conn.execute(
            "INSERT INTO ticket_tags (ticket_id, tag_id) VALUES (?1, ?2)",
            params![ticket_id, added],
        )
        .context("Failed to attach tag")?;
    }

    Ok(wanted.into_iter().collect())
}

/// Delete every tag that has neither a category nor a ticket.
pub(super) fn delete_orphan_tags_in(conn: &Connection) -> Result<usize> {
    let deleted = conn
        .execute(
            "DELETE FROM tags
             WHERE NOT EXISTS (SELECT 1 FROM category_tags ct WHERE ct.tag_id = tags.id)
               AND NOT EXISTS (SELECT 1 FROM ticket_tags tt WHERE tt.tag_id = tags.id)",
            [],
        )
        .context("Failed to delete orphan tags")?;
    if deleted > 0 {
        debug!(deleted, "removed orphan tags");
    }
    Ok(deleted)
}

impl HelpdeskDb {
    pub fn create_tag(&self, name: &str, bg_color: &str, text_color: &str) -> Result<Tag> {
        self.conn
            .execute(
                "INSERT INTO tags (name, bg_color, text_color) VALUES (?1, ?2, ?3)",
                params![name, bg_color, text_color],
            )
            .context("Failed to insert tag")?;
        Ok(Tag {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            bg_color: bg_color.to_string(),
            text_color: text_color.to_string(),
        })
    }

    pub fn attach_category_tag(&self, category_id: i64, tag_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO category_tags (category_id, tag_id) VALUES (?1, ?2)",
                params![category_id, tag_id],
            )
            .context("Failed to attach tag to category")?;
        Ok(())
    }

    pub fn detach_category_tag(&self, category_id: i64, tag_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM category_tags WHERE category_id = ?1 AND tag_id = ?2",
                params![category_id, tag_id],
            )
            .context("Failed to detach tag from category")?;
        Ok(())
    }

    pub fn category_tags(&self, category_id: i64) -> Result<Vec<Tag>> {
        self.query_tags(
            "SELECT t.id, t.name, t.bg_color, t.text_color
             FROM tags t JOIN category_tags ct ON ct.tag_id = t.id
             WHERE ct.category_id = ?1 ORDER BY t.name",
            category_id,
        )
    }

    pub fn ticket_tags(&self, ticket_id: i64) -> Result<Vec<Tag>> {
        self.query_tags(
            "SELECT t.id, t.name, t.bg_color, t.text_color
             FROM tags t JOIN ticket_tags tt ON tt.tag_id = t.id
             WHERE tt.ticket_id = ?1 ORDER BY t.name",
            ticket_id,
        )
    }

    /// Tags grouped by category, for the ticket form.
    pub fn category_tag_lists(&self) -> Result<Vec<CategoryTags>> {
        let mut out = Vec::new();
        for category in self.list_categories()? {
            let tags = self.category_tags(category.id)?;
            out.push(CategoryTags {
                category_id: category.id,
                category_name: category.name,
                tags,
            });
        }
        Ok(out)
    }

    pub fn sync_ticket_tags(
        &self,
        ticket_id: i64,
        category_id: i64,
        submitted: &[i64],
    ) -> Result<Vec<i64>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin tag sync")?;
        let ids = sync_ticket_tags_in(&tx, ticket_id, category_id, submitted)?;
        delete_orphan_tags_in(&tx)?;
        tx.commit().context("Failed to commit tag sync")?;
        Ok(ids)
    }

    fn query_tags(&self, sql: &str, id: i64) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare tag query")?;
        let rows = stmt
            .query_map(params![id], read_tag)
            .context("Failed to query tags")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read tag row")?);
        }
        Ok(out)
    }
}
