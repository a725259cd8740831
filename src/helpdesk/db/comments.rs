use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, params};

use super::HelpdeskDb;
use crate::helpdesk::models::{Comment, CommentType};

struct CommentRow {
    id: i64,
    ticket_id: i64,
    user_id: i64,
    comment_type: String,
    content: String,
    html: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl CommentRow {
    fn into_comment(self) -> Result<Comment> {
        let comment_type = self
            .comment_type
            .parse::<CommentType>()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(Comment {
            id: self.id,
            ticket_id: self.ticket_id,
            user_id: self.user_id,
            comment_type,
            content: self.content,
            html: self.html,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A comment to append alongside a ticket transition.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: i64,
    pub comment_type: CommentType,
    pub content: String,
    pub html: String,
}

pub(super) fn insert_comment_in(
    conn: &Connection,
    ticket_id: i64,
    c: &NewComment,
    now: NaiveDateTime,
) -> Result<Comment> {
    conn.execute(
        "INSERT INTO comments (ticket_id, user_id, type, content, html, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![ticket_id, c.user_id, c.comment_type.as_str(), c.content, c.html, now],
    )
    .context("Failed to insert comment")?;
    Ok(Comment {
        id: conn.last_insert_rowid(),
        ticket_id,
        user_id: c.user_id,
        comment_type: c.comment_type,
        content: c.content.clone(),
        html: c.html.clone(),
        created_at: now,
        updated_at: now,
    })
}

impl HelpdeskDb {
    pub fn add_comment(
        &self,
        ticket_id: i64,
        user_id: i64,
        comment_type: CommentType,
        content: &str,
        html: &str,
        now: NaiveDateTime,
    ) -> Result<Comment> {
        let comment = NewComment {
            user_id,
            comment_type,
            content: content.to_string(),
            html: html.to_string(),
        };
        insert_comment_in(&self.conn, ticket_id, &comment, now)
    }

    /// One page of a ticket's comments, newest first, plus the total count.
    /// `page` is 1-based.
    pub fn list_comments(
        &self,
        ticket_id: i64,
        include_notes: bool,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<Comment>, i64)> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM comments WHERE ticket_id = ?1 AND (?2 OR type != 'note')",
                params![ticket_id, include_notes],
                |row| row.get(0),
            )
            .context("Failed to count comments")?;

        let offset = i64::try_from(page.saturating_sub(1).saturating_mul(per_page)).unwrap_or(i64::MAX);
        let limit = i64::try_from(per_page).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, user_id, type, content, html, created_at, updated_at
                 FROM comments WHERE ticket_id = ?1 AND (?2 OR type != 'note')
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
            )
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(
                params![ticket_id, include_notes, limit, offset],
                |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        ticket_id: row.get(1)?,
                        user_id: row.get(2)?,
                        comment_type: row.get(3)?,
                        content: row.get(4)?,
                        html: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .context("Failed to query comments")?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row.context("Failed to read comment row")?.into_comment()?);
        }
        Ok((comments, total))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{draft, dt, fixture};
    use super::*;

    #[test]
    fn test_comments_paginate_newest_first() -> Result<()> {
        let f = fixture();
        let t = f
            .db
            .create_ticket(&draft(&f.owner, f.category.id, "Chat"), dt("2024-05-01 08:00:00"))?;
        for hour in 10..13 {
            f.db.add_comment(
                t.id,
                f.agent.id,
                CommentType::Reply,
                &format!("reply {}", hour),
                "",
                dt(&format!("2024-05-01 {}:00:00", hour)),
            )?;
        }

        let (first, total) = f.db.list_comments(t.id, true, 1, 2)?;
        assert_eq!(total, 3);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].content, "reply 12");
        let (second, _) = f.db.list_comments(t.id, true, 2, 2)?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].content, "reply 10");
        Ok(())
    }

    #[test]
    fn test_notes_hidden_when_excluded() -> Result<()> {
        let f = fixture();
        let t = f
            .db
            .create_ticket(&draft(&f.owner, f.category.id, "Notes"), dt("2024-05-01 08:00:00"))?;
        let now = dt("2024-05-01 09:00:00");
        f.db.add_comment(t.id, f.agent.id, CommentType::Note, "internal", "", now)?;
        f.db.add_comment(t.id, f.agent.id, CommentType::Reply, "public", "", now)?;

        let (visible, total) = f.db.list_comments(t.id, false, 1, 10)?;
        assert_eq!(total, 1);
        assert_eq!(visible[0].comment_type, CommentType::Reply);
        assert_eq!(f.db.list_comments(t.id, true, 1, 10)?.1, 2);
        Ok(())
    }

    #[test]
    fn test_page_far_past_the_end_is_empty() -> Result<()> {
        let f = fixture();
        let t = f
            .db
            .create_ticket(&draft(&f.owner, f.category.id, "Chat"), dt("2024-05-01 08:00:00"))?;
        f.db.add_comment(t.id, f.owner.id, CommentType::Reply, "hi", "<p>hi</p>", dt("2024-05-01 09:00:00"))?;
        let (items, total) = f.db.list_comments(t.id, true, usize::MAX, 10)?;
        assert!(items.is_empty());
        assert_eq!(total, 1);
        Ok(())
    }
}
