use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::params_from_iter;

use super::HelpdeskDb;
use super::grid::{TicketScope, ts};

/// A scoped ticket due between the start of today and the end of the
/// month (or week, whichever is later).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingTicket {
    pub id: i64,
    pub limit_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy)]
enum CountColumn {
    Category,
    Agent,
}

impl CountColumn {
    fn sql(&self) -> &'static str {
        match self {
            Self::Category => "t.category_id",
            Self::Agent => "t.agent_id",
        }
    }
}

impl HelpdeskDb {
    pub fn count_scoped(&self, scope: &TicketScope) -> Result<i64> {
        let w = scope.where_clause();
        self.conn
            .query_row(
                &format!("SELECT COUNT(*) FROM tickets t{}", w.sql()),
                params_from_iter(w.params.iter()),
                |row| row.get(0),
            )
            .context("Failed to count scoped tickets")
    }

    pub fn upcoming_tickets(&self, scope: &TicketScope) -> Result<Vec<UpcomingTicket>> {
        let mut w = scope.where_clause();
        w.push(
            "t.limit_date >= ? AND t.limit_date < ?",
            [ts(scope.bounds.today_start), ts(scope.bounds.upcoming_end())],
        );
        let sql = format!("SELECT t.id, t.limit_date FROM tickets t{}", w.sql());
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare upcoming query")?;
        let rows = stmt
            .query_map(params_from_iter(w.params.iter()), |row| {
                Ok(UpcomingTicket {
                    id: row.get(0)?,
                    limit_date: row.get(1)?,
                })
            })
            .context("Failed to query upcoming tickets")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read upcoming ticket")?);
        }
        Ok(out)
    }

    /// Scoped ticket counts keyed by category id.
    pub fn count_by_category(&self, scope: &TicketScope) -> Result<HashMap<i64, i64>> {
        self.count_by(scope, CountColumn::Category)
    }

    /// Scoped ticket counts keyed by agent id; unassigned tickets are skipped.
    pub fn count_by_agent(&self, scope: &TicketScope) -> Result<HashMap<i64, i64>> {
        self.count_by(scope, CountColumn::Agent)
    }

    fn count_by(&self, scope: &TicketScope, column: CountColumn) -> Result<HashMap<i64, i64>> {
        let mut w = scope.where_clause();
        let col = column.sql();
        w.push(format!("{col} IS NOT NULL"), []);
        let sql = format!("SELECT {col}, COUNT(*) FROM tickets t{} GROUP BY {col}", w.sql());
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare grouped count")?;
        let rows = stmt
            .query_map(params_from_iter(w.params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .context("Failed to run grouped count")?;
        let mut out = HashMap::new();
        for row in rows {
            let (key, count) = row.context("Failed to read grouped count")?;
            out.insert(key, count);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{draft, dt, fixture};
    use super::*;
    use crate::helpdesk::calendar::{CalendarBounds, CalendarFilter};
    use crate::helpdesk::filters::FilterContext;
    use crate::helpdesk::models::TicketList;
    use crate::helpdesk::permissions::Visibility;

    fn admin_scope() -> TicketScope {
        TicketScope {
            list: TicketList::Active,
            visibility: Visibility::All,
            filters: FilterContext::default(),
            default_status_id: 1,
            bounds: CalendarBounds::at(dt("2024-05-15 09:00:00")),
        }
    }

    #[test]
    fn test_upcoming_and_expired() -> Result<()> {
        let f = fixture();
        let created = dt("2024-05-01 08:00:00");
        for (subject, limit) in [
            ("past", "2024-05-10 10:00:00"),
            ("thursday", "2024-05-16 10:00:00"),
            ("late may", "2024-05-29 10:00:00"),
            ("june", "2024-06-20 10:00:00"),
        ] {
            let mut d = draft(&f.owner, f.category.id, subject);
            d.limit_date = Some(dt(limit));
            f.db.create_ticket(&d, created)?;
        }

        let upcoming = f.db.upcoming_tickets(&admin_scope())?;
        assert_eq!(upcoming.len(), 2);

        let mut expired = admin_scope();
        expired.filters.calendar = Some(CalendarFilter::Expired);
        assert_eq!(f.db.count_scoped(&expired)?, 1);
        assert_eq!(f.db.count_scoped(&admin_scope())?, 4);
        Ok(())
    }

    #[test]
    fn test_grouped_counts() -> Result<()> {
        let f = fixture();
        let now = dt("2024-05-01 08:00:00");
        let mut assigned = draft(&f.owner, f.category.id, "a");
        assigned.agent_id = Some(f.agent.id);
        f.db.create_ticket(&assigned, now)?;
        f.db.create_ticket(&assigned, now)?;
        f.db.create_ticket(&draft(&f.owner, f.second_category.id, "b"), now)?;

        let by_category = f.db.count_by_category(&admin_scope())?;
        assert_eq!(by_category.get(&f.category.id), Some(&2));
        assert_eq!(by_category.get(&f.second_category.id), Some(&1));

        let by_agent = f.db.count_by_agent(&admin_scope())?;
        assert_eq!(by_agent.get(&f.agent.id), Some(&2));
        assert_eq!(by_agent.len(), 1);
        Ok(())
    }
}
