//! Closing performance: whole days from creation to completion, averaged
//! per category and calendar month.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::helpdesk::db::HelpdeskDb;
use crate::helpdesk::models::Ticket;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPerformance {
    /// "May 2024"
    pub month: String,
    /// Average days to close, one entry per category in report order.
    /// Months without completed tickets report 0.
    pub averages: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub categories: Vec<String>,
    pub months: Vec<MonthPerformance>,
}

/// Whole days the ticket took to close, `None` while it is open.
pub fn ticket_performance(ticket: &Ticket) -> Option<i64> {
    ticket
        .completed_at
        .map(|completed| (completed - ticket.created_at).num_days().abs())
}

/// Average closing time of tickets completed within `[from, to]`, or `None`
/// when there are none.
pub fn interval_performance(
    db: &HelpdeskDb,
    from: NaiveDateTime,
    to: NaiveDateTime,
    category_id: Option<i64>,
) -> Result<Option<f64>> {
    let rows = db.completed_between(from, to, category_id)?;
    if rows.is_empty() {
        return Ok(None);
    }
    let total: i64 = rows
        .iter()
        .map(|(created, completed)| (*completed - *created).num_days().abs())
        .sum();
    Ok(Some(total as f64 / rows.len() as f64))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// First and last second of the month `back` months before `now`'s month.
fn month_bounds(now: NaiveDateTime, back: u32) -> Result<(NaiveDate, NaiveDateTime, NaiveDateTime)> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.checked_sub_months(Months::new(back)))
        .context("Month out of range")?;
    let next = first
        .checked_add_months(Months::new(1))
        .context("Month out of range")?;
    let from = first.and_time(NaiveTime::MIN);
    let to = next.and_time(NaiveTime::MIN) - Duration::seconds(1);
    Ok((first, from, to))
}

/// Per-category averages for the current month and the `period` months
/// before it, oldest first.
pub fn monthly_performance(db: &HelpdeskDb, period: u32, now: NaiveDateTime) -> Result<PerformanceReport> {
    let categories = db.list_categories()?;
    let mut months = Vec::with_capacity(period as usize + 1);
    for back in (0..=period).rev() {
        let (first, from, to) = month_bounds(now, back)?;
        let mut averages = Vec::with_capacity(categories.len());
        for category in &categories {
            let avg = interval_performance(db, from, to, Some(category.id))?;
            averages.push(round1(avg.unwrap_or(0.0)));
        }
        months.push(MonthPerformance {
            month: first.format("%B %Y").to_string(),
            averages,
        });
    }
    Ok(PerformanceReport {
        categories: categories.into_iter().map(|c| c.name).collect(),
        months,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::db::fixtures::{draft, dt, fixture};
    use crate::helpdesk::models::TicketDraft;

    fn closed(d: &TicketDraft, completed: &str) -> TicketDraft {
        let mut d = d.clone();
        d.completed_at = Some(dt(completed));
        d
    }

    #[test]
    fn test_ticket_performance() -> Result<()> {
        let f = fixture();
        let base = draft(&f.owner, f.category.id, "Open");
        let open = f.db.create_ticket(&base, dt("2024-05-01 08:00:00"))?;
        assert_eq!(ticket_performance(&open), None);
        let done = f.db.create_ticket(
            &closed(&base, "2024-05-04 07:00:00"),
            dt("2024-05-01 08:00:00"),
        )?;
        // 2 days 23 hours
        assert_eq!(ticket_performance(&done), Some(2));
        Ok(())
    }

    #[test]
    fn test_interval_and_monthly() -> Result<()> {
        let f = fixture();
        let base = draft(&f.owner, f.category.id, "T");
        f.db.create_ticket(&closed(&base, "2024-05-03 08:00:00"), dt("2024-05-01 08:00:00"))?;
        f.db.create_ticket(&closed(&base, "2024-05-06 08:00:00"), dt("2024-05-01 08:00:00"))?;
        f.db.create_ticket(&closed(&base, "2024-04-11 08:00:00"), dt("2024-04-10 08:00:00"))?;

        let may = interval_performance(
            &f.db,
            dt("2024-05-01 00:00:00"),
            dt("2024-05-31 23:59:59"),
            Some(f.category.id),
        )?;
        assert_eq!(may, Some(3.5));
        assert_eq!(
            interval_performance(
                &f.db,
                dt("2024-05-01 00:00:00"),
                dt("2024-05-31 23:59:59"),
                Some(f.second_category.id)
            )?,
            None
        );

        let report = monthly_performance(&f.db, 2, dt("2024-05-20 12:00:00"))?;
        assert_eq!(report.categories, vec!["General", "Hardware"]);
        let labels: Vec<&str> = report.months.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(labels, vec!["March 2024", "April 2024", "May 2024"]);
        assert_eq!(report.months[0].averages, vec![0.0, 0.0]);
        assert_eq!(report.months[1].averages, vec![1.0, 0.0]);
        assert_eq!(report.months[2].averages, vec![3.5, 0.0]);
        Ok(())
    }

    #[test]
    fn test_month_bounds_cross_year() -> Result<()> {
        let (first, from, to) = month_bounds(dt("2024-01-15 10:00:00"), 1)?;
        assert_eq!(first, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(from, dt("2023-12-01 00:00:00"));
        assert_eq!(to, dt("2023-12-31 23:59:59"));
        Ok(())
    }
}
