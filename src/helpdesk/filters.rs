//! Per-user list filters and one-shot flash messages.
//!
//! Both stores are process-local and keyed by user id.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::errors::HelpdeskError;
use crate::helpdesk::calendar::CalendarFilter;

/// Selection that narrows list queries and dashboard counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterContext {
    pub category: Option<i64>,
    pub agent: Option<i64>,
    /// Ticket owner (`user_id`).
    pub owner: Option<i64>,
    pub calendar: Option<CalendarFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Category,
    Agent,
    Owner,
    Calendar,
}

impl FromStr for FilterKind {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(Self::Category),
            "agent" => Ok(Self::Agent),
            "owner" => Ok(Self::Owner),
            "calendar" => Ok(Self::Calendar),
            _ => Err(HelpdeskError::BadRequest(format!("Unknown filter: {}", s))),
        }
    }
}

impl FilterContext {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set a filter from its URL value; `"remove"` clears it.
    pub fn apply(&mut self, kind: FilterKind, value: &str) -> Result<(), HelpdeskError> {
        if value == "remove" {
            self.clear(kind);
            return Ok(());
        }
        let id = || {
            value
                .parse::<i64>()
                .map_err(|_| HelpdeskError::BadRequest(format!("Invalid filter value: {}", value)))
        };
        match kind {
            FilterKind::Category => self.category = Some(id()?),
            FilterKind::Agent => self.agent = Some(id()?),
            FilterKind::Owner => self.owner = Some(id()?),
            FilterKind::Calendar => {
                self.calendar = Some(value.parse().map_err(HelpdeskError::BadRequest)?)
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, kind: FilterKind) {
        match kind {
            FilterKind::Category => self.category = None,
            FilterKind::Agent => self.agent = None,
            FilterKind::Owner => self.owner = None,
            FilterKind::Calendar => self.calendar = None,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct FilterStore {
    inner: Mutex<HashMap<i64, FilterContext>>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64) -> FilterContext {
        lock(&self.inner).get(&user_id).copied().unwrap_or_default()
    }

    pub fn apply(&self, user_id: i64, kind: FilterKind, value: &str) -> Result<FilterContext, HelpdeskError> {
        let mut map = lock(&self.inner);
        let ctx = map.entry(user_id).or_default();
        ctx.apply(kind, value)?;
        Ok(*ctx)
    }

    pub fn clear(&self, user_id: i64, kind: FilterKind) {
        if let Some(ctx) = lock(&self.inner).get_mut(&user_id) {
            ctx.clear(kind);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct FlashStore {
    inner: Mutex<HashMap<i64, Vec<Flash>>>,
}

impl FlashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, user_id: i64, level: FlashLevel, message: impl Into<String>) {
        lock(&self.inner).entry(user_id).or_default().push(Flash {
            level,
            message: message.into(),
        });
    }

    /// Remove and return everything queued for the user.
    pub fn drain(&self, user_id: i64) -> Vec<Flash> {
        lock(&self.inner).remove(&user_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_remove_filters() {
        let store = FilterStore::new();
        store.apply(7, FilterKind::Category, "3").unwrap();
        store.apply(7, FilterKind::Calendar, "week").unwrap();
        let ctx = store.get(7);
        assert_eq!(ctx.category, Some(3));
        assert_eq!(ctx.calendar, Some(CalendarFilter::Week));

        store.apply(7, FilterKind::Category, "remove").unwrap();
        assert_eq!(store.get(7).category, None);
        assert!(store.get(8).is_empty());
    }

    #[test]
    fn test_invalid_filter_values() {
        let mut ctx = FilterContext::default();
        assert!(ctx.apply(FilterKind::Agent, "abc").is_err());
        assert!(ctx.apply(FilterKind::Calendar, "someday").is_err());
        assert!("colour".parse::<FilterKind>().is_err());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_flash_drain_is_one_shot() {
        let flashes = FlashStore::new();
        flashes.push(1, FlashLevel::Success, "Saved");
        flashes.push(1, FlashLevel::Warning, "Careful");
        let drained = flashes.drain(1);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].level, FlashLevel::Warning);
        assert!(flashes.drain(1).is_empty());
    }
}
