//! Injectable translations.
//!
//! Messages are looked up by key and support `:name` placeholders. The
//! built-in English table can be overridden per key from the `[locale.lang]`
//! configuration table.

use std::collections::HashMap;

use crate::helpdesk::calendar::Relative;

const DEFAULTS: &[(&str, &str)] = &[
    // validation
    ("validate.subject.required", "The subject is required"),
    ("validate.subject.min", "The subject must have at least 3 characters"),
    ("validate.owner", "Select an existing owner"),
    ("validate.category", "Select one of the allowed categories"),
    ("validate.content.required", "The description is required"),
    ("validate.content.min", "The description must have at least 6 characters"),
    ("validate.status", "Select an existing status"),
    ("validate.priority", "Select an existing priority"),
    ("validate.agent", "Select an existing agent or automatic assignment"),
    ("validate.start_date.format", "The start date must follow the format :format"),
    ("validate.limit_date.format", "The limit date must follow the format :format"),
    ("validate.limit_date.lower", "The limit date can't be earlier than the start date"),
    ("validate.intervention.required", "Describe the intervention before completing the ticket"),
    ("validate.reason.required", "Select a closing reason"),
    ("validate.reason.invalid", "The closing reason does not belong to this category"),
    // flash messages
    ("flash.created", "Ticket :ticket has been created"),
    ("flash.updated", "Ticket :ticket has been updated"),
    ("flash.deleted", "Ticket :ticket has been deleted"),
    ("flash.completed", "Ticket :ticket has been completed"),
    ("flash.reopened", "Ticket :ticket has been reopened"),
    ("flash.already_complete", "Ticket :ticket is already complete"),
    ("flash.not_complete", "Ticket :ticket is not complete"),
    ("flash.no_close_permission", "You are not allowed to complete ticket :ticket"),
    ("flash.no_reopen_permission", "You are not allowed to reopen ticket :ticket"),
    ("flash.agent_unchanged", "Ticket :ticket already has agent :agent"),
    ("flash.priority_unchanged", "Ticket :ticket already has priority :priority"),
    ("flash.agent_changed", "Ticket :ticket agent changed from :old to :new"),
    ("flash.priority_changed", "Ticket :ticket priority changed from :old to :new"),
    ("flash.no_agent", "no agent"),
    ("flash.forbidden", "You are not permitted to do this"),
    ("flash.blank_intervention", "Write the intervention before completing the ticket"),
    ("flash.bad_status", "The selected status does not exist"),
    ("flash.attachment_errors", "The ticket was saved but some attachments failed"),
    // audit lines
    ("audit.completed_by", "Completed by :user"),
    ("audit.reopened_by", "Reopened by :user"),
    ("audit.clarifications", "Closing clarifications"),
    ("comment.complete", "Ticket completed"),
    ("comment.reopen", "Ticket reopened"),
    // grid
    ("grid.auto_agent", "Auto"),
    ("grid.change_agent", "Change agent"),
    ("grid.change_priority", "Change priority"),
    ("grid.submit", "OK"),
    ("grid.attachments", ":count attachments"),
    ("grid.comments", ":total comments, :recent recent"),
    ("grid.created_by", "Created by :name"),
    ("grid.updated", "Updated :relative"),
    ("grid.calendar.expired", "Expired :date"),
    ("grid.calendar.today", "Today :time"),
    ("grid.calendar.tomorrow", "Tomorrow :time"),
    ("grid.calendar.week", ":weekday :time"),
    ("grid.calendar.later", ":date"),
    ("grid.calendar.scheduled", "Starts :date"),
    ("grid.calendar.no_limit", "No limit"),
    ("relative.past", ":amount :unit ago"),
    ("relative.future", "in :amount :unit"),
    ("unit.second", "second"),
    ("unit.seconds", "seconds"),
    ("unit.minute", "minute"),
    ("unit.minutes", "minutes"),
    ("unit.hour", "hour"),
    ("unit.hours", "hours"),
    ("unit.day", "day"),
    ("unit.days", "days"),
    ("unit.week", "week"),
    ("unit.weeks", "weeks"),
    ("unit.month", "month"),
    ("unit.months", "months"),
    ("unit.year", "year"),
    ("unit.years", "years"),
];

#[derive(Debug, Clone)]
pub struct Translator {
    messages: HashMap<String, String>,
}

impl Translator {
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        let mut messages: HashMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        messages.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { messages }
    }

    /// Message for `key`, or the key itself when unknown.
    pub fn t(&self, key: &str) -> String {
        self.messages
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Message with `:name` placeholders replaced. Longer names are
    /// substituted first so `:ticket_id` is not clobbered by `:ticket`.
    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut out = self.t(key);
        let mut sorted: Vec<&(&str, &str)> = args.iter().collect();
        sorted.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));
        for (name, value) in sorted {
            out = out.replace(&format!(":{}", name), value);
        }
        out
    }

    pub fn relative(&self, r: &Relative) -> String {
        let unit_key = if r.amount == 1 {
            format!("unit.{}", r.unit.key())
        } else {
            format!("unit.{}s", r.unit.key())
        };
        let unit = self.t(&unit_key);
        let amount = r.amount.to_string();
        let key = if r.future { "relative.future" } else { "relative.past" };
        self.t_with(key, &[("amount", &amount), ("unit", &unit)])
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpdesk::calendar::TimeUnit;

    #[test]
    fn test_placeholders() {
        let t = Translator::default();
        assert_eq!(
            t.t_with("flash.completed", &[("ticket", "#4 Printer")]),
            "Ticket #4 Printer has been completed"
        );
        assert_eq!(t.t("missing.key"), "missing.key");
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("grid.auto_agent".to_string(), "Automático".to_string());
        let t = Translator::new(&overrides);
        assert_eq!(t.t("grid.auto_agent"), "Automático");
        assert_eq!(t.t("grid.submit"), "OK");
    }

    #[test]
    fn test_relative() {
        let t = Translator::default();
        let r = Relative {
            amount: 1,
            unit: TimeUnit::Hour,
            future: false,
        };
        assert_eq!(t.relative(&r), "1 hour ago");
        let r = Relative {
            amount: 3,
            unit: TimeUnit::Day,
            future: true,
        };
        assert_eq!(t.relative(&r), "in 3 days");
    }
}
