use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Admin => "admin",
        }
    }

    /// Global permission level: 1 user, 2 agent, 3 admin.
    pub fn level(&self) -> u8 {
        match self {
            Self::User => 1,
            Self::Agent => 2,
            Self::Admin => 3,
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_agent(&self) -> bool {
        self.role == Role::Agent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Department {
    pub id: i64,
    pub department: String,
    pub sub1: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// A category with its assigned agents, used by the quick-change controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryAgents {
    pub category: Category,
    pub agents: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Priority {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub magnitude: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosingReason {
    pub id: i64,
    pub category_id: i64,
    pub text: String,
    pub status_id: i64,
    pub ordering: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub bg_color: String,
    pub text_color: String,
}

/// Tags available in one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTags {
    pub category_id: i64,
    pub category_name: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub subject: String,
    pub content: String,
    pub html: String,
    pub intervention: String,
    pub intervention_html: String,
    pub status_id: i64,
    pub priority_id: i64,
    pub category_id: i64,
    pub user_id: i64,
    pub creator_id: i64,
    pub agent_id: Option<i64>,
    pub start_date: NaiveDateTime,
    pub limit_date: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Ticket {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// "#12 Printer on fire", used in flash messages.
    pub fn label(&self) -> String {
        format!("#{} {}", self.id, self.subject)
    }
}

/// Field values for inserting or rewriting a ticket row.
#[derive(Debug, Clone)]
pub struct TicketDraft {
    pub subject: String,
    pub content: String,
    pub html: String,
    pub intervention: String,
    pub intervention_html: String,
    pub status_id: i64,
    pub priority_id: i64,
    pub category_id: i64,
    pub user_id: i64,
    pub creator_id: i64,
    pub agent_id: Option<i64>,
    pub start_date: NaiveDateTime,
    pub limit_date: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<&Ticket> for TicketDraft {
    fn from(t: &Ticket) -> Self {
        Self {
            subject: t.subject.clone(),
            content: t.content.clone(),
            html: t.html.clone(),
            intervention: t.intervention.clone(),
            intervention_html: t.intervention_html.clone(),
            status_id: t.status_id,
            priority_id: t.priority_id,
            category_id: t.category_id,
            user_id: t.user_id,
            creator_id: t.creator_id,
            agent_id: t.agent_id,
            start_date: t.start_date,
            limit_date: t.limit_date,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommentType {
    Reply,
    Note,
    Complete,
    Reopen,
}

impl CommentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Note => "note",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
        }
    }
}

impl FromStr for CommentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reply" => Ok(Self::Reply),
            "note" => Ok(Self::Note),
            "complete" => Ok(Self::Complete),
            "reopen" => Ok(Self::Reopen),
            _ => Err(format!("Invalid comment type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub comment_type: CommentType,
    pub content: String,
    pub html: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: i64,
    pub ticket_id: i64,
    pub uploaded_by_id: i64,
    pub original_filename: String,
    /// Display name used for downloads.
    pub new_filename: String,
    pub description: String,
    pub file_path: String,
    pub mimetype: String,
    pub bytes: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Ticket list scope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketList {
    Active,
    Newest,
    Complete,
}

impl TicketList {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Newest => "newest",
            Self::Complete => "complete",
        }
    }
}

impl FromStr for TicketList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "newest" => Ok(Self::Newest),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid ticket list: {}", s)),
        }
    }
}

impl fmt::Display for TicketList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
