//! Ticket form decoding.
//!
//! The create/edit form is posted as `multipart/form-data`. Field names
//! follow the browser conventions: `category_{id}_tags[]` for tag
//! checkboxes, `attachments[]` with parallel `attachment_new_filename[]`
//! and `attachment_description[]` lists for uploads, and
//! `attachment_{id}_new_filename` / `attachment_{id}_description` for edits
//! to files already stored.

use std::collections::{BTreeMap, HashMap};

use axum::extract::Multipart;
use serde::Deserialize;

use crate::errors::HelpdeskError;
use crate::helpdesk::attachments::{AttachmentBatch, AttachmentEdit, NewUpload};

#[derive(Debug, Clone, Default)]
pub struct TicketForm {
    pub subject: String,
    pub owner_id: Option<i64>,
    pub category_id: Option<i64>,
    pub content: String,
    pub intervention: String,
    pub status_id: Option<i64>,
    pub priority_id: Option<i64>,
    /// `"auto"` or a user id.
    pub agent_id: Option<String>,
    pub start_date: Option<String>,
    pub limit_date: Option<String>,
    pub complete: bool,
    /// Checked tag ids per category.
    pub tags: HashMap<i64, Vec<i64>>,
    pub attachments: AttachmentBatch,
}

impl TicketForm {
    /// Tag ids submitted for the given category.
    pub fn tags_for(&self, category_id: i64) -> &[i64] {
        self.tags.get(&category_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn parse_id(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Incremental builder fed one form field at a time.
#[derive(Debug, Default)]
pub struct TicketFormBuilder {
    form: TicketForm,
    upload_names: Vec<String>,
    upload_descriptions: Vec<String>,
    edits: BTreeMap<i64, AttachmentEdit>,
}

impl TicketFormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, name: &str, value: String) {
        let f = &mut self.form;
        match name {
            "subject" => f.subject = value,
            "owner_id" => f.owner_id = parse_id(&value),
            "category_id" => f.category_id = parse_id(&value),
            "content" => f.content = value,
            "intervention" => f.intervention = value,
            "status_id" => f.status_id = parse_id(&value),
            "priority_id" => f.priority_id = parse_id(&value),
            "agent_id" => f.agent_id = Some(value),
            "start_date" => f.start_date = Some(value),
            "limit_date" => f.limit_date = Some(value),
            "complete" => f.complete = value == "yes",
            "attachment_new_filename[]" => self.upload_names.push(value),
            "attachment_description[]" => self.upload_descriptions.push(value),
            "delete_files[]" => {
                if let Some(id) = parse_id(&value) {
                    f.attachments.delete_ids.push(id);
                }
            }
            other => self.indexed_field(other, value),
        }
    }

    fn indexed_field(&mut self, name: &str, value: String) {
        if let Some(category) = name
            .strip_prefix("category_")
            .and_then(|rest| rest.strip_suffix("_tags[]"))
            .and_then(parse_id)
        {
            if let Some(tag) = parse_id(&value) {
                self.form.tags.entry(category).or_default().push(tag);
            }
            return;
        }

        let Some(rest) = name.strip_prefix("attachment_") else {
            return;
        };
        let (id, is_name) = if let Some(id) = rest.strip_suffix("_new_filename").and_then(parse_id) {
            (id, true)
        } else if let Some(id) = rest.strip_suffix("_description").and_then(parse_id) {
            (id, false)
        } else {
            return;
        };
        let edit = self.edits.entry(id).or_insert_with(|| AttachmentEdit {
            id,
            new_filename: String::new(),
            description: String::new(),
        });
        if is_name {
            edit.new_filename = value.trim().to_string();
        } else {
            edit.description = value.trim().to_string();
        }
    }

    pub fn file(&mut self, name: &str, file_name: String, bytes: Vec<u8>) {
        if name == "attachments[]" && !file_name.is_empty() {
            self.form
                .attachments
                .uploads
                .push(NewUpload::new(file_name, bytes));
        }
    }

    pub fn finish(mut self) -> TicketForm {
        for (i, upload) in self.form.attachments.uploads.iter_mut().enumerate() {
            upload.new_filename = self.upload_names.get(i).cloned();
            if let Some(description) = self.upload_descriptions.get(i) {
                upload.description = description.clone();
            }
        }
        self.form.attachments.edits = self
            .edits
            .into_values()
            .filter(|e| !e.new_filename.is_empty())
            .collect();
        self.form
    }
}

pub async fn read_ticket_form(mut multipart: Multipart) -> Result<TicketForm, HelpdeskError> {
    let mut builder = TicketFormBuilder::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HelpdeskError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| HelpdeskError::BadRequest(e.to_string()))?;
                builder.file(&name, file_name, bytes.to_vec());
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| HelpdeskError::BadRequest(e.to_string()))?;
                builder.text(&name, value);
            }
        }
    }
    Ok(builder.finish())
}

/// `POST /tickets/{id}/complete` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteForm {
    pub status_id: Option<String>,
    pub reason_id: Option<String>,
    pub blank_intervention: Option<String>,
    #[serde(default)]
    pub clarification: String,
}

impl CompleteForm {
    pub fn status_id(&self) -> Option<i64> {
        self.status_id.as_deref().and_then(parse_id)
    }

    pub fn reason_id(&self) -> Option<i64> {
        self.reason_id.as_deref().and_then(parse_id)
    }
}

/// `POST /tickets/changeagent` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeAgentForm {
    pub ticket_id: i64,
    pub agent_id: i64,
}

/// `POST /tickets/changepriority` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePriorityForm {
    pub ticket_id: i64,
    pub priority_id: i64,
}
