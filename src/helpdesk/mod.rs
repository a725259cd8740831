//! Helpdesk ticketing service.
//!
//! Layers, bottom up:
//!
//! | Module        | Responsibility                                              |
//! |---------------|-------------------------------------------------------------|
//! | `models`      | DTOs for tickets, comments, attachments, lookups            |
//! | `dialect`     | SQL fragments that differ between database engines          |
//! | `db`          | SQLite repository (`HelpdeskDb`) and the async `DbHandle`   |
//! | `cache`       | 60 s TTL caches for priority and status lists               |
//! | `permissions` | per-category levels, close/reopen checks, row visibility    |
//! | `filters`     | per-user filter context and flash messages                  |
//! | `calendar`    | due-date buckets and relative-time formatting               |
//! | `purify`      | whitelist HTML sanitizer producing text + html              |
//! | `validation`  | create/edit form rules and the error bag                    |
//! | `lang`        | injectable translations                                     |
//! | `render`      | per-column HTML fragments for grid rows                     |
//! | `datatables`  | grid widget request parsing and response shaping            |
//! | `attachments` | on-disk file store                                          |
//! | `workflow`    | store/update/complete/reopen/change/destroy transitions     |
//! | `dashboard`   | list view counts and filters                                |
//! | `stats`       | closing performance per category                            |
//! | `events`      | domain events published after commits                       |
//! | `form`        | multipart ticket form parsing                               |
//! | `views`       | ticket page and create/edit form read models                |
//! | `api`, `ws`, `server` | HTTP surface                                        |

pub mod api;
pub mod attachments;
pub mod cache;
pub mod calendar;
pub mod dashboard;
pub mod datatables;
pub mod db;
pub mod dialect;
pub mod events;
pub mod filters;
pub mod form;
pub mod lang;
pub mod models;
pub mod permissions;
pub mod purify;
pub mod render;
pub mod server;
pub mod stats;
pub mod validation;
pub mod views;
pub mod workflow;
pub mod ws;
