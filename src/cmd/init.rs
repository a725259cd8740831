//! Database initialization command (`panichd init`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use panichd::helpdesk::db::HelpdeskDb;

pub fn cmd_init(
    config_path: &Path,
    db_path: Option<PathBuf>,
    seed: bool,
    admin_email: &str,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let db_path = db_path.unwrap_or(config.server.db_path);

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = HelpdeskDb::new(&db_path)?;
    println!("Helpdesk database initialized at {}", db_path.display());

    if seed {
        if db.seed_defaults(admin_email)? {
            println!("Seeded default lookups and admin user {}", admin_email);
        } else {
            println!("Database already seeded, skipping");
        }
    }
    Ok(())
}
