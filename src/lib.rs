pub mod config;
pub mod errors;
pub mod helpdesk;
pub mod logging;
