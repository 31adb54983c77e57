//! Site configuration model
//!
//! The canonical in-memory shape of the published configuration document,
//! plus the migration pipeline that upgrades older stored shapes on load.
//!
//! # Layout
//!
//! - `document`: root aggregate and the settings/menu sections
//! - `priority`: per-region priority tables
//! - `page`: pages, structured-data schemas and editor drafts
//! - `defaults`: built-in first-run document and region defaults
//! - `migrate`: ordered, total, idempotent load-time migrations
//!
//! Unknown keys are kept in `extra` maps at every level so documents written
//! by newer tooling survive a load/save cycle untouched.

mod defaults;
mod document;
pub mod lenient;
pub mod migrate;
mod page;
mod priority;

pub use defaults::{bootstrap_document, default_priorities, home_page};
pub use document::{
    ConfigurationDocument, EntityKeyword, MenuItem, SettingsUpdate, ShareCount, SiteSettings,
    SocialSharing, Targeting, Theme, Wildcard, MENU_SECTIONS,
};
pub use migrate::{load_document, LoadedDocument};
pub use page::{generate_page_id, FaqItem, Page, PageDraft, Schemas, HOME_SLUG};
pub use priority::{
    guess_is_league, PriorityEntry, PriorityTable, PriorityUpdate, RankedEntry, FALLBACK_REGION,
    SUPPORTED_REGIONS,
};

use thiserror::Error;

/// Errors raised by in-memory document edits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("The home page cannot be deleted")]
    HomeDeletion,

    #[error("The home page slug cannot be changed")]
    HomeRename,

    #[error("Slug already in use: {0}")]
    DuplicateSlug(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("No page editor is open")]
    NoOpenEditor,

    #[error("Priority entry not found: {region}/{name}")]
    EntryNotFound { region: String, name: String },

    #[error("Priority entry already exists: {region}/{name}")]
    DuplicateEntry { region: String, name: String },

    #[error("Menu item {index} not found in section {section}")]
    MenuItemNotFound { section: String, index: usize },

    #[error("Entity keyword {0} not found")]
    EntityNotFound(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),
}
