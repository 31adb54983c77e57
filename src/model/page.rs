//! Pages, structured-data schemas and editor drafts

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::ConfigurationDocument;
use super::lenient;
use super::ModelError;

/// Slug of the page that always exists and cannot be renamed
pub const HOME_SLUG: &str = "home";

const NEW_PAGE_SLUG: &str = "new-page";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub slug: String,
    #[serde(default = "default_layout", deserialize_with = "lenient::string")]
    pub layout: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub meta_title: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub meta_desc: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub meta_keywords: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub canonical_url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(default)]
    pub schemas: Schemas,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_layout() -> String {
    "page".to_string()
}

impl Page {
    pub fn is_home(&self) -> bool {
        self.slug == HOME_SLUG
    }
}

/// Structured-data features, each independently enabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schemas {
    /// Organization
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub org: bool,
    /// EventLive badge
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub live: bool,
    /// ItemList of upcoming matches
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub schedule: bool,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub faq: bool,
    #[serde(default)]
    pub faq_list: Vec<FaqItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub question: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub answer: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Uncommitted editor state for one page
///
/// Every field is optional so the UI can send only what changed; `merge`
/// folds successive edits together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Schemas>,
}

impl PageDraft {
    /// Draft holding a page's current editable values
    pub fn from_page(page: &Page) -> Self {
        Self {
            title: Some(page.title.clone()),
            slug: Some(page.slug.clone()),
            layout: Some(page.layout.clone()),
            meta_title: Some(page.meta_title.clone()),
            meta_desc: Some(page.meta_desc.clone()),
            meta_keywords: Some(page.meta_keywords.clone()),
            canonical_url: Some(page.canonical_url.clone()),
            content: Some(page.content.clone()),
            schemas: Some(page.schemas.clone()),
        }
    }

    /// Overlay the fields set in `newer`
    pub fn merge(&mut self, newer: PageDraft) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if newer.$field.is_some() { self.$field = newer.$field; })*
            };
        }
        overlay!(title, slug, layout, meta_title, meta_desc, meta_keywords, canonical_url, content, schemas);
    }
}

/// Generate a page id (`p_` followed by nine hex characters)
pub fn generate_page_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("p_{}", &raw[..9])
}

impl ConfigurationDocument {
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn home_page(&self) -> Option<&Page> {
        self.pages.iter().find(|p| p.is_home())
    }

    /// Append a blank page with a unique id and slug
    pub fn create_page(&mut self) -> Page {
        let ids: HashSet<&str> = self.pages.iter().map(|p| p.id.as_str()).collect();
        let mut id = generate_page_id();
        while ids.contains(id.as_str()) {
            id = generate_page_id();
        }

        let slug = self.unused_slug(NEW_PAGE_SLUG);
        let page = Page {
            id,
            slug,
            layout: default_layout(),
            title: "New Page".to_string(),
            meta_title: String::new(),
            meta_desc: String::new(),
            meta_keywords: String::new(),
            canonical_url: String::new(),
            content: String::new(),
            schemas: Schemas {
                org: true,
                ..Default::default()
            },
            extra: Map::new(),
        };

        self.pages.push(page.clone());
        tracing::debug!(page_id = %page.id, slug = %page.slug, "Created page");
        page
    }

    /// Check a draft against the page it targets without applying it
    pub fn validate_draft(&self, id: &str, draft: &PageDraft) -> Result<(), ModelError> {
        let page = self
            .page(id)
            .ok_or_else(|| ModelError::PageNotFound(id.to_string()))?;

        let Some(slug) = draft.slug.as_deref().map(str::trim) else {
            return Ok(());
        };

        if page.is_home() {
            if slug != HOME_SLUG {
                return Err(ModelError::HomeRename);
            }
            return Ok(());
        }

        if slug.is_empty() {
            return Err(ModelError::InvalidInput("slug must not be empty".to_string()));
        }

        if self.pages.iter().any(|p| p.id != id && p.slug == slug) {
            return Err(ModelError::DuplicateSlug(slug.to_string()));
        }

        Ok(())
    }

    /// Commit an editor draft into its page
    pub fn apply_draft(&mut self, id: &str, draft: &PageDraft) -> Result<(), ModelError> {
        self.validate_draft(id, draft)?;

        let page = self
            .pages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ModelError::PageNotFound(id.to_string()))?;

        let draft = draft.clone();
        if let Some(title) = draft.title {
            page.title = title;
        }
        if let Some(slug) = draft.slug {
            page.slug = slug.trim().to_string();
        }
        if let Some(layout) = draft.layout {
            page.layout = layout;
        }
        if let Some(meta_title) = draft.meta_title {
            page.meta_title = meta_title;
        }
        if let Some(meta_desc) = draft.meta_desc {
            page.meta_desc = meta_desc;
        }
        if let Some(meta_keywords) = draft.meta_keywords {
            page.meta_keywords = meta_keywords;
        }
        if let Some(canonical_url) = draft.canonical_url {
            page.canonical_url = canonical_url;
        }
        if let Some(content) = draft.content {
            page.content = content;
        }
        if let Some(mut schemas) = draft.schemas {
            for (key, value) in std::mem::take(&mut page.schemas.extra) {
                schemas.extra.entry(key).or_insert(value);
            }
            page.schemas = schemas;
        }

        Ok(())
    }

    /// Remove a page; the home page is refused
    pub fn remove_page(&mut self, id: &str, confirmed: bool) -> Result<Page, ModelError> {
        let index = self
            .pages
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ModelError::PageNotFound(id.to_string()))?;

        if self.pages[index].is_home() {
            return Err(ModelError::HomeDeletion);
        }
        if !confirmed {
            return Err(ModelError::ConfirmationRequired(format!(
                "delete page {}",
                self.pages[index].slug
            )));
        }

        Ok(self.pages.remove(index))
    }

    fn unused_slug(&self, base: &str) -> String {
        let taken: HashSet<&str> = self.pages.iter().map(|p| p.slug.as_str()).collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| format!("{}-{}", base, uuid::Uuid::new_v4().simple()))
    }
}
