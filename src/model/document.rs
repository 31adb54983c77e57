//! Root configuration document and its settings sections

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;
use super::page::Page;
use super::priority::PriorityTable;
use super::ModelError;

/// Menu sections the site templates render
pub const MENU_SECTIONS: [&str; 4] = ["header", "hero", "footer_leagues", "footer_static"];

/// The published site configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDocument {
    #[serde(default)]
    pub site_settings: SiteSettings,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub targeting: Targeting,
    #[serde(default)]
    pub wildcard: Wildcard,
    #[serde(default)]
    pub social_sharing: SocialSharing,
    /// Region code -> priority table
    #[serde(default)]
    pub sport_priorities: BTreeMap<String, PriorityTable>,
    /// Section key -> ordered links
    #[serde(default)]
    pub menus: BTreeMap<String, Vec<MenuItem>>,
    #[serde(default)]
    pub entity_stacking: Vec<EntityKeyword>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Branding and locale settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub title_part_1: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub title_part_2: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub logo_url: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub favicon_url: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub footer_copyright: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub footer_disclaimer: String,
    #[serde(default = "default_country", deserialize_with = "lenient::string")]
    pub target_country: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            title_part_1: String::new(),
            title_part_2: String::new(),
            domain: String::new(),
            logo_url: String::new(),
            favicon_url: String::new(),
            footer_copyright: String::new(),
            footer_disclaimer: String::new(),
            target_country: default_country(),
            extra: Map::new(),
        }
    }
}

fn default_country() -> String {
    super::priority::FALLBACK_REGION.to_string()
}

/// Colour palette and typography
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub brand_primary: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub brand_dark: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub accent_gold: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub bg_body: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub hero_gradient_start: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub font_family: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Targeting {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub timezone: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Catch-all category used when no priority entry matches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wildcard {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "String::is_empty")]
    pub fallback: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialSharing {
    /// Network -> displayed share count
    #[serde(default, deserialize_with = "lenient::counts")]
    pub counts: BTreeMap<String, ShareCount>,
    /// Comma separated slugs where the share bar is hidden
    #[serde(default, deserialize_with = "lenient::string")]
    pub excluded_pages: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A displayed share count; labels such as `"1.2k"` are kept as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShareCount {
    Number(u64),
    Text(String),
}

impl From<u64> for ShareCount {
    fn from(count: u64) -> Self {
        Self::Number(count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub highlight: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityKeyword {
    #[serde(default, deserialize_with = "lenient::string")]
    pub keyword: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Operator replacement of one or more settings sections
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub site_settings: Option<SiteSettings>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub social_sharing: Option<SocialSharing>,
    #[serde(default)]
    pub targeting: Option<Targeting>,
    #[serde(default)]
    pub wildcard: Option<Wildcard>,
}

impl ConfigurationDocument {
    /// Serialize for publishing (two-space indented JSON)
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Replace the settings sections present in `update`
    ///
    /// Keys the form does not know about survive the replacement.
    pub fn update_settings(&mut self, update: SettingsUpdate) {
        if let Some(mut next) = update.site_settings {
            carry_extra(&mut next.extra, std::mem::take(&mut self.site_settings.extra));
            self.site_settings = next;
        }
        if let Some(mut next) = update.theme {
            carry_extra(&mut next.extra, std::mem::take(&mut self.theme.extra));
            self.theme = next;
        }
        if let Some(mut next) = update.social_sharing {
            carry_extra(&mut next.extra, std::mem::take(&mut self.social_sharing.extra));
            self.social_sharing = next;
        }
        if let Some(mut next) = update.targeting {
            carry_extra(&mut next.extra, std::mem::take(&mut self.targeting.extra));
            self.targeting = next;
        }
        if let Some(mut next) = update.wildcard {
            carry_extra(&mut next.extra, std::mem::take(&mut self.wildcard.extra));
            self.wildcard = next;
        }
    }

    /// Append a link to a menu section
    ///
    /// Only header links can be highlighted.
    pub fn add_menu_item(
        &mut self,
        section: &str,
        title: &str,
        url: &str,
        highlight: bool,
    ) -> Result<MenuItem, ModelError> {
        let title = title.trim();
        if section.trim().is_empty() {
            return Err(ModelError::InvalidInput("menu section is required".to_string()));
        }
        if title.is_empty() {
            return Err(ModelError::InvalidInput("menu title is required".to_string()));
        }

        let item = MenuItem {
            title: title.to_string(),
            url: url.trim().to_string(),
            highlight: section == "header" && highlight,
            extra: Map::new(),
        };
        self.menus
            .entry(section.to_string())
            .or_default()
            .push(item.clone());

        Ok(item)
    }

    pub fn remove_menu_item(&mut self, section: &str, index: usize) -> Result<MenuItem, ModelError> {
        match self.menus.get_mut(section) {
            Some(items) if index < items.len() => Ok(items.remove(index)),
            _ => Err(ModelError::MenuItemNotFound {
                section: section.to_string(),
                index,
            }),
        }
    }

    pub fn add_entity(&mut self, keyword: &str) -> Result<(), ModelError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ModelError::InvalidInput("keyword is required".to_string()));
        }
        self.entity_stacking.push(EntityKeyword {
            keyword: keyword.to_string(),
            extra: Map::new(),
        });
        Ok(())
    }

    pub fn remove_entity(&mut self, index: usize) -> Result<EntityKeyword, ModelError> {
        if index >= self.entity_stacking.len() {
            return Err(ModelError::EntityNotFound(index));
        }
        Ok(self.entity_stacking.remove(index))
    }
}

/// Move keys from `previous` into `target` unless `target` already has them
fn carry_extra(target: &mut Map<String, Value>, previous: Map<String, Value>) {
    for (key, value) in previous {
        target.entry(key).or_insert(value);
    }
}
