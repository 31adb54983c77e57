//! Load-time migrations
//!
//! Every stored document goes through the same ordered list of steps before
//! it is decoded into [`ConfigurationDocument`]. Steps work on the raw JSON
//! tree, never fail, and leave an already-migrated tree unchanged, so there is
//! no schema version to track. Keys a step does not know about are left
//! alone.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use super::defaults::{bootstrap_document, default_priorities, home_page};
use super::document::{ConfigurationDocument, MENU_SECTIONS};
use super::lenient::{as_score, truthy};
use super::page::{generate_page_id, HOME_SLUG};
use super::priority::{PriorityEntry, SUPPORTED_REGIONS};

type Step = fn(&mut Map<String, Value>, &mut Vec<String>);

/// Ordered migration steps
const STEPS: &[(&str, Step)] = &[
    ("seed_pages", seed_pages),
    ("assign_page_ids", assign_page_ids),
    ("normalize_schemas", normalize_schemas),
    ("seed_regions", seed_regions),
    ("upgrade_priority_entries", upgrade_priority_entries),
    ("normalize_menus", normalize_menus),
    ("normalize_sections", normalize_sections),
    ("ensure_single_home", ensure_single_home),
];

const LEGACY_HIDE_OTHERS: &str = "_HIDE_OTHERS";
const HIDE_OTHERS: &str = "hideOthers";

const SETTINGS_SECTIONS: [&str; 5] = ["site_settings", "social_sharing", "theme", "targeting", "wildcard"];

/// Outcome of decoding stored bytes
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: ConfigurationDocument,
    /// Repairs made and problems found while loading
    pub warnings: Vec<String>,
    /// True when the stored bytes were unusable and the default document
    /// was substituted
    pub fell_back: bool,
}

/// Run every migration step over a document root
///
/// Returns a note for each repair that changed the tree.
pub fn migrate(root: &mut Map<String, Value>) -> Vec<String> {
    let mut notes = Vec::new();
    for (name, step) in STEPS {
        let before = notes.len();
        step(root, &mut notes);
        if notes.len() > before {
            tracing::debug!(step = %name, repairs = notes.len() - before, "Migration step applied");
        }
    }
    notes
}

/// Decode stored bytes into a document, migrating older shapes
///
/// Bytes that are not UTF-8 JSON with an object root cannot be repaired; the
/// default document is returned instead, with a warning.
pub fn load_document(bytes: &[u8]) -> LoadedDocument {
    match decode(bytes) {
        Ok((document, warnings)) => {
            for warning in &warnings {
                tracing::info!(repair = %warning, "Migrated stored document");
            }
            LoadedDocument {
                document,
                warnings,
                fell_back: false,
            }
        }
        Err(reason) => {
            tracing::warn!(reason = %reason, "Stored document unreadable, using defaults");
            LoadedDocument {
                document: bootstrap_document(),
                warnings: vec![format!("stored document unreadable ({}); defaults loaded", reason)],
                fell_back: true,
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Result<(ConfigurationDocument, Vec<String>), String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))?;
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))?;
    let Value::Object(mut root) = value else {
        return Err("document root is not an object".to_string());
    };

    let notes = migrate(&mut root);
    let document = serde_json::from_value(Value::Object(root))
        .map_err(|e| format!("unexpected document shape: {}", e))?;

    Ok((document, notes))
}

fn home_page_value() -> Value {
    serde_json::to_value(home_page()).unwrap_or_else(|_| json!({ "id": "p_home", "slug": HOME_SLUG }))
}

/// Ensure `key` holds an object, replacing anything else with `{}`
fn ensure_object<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    context: &str,
    notes: &mut Vec<String>,
) -> Option<&'a mut Map<String, Value>> {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    if !slot.is_object() {
        notes.push(format!("{}{} reset to an empty object", context, key));
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}

/// Ensure `key` holds an array, replacing anything else with `[]`
fn ensure_array<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
    context: &str,
    notes: &mut Vec<String>,
) -> Option<&'a mut Vec<Value>> {
    let slot = map.entry(key.to_string()).or_insert(Value::Null);
    if !slot.is_array() {
        notes.push(format!("{}{} reset to an empty list", context, key));
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
}

fn retain_objects(items: &mut Vec<Value>, what: &str, notes: &mut Vec<String>) {
    let before = items.len();
    items.retain(Value::is_object);
    let dropped = before - items.len();
    if dropped > 0 {
        tracing::warn!(kind = %what, dropped, "Dropped malformed entries");
        notes.push(format!("dropped {} malformed {}", dropped, what));
    }
}

fn pages_mut(root: &mut Map<String, Value>) -> impl Iterator<Item = &mut Map<String, Value>> {
    root.get_mut("pages")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn seed_pages(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let Some(pages) = ensure_array(root, "pages", "", notes) else {
        return;
    };
    retain_objects(pages, "pages", notes);
    if pages.is_empty() {
        pages.push(home_page_value());
        notes.push("seeded pages with the home page".to_string());
    }
}

fn assign_page_ids(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();
    for page in pages_mut(root) {
        let current = match page.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        match current {
            Some(id) if !seen.contains(&id) => {
                page.insert("id".to_string(), Value::String(id.clone()));
                seen.insert(id);
            }
            previous => {
                let mut id = generate_page_id();
                while seen.contains(&id) {
                    id = generate_page_id();
                }
                match previous {
                    Some(dup) => notes.push(format!("page id {} was duplicated; reassigned {}", dup, id)),
                    None => notes.push(format!("assigned id {} to a page without one", id)),
                }
                page.insert("id".to_string(), Value::String(id.clone()));
                seen.insert(id);
            }
        }
    }
}

fn normalize_schemas(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    for page in pages_mut(root) {
        let Some(schemas) = ensure_object(page, "schemas", "page ", notes) else {
            continue;
        };
        if let Some(faq_list) = ensure_array(schemas, "faq_list", "page schemas.", notes) {
            retain_objects(faq_list, "faq items", notes);
        }
    }
}

fn seed_regions(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let Some(priorities) = ensure_object(root, "sport_priorities", "", notes) else {
        return;
    };
    for region in SUPPORTED_REGIONS {
        if priorities.contains_key(region) {
            continue;
        }
        if let Some(table) = default_priorities(region).and_then(|t| serde_json::to_value(t).ok()) {
            priorities.insert(region.to_string(), table);
            notes.push(format!("seeded {} priorities from defaults", region));
        }
    }
}

fn upgrade_priority_entries(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let Some(Value::Object(priorities)) = root.get_mut("sport_priorities") else {
        return;
    };

    for (region, table) in priorities.iter_mut() {
        if !table.is_object() {
            notes.push(format!("{} priorities were not a table; reset", region));
            *table = json!({ HIDE_OTHERS: false });
        }
        let Value::Object(table) = table else { continue };

        if let Some(legacy) = table.remove(LEGACY_HIDE_OTHERS) {
            if !table.contains_key(HIDE_OTHERS) {
                table.insert(HIDE_OTHERS.to_string(), Value::Bool(truthy(&legacy)));
            }
            notes.push(format!("upgraded {} {} flag", region, LEGACY_HIDE_OTHERS));
        }

        let mut dropped = Vec::new();
        for (name, value) in table.iter_mut() {
            if name == HIDE_OTHERS {
                if !value.is_boolean() {
                    *value = Value::Bool(truthy(value));
                    notes.push(format!("coerced {} hideOthers to a boolean", region));
                }
                continue;
            }

            match value {
                Value::Object(entry) => {
                    if let Some(score) = entry.get("score") {
                        if !score.is_i64() {
                            let coerced = as_score(score).unwrap_or(0);
                            entry.insert("score".to_string(), Value::from(coerced));
                            notes.push(format!("coerced {}/{} score", region, name));
                        }
                    }
                }
                other => match as_score(other) {
                    Some(score) => {
                        if let Ok(upgraded) = serde_json::to_value(PriorityEntry::from_score(score)) {
                            *other = upgraded;
                            notes.push(format!("upgraded {}/{} from a bare score", region, name));
                        }
                    }
                    None => dropped.push(name.clone()),
                },
            }
        }

        for name in dropped {
            tracing::warn!(region = %region, entry = %name, "Dropped unreadable priority entry");
            table.remove(&name);
            notes.push(format!("dropped unreadable {}/{} priority", region, name));
        }
    }
}

fn normalize_menus(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let Some(menus) = ensure_object(root, "menus", "", notes) else {
        return;
    };
    for section in MENU_SECTIONS {
        menus.entry(section.to_string()).or_insert(Value::Null);
    }
    let sections: Vec<String> = menus.keys().cloned().collect();
    for section in sections {
        if let Some(items) = ensure_array(menus, &section, "menus.", notes) {
            retain_objects(items, "menu items", notes);
        }
    }
}

fn normalize_sections(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    for section in SETTINGS_SECTIONS {
        ensure_object(root, section, "", notes);
    }
    if let Some(Value::Object(sharing)) = root.get_mut("social_sharing") {
        ensure_object(sharing, "counts", "social_sharing.", notes);
    }

    let Some(entities) = ensure_array(root, "entity_stacking", "", notes) else {
        return;
    };
    for item in entities.iter_mut() {
        if let Value::String(keyword) = item {
            let keyword = std::mem::take(keyword);
            *item = json!({ "keyword": keyword });
            notes.push("upgraded a bare entity keyword".to_string());
        }
    }
    retain_objects(entities, "entity keywords", notes);
}

fn ensure_single_home(root: &mut Map<String, Value>, notes: &mut Vec<String>) {
    let Some(Value::Array(pages)) = root.get_mut("pages") else {
        return;
    };

    let is_home = |page: &Value| page.get("slug").and_then(Value::as_str) == Some(HOME_SLUG);
    let mut taken: HashSet<String> = pages
        .iter()
        .filter_map(|p| p.get("slug").and_then(Value::as_str).map(str::to_string))
        .collect();

    let mut seen_home = false;
    for page in pages.iter_mut() {
        if !is_home(&*page) {
            continue;
        }
        if !seen_home {
            seen_home = true;
            continue;
        }
        let slug = (2..)
            .map(|n| format!("{}-{}", HOME_SLUG, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| format!("{}-{}", HOME_SLUG, generate_page_id()));
        if let Value::Object(page) = page {
            page.insert("slug".to_string(), Value::String(slug.clone()));
        }
        notes.push(format!("renamed an extra home page to {}", slug));
        taken.insert(slug);
    }

    if !seen_home {
        let mut home = home_page_value();
        let ids: HashSet<&str> = pages
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .collect();
        if home.get("id").and_then(Value::as_str).is_some_and(|id| ids.contains(id)) {
            let mut id = generate_page_id();
            while ids.contains(id.as_str()) {
                id = generate_page_id();
            }
            home["id"] = Value::String(id);
        }
        pages.insert(0, home);
        notes.push("added the missing home page".to_string());
    }
}
