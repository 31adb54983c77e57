//! Built-in first-run document and region defaults

use std::collections::BTreeMap;

use serde_json::Map;

use super::document::{
    ConfigurationDocument, ShareCount, SiteSettings, SocialSharing, Theme, MENU_SECTIONS,
};
use super::page::{Page, Schemas, HOME_SLUG};
use super::priority::{PriorityEntry, PriorityTable, SUPPORTED_REGIONS};

/// (name, score, isLeague, hasLink)
type DefaultRow = (&'static str, i64, bool, bool);

const US_DEFAULTS: &[DefaultRow] = &[
    ("NFL", 100, true, true),
    ("NBA", 95, true, true),
    ("MLB", 90, true, true),
    ("College Football", 88, true, false),
    ("NCAA", 87, true, false),
    ("NHL", 85, true, false),
    ("UFC", 80, true, false),
    ("Premier League", 75, true, false),
    ("MLS", 70, true, false),
    ("Champions League", 65, true, false),
    ("Boxing", 50, false, false),
    ("Formula 1", 45, true, false),
    ("Tennis", 40, false, false),
];

const UK_DEFAULTS: &[DefaultRow] = &[
    ("Premier League", 100, true, true),
    ("Champions League", 95, true, true),
    ("Championship", 90, true, false),
    ("The Ashes", 85, true, false),
    ("Cricket", 80, false, false),
    ("Rugby", 75, false, false),
    ("Snooker", 70, false, false),
    ("Darts", 65, false, false),
    ("F1", 60, true, true),
    ("Formula 1", 60, true, true),
    ("Boxing", 50, false, false),
    ("NFL", 40, true, false),
];

/// Built-in table for a region, if it has one
pub fn default_priorities(region: &str) -> Option<PriorityTable> {
    let rows = match region {
        "US" => US_DEFAULTS,
        "UK" => UK_DEFAULTS,
        _ => return None,
    };

    let entries = rows
        .iter()
        .map(|&(name, score, is_league, has_link)| {
            (name.to_string(), PriorityEntry::new(score, is_league, has_link))
        })
        .collect();

    Some(PriorityTable {
        hide_others: false,
        entries,
    })
}

/// The page every document must contain
pub fn home_page() -> Page {
    Page {
        id: "p_home".to_string(),
        slug: HOME_SLUG.to_string(),
        layout: "home".to_string(),
        title: "Home".to_string(),
        meta_title: "Live Sports".to_string(),
        meta_desc: String::new(),
        meta_keywords: String::new(),
        canonical_url: String::new(),
        content: "Welcome".to_string(),
        schemas: Schemas {
            org: true,
            live: true,
            schedule: true,
            ..Default::default()
        },
        extra: Map::new(),
    }
}

/// Document used on first run, before anything has been published
pub fn bootstrap_document() -> ConfigurationDocument {
    let site_settings = SiteSettings {
        title_part_1: "Stream".to_string(),
        title_part_2: "East".to_string(),
        domain: "streameast.to".to_string(),
        target_country: "US".to_string(),
        ..Default::default()
    };

    let social_sharing = SocialSharing {
        counts: [("telegram", 1200), ("whatsapp", 800), ("reddit", 300), ("twitter", 500)]
            .into_iter()
            .map(|(network, count)| (network.to_string(), ShareCount::from(count)))
            .collect(),
        excluded_pages: "dmca,contact,about,privacy".to_string(),
        extra: Map::new(),
    };

    let theme = Theme {
        brand_primary: "#D00000".to_string(),
        brand_dark: "#8a0000".to_string(),
        accent_gold: "#FFD700".to_string(),
        bg_body: "#050505".to_string(),
        hero_gradient_start: "#1a0505".to_string(),
        font_family: "system-ui".to_string(),
        extra: Map::new(),
    };

    let sport_priorities: BTreeMap<String, PriorityTable> = SUPPORTED_REGIONS
        .iter()
        .filter_map(|region| default_priorities(region).map(|t| (region.to_string(), t)))
        .collect();

    let menus = MENU_SECTIONS
        .iter()
        .map(|section| (section.to_string(), Vec::new()))
        .collect();

    ConfigurationDocument {
        site_settings,
        theme,
        social_sharing,
        sport_priorities,
        menus,
        pages: vec![home_page()],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_document() {
        let doc = bootstrap_document();
        assert_eq!(doc.site_settings.target_country, "US");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].slug, "home");
        assert_eq!(doc.social_sharing.counts["telegram"], ShareCount::Number(1200));
        assert_eq!(doc.menus.len(), 4);
        assert!(doc.menus.values().all(Vec::is_empty));
        assert!(doc.sport_priorities.contains_key("US"));
        assert!(doc.sport_priorities.contains_key("UK"));
    }

    #[test]
    fn test_region_defaults() {
        let us = default_priorities("US").unwrap();
        assert_eq!(us.entries.len(), 13);
        assert_eq!(us.entries["NFL"].score, 100);
        assert!(!us.hide_others);

        let uk = default_priorities("UK").unwrap();
        assert_eq!(uk.entries.len(), 12);
        assert!(uk.entries["F1"].has_link);
        assert!(uk.entries.values().all(|e| !e.is_hidden));

        assert!(default_priorities("CA").is_none());
    }

    #[test]
    fn test_bootstrap_serializes_home_schemas() {
        let value = serde_json::to_value(bootstrap_document()).unwrap();
        let schemas = &value["pages"][0]["schemas"];
        assert_eq!(schemas["org"], true);
        assert_eq!(schemas["live"], true);
        assert_eq!(schemas["faq"], false);
        assert_eq!(value["sport_priorities"]["US"]["hideOthers"], false);
    }
}
