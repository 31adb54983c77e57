//! Operator command dispatch
//!
//! Every operator action arrives as a [`Command`] named by its `action` key
//! and is routed to a model edit or a synchronizer operation. Nothing here
//! knows how the admin UI renders; the UI re-reads status and the document
//! after each command.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{
    EntityKeyword, MenuItem, Page, PageDraft, PriorityEntry, PriorityUpdate, SettingsUpdate,
};
use crate::sync::{LoadReport, PageDeletion, SaveReport, Synchronizer};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    SetToken {
        token: String,
    },
    SignOut,
    Load,
    Reload,
    Save,
    EndSession,
    UpdateSettings(SettingsUpdate),
    AddPriority {
        region: String,
        name: String,
    },
    UpdatePriority {
        region: String,
        name: String,
        changes: PriorityUpdate,
    },
    RemovePriority {
        region: String,
        name: String,
        #[serde(default)]
        confirm: bool,
    },
    SetHideOthers {
        region: String,
        hide_others: bool,
    },
    ResetPriorities {
        region: String,
        #[serde(default)]
        confirm: bool,
    },
    CreatePage,
    OpenEditor {
        page_id: String,
    },
    EditDraft {
        draft: PageDraft,
    },
    CloseEditor {
        /// Fold the draft into the page before closing
        #[serde(default = "default_true")]
        apply: bool,
    },
    DeletePage {
        page_id: String,
        #[serde(default)]
        confirm: bool,
    },
    AddMenuItem {
        section: String,
        title: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        highlight: bool,
    },
    RemoveMenuItem {
        section: String,
        index: usize,
    },
    AddEntity {
        keyword: String,
    },
    RemoveEntity {
        index: usize,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetToken { .. } => "set_token",
            Command::SignOut => "sign_out",
            Command::Load => "load",
            Command::Reload => "reload",
            Command::Save => "save",
            Command::EndSession => "end_session",
            Command::UpdateSettings(_) => "update_settings",
            Command::AddPriority { .. } => "add_priority",
            Command::UpdatePriority { .. } => "update_priority",
            Command::RemovePriority { .. } => "remove_priority",
            Command::SetHideOthers { .. } => "set_hide_others",
            Command::ResetPriorities { .. } => "reset_priorities",
            Command::CreatePage => "create_page",
            Command::OpenEditor { .. } => "open_editor",
            Command::EditDraft { .. } => "edit_draft",
            Command::CloseEditor { .. } => "close_editor",
            Command::DeletePage { .. } => "delete_page",
            Command::AddMenuItem { .. } => "add_menu_item",
            Command::RemoveMenuItem { .. } => "remove_menu_item",
            Command::AddEntity { .. } => "add_entity",
            Command::RemoveEntity { .. } => "remove_entity",
        }
    }
}

/// Result of a dispatched command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Done,
    Loaded(LoadReport),
    Saved(SaveReport),
    Priority {
        region: String,
        name: String,
        entry: PriorityEntry,
    },
    PageCreated {
        page: Page,
    },
    Draft {
        page_id: String,
        draft: PageDraft,
    },
    EditorClosed {
        page_id: Option<String>,
    },
    PageDeleted(PageDeletion),
    MenuItem {
        section: String,
        item: MenuItem,
    },
    Entity {
        entity: EntityKeyword,
    },
}

/// Routes commands to the model and the synchronizer
#[derive(Clone)]
pub struct Controller {
    sync: Arc<Synchronizer>,
}

impl Controller {
    pub fn new(sync: Arc<Synchronizer>) -> Self {
        Self { sync }
    }

    pub async fn dispatch(&self, command: Command) -> Result<CommandOutcome, AppError> {
        tracing::debug!(action = command.name(), "Dispatching command");
        let sync = &self.sync;

        let outcome = match command {
            Command::SetToken { token } => {
                sync.credentials().set(&token)?;
                CommandOutcome::Done
            }
            Command::SignOut => {
                sync.credentials().clear();
                sync.monitor().stop();
                CommandOutcome::Done
            }
            Command::Load => CommandOutcome::Loaded(sync.load().await?),
            Command::Reload => CommandOutcome::Loaded(sync.reload().await?),
            Command::Save => CommandOutcome::Saved(sync.save().await?),
            Command::EndSession => {
                sync.end_session().await;
                CommandOutcome::Done
            }
            Command::UpdateSettings(update) => {
                sync.edit(|s| {
                    s.document.update_settings(update);
                    Ok(())
                })
                .await?;
                CommandOutcome::Done
            }
            Command::AddPriority { region, name } => {
                let entry = sync.edit(|s| s.document.add_priority(&region, &name)).await?;
                CommandOutcome::Priority {
                    region,
                    name: name.trim().to_string(),
                    entry,
                }
            }
            Command::UpdatePriority {
                region,
                name,
                changes,
            } => {
                let entry = sync
                    .edit(|s| s.document.update_priority(&region, &name, &changes))
                    .await?;
                CommandOutcome::Priority {
                    region,
                    name,
                    entry,
                }
            }
            Command::RemovePriority {
                region,
                name,
                confirm,
            } => {
                let entry = sync
                    .edit(|s| s.document.remove_priority(&region, &name, confirm))
                    .await?;
                CommandOutcome::Priority {
                    region,
                    name,
                    entry,
                }
            }
            Command::SetHideOthers {
                region,
                hide_others,
            } => {
                sync.edit(|s| {
                    s.document.set_hide_others(&region, hide_others);
                    Ok(())
                })
                .await?;
                CommandOutcome::Done
            }
            Command::ResetPriorities { region, confirm } => {
                sync.edit(|s| s.document.reset_priorities(&region, confirm))
                    .await?;
                CommandOutcome::Done
            }
            Command::CreatePage => {
                let page = sync.edit(|s| Ok(s.document.create_page())).await?;
                CommandOutcome::PageCreated { page }
            }
            Command::OpenEditor { page_id } => {
                let draft = sync.edit(|s| s.open_editor(&page_id)).await?;
                CommandOutcome::Draft { page_id, draft }
            }
            Command::EditDraft { draft } => {
                let (page_id, draft) = sync
                    .edit(|s| {
                        let merged = s.edit_draft(draft)?;
                        let page_id = s
                            .editor
                            .as_ref()
                            .map(|e| e.page_id.clone())
                            .unwrap_or_default();
                        Ok((page_id, merged))
                    })
                    .await?;
                CommandOutcome::Draft { page_id, draft }
            }
            Command::CloseEditor { apply } => {
                let page_id = sync.edit(|s| s.close_editor(apply)).await?;
                CommandOutcome::EditorClosed { page_id }
            }
            Command::DeletePage { page_id, confirm } => {
                CommandOutcome::PageDeleted(sync.delete_page(&page_id, confirm).await?)
            }
            Command::AddMenuItem {
                section,
                title,
                url,
                highlight,
            } => {
                let item = sync
                    .edit(|s| s.document.add_menu_item(&section, &title, &url, highlight))
                    .await?;
                CommandOutcome::MenuItem { section, item }
            }
            Command::RemoveMenuItem { section, index } => {
                let item = sync
                    .edit(|s| s.document.remove_menu_item(&section, index))
                    .await?;
                CommandOutcome::MenuItem { section, item }
            }
            Command::AddEntity { keyword } => {
                let entity = sync
                    .edit(|s| {
                        s.document.add_entity(&keyword)?;
                        Ok(s.document.entity_stacking.last().cloned().unwrap_or_default())
                    })
                    .await?;
                CommandOutcome::Entity { entity }
            }
            Command::RemoveEntity { index } => {
                let entity = sync.edit(|s| s.document.remove_entity(index)).await?;
                CommandOutcome::Entity { entity }
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::Config;
    use crate::credentials::CredentialStore;
    use crate::remote::{ContentStore, MemoryContentStore};

    fn controller() -> (Controller, MemoryContentStore) {
        let store = MemoryContentStore::new();
        let shared: Arc<dyn ContentStore> = Arc::new(store.clone());
        let mut config = Config::default();
        config.build.watch_on_load = false;
        let sync = Synchronizer::from_config(shared, CredentialStore::new(), &config);
        (Controller::new(Arc::new(sync)), store)
    }

    fn command(value: serde_json::Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_commands_decode_by_action() {
        assert!(matches!(command(json!({ "action": "save" })), Command::Save));
        assert!(matches!(
            command(json!({ "action": "close_editor" })),
            Command::CloseEditor { apply: true }
        ));
        assert!(matches!(
            command(json!({ "action": "update_settings", "theme": { "brand_primary": "#000" } })),
            Command::UpdateSettings(SettingsUpdate { theme: Some(_), .. })
        ));
        assert!(serde_json::from_value::<Command>(json!({ "action": "launch" })).is_err());
    }

    #[tokio::test]
    async fn test_edit_flow() {
        let (controller, store) = controller();
        let run = |value| controller.dispatch(command(value));

        run(json!({ "action": "set_token", "token": "t" })).await.unwrap();
        run(json!({ "action": "load" })).await.unwrap();

        let created = run(json!({ "action": "create_page" })).await.unwrap();
        let CommandOutcome::PageCreated { page } = created else {
            panic!("unexpected outcome {:?}", created);
        };
        run(json!({ "action": "open_editor", "page_id": page.id })).await.unwrap();
        run(json!({ "action": "edit_draft", "draft": { "slug": "dmca", "title": "DMCA" } }))
            .await
            .unwrap();

        run(json!({ "action": "add_priority", "region": "UK", "name": "Hurling" })).await.unwrap();
        run(json!({ "action": "update_priority", "region": "UK", "name": "Hurling",
                    "changes": { "score": 99, "hasLink": true } }))
            .await
            .unwrap();
        run(json!({ "action": "set_hide_others", "region": "UK", "hide_others": true }))
            .await
            .unwrap();
        run(json!({ "action": "add_menu_item", "section": "footer_static", "title": "DMCA",
                    "url": "/dmca", "highlight": true }))
            .await
            .unwrap();
        run(json!({ "action": "add_entity", "keyword": "stream east" })).await.unwrap();

        let saved = run(json!({ "action": "save" })).await.unwrap();
        assert!(matches!(saved, CommandOutcome::Saved(_)));

        let stored = crate::model::load_document(&store.file("main", "data/config.json").unwrap().bytes)
            .document;
        assert_eq!(stored.page(&page.id).unwrap().slug, "dmca");
        let uk = &stored.sport_priorities["UK"];
        assert!(uk.hide_others);
        assert_eq!(uk.entries["Hurling"].score, 99);
        assert!(uk.entries["Hurling"].has_link);
        let footer = &stored.menus["footer_static"];
        assert_eq!(footer.len(), 1);
        assert!(!footer[0].highlight);
        assert_eq!(stored.entity_stacking[0].keyword, "stream east");
    }

    #[tokio::test]
    async fn test_guarded_commands() {
        let (controller, _store) = controller();
        let run = |value| controller.dispatch(command(value));

        let err = run(json!({ "action": "create_page" })).await.unwrap_err();
        assert!(matches!(err, AppError::Sync(crate::sync::SyncError::NotLoaded)));

        run(json!({ "action": "set_token", "token": "t" })).await.unwrap();
        run(json!({ "action": "load" })).await.unwrap();

        let err = run(json!({ "action": "reset_priorities", "region": "US" })).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Sync(crate::sync::SyncError::Model(crate::model::ModelError::ConfirmationRequired(_)))
        ));
        run(json!({ "action": "reset_priorities", "region": "US", "confirm": true }))
            .await
            .unwrap();

        let err = run(json!({ "action": "delete_page", "page_id": "p_home", "confirm": true }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Sync(crate::sync::SyncError::Model(crate::model::ModelError::HomeDeletion))
        ));

        run(json!({ "action": "sign_out" })).await.unwrap();
        let err = run(json!({ "action": "save" })).await.unwrap_err();
        assert!(matches!(err, AppError::Sync(crate::sync::SyncError::Unauthenticated)));
    }
}
