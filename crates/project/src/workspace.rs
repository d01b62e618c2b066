use std::collections::VecDeque;

use treepad_settings::{Preferences, Theme};

use crate::language::Language;
use crate::session::EditorSession;
use crate::state::{self, reduce, Action, Created, Effect, Notice, ProjectState, Transition};
use crate::store::{DurableStore, StoreError};
use crate::tree::{File, FileId, FolderId, ProjectTree, ProjectTreeError};

/// Keys under which the workspace writes its records.
/// 工作區寫入紀錄時使用的鍵值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub project: String,
    pub snapshot_prefix: String,
}

impl StoreKeys {
    pub fn from_preferences(preferences: &Preferences) -> Self {
        Self {
            project: preferences.storage.project_key.clone(),
            snapshot_prefix: preferences.storage.snapshot_prefix.clone(),
        }
    }

    /// Key of the redundant per-file record written on save.
    pub fn snapshot_key(&self, file_id: &FileId) -> String {
        format!("{}{}", self.snapshot_prefix, file_id)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::from_preferences(&Preferences::default())
    }
}

/// What a dispatched action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub tree_changed: bool,
    pub created: Option<Created>,
}

/// Owns the project state and keeps the durable store in step with it.
/// 持有專案狀態，並讓持久化儲存與其保持同步。
///
/// Each action is reduced, the result is committed, and only then is the
/// tree written out. A failed write is reported through [`Notice`] and the
/// committed state is kept.
#[derive(Debug)]
pub struct Workspace<S: DurableStore> {
    state: ProjectState,
    store: S,
    keys: StoreKeys,
    notices: VecDeque<Notice>,
    dirty: bool,
}

impl<S: DurableStore> Workspace<S> {
    /// Loads the project from `store`, creating the default project when none exists.
    /// 從儲存載入專案；若尚無資料則建立預設專案。
    pub fn open(store: S, preferences: &Preferences) -> Self {
        let keys = StoreKeys::from_preferences(preferences);
        let language = Language::resolve(&preferences.editor.default_language);
        let theme = preferences.editor.theme;

        let mut notices = VecDeque::new();
        let (loaded, persist_bootstrap) = match store.load(&keys.project, ProjectTree::new()) {
            Ok(tree) => (tree, true),
            Err(err) => {
                tracing::warn!(key = %keys.project, error = %err, "stored project unreadable");
                notices.push_back(Notice::PersistenceUnavailable {
                    message: err.to_string(),
                });
                (ProjectTree::new(), false)
            }
        };

        let mut workspace = Self {
            state: ProjectState::new(loaded, language.clone(), theme),
            store,
            keys,
            notices,
            dirty: false,
        };

        if workspace.state.tree.is_empty() {
            workspace.bootstrap(preferences, language, persist_bootstrap);
        } else {
            tracing::debug!(
                folders = workspace.state.tree.folders().len(),
                files = workspace.state.tree.file_count(),
                "project loaded"
            );
        }
        workspace
    }

    fn bootstrap(&mut self, preferences: &Preferences, language: Language, persist: bool) {
        let storage = &preferences.storage;
        let (tree, folder_id) =
            ProjectTree::new().create_folder(storage.default_folder_name.clone());
        let created = tree.create_file(&folder_id, storage.default_file_name.clone(), language);
        let (tree, file) = match created {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "default project bootstrap failed");
                return;
            }
        };
        tracing::info!(folder = %folder_id, file = %file.id(), "created default project");
        self.state.tree = tree;
        self.state.selection.select(file);
        if persist {
            self.persist_tree();
        }
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn tree(&self) -> &ProjectTree {
        &self.state.tree
    }

    pub fn current_file(&self) -> Option<&File> {
        self.state.current_file()
    }

    pub fn selected_language(&self) -> &Language {
        &self.state.selected_language
    }

    pub fn theme(&self) -> Theme {
        self.state.theme
    }

    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// `true` while the last tree write failed and has not been retried successfully.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hands queued notices to the caller, oldest first.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Borrows the editor-facing view of this workspace.
    pub fn session(&mut self) -> EditorSession<'_, S> {
        EditorSession::new(self)
    }

    /// Reduces `action`, commits the new state, then runs the requested effects.
    /// 先計算並提交新狀態，再執行持久化等副作用。
    pub fn dispatch(&mut self, action: Action) -> Result<DispatchResult, ProjectTreeError> {
        let transition = match reduce(&self.state, action) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::debug!(error = %err, "action ignored");
                return Err(err);
            }
        };
        Ok(self.commit(transition))
    }

    fn commit(&mut self, transition: Transition) -> DispatchResult {
        let tree_changed = transition.tree_changed();
        self.state = transition.state;
        for effect in transition.effects {
            self.run_effect(effect);
        }
        DispatchResult {
            tree_changed,
            created: transition.created,
        }
    }

    /// Retries the tree write after an earlier failure. Returns `true` once the store is current.
    pub fn flush(&mut self) -> bool {
        if self.dirty {
            self.persist_tree();
        }
        !self.dirty
    }

    /// Reads the redundant per-file record written by the last save of `file_id`.
    pub fn read_file_snapshot(&self, file_id: &FileId) -> Result<Option<String>, StoreError> {
        self.store.load(&self.keys.snapshot_key(file_id), None)
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PersistTree => self.persist_tree(),
            Effect::SnapshotFile { file_id, content } => {
                let key = self.keys.snapshot_key(&file_id);
                if let Err(err) = self.store.save(&key, &content) {
                    self.report_store_failure(&key, err);
                }
            }
            Effect::Notify(notice) => self.notices.push_back(notice),
        }
    }

    fn persist_tree(&mut self) {
        match self.store.save(&self.keys.project, &self.state.tree) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!(
                    key = %self.keys.project,
                    revision = self.state.tree.revision(),
                    "project persisted"
                );
            }
            Err(err) => {
                self.dirty = true;
                let key = self.keys.project.clone();
                self.report_store_failure(&key, err);
            }
        }
    }

    fn report_store_failure(&mut self, key: &str, err: StoreError) {
        tracing::warn!(key = %key, error = %err, "durable store write failed");
        self.notices.push_back(Notice::PersistenceUnavailable {
            message: err.to_string(),
        });
    }

    pub fn create_folder(&mut self, name: impl Into<String>) -> FolderId {
        let (transition, folder_id) = state::create_folder(&self.state, name.into());
        self.commit(transition);
        folder_id
    }

    pub fn delete_folder(&mut self, folder_id: &FolderId) -> bool {
        self.dispatch(Action::DeleteFolder {
            folder_id: folder_id.clone(),
        })
        .map(|result| result.tree_changed)
        .unwrap_or(false)
    }

    pub fn rename_folder(
        &mut self,
        folder_id: &FolderId,
        name: impl Into<String>,
    ) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::RenameFolder {
            folder_id: folder_id.clone(),
            name: name.into(),
        })
        .map(|_| ())
    }

    /// Creates a file with the selected language and makes it current.
    pub fn create_file(
        &mut self,
        folder_id: &FolderId,
        name: impl Into<String>,
    ) -> Result<File, ProjectTreeError> {
        let result = self.dispatch(Action::CreateFile {
            folder_id: folder_id.clone(),
            name: name.into(),
        })?;
        match result.created {
            Some(Created::File(file)) => Ok(file),
            _ => Err(ProjectTreeError::FolderNotFound(folder_id.clone())),
        }
    }

    pub fn delete_file(&mut self, folder_id: &FolderId, file_id: &FileId) -> bool {
        self.dispatch(Action::DeleteFile {
            folder_id: folder_id.clone(),
            file_id: file_id.clone(),
        })
        .map(|result| result.tree_changed)
        .unwrap_or(false)
    }

    pub fn rename_file(
        &mut self,
        file_id: &FileId,
        name: impl Into<String>,
    ) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::RenameFile {
            file_id: file_id.clone(),
            name: name.into(),
        })
        .map(|_| ())
    }

    pub fn update_file(&mut self, file: File) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::UpdateFile(file)).map(|_| ())
    }

    pub fn set_file_language(
        &mut self,
        file_id: &FileId,
        language: Language,
    ) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::SetFileLanguage {
            file_id: file_id.clone(),
            language,
        })
        .map(|_| ())
    }

    /// Selects `file` as passed. Fails when its id is no longer in the tree.
    pub fn select_file(&mut self, file: File) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::SelectFile(file)).map(|_| ())
    }

    pub fn select_file_by_id(&mut self, file_id: &FileId) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::SelectFileById(file_id.clone())).map(|_| ())
    }

    pub fn set_selected_language(&mut self, language: Language) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::SetSelectedLanguage(language)).map(|_| ())
    }

    /// Replaces the current file's content; no-op when nothing is current.
    pub fn update_current_content(&mut self, content: String) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::EditCurrent(content)).map(|_| ())
    }

    pub fn reset_current_content(&mut self) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::ResetCurrent).map(|_| ())
    }

    pub fn save(&mut self) -> Result<(), ProjectTreeError> {
        self.dispatch(Action::SaveCurrent).map(|_| ())
    }

    pub fn toggle_theme(&mut self) -> Theme {
        let _ = self.dispatch(Action::ToggleTheme);
        self.state.theme
    }
}
