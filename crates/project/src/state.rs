//! Pure reducer over the project state.
//! 專案狀態的純函式 reducer。
//!
//! `reduce(&state, action)` never touches storage. It returns the next state
//! together with the effects the caller must run once that state is committed.

use treepad_settings::Theme;

use crate::language::Language;
use crate::selection::Selection;
use crate::tree::{File, FileId, FolderId, NodeId, ProjectTree, ProjectTreeDiff, ProjectTreeError};

/// Everything the editor shell keeps in memory for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectState {
    pub tree: ProjectTree,
    pub selection: Selection,
    /// Language given to newly created files.
    pub selected_language: Language,
    pub theme: Theme,
}

impl ProjectState {
    pub fn new(tree: ProjectTree, selected_language: Language, theme: Theme) -> Self {
        let selection = Selection::initial(&tree);
        Self {
            tree,
            selection,
            selected_language,
            theme,
        }
    }

    pub fn current_file(&self) -> Option<&File> {
        self.selection.current()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateFolder { name: String },
    DeleteFolder { folder_id: FolderId },
    RenameFolder { folder_id: FolderId, name: String },
    CreateFile { folder_id: FolderId, name: String },
    DeleteFile { folder_id: FolderId, file_id: FileId },
    RenameFile { file_id: FileId, name: String },
    /// Replace a stored file wholesale, located by id.
    UpdateFile(File),
    SetFileLanguage { file_id: FileId, language: Language },
    /// Select the given value as-is. Its id must still be in the tree.
    SelectFile(File),
    SelectFileById(FileId),
    /// Change the language for new files and retag the current file.
    SetSelectedLanguage(Language),
    /// Replace the current file's content (editor change callback).
    EditCurrent(String),
    ResetCurrent,
    /// Explicit save of the current file.
    SaveCurrent,
    ToggleTheme,
}

/// Follow-up work requested by a transition, run after the state is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PersistTree,
    SnapshotFile { file_id: FileId, content: String },
    Notify(Notice),
}

/// Non-fatal message for the presentation layer.
/// 交給顯示層的非致命通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved { file_name: String },
    PersistenceUnavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    Folder(FolderId),
    File(File),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub state: ProjectState,
    pub diff: ProjectTreeDiff,
    pub effects: Vec<Effect>,
    pub created: Option<Created>,
}

impl Transition {
    fn unchanged(state: &ProjectState) -> Self {
        Self {
            state: state.clone(),
            diff: ProjectTreeDiff::default(),
            effects: Vec::new(),
            created: None,
        }
    }

    fn with_tree(state: &ProjectState, tree: ProjectTree, diff: ProjectTreeDiff) -> Self {
        let mut next = state.clone();
        next.tree = tree;
        next.selection.reconcile(&next.tree);
        Self {
            state: next,
            diff,
            effects: vec![Effect::PersistTree],
            created: None,
        }
    }

    pub fn tree_changed(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Folder creation cannot fail, so it also has a typed entry point that hands back the id.
pub fn create_folder(state: &ProjectState, name: String) -> (Transition, FolderId) {
    let (tree, id) = state.tree.create_folder(name);
    let diff = single(Change::Added, NodeId::Folder(id.clone()));
    let mut transition = Transition::with_tree(state, tree, diff);
    transition.created = Some(Created::Folder(id.clone()));
    (transition, id)
}

/// Computes the state that follows `action`. `NotFound` errors leave `state` as it was.
/// 計算套用 `action` 後的狀態；找不到目標時原狀態不變。
pub fn reduce(state: &ProjectState, action: Action) -> Result<Transition, ProjectTreeError> {
    match action {
        Action::CreateFolder { name } => Ok(create_folder(state, name).0),
        Action::DeleteFolder { folder_id } => {
            let (tree, diff) = state.tree.delete_folder(&folder_id);
            Ok(commit_if_changed(state, tree, diff))
        }
        Action::RenameFolder { folder_id, name } => {
            let tree = state.tree.rename_folder(&folder_id, name)?;
            let diff = single(Change::Updated, NodeId::Folder(folder_id));
            Ok(Transition::with_tree(state, tree, diff))
        }
        Action::CreateFile { folder_id, name } => {
            let (tree, file) =
                state
                    .tree
                    .create_file(&folder_id, name, state.selected_language.clone())?;
            let diff = single(Change::Added, NodeId::File(file.id().clone()));
            let mut transition = Transition::with_tree(state, tree, diff);
            transition.state.selection.select(file.clone());
            transition.created = Some(Created::File(file));
            Ok(transition)
        }
        Action::DeleteFile { folder_id, file_id } => {
            let (tree, diff) = state.tree.delete_file(&folder_id, &file_id);
            Ok(commit_if_changed(state, tree, diff))
        }
        Action::RenameFile { file_id, name } => {
            let tree = state.tree.rename_file(&file_id, name)?;
            Ok(Transition::with_tree(state, tree, updated_file(file_id)))
        }
        Action::UpdateFile(file) => {
            let file_id = file.id().clone();
            let tree = state.tree.update_file(file)?;
            Ok(Transition::with_tree(state, tree, updated_file(file_id)))
        }
        Action::SetFileLanguage { file_id, language } => {
            let tree = state.tree.set_file_language(&file_id, language)?;
            Ok(Transition::with_tree(state, tree, updated_file(file_id)))
        }
        Action::SelectFile(file) => {
            if state.tree.file(file.id()).is_none() {
                return Err(ProjectTreeError::FileNotFound(file.id().clone()));
            }
            let mut transition = Transition::unchanged(state);
            transition.state.selection.select(file);
            Ok(transition)
        }
        Action::SelectFileById(file_id) => {
            let mut transition = Transition::unchanged(state);
            transition
                .state
                .selection
                .select_by_id(&state.tree, &file_id)?;
            Ok(transition)
        }
        Action::SetSelectedLanguage(language) => {
            let mut transition = match state.current_file() {
                Some(current) => {
                    let retagged = current.clone().with_language(language.clone());
                    reduce(state, Action::UpdateFile(retagged))?
                }
                None => Transition::unchanged(state),
            };
            transition.state.selected_language = language;
            Ok(transition)
        }
        Action::EditCurrent(content) => match state.current_file() {
            Some(current) => {
                let edited = current.clone().with_content(content);
                reduce(state, Action::UpdateFile(edited))
            }
            None => Ok(Transition::unchanged(state)),
        },
        Action::ResetCurrent => reduce(state, Action::EditCurrent(String::new())),
        Action::SaveCurrent => {
            let Some(current) = state.current_file() else {
                return Ok(Transition::unchanged(state));
            };
            // Write the held content back so the snapshot and the tree agree.
            let mut transition = reduce(state, Action::UpdateFile(current.clone()))?;
            transition.effects.push(Effect::SnapshotFile {
                file_id: current.id().clone(),
                content: current.content().to_string(),
            });
            transition.effects.push(Effect::Notify(Notice::Saved {
                file_name: current.name().to_string(),
            }));
            Ok(transition)
        }
        Action::ToggleTheme => {
            let mut transition = Transition::unchanged(state);
            transition.state.theme = state.theme.toggled();
            Ok(transition)
        }
    }
}

fn commit_if_changed(state: &ProjectState, tree: ProjectTree, diff: ProjectTreeDiff) -> Transition {
    if diff.is_empty() {
        Transition::unchanged(state)
    } else {
        Transition::with_tree(state, tree, diff)
    }
}

enum Change {
    Added,
    Updated,
}

fn single(change: Change, node: NodeId) -> ProjectTreeDiff {
    let mut diff = ProjectTreeDiff::default();
    match change {
        Change::Added => diff.added.push(node),
        Change::Updated => diff.updated.push(node),
    }
    diff
}

fn updated_file(file_id: FileId) -> ProjectTreeDiff {
    single(Change::Updated, NodeId::File(file_id))
}
