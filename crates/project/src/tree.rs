use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::language::Language;

/// Identifier of a folder in the project tree.
/// 專案樹中資料夾的識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

/// Identifier of a file in the project tree.
/// 專案樹中檔案的識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FolderId {
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FileId {
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either kind of node, used when reporting tree differences.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeId {
    Folder(FolderId),
    File(FileId),
}

/// A text file owned by exactly one folder.
/// 由單一資料夾擁有的文字檔案。
///
/// Files are values: edits build a new `File` through the `with_*` methods and
/// hand it back to [`ProjectTree::update_file`]. The identifier is assigned by
/// the tree at creation and cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    id: FileId,
    name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    language: Language,
}

impl File {
    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

/// Named, ordered group of files.
/// 具名且有序的檔案群組。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    id: FolderId,
    name: String,
    #[serde(default)]
    files: Vec<File>,
}

impl Folder {
    pub fn id(&self) -> &FolderId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn file(&self, id: &FileId) -> Option<&File> {
        self.files.iter().find(|file| &file.id == id)
    }
}

/// Immutable project tree: an ordered list of folders plus the id counter.
/// 不可變的專案樹：有序的資料夾清單與識別碼計數器。
///
/// Every mutating operation takes `&self` and returns a new tree; the receiver
/// is left untouched. The persisted form is the bare folder array, and the id
/// counter is re-seeded from the stored ids when a tree is deserialized.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "Vec<Folder>")]
pub struct ProjectTree {
    folders: Vec<Folder>,
    next_id: u64,
    revision: u64,
}

impl Default for ProjectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ProjectTree {
    fn eq(&self, other: &Self) -> bool {
        self.folders == other.folders
    }
}

impl Eq for ProjectTree {}

impl Serialize for ProjectTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.folders.serialize(serializer)
    }
}

impl From<Vec<Folder>> for ProjectTree {
    fn from(folders: Vec<Folder>) -> Self {
        let mut tree = Self {
            folders,
            next_id: 1,
            revision: 0,
        };
        tree.next_id = tree.seed_next_id();
        tree.repair_duplicate_ids();
        tree
    }
}

impl ProjectTree {
    /// Constructs an empty tree.
    /// 建立空的專案樹。
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
            next_id: 1,
            revision: 0,
        }
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Number of successful mutations applied since this tree was created or loaded.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.iter().find(|folder| &folder.id == id)
    }

    /// Finds a file by id in any folder.
    /// 在任何資料夾中依識別碼尋找檔案。
    pub fn file(&self, id: &FileId) -> Option<&File> {
        self.files().find(|file| &file.id == id)
    }

    /// Returns the folder currently owning the file.
    pub fn folder_of(&self, id: &FileId) -> Option<&Folder> {
        self.folders
            .iter()
            .find(|folder| folder.files.iter().any(|file| &file.id == id))
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.folders.iter().flat_map(|folder| folder.files.iter())
    }

    pub fn file_count(&self) -> usize {
        self.folders.iter().map(|folder| folder.files.len()).sum()
    }

    /// First file of the first folder, the selection used after a load.
    pub fn first_file(&self) -> Option<&File> {
        self.folders.first().and_then(|folder| folder.files.first())
    }

    /// Appends a new, empty folder. Names are free-form and need not be unique.
    /// 新增空資料夾；名稱不需唯一。
    pub fn create_folder(&self, name: impl Into<String>) -> (Self, FolderId) {
        let mut next = self.clone();
        let id = FolderId(next.allocate_id());
        next.folders.push(Folder {
            id: id.clone(),
            name: name.into(),
            files: Vec::new(),
        });
        next.revision = self.revision.wrapping_add(1);
        (next, id)
    }

    /// Removes a folder together with every file it owns. Unknown ids are a no-op.
    /// 刪除資料夾及其所有檔案；識別碼不存在時不做任何事。
    pub fn delete_folder(&self, id: &FolderId) -> (Self, ProjectTreeDiff) {
        let mut diff = ProjectTreeDiff::default();
        let Some(position) = self.folders.iter().position(|folder| &folder.id == id) else {
            return (self.clone(), diff);
        };

        let mut next = self.clone();
        let removed = next.folders.remove(position);
        diff.removed
            .extend(removed.files.into_iter().map(|file| NodeId::File(file.id)));
        diff.removed.push(NodeId::Folder(removed.id));
        next.revision = self.revision.wrapping_add(1);
        (next, diff)
    }

    /// Renames a folder.
    pub fn rename_folder(
        &self,
        id: &FolderId,
        name: impl Into<String>,
    ) -> Result<Self, ProjectTreeError> {
        let mut next = self.clone();
        let folder = next
            .folders
            .iter_mut()
            .find(|folder| &folder.id == id)
            .ok_or_else(|| ProjectTreeError::FolderNotFound(id.clone()))?;
        folder.name = name.into();
        next.revision = self.revision.wrapping_add(1);
        Ok(next)
    }

    /// Appends an empty file to the given folder and returns it.
    /// 在指定資料夾中新增空白檔案並回傳該檔案。
    pub fn create_file(
        &self,
        folder_id: &FolderId,
        name: impl Into<String>,
        language: Language,
    ) -> Result<(Self, File), ProjectTreeError> {
        let position = self
            .folders
            .iter()
            .position(|folder| &folder.id == folder_id)
            .ok_or_else(|| ProjectTreeError::FolderNotFound(folder_id.clone()))?;

        let mut next = self.clone();
        let file = File {
            id: FileId(next.allocate_id()),
            name: name.into(),
            content: String::new(),
            language,
        };
        next.folders[position].files.push(file.clone());
        next.revision = self.revision.wrapping_add(1);
        Ok((next, file))
    }

    /// Removes a file from a folder. No-op when either id is absent.
    /// 自資料夾中移除檔案；任一識別碼不存在時不做任何事。
    pub fn delete_file(&self, folder_id: &FolderId, file_id: &FileId) -> (Self, ProjectTreeDiff) {
        let mut diff = ProjectTreeDiff::default();
        let located = self
            .folders
            .iter()
            .position(|folder| &folder.id == folder_id)
            .and_then(|folder_pos| {
                self.folders[folder_pos]
                    .files
                    .iter()
                    .position(|file| &file.id == file_id)
                    .map(|file_pos| (folder_pos, file_pos))
            });
        let Some((folder_pos, file_pos)) = located else {
            return (self.clone(), diff);
        };

        let mut next = self.clone();
        let removed = next.folders[folder_pos].files.remove(file_pos);
        diff.removed.push(NodeId::File(removed.id));
        diff.updated.push(NodeId::Folder(folder_id.clone()));
        next.revision = self.revision.wrapping_add(1);
        (next, diff)
    }

    /// Replaces the stored file that shares `updated`'s id, wherever it lives.
    /// 以 `updated` 取代樹中同識別碼的檔案，不論其位於哪個資料夾。
    pub fn update_file(&self, updated: File) -> Result<Self, ProjectTreeError> {
        let mut next = self.clone();
        let slot = next
            .folders
            .iter_mut()
            .flat_map(|folder| folder.files.iter_mut())
            .find(|file| file.id == updated.id)
            .ok_or_else(|| ProjectTreeError::FileNotFound(updated.id.clone()))?;
        *slot = updated;
        next.revision = self.revision.wrapping_add(1);
        Ok(next)
    }

    pub fn rename_file(&self, id: &FileId, name: impl Into<String>) -> Result<Self, ProjectTreeError> {
        let file = self
            .file(id)
            .ok_or_else(|| ProjectTreeError::FileNotFound(id.clone()))?;
        self.update_file(file.clone().with_name(name))
    }

    pub fn set_file_language(&self, id: &FileId, language: Language) -> Result<Self, ProjectTreeError> {
        let file = self
            .file(id)
            .ok_or_else(|| ProjectTreeError::FileNotFound(id.clone()))?;
        self.update_file(file.clone().with_language(language))
    }

    fn allocate_id(&mut self) -> String {
        loop {
            let candidate = format_id(self.next_id.max(1));
            self.next_id = self.next_id.max(1).wrapping_add(1);
            if !self.contains_raw_id(&candidate) {
                return candidate;
            }
        }
    }

    fn contains_raw_id(&self, raw: &str) -> bool {
        self.folders.iter().any(|folder| {
            folder.id.0 == raw || folder.files.iter().any(|file| file.id.0 == raw)
        })
    }

    fn seed_next_id(&self) -> u64 {
        let folder_ids = self.folders.iter().map(|folder| folder.id.0.as_str());
        let file_ids = self.files().map(|file| file.id.0.as_str());
        folder_ids
            .chain(file_ids)
            .filter_map(|raw| u64::from_str_radix(raw, 16).ok())
            .max()
            .map_or(1, |max| max.wrapping_add(1).max(1))
    }

    // Stored data may carry duplicate ids (e.g. written by an older build that
    // derived ids from the clock); later duplicates get fresh ids.
    fn repair_duplicate_ids(&mut self) {
        let mut seen_folders = HashSet::new();
        let mut seen_files = HashSet::new();
        let mut reassign_folders = Vec::new();
        let mut reassign_files = Vec::new();

        for (folder_pos, folder) in self.folders.iter().enumerate() {
            if !seen_folders.insert(folder.id.clone()) {
                reassign_folders.push(folder_pos);
            }
            for (file_pos, file) in folder.files.iter().enumerate() {
                if !seen_files.insert(file.id.clone()) {
                    reassign_files.push((folder_pos, file_pos));
                }
            }
        }

        for folder_pos in reassign_folders {
            let fresh = FolderId(self.allocate_id());
            tracing::warn!(
                old = %self.folders[folder_pos].id,
                new = %fresh,
                "reassigned duplicate folder id"
            );
            self.folders[folder_pos].id = fresh;
        }
        for (folder_pos, file_pos) in reassign_files {
            let fresh = FileId(self.allocate_id());
            tracing::warn!(
                old = %self.folders[folder_pos].files[file_pos].id,
                new = %fresh,
                "reassigned duplicate file id"
            );
            self.folders[folder_pos].files[file_pos].id = fresh;
        }
    }
}

fn format_id(value: u64) -> String {
    format!("{value:016x}")
}

/// Captures differences after a tree mutation.
/// 紀錄樹狀結構變動後的差異。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectTreeDiff {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub updated: Vec<NodeId>,
}

impl ProjectTreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    pub fn removed_file(&self, id: &FileId) -> bool {
        self.removed
            .iter()
            .any(|node| matches!(node, NodeId::File(removed) if removed == id))
    }
}

/// Tree-manipulation errors. Both variants leave the tree unchanged.
/// 專案樹操作錯誤類型；發生時樹狀結構不會改變。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectTreeError {
    #[error("folder {0} not found")]
    FolderNotFound(FolderId),
    #[error("file {0} not found")]
    FileNotFound(FileId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ProjectTree, FolderId, File, File) {
        let (tree, folder) = ProjectTree::new().create_folder("src");
        let (tree, a) = tree
            .create_file(&folder, "a.js", Language::JAVASCRIPT)
            .unwrap();
        let (tree, b) = tree
            .create_file(&folder, "b.ts", Language::TYPESCRIPT)
            .unwrap();
        (tree, folder, a, b)
    }

    #[test]
    fn create_folder_leaves_original_untouched() {
        let empty = ProjectTree::new();
        let (tree, id) = empty.create_folder("");
        assert!(empty.is_empty());
        assert_eq!(tree.folders().len(), 1);
        assert_eq!(tree.folder(&id).unwrap().name(), "");
        assert_eq!(tree.revision(), 1);
    }

    #[test]
    fn duplicate_folder_names_are_accepted() {
        let (tree, first) = ProjectTree::new().create_folder("Proj");
        let (tree, second) = tree.create_folder("Proj");
        assert_ne!(first, second);
        assert_eq!(tree.folders().len(), 2);
    }

    #[test]
    fn ids_are_fixed_width_hex() {
        let (_, id) = ProjectTree::new().create_folder("x");
        assert_eq!(id.as_str(), "0000000000000001");
    }

    #[test]
    fn create_file_in_missing_folder_is_not_found() {
        let tree = ProjectTree::new();
        let missing = FolderId::from_string("nope");
        let err = tree
            .create_file(&missing, "a.js", Language::JAVASCRIPT)
            .unwrap_err();
        assert_eq!(err, ProjectTreeError::FolderNotFound(missing));
    }

    #[test]
    fn new_file_is_empty_and_appended() {
        let (tree, folder, a, b) = sample();
        let files = tree.folder(&folder).unwrap().files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id(), a.id());
        assert_eq!(files[1].id(), b.id());
        assert!(a.content().is_empty());
        assert_eq!(b.language(), &Language::TYPESCRIPT);
    }

    #[test]
    fn delete_folder_reports_owned_files() {
        let (tree, folder, a, b) = sample();
        let (after, diff) = tree.delete_folder(&folder);
        assert!(after.is_empty());
        assert!(diff.removed_file(a.id()));
        assert!(diff.removed_file(b.id()));
        assert!(diff.removed.contains(&NodeId::Folder(folder)));
    }

    #[test]
    fn delete_missing_nodes_is_a_no_op() {
        let (tree, folder, a, _) = sample();
        let (same, diff) = tree.delete_folder(&FolderId::from_string("ghost"));
        assert!(diff.is_empty());
        assert_eq!(same, tree);
        assert_eq!(same.revision(), tree.revision());

        let (same, diff) = tree.delete_file(&folder, &FileId::from_string("ghost"));
        assert!(diff.is_empty());
        assert_eq!(same, tree);

        let (other_tree, other) = tree.create_folder("other");
        let (same, diff) = other_tree.delete_file(&other, a.id());
        assert!(diff.is_empty(), "file must be deleted from its own folder");
        assert!(same.file(a.id()).is_some());
    }

    #[test]
    fn update_file_searches_every_folder() {
        let (tree, _, a, _) = sample();
        let (tree, _) = tree.create_folder("later");
        let tree = tree.update_file(a.clone().with_content("x=1")).unwrap();
        assert_eq!(tree.file(a.id()).unwrap().content(), "x=1");
    }

    #[test]
    fn update_unknown_file_is_not_found() {
        let (tree, _, a, _) = sample();
        let (tree, _) = tree.delete_file(tree.folder_of(a.id()).unwrap().id(), a.id());
        let err = tree.update_file(a.clone()).unwrap_err();
        assert_eq!(err, ProjectTreeError::FileNotFound(a.id().clone()));
    }

    #[test]
    fn rename_and_language_keep_id_and_content() {
        let (tree, folder, a, _) = sample();
        let tree = tree.update_file(a.clone().with_content("let x;")).unwrap();
        let tree = tree.rename_file(a.id(), "main.ts").unwrap();
        let tree = tree
            .set_file_language(a.id(), Language::TYPESCRIPT)
            .unwrap();
        let tree = tree.rename_folder(&folder, "lib").unwrap();

        let file = tree.file(a.id()).unwrap();
        assert_eq!(file.name(), "main.ts");
        assert_eq!(file.content(), "let x;");
        assert_eq!(file.language(), &Language::TYPESCRIPT);
        assert_eq!(tree.folder(&folder).unwrap().name(), "lib");
    }

    #[test]
    fn deserialized_tree_seeds_counter_past_stored_ids() {
        let json = r#"[{"id":"00000000000000ff","name":"p","files":[
            {"id":"0000000000000100","name":"a.js","content":"","language":{"code":"js","name":"JavaScript"}}
        ]}]"#;
        let tree: ProjectTree = serde_json::from_str(json).unwrap();
        let (_, id) = tree.create_folder("next");
        assert_eq!(id.as_str(), "0000000000000101");
    }

    #[test]
    fn deserialized_duplicates_are_reassigned() {
        let json = r#"[{"id":"1","name":"p","files":[
            {"id":"7","name":"a.js","content":"a"},
            {"id":"7","name":"b.js","content":"b"}
        ]}]"#;
        let tree: ProjectTree = serde_json::from_str(json).unwrap();
        let ids: HashSet<_> = tree.files().map(|file| file.id().clone()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(tree.folders()[0].files()[0].id().as_str(), "7");
        assert_eq!(tree.folders()[0].files()[1].content(), "b");
    }

    #[test]
    fn serialized_form_is_the_folder_array() {
        let (tree, _, _, _) = sample();
        let value = serde_json::to_value(&tree).unwrap();
        let folders = value.as_array().expect("tree serializes as an array");
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0]["files"][1]["language"]["code"], "ts");
    }
}
