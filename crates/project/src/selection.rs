use crate::tree::{File, FileId, ProjectTree, ProjectTreeError};

/// Tracks the file currently open for editing.
/// 追蹤目前開啟編輯中的檔案。
///
/// The held value must always equal the tree's copy of the same file. Callers
/// run [`Selection::reconcile`] after every tree mutation to restore that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    current: Option<File>,
}

impl Selection {
    pub fn none() -> Self {
        Self { current: None }
    }

    /// Selection after loading a tree: first file of the first folder, if any.
    /// 載入後的預設選取：第一個資料夾的第一個檔案。
    pub fn initial(tree: &ProjectTree) -> Self {
        Self {
            current: tree.first_file().cloned(),
        }
    }

    pub fn current(&self) -> Option<&File> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&FileId> {
        self.current.as_ref().map(File::id)
    }

    pub fn is_current(&self, id: &FileId) -> bool {
        self.current_id() == Some(id)
    }

    /// Makes `file` current as given; the caller passes the authoritative copy.
    pub fn select(&mut self, file: File) {
        self.current = Some(file);
    }

    /// Resolves `id` against the tree and selects the stored copy.
    pub fn select_by_id(&mut self, tree: &ProjectTree, id: &FileId) -> Result<(), ProjectTreeError> {
        let file = tree
            .file(id)
            .ok_or_else(|| ProjectTreeError::FileNotFound(id.clone()))?;
        self.current = Some(file.clone());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Refreshes the current file from `tree`, clearing it when the file is gone.
    /// Returns `true` when the selection changed.
    /// 依據專案樹刷新目前檔案；檔案已被刪除時清除選取。
    pub fn reconcile(&mut self, tree: &ProjectTree) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        match tree.file(current.id()) {
            Some(stored) if stored == current => false,
            Some(stored) => {
                self.current = Some(stored.clone());
                true
            }
            None => {
                self.current = None;
                true
            }
        }
    }
}
