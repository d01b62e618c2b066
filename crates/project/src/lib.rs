//! Project tree state for the TreePad editor shell.
//! TreePad 編輯器外殼的專案樹狀態。
//!
//! Folders own ordered files, one file at a time may be current, and every
//! confirmed change is written to a [`DurableStore`] as a full snapshot.

pub mod language;
pub mod selection;
pub mod session;
pub mod state;
pub mod store;
pub mod tree;
pub mod workspace;

pub use language::Language;
pub use selection::Selection;
pub use session::{EditorSession, EditorView, RunCapability, RunReport, RunRequest};
pub use state::{reduce, Action, Created, Effect, Notice, ProjectState, Transition};
pub use store::{DirectoryStore, DurableStore, MemoryStore, StoreError};
pub use tree::{
    File, FileId, Folder, FolderId, NodeId, ProjectTree, ProjectTreeDiff, ProjectTreeError,
};
pub use workspace::{DispatchResult, StoreKeys, Workspace};
