//! Boundary between the project state and the external editing widget.
//! 專案狀態與外部編輯器元件之間的邊界。
//!
//! The widget only sees read views and reports edits as plain text. It never
//! receives a way to mint or alter file and folder identifiers.

use treepad_settings::Theme;

use crate::language::Language;
use crate::store::DurableStore;
use crate::tree::{File, ProjectTreeError};
use crate::workspace::Workspace;

/// What the widget needs to render the current file.
/// 編輯器元件呈現目前檔案所需的資訊。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorView<'a> {
    pub file_name: &'a str,
    pub content: &'a str,
    pub language_code: &'a str,
    pub theme: Theme,
}

/// Input handed to a [`RunCapability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest<'a> {
    pub file_name: &'a str,
    pub language: &'a Language,
    pub content: &'a str,
}

/// Outcome of a run, opaque to the core beyond success and captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub success: bool,
    pub output: String,
}

impl RunReport {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// External facility able to execute a file's content.
/// 可執行檔案內容的外部功能。
pub trait RunCapability {
    fn run(&self, request: &RunRequest<'_>) -> RunReport;
}

impl<F> RunCapability for F
where
    F: Fn(&RunRequest<'_>) -> RunReport,
{
    fn run(&self, request: &RunRequest<'_>) -> RunReport {
        self(request)
    }
}

/// Editor-facing handle borrowed from a [`Workspace`].
pub struct EditorSession<'w, S: DurableStore> {
    workspace: &'w mut Workspace<S>,
}

impl<'w, S: DurableStore> EditorSession<'w, S> {
    pub(crate) fn new(workspace: &'w mut Workspace<S>) -> Self {
        Self { workspace }
    }

    pub fn current_file(&self) -> Option<&File> {
        self.workspace.current_file()
    }

    pub fn view(&self) -> Option<EditorView<'_>> {
        let theme = self.workspace.theme();
        self.workspace.current_file().map(|file| EditorView {
            file_name: file.name(),
            content: file.content(),
            language_code: file.language().code(),
            theme,
        })
    }

    /// Content-change callback. Nothing happens when no file is open.
    /// 內容變更回呼；沒有開啟的檔案時不做任何事。
    pub fn on_content_change(&mut self, content: impl Into<String>) -> Result<(), ProjectTreeError> {
        self.workspace.update_current_content(content.into())
    }

    /// Runs the current file through `runner`; `None` when no file is open.
    pub fn on_run(&self, runner: &dyn RunCapability) -> Option<RunReport> {
        let file = self.workspace.current_file()?;
        let request = RunRequest {
            file_name: file.name(),
            language: file.language(),
            content: file.content(),
        };
        tracing::info!(file = %file.id(), language = %file.language().code(), "run requested");
        let report = runner.run(&request);
        if !report.success {
            tracing::warn!(file = %file.id(), "run failed");
        }
        Some(report)
    }

    pub fn on_save(&mut self) -> Result<(), ProjectTreeError> {
        self.workspace.save()
    }

    pub fn on_reset(&mut self) -> Result<(), ProjectTreeError> {
        self.workspace.reset_current_content()
    }

    pub fn set_language(&mut self, language: Language) -> Result<(), ProjectTreeError> {
        self.workspace.set_selected_language(language)
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.workspace.toggle_theme()
    }
}
