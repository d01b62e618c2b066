use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Language tag attached to a file: short code plus display name.
/// （附加在檔案上的語言標籤：代碼與顯示名稱。）
///
/// Two tags are equal when their codes are equal; the display name is
/// informational only.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Language {
    code: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl Language {
    pub const JAVASCRIPT: Language = Language {
        code: Cow::Borrowed("js"),
        name: Cow::Borrowed("JavaScript"),
    };

    pub const TYPESCRIPT: Language = Language {
        code: Cow::Borrowed("ts"),
        name: Cow::Borrowed("TypeScript"),
    };

    /// Languages offered by the header selector.
    /// （標頭選單提供的語言清單。）
    pub const BUILTIN: &'static [Language] = &[Language::JAVASCRIPT, Language::TYPESCRIPT];

    pub fn new(code: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a builtin language by code, ignoring ASCII case.
    /// （依代碼查詢內建語言，不分大小寫。）
    pub fn builtin(code: &str) -> Option<Language> {
        let code = code.trim();
        Self::BUILTIN
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
            .cloned()
    }

    /// Resolves a code to a builtin tag, or builds a custom one named after the code.
    /// （將代碼解析為內建語言；找不到時以代碼建立自訂標籤。）
    pub fn resolve(code: &str) -> Language {
        Self::builtin(code).unwrap_or_else(|| {
            let code = code.trim().to_string();
            Language::new(code.clone(), code)
        })
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::JAVASCRIPT
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Hash for Language {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
