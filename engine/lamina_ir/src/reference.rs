//! Custom function references.
//!
//! A [`FunctionReference`] names one custom function: the project slot it
//! occupies, the language runtime that owns it and where its source lives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Logical slot index of a custom function within a project.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    #[inline]
    pub const fn new(slot: u32) -> Self {
        FunctionId(slot)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Name of an external runtime kind (`"matlab"`, `"host"`, ...).
///
/// Sessions are pooled per runtime name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeName(String);

impl RuntimeName {
    /// Name of the bundled `lamina-host` runtime.
    pub const HOST: &'static str = "host";

    pub fn new(name: impl Into<String>) -> Self {
        RuntimeName(name.into())
    }

    pub fn host() -> Self {
        RuntimeName(Self::HOST.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Language tag of a custom function.
///
/// Part of the cache key: the same file under two tags yields two handles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Script executed by the embedded interpreter.
    Interpreted,
    /// Precompiled dynamically loadable module.
    NativeModule,
    /// Function hosted by an out-of-process runtime.
    External(RuntimeName),
}

impl Language {
    /// Short tag used in logs.
    pub fn tag(&self) -> &str {
        match self {
            Language::Interpreted => "interpreted",
            Language::NativeModule => "native-module",
            Language::External(runtime) => runtime.as_str(),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::External(runtime) => write!(f, "external-runtime({runtime})"),
            other => f.write_str(other.tag()),
        }
    }
}

/// Unrecognized language tag.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown custom function language `{0}`")]
pub struct ParseLanguageError(pub String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    /// Parse a language tag (case-insensitive).
    ///
    /// Accepts `interpreted`/`script`, `native-module`/`native`/`cpp`/`c`,
    /// `matlab` (shorthand for the `matlab` external runtime) and
    /// `external:<runtime>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "interpreted" | "script" => Ok(Language::Interpreted),
            "native-module" | "native" | "cpp" | "c" => Ok(Language::NativeModule),
            "matlab" => Ok(Language::External(RuntimeName::new("matlab"))),
            _ => match lower.strip_prefix("external:") {
                Some(runtime) if !runtime.is_empty() => {
                    Ok(Language::External(RuntimeName::new(runtime)))
                }
                _ => Err(ParseLanguageError(s.to_string())),
            },
        }
    }
}

/// Where a custom function's source lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocator {
    /// Containing directory.
    pub directory: PathBuf,
    /// File name inside `directory`.
    pub file_name: String,
    /// Explicit entry point; defaults to the file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

impl SourceLocator {
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        SourceLocator {
            directory: directory.into(),
            file_name: file_name.into(),
            entry_point: None,
        }
    }

    /// Split a full path into directory and file name.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        SourceLocator::new(directory, file_name)
    }

    #[must_use]
    pub fn with_entry_point(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = Some(entry.into());
        self
    }

    /// Full path of the source file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Name of the callable to resolve inside the source.
    pub fn entry(&self) -> &str {
        if let Some(entry) = &self.entry_point {
            return entry;
        }
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.file_name)
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())?;
        if let Some(entry) = &self.entry_point {
            write!(f, "::{entry}")?;
        }
        Ok(())
    }
}

/// Identifies one custom function of a project.
///
/// Immutable once built; a project replaces the whole reference to change a
/// slot's language or source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionReference {
    pub id: FunctionId,
    /// Display name chosen by the project author.
    pub name: String,
    pub language: Language,
    pub locator: SourceLocator,
}

impl FunctionReference {
    pub fn new(id: FunctionId, language: Language, locator: SourceLocator) -> Self {
        FunctionReference {
            id,
            name: locator.entry().to_string(),
            language,
            locator,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether both references resolve to the same loaded function.
    ///
    /// The display name is not part of the identity.
    pub fn same_target(&self, other: &FunctionReference) -> bool {
        self.id == other.id && self.language == other.language && self.locator == other.locator
    }
}

impl fmt::Display for FunctionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}] {}", self.id, self.name, self.language, self.locator)
    }
}
