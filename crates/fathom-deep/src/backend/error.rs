use thiserror::Error;

/// Path validation and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),
    #[error("path traversal not allowed: {0}")]
    Traversal(String),
    #[error("path escapes the configured root: {0}")]
    PathOutsideRoot(String),
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
}

impl PathError {
    pub fn kind(&self) -> &'static str {
        match self {
            PathError::NotAbsolute(_) => "NotAbsolute",
            PathError::Traversal(_) => "Traversal",
            PathError::PathOutsideRoot(_) => "PathOutsideRoot",
            PathError::NotFound(_) => "NotFound",
            PathError::IsDirectory(_) => "IsDirectory",
            PathError::NotDirectory(_) => "NotDirectory",
        }
    }
}

/// Structural edit failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("old_string not found in file")]
    OldNotFound,
    #[error("old_string occurs {0} times; pass replace_all=true to replace every occurrence")]
    OldNotUnique(usize),
    #[error("old_string must not be empty")]
    EmptyOldString,
    #[error("old_string and new_string are identical")]
    NoChange,
}

impl EditError {
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::OldNotFound => "OldNotFound",
            EditError::OldNotUnique(_) => "OldNotUnique",
            EditError::EmptyOldString => "EmptyOldString",
            EditError::NoChange => "NoChange",
        }
    }
}

/// Storage-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend does not support execution")]
    CapabilityUnavailable,
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Io(_) => "IOError",
            BackendError::PermissionDenied(_) => "PermissionDenied",
            BackendError::CapabilityUnavailable => "CapabilityUnavailable",
        }
    }
}

/// Unified filesystem error: path, edit, or storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FsError {
    /// Stable kind string for `{error_kind, message}` tool payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            FsError::Path(e) => e.kind(),
            FsError::Edit(e) => e.kind(),
            FsError::Backend(e) => e.kind(),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                FsError::Backend(BackendError::PermissionDenied(e.to_string()))
            }
            _ => FsError::Backend(BackendError::Io(e.to_string())),
        }
    }
}
