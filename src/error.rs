use std::path::PathBuf;

/// Error type for override parsing, bookkeeping and write-back.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A structured-text lookup named a section that does not exist.
    #[error("section '{section}' not found in file '{}'", file.display())]
    SectionNotFound {
        /// Normalized (upper case) section name.
        section: String,
        /// File the store was parsed from.
        file: PathBuf,
    },

    /// A structured-text lookup named a key missing from its section.
    #[error("key '{key}' not found in section '{section}' in file '{}'", file.display())]
    KeyNotFound {
        /// Normalized (lower case) key name.
        key: String,
        /// Normalized (upper case) section name.
        section: String,
        /// File the store was parsed from.
        file: PathBuf,
    },

    /// A boolean accessor was used on a value outside the boolean vocabulary.
    #[error("\"{key}\" is not a boolean ({value})")]
    NotBoolean {
        /// Key that was accessed.
        key: String,
        /// Its current text.
        value: String,
    },

    /// Invalid `category/package-version` identifier.
    #[error("invalid package identifier: {0}")]
    InvalidCpv(String),

    /// Invalid dependency string or token stream.
    #[error("invalid dependency string: {0}")]
    InvalidDependency(String),

    /// The package database does not know the identifier.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// Contradictory pending masking entries for a package version.
    #[error("conflicting values for masking status of {0}")]
    ConflictingOverrideState(String),

    /// A pending entry points past the end of its file.
    #[error("line {line} does not exist in '{}'", path.display())]
    LineOutOfRange {
        /// Override file being rewritten.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
    },

    /// The search pattern for override lines could not be built.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// I/O failure on an override or configuration file.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// File or directory the operation touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for portage-overrides operations.
pub type Result<T> = std::result::Result<T, Error>;
