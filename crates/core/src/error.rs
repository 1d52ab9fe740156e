/// Result alias that carries the custom [`ChoreoError`] type.
pub type Result<T> = std::result::Result<T, ChoreoError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ChoreoError {
    /// The author picked the wrong number of actions. Generation never runs on
    /// a partial selection.
    #[error("selection must contain exactly {expected} actions, got {actual}")]
    InvalidSelectionSize { expected: usize, actual: usize },
    /// A caller-assembled grid or block sequence disagrees with the layout
    /// it is checked against.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),
    /// The stored version moved on since the caller captured its snapshot.
    /// Reload and retry.
    #[error(
        "program `{id}` was modified concurrently (expected version {}, found {})",
        fmt_version(.expected),
        fmt_version(.found)
    )]
    ConcurrentEditConflict {
        id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
    /// The persistence collaborator failed.
    #[error("persistence failure on {collection}/{key}: {source}")]
    Persistence {
        collection: String,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Playback sessions spawn timers and listeners and therefore need a
    /// running tokio runtime.
    #[error("playback requires a running async runtime")]
    NoRuntime,
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChoreoError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Wraps a collaborator failure for the given record.
    pub fn persistence<E>(collection: &str, key: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Persistence {
            collection: collection.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// Only edit conflicts are resolved by reloading and trying again; every
    /// other failure needs a different input or a working collaborator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentEditConflict { .. })
    }
}

fn fmt_version(version: &Option<u64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl From<&str> for ChoreoError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ChoreoError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
