use thiserror::Error;

/// Errors raised by a key/value engine.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("failed to open storage: {0}")]
    Open(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),
}

impl KvError {
    pub(crate) fn open(e: impl std::fmt::Display) -> Self {
        Self::Open(e.to_string())
    }

    pub(crate) fn read(e: impl std::fmt::Display) -> Self {
        Self::Read(e.to_string())
    }

    pub(crate) fn write(e: impl std::fmt::Display) -> Self {
        Self::Write(e.to_string())
    }
}

/// Errors surfaced by [`WhitelistStore`](crate::WhitelistStore).
///
/// "Not found" is never an error; absent keys read as `None` or as the slot
/// default.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] KvError),

    #[error("failed to read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: KvError,
    },

    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: KvError,
    },

    #[error("stored value for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}
