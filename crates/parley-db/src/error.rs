use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    /// The session's identity was never synced into the user table.
    #[error("user profile not found")]
    ProfileNotFound,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not a participant of this conversation")]
    NotParticipant,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Invalid(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
