//! Error taxonomy for the core session/relay/routing engine (`spec.md` §7).

/// Errors surfaced by session, registry, relay, chat-room, and ICBM-router
/// operations. The dispatcher (in `aimsrv-handlers`) maps these onto the
/// six error classes of `spec.md` §7.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An identity is already registered and the caller did not opt into
    /// kicking the prior session (`spec.md` §4.3).
    #[error("identity already signed on: {0}")]
    AlreadySignedOn(String),

    /// No live session for the given identity.
    #[error("no such session: {0}")]
    NoSuchSession(String),

    /// A chat session referenced a room cookie that does not resolve to an
    /// existing room (`spec.md` §3, chat room invariant).
    #[error("no such chat room: exchange {exchange} cookie {cookie}")]
    NoSuchRoom { exchange: u16, cookie: String },

    /// A room with this (exchange, name) already exists.
    #[error("room already exists: {0}")]
    RoomAlreadyExists(String),

    /// A cookie failed MAC verification, was issued for a different
    /// service, or was otherwise malformed (`spec.md` §4.8).
    #[error("invalid service cookie: {0}")]
    InvalidCookie(&'static str),

    /// The session's outbox is closed or full past its bound (`spec.md`
    /// §4.2: "on overflow, close the session").
    #[error("session outbox closed")]
    OutboxClosed,

    /// The underlying repository failed.
    #[error("repository error: {0}")]
    Repo(#[from] aimsrv_db::RepoError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
