use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(String),
    AlreadyExists(String),
    /// Every field problem found, reported together.
    Validation(Vec<String>),
    Expired,
    AlreadyUsed,
    Revoked,
    NoCandidates,
    /// The span is already claimed by another approved reservation or booking.
    SlotTaken(Ulid),
    /// An approval finished after its intent was cleared by a later decision.
    Superseded(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::Validation(errors) => write!(f, "{}", errors.join(" / ")),
            EngineError::Expired => write!(f, "link expired"),
            EngineError::AlreadyUsed => write!(f, "link already used"),
            EngineError::Revoked => write!(f, "link revoked"),
            EngineError::NoCandidates => write!(f, "reservation has no candidate slots"),
            EngineError::SlotTaken(other) => {
                write!(f, "slot overlaps an approved meeting: {other}")
            }
            EngineError::Superseded(id) => {
                write!(f, "approval of {id} was superseded by a later decision")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
