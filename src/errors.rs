use thiserror::Error;

/// Errors that can arise anywhere in the game server.
///
/// Every variant maps to a numeric wire code carried in the `ErrorID` field of
/// server frames, and is classified as retryable or critical for the benefit
/// of callers that loop (hardware bridge, store init) or abort (startup).
#[derive(Debug, Error)]
pub enum GameError {
    /// A request carried a value outside its allowed domain.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Returned when fetching a record or entity that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks the VIP tier or role for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The game state machine rejected the operation (wrong phase, no room).
    #[error("game state error: {0}")]
    GameState(String),

    /// Insufficient balance for a debit.
    #[error("insufficient coins")]
    InsufficientCoins,

    /// Bet parameters out of tier or multiplier bounds.
    #[error("invalid bet: {0}")]
    InvalidBet(String),

    /// A slot spin was requested while one is still resolving.
    #[error("spin in progress")]
    SpinInProgress,

    /// The serial device could not be opened.
    #[error("serial open failed: {0}")]
    SerialOpen(String),

    /// The serial device stopped answering within its deadline.
    #[error("serial timeout")]
    SerialTimeout,

    /// The hardware link is down.
    #[error("device offline")]
    DeviceOffline,

    /// WebSocket connect/upgrade failure.
    #[error("websocket connect: {0}")]
    WsConnect(String),

    /// WebSocket send failure.
    #[error("websocket send: {0}")]
    WsSend(String),

    /// WebSocket receive failure.
    #[error("websocket receive: {0}")]
    WsReceive(String),

    /// The peer closed the connection.
    #[error("websocket closed")]
    WsClosed,

    /// Frame or payload bytes did not parse.
    #[error("message format: {0}")]
    MessageFormat(String),

    /// The store could not be opened.
    #[error("store connect: {0}")]
    DbConnect(String),

    /// Wrapper around sled's error type.
    #[error("store error: {0}")]
    DbQuery(#[from] sled::Error),

    /// A store insert failed.
    #[error("store insert: {0}")]
    DbInsert(String),

    /// A store update failed.
    #[error("store update: {0}")]
    DbUpdate(String),

    /// A multi-tree transaction aborted or conflicted.
    #[error("store transaction: {0}")]
    DbTransaction(String),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("data integrity: {0}")]
    DataIntegrity(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable.
    #[error("config load: {0}")]
    ConfigLoad(String),

    /// Config file did not parse.
    #[error("config parse: {0}")]
    ConfigParse(String),

    /// Config values failed validation.
    #[error("config validate: {0}")]
    ConfigValidate(String),

    /// A required config section or key is absent.
    #[error("config missing: {0}")]
    ConfigMissing(String),

    /// Authentication failure.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Authorization failure.
    #[error("authorization failed: {0}")]
    Authz(String),

    /// Presented token has expired.
    #[error("token expired")]
    TokenExpired,

    /// Presented token is malformed or signed wrong.
    #[error("token invalid")]
    TokenInvalid,

    /// Caller exceeded a rate limit.
    #[error("rate limited")]
    RateLimited,
}

/// Wire code for a frame answering an unknown command id.
pub const CODE_UNKNOWN_CMD: u16 = 1000;

impl GameError {
    /// Numeric code carried in the `ErrorID` field of server frames.
    pub fn wire_code(&self) -> u16 {
        match self {
            GameError::InvalidParam(_) => 1001,
            GameError::NotFound(_) => 1002,
            GameError::PermissionDenied(_) => 1003,
            GameError::Timeout(_) => 1004,
            GameError::GameState(_) => 1101,
            GameError::InsufficientCoins => 1102,
            GameError::InvalidBet(_) => 1103,
            GameError::SpinInProgress => 1104,
            GameError::SerialOpen(_) => 1201,
            GameError::SerialTimeout => 1202,
            GameError::DeviceOffline => 1203,
            GameError::WsConnect(_) => 1301,
            GameError::WsSend(_) => 1302,
            GameError::WsReceive(_) => 1303,
            GameError::WsClosed => 1304,
            GameError::MessageFormat(_) => 1305,
            GameError::DbConnect(_) => 1401,
            GameError::DbQuery(_) => 1402,
            GameError::DbInsert(_) => 1403,
            GameError::DbUpdate(_) => 1404,
            GameError::DbTransaction(_) => 1405,
            GameError::DataIntegrity(_) => 1406,
            GameError::Io(_) => 1407,
            GameError::ConfigLoad(_) => 1501,
            GameError::ConfigParse(_) => 1502,
            GameError::ConfigValidate(_) => 1503,
            GameError::ConfigMissing(_) => 1504,
            GameError::Auth(_) => 1601,
            GameError::Authz(_) => 1602,
            GameError::TokenExpired => 1603,
            GameError::TokenInvalid => 1604,
            GameError::RateLimited => 1605,
        }
    }

    /// Whether a caller may reasonably retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameError::Timeout(_)
                | GameError::SerialTimeout
                | GameError::WsConnect(_)
                | GameError::DbConnect(_)
                | GameError::DeviceOffline
        )
    }

    /// Whether the error aborts startup when seen during boot. During steady
    /// state these are logged and the process continues.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            GameError::DbConnect(_)
                | GameError::SerialOpen(_)
                | GameError::ConfigLoad(_)
                | GameError::ConfigMissing(_)
                | GameError::DataIntegrity(_)
        )
    }
}

impl From<prost::DecodeError> for GameError {
    fn from(e: prost::DecodeError) -> Self {
        GameError::MessageFormat(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GameError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => GameError::WsClosed,
            other => GameError::WsReceive(other.to_string()),
        }
    }
}
