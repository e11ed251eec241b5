//! Domain error types.
//!
//! Business rejections (insufficient cash, insufficient sellable volume,
//! missing position) are *not* errors — they surface through `Order.status`.
//! This enum covers configuration problems, collaborator I/O, and fatal
//! ledger invariant violations.

/// Top-level error type for trademill.
#[derive(Debug, thiserror::Error)]
pub enum TrademillError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("bad input data: {reason}")]
    Data { reason: String },

    #[error("journal write failed: {reason}")]
    Journal { reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    /// A sell passed the availability pre-check but the lot drain still ran
    /// dry. Indicates a bookkeeping bug, never bad caller input.
    #[error("insufficient lots for {symbol}: requested {requested}, eligible {available}")]
    InsufficientLots {
        symbol: String,
        requested: i64,
        available: i64,
    },

    /// The ledger was asked to absorb a fill it cannot represent without
    /// breaking an invariant (e.g. a live buy that would drive cash negative).
    #[error("ledger invariant violated: {reason}")]
    LedgerInvariant { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TrademillError> for std::process::ExitCode {
    fn from(err: &TrademillError) -> Self {
        let code: u8 = match err {
            TrademillError::Io(_) => 1,
            TrademillError::ConfigParse { .. }
            | TrademillError::ConfigMissing { .. }
            | TrademillError::ConfigInvalid { .. } => 2,
            TrademillError::Data { .. } | TrademillError::Csv(_) => 3,
            TrademillError::Journal { .. } | TrademillError::Broker { .. } => 4,
            TrademillError::InsufficientLots { .. } | TrademillError::LedgerInvariant { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
