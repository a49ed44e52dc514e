use crate::{resolve::Intent, txn::TransactionMeta};

/// The error a blocked request carries back to its client after a conflict
/// with one or more intents.
///
/// The `resolved` flag governs the client's retry behavior: when `true` the
/// conflicting transactions were all dealt with and the client should retry
/// immediately; when `false` it should back off first.
#[derive(Debug, Clone)]
pub struct WriteIntentError {
    pub intents: Vec<Intent>,
    pub resolved: bool,
}

#[derive(Debug, Display, Error, From)]
pub enum SquallError {
    #[display(
        "conflicting intents on {} key(s) (resolved={})",
        _0.intents.len(),
        _0.resolved
    )]
    WriteIntent(#[error(not(source))] WriteIntentError),

    #[from(skip)]
    #[display("failed to push transaction {}", pushee.id)]
    TransactionPush {
        #[error(not(source))]
        pushee: TransactionMeta,
    },

    #[display("operation exceeded its deadline: {}", _0)]
    TaskTimeout(tokio::time::error::Elapsed),

    #[display("{}", _0)]
    Other(#[error(not(source))] &'static str),
}

pub type SquallResult<T> = Result<T, SquallError>;
