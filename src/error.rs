use thiserror::Error;

use crate::driver::DriverError;
use crate::types::RowValues;

/// Coarse classification surfaced with every error so callers can decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller handed the middleware something it can never run: wrong arity, a value that
    /// does not fit, an inconsistent batch. Retrying the same call fails the same way.
    Programming,
    /// The engine, the connection or the pool failed. The same call may succeed later.
    Environment,
}

/// SQL text and parameters that were submitted when a statement-level operation failed.
///
/// Single statements carry one parameter tuple; batches carry every tuple that was submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    pub sql: String,
    pub params: Vec<Vec<RowValues>>,
}

/// Contextual error payload: `{message, cause, context: {sql, params}, category}`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StatementError {
    pub message: String,
    #[source]
    pub cause: Option<Box<SqlMiddlewareDbError>>,
    pub context: ErrorContext,
    pub category: ErrorCategory,
}

#[derive(Debug, Error)]
pub enum SqlMiddlewareDbError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Value conversion error: {0}")]
    ConversionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Program call error: {0}")]
    ProgramError(String),

    #[error(transparent)]
    Statement(Box<StatementError>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl SqlMiddlewareDbError {
    /// Classify this error as a caller bug or an environment failure.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Driver(_) | Self::PoolError(_) | Self::ConnectionError(_) => {
                ErrorCategory::Environment
            }
            Self::Statement(err) => err.category,
            Self::ParameterError(_)
            | Self::ConversionError(_)
            | Self::ExecutionError(_)
            | Self::ProgramError(_)
            | Self::ConfigError(_)
            | Self::Unimplemented(_) => ErrorCategory::Programming,
        }
    }

    /// SQL and parameters attached to a statement-level failure, if any.
    #[must_use]
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Statement(err) => Some(&err.context),
            _ => None,
        }
    }

    /// Wrap `self` with the statement it came from. Errors that already carry context pass
    /// through untouched so the innermost (most precise) context wins.
    #[must_use]
    pub fn with_context(self, sql: &str, params: &[Vec<RowValues>]) -> Self {
        if matches!(self, Self::Statement(_)) {
            return self;
        }
        let category = self.category();
        let message = self.to_string();
        StatementError {
            message,
            cause: Some(Box::new(self)),
            context: ErrorContext {
                sql: sql.to_owned(),
                params: params.to_vec(),
            },
            category,
        }
        .into()
    }

    /// A caller-programming error raised by the middleware itself, with statement context.
    #[must_use]
    pub fn programming(message: impl Into<String>, sql: &str, params: &[Vec<RowValues>]) -> Self {
        StatementError {
            message: message.into(),
            cause: None,
            context: ErrorContext {
                sql: sql.to_owned(),
                params: params.to_vec(),
            },
            category: ErrorCategory::Programming,
        }
        .into()
    }
}

impl From<StatementError> for SqlMiddlewareDbError {
    fn from(err: StatementError) -> Self {
        SqlMiddlewareDbError::Statement(Box::new(err))
    }
}

impl From<bb8::RunError<DriverError>> for SqlMiddlewareDbError {
    fn from(err: bb8::RunError<DriverError>) -> Self {
        match err {
            bb8::RunError::User(driver) => SqlMiddlewareDbError::Driver(driver),
            bb8::RunError::TimedOut => {
                SqlMiddlewareDbError::PoolError("timed out waiting for a connection".into())
            }
        }
    }
}
