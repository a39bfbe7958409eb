use std::fmt::{self, Display};

use crate::{
    constants::ALREADY_EXISTS_ERROR,
    error::{Error, HtmlError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    RowNotFound,
    Other,
}

pub struct QueryError {
    kind: QueryErrorKind,
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: QueryErrorKind::Other,
            info,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) if e.is_unique_violation() => Self {
                kind: QueryErrorKind::UniqueViolation,
                info: format!("{e}"),
            },
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => Self {
                kind: QueryErrorKind::ForeignKeyViolation,
                info: format!("{e}"),
            },
            sqlx::Error::RowNotFound => Self {
                kind: QueryErrorKind::RowNotFound,
                info: format!("RowNotFound"),
            },
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(format!("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(format!("Unknown error")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value.kind {
            QueryErrorKind::UniqueViolation => {
                log::debug!("unique constraint rejected write: {}", value.info);
                HtmlError::Conflict.new(ALREADY_EXISTS_ERROR)
            }
            QueryErrorKind::ForeignKeyViolation => {
                HtmlError::InvalidRequest.new("Referenced object does not exist")
            }
            QueryErrorKind::RowNotFound => HtmlError::NotFound.default(),
            QueryErrorKind::Other => {
                log::error!("query failed: {}", value.info);
                HtmlError::InternalServerError.new(&value.info)
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_is_404() {
        let error: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(error.kind, HtmlError::NotFound);
    }

    #[test]
    fn pool_errors_are_internal() {
        let error: Error = sqlx::Error::PoolTimedOut.into();
        assert_eq!(error.kind, HtmlError::InternalServerError);
        assert_eq!(error.info, "Pool timed out");
    }

    #[test]
    fn type_error_is_invalid_request() {
        let error: Error = TypeError::new("Invalid key").into();
        assert_eq!(error.code, 400);
    }
}
