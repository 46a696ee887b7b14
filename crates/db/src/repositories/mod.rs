use chrono::{DateTime, Utc};
use thiserror::Error;

use dcx_core::store::StoreError;

pub mod call_session;
pub mod cap_ledger;
pub mod catalog;
pub mod memory;

pub use call_session::SqlCallSessionRepository;
pub use cap_ledger::SqlCapLedger;
pub use catalog::SqlOfferCatalog;
pub use memory::InMemoryExchangeStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
            RepositoryError::NotFound(message) => Self::NotFound(message),
        }
    }
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_i32(column: &str, value: i64) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected i32): {value}"))
    })
}

pub(crate) fn parse_optional_u32(
    column: &str,
    value: Option<i64>,
) -> Result<Option<u32>, RepositoryError> {
    value
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!(
                    "invalid value for `{column}` (expected non-negative u32): {value}"
                ))
            })
        })
        .transpose()
}
