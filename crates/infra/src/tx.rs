//! Transaction runner and the abort signal.
//!
//! Every core operation returns `Result<T, Abort>`; the runner commits on
//! `Ok` and rolls back on any `Abort`, which is the property that keeps the
//! normalized tables and the projection tables from ever being durably out
//! of sync: either both commit or neither does.

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Transaction};

use stagecraft_projection::RefreshError;

use crate::permissions::resolver::ResolveError;

/// Typed transaction-abort signal: an HTTP-equivalent status plus the cause.
///
/// The cause is for server-side logs; what a caller may see is
/// [`Abort::public_message`].
#[derive(Debug)]
pub struct Abort {
    status: u16,
    cause: anyhow::Error,
}

impl Abort {
    /// Authorization denial. Deliberately carries no internal detail.
    pub fn forbidden() -> Self {
        Self {
            status: 403,
            cause: anyhow::anyhow!("insufficient permissions"),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self {
            status: 404,
            cause: anyhow::anyhow!("{what} not found"),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: 400,
            cause: anyhow::anyhow!(msg.into()),
        }
    }

    /// Storage or programmer error; the cause is wrapped for logging and
    /// never leaks to the end caller.
    pub fn internal(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            status: 500,
            cause: cause.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// The stable, generic message a caller is allowed to see.
    pub fn public_message(&self) -> String {
        match self.status {
            400 => self.cause.to_string(),
            403 => "insufficient permissions".to_string(),
            404 => self.cause.to_string(),
            _ => "operation failed".to_string(),
        }
    }
}

impl core::fmt::Display for Abort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "abort {}: {}", self.status, self.cause)
    }
}

impl std::error::Error for Abort {}

impl From<RefreshError> for Abort {
    fn from(err: RefreshError) -> Self {
        Abort::internal(anyhow::Error::new(err).context("projection refresh failed"))
    }
}

impl From<ResolveError> for Abort {
    fn from(err: ResolveError) -> Self {
        Abort::internal(anyhow::Error::new(err))
    }
}

/// Result alias for transaction-scoped operations.
pub type TxResult<T> = Result<T, Abort>;

/// Run a unit of work inside one database transaction.
///
/// Commits only if the closure returns `Ok`; any `Abort` (gate denial,
/// refresh failure, storage failure) rolls the transaction back and is
/// returned unchanged. If the future is dropped mid-flight the transaction
/// rolls back when the handle drops, so a cancelled request can never commit
/// a partial mutation or a partial refresh.
pub async fn with_transaction<T, F>(pool: &PgPool, f: F) -> TxResult<T>
where
    F: for<'t> FnOnce(
        &'t mut Transaction<'static, Postgres>,
    ) -> Pin<Box<dyn Future<Output = TxResult<T>> + Send + 't>>,
{
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Abort::internal(anyhow::Error::new(e).context("failed to start transaction")))?;

    match f(&mut tx).await {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| Abort::internal(anyhow::Error::new(e).context("failed to commit transaction")))?;
            Ok(value)
        }
        Err(abort) => {
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, "rollback failed after abort");
            }
            Err(abort)
        }
    }
}
