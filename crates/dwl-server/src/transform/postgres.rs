//! PostgreSQL-backed transform job and verifier

use async_trait::async_trait;
use dwl_common::DwlError;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::{InvocationError, InvocationRequest, LoadVerifier, TransformJob, VerificationError};
use crate::config::validate_identifier;

impl From<sqlx::Error> for InvocationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => InvocationError::ProcedureFailed {
                message: db.message().to_string(),
            },
            other => InvocationError::Connectivity {
                message: other.to_string(),
            },
        }
    }
}

/// Runs the transform as `CALL <procedure>(<paths>[, <start>])`
#[derive(Clone)]
pub struct PgTransformJob {
    pool: PgPool,
    procedure: String,
    pass_start_time: bool,
}

impl PgTransformJob {
    pub fn new(
        pool: PgPool,
        procedure: impl Into<String>,
        pass_start_time: bool,
    ) -> Result<Self, DwlError> {
        let procedure = procedure.into();
        validate_identifier(&procedure)?;
        Ok(Self {
            pool,
            procedure,
            pass_start_time,
        })
    }

    fn statement(&self) -> String {
        if self.pass_start_time {
            format!("CALL {}($1, $2)", self.procedure)
        } else {
            format!("CALL {}($1)", self.procedure)
        }
    }
}

#[async_trait]
impl TransformJob for PgTransformJob {
    #[instrument(skip(self, request), fields(procedure = %self.procedure, files = request.file_paths.len()))]
    async fn invoke(&self, request: &InvocationRequest) -> Result<(), InvocationError> {
        let paths = request.joined_paths()?;
        let statement = self.statement();

        let mut query = sqlx::query(&statement).bind(paths);
        if self.pass_start_time {
            query = query.bind(request.start_time);
        }

        query.execute(&self.pool).await?;

        debug!("Transform procedure returned");
        Ok(())
    }
}

/// Counts rows in the destination relation
#[derive(Clone)]
pub struct PgLoadVerifier {
    pool: PgPool,
    relation: String,
}

impl PgLoadVerifier {
    pub fn new(pool: PgPool, relation: impl Into<String>) -> Result<Self, DwlError> {
        let relation = relation.into();
        validate_identifier(&relation)?;
        Ok(Self { pool, relation })
    }
}

#[async_trait]
impl LoadVerifier for PgLoadVerifier {
    fn relation(&self) -> &str {
        &self.relation
    }

    #[instrument(skip(self), fields(relation = %self.relation))]
    async fn count_rows(&self) -> Result<i64, VerificationError> {
        let statement = format!("SELECT COUNT(*) FROM {}", self.relation);

        sqlx::query_scalar::<_, i64>(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VerificationError::QueryFailed {
                message: e.to_string(),
            })
    }
}
