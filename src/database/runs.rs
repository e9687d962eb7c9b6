//! Postgres-backed run store
//!
//! Transitions are a single conditional `UPDATE`: the row only changes when
//! its current status is one of the target's legal predecessors, so two
//! processes racing to start the same run cannot both succeed.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::types::Json;

use super::Database;
use crate::models::ProgressNote;
use crate::models::RunRecord;
use crate::models::RunResult;
use crate::models::RunStatus;
use crate::models::Transition;
use crate::models::TransitionOutcome;
use crate::store::log_outcome;
use crate::store::validate_new_run;
use crate::store::RunStore;
use crate::store::MAX_LIST_LIMIT;
use crate::RagRunError;
use crate::Result;

const RUN_COLUMNS: &str = "id, question, status, result, error, progress, created_at, completed_at";

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: String,
    question: String,
    status: String,
    result: Option<Json<RunResult>>,
    error: Option<String>,
    progress: Json<Vec<ProgressNote>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = RagRunError;

    fn try_from(row: RunRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            question: row.question,
            result: row.result.map(|json| json.0),
            error: row.error,
            progress: row.progress.0,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

impl Database {
    async fn fetch_run(&self, id: &str) -> Result<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1");
        sqlx::query_as::<_, RunRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(RunRecord::try_from)
            .transpose()
    }
}

#[async_trait]
impl RunStore for Database {
    async fn create_run(&self, id: &str, question: &str) -> Result<RunRecord> {
        validate_new_run(id, question)?;
        let record = RunRecord::new(id, question);

        let sql = format!(
            r"
            INSERT INTO runs (id, question, status, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            RETURNING {RUN_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(&record.id)
            .bind(&record.question)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => RunRecord::try_from(row),
            None => Err(RagRunError::DuplicateRun(id.to_string())),
        }
    }

    async fn load_run(&self, id: &str) -> Result<RunRecord> {
        self.fetch_run(id)
            .await?
            .ok_or_else(|| RagRunError::RunNotFound(id.to_string()))
    }

    async fn transition(&self, id: &str, transition: Transition) -> Result<TransitionOutcome> {
        let target = transition.target();
        let predecessors: Vec<String> = target
            .predecessors()
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();
        let (result, error) = match transition {
            Transition::Start => (None, None),
            Transition::Complete(result) => (Some(Json(result)), None),
            Transition::Fail(error) => (None, Some(error)),
        };

        let sql = format!(
            r"
            UPDATE runs
            SET status = $2,
                result = COALESCE($3, result),
                error = COALESCE($4, error),
                completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END
            WHERE id = $1 AND status = ANY($6)
            RETURNING {RUN_COLUMNS}
            "
        );
        let updated = sqlx::query_as::<_, RunRow>(&sql)
            .bind(id)
            .bind(target.as_str())
            .bind(result)
            .bind(error)
            .bind(target.is_terminal())
            .bind(predecessors)
            .fetch_optional(&self.pool)
            .await?;

        let outcome = match updated {
            Some(row) => TransitionOutcome::Applied(RunRecord::try_from(row)?),
            None => {
                let current = self.load_run(id).await?;
                if current.is_terminal() {
                    TransitionOutcome::AlreadyTerminal(current)
                } else {
                    TransitionOutcome::Rejected(current)
                }
            }
        };

        log_outcome(id, target, &outcome);
        Ok(outcome)
    }

    async fn record_progress(&self, id: &str, note: ProgressNote) -> Result<bool> {
        let updated = sqlx::query(
            r"
            UPDATE runs
            SET progress = progress || $2
            WHERE id = $1 AND status IN ('pending', 'running')
            ",
        )
        .bind(id)
        .bind(Json(vec![note]))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish "terminal" from "unknown id"
        self.load_run(id).await.map(|_| false)
    }

    async fn list_runs(&self, status: Option<RunStatus>, limit: usize) -> Result<Vec<RunRecord>> {
        let sql = format!(
            r"
            SELECT {RUN_COLUMNS} FROM runs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(status.map(RunStatus::as_str))
            .bind(limit.min(MAX_LIST_LIMIT) as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RunRecord::try_from).collect()
    }
}
