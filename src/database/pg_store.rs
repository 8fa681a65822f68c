//! PostgreSQL implementation of the bootstrap store ports.
//!
//! Tolerant batches run inside one transaction with a savepoint per record:
//! a failing record rolls back to its savepoint and the batch carries on.

use async_trait::async_trait;
use sqlx::{Connection, PgPool};

use crate::error::{BootstrapError, Result};
use crate::model::{
    NewApplication, NewSurvey, NewUser, ProgramRow, ProgramStatus, UserRole, UserRow,
};
use crate::ports::{
    ApplicationStore, BatchOutcome, ColumnState, ProgramStore, RecordFailure, SchemaStore,
    SurveyStore, UserStore,
};
use crate::schema::{BackfillRule, ColumnSpec};
use crate::seed::split_statements;

const BASELINE_SQL: &str = include_str!("../../sql/baseline.sql");

pub struct PgBootstrapStore {
    pool: PgPool,
}

impl PgBootstrapStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let (n,) = sqlx::query_as::<_, (i64,)>(&format!("SELECT COUNT(*) FROM {}", quote(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

/// Quote an identifier for interpolation into DDL.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[async_trait]
impl SchemaStore for PgBootstrapStore {
    async fn ensure_baseline(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in split_statements(BASELINE_SQL) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn inspect_column(&self, table: &str, column: &str) -> Result<Option<ColumnState>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT is_nullable
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = $1
              AND column_name = $2
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(is_nullable,)| ColumnState {
            nullable: is_nullable == "YES",
        }))
    }

    async fn add_nullable_column(&self, spec: &ColumnSpec) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote(spec.table),
            quote(spec.column),
            spec.column_type.sql()
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn backfill(&self, spec: &ColumnSpec) -> Result<u64> {
        let BackfillRule::OffsetDays { source, days } = spec.backfill else {
            return Ok(0);
        };
        let days = i32::try_from(days)
            .map_err(|_| BootstrapError::Schema(format!("backfill offset {days} out of range")))?;

        let sql = format!(
            "UPDATE {table} SET {column} = {source} + make_interval(days => $1) \
             WHERE {column} IS NULL AND {source} IS NOT NULL",
            table = quote(spec.table),
            column = quote(spec.column),
            source = quote(source),
        );
        let result = sqlx::query(&sql).bind(days).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
            quote(table),
            quote(column)
        );
        let (n,) = sqlx::query_as::<_, (i64,)>(&sql)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn set_not_null(&self, spec: &ColumnSpec) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            quote(spec.table),
            quote(spec.column)
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgBootstrapStore {
    async fn count_users(&self) -> Result<i64> {
        self.count("users").await
    }

    async fn insert_users(&self, users: &[NewUser]) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for (index, user) in users.iter().enumerate() {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            let result = sqlx::query(
                r#"
                INSERT INTO users
                    (student_num, name, email, phone, password, birth_date, department, grade, role)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(user.student_num)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.password_hash)
            .bind(user.birth_date)
            .bind(&user.department)
            .bind(user.grade)
            .bind(user.role.as_str())
            .execute(&mut *savepoint)
            .await;

            match result {
                Ok(_) => {
                    savepoint.commit().await?;
                    outcome.inserted += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    outcome
                        .failures
                        .push(RecordFailure::new(index, user.student_num.to_string(), e));
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn users_by_role(&self, role: UserRole) -> Result<Vec<UserRow>> {
        let rows = sqlx::query_as::<_, (i64, i32, String)>(
            "SELECT user_id, student_num, name FROM users WHERE role = $1 ORDER BY user_id",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, student_num, name)| UserRow {
                user_id,
                student_num,
                name,
                role,
            })
            .collect())
    }
}

#[async_trait]
impl ProgramStore for PgBootstrapStore {
    async fn count_programs(&self) -> Result<i64> {
        self.count("programs").await
    }

    async fn has_program_marker(&self, status: ProgramStatus, year: i32) -> Result<bool> {
        let (found,) = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM programs
                WHERE status = $1
                  AND EXTRACT(YEAR FROM application_start_date) = $2
            )
            "#,
        )
        .bind(status.as_str())
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn wipe_programs(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE programs RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn execute_statements(&self, statements: &[String]) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for (index, statement) in statements.iter().enumerate() {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match sqlx::query(statement).execute(&mut *savepoint).await {
                Ok(done) => {
                    savepoint.commit().await?;
                    outcome.inserted += done.rows_affected();
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    outcome.failures.push(RecordFailure::new(
                        index,
                        format!("statement {}", index + 1),
                        e,
                    ));
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn programs_by_status(
        &self,
        status: ProgramStatus,
        limit: i64,
    ) -> Result<Vec<ProgramRow>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT program_id, title FROM programs WHERE status = $1 ORDER BY program_id LIMIT $2",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(program_id, title)| ProgramRow {
                program_id,
                title,
                status,
            })
            .collect())
    }
}

#[async_trait]
impl ApplicationStore for PgBootstrapStore {
    async fn count_applications(&self) -> Result<i64> {
        self.count("program_applications").await
    }

    async fn insert_applications(&self, applications: &[NewApplication]) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = BatchOutcome::default();

        for (index, app) in applications.iter().enumerate() {
            let t = &app.timestamps;
            let mut savepoint = Connection::begin(&mut *tx).await?;
            let result = sqlx::query(
                r#"
                INSERT INTO program_applications
                    (program_id, user_id, status, applied_at, approved_at,
                     rejected_at, rejection_reason, cancelled_at, completed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(app.program_id)
            .bind(app.user_id)
            .bind(app.status.as_str())
            .bind(app.applied_at)
            .bind(t.approved_at)
            .bind(t.rejected_at)
            .bind(app.rejection_reason.as_deref())
            .bind(t.cancelled_at)
            .bind(t.completed_at)
            .execute(&mut *savepoint)
            .await;

            match result {
                Ok(_) => {
                    savepoint.commit().await?;
                    outcome.inserted += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    outcome.failures.push(RecordFailure::new(
                        index,
                        format!("program {} / user {}", app.program_id, app.user_id),
                        e,
                    ));
                }
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl SurveyStore for PgBootstrapStore {
    async fn count_surveys(&self) -> Result<i64> {
        self.count("surveys").await
    }

    async fn insert_survey(&self, survey: &NewSurvey) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let (survey_id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO surveys
                (title, description, start_date, end_date, is_anonymous, is_active,
                 target_type, allow_multiple_responses, show_results, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING survey_id
            "#,
        )
        .bind(&survey.title)
        .bind(&survey.description)
        .bind(survey.start_date)
        .bind(survey.end_date)
        .bind(survey.is_anonymous)
        .bind(survey.is_active)
        .bind(survey.target_type.as_str())
        .bind(survey.allow_multiple_responses)
        .bind(survey.show_results)
        .bind(survey.created_by)
        .fetch_one(&mut *tx)
        .await?;

        for question in &survey.questions {
            let scale = question.scale.as_ref();
            let (question_id,) = sqlx::query_as::<_, (i64,)>(
                r#"
                INSERT INTO survey_questions
                    (survey_id, question_type, question_text, is_required, display_order,
                     scale_min, scale_max, scale_min_label, scale_max_label)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING question_id
                "#,
            )
            .bind(survey_id)
            .bind(question.question_type.as_str())
            .bind(&question.question_text)
            .bind(question.is_required)
            .bind(question.display_order)
            .bind(scale.map(|s| s.min))
            .bind(scale.map(|s| s.max))
            .bind(scale.map(|s| s.min_label.as_str()))
            .bind(scale.map(|s| s.max_label.as_str()))
            .fetch_one(&mut *tx)
            .await?;

            for (order, option) in question.options.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO survey_question_options (question_id, option_text, display_order)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(question_id)
                .bind(option)
                .bind(order as i32)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(survey_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote("programs"), "\"programs\"");
        assert_eq!(quote("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn baseline_creates_six_tables() {
        let statements = split_statements(BASELINE_SQL);
        assert_eq!(statements.len(), 6);
        assert!(statements
            .iter()
            .all(|s| s.starts_with("CREATE TABLE IF NOT EXISTS")));
    }
}
