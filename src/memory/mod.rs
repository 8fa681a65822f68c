//! In-process implementation of every store port.
//!
//! Tables are typed rows behind a mutex, declared to match `sql/baseline.sql`
//! closely enough that the same seed data succeeds or fails here the way it
//! would against Postgres: unknown tables and columns, NOT NULL, UNIQUE and
//! foreign-key violations are all rejected. Seed scripts are executed through
//! the INSERT parser in [`sql`].
//!
//! Faults can be injected by key (see [`MemoryStore::fail`]) to exercise the
//! bootstrap's failure paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{BootstrapError, Result};
use crate::model::{
    ApplicationStatus, NewApplication, NewSurvey, NewUser, ProgramRow, ProgramStatus,
    StatusTimestamps, UserRole, UserRow,
};
use crate::ports::{
    ApplicationStore, BatchOutcome, ColumnState, ProgramStore, RecordFailure, SchemaStore,
    SurveyStore, UserStore,
};
use crate::schema::{BackfillRule, ColumnSpec, ColumnType};

pub mod sql;

use sql::{parse_insert, Literal};

// =============================================================================
// VALUES AND TABLES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::Int(i),
            Literal::Text(s) => Value::Text(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

type Row = BTreeMap<String, Value>;

/// Value a column takes when an insert does not name it.
#[derive(Debug, Clone, PartialEq)]
enum Fill {
    Null,
    Identity,
    Now,
    Const(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnDef {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    unique: bool,
    fill: Fill,
    references: Option<&'static str>,
}

fn column(name: &str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name: name.to_string(),
        column_type,
        nullable: true,
        unique: false,
        fill: Fill::Null,
        references: None,
    }
}

fn identity(name: &str) -> ColumnDef {
    ColumnDef {
        fill: Fill::Identity,
        ..column(name, ColumnType::Integer).required()
    }
}

impl ColumnDef {
    fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn default_to(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }

    fn references(mut self, table: &'static str) -> Self {
        self.references = Some(table);
        self
    }

    /// Coerce `value` into this column's type, the way Postgres casts an
    /// untyped literal.
    fn conform(&self, value: Value) -> Result<Value> {
        use ColumnType as T;
        match (self.column_type, value) {
            (_, Value::Null) => Ok(Value::Null),
            (T::Text, v @ Value::Text(_))
            | (T::Integer, v @ Value::Int(_))
            | (T::Boolean, v @ Value::Bool(_))
            | (T::Date, v @ Value::Date(_))
            | (T::Timestamp, v @ Value::Timestamp(_)) => Ok(v),
            (T::Timestamp, Value::Date(d)) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
            (T::Date, Value::Timestamp(t)) => Ok(Value::Date(t.date())),
            (T::Timestamp, Value::Text(s)) => parse_timestamp(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| self.invalid(&s)),
            (T::Date, Value::Text(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| self.invalid(&s)),
            (_, other) => Err(self.invalid(&format!("{other:?}"))),
        }
    }

    fn invalid(&self, input: &str) -> BootstrapError {
        BootstrapError::InvalidRecord(format!(
            "invalid input for {} column \"{}\": {}",
            self.column_type.sql(),
            self.name,
            input
        ))
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[derive(Debug, Clone, PartialEq)]
struct Table {
    key: &'static str,
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn new(key: &'static str, columns: Vec<ColumnDef>) -> Self {
        Self {
            key,
            columns,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn ordered_rows(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.iter().collect();
        rows.sort_by_key(|r| match r.get(self.key) {
            Some(Value::Int(id)) => *id,
            _ => i64::MAX,
        });
        rows
    }
}

/// The tables `sql/baseline.sql` creates.
fn baseline_tables() -> Vec<(&'static str, Table)> {
    use ColumnType::{Boolean, Date, Integer, Text, Timestamp};
    vec![
        (
            "users",
            Table::new(
                "user_id",
                vec![
                    identity("user_id"),
                    column("student_num", Integer).required().unique(),
                    column("name", Text).required(),
                    column("email", Text).required().unique(),
                    column("phone", Text),
                    column("password", Text).required(),
                    column("birth_date", Date),
                    column("department", Text),
                    column("grade", Integer),
                    column("role", Text).required(),
                    column("locked", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(false))),
                    column("fail_cnt", Integer)
                        .required()
                        .default_to(Fill::Const(Value::Int(0))),
                    column("created_at", Timestamp).required().default_to(Fill::Now),
                ],
            ),
        ),
        (
            "programs",
            Table::new(
                "program_id",
                vec![
                    identity("program_id"),
                    column("title", Text).required(),
                    column("description", Text),
                    column("department", Text),
                    column("category", Text),
                    column("status", Text).required(),
                    column("capacity", Integer),
                    column("application_start_date", Timestamp).required(),
                    column("application_end_date", Timestamp).required(),
                    column("created_at", Timestamp).required().default_to(Fill::Now),
                ],
            ),
        ),
        (
            "program_applications",
            Table::new(
                "application_id",
                vec![
                    identity("application_id"),
                    column("program_id", Integer).required().references("programs"),
                    column("user_id", Integer).required().references("users"),
                    column("status", Text).required(),
                    column("applied_at", Timestamp).required(),
                    column("approved_at", Timestamp),
                    column("rejected_at", Timestamp),
                    column("rejection_reason", Text),
                    column("cancelled_at", Timestamp),
                    column("completed_at", Timestamp),
                ],
            ),
        ),
        (
            "surveys",
            Table::new(
                "survey_id",
                vec![
                    identity("survey_id"),
                    column("title", Text).required(),
                    column("description", Text),
                    column("start_date", Timestamp).required(),
                    column("end_date", Timestamp).required(),
                    column("is_anonymous", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(false))),
                    column("is_active", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(true))),
                    column("target_type", Text).required(),
                    column("allow_multiple_responses", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(false))),
                    column("show_results", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(false))),
                    column("created_by", Integer).references("users"),
                    column("created_at", Timestamp).required().default_to(Fill::Now),
                ],
            ),
        ),
        (
            "survey_questions",
            Table::new(
                "question_id",
                vec![
                    identity("question_id"),
                    column("survey_id", Integer).required().references("surveys"),
                    column("question_type", Text).required(),
                    column("question_text", Text).required(),
                    column("is_required", Boolean)
                        .required()
                        .default_to(Fill::Const(Value::Bool(false))),
                    column("display_order", Integer).required(),
                    column("scale_min", Integer),
                    column("scale_max", Integer),
                    column("scale_min_label", Text),
                    column("scale_max_label", Text),
                ],
            ),
        ),
        (
            "survey_question_options",
            Table::new(
                "option_id",
                vec![
                    identity("option_id"),
                    column("question_id", Integer)
                        .required()
                        .references("survey_questions"),
                    column("option_text", Text).required(),
                    column("display_order", Integer).required(),
                ],
            ),
        ),
    ]
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    faults: BTreeSet<String>,
}

fn no_relation(table: &str) -> BootstrapError {
    BootstrapError::Schema(format!("relation \"{table}\" does not exist"))
}

fn no_column(table: &str, column: &str) -> BootstrapError {
    BootstrapError::Schema(format!(
        "column \"{column}\" of relation \"{table}\" does not exist"
    ))
}

fn pairs<const N: usize>(values: [(&str, Value); N]) -> Vec<(String, Value)> {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

impl State {
    fn trip(&self, key: &str) -> Result<()> {
        if self.faults.contains(key) {
            Err(BootstrapError::Injected(key.to_string()))
        } else {
            Ok(())
        }
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| no_relation(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| no_relation(name))
    }

    fn count(&self, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    /// Run `f` and roll every table back if it fails.
    fn atomically<T>(&mut self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let saved = self.tables.clone();
        let result = f(self);
        if result.is_err() {
            self.tables = saved;
        }
        result
    }

    /// Insert one row with constraint checks. Returns the row's key.
    fn insert(&mut self, table_name: &str, values: Vec<(String, Value)>) -> Result<i64> {
        let table = self.table(table_name)?;

        let mut row = Row::new();
        for (name, value) in values {
            let def = table
                .column(&name)
                .ok_or_else(|| no_column(table_name, &name))?;
            let value = def.conform(value)?;
            if row.insert(name.clone(), value).is_some() {
                return Err(BootstrapError::Schema(format!(
                    "column \"{name}\" specified more than once"
                )));
            }
        }

        let mut took_identity = false;
        for def in &table.columns {
            if !row.contains_key(&def.name) {
                let value = match &def.fill {
                    Fill::Null => Value::Null,
                    Fill::Identity => {
                        took_identity = true;
                        Value::Int(table.next_id)
                    }
                    Fill::Now => Value::Timestamp(Utc::now().naive_utc()),
                    Fill::Const(v) => v.clone(),
                };
                row.insert(def.name.clone(), value);
            }
            self.check_constraints(table_name, table, def, &row)?;
        }

        let key = match row.get(table.key) {
            Some(Value::Int(k)) => *k,
            _ => {
                return Err(BootstrapError::Schema(format!(
                    "relation \"{table_name}\" has no integer key"
                )))
            }
        };

        let table = self.table_mut(table_name)?;
        table.rows.push(row);
        if took_identity {
            table.next_id += 1;
        }
        Ok(key)
    }

    fn check_constraints(
        &self,
        table_name: &str,
        table: &Table,
        def: &ColumnDef,
        row: &Row,
    ) -> Result<()> {
        let value = row.get(&def.name).unwrap_or(&Value::Null);
        if *value == Value::Null {
            if def.nullable {
                return Ok(());
            }
            return Err(BootstrapError::InvalidRecord(format!(
                "null value in column \"{}\" of relation \"{table_name}\" violates not-null constraint",
                def.name
            )));
        }

        if def.unique && table.rows.iter().any(|r| r.get(&def.name) == Some(value)) {
            return Err(BootstrapError::InvalidRecord(format!(
                "duplicate key value violates unique constraint on {table_name}.{}: {value:?}",
                def.name
            )));
        }

        if let Some(target) = def.references {
            let parent = self.table(target)?;
            if !parent.rows.iter().any(|r| r.get(parent.key) == Some(value)) {
                return Err(BootstrapError::InvalidRecord(format!(
                    "insert on \"{table_name}\" violates foreign key {}: {value:?} not in \"{target}\"",
                    def.name
                )));
            }
        }
        Ok(())
    }

    /// Tables whose rows reference `table`, transitively.
    fn dependents(&self, table: &str) -> Vec<String> {
        let mut found: Vec<String> = vec![table.to_string()];
        let mut i = 0;
        while i < found.len() {
            let current = found[i].clone();
            for (name, t) in &self.tables {
                let refers = t
                    .columns
                    .iter()
                    .any(|c| c.references == Some(current.as_str()));
                if refers && !found.contains(name) {
                    found.push(name.clone());
                }
            }
            i += 1;
        }
        found
    }

    fn program_window(
        &self,
        program_id: i64,
    ) -> Option<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let programs = self.tables.get("programs")?;
        let row = programs
            .rows
            .iter()
            .find(|r| r.get("program_id") == Some(&Value::Int(program_id)))?;
        Some((
            timestamp(row, "program_start_date"),
            timestamp(row, "program_end_date"),
        ))
    }
}

fn int(row: &Row, column: &str) -> Result<i64> {
    match row.get(column) {
        Some(Value::Int(v)) => Ok(*v),
        other => Err(BootstrapError::InvalidRecord(format!(
            "column \"{column}\" is not an integer: {other:?}"
        ))),
    }
}

fn text<'a>(row: &'a Row, column: &str) -> Result<&'a str> {
    match row.get(column) {
        Some(Value::Text(v)) => Ok(v),
        other => Err(BootstrapError::InvalidRecord(format!(
            "column \"{column}\" is not text: {other:?}"
        ))),
    }
}

fn timestamp(row: &Row, column: &str) -> Option<NaiveDateTime> {
    match row.get(column) {
        Some(Value::Timestamp(t)) => Some(*t),
        _ => None,
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Thread-safe in-memory database for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the operation named by `key` fail with [`BootstrapError::Injected`]
    /// until [`clear_faults`](Self::clear_faults) is called.
    ///
    /// Keys: `ensure_baseline`, `inspect_column:<table>.<column>` (likewise
    /// `add_nullable_column`, `backfill`, `count_nulls`, `set_not_null`),
    /// `count_<dataset>`, `insert_user:<student_num>`, `wipe_programs`,
    /// `execute_statement:<index>`, `insert_application:<index>`,
    /// `insert_survey:<title>`.
    pub fn fail(&self, key: impl Into<String>) {
        self.state().faults.insert(key.into());
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Insert a program row the way an older release wrote it: only the
    /// application window, no constraint checks. Returns its id.
    pub fn push_program_window(
        &self,
        title: &str,
        application_start: (i32, u32, u32),
        application_end: (i32, u32, u32),
    ) -> Result<i64> {
        let day = |(y, m, d): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .map(|date| Value::Timestamp(date.and_time(NaiveTime::MIN)))
                .ok_or_else(|| BootstrapError::InvalidRecord(format!("invalid date {y}-{m}-{d}")))
        };
        let start = day(application_start)?;
        let end = day(application_end)?;
        self.push_raw_program(title, start, end)
    }

    /// Like [`push_program_window`](Self::push_program_window) but with no
    /// application window at all.
    pub fn push_program_without_window(&self, title: &str) -> Result<i64> {
        self.push_raw_program(title, Value::Null, Value::Null)
    }

    fn push_raw_program(&self, title: &str, start: Value, end: Value) -> Result<i64> {
        let mut state = self.state();
        let programs = state.table_mut("programs")?;
        let id = programs.next_id;
        let mut row: Row = programs
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect();
        row.insert("program_id".into(), Value::Int(id));
        row.insert("title".into(), title.into());
        row.insert("status".into(), ProgramStatus::Open.as_str().into());
        row.insert("application_start_date".into(), start);
        row.insert("application_end_date".into(), end);
        programs.rows.push(row);
        programs.next_id += 1;
        Ok(id)
    }

    /// `(program_start_date, program_end_date)` of a program, `None` when it
    /// does not exist.
    pub fn program_schedule(
        &self,
        program_id: i64,
    ) -> Option<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        self.state().program_window(program_id)
    }

    /// Table → (column, nullable) pairs, for comparing schema states.
    pub fn schema_snapshot(&self) -> BTreeMap<String, Vec<(String, bool)>> {
        self.state()
            .tables
            .iter()
            .map(|(name, t)| {
                let cols = t
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.nullable))
                    .collect();
                (name.clone(), cols)
            })
            .collect()
    }

    fn rows_in(&self, table: &str) -> usize {
        self.state()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    pub fn user_count(&self) -> usize {
        self.rows_in("users")
    }

    pub fn application_count(&self) -> usize {
        self.rows_in("program_applications")
    }

    pub fn survey_count(&self) -> usize {
        self.rows_in("surveys")
    }

    pub fn question_count(&self) -> usize {
        self.rows_in("survey_questions")
    }

    pub fn option_count(&self) -> usize {
        self.rows_in("survey_question_options")
    }

    pub fn program_ids(&self) -> Vec<i64> {
        let state = self.state();
        state
            .tables
            .get("programs")
            .map(|t| {
                t.ordered_rows()
                    .into_iter()
                    .filter_map(|r| int(r, "program_id").ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stored applications read back into their record form.
    pub fn applications(&self) -> Result<Vec<NewApplication>> {
        let state = self.state();
        let table = state.table("program_applications")?;
        table
            .ordered_rows()
            .into_iter()
            .map(|row| {
                Ok(NewApplication {
                    program_id: int(row, "program_id")?,
                    user_id: int(row, "user_id")?,
                    status: text(row, "status")?.parse::<ApplicationStatus>()?,
                    applied_at: timestamp(row, "applied_at").ok_or_else(|| {
                        BootstrapError::InvalidRecord("application without applied_at".into())
                    })?,
                    timestamps: StatusTimestamps {
                        approved_at: timestamp(row, "approved_at"),
                        rejected_at: timestamp(row, "rejected_at"),
                        cancelled_at: timestamp(row, "cancelled_at"),
                        completed_at: timestamp(row, "completed_at"),
                    },
                    rejection_reason: text(row, "rejection_reason").ok().map(str::to_owned),
                })
            })
            .collect()
    }
}

// =============================================================================
// PORTS
// =============================================================================

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn ensure_baseline(&self) -> Result<()> {
        let mut state = self.state();
        state.trip("ensure_baseline")?;
        for (name, table) in baseline_tables() {
            state.tables.entry(name.to_string()).or_insert(table);
        }
        Ok(())
    }

    async fn inspect_column(&self, table: &str, column: &str) -> Result<Option<ColumnState>> {
        let state = self.state();
        state.trip(&format!("inspect_column:{table}.{column}"))?;
        Ok(state
            .tables
            .get(table)
            .and_then(|t| t.column(column))
            .map(|c| ColumnState {
                nullable: c.nullable,
            }))
    }

    async fn add_nullable_column(&self, spec: &ColumnSpec) -> Result<()> {
        let mut state = self.state();
        state.trip(&format!("add_nullable_column:{}", spec.column_ref()))?;
        let table = state.table_mut(spec.table)?;
        if table.column(spec.column).is_some() {
            return Err(BootstrapError::Schema(format!(
                "column \"{}\" of relation \"{}\" already exists",
                spec.column, spec.table
            )));
        }
        table.columns.push(column(spec.column, spec.column_type));
        for row in &mut table.rows {
            row.insert(spec.column.to_string(), Value::Null);
        }
        Ok(())
    }

    async fn backfill(&self, spec: &ColumnSpec) -> Result<u64> {
        let mut state = self.state();
        state.trip(&format!("backfill:{}", spec.column_ref()))?;
        let BackfillRule::OffsetDays { source, days } = spec.backfill else {
            return Ok(0);
        };

        let table = state.table_mut(spec.table)?;
        let target = table
            .column(spec.column)
            .cloned()
            .ok_or_else(|| no_column(spec.table, spec.column))?;
        if table.column(source).is_none() {
            return Err(no_column(spec.table, source));
        }

        let mut updated = 0;
        for row in &mut table.rows {
            if row.get(spec.column).is_some_and(|v| *v != Value::Null) {
                continue;
            }
            let shifted = match row.get(source) {
                Some(Value::Timestamp(t)) => Value::Timestamp(*t + Duration::days(days)),
                Some(Value::Date(d)) => Value::Date(*d + Duration::days(days)),
                _ => continue,
            };
            row.insert(spec.column.to_string(), target.conform(shifted)?);
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64> {
        let state = self.state();
        state.trip(&format!("count_nulls:{table}.{column}"))?;
        let t = state.table(table)?;
        if t.column(column).is_none() {
            return Err(no_column(table, column));
        }
        Ok(t.rows
            .iter()
            .filter(|r| r.get(column).map_or(true, |v| *v == Value::Null))
            .count() as i64)
    }

    async fn set_not_null(&self, spec: &ColumnSpec) -> Result<()> {
        let mut state = self.state();
        state.trip(&format!("set_not_null:{}", spec.column_ref()))?;
        let table = state.table_mut(spec.table)?;
        let has_nulls = table
            .rows
            .iter()
            .any(|r| r.get(spec.column).map_or(true, |v| *v == Value::Null));
        let def = table
            .columns
            .iter_mut()
            .find(|c| c.name == spec.column)
            .ok_or_else(|| no_column(spec.table, spec.column))?;
        if has_nulls {
            return Err(BootstrapError::Schema(format!(
                "column \"{}\" of relation \"{}\" contains null values",
                spec.column, spec.table
            )));
        }
        def.nullable = false;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn count_users(&self) -> Result<i64> {
        let state = self.state();
        state.trip("count_users")?;
        state.count("users")
    }

    async fn insert_users(&self, users: &[NewUser]) -> Result<BatchOutcome> {
        let mut state = self.state();
        let mut outcome = BatchOutcome::default();
        for (index, user) in users.iter().enumerate() {
            let result = state
                .trip(&format!("insert_user:{}", user.student_num))
                .and_then(|()| {
                    state.insert(
                        "users",
                        pairs([
                            ("student_num", user.student_num.into()),
                            ("name", user.name.as_str().into()),
                            ("email", user.email.as_str().into()),
                            ("phone", user.phone.as_str().into()),
                            ("password", user.password_hash.as_str().into()),
                            ("birth_date", user.birth_date.into()),
                            ("department", user.department.as_str().into()),
                            ("grade", user.grade.into()),
                            ("role", user.role.as_str().into()),
                        ]),
                    )
                });
            match result {
                Ok(_) => outcome.inserted += 1,
                Err(e) => outcome
                    .failures
                    .push(RecordFailure::new(index, user.student_num.to_string(), e)),
            }
        }
        Ok(outcome)
    }

    async fn users_by_role(&self, role: UserRole) -> Result<Vec<UserRow>> {
        let state = self.state();
        state.trip("users_by_role")?;
        let mut users = Vec::new();
        for row in state.table("users")?.ordered_rows() {
            if text(row, "role")? != role.as_str() {
                continue;
            }
            users.push(UserRow {
                user_id: int(row, "user_id")?,
                student_num: i32::try_from(int(row, "student_num")?)
                    .map_err(|e| BootstrapError::Internal(e.into()))?,
                name: text(row, "name")?.to_string(),
                role,
            });
        }
        Ok(users)
    }
}

#[async_trait]
impl ProgramStore for MemoryStore {
    async fn count_programs(&self) -> Result<i64> {
        let state = self.state();
        state.trip("count_programs")?;
        state.count("programs")
    }

    async fn has_program_marker(&self, status: ProgramStatus, year: i32) -> Result<bool> {
        let state = self.state();
        state.trip("has_program_marker")?;
        Ok(state.table("programs")?.rows.iter().any(|row| {
            text(row, "status").is_ok_and(|s| s == status.as_str())
                && timestamp(row, "application_start_date").is_some_and(|t| t.year() == year)
        }))
    }

    async fn wipe_programs(&self) -> Result<()> {
        let mut state = self.state();
        state.trip("wipe_programs")?;
        state.table("programs")?;
        for name in state.dependents("programs") {
            if let Some(table) = state.tables.get_mut(&name) {
                table.rows.clear();
                table.next_id = 1;
            }
        }
        Ok(())
    }

    async fn execute_statements(&self, statements: &[String]) -> Result<BatchOutcome> {
        let mut state = self.state();
        let mut outcome = BatchOutcome::default();
        for (index, statement) in statements.iter().enumerate() {
            let result = state
                .trip(&format!("execute_statement:{index}"))
                .and_then(|()| parse_insert(statement))
                .and_then(|insert| {
                    state.atomically(|s| {
                        let mut rows = 0u64;
                        for values in insert.rows {
                            if values.len() != insert.columns.len() {
                                return Err(BootstrapError::InvalidRecord(format!(
                                    "INSERT has {} columns but {} values",
                                    insert.columns.len(),
                                    values.len()
                                )));
                            }
                            let row = insert
                                .columns
                                .iter()
                                .cloned()
                                .zip(values.into_iter().map(Value::from))
                                .collect();
                            s.insert(&insert.table, row)?;
                            rows += 1;
                        }
                        Ok(rows)
                    })
                });
            match result {
                Ok(rows) => outcome.inserted += rows,
                Err(e) => outcome.failures.push(RecordFailure::new(
                    index,
                    format!("statement {}", index + 1),
                    e,
                )),
            }
        }
        Ok(outcome)
    }

    async fn programs_by_status(
        &self,
        status: ProgramStatus,
        limit: i64,
    ) -> Result<Vec<ProgramRow>> {
        let state = self.state();
        state.trip("programs_by_status")?;
        let mut programs = Vec::new();
        for row in state.table("programs")?.ordered_rows() {
            if programs.len() as i64 >= limit {
                break;
            }
            if text(row, "status")? != status.as_str() {
                continue;
            }
            programs.push(ProgramRow {
                program_id: int(row, "program_id")?,
                title: text(row, "title")?.to_string(),
                status,
            });
        }
        Ok(programs)
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn count_applications(&self) -> Result<i64> {
        let state = self.state();
        state.trip("count_applications")?;
        state.count("program_applications")
    }

    async fn insert_applications(&self, applications: &[NewApplication]) -> Result<BatchOutcome> {
        let mut state = self.state();
        let mut outcome = BatchOutcome::default();
        for (index, app) in applications.iter().enumerate() {
            let t = &app.timestamps;
            let result = state
                .trip(&format!("insert_application:{index}"))
                .and_then(|()| {
                    state.insert(
                        "program_applications",
                        pairs([
                            ("program_id", app.program_id.into()),
                            ("user_id", app.user_id.into()),
                            ("status", app.status.as_str().into()),
                            ("applied_at", app.applied_at.into()),
                            ("approved_at", t.approved_at.into()),
                            ("rejected_at", t.rejected_at.into()),
                            ("rejection_reason", app.rejection_reason.clone().into()),
                            ("cancelled_at", t.cancelled_at.into()),
                            ("completed_at", t.completed_at.into()),
                        ]),
                    )
                });
            match result {
                Ok(_) => outcome.inserted += 1,
                Err(e) => outcome.failures.push(RecordFailure::new(
                    index,
                    format!("program {} / user {}", app.program_id, app.user_id),
                    e,
                )),
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn count_surveys(&self) -> Result<i64> {
        let state = self.state();
        state.trip("count_surveys")?;
        state.count("surveys")
    }

    async fn insert_survey(&self, survey: &NewSurvey) -> Result<i64> {
        let mut state = self.state();
        state.trip(&format!("insert_survey:{}", survey.title))?;
        state.atomically(|s| {
            let survey_id = s.insert(
                "surveys",
                pairs([
                    ("title", survey.title.as_str().into()),
                    ("description", survey.description.as_str().into()),
                    ("start_date", survey.start_date.into()),
                    ("end_date", survey.end_date.into()),
                    ("is_anonymous", survey.is_anonymous.into()),
                    ("is_active", survey.is_active.into()),
                    ("target_type", survey.target_type.as_str().into()),
                    (
                        "allow_multiple_responses",
                        survey.allow_multiple_responses.into(),
                    ),
                    ("show_results", survey.show_results.into()),
                    ("created_by", survey.created_by.into()),
                ]),
            )?;

            for question in &survey.questions {
                let scale = question.scale.as_ref();
                let question_id = s.insert(
                    "survey_questions",
                    pairs([
                        ("survey_id", survey_id.into()),
                        ("question_type", question.question_type.as_str().into()),
                        ("question_text", question.question_text.as_str().into()),
                        ("is_required", question.is_required.into()),
                        ("display_order", question.display_order.into()),
                        ("scale_min", scale.map(|sc| sc.min).into()),
                        ("scale_max", scale.map(|sc| sc.max).into()),
                        ("scale_min_label", scale.map(|sc| sc.min_label.as_str()).into()),
                        ("scale_max_label", scale.map(|sc| sc.max_label.as_str()).into()),
                    ]),
                )?;

                for (order, option) in question.options.iter().enumerate() {
                    s.insert(
                        "survey_question_options",
                        pairs([
                            ("question_id", question_id.into()),
                            ("option_text", option.as_str().into()),
                            ("display_order", (order as i64).into()),
                        ]),
                    )?;
                }
            }
            Ok(survey_id)
        })
    }
}
