//! Declared column evolutions.

use super::{BackfillRule, ColumnSpec, ColumnType};

/// Program run dates, derived from the application window for programs
/// that predate them. The end date reads the start date, so order matters.
pub fn program_schedule_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            table: "programs",
            column: "program_start_date",
            column_type: ColumnType::Timestamp,
            backfill: BackfillRule::OffsetDays {
                source: "application_end_date",
                days: 1,
            },
            not_null: true,
        },
        ColumnSpec {
            table: "programs",
            column: "program_end_date",
            column_type: ColumnType::Timestamp,
            backfill: BackfillRule::OffsetDays {
                source: "program_start_date",
                days: 14,
            },
            not_null: true,
        },
    ]
}
