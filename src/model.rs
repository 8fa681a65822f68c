//! Records the bootstrap reads and writes.
//!
//! These are plain data: rows read back for dependency lookups and
//! new-record templates handed to the store ports. Enumerations are stored
//! as upper-case text columns.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = BootstrapError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(BootstrapError::InvalidRecord(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Account role.
    UserRole {
        Student => "STUDENT",
        Admin => "ADMIN",
    }
);

text_enum!(
    /// Catalog program lifecycle.
    ProgramStatus {
        Scheduled => "SCHEDULED",
        Open => "OPEN",
        Closed => "CLOSED",
        Completed => "COMPLETED",
    }
);

text_enum!(
    /// Program application lifecycle.
    ApplicationStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Cancelled => "CANCELLED",
        Completed => "COMPLETED",
    }
);

text_enum!(
    QuestionType {
        SingleChoice => "SINGLE_CHOICE",
        MultipleChoice => "MULTIPLE_CHOICE",
        Scale => "SCALE",
        ShortText => "SHORT_TEXT",
        LongText => "LONG_TEXT",
    }
);

text_enum!(
    SurveyTargetType {
        All => "ALL",
        Student => "STUDENT",
    }
);

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub student_num: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub birth_date: NaiveDate,
    pub department: String,
    pub grade: Option<i32>,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: i64,
    pub student_num: i32,
    pub name: String,
    pub role: UserRole,
}

// ── Programs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRow {
    pub program_id: i64,
    pub title: String,
    pub status: ProgramStatus,
}

// ── Applications ─────────────────────────────────────────────────

/// Timestamps implied by an application's terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTimestamps {
    pub approved_at: Option<NaiveDateTime>,
    pub rejected_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl ApplicationStatus {
    /// Fan a status out into its timestamp subset, relative to `applied_at`.
    pub fn timestamps(&self, applied_at: NaiveDateTime) -> StatusTimestamps {
        let day = |n| Some(applied_at + Duration::days(n));
        match self {
            Self::Pending => StatusTimestamps::default(),
            Self::Approved => StatusTimestamps {
                approved_at: day(1),
                ..Default::default()
            },
            Self::Rejected => StatusTimestamps {
                rejected_at: day(1),
                ..Default::default()
            },
            Self::Cancelled => StatusTimestamps {
                cancelled_at: day(2),
                ..Default::default()
            },
            Self::Completed => StatusTimestamps {
                approved_at: day(1),
                completed_at: day(8),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub program_id: i64,
    pub user_id: i64,
    pub status: ApplicationStatus,
    pub applied_at: NaiveDateTime,
    pub timestamps: StatusTimestamps,
    pub rejection_reason: Option<String>,
}

impl NewApplication {
    /// Build an application already in its terminal `status`.
    pub fn new(
        program_id: i64,
        user_id: i64,
        status: ApplicationStatus,
        applied_at: NaiveDateTime,
        rejection_reason: Option<&str>,
    ) -> Self {
        Self {
            program_id,
            user_id,
            status,
            applied_at,
            timestamps: status.timestamps(applied_at),
            rejection_reason: match status {
                ApplicationStatus::Rejected => rejection_reason.map(str::to_owned),
                _ => None,
            },
        }
    }

    /// Check that exactly the timestamps implied by the status are set and
    /// that each one falls after `applied_at`.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timestamps;
        let expected = self.status.timestamps(self.applied_at);
        let shape = |ts: &StatusTimestamps| {
            [
                ts.approved_at.is_some(),
                ts.rejected_at.is_some(),
                ts.cancelled_at.is_some(),
                ts.completed_at.is_some(),
            ]
        };
        if shape(t) != shape(&expected) {
            return Err(self.invalid("timestamps do not match status"));
        }

        for ts in [t.approved_at, t.rejected_at, t.cancelled_at, t.completed_at]
            .into_iter()
            .flatten()
        {
            if ts <= self.applied_at {
                return Err(self.invalid("timestamp precedes application"));
            }
        }

        if let (Some(approved), Some(completed)) = (t.approved_at, t.completed_at) {
            if completed <= approved {
                return Err(self.invalid("completion precedes approval"));
            }
        }

        let has_reason = self
            .rejection_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        match (self.status, has_reason) {
            (ApplicationStatus::Rejected, false) => Err(self.invalid("rejection reason missing")),
            (ApplicationStatus::Rejected, true) | (_, false) => Ok(()),
            (_, true) => Err(self.invalid("rejection reason on non-rejected application")),
        }
    }

    fn invalid(&self, what: &str) -> BootstrapError {
        BootstrapError::InvalidRecord(format!(
            "{} application (program {}, user {}): {}",
            self.status, self.program_id, self.user_id, what
        ))
    }
}

// ── Surveys ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleSpec {
    pub min: i32,
    pub max: i32,
    pub min_label: String,
    pub max_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub question_type: QuestionType,
    pub question_text: String,
    pub is_required: bool,
    pub display_order: i32,
    pub scale: Option<ScaleSpec>,
    /// Option texts; display order is the position in this list.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSurvey {
    pub title: String,
    pub description: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_anonymous: bool,
    pub is_active: bool,
    pub target_type: SurveyTargetType,
    pub allow_multiple_responses: bool,
    pub show_results: bool,
    pub created_by: i64,
    pub questions: Vec<NewQuestion>,
}

impl NewSurvey {
    pub fn option_count(&self) -> usize {
        self.questions.iter().map(|q| q.options.len()).sum()
    }
}
