//! Sample surveys owned by the administrator account.

use async_trait::async_trait;
use chrono::{Duration, Months, NaiveDateTime, Utc};

use super::{empty_table, Precondition, SeedStep, Seeded};
use crate::error::Result;
use crate::model::{NewQuestion, NewSurvey, QuestionType, ScaleSpec, SurveyTargetType, UserRole};
use crate::ports::{BatchOutcome, BootstrapStore, RecordFailure};

pub struct SurveySeed {
    clock: Option<NaiveDateTime>,
}

impl SurveySeed {
    pub fn new() -> Self {
        Self { clock: None }
    }

    pub fn at(now: NaiveDateTime) -> Self {
        Self { clock: Some(now) }
    }

    pub fn records(&self, created_by: i64) -> Vec<NewSurvey> {
        let now = self.clock.unwrap_or_else(|| Utc::now().naive_utc());
        vec![
            satisfaction_survey(now, created_by),
            preference_survey(now, created_by),
            feedback_survey(now, created_by),
        ]
    }
}

impl Default for SurveySeed {
    fn default() -> Self {
        Self::new()
    }
}

fn choice(
    question_type: QuestionType,
    display_order: i32,
    text: &str,
    options: &[&str],
) -> NewQuestion {
    NewQuestion {
        question_type,
        question_text: text.to_string(),
        is_required: true,
        display_order,
        scale: None,
        options: options.iter().map(|o| o.to_string()).collect(),
    }
}

fn scale(display_order: i32, text: &str, min_label: &str, max_label: &str) -> NewQuestion {
    NewQuestion {
        question_type: QuestionType::Scale,
        question_text: text.to_string(),
        is_required: true,
        display_order,
        scale: Some(ScaleSpec {
            min: 1,
            max: 5,
            min_label: min_label.to_string(),
            max_label: max_label.to_string(),
        }),
        options: Vec::new(),
    }
}

fn free_text(question_type: QuestionType, display_order: i32, text: &str) -> NewQuestion {
    NewQuestion {
        question_type,
        question_text: text.to_string(),
        is_required: false,
        display_order,
        scale: None,
        options: Vec::new(),
    }
}

fn satisfaction_survey(now: NaiveDateTime, created_by: i64) -> NewSurvey {
    NewSurvey {
        title: "Student Satisfaction Survey".to_string(),
        description: "How satisfied are you with student support services? \
                      Please share your honest opinion."
            .to_string(),
        start_date: now - Duration::days(1),
        end_date: now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + Duration::days(30)),
        is_anonymous: false,
        is_active: true,
        target_type: SurveyTargetType::All,
        allow_multiple_responses: false,
        show_results: false,
        created_by,
        questions: vec![
            choice(
                QuestionType::SingleChoice,
                0,
                "Overall, how satisfied are you with student support services?",
                &[
                    "Very satisfied",
                    "Satisfied",
                    "Neutral",
                    "Dissatisfied",
                    "Very dissatisfied",
                ],
            ),
            scale(
                1,
                "How would you rate the quality of co-curricular programs?",
                "Very low",
                "Very high",
            ),
            free_text(
                QuestionType::LongText,
                2,
                "Is there anything we should improve? Feel free to leave suggestions.",
            ),
        ],
    }
}

fn preference_survey(now: NaiveDateTime, created_by: i64) -> NewSurvey {
    NewSurvey {
        title: "Co-curricular Program Preference Survey".to_string(),
        description: "Tell us which kinds of programs you prefer so we can plan better ones."
            .to_string(),
        start_date: now - Duration::days(2),
        end_date: now + Duration::weeks(2),
        is_anonymous: true,
        is_active: true,
        target_type: SurveyTargetType::Student,
        allow_multiple_responses: false,
        show_results: true,
        created_by,
        questions: vec![
            choice(
                QuestionType::MultipleChoice,
                0,
                "Which program areas interest you? (select all that apply)",
                &[
                    "Career and employment",
                    "Foreign languages",
                    "Certifications",
                    "Volunteering",
                    "Culture and arts",
                    "Leadership",
                    "Startups",
                ],
            ),
            choice(
                QuestionType::SingleChoice,
                1,
                "How do you prefer programs to be run?",
                &["In person", "Online", "Hybrid"],
            ),
            scale(
                2,
                "How much do you like short intensive programs (1-2 weeks)?",
                "Not at all",
                "Very much",
            ),
        ],
    }
}

fn feedback_survey(now: NaiveDateTime, created_by: i64) -> NewSurvey {
    NewSurvey {
        title: "New Service Feedback".to_string(),
        description: "Share your thoughts on the new portfolio and survey features!".to_string(),
        start_date: now,
        end_date: now + Duration::days(7),
        is_anonymous: false,
        is_active: true,
        target_type: SurveyTargetType::All,
        allow_multiple_responses: false,
        show_results: false,
        created_by,
        questions: vec![
            scale(
                0,
                "Is the new portfolio feature useful?",
                "Not useful at all",
                "Very useful",
            ),
            free_text(
                QuestionType::ShortText,
                1,
                "Which feature do you like most?",
            ),
            free_text(
                QuestionType::LongText,
                2,
                "Any other features or ideas you would like to see?",
            ),
        ],
    }
}

#[async_trait]
impl SeedStep for SurveySeed {
    fn dataset(&self) -> &'static str {
        "surveys"
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["users"]
    }

    async fn precondition(&self, store: &dyn BootstrapStore) -> Result<Precondition> {
        Ok(empty_table(store.count_surveys().await?))
    }

    async fn seed(&self, store: &dyn BootstrapStore) -> Result<Seeded> {
        let admins = store.users_by_role(UserRole::Admin).await?;
        let Some(admin) = admins.first() else {
            return Ok(Seeded::DependencyUnmet(
                "no administrator account to own the surveys".to_string(),
            ));
        };

        let mut outcome = BatchOutcome::default();
        for (index, survey) in self.records(admin.user_id).iter().enumerate() {
            match store.insert_survey(survey).await {
                Ok(survey_id) => {
                    tracing::debug!(
                        target: "bootstrap.seed",
                        dataset = "surveys",
                        survey_id,
                        questions = survey.questions.len(),
                        options = survey.option_count(),
                        "survey created"
                    );
                    outcome.inserted += 1;
                }
                Err(e) => outcome
                    .failures
                    .push(RecordFailure::new(index, survey.title.as_str(), e)),
            }
        }
        Ok(Seeded::Inserted(outcome))
    }
}
