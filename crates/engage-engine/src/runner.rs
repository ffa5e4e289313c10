//! Drivers that connect a survey to a [`Responder`] and a [`SurveySubmitter`].

use std::collections::HashMap;

use engage_types::{EngageError, Result};

use crate::list_survey::{ListSubmission, ListSurvey};
use crate::responder::Responder;
use crate::submission::{SurveyPayload, SurveySubmitter};
use crate::survey::{Advance, BranchedSurvey, SurveyConfig};

/// Ask every question the survey reaches, then submit.
///
/// A rejected response is asked again up to `config.max_attempts` times.
/// Retryable submission failures are retried on the `config.submit_retry`
/// schedule.
pub async fn run_survey(
    survey: &mut BranchedSurvey,
    responder: &dyn Responder,
    submitter: &dyn SurveySubmitter,
    config: &SurveyConfig,
) -> Result<SurveyPayload> {
    while let Some(question) = survey.current_question().cloned() {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let entries = responder.respond(&question).await?;
            match survey.advance(entries) {
                Advance::Invalid { question_id, error_message } => {
                    tracing::warn!(%question_id, attempts, %error_message, "Answer rejected");
                    if attempts >= config.max_attempts {
                        return Err(EngageError::AttemptsExhausted {
                            question: question_id,
                            attempts,
                        });
                    }
                }
                Advance::NextQuestionSet { set_id } => {
                    tracing::debug!(%set_id, "Entered question set");
                    break;
                }
                Advance::NextQuestion { .. } | Advance::ReadyToSubmit => break,
            }
        }
    }

    let mut failed = 0;
    loop {
        match survey.submit(submitter).await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_retryable() => {
                failed += 1;
                let Some(delay) = config.submit_retry.delay_after(failed) else {
                    return Err(e);
                };
                tracing::warn!(survey = %survey.survey_id(), failed, delay_ms = %delay.as_millis(), "Retryable submission error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Collect every question of a list survey and submit.
///
/// On validation failure the failing questions are asked again, up to
/// `config.max_attempts` rounds.
pub async fn run_list_survey(
    survey: &mut ListSurvey,
    responder: &dyn Responder,
    submitter: &dyn SurveySubmitter,
    config: &SurveyConfig,
) -> Result<SurveyPayload> {
    let definition = survey.definition().clone();
    let mut pending: Vec<String> = definition.answerable_questions().map(|q| q.id.clone()).collect();

    for round in 1..=config.max_attempts.max(1) {
        let mut answers = HashMap::new();
        for question_id in &pending {
            if let Some(question) = definition.question(question_id) {
                answers.insert(question_id.clone(), responder.respond(question).await?);
            }
        }
        match survey.submit_answers(answers, submitter).await? {
            ListSubmission::Submitted(payload) => return Ok(payload),
            ListSubmission::Invalid { errors } => {
                for (question_id, message) in &errors {
                    tracing::warn!(%question_id, %message, round, "Answer rejected");
                }
                if round >= config.max_attempts {
                    let (question, _) = errors.into_iter().next().unwrap_or_default();
                    return Err(EngageError::AttemptsExhausted { question, attempts: round });
                }
                pending = errors.into_keys().collect();
            }
        }
    }
    Err(EngageError::Other(format!(
        "survey '{}' was not submitted",
        survey.survey_id()
    )))
}
