//! Prompt wrappers used by the dashboard: review spam checks, the guide
//! chatbot's personality prompt, and plain-language analytics summaries.
//!
//! Each wrapper sends one prompt and validates the structured reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;

use super::model_client::{ModelApiError, ModelClient};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("model error: {0}")]
    Model(#[from] ModelApiError),
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct SpamVerdict {
    pub is_spam: bool,
    /// 0.0 to 1.0
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityUpdate {
    pub updated_prompt: String,
    #[serde(default)]
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

const SPAM_SYSTEM: &str = "You moderate user reviews for Batohi, a Nepal travel and city guide. \
    Decide whether a review is spam: advertising, links to unrelated sites, gibberish, \
    repeated text or content unrelated to the place being reviewed. Honest negative \
    reviews are not spam. Reply with JSON only.";

const PERSONALITY_SYSTEM: &str = "You maintain the system prompt of Batohi's travel-guide \
    chatbot. Apply the administrator's instruction to the current prompt, keep everything \
    the instruction does not touch, and reply with JSON only.";

const ANALYTICS_SYSTEM: &str = "You write short summaries of Batohi dashboard analytics for \
    administrators. Be concrete, mention numbers, avoid speculation, reply with JSON only.";

fn require_text<'a>(value: &'a str, field: &'static str) -> Result<&'a str, AssistantError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AssistantError::EmptyInput(field))
    } else {
        Ok(trimmed)
    }
}

pub(crate) fn spam_prompt(review: &str) -> String {
    format!(
        r#"Classify this review.

## Review
{review}

## Output Format
```json
{{"isSpam": false, "confidence": 0.0, "reason": "one sentence"}}
```
`confidence` is how sure you are of `isSpam`, between 0 and 1."#
    )
}

pub(crate) fn personality_prompt(current: &str, instruction: &str) -> String {
    format!(
        r#"Update the chatbot system prompt.

## Current Prompt
{current}

## Instruction
{instruction}

## Output Format
```json
{{"updatedPrompt": "the full new prompt", "changes": ["short description of each change"]}}
```"#
    )
}

pub(crate) fn analytics_prompt(data: &str) -> String {
    format!(
        r#"Summarize these dashboard analytics in two or three sentences and list up to five highlights.

## Data
{data}

## Output Format
```json
{{"summary": "...", "highlights": ["..."]}}
```"#
    )
}

pub(crate) fn check_spam_verdict(verdict: SpamVerdict) -> Result<SpamVerdict, AssistantError> {
    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(AssistantError::InvalidResponse(format!(
            "confidence {} outside 0..=1",
            verdict.confidence
        )));
    }
    Ok(verdict)
}

pub(crate) fn check_personality(update: PersonalityUpdate) -> Result<PersonalityUpdate, AssistantError> {
    if update.updated_prompt.trim().is_empty() {
        return Err(AssistantError::InvalidResponse("updatedPrompt is empty".to_string()));
    }
    Ok(update)
}

pub(crate) fn check_summary(summary: AnalyticsSummary) -> Result<AnalyticsSummary, AssistantError> {
    if summary.summary.trim().is_empty() {
        return Err(AssistantError::InvalidResponse("summary is empty".to_string()));
    }
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct ContentAssistant {
    client: ModelClient,
}

impl ContentAssistant {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    pub async fn classify_spam(&self, review: &str) -> Result<SpamVerdict, AssistantError> {
        let review = require_text(review, "review text")?;
        let verdict: SpamVerdict = self.client.ask_json(SPAM_SYSTEM, &spam_prompt(review)).await?;
        let verdict = check_spam_verdict(verdict)?;
        info!(
            is_spam = verdict.is_spam,
            confidence = verdict.confidence,
            "Classified review"
        );
        Ok(verdict)
    }

    pub async fn update_personality(
        &self,
        current_prompt: &str,
        instruction: &str,
    ) -> Result<PersonalityUpdate, AssistantError> {
        let current_prompt = require_text(current_prompt, "current prompt")?;
        let instruction = require_text(instruction, "instruction")?;
        let update: PersonalityUpdate = self
            .client
            .ask_json(PERSONALITY_SYSTEM, &personality_prompt(current_prompt, instruction))
            .await?;
        check_personality(update)
    }

    /// `data` is passed to the model as pretty-printed JSON.
    pub async fn summarize_analytics(&self, data: &Value) -> Result<AnalyticsSummary, AssistantError> {
        if data.is_null() {
            return Err(AssistantError::EmptyInput("analytics data"));
        }
        let rendered = serde_json::to_string_pretty(data)
            .map_err(|e| AssistantError::InvalidResponse(e.to_string()))?;
        let summary: AnalyticsSummary = self
            .client
            .ask_json(ANALYTICS_SYSTEM, &analytics_prompt(&rendered))
            .await?;
        check_summary(summary)
    }
}
