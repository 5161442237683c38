//! LLM integration for plan synthesis
//!
//! This module handles communication with the Claude API and adapts it to the
//! engine's `ReasoningPort`. The model only interprets pre-computed numbers;
//! targets and verification stay in Rust.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::planner::parse::extract_json;
use crate::planner::Phase;
use crate::reasoning::{PromptContext, RawResponse, ReasoningError, ReasoningPort};

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

const STRATEGY_MAX_TOKENS: u32 = 1024;
const DRAFT_MAX_TOKENS: u32 = 4096;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum LlmError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Invalid API URL: {0}")]
  InvalidUrl(String),

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error ({status}): {message}")]
  Api { status: u16, message: String },

  #[error("Parse error: {0}")]
  Parse(String),
}

impl From<LlmError> for ReasoningError {
  fn from(e: LlmError) -> Self {
    match e {
      LlmError::Request(_) | LlmError::Parse(_) => ReasoningError::Unavailable(e.to_string()),
      // Rate limits and overload are transient
      LlmError::Api { status, .. } if status == 429 || status >= 500 => ReasoningError::Unavailable(e.to_string()),
      _ => ReasoningError::Rejected(e.to_string()),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest {
  model: String,
  max_tokens: u32,
  system: String,
  messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
  role: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Claude Client
/// ---------------------------------------------------------------------------

pub struct ClaudeClient {
  client: Client,
  api_key: String,
  api_url: Url,
  model: String,
}

impl ClaudeClient {
  pub fn new(api_key: impl Into<String>, api_url: Url, model: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      api_url,
      model: model.into(),
    }
  }

  /// Create a new Claude client, loading API key from environment
  ///
  /// `PEAKFORM_MODEL` and `PEAKFORM_API_URL` override the defaults.
  pub fn from_env() -> Result<Self, LlmError> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
    if api_key.trim().is_empty() {
      return Err(LlmError::MissingApiKey);
    }

    let raw_url = std::env::var("PEAKFORM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let api_url = Url::parse(&raw_url).map_err(|e| LlmError::InvalidUrl(format!("{}: {}", raw_url, e)))?;
    if !matches!(api_url.scheme(), "http" | "https") {
      return Err(LlmError::InvalidUrl(format!("{}: scheme must be http or https", raw_url)));
    }

    let model = std::env::var("PEAKFORM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

    Ok(Self::new(api_key, api_url, model))
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// Call Claude with a system prompt and user message
  pub async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    let request = ClaudeRequest {
      model: self.model.clone(),
      max_tokens,
      system: system_prompt.to_string(),
      messages: vec![ClaudeMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
      }],
    };

    let response = self
      .client
      .post(self.api_url.clone())
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    if !status.is_success() {
      let message = match serde_json::from_str::<ClaudeErrorResponse>(&body) {
        Ok(error_resp) => error_resp.error.message,
        Err(_) => body,
      };
      return Err(LlmError::Api {
        status: status.as_u16(),
        message,
      });
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

    // Extract text from the first text content block
    let text = claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| LlmError::Parse("No text content in response".to_string()))?;

    Ok((text, claude_response.usage))
  }
}

/// ---------------------------------------------------------------------------
/// Reasoning Adapter
/// ---------------------------------------------------------------------------

/// `ReasoningPort` backed by Claude
pub struct ClaudeReasoner {
  client: ClaudeClient,
}

impl ClaudeReasoner {
  pub fn new(client: ClaudeClient) -> Self {
    Self { client }
  }

  pub fn from_env() -> Result<Self, LlmError> {
    Ok(Self::new(ClaudeClient::from_env()?))
  }
}

#[async_trait]
impl ReasoningPort for ClaudeReasoner {
  async fn propose(&self, ctx: &PromptContext) -> Result<RawResponse, ReasoningError> {
    let system_prompt = include_str!("prompts/planner_system.txt");
    let message = user_message(ctx);

    let max_tokens = match ctx.phase {
      Phase::Drafting => DRAFT_MAX_TOKENS,
      _ => STRATEGY_MAX_TOKENS,
    };

    let (text, usage) = self.client.complete(system_prompt, &message, max_tokens).await?;
    debug!(
      session_id = %ctx.session_id,
      phase = %ctx.phase,
      model = %self.client.model(),
      input_tokens = usage.input_tokens,
      output_tokens = usage.output_tokens,
      "propose: response received"
    );

    if ctx.phase != Phase::Drafting {
      return Ok(RawResponse::Text(text));
    }

    // Hand back parsed JSON when possible; the engine parses text defensively otherwise
    let structured = extract_json(&text)
      .ok()
      .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok());
    Ok(match structured {
      Some(value) => RawResponse::Structured(value),
      None => RawResponse::Text(text),
    })
  }
}

/// Render the per-step user message
fn user_message(ctx: &PromptContext) -> String {
  let c = &ctx.constraints;
  let context = json!({
    "profile": {
      "body_weight_kg": ctx.profile.body_weight_kg,
      "goal": ctx.profile.goal,
      "training_days_per_week": ctx.profile.training_days_per_week,
      "dietary_constraints": ctx.profile.dietary_constraints,
      "mesocycle": ctx.profile.mesocycle,
      "meal_rotation": ctx.profile.meal_rotation,
      "allow_new_meals": ctx.profile.allow_new_meals,
    },
    "biofeedback": {
      "sleep": ctx.biofeedback.sleep,
      "hunger": ctx.biofeedback.hunger,
      "rpe": ctx.biofeedback.rpe,
      "notes": ctx.biofeedback.notes,
    },
    "weekly_signal": {
      "window": format!("{} to {}", ctx.signal.window_start, ctx.signal.window_end),
      "training_load": (ctx.signal.training_load * 10.0).round() / 10.0,
      "sessions": ctx.signal.session_count,
      "adherence": ctx.signal.adherence(),
      "body_comp_delta_kg": ctx.signal.body_comp_delta_kg,
      "average_intake": ctx.signal.nutrition,
      "coverage_warnings": ctx.signal.coverage_warnings,
    },
    "daily_targets": {
      "calories": c.calories,
      "protein_g": c.protein_g,
      "carbs_g": c.carbs_g,
      "fat_g": c.fat_g,
      "max_load_per_day": c.daily_load_bound,
    },
    "weekly_load_bound": c.weekly_load_bound,
  });

  let mut sections = vec![format!(
    "PLANNING CONTEXT:\n{}",
    serde_json::to_string_pretty(&context).unwrap_or_else(|_| context.to_string())
  )];

  if let Some(previous) = ctx.biofeedback.previous_plan() {
    sections.push(format!("PREVIOUS WEEK'S PLAN:\n{}", previous));
  }

  if !ctx.answers.is_empty() {
    let qa: Vec<String> = ctx
      .answers
      .iter()
      .map(|qa| format!("Q: {}\nA: {}", qa.question, qa.answer))
      .collect();
    sections.push(format!("ATHLETE ANSWERS:\n{}", qa.join("\n\n")));
  }

  if let Some(strategy) = &ctx.strategy {
    sections.push(format!("AGREED STRATEGY:\n{}", strategy));
  }

  if let Some(report) = &ctx.last_report {
    sections.push(format!("VERIFICATION FAILURES:\n{}", report.summary()));
  }

  if let Some(clarification) = &ctx.clarification {
    sections.push(format!("NOTE:\n{}", clarification));
  }

  sections.push(match ctx.phase {
    Phase::Drafting => "Produce the 7-day plan as JSON matching the OUTPUT FORMAT in your instructions.".to_string(),
    _ => "Propose a training strategy for the coming week.".to_string(),
  });

  sections.join("\n\n")
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
