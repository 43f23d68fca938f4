//! Claude-driven synthesis over independent advisory sources.
//!
//! Advisors are queried concurrently and each outcome is kept, success or
//! failure, so one broken source never hides the others. Claude then turns
//! the collected opinions into a single recommendation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::agent::ai_client::{Advisor, AdvisorOpinion, labelled_percentages};
use crate::agent::recommendation::{CurrencyRecommendation, RecommendationSource};
use crate::agent::types::AgentError;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ORCHESTRATOR_SOURCE: &str = "Claude Orchestrator";

const SYSTEM_PROMPT: &str = r#"You are an intelligent financial analyst and decision-making assistant.
You synthesize insights from several advisory data sources into one clear, actionable recommendation.
Always consider every data source, give clear reasoning, include a confidence level and a risk assessment,
suggest alternative scenarios and consider both short-term and long-term implications.
Format your responses as structured JSON."#;

/// Result of asking one advisor.
#[derive(Debug, Clone)]
pub enum AdvisorOutcome {
    Advice(AdvisorOpinion),
    Failed { source: String, error: String },
}

impl AdvisorOutcome {
    pub fn source(&self) -> &str {
        match self {
            AdvisorOutcome::Advice(opinion) => &opinion.source,
            AdvisorOutcome::Failed { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorHealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisorHealth {
    pub status: AdvisorHealthStatus,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Synthesis {
    recommendation: SynthesisSplit,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    risk_assessment: Option<Value>,
    #[serde(default)]
    confidence_level: Option<Value>,
    #[serde(default)]
    alternative_scenarios: Vec<String>,
    #[serde(default)]
    time_horizon: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SynthesisSplit {
    #[serde(rename = "EUR")]
    eur: String,
    #[serde(rename = "USD")]
    usd: String,
}

pub struct ClaudeOrchestrator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    advisors: Vec<Arc<dyn Advisor>>,
}

impl ClaudeOrchestrator {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key,
            model: "claude-3-5-sonnet-20241022".to_string(),
            advisors: Vec::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn servers(&self) -> Vec<String> {
        self.advisors.iter().map(|a| a.name().to_string()).collect()
    }

    /// Queries every advisor concurrently and waits for all of them.
    pub async fn gather(&self) -> Vec<AdvisorOutcome> {
        let calls = self.advisors.iter().map(|advisor| async move {
            match advisor.advise().await {
                Ok(opinion) => AdvisorOutcome::Advice(opinion),
                Err(e) => {
                    warn!("Advisor {} failed: {}", advisor.name(), e);
                    AdvisorOutcome::Failed {
                        source: advisor.name().to_string(),
                        error: e.to_string(),
                    }
                }
            }
        });

        join_all(calls).await
    }

    pub async fn health_check(&self) -> BTreeMap<String, AdvisorHealth> {
        self.gather()
            .await
            .into_iter()
            .map(|outcome| {
                let health = match &outcome {
                    AdvisorOutcome::Advice(_) => AdvisorHealth {
                        status: AdvisorHealthStatus::Healthy,
                        error: None,
                    },
                    AdvisorOutcome::Failed { error, .. } => AdvisorHealth {
                        status: AdvisorHealthStatus::Unhealthy,
                        error: Some(error.clone()),
                    },
                };
                (outcome.source().to_string(), health)
            })
            .collect()
    }

    /// Full pipeline: gather advisors, ask Claude, parse the answer.
    pub async fn analyze(&self) -> Result<CurrencyRecommendation, AgentError> {
        info!("Starting currency analysis over {} advisors", self.advisors.len());

        let outcomes = self.gather().await;
        let answer = self.ask_claude(&outcomes).await?;
        let recommendation = parse_synthesis(&answer)?;

        info!(
            "Claude recommends EUR {} / USD {}",
            recommendation.eur, recommendation.usd
        );
        Ok(recommendation)
    }

    async fn ask_claude(&self, outcomes: &[AdvisorOutcome]) -> Result<String, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::Configuration("ANTHROPIC_API_KEY is not set".to_string()))?;

        let payload = json!({
            "model": self.model,
            "max_tokens": 2000,
            "temperature": 0.1,
            "system": SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": build_analysis_prompt(outcomes) }
            ]
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic API error {}", status);
            return Err(AgentError::AIAnalysis(format!(
                "Anthropic API error {}: {}",
                status, error_text
            )));
        }

        let json: Value = response.json().await?;

        json["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::AIAnalysis("No content in Anthropic response".to_string()))
    }
}

#[async_trait]
impl RecommendationSource for ClaudeOrchestrator {
    fn name(&self) -> &str {
        "claude-orchestrator"
    }

    async fn recommend(&self) -> Result<CurrencyRecommendation, AgentError> {
        self.analyze().await
    }
}

fn build_analysis_prompt(outcomes: &[AdvisorOutcome]) -> String {
    let mut prompt = String::from(
        "Please analyze the following data sources to provide a comprehensive EUR vs USD investment recommendation.\n\n## Data Sources\n",
    );

    for outcome in outcomes {
        prompt.push_str(&format!("\n### {} analysis\n", outcome.source()));
        match outcome {
            AdvisorOutcome::Advice(opinion) => prompt.push_str(&format!(
                "- EUR: {}%\n- USD: {}%\n\nReasoning:\n{}\n",
                opinion.eur_percent, opinion.usd_percent, opinion.reasoning
            )),
            AdvisorOutcome::Failed { .. } => prompt.push_str("No data available\n"),
        }
    }

    prompt.push_str(
        r#"
## Analysis Request

Provide specific percentages for EUR vs USD allocation (must sum to 100%), detailed reasoning,
key risks, a confidence level (1-10), alternative scenarios and the time horizon.

Respond with JSON in this structure:
{
  "recommendation": { "EUR": "X%", "USD": "Y%" },
  "reasoning": "Detailed analysis...",
  "riskAssessment": "Key risks...",
  "confidenceLevel": 8,
  "alternativeScenarios": ["Scenario 1", "Scenario 2"],
  "timeHorizon": "Short-term: X, Long-term: Y"
}"#,
    );

    prompt
}

/// Parses Claude's answer. The outermost `{...}` block is tried as JSON
/// first; failing that, `EUR: NN%` and `USD: NN%` are read from the text.
pub fn parse_synthesis(answer: &str) -> Result<CurrencyRecommendation, AgentError> {
    if let Some(synthesis) = extract_json_block(answer)
        .and_then(|block| serde_json::from_str::<Synthesis>(block).ok())
    {
        return Ok(CurrencyRecommendation {
            eur: synthesis.recommendation.eur,
            usd: synthesis.recommendation.usd,
            reasoning: Some(synthesis.reasoning.unwrap_or_else(|| answer.to_string())),
            confidence_level: synthesis.confidence_level.as_ref().and_then(number_like),
            risk_assessment: synthesis.risk_assessment.as_ref().map(text_like),
            alternative_scenarios: synthesis.alternative_scenarios,
            time_horizon: synthesis.time_horizon.as_ref().map(text_like),
            source: ORCHESTRATOR_SOURCE.to_string(),
            is_fallback: false,
        });
    }

    match labelled_percentages(answer) {
        (Some(eur), Some(usd)) => Ok(CurrencyRecommendation {
            eur: format!("{}%", eur),
            usd: format!("{}%", usd),
            reasoning: Some(answer.to_string()),
            confidence_level: None,
            risk_assessment: None,
            alternative_scenarios: Vec::new(),
            time_horizon: None,
            source: ORCHESTRATOR_SOURCE.to_string(),
            is_fallback: false,
        }),
        _ => Err(AgentError::MalformedRecommendation(
            "Claude response contained no EUR/USD allocation".to_string(),
        )),
    }
}

fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_like(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
