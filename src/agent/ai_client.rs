use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::agent::types::AgentError;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

// Advisor answers whose EUR and USD figures are this far from 100 are not
// trusted as a pair.
const PAIR_SUM_TOLERANCE: u32 = 5;

const ADVISOR_SYSTEM_PROMPT: &str = r#"You are a financial analyst specializing in currency investment analysis.
Analyze the current market conditions for EUR vs USD investment opportunities.
Consider exchange rate trends, inflation, interest rates, GDP growth, ECB and Federal Reserve policy,
market sentiment, technical analysis and geopolitical factors.

Provide a clear recommendation with specific percentages for EUR vs USD investment allocation.
Format your response as: "Based on current analysis, I recommend EUR: X% and USD: Y% where X+Y=100"
Include detailed reasoning focusing on the most recent market developments."#;

const ADVISOR_USER_PROMPT: &str = "Analyze the current market conditions and provide a recommendation for EUR vs USD investment allocation. \
What percentage should be allocated to EUR and what percentage to USD? Please provide specific percentages and detailed reasoning.";

/// A single advisory source's view of the EUR/USD split.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorOpinion {
    pub source: String,
    pub eur_percent: u32,
    pub usd_percent: u32,
    pub reasoning: String,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    async fn advise(&self) -> Result<AdvisorOpinion, AgentError>;
}

/// Client for OpenAI-compatible chat completion APIs. Perplexity exposes the
/// same surface, so both advisors share this type.
pub struct ChatCompletionClient {
    name: String,
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: String,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            max_tokens: 1500,
            temperature: 0.1,
        })
    }

    pub fn openai(api_key: String, timeout: Duration) -> Result<Self, AgentError> {
        Self::new("chatgpt", OPENAI_BASE_URL, api_key, "gpt-4o-mini", timeout)
    }

    pub fn perplexity(api_key: String, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self::new("perplexity", PERPLEXITY_BASE_URL, api_key, "sonar", timeout)?.with_max_tokens(1000))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sends a system/user prompt pair and returns the first choice's content.
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgentError::AIAnalysis(format!(
                "{} API error {}: {}",
                self.name, status, error_text
            )));
        }

        let json: Value = response.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::AIAnalysis(format!("No content in {} response", self.name)))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl Advisor for ChatCompletionClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn advise(&self) -> Result<AdvisorOpinion, AgentError> {
        info!("Querying {} for currency analysis", self.name);

        let analysis = self.complete(ADVISOR_SYSTEM_PROMPT, ADVISOR_USER_PROMPT).await?;
        let (eur_percent, usd_percent) = parse_advisor_split(&analysis).ok_or_else(|| {
            warn!("{} answer contained no usable allocation", self.name);
            AgentError::AIAnalysis(format!("{} returned no EUR/USD allocation", self.name))
        })?;

        Ok(AdvisorOpinion {
            source: self.name.clone(),
            eur_percent,
            usd_percent,
            reasoning: analysis,
        })
    }
}

/// `EUR: 60%`, `eur 60%`: the label, then only colons or whitespace.
static EUR_PERCENT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)\bEUR[:\s]*(\d{1,3})%"));
static USD_PERCENT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)\bUSD[:\s]*(\d{1,3})%"));
/// A whole percentage that is not the tail of a longer number or decimal.
static ANY_PERCENT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(\d{1,3})%"));

/// Extracts an EUR/USD split from an advisor's prose.
///
/// Labelled figures (`EUR: 60%`) are used when they sum to 100 within
/// tolerance. Otherwise the first percentage in the text is taken as the EUR
/// share and USD gets the complement, provided at least two percentages are
/// present.
pub fn parse_advisor_split(text: &str) -> Option<(u32, u32)> {
    if let (Some(eur), Some(usd)) = labelled_percentages(text)
        && (eur + usd).abs_diff(100) <= PAIR_SUM_TOLERANCE
    {
        return Some((eur, usd));
    }

    let percentages = all_percentages(text);
    match percentages.as_slice() {
        [first, _, ..] => Some((*first, 100 - *first)),
        _ => None,
    }
}

/// First labelled EUR and USD figures, case-insensitive. Figures above 100
/// are ignored.
pub fn labelled_percentages(text: &str) -> (Option<u32>, Option<u32>) {
    (
        first_percentage(&EUR_PERCENT, text),
        first_percentage(&USD_PERCENT, text),
    )
}

fn first_percentage(pattern: &Result<Regex, regex::Error>, text: &str) -> Option<u32> {
    captured_percentages(pattern, text).into_iter().next()
}

/// Every percentage in `text`, in order. Figures above 100 are dropped.
fn all_percentages(text: &str) -> Vec<u32> {
    captured_percentages(&ANY_PERCENT, text)
}

fn captured_percentages(pattern: &Result<Regex, regex::Error>, text: &str) -> Vec<u32> {
    let Ok(pattern) = pattern else {
        return Vec::new();
    };

    pattern
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|value| *value <= 100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn labelled_split_is_preferred() {
        let text = "Based on current analysis, I recommend EUR: 35% and USD: 65% where X+Y=100";
        assert_eq!(parse_advisor_split(text), Some((35, 65)));
    }

    #[test]
    fn labels_are_case_insensitive_and_colon_optional() {
        assert_eq!(labelled_percentages("eur 42% of funds").0, Some(42));
        assert_eq!(labelled_percentages("Usd:\n58%").1, Some(58));
        assert_eq!(labelled_percentages("EUR strength, EUR: 30%").0, Some(30));
        assert_eq!(labelled_percentages("EURC 30%").0, None);
        assert_eq!(labelled_percentages("NEUR 30%").0, None);
    }

    #[test]
    fn oversized_figures_are_ignored_without_overflow() {
        assert_eq!(parse_advisor_split("EUR: 4294967295% USD: 1%"), None);
        assert_eq!(labelled_percentages("EUR: 4294967295%").0, None);
        assert_eq!(labelled_percentages("EUR: 250% then EUR: 40%").0, Some(40));
        assert_eq!(
            parse_advisor_split("EUR: 999% USD: 999%, or simply 30% and 70%"),
            Some((30, 70))
        );
    }

    #[test]
    fn decimal_tails_are_not_percentages() {
        assert_eq!(all_percentages("about 45.5% now, 20% later"), vec![20]);
        assert_eq!(all_percentages("12% and 1234%"), vec![12]);
    }

    #[test]
    fn patterns_compile() {
        for pattern in [&*EUR_PERCENT, &*USD_PERCENT, &*ANY_PERCENT] {
            assert!(pattern.is_ok());
        }
    }

    #[test]
    fn inconsistent_labels_fall_back_to_first_percentage() {
        let text = "EUR: 70% looks good, USD: 70% also fine";
        assert_eq!(parse_advisor_split(text), Some((70, 30)));
    }

    #[test]
    fn unlabelled_percentages_use_complement() {
        let text = "Put 45% in the euro and the remaining 55% elsewhere";
        assert_eq!(parse_advisor_split(text), Some((45, 55)));
    }

    #[test]
    fn single_or_missing_percentage_is_rejected() {
        assert_eq!(parse_advisor_split("All in on the euro, 100%"), None);
        assert_eq!(parse_advisor_split("no numbers here"), None);
        assert_eq!(parse_advisor_split("150% then 20%"), None);
    }

    #[tokio::test]
    async fn chat_completion_advisor_parses_answer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(serde_json::json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "I recommend EUR: 55% and USD: 45% given ECB policy."
                    }
                }]
            }));
        });

        let client = ChatCompletionClient::openai("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.base_url());

        let opinion = client.advise().await.unwrap();

        mock.assert();
        assert_eq!(opinion.source, "chatgpt");
        assert_eq!((opinion.eur_percent, opinion.usd_percent), (55, 45));
        assert!(opinion.reasoning.contains("ECB"));
    }

    #[tokio::test]
    async fn upstream_error_status_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let client = ChatCompletionClient::perplexity("k".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.base_url());

        let err = client.advise().await.unwrap_err();
        assert!(matches!(err, AgentError::AIAnalysis(msg) if msg.contains("429")));
    }
}
