use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ServiceError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const INPUT_TOKEN_COST: f64 = 0.000_003;
const OUTPUT_TOKEN_COST: f64 = 0.000_015;
const HIGH_COST_ALERT_THRESHOLD: f64 = 1.0;

/// One completed model call: the text plus token accounting for cost logs.
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Seam for the model call so the pipeline can run against a scripted
/// client in tests.
pub trait InferenceClient {
    fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<InferenceResponse, ServiceError>;

    fn model_id(&self) -> &str;
}

/// Blocking Anthropic Messages API client.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicClient {
    pub fn from_env(model: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

impl InferenceClient for AnthropicClient {
    fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<InferenceResponse, ServiceError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: user_message,
            }],
        };

        let response = ureq::post(&format!("{}/messages", self.base_url))
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&request);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(429, _)) => {
                return Err(ServiceError::RateLimited { status: 429 });
            }
            Err(ureq::Error::Status(status, response)) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                return Err(ServiceError::Api { status, message });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ServiceError::Transport(transport.to_string()));
            }
        };

        let body: MessagesResponse = response
            .into_json()
            .map_err(|error| ServiceError::MalformedResponse(error.to_string()))?;

        let text = body
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| {
                ServiceError::MalformedResponse("response carried no content blocks".to_string())
            })?;

        Ok(InferenceResponse {
            text,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Bounded exponential backoff for transient model-service failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled =
            self.base_delay.as_secs_f64() * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Run `operation` up to `max_attempts` times, sleeping between
    /// retryable failures. Non-retryable errors surface immediately.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut attempt = 1u32;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "model call failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Log token usage with a dollar estimate; flag unusually expensive calls.
pub fn log_usage(label: &str, response: &InferenceResponse) {
    let cost = response.input_tokens as f64 * INPUT_TOKEN_COST
        + response.output_tokens as f64 * OUTPUT_TOKEN_COST;

    info!(
        label,
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        cost_usd = format!("{cost:.4}").as_str(),
        "model call completed"
    );

    if cost > HIGH_COST_ALERT_THRESHOLD {
        warn!(
            label,
            cost_usd = format!("{cost:.4}").as_str(),
            "model call exceeded cost alert threshold"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retry_policy_recovers_from_transient_failures() {
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };

        let result = policy.run(|| {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(ServiceError::Transport("connection reset".to_string()))
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn non_retryable_errors_surface_immediately() {
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };

        let result: Result<(), ServiceError> = policy.run(|| {
            attempts.set(attempts.get() + 1);
            Err(ServiceError::MalformedResponse("not json".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn retries_are_exhausted_after_max_attempts() {
        let attempts = Cell::new(0u32);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };

        let result: Result<(), ServiceError> = policy.run(|| {
            attempts.set(attempts.get() + 1);
            Err(ServiceError::RateLimited { status: 429 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    }
}
