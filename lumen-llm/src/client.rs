//! Completion client: timeout and response cleanup around a provider

use crate::{CompletionProvider, CompletionRequest};
use lumen_core::{with_deadline, LlmError, LumenError, LumenResult};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a [`CompletionProvider`] with a per-call deadline and strips
/// Markdown fences from whatever comes back.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Issue one completion call. Errors and timeouts are returned as-is;
    /// there are no retries.
    pub async fn complete(&self, request: &CompletionRequest) -> LumenResult<String> {
        let provider_id = self.provider.provider_id().to_string();
        tracing::debug!(
            provider = %provider_id,
            temperature = request.temperature,
            max_tokens = ?request.max_tokens,
            prompt = request.last_user_content().unwrap_or_default(),
            "Sending completion request"
        );

        let raw = with_deadline(self.timeout, self.provider.complete(request), |timeout_ms| {
            LumenError::Llm(LlmError::Timeout {
                provider: provider_id.clone(),
                timeout_ms,
            })
        })
        .await
        .inspect_err(|e| {
            tracing::warn!(provider = %provider_id, error = %e, "Completion request failed");
        })?;

        let cleaned = clean_response(&raw);
        tracing::debug!(provider = %provider_id, response = %cleaned, "Completion received");
        Ok(cleaned)
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.provider.provider_id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Strip fences and surrounding whitespace.
pub fn clean_response(raw: &str) -> String {
    strip_code_fences(raw).trim().to_string()
}

/// Return the body of the first Markdown code block, dropping the opening
/// fence's language tag. Text without fences is returned trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_open = &trimmed[open + 3..];
    // Language tag runs to the end of the opening line.
    let body_start = match after_open.find('\n') {
        Some(nl) if is_language_tag(&after_open[..nl]) => nl + 1,
        _ => 0,
    };
    let body = &after_open[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim().to_string()
}

fn is_language_tag(s: &str) -> bool {
    let s = s.trim();
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+')
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl CompletionProvider for Echo {
        async fn complete(&self, _request: &CompletionRequest) -> LumenResult<String> {
            Ok(self.0.to_string())
        }

        fn provider_id(&self) -> &str {
            "echo"
        }
    }

    struct Stalled;

    #[async_trait]
    impl CompletionProvider for Stalled {
        async fn complete(&self, _request: &CompletionRequest) -> LumenResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        fn provider_id(&self) -> &str {
            "stalled"
        }
    }

    #[test]
    fn test_strip_fences_with_language() {
        let text = "```sql\nSELECT * FROM contacts;\n```";
        assert_eq!(strip_code_fences(text), "SELECT * FROM contacts;");
    }

    #[test]
    fn test_strip_fences_without_language() {
        assert_eq!(strip_code_fences("```\nplt.title('x')\n```"), "plt.title('x')");
    }

    #[test]
    fn test_strip_fences_with_preamble() {
        let text = "Voici le code :\n```python\nx = 1\n```\nBonne journée";
        assert_eq!(strip_code_fences(text), "x = 1");
    }

    #[test]
    fn test_strip_fences_plain_text() {
        assert_eq!(strip_code_fences("  SQL \n"), "SQL");
    }

    #[test]
    fn test_strip_fences_unterminated() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_strip_fences_single_line() {
        assert_eq!(strip_code_fences("```SELECT 1```"), "SELECT 1");
    }

    #[tokio::test]
    async fn test_client_cleans_response() {
        let client = CompletionClient::new(Arc::new(Echo("```sql\nSELECT 1\n```")), Duration::from_secs(1));
        let out = client
            .complete(&CompletionRequest::prompt("q", 0.0))
            .await
            .unwrap();
        assert_eq!(out, "SELECT 1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_times_out() {
        let client = CompletionClient::new(Arc::new(Stalled), Duration::from_millis(100));
        let err = client
            .complete(&CompletionRequest::prompt("q", 0.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LumenError::Llm(LlmError::Timeout { timeout_ms: 100, .. })
        ));
        assert!(err.is_unavailable());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_fenced_body_recovered(body in "[a-zA-Z0-9 =*(),;']{1,60}", lang in "(sql|python|)") {
            let fenced = format!("```{lang}\n{body}\n```");
            prop_assert_eq!(strip_code_fences(&fenced), body.trim().to_string());
        }

        #[test]
        fn prop_unfenced_text_only_trimmed(body in "[a-zA-Z0-9 =*(),;']{0,60}") {
            prop_assert_eq!(strip_code_fences(&body), body.trim().to_string());
        }
    }
}
