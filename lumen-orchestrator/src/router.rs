//! Request routing
//!
//! Decides per request whether the answer lives in the relational store, the
//! document store, or both. A follow-up about data already discussed is
//! settled from the history alone; anything else costs one classification
//! call. The router never fails: every inconclusive path lands on
//! [`RoutingDecision::Structured`] with a basis saying why.

use lumen_core::{
    ConfigError, ConversationTurn, LlmConfig, LumenError, LumenResult, Request, RouterConfig,
    Routing, RoutingBasis, RoutingDecision,
};
use lumen_llm::{CompletionClient, CompletionRequest, PromptBuilder};
use regex::Regex;

const ROUTING_RULES: &str = "RÈGLES DE ROUTAGE :
- SQL : questions sur les contacts, les entreprises, les clients ou la base de données (lister, compter, ajouter, modifier, représenter ces données).
- VECTOR : questions sur le contenu des documents ou rapports ajoutés.
- SQL : demande qui reprend le contexte SQL précédent (« les », « ça », « ceux-là »).
- BOTH : quand les deux sources sont utiles.";

const ROUTING_OUTPUT: &str = "Réponds UNIQUEMENT par un mot : SQL, VECTOR ou BOTH.";

const STRUCTURED_CONTEXT_NOTE: &str =
    "CONTEXTE : la conversation précédente portait sur des données de contacts/entreprises de la base SQL.";

/// Classifies requests into a [`Routing`].
#[derive(Debug, Clone)]
pub struct Router {
    client: CompletionClient,
    history_window: usize,
    temperature: f32,
    max_tokens: u32,
    context_keywords: Option<Regex>,
    follow_up_cues: Option<Regex>,
}

impl Router {
    pub fn new(client: CompletionClient, router: &RouterConfig, llm: &LlmConfig) -> LumenResult<Self> {
        let cues: Vec<String> = router
            .anaphora
            .iter()
            .chain(router.visualization_terms.iter())
            .cloned()
            .collect();
        Ok(Self {
            client,
            history_window: router.history_window,
            temperature: llm.classification_temperature,
            max_tokens: llm.classification_max_tokens,
            context_keywords: word_pattern("router.context_keywords", &router.context_keywords)?,
            follow_up_cues: word_pattern("router.anaphora", &cues)?,
        })
    }

    /// True when the history holds more than one turn and one of the last
    /// `history_window` turns mentions the relational data.
    pub fn has_structured_context(&self, history: &[ConversationTurn]) -> bool {
        if history.len() <= 1 {
            return false;
        }
        let Some(keywords) = &self.context_keywords else {
            return false;
        };
        let start = history.len().saturating_sub(self.history_window);
        history[start..]
            .iter()
            .any(|turn| keywords.is_match(&turn.content))
    }

    /// True when `text` refers back to earlier results or asks for a chart.
    pub fn has_follow_up_cue(&self, text: &str) -> bool {
        self.follow_up_cues
            .as_ref()
            .is_some_and(|cues| cues.is_match(text))
    }

    pub fn classification_prompt(&self, text: &str, structured_context: bool) -> String {
        let mut builder = PromptBuilder::new()
            .instructions(format!("L'utilisateur demande : \"{text}\""));
        if structured_context {
            builder = builder.instructions(STRUCTURED_CONTEXT_NOTE);
        }
        builder
            .instructions(ROUTING_RULES)
            .output(ROUTING_OUTPUT)
            .build()
    }

    /// Zero or one completion call, never retried.
    pub async fn route(&self, request: &Request) -> Routing {
        let structured_context = self.has_structured_context(&request.history);
        if structured_context && self.has_follow_up_cue(&request.text) {
            tracing::info!("Follow-up on structured data, skipping classification");
            return Routing::new(RoutingDecision::Structured, RoutingBasis::ContextOverride);
        }

        let prompt = self.classification_prompt(&request.text, structured_context);
        let completion = CompletionRequest::prompt(prompt, self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.client.complete(&completion).await {
            Ok(raw) => match RoutingDecision::from_label(&raw) {
                Some(decision) => Routing::new(decision, RoutingBasis::Classified),
                None => {
                    tracing::warn!(raw = %raw, "Unrecognized routing label, defaulting to structured");
                    Routing::new(
                        RoutingDecision::Structured,
                        RoutingBasis::FailClosedUnrecognized { raw },
                    )
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Classification unavailable, defaulting to structured");
                Routing::new(
                    RoutingDecision::Structured,
                    RoutingBasis::FailClosedUnavailable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

/// Case-insensitive whole-word alternation over `words`; `None` when the
/// list is empty.
fn word_pattern(field: &str, words: &[String]) -> LumenResult<Option<Regex>> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern).map(Some).map_err(|e| {
        LumenError::Config(ConfigError::InvalidValue {
            field: field.to_string(),
            value: words.join(", "),
            reason: e.to_string(),
        })
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_llm::CompletionProvider;
    use lumen_test_utils::ScriptedCompletionProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn router(provider: Arc<dyn CompletionProvider>) -> Router {
        let client = CompletionClient::new(provider, Duration::from_secs(1));
        Router::new(client, &RouterConfig::default(), &LlmConfig::default()).unwrap()
    }

    fn scripted() -> Router {
        router(Arc::new(ScriptedCompletionProvider::new()))
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let r = scripted();
        let history = vec![
            ConversationTurn::user("Bonjour"),
            ConversationTurn::assistant("Les CONTACTS sont prêts."),
        ];
        assert!(r.has_structured_context(&history));

        let history = vec![
            ConversationTurn::user("Bonjour"),
            ConversationTurn::assistant("Voir la baseline du projet."),
        ];
        assert!(!r.has_structured_context(&history));
    }

    #[test]
    fn test_single_turn_history_is_not_context() {
        let r = scripted();
        let history = vec![ConversationTurn::user("liste des contacts")];
        assert!(!r.has_structured_context(&history));
    }

    #[test]
    fn test_history_window_limits_scan() {
        let r = scripted();
        let mut history = vec![ConversationTurn::user("combien de contacts ?")];
        for _ in 0..6 {
            history.push(ConversationTurn::assistant("Bonjour"));
        }
        assert!(!r.has_structured_context(&history));
    }

    #[test]
    fn test_follow_up_cues() {
        let r = scripted();
        assert!(r.has_follow_up_cue("fais-moi un camembert"));
        assert!(r.has_follow_up_cue("Montre-LES"));
        assert!(r.has_follow_up_cue("plot that"));
        assert!(!r.has_follow_up_cue("résume le rapport annuel"));
    }

    #[test]
    fn test_prompt_mentions_context_only_when_found() {
        let r = scripted();
        assert!(r
            .classification_prompt("et ensuite ?", true)
            .contains(STRUCTURED_CONTEXT_NOTE));
        let plain = r.classification_prompt("et ensuite ?", false);
        assert!(!plain.contains(STRUCTURED_CONTEXT_NOTE));
        assert!(plain.contains("L'utilisateur demande : \"et ensuite ?\""));
        assert!(plain.ends_with(ROUTING_OUTPUT));
    }

    #[test]
    fn test_empty_keyword_lists_disable_override() {
        let config = RouterConfig {
            context_keywords: Vec::new(),
            anaphora: Vec::new(),
            visualization_terms: Vec::new(),
            ..RouterConfig::default()
        };
        let client = CompletionClient::new(
            Arc::new(ScriptedCompletionProvider::new()),
            Duration::from_secs(1),
        );
        let r = Router::new(client, &config, &LlmConfig::default()).unwrap();
        let history = vec![
            ConversationTurn::user("contacts"),
            ConversationTurn::assistant("contacts"),
        ];
        assert!(!r.has_structured_context(&history));
        assert!(!r.has_follow_up_cue("les"));
    }

    #[tokio::test]
    async fn test_classified_label() {
        let provider = Arc::new(ScriptedCompletionProvider::replying(["VECTOR"]));
        let r = router(provider.clone());
        let routing = r.route(&Request::new("que dit le rapport 2023 ?")).await;
        assert_eq!(routing.decision, RoutingDecision::Semantic);
        assert_eq!(routing.basis, RoutingBasis::Classified);

        let request = &provider.requests()[0];
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, Some(10));
    }
}
