//! Resolves a model identifier into an ordered list of providers.

use std::{collections::BTreeSet, sync::Arc};

use context::RequestContext;

use crate::{
    catalog::{ModelCatalog, ModelMetadata, Provider},
    error::LlmError,
    messages::{ChatRequest, Message, Role, flags},
};

/// Outcome of provider resolution for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Model identifier the caller asked for.
    pub model: String,
    /// Provider the request is dispatched to.
    pub selected: Provider,
    /// Remaining candidates, in preference order.
    pub alternatives: Vec<Provider>,
    pub metadata: ModelMetadata,
    /// Whether the model had no providers and the fallback was synthesized.
    pub synthetic: bool,
}

impl Selection {
    /// Model identifier sent upstream.
    pub fn outbound_model(&self) -> &str {
        self.selected.rewrite.as_deref().unwrap_or(&self.model)
    }

    /// All candidates in preference order, the selected one first.
    pub fn candidates(&self) -> impl Iterator<Item = &Provider> {
        std::iter::once(&self.selected).chain(&self.alternatives)
    }

    pub fn ensure_allowed(&self, context: &RequestContext) -> crate::Result<()> {
        if self.metadata.restricted && !context.allow_restricted {
            return Err(LlmError::ModelRestricted(self.model.clone()));
        }

        Ok(())
    }

    /// Merges the model metadata into the request and rewrites the model identifier.
    pub fn apply(&self, request: &mut ChatRequest) {
        request.model = self.outbound_model().to_string();

        if let Some(prompt) = self.metadata.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            match request.messages.first_mut() {
                Some(first) if first.role == Role::System => first.prepend_text(&format!("{prompt}\n\n")),
                _ => request.messages.insert(0, Message::system(prompt)),
            }
        }

        if request.temperature == 0.0
            && let Some(temperature) = self.metadata.temperature
        {
            request.temperature = temperature;
        }

        if request.search_result_count == 0
            && let Some(count) = self.metadata.search_results
        {
            request.search_result_count = count;
        }
    }
}

pub struct Selector {
    catalog: Arc<dyn ModelCatalog>,
}

impl Selector {
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Orders the configured providers of `model`.
    ///
    /// With the reasoning flag, reasoning-capable providers come first, otherwise
    /// default providers do. The other group follows as fallback candidates. Within
    /// a group, higher priority wins and configuration order breaks ties. Unknown
    /// models resolve to the fallback provider instead of failing.
    pub fn resolve(&self, model: &str, request_flags: &BTreeSet<String>) -> Selection {
        let prefer_reasoning = request_flags.contains(flags::REASONING);
        let entry = self.catalog.lookup_model(model).unwrap_or_default();
        let mut metadata = entry.metadata;

        let (mut reasoning, mut default): (Vec<_>, Vec<_>) = entry.providers.into_iter().partition(|p| p.reasoning);

        reasoning.sort_by_key(|p| std::cmp::Reverse(p.priority));
        default.sort_by_key(|p| std::cmp::Reverse(p.priority));

        let mut ordered = if prefer_reasoning {
            reasoning.extend(default);
            reasoning
        } else {
            default.extend(reasoning);
            default
        };

        if ordered.is_empty() {
            let fallback = self.catalog.fallback();
            log::debug!("Model '{model}' has no providers, using fallback provider '{}'", fallback.provider);

            metadata.max_context = Some(metadata.max_context.map_or(fallback.max_context, |max| {
                max.min(fallback.max_context)
            }));

            return Selection {
                model: model.to_string(),
                selected: Provider {
                    id: fallback.provider,
                    kind: fallback.kind,
                    channel: None,
                    rewrite: None,
                    priority: 0,
                    reasoning: false,
                },
                alternatives: Vec::new(),
                metadata,
                synthetic: true,
            };
        }

        let selected = ordered.remove(0);

        Selection {
            model: model.to_string(),
            selected,
            alternatives: ordered,
            metadata,
            synthetic: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use config::Config;
    use indoc::indoc;

    use super::*;
    use crate::catalog::StaticCatalog;

    fn selector() -> Selector {
        let config: Config = toml::from_str(indoc! {r#"
            [channels.openai]
            type = "openai"

            [models.deepseek]
            system_prompt = "Think carefully."
            temperature = 0.6
            search_results = 5

            [[models.deepseek.providers]]
            id = "cheap"
            type = "openai"

            [[models.deepseek.providers]]
            id = "thinker"
            type = "openai"
            reasoning = true
            rewrite = "deepseek-reasoner"

            [[models.deepseek.providers]]
            id = "fast"
            type = "openai"
            priority = 10

            [[models.deepseek.providers]]
            id = "deep-thinker"
            type = "anthropic"
            reasoning = true
            priority = 5

            [models.empty]
            system_prompt = "Hello."
        "#})
        .unwrap();

        Selector::new(Arc::new(StaticCatalog::new(config)))
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.candidates().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn default_providers_first_by_priority() {
        let selection = selector().resolve("deepseek", &BTreeSet::new());

        assert_eq!(ids(&selection), ["fast", "cheap", "deep-thinker", "thinker"]);
        assert_eq!(selection.outbound_model(), "deepseek");
    }

    #[test]
    fn reasoning_flag_prefers_reasoning_providers() {
        let flags = BTreeSet::from([flags::REASONING.to_string()]);
        let selection = selector().resolve("deepseek", &flags);

        assert_eq!(ids(&selection), ["deep-thinker", "thinker", "fast", "cheap"]);
    }

    #[test]
    fn unknown_model_gets_synthetic_fallback() {
        let selection = selector().resolve("mystery-model", &BTreeSet::new());

        insta::assert_debug_snapshot!(selection, @r#"
        Selection {
            model: "mystery-model",
            selected: Provider {
                id: "openai",
                kind: OpenAi,
                channel: None,
                rewrite: None,
                priority: 0,
                reasoning: false,
            },
            alternatives: [],
            metadata: ModelMetadata {
                system_prompt: None,
                temperature: None,
                max_context: Some(
                    4000,
                ),
                search_results: None,
                restricted: false,
            },
            synthetic: true,
        }
        "#);
    }

    #[test]
    fn model_without_providers_keeps_its_metadata() {
        let selection = selector().resolve("empty", &BTreeSet::new());

        assert!(selection.synthetic);
        assert_eq!(selection.metadata.system_prompt.as_deref(), Some("Hello."));
    }

    #[test]
    fn apply_rewrites_model_and_merges_metadata() {
        let flags = BTreeSet::from([flags::REASONING.to_string()]);
        let mut selection = selector().resolve("deepseek", &flags);
        selection.selected = selection.alternatives.remove(0);

        let mut request = ChatRequest::new(
            "deepseek",
            vec![Message::system("Answer in French."), Message::user("hi")],
        );

        selection.apply(&mut request);

        assert_eq!(request.model, "deepseek-reasoner");
        assert_eq!(request.messages[0].text, "Think carefully.\n\nAnswer in French.");
        assert_eq!(request.temperature, 0.6);
        assert_eq!(request.search_result_count, 5);
    }

    #[test]
    fn apply_inserts_system_prompt_and_keeps_explicit_temperature() {
        let selection = selector().resolve("deepseek", &BTreeSet::new());

        let mut request = ChatRequest::new("deepseek", vec![Message::user("hi")]);
        request.temperature = 0.2;

        selection.apply(&mut request);

        assert_eq!(request.messages[0], Message::system("Think carefully."));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, 0.2);
    }

    #[test]
    fn restricted_models_need_permission() {
        let mut selection = selector().resolve("deepseek", &BTreeSet::new());
        selection.metadata.restricted = true;

        let error = selection.ensure_allowed(&RequestContext::new()).unwrap_err();
        assert_eq!(error, LlmError::ModelRestricted("deepseek".to_string()));

        assert!(selection.ensure_allowed(&RequestContext::new().allow_restricted(true)).is_ok());
    }
}
