mod anthropic;
mod failover;
mod ollama;
mod openai;
mod routing;

use llm::ResponseFragment;

/// Concatenated text of the successful fragments.
fn text(items: &[llm::Result<ResponseFragment>]) -> String {
    items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|fragment| fragment.text_delta.as_str())
        .collect()
}

/// Error codes of the failed items.
fn errors(items: &[llm::Result<ResponseFragment>]) -> Vec<&'static str> {
    items
        .iter()
        .filter_map(|item| item.as_ref().err())
        .map(|error| error.code())
        .collect()
}
