//! Retrieval augmentation: search results injected into the last user turn.

use std::{fmt::Write, time::Duration};

use crate::{
    error::LlmError,
    messages::{ChatRequest, Role, flags},
    search::{Document, Searcher},
};

const CITATION_INSTRUCTIONS: &str = "Answer the question below using the search results. \
Cite a result with its number in square brackets, like [1], right after the statement it supports. \
If the results are not relevant, answer from your own knowledge and do not cite them.";

/// Searches for the last user message and prepends the results to it.
///
/// The search flag is always removed so backends with native search are not asked
/// twice. Search failures are logged and the request proceeds unaugmented.
/// Returns whether any results were injected.
pub async fn augment(request: &mut ChatRequest, searcher: &dyn Searcher, count: usize, timeout: Duration) -> bool {
    if !request.take_flag(flags::SEARCH) {
        return false;
    }

    let Some(last_user) = request.messages.iter().rposition(|m| m.role == Role::User) else {
        return false;
    };

    let query = request.messages[last_user].plain_text();
    let history = &request.messages[..last_user];

    let documents = match tokio::time::timeout(timeout, searcher.search(&query, history, count)).await {
        Ok(Ok(documents)) => documents,
        Ok(Err(error)) => {
            log::warn!("{}", LlmError::SearchFailed(format!("{error:#}")));
            return false;
        }
        Err(_) => {
            log::warn!("{}", LlmError::SearchFailed(format!("no results within {timeout:?}")));
            return false;
        }
    };

    if documents.is_empty() {
        log::debug!("Search returned no documents, sending the request unaugmented");
        return false;
    }

    log::debug!("Augmenting the request with {} search results", documents.len().min(count));

    let preamble = citation_preamble(documents.iter().take(count));
    request.messages[last_user].prepend_text(&preamble);

    true
}

fn citation_preamble<'a>(documents: impl Iterator<Item = &'a Document>) -> String {
    let mut preamble = String::from(CITATION_INSTRUCTIONS);
    preamble.push_str("\n\nSearch results:\n");

    for (i, document) in documents.enumerate() {
        let _ = write!(
            preamble,
            "\n[{}] {} ({})\n{}\n",
            i + 1,
            document.title,
            document.source,
            document.content.trim()
        );
    }

    preamble.push_str("\nQuestion: ");
    preamble
}
