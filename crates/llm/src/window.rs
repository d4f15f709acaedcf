//! Context window reduction.
//!
//! Conversations are trimmed from the oldest turn. System messages never count
//! against the turn cap and are never dropped.

use crate::{
    error::LlmError,
    messages::{ContentPart, ImageDetail, Message, Role},
    tokens,
};

/// Budgets applied by [`fix_context_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    /// Question/answer exchanges kept before the last user turn. Zero disables the cap.
    pub max_turns: usize,
    /// Total input token budget, system messages included.
    pub max_tokens: usize,
    /// Ceiling for the last message on its own. Zero disables the check.
    pub max_message_tokens: usize,
}

/// Keeps at most `max_turns` exchanges plus the trailing unanswered turn.
///
/// Expects `[Q, A, Q, A, ..., Q]`.
pub fn cap_by_turns(mut messages: Vec<Message>, max_turns: usize) -> Vec<Message> {
    let keep = max_turns * 2 + 1;

    if messages.len().saturating_sub(1) > max_turns * 2 {
        messages.drain(..messages.len() - keep);
    }

    messages
}

/// Drops the oldest messages until the sequence fits `max_tokens`.
///
/// Fails with [`LlmError::ContextTooLarge`] when even a single message does not fit.
/// A window never starts on an assistant message.
pub fn reduce_by_tokens(mut messages: Vec<Message>, model: &str, max_tokens: usize) -> crate::Result<Vec<Message>> {
    let costs = messages
        .iter()
        .map(|message| tokens::count_message_tokens(message, model))
        .collect::<crate::Result<Vec<_>>>()?;

    // Same value `tokens::count_tokens` would return for the remaining window.
    let mut total = costs.iter().sum::<usize>() + tokens::count_tokens(&[], model)?;
    let mut dropped = 0;

    while total > max_tokens {
        if messages.len() - dropped < 2 {
            return Err(LlmError::ContextTooLarge(format!(
                "{total} tokens do not fit the budget of {max_tokens} for model '{model}'"
            )));
        }

        total -= costs[dropped];
        dropped += 1;
    }

    if dropped > 0 {
        log::debug!("Dropped {dropped} oldest messages to fit {max_tokens} tokens");
        messages.drain(..dropped);
    }

    if messages.len() > 1 && messages[0].role == Role::Assistant {
        messages.remove(0);
    }

    Ok(messages)
}

/// Fits a normalized conversation into the window of `model`.
///
/// System messages are kept in full and their cost is taken out of the token
/// budget before the other turns are capped and reduced. Images without a detail
/// hint are set to low detail once the window is fixed.
pub fn fix_context_window(messages: Vec<Message>, model: &str, limits: WindowLimits) -> crate::Result<Vec<Message>> {
    let (system, turns): (Vec<_>, Vec<_>) = messages.into_iter().partition(|m| m.role == Role::System);

    let system_cost = system
        .iter()
        .map(|message| tokens::count_message_tokens(message, model))
        .sum::<crate::Result<usize>>()?;

    let Some(budget) = limits.max_tokens.checked_sub(system_cost) else {
        return Err(LlmError::ContextTooLarge(format!(
            "system prompt alone takes {system_cost} of {} tokens",
            limits.max_tokens
        )));
    };

    let turns = if limits.max_turns > 0 {
        cap_by_turns(turns, limits.max_turns)
    } else {
        turns
    };

    let turns = reduce_by_tokens(turns, model, budget)?;

    if limits.max_message_tokens > 0
        && let Some(last) = turns.last()
    {
        let cost = tokens::count_message_tokens(last, model)?;

        if cost > limits.max_message_tokens {
            return Err(LlmError::MessageTooLong {
                tokens: cost,
                limit: limits.max_message_tokens,
            });
        }
    }

    let mut window = system;
    window.extend(turns);

    for part in window.iter_mut().flat_map(|m| m.parts.iter_mut()) {
        if let ContentPart::Image { detail: detail @ None, .. } = part {
            *detail = Some(ImageDetail::Low);
        }
    }

    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(exchanges: usize) -> Vec<Message> {
        let mut messages = Vec::new();

        for i in 1..=exchanges {
            messages.push(Message::user(format!("Q{i}")));
            messages.push(Message::assistant(format!("A{i}")));
        }

        messages.push(Message::user(format!("Q{}", exchanges + 1)));
        messages
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    fn limits(max_tokens: usize) -> WindowLimits {
        WindowLimits {
            max_turns: 10,
            max_tokens,
            max_message_tokens: 7000,
        }
    }

    #[test]
    fn cap_keeps_last_exchange_and_question() {
        let capped = cap_by_turns(conversation(2), 1);

        assert_eq!(texts(&capped), ["Q2", "A2", "Q3"]);
    }

    #[test]
    fn cap_within_budget_is_unchanged() {
        let messages = conversation(3);

        assert_eq!(cap_by_turns(messages.clone(), 3), messages);
        assert_eq!(cap_by_turns(messages.clone(), 10), messages);
    }

    #[test]
    fn cap_never_exceeds_the_turn_count() {
        for exchanges in 0..8 {
            for max_turns in 0..5 {
                let capped = cap_by_turns(conversation(exchanges), max_turns);

                assert!(capped.len() <= max_turns * 2 + 1);
                assert_eq!(capped.last().map(|m| m.role), Some(Role::User));
            }
        }
    }

    #[test]
    fn reduce_within_budget_is_unchanged() {
        let messages = conversation(2);

        assert_eq!(reduce_by_tokens(messages.clone(), "gpt-4o", 10_000).unwrap(), messages);
    }

    #[test]
    fn reduce_drops_oldest_and_never_starts_on_assistant() {
        let messages = conversation(4);
        let full = tokens::count_tokens(&messages, "gpt-4o").unwrap();

        let mut previous = messages.len();

        for budget in (0..full).rev() {
            let Ok(reduced) = reduce_by_tokens(messages.clone(), "gpt-4o", budget) else {
                break;
            };

            assert!(reduced.len() <= previous);
            assert_eq!(reduced[0].role, Role::User);
            assert!(tokens::count_tokens(&reduced, "gpt-4o").unwrap() <= budget);
            assert_eq!(reduced.last(), messages.last());

            previous = reduced.len();
        }
    }

    #[test]
    fn single_message_over_budget_is_too_large() {
        let messages = vec![
            Message::user("an old question"),
            Message::assistant("an old answer"),
            Message::user("word ".repeat(200)),
        ];

        let error = reduce_by_tokens(messages, "gpt-4o", 50).unwrap_err();

        assert!(matches!(error, LlmError::ContextTooLarge(_)));
    }

    #[test]
    fn system_messages_survive_and_count_against_the_budget() {
        let system = Message::system("You are a helpful assistant.");
        let mut messages = vec![system.clone()];
        messages.extend(conversation(3));

        let system_cost = tokens::count_message_tokens(&system, "gpt-4o").unwrap();
        let last_cost = tokens::count_message_tokens(&Message::user("Q4"), "gpt-4o").unwrap();
        let priming = tokens::count_tokens(&[], "gpt-4o").unwrap();

        let window = fix_context_window(messages, "gpt-4o", limits(system_cost + last_cost + priming)).unwrap();

        assert_eq!(texts(&window), ["You are a helpful assistant.", "Q4"]);
    }

    #[test]
    fn system_prompt_larger_than_budget() {
        let messages = vec![Message::system("rule ".repeat(100)), Message::user("hi")];

        let error = fix_context_window(messages, "gpt-4o", limits(20)).unwrap_err();

        assert_eq!(error.code(), "context_too_large");
    }

    #[test]
    fn turn_cap_applies_before_tokens() {
        let window = fix_context_window(
            conversation(5),
            "gpt-4o",
            WindowLimits {
                max_turns: 2,
                ..limits(100_000)
            },
        )
        .unwrap();

        assert_eq!(texts(&window), ["Q4", "A4", "Q5", "A5", "Q6"]);
    }

    #[test]
    fn last_message_over_ceiling_is_rejected() {
        let messages = vec![Message::user("token ".repeat(100))];

        let error = fix_context_window(
            messages,
            "gpt-4o",
            WindowLimits {
                max_message_tokens: 50,
                ..limits(100_000)
            },
        )
        .unwrap_err();

        assert!(matches!(error, LlmError::MessageTooLong { limit: 50, .. }));
    }

    #[test]
    fn images_default_to_low_detail() {
        let messages = vec![Message::user("").with_parts(vec![
            ContentPart::text("what is this?"),
            ContentPart::image_url("https://example.com/a.png", None),
            ContentPart::image_url("https://example.com/b.png", Some(ImageDetail::High)),
        ])];

        let window = fix_context_window(messages, "gpt-4o", limits(100_000)).unwrap();

        let details: Vec<_> = window[0]
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Image { detail, .. } => *detail,
                _ => None,
            })
            .collect();

        assert_eq!(details, [ImageDetail::Low, ImageDetail::High]);
    }
}
