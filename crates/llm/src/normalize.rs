//! Repairs arbitrary message histories into a shape every backend accepts.

use crate::{
    error::LlmError,
    messages::{Message, Role},
};

/// Stands in for a missing user turn.
pub const CONTINUE_PLACEHOLDER: &str = "continue";

/// Stands in for a missing assistant turn.
pub const ACKNOWLEDGE_PLACEHOLDER: &str = "Got it, give me a moment.";

/// Normalizes a conversation into at most one leading system message followed by
/// strict user/assistant alternation ending on a user message.
///
/// Missing turns are filled with placeholders instead of dropping content, except
/// that the result always has odd length: an assistant message left at the very
/// start is removed.
pub fn fix(messages: Vec<Message>) -> crate::Result<Vec<Message>> {
    let Some(last) = messages.last() else {
        return Err(LlmError::InvalidState("cannot normalize an empty conversation".to_string()));
    };

    let needs_user_turn = last.role != Role::User;
    let (system, mut turns): (Vec<_>, Vec<_>) = messages.into_iter().partition(|m| m.role == Role::System);

    if needs_user_turn {
        turns.push(Message::user(CONTINUE_PLACEHOLDER));
    }

    let mut reversed = Vec::with_capacity(turns.len() * 2);
    let mut last_role = None;

    for message in turns.into_iter().rev() {
        if last_role == Some(message.role) {
            reversed.push(placeholder_between(message.role));
        }

        last_role = Some(message.role);
        reversed.push(message);
    }

    if reversed.len() % 2 == 0 {
        reversed.pop();
    }

    reversed.reverse();

    let mut fixed = Vec::with_capacity(reversed.len() + 1);
    fixed.extend(merge_system(system));
    fixed.extend(reversed);

    Ok(fixed)
}

/// The message to insert between two consecutive messages with `duplicated` role.
fn placeholder_between(duplicated: Role) -> Message {
    match duplicated {
        Role::Assistant => Message::user(CONTINUE_PLACEHOLDER),
        _ => Message::assistant(ACKNOWLEDGE_PLACEHOLDER),
    }
}

fn merge_system(mut system: Vec<Message>) -> Option<Message> {
    match system.len() {
        0 => None,
        1 => system.pop(),
        _ => {
            let text = system.iter().map(Message::plain_text).collect::<Vec<_>>().join("\n\n");
            Some(Message::system(text))
        }
    }
}

/// Whether a sequence already satisfies the normalized shape.
pub fn is_normalized(messages: &[Message]) -> bool {
    let turns = match messages.first() {
        Some(first) if first.role == Role::System => &messages[1..],
        _ => messages,
    };

    if turns.len() % 2 == 0 {
        return false;
    }

    turns.iter().enumerate().all(|(i, message)| {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        message.role == expected
    })
}
