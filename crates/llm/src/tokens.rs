//! Token accounting for message sequences.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::{
    error::LlmError,
    messages::{ContentPart, ImageDetail, Message},
};

/// Fixed cost of a low-detail image.
pub const LOW_DETAIL_IMAGE_TOKENS: usize = 65;

/// Worst-case cost of a high or auto detail image.
pub const HIGH_DETAIL_IMAGE_TOKENS: usize = 129 * 16;

/// Tokens every reply is primed with.
const REPLY_PRIMING_TOKENS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    O200k,
    Cl100k,
}

const O200K_PREFIXES: &[&str] = &["gpt-4o", "gpt-4.1", "gpt-5", "chatgpt-4o", "o1", "o3", "o4"];

impl Encoding {
    fn for_model(model: &str) -> Self {
        if O200K_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
            Encoding::O200k
        } else {
            Encoding::Cl100k
        }
    }

    fn load(self) -> crate::Result<&'static CoreBPE> {
        static O200K: OnceLock<Result<CoreBPE, String>> = OnceLock::new();
        static CL100K: OnceLock<Result<CoreBPE, String>> = OnceLock::new();

        let cell = match self {
            Encoding::O200k => O200K.get_or_init(|| tiktoken_rs::o200k_base().map_err(|e| e.to_string())),
            Encoding::Cl100k => CL100K.get_or_init(|| tiktoken_rs::cl100k_base().map_err(|e| e.to_string())),
        };

        cell.as_ref()
            .map_err(|e| LlmError::TokenizationFailed(format!("failed to load {self:?} encoding: {e}")))
    }
}

/// Strips a `provider/` routing prefix from a model identifier.
fn bare_model(model: &str) -> &str {
    model.rsplit_once('/').map(|(_, name)| name).unwrap_or(model)
}

/// Counts tokens in a message sequence, including the reply priming overhead.
pub fn count_tokens(messages: &[Message], model: &str) -> crate::Result<usize> {
    let model = bare_model(model);
    let bpe = Encoding::for_model(model).load()?;

    let total = messages
        .iter()
        .map(|message| message_cost(bpe, message, model))
        .sum::<usize>();

    Ok(total + REPLY_PRIMING_TOKENS)
}

/// Cost of one message on its own, without the reply priming overhead.
pub fn count_message_tokens(message: &Message, model: &str) -> crate::Result<usize> {
    let model = bare_model(model);
    let bpe = Encoding::for_model(model).load()?;

    Ok(message_cost(bpe, message, model))
}

fn message_cost(bpe: &CoreBPE, message: &Message, model: &str) -> usize {
    let overhead = if model.starts_with("gpt-3.5-turbo-0301") { 4 } else { 3 };
    let role = bpe.encode_with_special_tokens(message.role.as_str()).len();

    let content = if message.is_multipart() {
        message.parts.iter().map(|part| part_cost(bpe, part)).sum()
    } else {
        bpe.encode_with_special_tokens(&message.text).len()
    };

    overhead + role + content
}

fn part_cost(bpe: &CoreBPE, part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } => bpe.encode_with_special_tokens(text).len(),
        ContentPart::Image {
            detail: Some(ImageDetail::Low),
            ..
        } => LOW_DETAIL_IMAGE_TOKENS,
        ContentPart::Image { .. } => HIGH_DETAIL_IMAGE_TOKENS,
        ContentPart::File { url, .. } => bpe.encode_with_special_tokens(url).len(),
    }
}
