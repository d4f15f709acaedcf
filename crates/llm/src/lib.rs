//! Provider-agnostic chat completion engine.
//!
//! A request goes through normalization, provider selection, context window
//! reduction and optional retrieval augmentation before it is dispatched to an
//! upstream backend, with failover to the channel's backup. Responses come back
//! either complete or as a cancellable stream of fragments.

pub mod augment;
pub mod backend;
pub mod catalog;
mod engine;
mod error;
pub mod messages;
pub mod normalize;
pub mod search;
pub mod selector;
pub mod stream;
pub mod tokens;
pub mod upload;
pub mod window;

pub use backend::{Backend, BackendBuilder, BackendFactory, Failover};
pub use catalog::{Channel, FallbackModel, ModelCatalog, ModelEntry, ModelMetadata, Provider, StaticCatalog};
pub use engine::{Engine, EngineBuilder};
pub use error::{LlmError, LlmResult as Result};
pub use messages::{
    ChatRequest, ChatResponse, ContentPart, FinishReason, ImageDetail, ImageSource, Message, ResponseFragment, Role,
};
pub use search::{Document, Searcher};
pub use selector::{Selection, Selector};
pub use stream::FragmentStream;
pub use upload::Uploader;
