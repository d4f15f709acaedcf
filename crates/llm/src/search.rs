use async_trait::async_trait;

use crate::messages::Message;

/// One search hit injected into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub title: String,
    pub content: String,
}

/// Search collaborator used for retrieval augmentation.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Returns at most `count` documents relevant to `query`, in relevance order.
    async fn search(&self, query: &str, history: &[Message], count: usize) -> anyhow::Result<Vec<Document>>;
}
