use async_trait::async_trait;

/// Makes inline content fetchable by URL, for backends that only accept remote images.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores `bytes` and returns a public URL. `extension` has no leading dot.
    async fn store(&self, bytes: Vec<u8>, extension: &str) -> anyhow::Result<String>;
}
