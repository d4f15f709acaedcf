/// Represents the identified caller and their group membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// The client identifier (e.g., user ID, API key ID)
    pub client_id: String,
    /// The group the client belongs to (e.g., "free", "pro", "enterprise")
    pub group: Option<String>,
}

impl ClientIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}
