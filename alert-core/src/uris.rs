pub const DEFAULT_API_ROOT: &str = "https://api.openweathermap.org/data/3.0";

/// URI templates for the trigger resources, rooted at an API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uris {
    root: String,
}

impl Uris {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn triggers(&self) -> String {
        format!("{}/triggers", self.root)
    }

    /// `id` is inserted verbatim; the client only passes ids made of `[A-Za-z0-9_-]`.
    pub fn named_trigger(&self, id: &str) -> String {
        format!("{}/triggers/{id}", self.root)
    }
}

impl Default for Uris {
    fn default() -> Self {
        Self::new(DEFAULT_API_ROOT)
    }
}
