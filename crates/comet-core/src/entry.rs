//! The result entry exchanged between providers, the router and the front end.

use serde::Serialize;

/// One user-facing suggestion.
///
/// Every field is plain UTF-8; an empty string means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Display title
    pub name: String,
    /// Subtitle / description
    pub comment: String,
    /// Icon name or absolute image path
    pub icon: String,
    /// Opaque action string run on selection
    pub command: String,
    /// Tag such as "app", "bin", "help", "plugin"
    pub category: String,
    /// Absolute path to an image for the preview pane
    pub preview_image_path: String,
    /// Higher is better
    pub rank_score: i64,
}

impl Entry {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_preview(mut self, path: impl Into<String>) -> Self {
        self.preview_image_path = path.into();
        self
    }

    pub fn with_rank(mut self, rank_score: i64) -> Self {
        self.rank_score = rank_score;
        self
    }

    /// Case-insensitive substring match on name or comment.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle) || self.comment.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let entry = Entry::new("Firefox", "firefox")
            .with_comment("Web Browser")
            .with_icon("firefox")
            .with_category("app")
            .with_rank(4);
        assert_eq!(entry.name, "Firefox");
        assert_eq!(entry.command, "firefox");
        assert_eq!(entry.category, "app");
        assert_eq!(entry.preview_image_path, "");
        assert_eq!(entry.rank_score, 4);
    }

    #[test]
    fn test_mentions_is_case_insensitive() {
        let entry = Entry::new("Calculator", "").with_comment("Evaluate MATH");
        assert!(entry.mentions("calc"));
        assert!(entry.mentions("math"));
        assert!(!entry.mentions("web"));
    }
}
