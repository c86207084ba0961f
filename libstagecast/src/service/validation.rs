//! Content validation
//!
//! Validates per-platform content before an item is created or edited:
//! empty content, overall size, and platform character limits.

use crate::types::Platform;

/// Maximum content size in bytes (100KB)
const MAX_CONTENT_LENGTH: usize = 100 * 1024;

const MASTODON_CHAR_LIMIT: usize = 500;
const BLUESKY_CHAR_LIMIT: usize = 300;

/// Validates content against platform requirements
#[derive(Clone, Default)]
pub struct ValidationService;

/// Validation result for a single platform target
#[derive(Debug, Clone)]
pub struct TargetValidation {
    pub platform: Platform,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationService {
    pub fn new() -> Self {
        Self
    }

    fn character_limit(platform: Platform) -> usize {
        match platform {
            Platform::Mastodon => MASTODON_CHAR_LIMIT,
            Platform::Bluesky => BLUESKY_CHAR_LIMIT,
        }
    }

    /// Validate one target's content
    pub fn validate_target(&self, platform: Platform, content: &str) -> TargetValidation {
        let mut errors = Vec::new();

        if content.trim().is_empty() {
            errors.push("Content cannot be empty".to_string());
        }

        if content.len() > MAX_CONTENT_LENGTH {
            errors.push(format!(
                "Content exceeds maximum size of {} bytes",
                MAX_CONTENT_LENGTH
            ));
        }

        let char_count = content.chars().count();
        let limit = Self::character_limit(platform);
        if char_count > limit {
            errors.push(format!(
                "Content exceeds {} character limit of {} ({} characters)",
                platform, limit, char_count
            ));
        }

        TargetValidation {
            platform,
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_content() {
        let service = ValidationService::new();
        let result = service.validate_target(Platform::Mastodon, "A perfectly fine post");
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_empty_content_rejected() {
        let service = ValidationService::new();
        assert!(!service.validate_target(Platform::Mastodon, "").valid);
        assert!(!service.validate_target(Platform::Mastodon, "   \n").valid);
    }

    #[test]
    fn test_mastodon_character_limit() {
        let service = ValidationService::new();
        assert!(service.validate_target(Platform::Mastodon, &"a".repeat(500)).valid);
        let result = service.validate_target(Platform::Mastodon, &"a".repeat(501));
        assert!(!result.valid);
        assert!(result.errors[0].contains("character limit"));
    }

    #[test]
    fn test_bluesky_character_limit() {
        let service = ValidationService::new();
        assert!(service.validate_target(Platform::Bluesky, &"a".repeat(300)).valid);
        assert!(!service.validate_target(Platform::Bluesky, &"a".repeat(301)).valid);
    }

    #[test]
    fn test_multibyte_counts_characters_not_bytes() {
        let service = ValidationService::new();
        // 300 three-byte characters: over the byte length of 300 but
        // within the character limit
        let content = "日".repeat(300);
        assert!(service.validate_target(Platform::Bluesky, &content).valid);
    }
}
