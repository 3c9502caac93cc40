//! Content validation against platform requirements
//!
//! Validates a composition before posting: empty content, per-platform
//! character limits (counted in characters, not bytes), and image-count
//! caps. The editor-facing effective limit for a multi-platform composition
//! is the minimum limit across the selected platforms, exposed via
//! [`effective_character_limit`](crate::types::effective_character_limit).

use crate::types::Platform;

/// Request to validate content for specific platforms
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub content: String,
    pub platforms: Vec<Platform>,
    pub image_count: usize,
}

/// Response containing validation results
#[derive(Debug, Clone)]
pub struct ValidationResponse {
    /// Whether content is valid for all requested platforms
    pub valid: bool,
    pub results: Vec<PlatformValidation>,
}

/// Validation result for a single platform
#[derive(Debug, Clone)]
pub struct PlatformValidation {
    pub platform: Platform,
    pub valid: bool,
    pub errors: Vec<String>,
    /// Non-blocking advisories
    pub warnings: Vec<String>,
}

/// Validate content for the specified platforms
pub fn validate(request: &ValidationRequest) -> ValidationResponse {
    let mut results = Vec::new();
    let mut all_valid = true;

    for &platform in &request.platforms {
        let validation = validate_for_platform(&request.content, platform, request.image_count);
        if !validation.valid {
            all_valid = false;
        }
        results.push(validation);
    }

    ValidationResponse {
        valid: all_valid,
        results,
    }
}

/// Convenience boolean check across platforms
pub fn is_valid(content: &str, platforms: &[Platform], image_count: usize) -> bool {
    validate(&ValidationRequest {
        content: content.to_string(),
        platforms: platforms.to_vec(),
        image_count,
    })
    .valid
}

fn validate_for_platform(content: &str, platform: Platform, image_count: usize) -> PlatformValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if content.trim().is_empty() {
        errors.push("Content cannot be empty or whitespace-only".to_string());
    }

    let char_count = content.chars().count();
    let limit = platform.character_limit();
    if char_count > limit {
        errors.push(format!(
            "Content length ({} characters) exceeds {} limit of {} characters",
            char_count,
            platform.display_name(),
            limit
        ));
    }

    let max_images = platform.max_images();
    if image_count > max_images {
        if platform == Platform::Threads && image_count >= 1 {
            // Threads takes a single image; extras are dropped, not fatal
            warnings.push(format!(
                "{} supports a single image per post; only the first will be used",
                platform.display_name()
            ));
        } else {
            errors.push(format!(
                "{} supports at most {} image(s) per post (got {})",
                platform.display_name(),
                max_images,
                image_count
            ));
        }
    }

    PlatformValidation {
        platform,
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
