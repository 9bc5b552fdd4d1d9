/// Default base URL for assistant service requests.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL to a versioned REST root.
///
/// Normalization rules:
/// 1) empty input falls back to [`DEFAULT_BASE_URL`]
/// 2) trailing slashes are removed
/// 3) `/v1` is appended when the last path segment is not a version (`v<digits>`)
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    let last_segment = trimmed.rsplit('/').next().unwrap_or_default();
    if is_version_segment(last_segment) {
        return trimmed.to_string();
    }
    format!("{trimmed}/v1")
}

/// Join a normalized base URL and a relative endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        path.trim_start_matches('/')
    )
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}
