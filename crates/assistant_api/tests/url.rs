use assistant_api::url::{endpoint, normalize_base_url, DEFAULT_BASE_URL};

#[test]
fn empty_base_url_falls_back_to_default() {
    assert_eq!(normalize_base_url(""), DEFAULT_BASE_URL);
    assert_eq!(normalize_base_url("   "), DEFAULT_BASE_URL);
}

#[test]
fn versioned_base_url_is_kept() {
    assert_eq!(
        normalize_base_url("https://api.openai.com/v1/"),
        "https://api.openai.com/v1"
    );
    assert_eq!(
        normalize_base_url("https://gateway.internal/openai/v2"),
        "https://gateway.internal/openai/v2"
    );
}

#[test]
fn unversioned_base_url_gets_v1() {
    assert_eq!(
        normalize_base_url("http://127.0.0.1:8080"),
        "http://127.0.0.1:8080/v1"
    );
    assert_eq!(
        normalize_base_url("https://proxy.example.com/vault/"),
        "https://proxy.example.com/vault/v1"
    );
}

#[test]
fn endpoint_joins_relative_paths() {
    assert_eq!(
        endpoint("http://127.0.0.1:8080", "/threads/t1/runs"),
        "http://127.0.0.1:8080/v1/threads/t1/runs"
    );
}
