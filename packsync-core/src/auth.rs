/// Auth value written to a fresh local config: read the token from the
/// `PACK_SYNC_TOKEN` environment variable.
pub const DEFAULT_AUTH: &str = "%PACK_SYNC_TOKEN%";

/// Resolves a configured auth value against the process environment.
pub fn resolve_token(value: &str) -> Option<String> {
    resolve_token_with(value, |name| std::env::var(name).ok())
}

/// `%NAME%` is looked up through `lookup`; anything else is used verbatim.
/// An empty result means "send no Authorization header".
pub fn resolve_token_with<F>(value: &str, lookup: F) -> Option<String>
where
    F: FnOnce(&str) -> Option<String>,
{
    let value = value.trim();
    let token = match value
        .strip_prefix('%')
        .and_then(|rest| rest.strip_suffix('%'))
    {
        Some(name) if !name.is_empty() => lookup(name).unwrap_or_default(),
        _ => value.to_string(),
    };
    let token = token.trim().to_string();
    (!token.is_empty()).then_some(token)
}
