//! Accept-Language parsing for the multilingual greeting and kickoff hint.

/// Extracts the primary language code from an `Accept-Language` header or a
/// client locale hint: `ko-KR,ko;q=0.9` → `ko`.
pub fn parse_language(raw: Option<&str>, default_lang: &str) -> String {
    let Some(raw) = raw else {
        return default_lang.to_string();
    };
    raw.split(',')
        .next()
        .and_then(|first| first.split(';').next())
        .and_then(|first| first.split('-').next())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(default_lang)
        .to_string()
}
