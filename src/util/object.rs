pub const SEPARATOR: char = '/';
pub const URI_SCHEME: &str = "s3://";

/// Everything after the last separator. Empty for directory marker keys
/// such as `"photos/2024/"`.
pub fn basename(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(pos) => &key[pos + 1..],
        None => key,
    }
}

/// Splits `s3://bucket/key` (scheme optional) into bucket and key.
pub fn parse_object_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix(URI_SCHEME).unwrap_or(uri);
    match rest.split_once(SEPARATOR) {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Some((bucket, key)),
        _ => None,
    }
}
