pub(crate) fn default_user_agent() -> String {
    format!("flickr-upload/{}", env!("CARGO_PKG_VERSION"))
}

/// Look up a key in a flat parameter list.
pub(crate) fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
