use std::collections::HashSet;
use url::Url;

/// Hostname component of an origin URL, or `""` when it does not parse.
pub fn hostname(origin: &str) -> String {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_default()
}

/// True iff the origin's hostname is in `allow_list`.
pub fn allowed(origin: &str, allow_list: &HashSet<String>) -> bool {
    let host = hostname(origin);
    let allowed = allow_list.contains(&host);
    if !allowed {
        tracing::error!("domain {host:?} not allowed");
    }
    allowed
}
