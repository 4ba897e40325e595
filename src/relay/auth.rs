use async_trait::async_trait;
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::future::Future;

/// Cookies sent with the upgrade request; the credential handed to an
/// [`Authenticator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for pair in value.split(';') {
                if let Some((name, val)) = pair.split_once('=') {
                    let name = name.trim();
                    if !name.is_empty() {
                        cookies.insert(name.to_string(), val.trim().to_string());
                    }
                }
            }
        }
        Self(cookies)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolves a connection's cookies to a user identity, or `None` to deny.
///
/// Called at most once per connection, while the connection is opening.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, cookies: &Cookies) -> Option<String>;
}

#[async_trait]
impl<F, Fut> Authenticator for F
where
    F: Fn(Cookies) -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    async fn authenticate(&self, cookies: &Cookies) -> Option<String> {
        (self)(cookies.clone()).await
    }
}
