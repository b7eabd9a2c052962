//! Request descriptors and credentials
//!
//! The engine never signs anything itself. A caller-supplied factory builds a
//! fresh descriptor (with any signed headers) for every connection attempt.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default time allowed to establish a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces a fresh request for each connection attempt
pub type RequestFactory = Arc<dyn Fn() -> RequestDescriptor + Send + Sync>;

/// HTTP method of a streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    /// Query parameters are sent as a form-encoded body
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Kind of access a stream requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    /// Application-only access (bearer token or consumer pair)
    App,
    /// Access on behalf of a user (consumer pair plus user access token pair)
    #[default]
    User,
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrantType::App => write!(f, "application"),
            GrantType::User => write!(f, "user"),
        }
    }
}

/// Credentials attached to a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
    pub bearer_token: Option<String>,
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Credentials {
    /// Application-only credentials from a bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Full user credentials
    pub fn user(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: Some(consumer_key.into()),
            consumer_secret: Some(consumer_secret.into()),
            access_token: Some(access_token.into()),
            access_token_secret: Some(access_token_secret.into()),
            bearer_token: None,
        }
    }

    fn has_consumer_pair(&self) -> bool {
        is_set(&self.consumer_key) && is_set(&self.consumer_secret)
    }

    /// Whether these credentials are set up for the given kind of access
    pub fn grants(&self, grant: GrantType) -> bool {
        match grant {
            GrantType::App => is_set(&self.bearer_token) || self.has_consumer_pair(),
            GrantType::User => {
                self.has_consumer_pair()
                    && is_set(&self.access_token)
                    && is_set(&self.access_token_secret)
            }
        }
    }
}

/// Immutable description of one streaming request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Target URL, query parameters included
    pub url: Url,
    pub method: HttpMethod,
    /// Extra headers, already signed by the caller
    pub headers: Vec<(String, String)>,
    pub credentials: Option<Arc<Credentials>>,
    /// Time allowed to establish the connection; the body itself is unbounded
    pub connect_timeout: Duration,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            url,
            method,
            headers: Vec::new(),
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL without its query string
    pub fn endpoint(&self) -> Url {
        let mut endpoint = self.url.clone();
        endpoint.set_query(None);
        endpoint
    }

    /// Raw query string, empty when there is none
    pub fn query(&self) -> &str {
        self.url.query().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grants() {
        let user = Credentials::user("ck", "cs", "at", "ats");
        assert!(user.grants(GrantType::User));
        assert!(user.grants(GrantType::App));

        let bearer = Credentials::bearer("token");
        assert!(bearer.grants(GrantType::App));
        assert!(!bearer.grants(GrantType::User));

        let partial = Credentials {
            consumer_key: Some("ck".to_string()),
            consumer_secret: Some("cs".to_string()),
            access_token: Some("at".to_string()),
            access_token_secret: Some("  ".to_string()),
            bearer_token: None,
        };
        assert!(partial.grants(GrantType::App));
        assert!(!partial.grants(GrantType::User));

        assert!(!Credentials::default().grants(GrantType::App));
    }

    #[test]
    fn test_endpoint_and_query() {
        let url = Url::parse("https://stream.example.com/1.1/filter.json?track=rust&lang=en")
            .unwrap();
        let request = RequestDescriptor::post(url);
        assert_eq!(
            request.endpoint().as_str(),
            "https://stream.example.com/1.1/filter.json"
        );
        assert_eq!(request.query(), "track=rust&lang=en");

        let bare = RequestDescriptor::get(Url::parse("https://example.com/stream").unwrap());
        assert_eq!(bare.query(), "");
    }

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
