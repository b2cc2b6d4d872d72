//! Endpoint and header resolution backed by an external API context.

use std::fmt;
use std::sync::{Arc, RwLock};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Path of the Admin GraphQL endpoint on a shop's site.
pub const GRAPHQL_PATH: &str = "/admin/api/graphql.json";

/// Header Shopify reads the Admin API access token from.
pub const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";

/// Source of the site URL and authentication headers.
///
/// Implemented by the host application; the gateway asks on every request so
/// configuration applied after the gateway was built is picked up.
pub trait ApiContext: Send + Sync + fmt::Debug {
    /// Base site URL (e.g. `https://my-shop.myshopify.com`), if configured.
    fn site(&self) -> Option<Url>;

    /// Headers to send with every request.
    fn headers(&self) -> HeaderMap;
}

#[derive(Debug, Default)]
struct ContextState {
    site: Option<Url>,
    headers: HeaderMap,
}

/// In-process [`ApiContext`] that can be reconfigured at any time.
#[derive(Debug, Clone, Default)]
pub struct StaticApiContext {
    state: Arc<RwLock<ContextState>>,
}

impl StaticApiContext {
    /// Create an unconfigured context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context pointing at `site`.
    pub fn with_site(site: &str) -> GatewayResult<Self> {
        let context = Self::new();
        context.configure(site)?;
        Ok(context)
    }

    /// Point the context at a new site.
    pub fn configure(&self, site: &str) -> GatewayResult<()> {
        let url = Url::parse(site).map_err(|err| GatewayError::Configuration {
            message: format!("invalid site URL '{site}': {err}"),
        })?;
        self.write(|state| state.site = Some(url))
    }

    /// Set or replace a header.
    pub fn set_header(&self, name: &str, value: &str) -> GatewayResult<()> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            GatewayError::Configuration {
                message: format!("invalid header name '{name}': {err}"),
            }
        })?;
        let mut value = HeaderValue::from_str(value).map_err(|err| GatewayError::Configuration {
            message: format!("invalid value for header '{name}': {err}"),
        })?;
        value.set_sensitive(name.as_str() == ACCESS_TOKEN_HEADER);
        self.write(|state| {
            state.headers.insert(name, value);
        })
    }

    /// Set the Admin API access token.
    pub fn with_access_token(self, token: &str) -> GatewayResult<Self> {
        self.set_header(ACCESS_TOKEN_HEADER, token)?;
        Ok(self)
    }

    fn write(&self, apply: impl FnOnce(&mut ContextState)) -> GatewayResult<()> {
        let mut state = self.state.write().map_err(|_| GatewayError::Configuration {
            message: "API context lock poisoned".to_string(),
        })?;
        apply(&mut state);
        Ok(())
    }
}

impl ApiContext for StaticApiContext {
    fn site(&self) -> Option<Url> {
        self.state.read().ok().and_then(|state| state.site.clone())
    }

    fn headers(&self) -> HeaderMap {
        self.state
            .read()
            .map(|state| state.headers.clone())
            .unwrap_or_default()
    }
}

/// Resolves the request target and headers. Holds no URL of its own.
#[derive(Debug, Clone)]
pub struct Transport {
    context: Arc<dyn ApiContext>,
}

impl Transport {
    /// Wrap an API context.
    #[must_use]
    pub fn new(context: Arc<dyn ApiContext>) -> Self {
        Self { context }
    }

    /// Current endpoint URL: the context's site with the GraphQL path.
    pub fn endpoint_url(&self) -> GatewayResult<Url> {
        let mut url = self.context.site().ok_or(GatewayError::NotConfigured)?;
        url.set_path(GRAPHQL_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// Current request headers, with a JSON content type.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = self.context.headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_replaces_site_path() {
        let context =
            StaticApiContext::with_site("https://shop.example.com/some/path?x=1").expect("site");
        let transport = Transport::new(Arc::new(context));
        assert_eq!(
            transport.endpoint_url().expect("url").as_str(),
            "https://shop.example.com/admin/api/graphql.json"
        );
    }

    #[test]
    fn endpoint_follows_late_configuration() {
        let context = StaticApiContext::new();
        let transport = Transport::new(Arc::new(context.clone()));
        assert!(matches!(
            transport.endpoint_url(),
            Err(GatewayError::NotConfigured)
        ));

        context.configure("https://first.example.com").expect("site");
        assert_eq!(
            transport.endpoint_url().expect("url").host_str(),
            Some("first.example.com")
        );

        context.configure("https://second.example.com").expect("site");
        assert_eq!(
            transport.endpoint_url().expect("url").host_str(),
            Some("second.example.com")
        );
    }

    #[test]
    fn headers_come_from_context() {
        let context = StaticApiContext::with_site("https://shop.example.com")
            .and_then(|context| context.with_access_token("shpat_123"))
            .expect("context");
        let transport = Transport::new(Arc::new(context.clone()));

        let headers = transport.headers();
        assert_eq!(
            headers.get(ACCESS_TOKEN_HEADER).map(HeaderValue::is_sensitive),
            Some(true)
        );
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );

        context.set_header("X-Request-Source", "worker").expect("header");
        assert!(transport.headers().contains_key("x-request-source"));
    }

    #[test]
    fn rejects_invalid_site() {
        let err = StaticApiContext::with_site("not a url").expect_err("invalid");
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }
}
