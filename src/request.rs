use http::header::{HeaderMap, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Metadata key carrying the authenticated caller id.
pub const AUTHOR_ID_KEY: &str = "author_id";
/// Metadata key carrying the authenticated caller display name.
pub const AUTHOR_NAME_KEY: &str = "author_name";
/// Metadata key carrying the request correlation id.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// HTTP request descriptor in the cloud logging `httpRequest` shape.
///
/// Empty members are left out of the JSON encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub referer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
}

impl HttpRequest {
    /// Project an inbound request into a descriptor.
    ///
    /// The remote address comes from a `SocketAddr` request extension,
    /// falling back to the first hop of `x-forwarded-for`.
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        let headers = req.headers();
        let remote_ip = req
            .extensions()
            .get::<SocketAddr>()
            .map(|addr| addr.to_string())
            .or_else(|| {
                header_str(headers, "x-forwarded-for")
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
            })
            .unwrap_or_default();

        HttpRequest {
            referer: header_str(headers, REFERER.as_str()).unwrap_or_default().to_string(),
            remote_ip,
            request_method: req.method().to_string(),
            request_url: req.uri().to_string(),
            user_agent: header_str(headers, USER_AGENT.as_str()).unwrap_or_default().to_string(),
        }
    }

    /// Descriptor used for RPC calls: a `POST` to the method path.
    pub fn rpc(method: impl Into<String>) -> Self {
        HttpRequest {
            request_method: "POST".to_string(),
            request_url: method.into(),
            ..Default::default()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Incoming RPC metadata: every key maps to one or more values.
pub type Metadata = BTreeMap<String, Vec<String>>;

/// Context of an in-flight RPC call as seen by a log call.
///
/// Holds the incoming metadata, if the transport attached any, and a tag
/// store of annotations scoped to the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcContext {
    metadata: Option<Metadata>,
    tags: BTreeMap<String, serde_json::Value>,
}

impl RpcContext {
    /// A context without incoming metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying the given metadata pairs. Keys are lower-cased,
    /// repeated keys accumulate values in order.
    pub fn incoming<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut metadata = Metadata::new();
        for (key, value) in pairs {
            metadata
                .entry(key.as_ref().to_ascii_lowercase())
                .or_default()
                .push(value.into());
        }
        RpcContext {
            metadata: Some(metadata),
            tags: BTreeMap::new(),
        }
    }

    /// Build the incoming metadata from the HTTP/2 headers of a gRPC call.
    ///
    /// Binary (`-bin`) and non-UTF-8 values are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pairs = headers.iter().filter_map(|(name, value)| {
            if name.as_str().ends_with("-bin") {
                return None;
            }
            value.to_str().ok().map(|v| (name.as_str(), v.to_string()))
        });
        Self::incoming(pairs)
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// First value recorded for `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|md| md.get(key))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn projects_inbound_request() {
        let req = http::Request::builder()
            .method("GET")
            .uri("http://svc.local/orders?id=3")
            .header("referer", "http://svc.local/")
            .header("user-agent", "probe/1.0")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();

        let projected = HttpRequest::from_request(&req);
        assert_eq!(projected.request_method, "GET");
        assert_eq!(projected.request_url, "http://svc.local/orders?id=3");
        assert_eq!(projected.referer, "http://svc.local/");
        assert_eq!(projected.user_agent, "probe/1.0");
        assert_eq!(projected.remote_ip, "203.0.113.7");
    }

    #[test]
    fn empty_members_are_not_serialized() {
        let value = serde_json::to_value(HttpRequest::rpc("/pkg.Service/Call")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"requestMethod": "POST", "requestUrl": "/pkg.Service/Call"})
        );
    }

    #[test]
    fn first_metadata_value_wins() {
        let ctx = RpcContext::incoming([
            ("Author_Id", "first"),
            ("author_id", "second"),
        ]);
        assert_eq!(ctx.first(AUTHOR_ID_KEY), Some("first"));
        assert_eq!(ctx.first(CORRELATION_ID_KEY), None);
    }

    #[test]
    fn metadata_from_grpc_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("author_name", HeaderValue::from_static("ada"));
        headers.insert("trace-bin", HeaderValue::from_static("AAEC"));

        let ctx = RpcContext::from_headers(&headers);
        assert_eq!(ctx.first(AUTHOR_NAME_KEY), Some("ada"));
        assert_eq!(ctx.first("trace-bin"), None);
    }

    #[test]
    fn bare_context_has_no_metadata() {
        let ctx = RpcContext::new().with_tag("peer", "10.1.1.1");
        assert!(ctx.metadata().is_none());
        assert_eq!(ctx.tags()["peer"], "10.1.1.1");
    }
}
