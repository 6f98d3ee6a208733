use serde_json::{json, Map, Value};

use crate::formatter::Diagnostics;
use crate::record::{FieldValue, Fields, Frame};
use crate::request::{HttpRequest, RpcContext, AUTHOR_ID_KEY, AUTHOR_NAME_KEY, CORRELATION_ID_KEY};

/// Field carrying the full gRPC method name of the current call.
pub const GRPC_METHOD_KEY: &str = "grpc.method";

/// Output keys written by the formatter itself.
pub const RESERVED_KEYS: [&str; 3] = ["time", "message", "severity"];

/// Field bag after every value was resolved to JSON.
#[derive(Debug, Default)]
pub struct Normalized {
    pub fields: Map<String, Value>,
    /// Request the entry is about, emitted under `httpRequest`.
    pub http_request: Option<HttpRequest>,
}

/// Resolve every field of an entry to its JSON form.
///
/// Errors become their message. Requests are withheld from the bag and
/// captured as the entry's request; with several candidates the last key in
/// bag order wins. RPC contexts are withheld as well and contribute caller
/// identity, correlation id and tags, which take precedence over plain
/// fields of the same name. A non-string `grpc.method` is used as the
/// request URL in its JSON text form (`5` becomes `"5"`).
pub fn normalize(fields: &Fields, diagnostics: &Diagnostics) -> Normalized {
    let mut out = Normalized::default();
    let mut contexts: Vec<&RpcContext> = Vec::new();

    for (key, value) in fields {
        match value {
            FieldValue::Plain(v) => {
                out.fields.insert(key.clone(), v.clone());
            }
            FieldValue::Error(err) => {
                out.fields.insert(key.clone(), Value::String(err.to_string()));
            }
            FieldValue::Request(req) => {
                out.http_request = Some(HttpRequest::from_request(req));
            }
            FieldValue::HttpRequest(req) => {
                out.http_request = Some(req.clone());
            }
            FieldValue::Rpc(ctx) => contexts.push(ctx),
            FieldValue::Frame(frame) => {
                out.fields.insert(key.clone(), frame_value(frame));
            }
        }
    }

    for ctx in contexts {
        apply_context(ctx, &mut out.fields, diagnostics);
    }

    if out.http_request.is_none() {
        if let Some(method) = out.fields.get(GRPC_METHOD_KEY) {
            out.http_request = Some(HttpRequest::rpc(plain_string(method)));
        }
    }

    out
}

fn apply_context(ctx: &RpcContext, fields: &mut Map<String, Value>, diagnostics: &Diagnostics) {
    if ctx.metadata().is_none() {
        diagnostics.metadata_missing();
    } else {
        let projections = [
            (AUTHOR_ID_KEY, "userId"),
            (AUTHOR_NAME_KEY, "user"),
            (CORRELATION_ID_KEY, "correlationId"),
        ];
        for (from, to) in projections {
            if let Some(value) = ctx.first(from) {
                fields.insert(to.to_string(), Value::String(value.to_string()));
            }
        }
    }

    for (key, value) in ctx.tags() {
        fields.insert(key.clone(), Value::String(plain_string(value)));
    }
}

/// Copy user fields that collide with [`RESERVED_KEYS`] to `fields.<key>`.
pub fn prefix_field_clashes(fields: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        if let Some(value) = fields.get(key).cloned() {
            fields.insert(format!("fields.{}", key), value);
        }
    }
}

/// Text of a value: strings as is, everything else as JSON.
pub(crate) fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn frame_value(frame: &Frame) -> Value {
    json!({
        "file": frame.file,
        "function": frame.function,
        "line": frame.line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use std::io;

    fn bag(pairs: Vec<(&str, FieldValue)>) -> Fields {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn errors_become_messages() {
        let fields = bag(vec![
            ("omg", FieldValue::error(io::Error::new(io::ErrorKind::Other, "wild walrus"))),
        ]);
        let out = normalize(&fields, &Diagnostics::default());
        assert_eq!(out.fields["omg"], "wild walrus");
    }

    #[test]
    fn request_is_withheld_from_the_bag() {
        let req = http::Request::builder()
            .method("DELETE")
            .uri("/things/1")
            .body(())
            .unwrap();
        let fields = bag(vec![("req", FieldValue::request(&req)), ("kept", "yes".into())]);
        let out = normalize(&fields, &Diagnostics::default());

        assert!(!out.fields.contains_key("req"));
        assert_eq!(out.fields["kept"], "yes");
        let captured = out.http_request.unwrap();
        assert_eq!(captured.request_method, "DELETE");
        assert_eq!(captured.request_url, "/things/1");
    }

    #[test]
    fn last_request_in_key_order_wins() {
        let fields = bag(vec![
            ("b", HttpRequest::rpc("/second").into()),
            ("a", HttpRequest::rpc("/first").into()),
        ]);
        let out = normalize(&fields, &Diagnostics::default());
        assert_eq!(out.http_request.unwrap().request_url, "/second");
    }

    #[test]
    fn context_metadata_and_tags_are_extracted() {
        let ctx = RpcContext::incoming([
            ("author_id", "42"),
            ("author_name", "ada"),
            ("correlation_id", "c-1"),
        ])
        .with_tag("peer.port", 5051);
        let fields = bag(vec![("whatever", ctx.into()), ("user", "someone-else".into())]);
        let out = normalize(&fields, &Diagnostics::default());

        assert!(!out.fields.contains_key("whatever"));
        assert_eq!(out.fields["userId"], "42");
        assert_eq!(out.fields["user"], "ada");
        assert_eq!(out.fields["correlationId"], "c-1");
        assert_eq!(out.fields["peer.port"], "5051");
    }

    #[test]
    fn missing_metadata_is_counted_once() {
        let diagnostics = Diagnostics::default();
        let fields = bag(vec![("ctx", RpcContext::new().with_tag("k", "v").into())]);
        let out = normalize(&fields, &diagnostics);

        assert_eq!(diagnostics.metadata_misses(), 1);
        assert!(!out.fields.contains_key("userId"));
        assert_eq!(out.fields["k"], "v");
    }

    #[test]
    fn grpc_method_is_a_fallback_request() {
        let fields = bag(vec![(GRPC_METHOD_KEY, "/pkg.Service/Method".into())]);
        let out = normalize(&fields, &Diagnostics::default());
        assert_eq!(out.http_request, Some(HttpRequest::rpc("/pkg.Service/Method")));
        assert_eq!(out.fields[GRPC_METHOD_KEY], "/pkg.Service/Method");

        let explicit = HttpRequest {
            request_method: "GET".into(),
            request_url: "/health".into(),
            ..Default::default()
        };
        let fields = bag(vec![
            (GRPC_METHOD_KEY, "/pkg.Service/Method".into()),
            ("req", explicit.clone().into()),
        ]);
        let out = normalize(&fields, &Diagnostics::default());
        assert_eq!(out.http_request, Some(explicit));
    }

    #[test]
    fn non_string_grpc_method_uses_json_text() {
        let fields = bag(vec![(GRPC_METHOD_KEY, 5.into())]);
        let out = normalize(&fields, &Diagnostics::default());
        assert_eq!(out.http_request.unwrap().request_url, "5");
    }

    #[test]
    fn clashing_fields_are_prefixed() {
        let mut fields = Map::new();
        fields.insert("time".into(), "right now!".into());
        fields.insert("severity".into(), "meh".into());
        fields.insert("other".into(), 1.into());
        prefix_field_clashes(&mut fields);

        assert_eq!(fields["fields.time"], "right now!");
        assert_eq!(fields["fields.severity"], "meh");
        assert!(!fields.contains_key("fields.message"));
        assert!(!fields.contains_key("fields.other"));
    }
}
