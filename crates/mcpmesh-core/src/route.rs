//! Route, handler, and invocation types — the core data model (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::schema::SchemaBundle;

/// HTTP verbs a handler file may be named after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Parse a file-stem method token (`get`, `post`, ...), case-insensitively.
    /// Returns `None` for anything else — callers record a loader error.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "patch" => Some(Self::Patch),
            "delete" => Some(Self::Delete),
            "head" => Some(Self::Head),
            "options" => Some(Self::Options),
            _ => None,
        }
    }

    /// Canonical uppercase wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Lowercase wire representation, used when deriving MCP tool names.
    pub fn as_lower(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Head => "head",
            Self::Options => "options",
        }
    }

    /// Whether this method conventionally carries a request body
    /// (used by the OpenAPI synthesizer to decide on `requestBody`).
    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A JSON value in, JSON value (+ status) out request context, the common
/// denominator between the HTTP surface and the synthesized MCP invocation
/// (§4.10 builds exactly this from `tools/call` arguments).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestCtx {
    pub path: HashMap<String, serde_json::Value>,
    pub query: HashMap<String, serde_json::Value>,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// The result of invoking a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCtx {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ResponseCtx {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": true, "message": message.into() }),
        }
    }
}

/// Capability set reported alongside a loaded handler, per §3's
/// `HandlerRef` definition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HandlerCapabilities {
    pub has_process: bool,
    pub is_class: bool,
    pub is_plain_function: bool,
}

/// Object-safe callable contract every handler is normalized to at load
/// time, regardless of which of the three export shapes produced it
/// (§9: "normalized to a single `invoke(ctx) → reply` at load time").
pub trait Handler: Send + Sync {
    fn invoke<'a>(
        &'a self,
        ctx: RequestCtx,
    ) -> Pin<Box<dyn Future<Output = ResponseCtx> + Send + 'a>>;
}

/// Blanket impl so a plain async closure can serve as a `FuncHandler`.
pub struct FnHandler<F>(pub F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RequestCtx) -> Fut + Send + Sync,
    Fut: Future<Output = ResponseCtx> + Send + 'static,
{
    fn invoke<'a>(
        &'a self,
        ctx: RequestCtx,
    ) -> Pin<Box<dyn Future<Output = ResponseCtx> + Send + 'a>> {
        Box::pin((self.0)(ctx))
    }
}

/// The sum type described in the design notes: a handler file's export
/// shape is preserved as a variant, but every variant carries the same
/// normalized `invoke` contract so callers never match on it.
#[derive(Clone)]
pub enum HandlerRef {
    /// An object literal / struct instance with a `process` method.
    ObjectHandler(Arc<dyn Handler>),
    /// A class/struct requiring zero-arg construction before first call;
    /// already instantiated by the time it reaches the registry.
    ClassHandler(Arc<dyn Handler>),
    /// A plain function handler.
    FuncHandler(Arc<dyn Handler>),
}

impl HandlerRef {
    pub fn capabilities(&self) -> HandlerCapabilities {
        match self {
            Self::ObjectHandler(_) => HandlerCapabilities {
                has_process: true,
                is_class: false,
                is_plain_function: false,
            },
            Self::ClassHandler(_) => HandlerCapabilities {
                has_process: true,
                is_class: true,
                is_plain_function: false,
            },
            Self::FuncHandler(_) => HandlerCapabilities {
                has_process: true,
                is_class: false,
                is_plain_function: true,
            },
        }
    }

    pub fn as_handler(&self) -> &Arc<dyn Handler> {
        match self {
            Self::ObjectHandler(h) | Self::ClassHandler(h) | Self::FuncHandler(h) => h,
        }
    }

    pub async fn invoke(&self, ctx: RequestCtx) -> ResponseCtx {
        self.as_handler().invoke(ctx).await
    }
}

impl std::fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::ObjectHandler(_) => "ObjectHandler",
            Self::ClassHandler(_) => "ClassHandler",
            Self::FuncHandler(_) => "FuncHandler",
        };
        write!(f, "HandlerRef::{kind}")
    }
}

/// One live entry in the route registry (§3's `Route` entity).
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    /// `{name}`-form URL template — never the `:name` HTTP-adapter form.
    pub url_template: String,
    pub handler: HandlerRef,
    pub file_path: std::path::PathBuf,
    pub schema: SchemaBundle,
}

impl Route {
    /// Unique key for this route within the registry.
    pub fn key(&self) -> (HttpMethod, String) {
        (self.method, self.url_template.clone())
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("url_template", &self.url_template)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

/// Convert a `[name]`-style (filesystem-safe) path segment placeholder
/// into the canonical `{name}` MCP/OpenAPI form.
pub fn segment_to_template(segment: &str) -> String {
    if let Some(inner) = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    {
        format!("{{{inner}}}")
    } else {
        segment.to_string()
    }
}

/// Render a `{name}`-form template using the `:name` convention some HTTP
/// routers expect.
pub fn template_to_colon_form(url_template: &str) -> String {
    let mut out = String::with_capacity(url_template.len());
    let mut chars = url_template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            out.push(':');
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                out.push(c2);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Extract every `{name}` placeholder from a URL template, in order.
pub fn path_placeholders(url_template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = url_template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                name.push(c2);
            }
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_token_roundtrip() {
        assert_eq!(HttpMethod::from_token("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::from_token("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::from_token("nope"), None);
    }

    #[test]
    fn segment_conversion() {
        assert_eq!(segment_to_template("[id]"), "{id}");
        assert_eq!(segment_to_template("users"), "users");
    }

    #[test]
    fn colon_form_conversion() {
        assert_eq!(template_to_colon_form("/users/{id}"), "/users/:id");
        assert_eq!(template_to_colon_form("/users"), "/users");
    }

    #[test]
    fn placeholder_extraction() {
        assert_eq!(
            path_placeholders("/users/{id}/posts/{postId}"),
            vec!["id".to_string(), "postId".to_string()]
        );
        assert!(path_placeholders("/health").is_empty());
    }

    #[tokio::test]
    async fn fn_handler_invokes() {
        let h = FnHandler(|ctx: RequestCtx| async move {
            ResponseCtx::ok(serde_json::json!({ "echo": ctx.body }))
        });
        let resp = h.invoke(RequestCtx::default()).await;
        assert_eq!(resp.status, 200);
    }
}
