//! Observability module for correlation and tracing

use uuid::Uuid;

/// Correlation ID for tracking requests across components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trace context carried by a bundle submission
///
/// One root per orchestrator run; each submission gets a child span so a
/// builder-side failure can be matched with the launch that caused it.
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// Shared by the root and all of its children
    pub trace_id: String,

    pub span_id: String,

    pub correlation_id: CorrelationId,

    pub parent_span_id: Option<String>,

    pub operation: String,
}

impl TraceContext {
    /// Create a new root context for an operation
    pub fn new(operation: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: CorrelationId::new(),
            parent_span_id: None,
            operation: operation.to_string(),
        }
    }

    /// Create a child span context
    pub fn child_span(&self, operation: &str) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: self.correlation_id.clone(),
            parent_span_id: Some(self.span_id.clone()),
            operation: operation.to_string(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Parent span id, or an empty string for a root
    pub fn parent(&self) -> &str {
        self.parent_span_id.as_deref().unwrap_or_default()
    }
}
