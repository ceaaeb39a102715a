//! Route-to-MCP-type mapping hook (§4.13): an optional rule list a
//! caller can supply to divert specific routes away from the default
//! "every route is a tool" projection.

use regex::Regex;

use mcpmesh_core::route::HttpMethod;

use crate::error::Result;

/// What a route should project to. Unlike the OpenAPI-to-MCP mapper this
/// is grounded on, the default here is always [`McpKind::Tool`] — the
/// core spec has no resource projection of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum McpKind {
    #[default]
    Tool,
    Resource,
    Skip,
}

struct Rule {
    methods: Vec<HttpMethod>,
    pattern: Option<Regex>,
    kind: McpKind,
    priority: i32,
}

impl Rule {
    fn matches(&self, method: HttpMethod, path: &str) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(&method) {
            return false;
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(path) {
                return false;
            }
        }
        true
    }
}

/// Ordered rule list consulted before the default projection applies.
#[derive(Default)]
pub struct RouteMapping {
    rules: Vec<Rule>,
}

impl RouteMapping {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn map_methods(mut self, methods: &[HttpMethod], kind: McpKind) -> Self {
        self.rules.push(Rule {
            methods: methods.to_vec(),
            pattern: None,
            kind,
            priority: 0,
        });
        self
    }

    pub fn map_pattern(mut self, pattern: &str, kind: McpKind) -> Result<Self> {
        self.rules.push(Rule {
            methods: Vec::new(),
            pattern: Some(Regex::new(pattern)?),
            kind,
            priority: 0,
        });
        Ok(self)
    }

    pub fn map_rule(
        mut self,
        methods: &[HttpMethod],
        pattern: &str,
        kind: McpKind,
        priority: i32,
    ) -> Result<Self> {
        self.rules.push(Rule {
            methods: methods.to_vec(),
            pattern: Some(Regex::new(pattern)?),
            kind,
            priority,
        });
        Ok(self)
    }

    pub fn skip_pattern(self, pattern: &str) -> Result<Self> {
        self.map_pattern(pattern, McpKind::Skip)
    }

    /// Highest-priority matching rule wins; insertion order breaks ties.
    /// No rule matching falls back to the unconditional default: every
    /// route is a tool.
    pub fn kind_for(&self, method: HttpMethod, path: &str) -> McpKind {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        for rule in ordered {
            if rule.matches(method, path) {
                return rule.kind;
            }
        }
        McpKind::Tool
    }
}
