//! Architecture validation: declarative bounded contexts checked against the
//! dependency graph. Rules never mutate the graph; they only report
//! violations with a severity and an optional suggestion.

use crate::config::ARCHITECTURE_FILE;
use crate::error::{IndexError, Result};
use crate::graph::DependencyGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Default identifier pattern for the naming rule: POSIX-ish relative paths,
/// lowercase-ish segments, no spaces.
const DEFAULT_NAMING_PATTERN: &str = r"^[A-Za-z0-9_./-]+$";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A named module group with declared allowed and prohibited outward
/// dependencies. `modules` entries are path fragments; a node belongs to the
/// context when its path contains one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundedContext {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub prohibited_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureModel {
    #[serde(default)]
    pub contexts: Vec<BoundedContext>,
}

impl ArchitectureModel {
    /// Load `architecture.json` from the state directory.
    pub fn load(state_dir: &Path) -> Result<ArchitectureModel> {
        let path = state_dir.join(ARCHITECTURE_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| IndexError::Io { path: path.clone(), source: e })?;
        serde_json::from_str(&raw).map_err(|e| IndexError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Violations and rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleViolation {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Everything a rule may inspect. Read-only by construction.
pub struct ValidationContext<'a> {
    pub graph: &'a DependencyGraph,
    pub model: &'a ArchitectureModel,
}

/// A validation rule. Tagged variants instead of string-dispatched
/// polymorphism; `Custom` carries an arbitrary predicate.
pub enum Rule {
    /// Every dependency cycle is an error. Delegates to graph cycle
    /// detection, plus the model's prohibited-dependency declarations.
    NoCircularDeps,
    /// Node identifiers must match the pattern (warnings otherwise).
    NamingConvention { pattern: Option<String> },
    Custom {
        name: String,
        check: Box<dyn Fn(&ValidationContext) -> Vec<RuleViolation> + Send + Sync>,
    },
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::NoCircularDeps => "no-circular-deps",
            Rule::NamingConvention { .. } => "naming-convention",
            Rule::Custom { name, .. } => name,
        }
    }
}

/// Run every rule plus the model's prohibited-dependency declarations.
pub fn validate(ctx: &ValidationContext, rules: &[Rule]) -> Vec<RuleViolation> {
    let mut violations = Vec::new();
    for rule in rules {
        match rule {
            Rule::NoCircularDeps => check_cycles(ctx, &mut violations),
            Rule::NamingConvention { pattern } => {
                check_naming(ctx, pattern.as_deref(), &mut violations)
            }
            Rule::Custom { check, .. } => violations.extend(check(ctx)),
        }
    }
    check_prohibited(ctx, &mut violations);
    debug!(violations = violations.len(), "architecture validation complete");
    violations
}

fn check_cycles(ctx: &ValidationContext, out: &mut Vec<RuleViolation>) {
    for cycle in ctx.graph.find_cycles() {
        out.push(RuleViolation {
            rule: "no-circular-deps".to_string(),
            severity: Severity::Error,
            message: format!("dependency cycle: {}", cycle.join(" -> ")),
            suggestion: Some("break the cycle by extracting the shared piece".to_string()),
        });
    }
}

fn check_naming(ctx: &ValidationContext, pattern: Option<&str>, out: &mut Vec<RuleViolation>) {
    let pattern = pattern.unwrap_or(DEFAULT_NAMING_PATTERN);
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            out.push(RuleViolation {
                rule: "naming-convention".to_string(),
                severity: Severity::Warning,
                message: format!("unusable naming pattern {pattern:?}: {e}"),
                suggestion: None,
            });
            return;
        }
    };
    for id in ctx.graph.node_ids() {
        if !re.is_match(id) {
            out.push(RuleViolation {
                rule: "naming-convention".to_string(),
                severity: Severity::Warning,
                message: format!("node {id:?} does not match naming pattern"),
                suggestion: Some(format!("rename to match {pattern}")),
            });
        }
    }
}

/// A prohibited dependency from context C to module M fires whenever any
/// node in C's modules has an edge into a node whose path contains M.
fn check_prohibited(ctx: &ValidationContext, out: &mut Vec<RuleViolation>) {
    for context in &ctx.model.contexts {
        for node in ctx.graph.node_ids() {
            if !context.modules.iter().any(|m| node.contains(m.as_str())) {
                continue;
            }
            for edge in ctx.graph.edges_from(node, None) {
                for prohibited in &context.prohibited_dependencies {
                    if edge.to.contains(prohibited.as_str()) {
                        out.push(RuleViolation {
                            rule: "prohibited-dependency".to_string(),
                            severity: Severity::Error,
                            message: format!(
                                "context {:?}: {} -> {} crosses a prohibited boundary ({})",
                                context.name, edge.from, edge.to, prohibited
                            ),
                            suggestion: Some(format!(
                                "route through one of the declared dependencies: {:?}",
                                context.dependencies
                            )),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    fn graph(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (from, to) in edges {
            g.add_node(from);
            g.add_node(to);
        }
        for (from, to) in edges {
            g.add_edge(from, to, EdgeKind::Imports).unwrap();
        }
        g
    }

    fn model(contexts: Vec<BoundedContext>) -> ArchitectureModel {
        ArchitectureModel { contexts }
    }

    fn context(id: &str, modules: &[&str], prohibited: &[&str]) -> BoundedContext {
        BoundedContext {
            id: id.to_string(),
            name: id.to_string(),
            modules: modules.iter().map(|s| s.to_string()).collect(),
            dependencies: vec![],
            prohibited_dependencies: prohibited.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn cycle_rule_reports_each_cycle_once() {
        let g = graph(&[("a.rs", "b.rs"), ("b.rs", "a.rs"), ("c.rs", "a.rs")]);
        let m = model(vec![]);
        let ctx = ValidationContext { graph: &g, model: &m };
        let violations = validate(&ctx, &[Rule::NoCircularDeps]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert!(violations[0].message.contains("a.rs -> b.rs"));
    }

    #[test]
    fn naming_rule_warns_on_offenders_only() {
        let mut g = DependencyGraph::new();
        g.add_node("src/ok.rs");
        g.add_node("src/with space.rs");
        let m = model(vec![]);
        let ctx = ValidationContext { graph: &g, model: &m };
        let violations = validate(&ctx, &[Rule::NamingConvention { pattern: None }]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("with space"));
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn prohibited_dependency_fires_on_boundary_crossings() {
        let g = graph(&[
            ("billing/invoice.rs", "auth/session.rs"),
            ("billing/invoice.rs", "billing/tax.rs"),
        ]);
        let m = model(vec![context("billing", &["billing/"], &["auth/"])]);
        let ctx = ValidationContext { graph: &g, model: &m };
        let violations = validate(&ctx, &[]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("auth/session.rs"));
    }

    #[test]
    fn custom_rules_run_with_read_access() {
        let g = graph(&[("a.rs", "b.rs")]);
        let m = model(vec![]);
        let ctx = ValidationContext { graph: &g, model: &m };
        let rule = Rule::Custom {
            name: "max-two-nodes".to_string(),
            check: Box::new(|ctx| {
                if ctx.graph.node_count() > 2 {
                    vec![RuleViolation {
                        rule: "max-two-nodes".to_string(),
                        severity: Severity::Info,
                        message: "graph grew past two nodes".to_string(),
                        suggestion: None,
                    }]
                } else {
                    vec![]
                }
            }),
        };
        assert!(validate(&ctx, &[rule]).is_empty());
    }

    #[test]
    fn model_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let m = model(vec![context("core", &["core/"], &["ui/"])]);
        std::fs::write(
            dir.path().join(ARCHITECTURE_FILE),
            serde_json::to_string(&m).unwrap(),
        )
        .unwrap();
        let loaded = ArchitectureModel::load(dir.path()).unwrap();
        assert_eq!(loaded.contexts.len(), 1);
        assert_eq!(loaded.contexts[0].id, "core");
        assert_eq!(loaded.contexts[0].prohibited_dependencies, vec!["ui/".to_string()]);
    }
}
