//! Static Qase tool catalog.
//!
//! Tools are grouped the way the Qase API groups its resources:
//! - Projects: project listing, lookup and creation
//! - Cases: test cases, suites, shared steps and shared parameters
//! - Fields: custom and system fields
//! - Execution: plans, runs and results
//! - Tracking: defects, environments, milestones, people, search, attachments

mod cases;
mod execution;
mod fields;
mod projects;
mod tracking;

pub use cases::cases_tools;
pub use execution::execution_tools;
pub use fields::fields_tools;
pub use projects::projects_tools;
pub use tracking::tracking_tools;

use super::schema::{ArgSpec, ArgType};
use super::ToolDescriptor;

/// Which cache entries a mutating tool makes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Only the entry for the invocation's `project_code`.
    Project,
    /// Every entry of the endpoint, across projects.
    Endpoint,
}

/// One row of the invalidation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    /// Mutating tool.
    pub tool: &'static str,
    /// Cache endpoint it affects.
    pub endpoint: &'static str,
    /// Affected entries.
    pub scope: InvalidationScope,
}

/// Mutating tool to stale cache entries.
pub const INVALIDATIONS: &[Invalidation] = &[
    Invalidation {
        tool: "qase_create_project",
        endpoint: "project",
        scope: InvalidationScope::Endpoint,
    },
    Invalidation {
        tool: "qase_create_custom_field",
        endpoint: "custom_field",
        scope: InvalidationScope::Project,
    },
    Invalidation {
        tool: "qase_update_custom_field",
        endpoint: "custom_field",
        scope: InvalidationScope::Project,
    },
    Invalidation {
        tool: "qase_delete_custom_field",
        endpoint: "custom_field",
        scope: InvalidationScope::Project,
    },
];

/// Invalidation rows for a tool.
pub fn invalidations_for(tool: &str) -> impl Iterator<Item = &'static Invalidation> + '_ {
    INVALIDATIONS.iter().filter(move |row| row.tool == tool)
}

/// Every tool in catalog order.
pub fn all_tools() -> Vec<ToolDescriptor> {
    let mut tools = Vec::new();
    tools.extend(projects_tools());
    tools.extend(cases_tools());
    tools.extend(fields_tools());
    tools.extend(execution_tools());
    tools.extend(tracking_tools());
    tools
}

/// Category label derived from the first literal path segment.
pub fn category_of(path_template: &str) -> &str {
    path_template
        .split('/')
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .unwrap_or("general")
}

pub(crate) const SEVERITY_FILTER: &[&str] =
    &["undefined", "blocker", "critical", "major", "normal", "minor", "trivial"];
pub(crate) const PRIORITY_FILTER: &[&str] = &["undefined", "high", "medium", "low"];
pub(crate) const AUTOMATION: &[&str] = &["is-not-automated", "to-be-automated", "automated"];
pub(crate) const RESULT_STATUS: &[&str] = &["passed", "failed", "blocked", "skipped", "invalid"];

pub(crate) fn project_code() -> ArgSpec {
    ArgSpec::path(
        "project_code",
        "code",
        ArgType::String,
        "Code of the project (e.g., \"DEMO\")",
    )
    .non_empty()
}

pub(crate) fn entity_id(name: &'static str, description: &'static str) -> ArgSpec {
    ArgSpec::path(name, "id", ArgType::Integer, description).range(1, i64::MAX)
}

pub(crate) fn entity_hash(name: &'static str, description: &'static str) -> ArgSpec {
    ArgSpec::path(name, "hash", ArgType::String, description).non_empty()
}

pub(crate) fn title() -> ArgSpec {
    ArgSpec::body("title", ArgType::String, "Title").required().non_empty()
}
