//! Project tools.

use super::{project_code, title};
use crate::registry::schema::{ArgSpec, ArgType};
use crate::registry::ToolDescriptor;

/// Project tools.
pub fn projects_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_projects",
            "List all projects available to the API token",
            "/project",
        )
        .list(),
        ToolDescriptor::get(
            "qase_get_project",
            "Get a project by code, including its counters and settings",
            "/project/{code}",
        )
        .arg(project_code())
        .reference("project"),
        ToolDescriptor::post("qase_create_project", "Create a new project", "/project")
            .arg(title())
            .arg(
                ArgSpec::body(
                    "code",
                    ArgType::String,
                    "Unique project code (2-10 latin letters and digits)",
                )
                .required()
                .non_empty(),
            )
            .arg(ArgSpec::body("description", ArgType::String, "Project description"))
            .arg(
                ArgSpec::body("access", ArgType::String, "Who can access the project")
                    .one_of(&["all", "group", "none"]),
            )
            .arg(ArgSpec::body(
                "group",
                ArgType::String,
                "Team group hash, required when access is \"group\"",
            )),
    ]
}
