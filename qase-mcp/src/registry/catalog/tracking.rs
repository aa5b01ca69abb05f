//! Tracking tools: defects, environments, milestones, people, search and attachments.

use super::{entity_hash, entity_id, project_code, title};
use crate::registry::schema::{ArgLocation, ArgSpec, ArgType};
use crate::registry::{ResultShape, ToolDescriptor};

fn defect_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get("qase_list_defects", "List defects in a project", "/defect/{code}")
            .arg(project_code())
            .arg(
                ArgSpec::filter("status", "status", ArgType::String, "Defect status")
                    .one_of(&["open", "resolved", "in_progress", "invalid"]),
            )
            .list(),
        ToolDescriptor::get("qase_get_defect", "Get a defect", "/defect/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("defect_id", "Defect ID")),
        ToolDescriptor::post("qase_create_defect", "Create a defect", "/defect/{code}")
            .arg(project_code())
            .arg(title())
            .arg(
                ArgSpec::body("actual_result", ArgType::String, "What actually happened")
                    .required()
                    .non_empty(),
            )
            .arg(
                ArgSpec::body(
                    "severity",
                    ArgType::Integer,
                    "1=blocker, 2=critical, 3=major, 4=normal, 5=minor, 6=trivial",
                )
                .range(1, 6),
            )
            .arg(ArgSpec::body("member_id", ArgType::Integer, "Assignee member ID"))
            .arg(ArgSpec::body("milestone_id", ArgType::Integer, "Milestone ID"))
            .arg(ArgSpec::body("attachments", ArgType::StringList, "Attachment hashes")),
        ToolDescriptor::patch(
            "qase_resolve_defect",
            "Mark a defect as resolved",
            "/defect/{code}/{id}/resolve",
        )
        .arg(project_code())
        .arg(entity_id("defect_id", "Defect ID")),
        ToolDescriptor::delete("qase_delete_defect", "Delete a defect", "/defect/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("defect_id", "Defect ID")),
    ]
}

fn environment_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_environments",
            "List environments in a project",
            "/environment/{code}",
        )
        .arg(project_code())
        .list(),
        ToolDescriptor::get(
            "qase_get_environment",
            "Get an environment",
            "/environment/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("environment_id", "Environment ID")),
        ToolDescriptor::post(
            "qase_create_environment",
            "Create an environment",
            "/environment/{code}",
        )
        .arg(project_code())
        .arg(title())
        .arg(ArgSpec::body("description", ArgType::String, "Description"))
        .arg(ArgSpec::body("slug", ArgType::String, "Short identifier"))
        .arg(ArgSpec::body("host", ArgType::String, "Host URL")),
        ToolDescriptor::delete(
            "qase_delete_environment",
            "Delete an environment",
            "/environment/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("environment_id", "Environment ID")),
    ]
}

fn milestone_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_milestones",
            "List milestones in a project",
            "/milestone/{code}",
        )
        .arg(project_code())
        .list(),
        ToolDescriptor::get("qase_get_milestone", "Get a milestone", "/milestone/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("milestone_id", "Milestone ID")),
        ToolDescriptor::post("qase_create_milestone", "Create a milestone", "/milestone/{code}")
            .arg(project_code())
            .arg(title())
            .arg(ArgSpec::body("description", ArgType::String, "Description"))
            .arg(
                ArgSpec::body("status", ArgType::String, "Milestone status")
                    .one_of(&["active", "completed"]),
            )
            .arg(ArgSpec::body("due_date", ArgType::String, "Due date (YYYY-MM-DD)")),
        ToolDescriptor::delete(
            "qase_delete_milestone",
            "Delete a milestone",
            "/milestone/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("milestone_id", "Milestone ID")),
    ]
}

fn people_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get("qase_list_authors", "List authors in a project", "/author/{code}")
            .arg(project_code())
            .list(),
        ToolDescriptor::get("qase_list_users", "List users of the workspace", "/user").list(),
        ToolDescriptor::get("qase_get_user", "Get a user", "/user/{id}")
            .arg(entity_id("user_id", "User ID")),
    ]
}

fn attachment_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_attachments",
            "List attachments in a project",
            "/attachment/{code}",
        )
        .arg(project_code())
        .list(),
        ToolDescriptor::get(
            "qase_get_attachment",
            "Get attachment metadata, including its download URL",
            "/attachment/{code}/{hash}",
        )
        .arg(project_code())
        .arg(entity_hash("attachment_hash", "Attachment hash")),
        ToolDescriptor::post(
            "qase_upload_attachment",
            "Upload a file and get back its attachment hash",
            "/attachment/{code}",
        )
        .arg(project_code())
        .arg(
            ArgSpec::at("file_name", ArgType::String, ArgLocation::FileName, "File name")
                .required()
                .non_empty(),
        )
        .arg(
            ArgSpec::at(
                "content_base64",
                ArgType::Base64,
                ArgLocation::FileContent,
                "File content, base64-encoded",
            )
            .required(),
        )
        .arg(ArgSpec::at(
            "mime_type",
            ArgType::String,
            ArgLocation::FileMime,
            "MIME type (default: application/octet-stream)",
        ))
        .shape(ResultShape::Object),
        ToolDescriptor::delete(
            "qase_delete_attachment",
            "Delete an attachment",
            "/attachment/{code}/{hash}",
        )
        .arg(project_code())
        .arg(entity_hash("attachment_hash", "Attachment hash")),
    ]
}

/// Tracking tools.
pub fn tracking_tools() -> Vec<ToolDescriptor> {
    let mut tools = defect_tools();
    tools.extend(environment_tools());
    tools.extend(milestone_tools());
    tools.extend(people_tools());
    tools.push(
        ToolDescriptor::get(
            "qase_search",
            "Search entities with Qase Query Language (QQL)",
            "/search/{code}",
        )
        .arg(project_code())
        .arg(
            ArgSpec::query(
                "query",
                ArgType::String,
                "QQL query (e.g., \"priority = high AND automation = automated\")",
            )
            .required()
            .non_empty(),
        )
        .list(),
    );
    tools.extend(attachment_tools());
    tools
}
