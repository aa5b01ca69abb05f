//! Test design tools: cases, suites, shared steps and shared parameters.

use super::{
    entity_hash, entity_id, project_code, title, AUTOMATION, PRIORITY_FILTER, SEVERITY_FILTER,
};
use crate::registry::schema::{ArgSpec, ArgType};
use crate::registry::ToolDescriptor;

/// Fields shared by test case create and update.
fn case_fields(tool: ToolDescriptor) -> ToolDescriptor {
    tool.arg(ArgSpec::body("description", ArgType::String, "Description"))
        .arg(ArgSpec::body("preconditions", ArgType::String, "Preconditions"))
        .arg(ArgSpec::body("postconditions", ArgType::String, "Postconditions"))
        .arg(
            ArgSpec::body(
                "severity",
                ArgType::Integer,
                "1=blocker, 2=critical, 3=major, 4=normal, 5=minor, 6=trivial",
            )
            .range(1, 6),
        )
        .arg(ArgSpec::body("priority", ArgType::Integer, "1=high, 2=medium, 3=low").range(1, 3))
        .arg(ArgSpec::body("type_id", ArgType::Integer, "Test type ID").field("type"))
        .arg(
            ArgSpec::body(
                "behavior",
                ArgType::Integer,
                "1=undefined, 2=positive, 3=negative, 4=destructive",
            )
            .range(1, 4),
        )
        .arg(ArgSpec::body("automation", ArgType::String, "Automation status").one_of(AUTOMATION))
        .arg(ArgSpec::body("suite_id", ArgType::Integer, "Suite to place the case in"))
        .arg(ArgSpec::body("milestone_id", ArgType::Integer, "Milestone ID"))
        .arg(ArgSpec::body("tags", ArgType::StringList, "Tags"))
        .arg(ArgSpec::body(
            "steps",
            ArgType::ObjectList,
            "Steps with \"action\", \"expected_result\", \"data\" and \"position\"",
        ))
        .arg(ArgSpec::body(
            "custom_fields",
            ArgType::ObjectList,
            "Custom field values as objects with \"id\" and \"value\"",
        ))
}

/// Checked fields of one bulk test case.
fn bulk_case_fields() -> Vec<ArgSpec> {
    vec![
        title(),
        ArgSpec::body("severity", ArgType::Integer, "Severity").range(1, 6),
        ArgSpec::body("priority", ArgType::Integer, "Priority").range(1, 3),
        ArgSpec::body("behavior", ArgType::Integer, "Behavior").range(1, 4),
        ArgSpec::body("automation", ArgType::String, "Automation status").one_of(AUTOMATION),
        ArgSpec::body("suite_id", ArgType::Integer, "Suite ID"),
        ArgSpec::body("tags", ArgType::StringList, "Tags"),
    ]
}

fn case_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_test_cases",
            "List test cases in a project with optional filters",
            "/case/{code}",
        )
        .arg(project_code())
        .arg(ArgSpec::filter("search", "search", ArgType::String, "Search in case titles"))
        .arg(
            ArgSpec::filter("priority", "priority", ArgType::StringList, "Priorities to include")
                .one_of(PRIORITY_FILTER),
        )
        .arg(
            ArgSpec::filter("severity", "severity", ArgType::StringList, "Severities to include")
                .one_of(SEVERITY_FILTER),
        )
        .arg(ArgSpec::filter("type", "type", ArgType::StringList, "Test types to include"))
        .arg(
            ArgSpec::filter(
                "automation",
                "automation",
                ArgType::StringList,
                "Automation statuses to include",
            )
            .one_of(AUTOMATION),
        )
        .arg(ArgSpec::filter("suite_id", "suite_id", ArgType::Integer, "Suite ID"))
        .list(),
        ToolDescriptor::get("qase_get_test_case", "Get a test case with its steps", "/case/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("case_id", "Test case ID")),
        case_fields(
            ToolDescriptor::post("qase_create_test_case", "Create a test case", "/case/{code}")
                .arg(project_code())
                .arg(title()),
        ),
        ToolDescriptor::post(
            "qase_create_bulk_test_cases",
            "Create many test cases at once; large inputs are split into batches",
            "/case/{code}/bulk",
        )
        .arg(project_code())
        .arg(
            ArgSpec::items("cases", "Test case objects, each with at least \"title\"")
                .item_fields(bulk_case_fields()),
        )
        .bulk("cases", "cases", 100),
        case_fields(
            ToolDescriptor::patch("qase_update_test_case", "Update a test case", "/case/{code}/{id}")
                .arg(project_code())
                .arg(entity_id("case_id", "Test case ID"))
                .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty()),
        ),
        ToolDescriptor::delete("qase_delete_test_case", "Delete a test case", "/case/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("case_id", "Test case ID")),
    ]
}

fn suite_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get("qase_list_suites", "List suites in a project", "/suite/{code}")
            .arg(project_code())
            .arg(ArgSpec::filter("search", "search", ArgType::String, "Search in suite titles"))
            .list(),
        ToolDescriptor::get("qase_get_suite", "Get a suite", "/suite/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("suite_id", "Suite ID")),
        ToolDescriptor::post("qase_create_suite", "Create a suite", "/suite/{code}")
            .arg(project_code())
            .arg(title())
            .arg(ArgSpec::body("description", ArgType::String, "Description"))
            .arg(ArgSpec::body("preconditions", ArgType::String, "Preconditions"))
            .arg(ArgSpec::body("parent_id", ArgType::Integer, "Parent suite ID for nesting")),
        ToolDescriptor::patch("qase_update_suite", "Update a suite", "/suite/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("suite_id", "Suite ID"))
            .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty())
            .arg(ArgSpec::body("description", ArgType::String, "New description"))
            .arg(ArgSpec::body("preconditions", ArgType::String, "New preconditions"))
            .arg(ArgSpec::body("parent_id", ArgType::Integer, "New parent suite ID")),
        ToolDescriptor::delete("qase_delete_suite", "Delete a suite", "/suite/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("suite_id", "Suite ID")),
    ]
}

fn shared_step_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_shared_steps",
            "List shared steps in a project",
            "/shared_step/{code}",
        )
        .arg(project_code())
        .arg(ArgSpec::filter("search", "search", ArgType::String, "Search in step titles"))
        .list(),
        ToolDescriptor::get(
            "qase_get_shared_step",
            "Get a shared step by hash",
            "/shared_step/{code}/{hash}",
        )
        .arg(project_code())
        .arg(entity_hash("shared_step_hash", "Shared step hash")),
        ToolDescriptor::post(
            "qase_create_shared_step",
            "Create a shared step",
            "/shared_step/{code}",
        )
        .arg(project_code())
        .arg(title())
        .arg(ArgSpec::body("action", ArgType::String, "Action to perform").required())
        .arg(ArgSpec::body("expected_result", ArgType::String, "Expected result"))
        .arg(ArgSpec::body("data", ArgType::String, "Input data")),
        ToolDescriptor::patch(
            "qase_update_shared_step",
            "Update a shared step",
            "/shared_step/{code}/{hash}",
        )
        .arg(project_code())
        .arg(entity_hash("shared_step_hash", "Shared step hash"))
        .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty())
        .arg(ArgSpec::body("action", ArgType::String, "New action"))
        .arg(ArgSpec::body("expected_result", ArgType::String, "New expected result"))
        .arg(ArgSpec::body("data", ArgType::String, "New input data")),
        ToolDescriptor::delete(
            "qase_delete_shared_step",
            "Delete a shared step; it is removed from every case using it",
            "/shared_step/{code}/{hash}",
        )
        .arg(project_code())
        .arg(entity_hash("shared_step_hash", "Shared step hash")),
    ]
}

fn shared_parameter_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_shared_parameters",
            "List shared parameters in a project",
            "/shared_parameter/{code}",
        )
        .arg(project_code())
        .list(),
        ToolDescriptor::get(
            "qase_get_shared_parameter",
            "Get a shared parameter",
            "/shared_parameter/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("parameter_id", "Shared parameter ID")),
        ToolDescriptor::post(
            "qase_create_shared_parameter",
            "Create a shared parameter",
            "/shared_parameter/{code}",
        )
        .arg(project_code())
        .arg(title())
        .arg(
            ArgSpec::body("values", ArgType::StringList, "Parameter values")
                .required()
                .non_empty(),
        ),
        ToolDescriptor::patch(
            "qase_update_shared_parameter",
            "Update a shared parameter",
            "/shared_parameter/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("parameter_id", "Shared parameter ID"))
        .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty())
        .arg(ArgSpec::body("values", ArgType::StringList, "New values")),
        ToolDescriptor::delete(
            "qase_delete_shared_parameter",
            "Delete a shared parameter",
            "/shared_parameter/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("parameter_id", "Shared parameter ID")),
    ]
}

/// Test design tools.
pub fn cases_tools() -> Vec<ToolDescriptor> {
    let mut tools = case_tools();
    tools.extend(suite_tools());
    tools.extend(shared_step_tools());
    tools.extend(shared_parameter_tools());
    tools
}
