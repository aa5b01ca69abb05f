//! Test execution tools: plans, runs and results.

use super::{entity_hash, entity_id, project_code, title, RESULT_STATUS};
use crate::registry::schema::{ArgSpec, ArgType};
use crate::registry::ToolDescriptor;

const RUN_INCLUDES: &[&str] = &["cases"];

fn plan_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get("qase_list_test_plans", "List test plans in a project", "/plan/{code}")
            .arg(project_code())
            .list(),
        ToolDescriptor::get(
            "qase_get_test_plan",
            "Get a test plan with its cases and assignees",
            "/plan/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("plan_id", "Test plan ID")),
        ToolDescriptor::post("qase_create_test_plan", "Create a test plan", "/plan/{code}")
            .arg(project_code())
            .arg(title())
            .arg(ArgSpec::body("description", ArgType::String, "Description"))
            .arg(ArgSpec::body("cases", ArgType::IntegerList, "Test case IDs in the plan")),
        ToolDescriptor::patch("qase_update_test_plan", "Update a test plan", "/plan/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("plan_id", "Test plan ID"))
            .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty())
            .arg(ArgSpec::body("description", ArgType::String, "New description"))
            .arg(ArgSpec::body("cases", ArgType::IntegerList, "New list of test case IDs")),
        ToolDescriptor::delete("qase_delete_test_plan", "Delete a test plan", "/plan/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("plan_id", "Test plan ID")),
    ]
}

fn run_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get("qase_list_test_runs", "List test runs in a project", "/run/{code}")
            .arg(project_code())
            .arg(
                ArgSpec::query("include", ArgType::StringList, "Extra entities to include")
                    .one_of(RUN_INCLUDES),
            )
            .list(),
        ToolDescriptor::get("qase_get_test_run", "Get a test run", "/run/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("run_id", "Test run ID"))
            .arg(
                ArgSpec::query("include", ArgType::StringList, "Extra entities to include")
                    .one_of(RUN_INCLUDES),
            ),
        ToolDescriptor::post("qase_create_test_run", "Create a test run", "/run/{code}")
            .arg(project_code())
            .arg(title())
            .arg(ArgSpec::body("description", ArgType::String, "Description"))
            .arg(ArgSpec::body("cases", ArgType::IntegerList, "Test case IDs to include"))
            .arg(ArgSpec::body("plan_id", ArgType::Integer, "Test plan to run"))
            .arg(ArgSpec::body("environment_id", ArgType::Integer, "Environment ID"))
            .arg(ArgSpec::body("milestone_id", ArgType::Integer, "Milestone ID"))
            .arg(ArgSpec::body("is_autotest", ArgType::Boolean, "Whether the run is automated")),
        ToolDescriptor::post(
            "qase_complete_test_run",
            "Complete a test run",
            "/run/{code}/{id}/complete",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID")),
        ToolDescriptor::delete("qase_delete_test_run", "Delete a test run", "/run/{code}/{id}")
            .arg(project_code())
            .arg(entity_id("run_id", "Test run ID")),
    ]
}

fn result_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_test_results",
            "List results recorded in a test run",
            "/result/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID"))
        .list(),
        ToolDescriptor::get(
            "qase_get_test_result",
            "Get a test result by hash",
            "/result/{code}/{id}/{hash}",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID"))
        .arg(entity_hash("result_hash", "Result hash")),
        ToolDescriptor::post(
            "qase_create_test_result",
            "Record a result for a test case in a run",
            "/result/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID"))
        .arg(ArgSpec::body("case_id", ArgType::Integer, "Test case ID").required())
        .arg(
            ArgSpec::body("status", ArgType::String, "Result status")
                .required()
                .one_of(RESULT_STATUS),
        )
        .arg(ArgSpec::body("time_ms", ArgType::Integer, "Execution time in milliseconds").range(0, i64::MAX))
        .arg(ArgSpec::body("comment", ArgType::String, "Comment"))
        .arg(ArgSpec::body("defect", ArgType::Boolean, "Whether to file a defect"))
        .arg(ArgSpec::body("member_id", ArgType::Integer, "Member who executed the case"))
        .arg(ArgSpec::body(
            "steps",
            ArgType::ObjectList,
            "Step results with \"position\", \"status\" and \"comment\"",
        ))
        .arg(ArgSpec::body("attachments", ArgType::StringList, "Attachment hashes")),
        ToolDescriptor::post(
            "qase_create_bulk_test_results",
            "Record many results in a run at once; large inputs are split into batches",
            "/result/{code}/{id}/bulk",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID"))
        .arg(
            ArgSpec::items("results", "Result objects, each with \"case_id\" and \"status\"")
                .item_fields(vec![
                    ArgSpec::body("case_id", ArgType::Integer, "Test case ID")
                        .required()
                        .range(1, i64::MAX),
                    ArgSpec::body("status", ArgType::String, "Result status")
                        .required()
                        .one_of(RESULT_STATUS),
                    ArgSpec::body("time_ms", ArgType::Integer, "Execution time in milliseconds")
                        .range(0, i64::MAX),
                    ArgSpec::body("defect", ArgType::Boolean, "Whether to file a defect"),
                    ArgSpec::body("member_id", ArgType::Integer, "Member ID"),
                ]),
        )
        .bulk("results", "results", 100),
        ToolDescriptor::post(
            "qase_create_results_v2",
            "Record many results in a run through the v2 API",
            "/{code}/run/{id}/results",
        )
        .arg(project_code())
        .arg(entity_id("run_id", "Test run ID"))
        .arg(
            ArgSpec::items("results", "v2 result objects, each with \"title\" and \"execution\"")
                .item_fields(vec![
                    ArgSpec::body("title", ArgType::String, "Result title")
                        .required()
                        .non_empty(),
                    ArgSpec::body("execution", ArgType::Object, "Execution status and timing")
                        .required(),
                ]),
        )
        .bulk("results", "results", 100)
        .v2(),
    ]
}

/// Execution tools.
pub fn execution_tools() -> Vec<ToolDescriptor> {
    let mut tools = plan_tools();
    tools.extend(run_tools());
    tools.extend(result_tools());
    tools
}
