//! Custom and system field tools.

use super::{entity_id, project_code, title};
use crate::registry::schema::{ArgSpec, ArgType};
use crate::registry::ToolDescriptor;
use std::time::Duration;

fn field_settings(tool: ToolDescriptor) -> ToolDescriptor {
    tool.arg(ArgSpec::body("placeholder", ArgType::String, "Placeholder text"))
        .arg(ArgSpec::body("default_value", ArgType::String, "Default value"))
        .arg(ArgSpec::body("is_filterable", ArgType::Boolean, "Whether the field can be filtered on"))
        .arg(ArgSpec::body("is_visible", ArgType::Boolean, "Whether the field is visible"))
        .arg(ArgSpec::body("is_required", ArgType::Boolean, "Whether the field is required"))
        .arg(ArgSpec::body(
            "value",
            ArgType::ObjectList,
            "Options for selectbox, radio and multiselect fields, as objects with \"title\"",
        ))
}

/// Field tools.
pub fn fields_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::get(
            "qase_list_custom_fields",
            "List custom fields of a project with their types and options",
            "/custom_field/{code}",
        )
        .arg(project_code())
        .reference_list("custom_field"),
        ToolDescriptor::get(
            "qase_get_custom_field",
            "Get a custom field",
            "/custom_field/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("field_id", "Custom field ID")),
        field_settings(
            ToolDescriptor::post(
                "qase_create_custom_field",
                "Create a custom field",
                "/custom_field/{code}",
            )
            .arg(project_code())
            .arg(title())
            .arg(
                ArgSpec::body("entity", ArgType::Integer, "0=case, 1=run, 2=defect")
                    .required()
                    .range(0, 2),
            )
            .arg(
                ArgSpec::body(
                    "field_type",
                    ArgType::Integer,
                    "0=number, 1=string, 2=text, 3=selectbox, 4=checkbox, 5=radio, \
                     6=multiselect, 7=url, 8=user, 9=datetime",
                )
                .field("type")
                .required()
                .range(0, 9),
            ),
        ),
        field_settings(
            ToolDescriptor::patch(
                "qase_update_custom_field",
                "Update a custom field",
                "/custom_field/{code}/{id}",
            )
            .arg(project_code())
            .arg(entity_id("field_id", "Custom field ID"))
            .arg(ArgSpec::body("title", ArgType::String, "New title").non_empty()),
        ),
        ToolDescriptor::delete(
            "qase_delete_custom_field",
            "Delete a custom field",
            "/custom_field/{code}/{id}",
        )
        .arg(project_code())
        .arg(entity_id("field_id", "Custom field ID")),
        ToolDescriptor::get(
            "qase_get_system_fields",
            "Get system fields (priority, severity, type, behavior, automation) and their values",
            "/system_field/{code}",
        )
        .arg(project_code())
        .reference("system_field")
        .ttl(Duration::from_secs(15 * 60)),
    ]
}
