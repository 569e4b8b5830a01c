use serde_json::json;
use serde_sarif::sarif::{
    Artifact, ArtifactLocation, Invocation, Location, LogicalLocation, Message, PhysicalLocation,
    Result as SarifResult, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};

use crate::redirect::{MissingMethod, Redirection};

pub(crate) const TOOL_NAME: &str = "redirectors";
pub(crate) const MISSING_METHOD_RULE_ID: &str = "MISSING_METHOD";

/// Physical location pointing at the artifact (class file or JAR entry) by index.
fn artifact_location(artifact_index: i64) -> PhysicalLocation {
    let artifact = ArtifactLocation::builder().index(artifact_index).build();
    PhysicalLocation::builder().artifact_location(artifact).build()
}

pub(crate) fn method_location(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    artifact_index: i64,
) -> Location {
    let logical = LogicalLocation::builder()
        .name(format!("{class_name}.{method_name}{descriptor}"))
        .kind("function")
        .build();
    Location::builder()
        .physical_location(artifact_location(artifact_index))
        .logical_locations(vec![logical])
        .build()
}

pub(crate) fn class_location(class_name: &str, artifact_index: i64) -> Location {
    let logical = LogicalLocation::builder()
        .name(class_name)
        .kind("type")
        .build();
    Location::builder()
        .physical_location(artifact_location(artifact_index))
        .logical_locations(vec![logical])
        .build()
}

pub(crate) fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

pub(crate) fn redirection_result(
    class_name: &str,
    artifact_index: i64,
    redirection: &Redirection,
) -> SarifResult {
    let original = &redirection.original;
    let replacement = &redirection.replacement;
    let message = result_message(format!(
        "Redirected {}{} to {}.{}{} at offset {}",
        original.name,
        original.descriptor,
        replacement.owner,
        replacement.name,
        replacement.descriptor,
        original.offset
    ));
    let location = method_location(
        class_name,
        &redirection.method_name,
        &redirection.method_descriptor,
        artifact_index,
    );
    SarifResult::builder()
        .rule_id(redirection.rule.clone())
        .message(message)
        .locations(vec![location])
        .build()
}

pub(crate) fn missing_method_result(
    class_name: &str,
    artifact_index: i64,
    missing: &MissingMethod,
) -> SarifResult {
    let message = result_message(format!(
        "Failed to redirect method call for {}: method {} not found in class {}",
        missing.rule, missing.method, class_name
    ));
    SarifResult::builder()
        .rule_id(MISSING_METHOD_RULE_ID)
        .message(message)
        .locations(vec![class_location(class_name, artifact_index)])
        .build()
}

pub(crate) fn build_invocation(execution_successful: bool) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(execution_successful)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

pub(crate) fn build_sarif(
    artifacts: Vec<Artifact>,
    results: Vec<SarifResult>,
    invocation: Invocation,
) -> Sarif {
    let driver = ToolComponent::builder()
        .name(TOOL_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallKind, CallSite};
    use crate::targets::MethodTarget;

    fn empty_invocation() -> Invocation {
        Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build()
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let sarif = build_sarif(Vec::new(), Vec::new(), empty_invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], TOOL_NAME);
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
    }

    #[test]
    fn redirection_result_names_rule_and_method() {
        let redirection = Redirection {
            rule: "finalizeSpawn".to_string(),
            method_name: "tick".to_string(),
            method_descriptor: "()V".to_string(),
            original: CallSite {
                owner: "a/Mob".to_string(),
                name: "finalizeSpawn".to_string(),
                descriptor: "()V".to_string(),
                kind: CallKind::Virtual,
                offset: 9,
            },
            replacement: CallSite {
                owner: "a/Hooks".to_string(),
                name: "onFinalizeSpawn".to_string(),
                descriptor: "(La/Mob;)V".to_string(),
                kind: CallKind::Static,
                offset: 9,
            },
        };

        let result = redirection_result("a/Spawner", 2, &redirection);
        let value = serde_json::to_value(&result).expect("serialize result");

        assert_eq!(value["ruleId"], "finalizeSpawn");
        assert_eq!(
            value["locations"][0]["physicalLocation"]["artifactLocation"]["index"],
            2
        );
        assert_eq!(
            value["message"]["text"],
            "Redirected finalizeSpawn()V to a/Hooks.onFinalizeSpawn(La/Mob;)V at offset 9"
        );
        assert_eq!(
            value["locations"][0]["logicalLocations"][0]["name"],
            "a/Spawner.tick()V"
        );
    }

    #[test]
    fn missing_method_result_uses_class_location() {
        let missing = MissingMethod {
            rule: "finalizeSpawn".to_string(),
            method: MethodTarget::parse("tick()V"),
        };

        let result = missing_method_result("a/Spawner", 4, &missing);
        let value = serde_json::to_value(&result).expect("serialize result");

        assert_eq!(value["ruleId"], MISSING_METHOD_RULE_ID);
        let text = value["message"]["text"].as_str().expect("message text");
        assert!(text.contains("method tick()V not found in class a/Spawner"));
        assert_eq!(value["locations"][0]["logicalLocations"][0]["kind"], "type");
        assert_eq!(
            value["locations"][0]["physicalLocation"]["artifactLocation"]["index"],
            4
        );
    }
}
