mod ir;
mod opcodes;
mod redirect;
mod report;
mod rules;
mod scan;
mod targets;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_sarif::sarif::Result as SarifResult;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::ir::Class;
use crate::redirect::{MethodRedirector, Redirected};
use crate::report::{build_invocation, build_sarif, missing_method_result, redirection_result};
use crate::rules::{RuleSet, load_rules};
use crate::scan::scan_inputs;

/// CLI arguments for redirectors execution.
#[derive(Parser, Debug)]
#[command(
    name = "redirectors",
    about = "Deterministic call-site redirection for JVM class files and JAR files, reported as SARIF.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Rule configuration; the built-in rules are used when omitted.
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(long)]
    timing: bool,
}

/// Outcome of running the redirector over a set of classes.
struct RedirectOutcome {
    results: Vec<SarifResult>,
    candidates: usize,
    redirections: usize,
    missing: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    run(cli)
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let rules = match cli.rules.as_deref() {
        Some(path) => load_rules(path)?,
        None => RuleSet::builtin()?,
    };
    let redirector = MethodRedirector::new(rules);
    debug!(rules = redirector.rules().len(), "rule set ready");

    let scan = scan_inputs(&cli.input)?;
    let class_count = scan.classes.len();
    let outcome = redirect_classes(&redirector, scan.classes);
    let invocation = build_invocation(outcome.missing == 0);
    let sarif = build_sarif(scan.artifacts, outcome.results, invocation);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} candidates={} redirections={} missing={}",
            started_at.elapsed().as_millis(),
            class_count,
            outcome.candidates,
            outcome.redirections,
            outcome.missing
        );
    }

    Ok(())
}

/// Hand every candidate class to the redirector, one at a time.
fn redirect_classes(redirector: &MethodRedirector, classes: Vec<Class>) -> RedirectOutcome {
    let targets = redirector.target_classes();
    let mut outcome = RedirectOutcome {
        results: Vec::new(),
        candidates: 0,
        redirections: 0,
        missing: 0,
    };
    for class in classes {
        if !targets.contains(&class.name) {
            continue;
        }
        outcome.candidates += 1;
        let Redirected { class, report } = redirector.transform(class);
        if report.is_empty() {
            debug!(class = %class.name, "no call sites redirected");
            continue;
        }
        outcome.redirections += report.redirections.len();
        outcome.missing += report.missing.len();
        outcome.results.extend(report.redirections.iter().map(|redirection| {
            redirection_result(&class.name, class.artifact_index, redirection)
        }));
        outcome.results.extend(
            report
                .missing
                .iter()
                .map(|missing| missing_method_result(&class.name, class.artifact_index, missing)),
        );
    }
    outcome
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::opcodes;
    use crate::scan::fixtures::class_bytes;

    fn write_rules(dir: &Path) -> PathBuf {
        let path = dir.join("rules.json");
        fs::write(
            &path,
            r#"{
                "rules": [{
                    "name": "baz",
                    "kind": "virtual",
                    "method": "baz",
                    "descriptor": "()V",
                    "targets": [
                        {"class": "com/example/Foo", "methods": ["bar()V", "gone()V"]}
                    ],
                    "redirect": {"invoke_static": {"owner": "com/example/Hooks", "name": "onBaz"}}
                }]
            }"#,
        )
        .expect("write rules");
        path
    }

    fn cli(input: PathBuf, rules: PathBuf, output: PathBuf) -> Cli {
        Cli {
            input,
            rules: Some(rules),
            output: Some(output),
            quiet: true,
            verbose: false,
            timing: false,
        }
    }

    #[test]
    fn run_reports_redirections_and_missing_methods() {
        let dir = tempfile::tempdir().expect("temp dir");
        let classes = dir.path().join("classes");
        fs::create_dir_all(&classes).expect("create classes dir");
        let code = vec![0x2a, opcodes::INVOKEVIRTUAL, 0x00, 0x07, opcodes::RETURN];
        for name in ["Foo", "Other"] {
            let bytes = class_bytes(
                &format!("com/example/{name}"),
                ("com/example/Foo", "baz", "()V"),
                &[("bar", "()V", 0x0001, code.clone())],
            );
            fs::write(classes.join(format!("{name}.class")), bytes).expect("write class");
        }
        let output = dir.path().join("out.sarif");

        run(cli(classes, write_rules(dir.path()), output.clone())).expect("run");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).expect("read output"))
                .expect("parse output");
        let results = value["runs"][0]["results"].as_array().expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ruleId"], "baz");
        assert_eq!(
            results[0]["locations"][0]["logicalLocations"][0]["name"],
            "com/example/Foo.bar()V"
        );
        assert_eq!(
            results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["index"],
            0
        );
        assert_eq!(results[1]["ruleId"], "MISSING_METHOD");
        assert_eq!(
            results[1]["locations"][0]["physicalLocation"]["artifactLocation"]["index"],
            0
        );
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            false
        );
        assert_eq!(value["runs"][0]["artifacts"].as_array().expect("artifacts").len(), 2);
    }

    #[test]
    fn cli_accepts_only_input_as_class_source() {
        let parsed = Cli::try_parse_from(["redirectors", "--input", "app.jar"]).expect("parse");
        assert_eq!(parsed.input, PathBuf::from("app.jar"));

        let result = Cli::try_parse_from([
            "redirectors",
            "--input",
            "app.jar",
            "--classpath",
            "lib.jar",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn run_rejects_missing_input() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = run(cli(
            dir.path().join("absent.jar"),
            write_rules(dir.path()),
            dir.path().join("out.sarif"),
        ));

        assert!(result.is_err());
    }

    #[test]
    fn builtin_rules_target_spawn_callers() {
        let redirector = MethodRedirector::new(RuleSet::builtin().expect("builtin rules"));

        assert!(
            redirector
                .target_classes()
                .contains("net/minecraft/world/level/NaturalSpawner")
        );
        assert_eq!(redirector.rules().len(), 1);
    }
}
