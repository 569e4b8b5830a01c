use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::MethodDescriptor;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::ir::{CallKind, CallSite};
use crate::targets::{ClassTarget, load_targets, targets_from_value};

pub(crate) mod finalize_spawn;

/// Declarative mapping from one call-site signature to a replacement call.
#[derive(Clone, Debug)]
pub(crate) struct RedirectionRule {
    pub(crate) name: String,
    pub(crate) kind: CallKind,
    pub(crate) method: String,
    pub(crate) descriptor: String,
    pub(crate) targets: Vec<ClassTarget>,
    pub(crate) redirect: Redirect,
}

impl RedirectionRule {
    pub(crate) fn matches(&self, opcode: u8, call: &CallSite) -> bool {
        opcode == self.kind.opcode() && call.name == self.method && call.descriptor == self.descriptor
    }

    /// Targets of this rule that name `class_name`.
    pub(crate) fn targets_for<'a>(
        &'a self,
        class_name: &'a str,
    ) -> impl Iterator<Item = &'a ClassTarget> + 'a {
        self.targets
            .iter()
            .filter(move |target| target.class_name == class_name)
    }
}

/// How a matched call is rewritten.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Redirect {
    /// Call a static method instead. Without a descriptor, the receiver type is
    /// prepended to the original parameters for non-static calls.
    InvokeStatic {
        owner: String,
        name: String,
        descriptor: Option<String>,
    },
    /// Keep the invocation kind and owner, change the callee.
    Rename {
        name: String,
        descriptor: Option<String>,
    },
}

impl Redirect {
    pub(crate) fn build(&self, original: &CallSite) -> CallSite {
        match self {
            Redirect::InvokeStatic {
                owner,
                name,
                descriptor,
            } => CallSite {
                owner: owner.clone(),
                name: name.clone(),
                descriptor: descriptor
                    .clone()
                    .unwrap_or_else(|| static_descriptor(original)),
                kind: CallKind::Static,
                offset: original.offset,
            },
            Redirect::Rename { name, descriptor } => CallSite {
                owner: original.owner.clone(),
                name: name.clone(),
                descriptor: descriptor
                    .clone()
                    .unwrap_or_else(|| original.descriptor.clone()),
                kind: original.kind,
                offset: original.offset,
            },
        }
    }
}

fn static_descriptor(original: &CallSite) -> String {
    if original.kind == CallKind::Static {
        return original.descriptor.clone();
    }
    let parameters = original.descriptor.strip_prefix('(').unwrap_or(&original.descriptor);
    let receiver = if original.owner.starts_with('[') {
        original.owner.clone()
    } else {
        format!("L{};", original.owner)
    };
    format!("({receiver}{parameters}")
}

/// Rules applied by the redirector, in registration order.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuleSet {
    rules: Vec<RedirectionRule>,
}

impl RuleSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rules shipped with the tool.
    pub(crate) fn builtin() -> Result<Self> {
        debug!("gathering built-in method redirector rules");
        let mut rules = RuleSet::new();
        rules.push(finalize_spawn::rule()?);
        Ok(rules)
    }

    pub(crate) fn push(&mut self, rule: RedirectionRule) {
        debug!(
            rule = %rule.name,
            targets = rule.targets.len(),
            "registered redirection rule"
        );
        self.rules.push(rule);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RedirectionRule> {
        self.rules.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }
}

#[derive(Debug, Deserialize)]
struct RuleConfig {
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    name: String,
    kind: KindEntry,
    method: String,
    descriptor: String,
    targets: TargetsEntry,
    redirect: RedirectEntry,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindEntry {
    Static,
    Virtual,
    Interface,
    Special,
}

impl From<KindEntry> for CallKind {
    fn from(kind: KindEntry) -> Self {
        match kind {
            KindEntry::Static => CallKind::Static,
            KindEntry::Virtual => CallKind::Virtual,
            KindEntry::Interface => CallKind::Interface,
            KindEntry::Special => CallKind::Special,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetsEntry {
    Path(PathBuf),
    Inline(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RedirectEntry {
    InvokeStatic {
        owner: String,
        name: String,
        descriptor: Option<String>,
    },
    Rename {
        name: String,
        descriptor: Option<String>,
    },
}

/// Load a rule set from a JSON config; relative target paths resolve against the config's directory.
pub(crate) fn load_rules(path: &Path) -> Result<RuleSet> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_rules(&data, base).with_context(|| format!("failed to load rules from {}", path.display()))
}

fn parse_rules(data: &str, base: &Path) -> Result<RuleSet> {
    let config: RuleConfig = serde_json::from_str(data).context("malformed rule config")?;
    let mut rules = RuleSet::new();
    for entry in config.rules {
        rules.push(build_rule(entry, base)?);
    }
    Ok(rules)
}

fn build_rule(entry: RuleEntry, base: &Path) -> Result<RedirectionRule> {
    validate_descriptor(&entry.descriptor)
        .with_context(|| format!("rule {} has an invalid descriptor", entry.name))?;
    let targets = match entry.targets {
        TargetsEntry::Path(path) => load_targets(&base.join(path))?,
        TargetsEntry::Inline(value) => targets_from_value(value, &entry.name)?,
    };
    let redirect = match entry.redirect {
        RedirectEntry::InvokeStatic {
            owner,
            name,
            descriptor,
        } => Redirect::InvokeStatic {
            owner,
            name,
            descriptor,
        },
        RedirectEntry::Rename { name, descriptor } => Redirect::Rename { name, descriptor },
    };
    if let Redirect::InvokeStatic {
        descriptor: Some(descriptor),
        ..
    }
    | Redirect::Rename {
        descriptor: Some(descriptor),
        ..
    } = &redirect
    {
        validate_descriptor(descriptor).with_context(|| {
            format!("rule {} has an invalid replacement descriptor", entry.name)
        })?;
    }

    Ok(RedirectionRule {
        name: entry.name,
        kind: entry.kind.into(),
        method: entry.method,
        descriptor: entry.descriptor,
        targets,
        redirect,
    })
}

pub(crate) fn validate_descriptor(descriptor: &str) -> Result<()> {
    MethodDescriptor::from_str(descriptor)
        .map_err(|err| anyhow::anyhow!("malformed method descriptor {descriptor}: {err:?}"))?;
    Ok(())
}
