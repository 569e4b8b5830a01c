use std::collections::BTreeSet;

use tracing::{debug, error};

use crate::ir::{CallSite, ClassNode, InsnNode, MethodNode};
use crate::rules::{RedirectionRule, RuleSet};
use crate::targets::MethodTarget;

/// Rewrites call sites in classes according to a fixed rule set.
pub(crate) struct MethodRedirector {
    rules: RuleSet,
}

/// One call site that was replaced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Redirection {
    pub(crate) rule: String,
    pub(crate) method_name: String,
    pub(crate) method_descriptor: String,
    pub(crate) original: CallSite,
    pub(crate) replacement: CallSite,
}

/// A target method that does not exist in the class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MissingMethod {
    pub(crate) rule: String,
    pub(crate) method: MethodTarget,
}

/// What a single transform did to a class.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct RedirectReport {
    pub(crate) redirections: Vec<Redirection>,
    pub(crate) missing: Vec<MissingMethod>,
}

/// A transformed class and the report for it.
#[derive(Debug)]
pub(crate) struct Redirected<C> {
    pub(crate) class: C,
    pub(crate) report: RedirectReport,
}

impl RedirectReport {
    pub(crate) fn is_empty(&self) -> bool {
        self.redirections.is_empty() && self.missing.is_empty()
    }
}

impl MethodRedirector {
    pub(crate) fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub(crate) fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Every class named by any rule target.
    pub(crate) fn target_classes(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(|rule| rule.targets.iter())
            .map(|target| target.class_name.clone())
            .collect()
    }

    /// Rewrite `class` and hand it back together with what was changed.
    pub(crate) fn transform<C: ClassNode>(&self, mut class: C) -> Redirected<C> {
        let mut report = RedirectReport::default();
        for rule in self.rules.iter() {
            for method in target_methods(&class, rule) {
                self.redirect_method(&mut class, rule, &method, &mut report);
            }
        }
        Redirected { class, report }
    }

    fn redirect_method<C: ClassNode>(
        &self,
        class: &mut C,
        rule: &RedirectionRule,
        target: &MethodTarget,
        report: &mut RedirectReport,
    ) {
        let class_name = class.name().to_string();
        let Some(method) = class
            .methods_mut()
            .iter_mut()
            .find(|method| method.name() == target.name && method.descriptor() == target.descriptor)
        else {
            error!(
                rule = %rule.name,
                method = %target,
                class = %class_name,
                "failed to redirect method call for {}: method {} not found in class {}",
                rule.name,
                target,
                class_name
            );
            report.missing.push(MissingMethod {
                rule: rule.name.clone(),
                method: target.clone(),
            });
            return;
        };

        // Matches are collected first; replacement is one-for-one so indices stay valid.
        let matches: Vec<(usize, CallSite)> = method
            .instructions()
            .iter()
            .enumerate()
            .filter_map(|(index, insn)| {
                let call = insn.call_site()?;
                rule.matches(insn.opcode(), call)
                    .then(|| (index, call.clone()))
            })
            .collect();

        for (index, original) in matches {
            let replacement = rule.redirect.build(&original);
            debug!(
                rule = %rule.name,
                offset = original.offset,
                "redirecting method call {}{} to {}{} inside of {}.{}",
                original.name,
                original.descriptor,
                replacement.name,
                replacement.descriptor,
                class_name,
                method.name()
            );
            method.replace_call(index, replacement.clone());
            report.redirections.push(Redirection {
                rule: rule.name.clone(),
                method_name: method.name().to_string(),
                method_descriptor: method.descriptor().to_string(),
                original,
                replacement,
            });
        }
    }
}

/// Declared methods of every target naming this class, each followed by the class's synthetic methods.
fn target_methods<C: ClassNode>(class: &C, rule: &RedirectionRule) -> Vec<MethodTarget> {
    let mut methods = Vec::new();
    for target in rule.targets_for(class.name()) {
        methods.extend(target.methods.iter().map(|method| MethodTarget::parse(method)));
        methods.extend(
            class
                .methods()
                .iter()
                .filter(|method| method.is_synthetic())
                .map(|method| MethodTarget {
                    name: method.name().to_string(),
                    descriptor: method.descriptor().to_string(),
                }),
        );
    }
    methods
}
