// Copyright 2025 Cowboy AI, LLC.

//! Verification of woven modules
//!
//! A [`Verifier`] inspects a rewritten module before it is committed. The
//! orchestrator runs it on a watchdog thread so a verifier that hangs or
//! panics cannot take the weaving pass down with it.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::messages::{MessageCode, OperationResult};
use crate::model::{root_method, Annotation, Instruction, MethodDefinition, MethodRef, Module, TypeDefinition, TypeRef};

/// Problems found by a verifier; empty means the module is valid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// One line per problem
    pub problems: Vec<String>,
}

impl VerificationReport {
    /// Whether no problem was found
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }
}

/// Checks a woven module
pub trait Verifier: Send + Sync {
    /// Inspect the module. An `Err` means the verifier itself could not run.
    fn verify(&self, module: &Module) -> anyhow::Result<VerificationReport>;
}

/// Run `verifier` on a copy of `module`, waiting at most `timeout`
pub fn run_verifier(
    verifier: Arc<dyn Verifier>,
    module: &Module,
    timeout: Duration,
    result: &mut OperationResult,
) {
    let (sender, receiver) = mpsc::channel();
    let snapshot = module.clone();
    let spawned = thread::Builder::new()
        .name("cim-roles-verifier".to_string())
        .spawn(move || {
            let outcome = verifier.verify(&snapshot);
            sender.send(outcome).ok();
        });
    if let Err(error) = spawned {
        result.report(
            MessageCode::VerifierUnavailable,
            format!("could not start the verifier: {error}"),
        );
        return;
    }

    match receiver.recv_timeout(timeout) {
        Ok(Ok(report)) if report.is_valid() => {
            debug!(module = %module.name, "verification passed");
        }
        Ok(Ok(report)) => {
            warn!(module = %module.name, problems = report.problems.len(), "verification failed");
            for problem in report.problems {
                result.report(MessageCode::VerificationFailed, problem);
            }
        }
        Ok(Err(error)) => {
            warn!(module = %module.name, %error, "verifier unavailable");
            result.report(
                MessageCode::VerifierUnavailable,
                format!("verifier failed to run: {error:#}"),
            );
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(module = %module.name, ?timeout, "verifier timed out");
            result.report(
                MessageCode::VerifierTimeout,
                format!("verifier did not finish within {} ms", timeout.as_millis()),
            );
        }
        Err(RecvTimeoutError::Disconnected) => {
            result.report(
                MessageCode::VerifierUnavailable,
                "verifier stopped without producing a report",
            );
        }
    }
}

/// Built-in structural checks over the in-memory model
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralVerifier;

impl Verifier for StructuralVerifier {
    fn verify(&self, module: &Module) -> anyhow::Result<VerificationReport> {
        let mut report = VerificationReport::default();
        for ty in module.types() {
            check_bodies(ty, &mut report);
            if !ty.is_interface() && !ty.is_abstract {
                check_interfaces(module, ty, &mut report);
            }
            check_references(module, ty, &mut report);
            if ty.interfaces.iter().any(|i| i.as_does().is_some()) {
                check_annotations(ty, &mut report);
            }
        }
        Ok(report)
    }
}

fn check_bodies(ty: &TypeDefinition, report: &mut VerificationReport) {
    if ty.is_interface() {
        return;
    }
    for method in &ty.methods {
        if method.flags.is_abstract {
            if !ty.is_abstract {
                report.problem(format!(
                    "concrete type {} declares abstract method {}",
                    ty.name, method.name
                ));
            }
        } else if !method.flags.is_interop && method.body.is_none() {
            report.problem(format!("{}::{} has no body", ty.name, method.name));
        }
    }
}

/// Implemented contracts of `ty` and their inherited contracts, in `ty`'s frame
fn all_interfaces<'a>(module: &'a Module, ty: &'a TypeDefinition) -> Vec<(TypeRef, &'a TypeDefinition)> {
    let mut pending: Vec<TypeRef> = ty.interfaces.clone();
    for (base, definition) in module.base_chain(ty) {
        pending.extend(definition.interfaces.iter().map(|i| i.substitute(base.arguments())));
    }
    let mut found: Vec<(TypeRef, &TypeDefinition)> = Vec::new();
    while let Some(contract) = pending.pop() {
        if found.iter().any(|(t, _)| *t == contract) {
            continue;
        }
        let Some(definition) = module.resolve_type(&contract).filter(|d| d.is_interface()) else {
            continue;
        };
        pending.extend(definition.interfaces.iter().map(|i| i.substitute(contract.arguments())));
        found.push((contract, definition));
    }
    found
}

fn check_interfaces(module: &Module, ty: &TypeDefinition, report: &mut VerificationReport) {
    let mut implementors: Vec<(TypeRef, &TypeDefinition)> = vec![(ty.self_reference(), ty)];
    implementors.extend(module.base_chain(ty));

    for (contract, definition) in all_interfaces(module, ty) {
        for method in definition.methods.iter().filter(|m| m.is_instance_member()) {
            let target = method.reference(contract.clone());
            let parameters: Vec<TypeRef> = method
                .parameters
                .iter()
                .map(|p| p.ty.substitute(contract.arguments()))
                .collect();
            let implemented = implementors.iter().any(|(declaring, implementor)| {
                implementor.methods.iter().filter(|m| m.is_instance_member()).any(|m| {
                    m.overrides.iter().any(|edge| module.override_reaches(edge, &target))
                        || (m.visibility.is_public()
                            && m.name == method.name
                            && m.generic_arity == method.generic_arity
                            && m.parameters.len() == parameters.len()
                            && m.parameters
                                .iter()
                                .zip(&parameters)
                                .all(|(p, t)| p.ty.substitute(declaring.arguments()) == *t))
                })
            }) || root_method(&method.name, &parameters).is_some();
            if !implemented {
                report.problem(format!("{} does not implement {target}", ty.name));
            }
        }
    }
}

fn check_references(module: &Module, ty: &TypeDefinition, report: &mut VerificationReport) {
    for method in &ty.methods {
        let Some(body) = &method.body else { continue };
        for instruction in &body.instructions {
            if let Some(target) = instruction.method_ref() {
                if !method_exists(module, target) {
                    report.problem(format!("{}::{} calls missing {target}", ty.name, method.name));
                }
            }
            if let Some(field) = instruction.field_ref() {
                let missing = module
                    .resolve_type(&field.declaring)
                    .is_some_and(|d| d.find_field(&field.name).is_none());
                if missing {
                    report.problem(format!("{}::{} uses missing field {field}", ty.name, method.name));
                }
            }
            if let Instruction::NewObj(ctor) = instruction {
                let abstract_type = module.resolve_type(&ctor.declaring).is_some_and(|d| d.is_abstract);
                if abstract_type {
                    report.problem(format!("{}::{} instantiates abstract {}", ty.name, method.name, ctor.declaring));
                }
            }
        }
    }
}

/// Methods on types outside the module are assumed to exist
fn method_exists(module: &Module, target: &MethodRef) -> bool {
    let Some(definition) = module.resolve_type(&target.declaring) else {
        return true;
    };
    definition
        .find_method(&target.name, &target.parameters, target.generic_arity)
        .is_some()
}

fn check_annotations(ty: &TypeDefinition, report: &mut VerificationReport) {
    let weaver_only = |annotations: &[Annotation]| {
        annotations
            .iter()
            .any(|a| matches!(a, Annotation::Placeholder | Annotation::Supersede))
    };
    let leftover = ty
        .methods
        .iter()
        .filter(|m: &&MethodDefinition| weaver_only(&m.annotations))
        .map(|m| m.name.as_str())
        .chain(ty.properties.iter().filter(|p| weaver_only(&p.annotations)).map(|p| p.name.as_str()))
        .chain(ty.events.iter().filter(|e| weaver_only(&e.annotations)).map(|e| e.name.as_str()));
    for name in leftover {
        report.problem(format!("{}::{name} still carries a weaver annotation", ty.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModuleBuilder;

    struct Sleepy(Duration);

    impl Verifier for Sleepy {
        fn verify(&self, _module: &Module) -> anyhow::Result<VerificationReport> {
            thread::sleep(self.0);
            Ok(VerificationReport::default())
        }
    }

    #[test]
    fn test_unimplemented_contract_member_is_reported() {
        let module = ModuleBuilder::new("M")
            .interface("I", |i| i.abstract_method("Run", TypeRef::Void))
            .class("C", |c| c.implements("I").default_constructor())
            .build()
            .unwrap();
        let report = StructuralVerifier.verify(&module).unwrap();
        assert_eq!(report.problems, vec!["C does not implement void I::Run()".to_string()]);
    }

    #[test]
    fn test_implicit_and_inherited_implementations_count() {
        let module = ModuleBuilder::new("M")
            .interface("I", |i| i.abstract_method("Run", TypeRef::Void).abstract_method("ToString", TypeRef::String))
            .class("Base", |c| c.default_constructor().method("Run", TypeRef::Void, |m| m.empty_body()))
            .class("C", |c| c.base("Base").implements("I").default_constructor())
            .build()
            .unwrap();
        assert!(StructuralVerifier.verify(&module).unwrap().is_valid());
    }

    #[test]
    fn test_dangling_reference_is_reported() {
        let module = ModuleBuilder::new("M")
            .class("Other", |c| c)
            .class("C", |c| {
                c.method("Go", TypeRef::Int32, |m| {
                    m.body(vec![
                        Instruction::LoadArg(0),
                        Instruction::Call(MethodRef::new(TypeRef::named("Other"), "Missing", vec![], TypeRef::Int32)),
                        Instruction::Ret,
                    ])
                })
            })
            .build()
            .unwrap();
        let report = StructuralVerifier.verify(&module).unwrap();
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].contains("Missing"));
    }

    #[test]
    fn test_slow_verifier_times_out() {
        let module = Module::new("M");
        let mut result = OperationResult::new();
        run_verifier(
            Arc::new(Sleepy(Duration::from_millis(500))),
            &module,
            Duration::from_millis(20),
            &mut result,
        );
        assert!(result.has(MessageCode::VerifierTimeout));
    }
}
