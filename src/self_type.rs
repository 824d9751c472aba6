// Copyright 2025 Cowboy AI, LLC.

//! Self-type checks
//!
//! A role may declare one generic parameter as its self type. Whoever
//! composes the role must supply its own type for that parameter, or,
//! when the composer is itself a role, its own self-type parameter so the
//! obligation passes on to the eventual composition.

use tracing::debug;

use crate::messages::{MessageCode, OperationResult};
use crate::model::{Module, TypeDefinition, TypeRef};
use crate::registry::RoleRegistry;

/// Check every composition in the module
pub fn check(module: &Module, registry: &RoleRegistry, result: &mut OperationResult) {
    for entry in registry.compositions() {
        let Some(composition) = module.get_type(&entry.name) else {
            continue;
        };
        for role in &entry.composed {
            check_composed(module, composition, role, result);
        }
    }
}

fn check_composed(
    module: &Module,
    composition: &TypeDefinition,
    role: &TypeRef,
    result: &mut OperationResult,
) {
    let Some(definition) = module.resolve_type(role) else {
        return;
    };
    let Some(position) = definition.self_parameter() else {
        return;
    };
    let Some(supplied) = role.arguments().get(position as usize) else {
        return;
    };
    if accepts(composition, supplied) {
        debug!(composition = %composition.name, %role, "self type satisfied");
        return;
    }
    result.report(
        MessageCode::SelfTypeMismatch,
        format!(
            "{} composes {role} with {supplied} as the self type, expected {}",
            composition.name,
            composition.self_reference()
        ),
    );
}

fn accepts(composition: &TypeDefinition, supplied: &TypeRef) -> bool {
    if *supplied == composition.self_reference() {
        return true;
    }
    matches!(
        (supplied, composition.self_parameter()),
        (TypeRef::TypeParam(p), Some(own)) if *p == own
    )
}
