// Copyright 2025 Cowboy AI, LLC.

//! State container: per-instance storage of a role

use super::code::BackedProperties;
use super::state_name;
use crate::messages::{MessageCode, OperationResult};
use crate::model::{
    Annotation, MethodBody, MethodDefinition, TypeDefinition, Visibility,
};

/// Build `R/State`: every instance field of the role except auto-property
/// storage, with non-public fields widened to module-internal
pub(super) fn build_state(
    role: &TypeDefinition,
    backed: &BackedProperties,
    result: &mut OperationResult,
) -> TypeDefinition {
    let mut state = TypeDefinition::class(state_name(&role.name));
    state.generic_parameters = role.generic_parameters.clone();
    state.declaring_type = Some(role.name.clone());
    state.is_sealed = true;
    state.annotations.push(Annotation::CompilerGenerated);

    for field in role.fields.iter().filter(|f| !f.is_static) {
        if backed.fields.contains(&field.name) {
            continue;
        }
        let mut moved = field.clone();
        moved.is_init_only = false;
        if field.visibility.is_public() {
            result.report(
                MessageCode::PublicFieldRelocated,
                format!(
                    "public field {}::{} moved to {}, use the {} property instead",
                    role.name, field.name, state.name, field.name
                ),
            );
        } else {
            moved.visibility = Visibility::Internal;
        }
        state.fields.push(moved);
    }

    state
        .methods
        .push(MethodDefinition::constructor(MethodBody::default_constructor()));
    state
}
