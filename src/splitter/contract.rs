// Copyright 2025 Cowboy AI, LLC.

//! Capability contract: the public instance surface of a role

use super::state_accessor_name;
use crate::errors::WeaveResult;
use crate::model::{
    Annotation, MethodDefinition, MethodFlags, Parameter, PropertyDefinition, TypeDefinition,
    TypeKind, TypeRef, Visibility,
};

fn abstract_flags() -> MethodFlags {
    MethodFlags {
        is_abstract: true,
        is_virtual: true,
        is_new_slot: true,
        ..MethodFlags::default()
    }
}

/// Hidden accessor returning the state container
pub(super) fn state_accessor(role: &TypeDefinition, state: &TypeDefinition) -> MethodDefinition {
    let mut accessor = MethodDefinition::new(state_accessor_name(&role.name), state.self_reference());
    accessor.flags = abstract_flags();
    accessor.annotations.push(Annotation::CompilerGenerated);
    accessor
}

fn declaration(method: &MethodDefinition) -> MethodDefinition {
    let mut declaration = method.clone();
    declaration.flags = abstract_flags();
    declaration.visibility = Visibility::Public;
    declaration.body = None;
    declaration
}

/// Turn the role into its contract. Returns the contract and the names of
/// the accessors added for relocated public fields.
pub(super) fn build_contract(
    role: &TypeDefinition,
    state: &TypeDefinition,
) -> WeaveResult<(TypeDefinition, Vec<String>)> {
    let mut contract = role.clone();
    contract.kind = TypeKind::Interface;
    contract.is_abstract = true;
    contract.is_sealed = false;
    contract.base = None;
    contract.fields.clear();
    contract.methods = role
        .methods
        .iter()
        .filter(|m| m.visibility.is_public() && m.is_instance_member())
        .map(declaration)
        .collect();

    let public = public_instance_methods(role);
    let kept = |name: &Option<String>| name.clone().filter(|n| public.contains(&n.as_str()));
    contract.properties = role
        .properties
        .iter()
        .filter_map(|p| {
            let getter = kept(&p.getter);
            let setter = kept(&p.setter);
            (getter.is_some() || setter.is_some()).then(|| PropertyDefinition {
                getter,
                setter,
                ..p.clone()
            })
        })
        .collect();
    contract.events = role
        .events
        .iter()
        .filter(|e| e.accessors().any(|a| public.contains(&a)))
        .cloned()
        .collect();

    let mut relocated = Vec::new();
    for field in role
        .fields
        .iter()
        .filter(|f| !f.is_static && f.visibility.is_public())
    {
        let mut getter = MethodDefinition::new(format!("get_{}", field.name), field.ty.clone());
        getter.flags = abstract_flags();
        relocated.push(getter.name.clone());
        let mut property = PropertyDefinition {
            name: field.name.clone(),
            ty: field.ty.clone(),
            getter: Some(getter.name.clone()),
            setter: None,
            annotations: Vec::new(),
        };
        contract.add_method(getter)?;

        if !field.is_init_only {
            let mut setter = MethodDefinition::new(format!("set_{}", field.name), TypeRef::Void);
            setter.flags = abstract_flags();
            setter.parameters.push(Parameter::new("value", field.ty.clone()));
            relocated.push(setter.name.clone());
            property.setter = Some(setter.name.clone());
            contract.add_method(setter)?;
        }
        contract.properties.push(property);
    }

    contract.add_method(state_accessor(role, state))?;
    Ok((contract, relocated))
}

fn public_instance_methods(role: &TypeDefinition) -> Vec<&str> {
    role.methods
        .iter()
        .filter(|m| m.visibility.is_public() && m.is_instance_member())
        .map(|m| m.name.as_str())
        .collect()
}
