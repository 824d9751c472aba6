// Copyright 2025 Cowboy AI, LLC.

//! Forwarders and patches for resolved groups

use super::{CompositionPlan, MethodPatch};
use crate::builder::trivial_accessors;
use crate::classifier::ConflictGroup;
use crate::errors::{WeaveError, WeaveResult};
use crate::member_model::{ContributedMember, FieldBacking, MemberOrigin};
use crate::model::{
    Annotation, FieldDefinition, FieldRef, Instruction, MethodBody, MethodDefinition, MethodFlags,
    MethodRef, Parameter, TypeDefinition, TypeRef,
};
use crate::resolver::{Resolution, Target};
use crate::splitter::RoleCatalog;

/// Name of the storage field of a field-backed property
pub(super) fn backing_field_name(property: &str) -> String {
    format!("<{property}>k__BackingField")
}

pub(super) fn plan_group(
    plan: &mut CompositionPlan,
    composition: &TypeDefinition,
    catalog: &RoleCatalog,
    group: &ConflictGroup,
    resolution: &Resolution,
) -> WeaveResult<()> {
    match resolution {
        Resolution::ClassMember { member, subsumed } => {
            plan.patch(MethodPatch {
                name: member.name.clone(),
                parameters: member.parameters.clone(),
                generic_arity: member.generic_arity,
                body: None,
                overrides: subsumed.clone(),
            });
        }
        Resolution::Ancestor {
            member,
            reuse_slot,
            subsumed,
        } => {
            let target = member.class_reference().ok_or_else(|| {
                WeaveError::InternalError(format!("{} is not a class member", member.describe()))
            })?;
            let mut forwarder = forwarder(member, parameters_of(member, catalog, group), *reuse_slot);
            forwarder.body = Some(forwarding_body(&target, member.parameters.len()));
            forwarder.overrides = subsumed.clone();
            plan.methods.push(forwarder);
        }
        Resolution::RoleMember {
            member,
            target,
            subsumed,
        } => {
            let body = role_member_body(plan, composition, member)?;
            match target {
                Target::Placeholder(placeholder) => plan.patch(MethodPatch {
                    name: placeholder.name.clone(),
                    parameters: placeholder.parameters.clone(),
                    generic_arity: placeholder.generic_arity,
                    body: Some(body),
                    overrides: subsumed.clone(),
                }),
                Target::New { reuse_slot } => {
                    if plan.plans_method(&member.name, &member.parameters, member.generic_arity) {
                        return Err(WeaveError::invalid(format!(
                            "{}::{} planned twice",
                            composition.name, member.name
                        )));
                    }
                    let mut forwarder = forwarder(member, parameters_of(member, catalog, group), *reuse_slot);
                    forwarder.body = Some(body);
                    forwarder.overrides = subsumed.clone();
                    plan.methods.push(forwarder);
                }
            }
        }
        Resolution::Abstract { member, subsumed } => {
            let mut declaration = forwarder(member, parameters_of(member, catalog, group), false);
            declaration.flags.is_abstract = true;
            declaration.overrides = subsumed.clone();
            plan.methods.push(declaration);
        }
        Resolution::Untouched
        | Resolution::BaseMethodOnly
        | Resolution::NotSynthesized
        | Resolution::Unresolved => {}
    }
    Ok(())
}

/// Public virtual method shaped like `member`, without a body
fn forwarder(member: &ContributedMember, parameters: Vec<Parameter>, reuse_slot: bool) -> MethodDefinition {
    let mut method = MethodDefinition::new(member.name.clone(), member.return_type.clone());
    method.generic_arity = member.generic_arity;
    method.parameters = parameters;
    method.flags = MethodFlags {
        is_virtual: true,
        is_new_slot: !reuse_slot,
        ..MethodFlags::default()
    };
    method
}

/// Parameters of a member in the composition frame, named after the
/// contract declaration or any class member of the group
fn parameters_of(member: &ContributedMember, catalog: &RoleCatalog, group: &ConflictGroup) -> Vec<Parameter> {
    let declared_names = |definition: &MethodDefinition| -> Vec<String> {
        definition.parameters.iter().map(|p| p.name.clone()).collect()
    };
    let names: Vec<String> = match &member.origin {
        MemberOrigin::Role { role, contract, .. } => catalog
            .resolve(role)
            .and_then(|split| split.find_member(&contract.name, &contract.parameters, contract.generic_arity))
            .map(|entry| declared_names(&entry.method))
            .unwrap_or_default(),
        MemberOrigin::Class { definition, .. } => declared_names(definition),
        MemberOrigin::View { .. } => group
            .members()
            .iter()
            .find_map(ContributedMember::class_definition)
            .map(declared_names)
            .unwrap_or_default(),
    };
    member
        .parameters
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let name = names.get(i).cloned().unwrap_or_else(|| format!("arg{i}"));
            Parameter::new(name, ty.clone())
        })
        .collect()
}

/// `ldarg 0..=n; call target; ret`
fn forwarding_body(target: &MethodRef, parameter_count: usize) -> MethodBody {
    let mut instructions: Vec<Instruction> = (0..=parameter_count as u16).map(Instruction::LoadArg).collect();
    let call = MethodRef {
        generic_arguments: (0..target.generic_arity).map(TypeRef::MethodParam).collect(),
        ..target.clone()
    };
    instructions.push(Instruction::Call(call));
    instructions.push(Instruction::Ret);
    MethodBody::new(instructions)
}

/// Body implementing a winning role member: a call to its code function,
/// or a trivial accessor over a backing field planned on the composition
fn role_member_body(
    plan: &mut CompositionPlan,
    composition: &TypeDefinition,
    member: &ContributedMember,
) -> WeaveResult<MethodBody> {
    let MemberOrigin::Role { code, backing, .. } = &member.origin else {
        return Err(WeaveError::InternalError(format!(
            "{} is not a role member",
            member.describe()
        )));
    };
    if let Some(code) = code {
        return Ok(forwarding_body(code, member.parameters.len()));
    }
    let Some(backing) = backing else {
        return Err(WeaveError::InternalError(format!(
            "{} has neither a code function nor storage",
            member.describe()
        )));
    };
    Ok(backed_accessor_body(plan, composition, backing))
}

fn backed_accessor_body(
    plan: &mut CompositionPlan,
    composition: &TypeDefinition,
    backing: &FieldBacking,
) -> MethodBody {
    let name = backing_field_name(&backing.property);
    let field_ref = FieldRef::new(composition.self_reference(), &name, backing.ty.clone());
    let declared = composition.find_field(&name).is_some() || plan.fields.iter().any(|f| f.name == name);
    if !declared {
        let mut field = FieldDefinition::new(&name, backing.ty.clone());
        field.annotations.push(Annotation::CompilerGenerated);
        plan.fields.push(field);
    }
    let (getter, setter) = trivial_accessors(&backing.property, &field_ref);
    let accessor = if backing.is_setter { setter } else { getter };
    accessor.body.unwrap_or_else(MethodBody::empty)
}

/// Add override edges and a replacement body to a declared method. A
/// method that was not virtual becomes a sealed virtual slot.
pub(super) fn apply_patch(method: &mut MethodDefinition, patch: MethodPatch) {
    for edge in patch.overrides {
        if !method.overrides.contains(&edge) {
            method.overrides.push(edge);
        }
    }
    if !method.overrides.is_empty() && !method.flags.is_virtual {
        method.flags.is_virtual = true;
        method.flags.is_final = true;
        method.flags.is_new_slot = true;
    }
    if let Some(body) = patch.body {
        method.flags.is_abstract = false;
        method.body = Some(body);
    }
}
