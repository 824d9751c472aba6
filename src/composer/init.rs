// Copyright 2025 Cowboy AI, LLC.

//! Per-role state: the state field, the state accessor and constructor wiring

use super::CompositionPlan;
use crate::errors::{WeaveError, WeaveResult};
use crate::messages::{MessageCode, OperationResult};
use crate::model::{
    Annotation, FieldDefinition, FieldRef, Instruction, MethodBody, MethodDefinition, MethodFlags,
    MethodKind, MethodRef, TypeDefinition, TypeRef, Visibility, CONSTRUCTOR_NAME,
};
use crate::splitter::RoleCatalog;

/// How one composed role's state is created in the composition's constructors
#[derive(Debug, Clone, PartialEq)]
pub struct RoleWiring {
    /// Field holding the state container
    pub state_field: FieldRef,
    /// Default constructor of the state container
    pub state_constructor: MethodRef,
    /// `Init` function of the code container
    pub init: MethodRef,
}

impl RoleWiring {
    /// `this.<R>State = new R/State(); R/Code.Init(this);`
    fn instructions(&self) -> [Instruction; 5] {
        [
            Instruction::LoadArg(0),
            Instruction::NewObj(self.state_constructor.clone()),
            Instruction::StoreField(self.state_field.clone()),
            Instruction::LoadArg(0),
            Instruction::Call(self.init.clone()),
        ]
    }
}

/// Name of the field holding a composed role's state
pub(super) fn state_field_name(role: &TypeRef) -> String {
    format!("<{role}>State")
}

/// Name of the state accessor implementation for a composed role
pub(super) fn accessor_impl_name(role: &TypeRef, accessor: &str) -> String {
    format!("{role}.{accessor}")
}

pub(super) fn plan_roles(
    plan: &mut CompositionPlan,
    composition: &TypeDefinition,
    catalog: &RoleCatalog,
    composed: &[TypeRef],
    result: &mut OperationResult,
) -> WeaveResult<()> {
    let is_role = composition.interfaces.iter().any(TypeRef::is_role_marker);
    let self_type = composition.self_reference();

    for role in composed {
        let split = catalog
            .resolve(role)
            .ok_or_else(|| WeaveError::TypeNotFound(format!("split role {role}")))?;

        let accessor_name = accessor_impl_name(role, &split.accessor.name);
        let composed_twice = composition.find_method_by_name(&accessor_name).is_some()
            || plan.methods.iter().any(|m| m.name == accessor_name);
        if composed_twice {
            result.report(
                MessageCode::Conflict,
                format!(
                    "{} composes {role} both directly and through another role",
                    composition.name
                ),
            );
            continue;
        }

        let state_type = split.state_type(role);
        let field = FieldDefinition::new(state_field_name(role), state_type.clone());
        let state_field = field.reference(self_type.clone());

        let mut accessor = MethodDefinition::new(accessor_name, state_type);
        accessor.visibility = if is_role {
            Visibility::Public
        } else {
            Visibility::Private
        };
        accessor.flags = MethodFlags {
            is_virtual: true,
            is_final: true,
            is_new_slot: true,
            ..MethodFlags::default()
        };
        accessor.overrides.push(split.accessor_ref(role));
        accessor.annotations.push(Annotation::CompilerGenerated);
        accessor.body = Some(MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadField(state_field.clone()),
            Instruction::Ret,
        ]));

        plan.add_interfaces.push(role.clone());
        plan.fields.push(field);
        plan.methods.push(accessor);
        plan.wiring.push(RoleWiring {
            state_field,
            state_constructor: split.state_constructor(role),
            init: split.init_function(role),
        });
    }
    Ok(())
}

/// Insert role initialization after the base-constructor call of every
/// constructor that does not delegate to a sibling constructor. A default
/// constructor is added when the type declares none.
pub(super) fn wire_constructors(composition: &mut TypeDefinition, base: &TypeRef, wiring: &[RoleWiring]) {
    if wiring.is_empty() {
        return;
    }
    let own = composition.name.clone();
    let base_name = base.definition_name().unwrap_or_default().to_string();
    let init: Vec<Instruction> = wiring.iter().flat_map(RoleWiring::instructions).collect();

    let mut wired = false;
    for ctor in composition
        .methods
        .iter_mut()
        .filter(|m| m.kind == MethodKind::Constructor)
    {
        wired = true;
        let Some(body) = ctor.body.as_mut() else { continue };
        if body.constructor_call_index(&own).is_some() {
            continue;
        }
        let at = body
            .constructor_call_index(&base_name)
            .map_or(0, |index| index + 1);
        body.instructions.splice(at..at, init.iter().cloned());
    }

    if !wired {
        let mut instructions = vec![
            Instruction::LoadArg(0),
            Instruction::Call(MethodRef::new(base.clone(), CONSTRUCTOR_NAME, Vec::new(), TypeRef::Void)),
        ];
        instructions.extend(init);
        instructions.push(Instruction::Ret);
        composition
            .methods
            .push(MethodDefinition::constructor(MethodBody::new(instructions)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wiring(role: &str) -> RoleWiring {
        RoleWiring {
            state_field: FieldRef::new(
                TypeRef::named("C"),
                state_field_name(&TypeRef::named(role)),
                TypeRef::named(format!("{role}/State")),
            ),
            state_constructor: MethodRef::new(
                TypeRef::named(format!("{role}/State")),
                CONSTRUCTOR_NAME,
                vec![],
                TypeRef::Void,
            ),
            init: MethodRef::new(
                TypeRef::named(format!("{role}/Code")),
                "Init",
                vec![TypeRef::named(role)],
                TypeRef::Void,
            ),
        }
    }

    #[test]
    fn test_default_constructor_is_synthesized() {
        let mut c = TypeDefinition::class("C");
        wire_constructors(&mut c, &TypeRef::Object, &[wiring("A"), wiring("B")]);
        let body = &c.constructors().next().unwrap().body.as_ref().unwrap().instructions;
        assert_eq!(body.len(), 2 + 5 + 5 + 1);
        assert_eq!(body[1], Instruction::Call(MethodRef::root_constructor()));
        assert!(matches!(&body[3], Instruction::NewObj(m) if m.targets("A/State")));
        assert!(matches!(&body[8], Instruction::NewObj(m) if m.targets("B/State")));
    }

    #[test]
    fn test_wiring_follows_base_call_and_skips_sibling_delegation() {
        let mut c = TypeDefinition::class("C");
        let mut own = MethodDefinition::constructor(MethodBody::new(vec![
            Instruction::LoadInt(7),
            Instruction::Pop,
            Instruction::LoadArg(0),
            Instruction::Call(MethodRef::root_constructor()),
            Instruction::Ret,
        ]));
        own.parameters.push(crate::model::Parameter::new("x", TypeRef::Int32));
        let delegating = MethodDefinition::constructor(MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadInt(1),
            Instruction::Call(MethodRef::new(
                TypeRef::named("C"),
                CONSTRUCTOR_NAME,
                vec![TypeRef::Int32],
                TypeRef::Void,
            )),
            Instruction::Ret,
        ]));
        c.methods.push(own);
        c.methods.push(delegating);

        wire_constructors(&mut c, &TypeRef::Object, &[wiring("A")]);
        let bodies: Vec<&Vec<Instruction>> = c
            .constructors()
            .map(|m| &m.body.as_ref().unwrap().instructions)
            .collect();
        assert_eq!(bodies[0].len(), 10);
        assert!(matches!(&bodies[0][5], Instruction::NewObj(_)));
        assert_eq!(bodies[1].len(), 4);
    }
}
