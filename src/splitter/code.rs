// Copyright 2025 Cowboy AI, LLC.

//! Code container: role bodies as static functions

use std::collections::{HashMap, HashSet};

use super::{code_name, INIT_NAME};
use crate::errors::WeaveResult;
use crate::messages::{MessageCode, OperationResult};
use crate::model::{
    Annotation, Instruction, MethodBody, MethodDefinition, MethodFlags, MethodKind, Parameter,
    TypeDefinition, TypeRef, Visibility,
};

/// Auto-properties of a role: properties whose accessors only load and
/// store one private field nothing else touches
#[derive(Debug, Clone, Default)]
pub(crate) struct BackedProperties {
    /// Storage fields
    pub fields: HashSet<String>,
    /// Accessor name -> (property name, is setter)
    pub accessors: HashMap<String, (String, bool)>,
}

pub(crate) fn auto_property_fields(role: &TypeDefinition) -> BackedProperties {
    let mut backed = BackedProperties::default();

    for property in &role.properties {
        let Some(getter) = property.getter.as_deref().and_then(|g| role.find_method_by_name(g)) else {
            continue;
        };
        let Some(field) = trivial_getter_field(getter, &role.name) else {
            continue;
        };
        let setter = property.setter.as_deref().and_then(|s| role.find_method_by_name(s));
        if let Some(setter) = setter {
            if trivial_setter_field(setter, &role.name) != Some(field) {
                continue;
            }
        }
        let accessors: Vec<&str> = property.accessors().collect();
        let storage = role
            .find_field(field)
            .filter(|f| !f.is_static && !f.visibility.is_public());
        let used_elsewhere = role
            .methods
            .iter()
            .filter(|m| !accessors.contains(&m.name.as_str()))
            .filter_map(|m| m.body.as_ref())
            .any(|b| b.field_refs().any(|r| r.name == field && r.targets(&role.name)));
        if storage.is_none() || used_elsewhere {
            continue;
        }

        backed.fields.insert(field.to_string());
        backed
            .accessors
            .insert(getter.name.clone(), (property.name.clone(), false));
        if let Some(setter) = setter {
            backed
                .accessors
                .insert(setter.name.clone(), (property.name.clone(), true));
        }
    }
    backed
}

fn trivial_getter_field<'a>(method: &'a MethodDefinition, role: &str) -> Option<&'a str> {
    if !method.visibility.is_public() || !method.is_instance_member() || !method.parameters.is_empty() {
        return None;
    }
    match method.body.as_ref()?.instructions.as_slice() {
        [Instruction::LoadArg(0), Instruction::LoadField(f), Instruction::Ret] if f.targets(role) => {
            Some(f.name.as_str())
        }
        _ => None,
    }
}

fn trivial_setter_field<'a>(method: &'a MethodDefinition, role: &str) -> Option<&'a str> {
    if !method.visibility.is_public() || !method.is_instance_member() || method.parameters.len() != 1 {
        return None;
    }
    match method.body.as_ref()?.instructions.as_slice() {
        [Instruction::LoadArg(0), Instruction::LoadArg(1), Instruction::StoreField(f), Instruction::Ret]
            if f.targets(role) =>
        {
            Some(f.name.as_str())
        }
        _ => None,
    }
}

/// Build `R/Code`
pub(super) fn build_code(
    role: &TypeDefinition,
    backed: &BackedProperties,
    result: &mut OperationResult,
) -> WeaveResult<TypeDefinition> {
    let self_type = role.self_reference();
    let mut code = TypeDefinition::class(code_name(&role.name));
    code.is_abstract = true;
    code.is_sealed = true;
    code.generic_parameters = role.generic_parameters.clone();
    code.declaring_type = Some(role.name.clone());
    code.annotations.push(Annotation::CompilerGenerated);

    for field in role.fields.iter().filter(|f| f.is_static) {
        result.report(
            MessageCode::StaticMemberRelocated,
            format!("static field {}::{} moved to {}", role.name, field.name, code.name),
        );
        let mut moved = field.clone();
        if moved.visibility == Visibility::Private {
            moved.visibility = Visibility::Internal;
        }
        code.fields.push(moved);
    }

    let mut has_init = false;
    for method in &role.methods {
        match method.kind {
            MethodKind::Constructor => {
                let body = method.body.clone().unwrap_or_else(MethodBody::empty);
                code.add_method(init_function(strip_base_call(body), &self_type))?;
                has_init = true;
            }
            MethodKind::StaticConstructor => code.add_method(method.clone())?,
            MethodKind::Normal if method.flags.is_static => {
                if !method.has_annotation(&Annotation::CompilerGenerated) {
                    result.report(
                        MessageCode::StaticMemberRelocated,
                        format!(
                            "static member {}::{} is only reachable through {}",
                            role.name, method.name, code.name
                        ),
                    );
                }
                code.add_method(method.clone())?;
            }
            MethodKind::Normal => {
                if backed.accessors.contains_key(&method.name) {
                    continue;
                }
                let Some(body) = &method.body else { continue };
                code.add_method(code_function(method, body.clone(), &self_type))?;
            }
        }
    }
    if !has_init {
        code.add_method(init_function(MethodBody::empty(), &self_type))?;
    }

    for field in role
        .fields
        .iter()
        .filter(|f| !f.is_static && f.visibility.is_public())
    {
        let field_ref = field.reference(self_type.clone());
        let mut getter = MethodDefinition::new(format!("get_{}", field.name), field.ty.clone());
        getter.body = Some(MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadField(field_ref.clone()),
            Instruction::Ret,
        ]));
        code.add_method(code_function(&getter, getter.body.clone().unwrap_or_default(), &self_type))?;

        if !field.is_init_only {
            let mut setter = MethodDefinition::new(format!("set_{}", field.name), TypeRef::Void);
            setter.parameters.push(Parameter::new("value", field.ty.clone()));
            let body = MethodBody::new(vec![
                Instruction::LoadArg(0),
                Instruction::LoadArg(1),
                Instruction::StoreField(field_ref),
                Instruction::Ret,
            ]);
            code.add_method(code_function(&setter, body, &self_type))?;
        }
    }

    Ok(code)
}

fn static_flags() -> MethodFlags {
    MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    }
}

/// Static function with the instance as explicit first parameter. Argument
/// positions are unchanged: the instance was already argument 0.
fn code_function(method: &MethodDefinition, body: MethodBody, self_type: &TypeRef) -> MethodDefinition {
    let mut function = MethodDefinition::new(method.name.clone(), method.return_type.clone());
    function.flags = static_flags();
    function.visibility = Visibility::Public;
    function.generic_arity = method.generic_arity;
    function.parameters.push(Parameter::new("self", self_type.clone()));
    function.parameters.extend(method.parameters.iter().cloned());
    function.body = Some(body);
    function
}

fn init_function(body: MethodBody, self_type: &TypeRef) -> MethodDefinition {
    let mut init = MethodDefinition::new(INIT_NAME, TypeRef::Void);
    init.flags = static_flags();
    init.parameters.push(Parameter::new("self", self_type.clone()));
    init.body = Some(body);
    init
}

/// Remove the call to the root constructor (and the instance load feeding it)
fn strip_base_call(mut body: MethodBody) -> MethodBody {
    let Some(index) = body.constructor_call_index(crate::model::ROOT_TYPE_NAME) else {
        return body;
    };
    if index > 0 && body.instructions[index - 1] == Instruction::LoadArg(0) {
        body.instructions.drain(index - 1..=index);
    } else {
        body.instructions[index] = Instruction::Pop;
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeBuilder;
    use crate::model::{FieldRef, MethodRef};

    fn role() -> TypeBuilder {
        TypeBuilder::new(TypeDefinition::class("R"))
    }

    #[test]
    fn test_auto_property_detection() {
        let ty = role().auto_property("Name", TypeRef::String).build();
        let backed = auto_property_fields(&ty);
        assert!(backed.fields.contains("<Name>k__BackingField"));
        assert_eq!(backed.accessors.get("set_Name"), Some(&("Name".to_string(), true)));
    }

    #[test]
    fn test_field_used_elsewhere_is_not_auto() {
        let field = FieldRef::new(TypeRef::named("R"), "<Name>k__BackingField", TypeRef::String);
        let ty = role()
            .auto_property("Name", TypeRef::String)
            .method("Peek", TypeRef::String, |m| {
                m.body(vec![
                    Instruction::LoadArg(0),
                    Instruction::LoadField(field),
                    Instruction::Ret,
                ])
            })
            .build();
        assert!(auto_property_fields(&ty).fields.is_empty());
    }

    #[test]
    fn test_constructor_becomes_init_without_base_call() {
        let field = FieldRef::new(TypeRef::named("R"), "n", TypeRef::Int32);
        let ty = role()
            .field("n", TypeRef::Int32)
            .constructor(|c| {
                c.body(vec![
                    Instruction::LoadArg(0),
                    Instruction::Call(MethodRef::root_constructor()),
                    Instruction::LoadArg(0),
                    Instruction::LoadInt(5),
                    Instruction::StoreField(field.clone()),
                    Instruction::Ret,
                ])
            })
            .build();
        let mut result = OperationResult::new();
        let code = build_code(&ty, &BackedProperties::default(), &mut result).unwrap();
        let init = code.find_method(INIT_NAME, &[TypeRef::named("R")], 0).unwrap();
        assert!(init.flags.is_static);
        assert_eq!(
            init.body.as_ref().unwrap().instructions,
            vec![
                Instruction::LoadArg(0),
                Instruction::LoadInt(5),
                Instruction::StoreField(field),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_role_without_constructor_gets_noop_init() {
        let ty = role().build();
        let mut result = OperationResult::new();
        let code = build_code(&ty, &BackedProperties::default(), &mut result).unwrap();
        let init = code.find_method(INIT_NAME, &[TypeRef::named("R")], 0).unwrap();
        assert_eq!(init.body, Some(MethodBody::empty()));
    }

    #[test]
    fn test_static_members_move_with_warning() {
        let ty = role()
            .method("Helper", TypeRef::Int32, |m| m.as_static().returns_int(3))
            .build();
        let mut result = OperationResult::new();
        let code = build_code(&ty, &BackedProperties::default(), &mut result).unwrap();
        assert!(code.find_method("Helper", &[], 0).is_some());
        assert!(result.has(MessageCode::StaticMemberRelocated));
    }

    #[test]
    fn test_generic_role_functions_take_open_contract() {
        let ty = TypeBuilder::new(TypeDefinition::class("Box`1"))
            .generic("T")
            .method("Get", TypeRef::TypeParam(0), |m| m.body(vec![Instruction::LoadNull, Instruction::Ret]))
            .build();
        let mut result = OperationResult::new();
        let code = build_code(&ty, &BackedProperties::default(), &mut result).unwrap();
        let self_type = TypeRef::instance("Box`1", vec![TypeRef::TypeParam(0)]);
        let get = code.find_method("Get", &[self_type], 0).unwrap();
        assert_eq!(get.return_type, TypeRef::TypeParam(0));
        assert_eq!(code.generic_parameters.len(), 1);
    }
}
