// Copyright 2025 Cowboy AI, LLC.

//! Module-wide reference rewriting after roles are split

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::code::BackedProperties;
use crate::model::{
    FieldRef, Instruction, MethodBody, MethodDefinition, MethodRef, Module, TypeDefinition,
    TypeRef,
};

type Signature = (String, Vec<TypeRef>, u16);

fn signature(method: &MethodDefinition) -> Signature {
    (method.name.clone(), method.parameter_types(), method.generic_arity)
}

fn reference_signature(method: &MethodRef) -> Signature {
    (method.name.clone(), method.parameters.clone(), method.generic_arity)
}

/// How references to one split role are redirected
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRewrite {
    role: String,
    state: String,
    code: String,
    self_type: TypeRef,
    accessor: MethodDefinition,
    contract_methods: HashSet<Signature>,
    code_functions: HashSet<Signature>,
    static_methods: HashSet<Signature>,
    instance_fields: HashSet<String>,
    static_fields: HashSet<String>,
}

impl RoleRewrite {
    pub(super) fn new(
        role: &TypeDefinition,
        contract: &TypeDefinition,
        accessor: &MethodDefinition,
        state: &TypeDefinition,
        code: &TypeDefinition,
        backed: &BackedProperties,
    ) -> Self {
        Self {
            role: role.name.clone(),
            state: state.name.clone(),
            code: code.name.clone(),
            self_type: role.self_reference(),
            accessor: accessor.clone(),
            contract_methods: contract.methods.iter().map(signature).collect(),
            code_functions: role
                .methods
                .iter()
                .filter(|m| m.is_instance_member() && m.body.is_some())
                .filter(|m| !backed.accessors.contains_key(&m.name))
                .map(signature)
                .collect(),
            static_methods: role
                .methods
                .iter()
                .filter(|m| m.flags.is_static && !m.is_constructor())
                .map(signature)
                .collect(),
            instance_fields: state.fields.iter().map(|f| f.name.clone()).collect(),
            static_fields: code.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }

    /// Role the rule applies to
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// Rewrites for every role split in a pass, applied once at the end
#[derive(Debug, Clone, Default)]
pub struct RewriteRules {
    roles: HashMap<String, RoleRewrite>,
}

impl RewriteRules {
    /// No rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rules of a split role
    pub fn add(&mut self, rule: RoleRewrite) {
        self.roles.insert(rule.role.clone(), rule);
    }

    /// Whether no role was split
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Rewrite every body in the module. Returns how many instructions changed.
    pub fn apply(&self, module: &mut Module) -> usize {
        if self.roles.is_empty() {
            return 0;
        }
        let mut changed = 0;
        for ty in module.types_mut() {
            for method in &mut ty.methods {
                if let Some(body) = method.body.as_mut() {
                    changed += self.rewrite_body(body);
                }
            }
        }
        debug!(roles = self.roles.len(), changed, "role references rewritten");
        changed
    }

    fn rule_for(&self, declaring: &TypeRef) -> Option<&RoleRewrite> {
        declaring.definition_name().and_then(|name| self.roles.get(name))
    }

    fn rewrite_body(&self, body: &mut MethodBody) -> usize {
        let original = std::mem::take(&mut body.instructions);
        let mut rewritten = Vec::with_capacity(original.len());
        let mut changed = 0;

        for instruction in original {
            match instruction {
                Instruction::LoadField(field) => match self.state_field(&field) {
                    Some((accessor, moved)) => {
                        rewritten.push(Instruction::CallVirt(accessor));
                        rewritten.push(Instruction::LoadField(moved));
                        changed += 1;
                    }
                    None => rewritten.push(Instruction::LoadField(field)),
                },
                Instruction::StoreField(field) => match self.state_field(&field) {
                    Some((accessor, moved)) => {
                        let spill = body.add_local(field.ty.substitute(field.declaring.arguments()));
                        rewritten.push(Instruction::StoreLocal(spill));
                        rewritten.push(Instruction::CallVirt(accessor));
                        rewritten.push(Instruction::LoadLocal(spill));
                        rewritten.push(Instruction::StoreField(moved));
                        changed += 1;
                    }
                    None => rewritten.push(Instruction::StoreField(field)),
                },
                Instruction::LoadStaticField(field) => {
                    let (field, moved) = self.static_field(field);
                    changed += usize::from(moved);
                    rewritten.push(Instruction::LoadStaticField(field));
                }
                Instruction::StoreStaticField(field) => {
                    let (field, moved) = self.static_field(field);
                    changed += usize::from(moved);
                    rewritten.push(Instruction::StoreStaticField(field));
                }
                Instruction::Call(method) | Instruction::CallVirt(method)
                    if self.rule_for(&method.declaring).is_some() && !method.is_constructor() =>
                {
                    rewritten.push(self.call(method));
                    changed += 1;
                }
                other => rewritten.push(other),
            }
        }

        body.instructions = rewritten;
        changed
    }

    /// Accessor call and state-container field replacing an instance field of a role
    fn state_field(&self, field: &FieldRef) -> Option<(MethodRef, FieldRef)> {
        let rule = self.rule_for(&field.declaring)?;
        if !rule.instance_fields.contains(&field.name) {
            return None;
        }
        let accessor = rule.accessor.reference(field.declaring.clone());
        let moved = FieldRef {
            declaring: field.declaring.with_definition(rule.state.clone()),
            ..field.clone()
        };
        Some((accessor, moved))
    }

    fn static_field(&self, field: FieldRef) -> (FieldRef, bool) {
        match self.rule_for(&field.declaring) {
            Some(rule) if rule.static_fields.contains(&field.name) => (
                FieldRef {
                    declaring: field.declaring.with_definition(rule.code.clone()),
                    ..field
                },
                true,
            ),
            _ => (field, false),
        }
    }

    fn call(&self, method: MethodRef) -> Instruction {
        let Some(rule) = self.rule_for(&method.declaring) else {
            return Instruction::Call(method);
        };
        let signature = reference_signature(&method);
        if rule.static_methods.contains(&signature) {
            return Instruction::Call(MethodRef {
                declaring: method.declaring.with_definition(rule.code.clone()),
                ..method
            });
        }
        if rule.contract_methods.contains(&signature) {
            return Instruction::CallVirt(method);
        }
        if rule.code_functions.contains(&signature) {
            let mut parameters = vec![rule.self_type.clone()];
            parameters.extend(method.parameters.iter().cloned());
            return Instruction::Call(MethodRef {
                declaring: method.declaring.with_definition(rule.code.clone()),
                parameters,
                ..method
            });
        }
        Instruction::CallVirt(method)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::ModuleBuilder;
    use crate::messages::OperationResult;
    use crate::model::{FieldRef, Instruction, MethodRef, TypeRef};
    use crate::splitter::{split_role, RewriteRules};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_access_goes_through_accessor() {
        let field = FieldRef::new(TypeRef::named("R"), "n", TypeRef::Int32);
        let mut module = ModuleBuilder::new("M")
            .role("R", |r| {
                r.field("n", TypeRef::Int32)
                    .method("Bump", TypeRef::Void, |m| {
                        m.body(vec![
                            Instruction::LoadArg(0),
                            Instruction::LoadInt(1),
                            Instruction::StoreField(field.clone()),
                            Instruction::Ret,
                        ])
                    })
                    .method("Get", TypeRef::Int32, |m| {
                        m.body(vec![
                            Instruction::LoadArg(0),
                            Instruction::LoadField(field.clone()),
                            Instruction::Ret,
                        ])
                    })
            })
            .build()
            .unwrap();
        let mut result = OperationResult::new();
        let (_, rule) = split_role(&mut module, "R", &mut result).unwrap();
        let mut rules = RewriteRules::new();
        rules.add(rule);
        assert_eq!(rules.apply(&mut module), 2);

        let code = module.get_type("R/Code").unwrap();
        let accessor = MethodRef::new(
            TypeRef::named("R"),
            "<R>GetState",
            vec![],
            TypeRef::named("R/State"),
        );
        let moved = FieldRef::new(TypeRef::named("R/State"), "n", TypeRef::Int32);

        let bump = code.find_method_by_name("Bump").unwrap().body.as_ref().unwrap();
        assert_eq!(bump.locals, vec![TypeRef::Int32]);
        assert_eq!(
            bump.instructions,
            vec![
                Instruction::LoadArg(0),
                Instruction::LoadInt(1),
                Instruction::StoreLocal(0),
                Instruction::CallVirt(accessor.clone()),
                Instruction::LoadLocal(0),
                Instruction::StoreField(moved.clone()),
                Instruction::Ret,
            ]
        );
        let get = code.find_method_by_name("Get").unwrap().body.as_ref().unwrap();
        assert_eq!(
            get.instructions,
            vec![
                Instruction::LoadArg(0),
                Instruction::CallVirt(accessor),
                Instruction::LoadField(moved),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_calls_are_redirected() {
        let helper = MethodRef::new(TypeRef::named("R"), "Helper", vec![], TypeRef::Int32);
        let public = MethodRef::new(TypeRef::named("R"), "Public", vec![], TypeRef::Int32);
        let shared = MethodRef::new(TypeRef::named("R"), "Shared", vec![], TypeRef::Int32);
        let mut module = ModuleBuilder::new("M")
            .role("R", |r| {
                r.method("Helper", TypeRef::Int32, |m| m.private().returns_int(1))
                    .method("Shared", TypeRef::Int32, |m| m.as_static().returns_int(2))
                    .method("Public", TypeRef::Int32, |m| {
                        m.body(vec![
                            Instruction::LoadArg(0),
                            Instruction::Call(helper.clone()),
                            Instruction::Call(shared.clone()),
                            Instruction::Add,
                            Instruction::Ret,
                        ])
                    })
            })
            .class("User", |c| {
                c.method("Use", TypeRef::Int32, |m| {
                    m.param("r", TypeRef::named("R")).body(vec![
                        Instruction::LoadArg(1),
                        Instruction::Call(public.clone()),
                        Instruction::Ret,
                    ])
                })
            })
            .build()
            .unwrap();
        let mut result = OperationResult::new();
        let (_, rule) = split_role(&mut module, "R", &mut result).unwrap();
        let mut rules = RewriteRules::new();
        rules.add(rule);
        rules.apply(&mut module);

        let code = module.get_type("R/Code").unwrap();
        let body = &code
            .find_method("Public", &[TypeRef::named("R")], 0)
            .unwrap()
            .body
            .as_ref()
            .unwrap()
            .instructions;
        assert_eq!(
            body[1],
            Instruction::Call(MethodRef::new(
                TypeRef::named("R/Code"),
                "Helper",
                vec![TypeRef::named("R")],
                TypeRef::Int32
            ))
        );
        assert_eq!(
            body[2],
            Instruction::Call(MethodRef::new(TypeRef::named("R/Code"), "Shared", vec![], TypeRef::Int32))
        );

        let user = module.get_type("User").unwrap();
        let body = &user.methods[0].body.as_ref().unwrap().instructions;
        assert_eq!(body[1], Instruction::CallVirt(public));
    }
}
