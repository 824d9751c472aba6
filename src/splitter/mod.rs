// Copyright 2025 Cowboy AI, LLC.

//! Role splitter
//!
//! A role is split into three types nested under its original name:
//!
//! - the capability contract: the role itself, turned into an interface
//!   with its public instance surface plus a hidden state accessor
//! - the state container `R/State` holding the per-instance fields
//! - the code container `R/Code` holding every body as a static function
//!   that takes the instance (typed as the contract) first
//!
//! References to the role's fields and methods anywhere in the module are
//! fixed up afterwards by [`RewriteRules`], once every role is split.

mod code;
mod contract;
mod rewrite;
mod state;

pub use rewrite::{RewriteRules, RoleRewrite};

use std::collections::HashMap;
use tracing::debug;

use crate::errors::WeaveResult;
use crate::member_model::AccessorOf;
use crate::messages::{MessageCode, OperationResult};
use crate::model::{
    nested_name, Annotation, Instruction, MethodDefinition, MethodRef, Module, PropertyDefinition,
    EventDefinition, TypeDefinition, TypeKind, TypeRef, CONSTRUCTOR_NAME,
};
use crate::registry::RoleRegistry;

/// Name of the code-container function holding a role's constructor body
pub const INIT_NAME: &str = "Init";

/// Full name of a role's state container
pub fn state_name(role: &str) -> String {
    nested_name(role, "State")
}

/// Full name of a role's code container
pub fn code_name(role: &str) -> String {
    nested_name(role, "Code")
}

/// Name of the hidden state accessor on a role's contract
pub fn state_accessor_name(role: &str) -> String {
    format!("<{role}>GetState")
}

/// A contract member and where its implementation lives
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMember {
    /// Contract declaration, in the role frame
    pub method: MethodDefinition,
    /// Code-container function, declared on the open code container
    pub code: Option<MethodRef>,
    /// No implementation in the role
    pub is_abstract: bool,
    /// Only delegates to the root type's implementation
    pub is_base_method: bool,
    /// Accessor of an auto-property: no code function, storage moves to the composition
    pub field_backed: bool,
    /// Property or event owning the accessor
    pub accessor_of: Option<AccessorOf>,
}

/// Result of splitting one role
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRole {
    /// Role (now contract) full name
    pub name: String,
    /// Number of generic parameters
    pub arity: usize,
    /// Position of the self-type parameter
    pub self_parameter: Option<u16>,
    /// State container full name
    pub state: String,
    /// Code container full name
    pub code: String,
    /// Hidden state accessor declared on the contract
    pub accessor: MethodDefinition,
    /// Contract members in declaration order
    pub members: Vec<CatalogMember>,
    /// Contract properties
    pub properties: Vec<PropertyDefinition>,
    /// Contract events
    pub events: Vec<EventDefinition>,
}

impl SplitRole {
    /// State container as seen from a composition composing `role`
    pub fn state_type(&self, role: &TypeRef) -> TypeRef {
        role.with_definition(self.state.clone())
    }

    /// Code container as seen from a composition composing `role`
    pub fn code_type(&self, role: &TypeRef) -> TypeRef {
        role.with_definition(self.code.clone())
    }

    /// Default constructor of the state container
    pub fn state_constructor(&self, role: &TypeRef) -> MethodRef {
        MethodRef::new(self.state_type(role), CONSTRUCTOR_NAME, Vec::new(), TypeRef::Void)
    }

    /// `Init` function of the code container
    pub fn init_function(&self, role: &TypeRef) -> MethodRef {
        MethodRef::new(
            self.code_type(role),
            INIT_NAME,
            vec![TypeRef::open(self.name.clone(), self.arity)],
            TypeRef::Void,
        )
    }

    /// Contract state accessor
    pub fn accessor_ref(&self, role: &TypeRef) -> MethodRef {
        self.accessor.reference(role.clone())
    }

    /// Code function of a member, as seen from a composition composing `role`
    pub fn code_function(&self, member: &CatalogMember, role: &TypeRef) -> Option<MethodRef> {
        member.code.as_ref().map(|code| MethodRef {
            declaring: self.code_type(role),
            ..code.clone()
        })
    }

    /// Property declared by the contract
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Event declared by the contract
    pub fn event(&self, name: &str) -> Option<&EventDefinition> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Find a member by signature, in the role frame
    pub fn find_member(&self, name: &str, parameters: &[TypeRef], generic_arity: u16) -> Option<&CatalogMember> {
        self.members
            .iter()
            .find(|m| m.method.same_signature(name, parameters, generic_arity))
    }
}

/// Split results of every role in a module, by role name
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: HashMap<String, SplitRole>,
}

impl RoleCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a split role
    pub fn insert(&mut self, role: SplitRole) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Split result of a role
    pub fn get(&self, name: &str) -> Option<&SplitRole> {
        self.roles.get(name)
    }

    /// Split result of the role a reference points to
    pub fn resolve(&self, role: &TypeRef) -> Option<&SplitRole> {
        role.definition_name().and_then(|name| self.roles.get(name))
    }

    /// Number of split roles
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no role has been split
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Structural checks for every role, run before anything is mutated
pub fn check_roles(module: &Module, registry: &RoleRegistry, result: &mut OperationResult) {
    for entry in registry.roles() {
        let Some(role) = module.get_type(&entry.name) else {
            continue;
        };
        check_role(role, result);
    }

    for ty in module.types() {
        for method in &ty.methods {
            let Some(body) = &method.body else { continue };
            for instruction in &body.instructions {
                let Instruction::NewObj(target) = instruction else {
                    continue;
                };
                if let Some(role) = target.declaring.definition_name().filter(|r| registry.is_role(r)) {
                    result.report(
                        MessageCode::RoleInstantiated,
                        format!("{}::{} instantiates role {role}", ty.name, method.name),
                    );
                }
            }
        }
    }
}

fn check_role(role: &TypeDefinition, result: &mut OperationResult) {
    if role.kind != TypeKind::Class {
        result.report(
            MessageCode::RoleNotAClass,
            format!("role {} must be a class", role.name),
        );
    }
    if let Some(base) = role.base.as_ref().filter(|b| !b.is_root()) {
        result.report(
            MessageCode::RoleWithBaseClass,
            format!("role {} derives from {base}, roles may only derive from object", role.name),
        );
    }

    let constructors: Vec<&MethodDefinition> = role.constructors().collect();
    if constructors.len() > 1 || constructors.iter().any(|c| !c.parameters.is_empty()) {
        result.report(
            MessageCode::RoleWithParameterizedConstructor,
            format!("role {} may only declare one parameterless constructor", role.name),
        );
    }

    for method in &role.methods {
        if method.flags.is_interop {
            result.report(
                MessageCode::RoleWithInteropMember,
                format!("role {} declares the interop member {}", role.name, method.name),
            );
        }
        if method.has_annotation(&Annotation::Placeholder) {
            result.report(
                MessageCode::RoleWithPlaceholder,
                format!("role {} declares the placeholder {}", role.name, method.name),
            );
        }
        for target in &method.overrides {
            if !target.declaring.is_root() && !target.targets(&role.name) {
                result.report(
                    MessageCode::RoleWithExplicitImplementation,
                    format!(
                        "role {} explicitly implements {target} in {}",
                        role.name, method.name
                    ),
                );
            }
        }
    }

    let placeholder_elsewhere = role
        .fields
        .iter()
        .map(|f| (&f.name, &f.annotations))
        .chain(role.properties.iter().map(|p| (&p.name, &p.annotations)))
        .chain(role.events.iter().map(|e| (&e.name, &e.annotations)))
        .find(|(_, annotations)| annotations.contains(&Annotation::Placeholder));
    if let Some((name, _)) = placeholder_elsewhere {
        result.report(
            MessageCode::RoleWithPlaceholder,
            format!("role {} declares the placeholder {name}", role.name),
        );
    }
}

/// Split a role in place: the role becomes its contract and the state and
/// code containers are added to the module
pub fn split_role(
    module: &mut Module,
    name: &str,
    result: &mut OperationResult,
) -> WeaveResult<(SplitRole, RoleRewrite)> {
    let role = module.require_type(name)?.clone();
    let backed = code::auto_property_fields(&role);

    let state = state::build_state(&role, &backed, result);
    let code = code::build_code(&role, &backed, result)?;
    let (contract, relocated) = contract::build_contract(&role, &state)?;
    let accessor = contract::state_accessor(&role, &state);

    let mut members: Vec<CatalogMember> = Vec::new();
    for method in contract.methods.iter().filter(|m| m.name != accessor.name) {
        let original = role.find_method(&method.name, &method.parameter_types(), method.generic_arity);
        let relocated_field = relocated.iter().any(|r| r == &method.name);
        let field_backed = backed.accessors.contains_key(&method.name);
        let code_function = if field_backed {
            None
        } else {
            let mut parameters = vec![role.self_reference()];
            parameters.extend(method.parameter_types());
            code.find_method(&method.name, &parameters, method.generic_arity)
                .map(|f| f.reference(code.self_reference()))
        };
        let is_abstract = original.is_some_and(|m| m.body.is_none()) && !relocated_field;
        let accessor_of = contract
            .property_of_accessor(&method.name)
            .map(|p| AccessorOf::Property(p.name.clone()))
            .or_else(|| {
                contract
                    .event_of_accessor(&method.name)
                    .map(|e| AccessorOf::Event(e.name.clone()))
            });
        members.push(CatalogMember {
            method: method.clone(),
            code: code_function,
            is_abstract,
            is_base_method: original.is_some_and(is_base_method),
            field_backed,
            accessor_of,
        });
    }

    let rewrite = RoleRewrite::new(&role, &contract, &accessor, &state, &code, &backed);

    let split = SplitRole {
        name: role.name.clone(),
        arity: role.arity(),
        self_parameter: role.self_parameter(),
        state: state.name.clone(),
        code: code.name.clone(),
        accessor,
        members,
        properties: contract.properties.clone(),
        events: contract.events.clone(),
    };

    debug!(
        role = %split.name,
        members = split.members.len(),
        "role split into contract, state and code"
    );

    *module.require_type_mut(name)? = contract;
    module.add_type(state)?;
    module.add_type(code)?;
    Ok((split, rewrite))
}

/// Whether a role method only delegates to the root type: annotated
/// `BaseMethod`, or a body that is exactly a non-virtual call to the
/// same-signature method of `object`
pub fn is_base_method(method: &MethodDefinition) -> bool {
    if method.has_annotation(&Annotation::BaseMethod) {
        return true;
    }
    let Some(body) = &method.body else {
        return false;
    };
    let argument_count = method.parameters.len() + 1;
    let instructions = &body.instructions;
    if instructions.len() != argument_count + 2 {
        return false;
    }
    let loads_arguments = instructions[..argument_count]
        .iter()
        .enumerate()
        .all(|(i, instr)| *instr == Instruction::LoadArg(i as u16));
    let calls_root = matches!(
        &instructions[argument_count],
        Instruction::Call(target) if target.declaring.is_root()
            && target.name == method.name
            && target.parameters == method.parameter_types()
    );
    loads_arguments && calls_root && instructions[argument_count + 1] == Instruction::Ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModuleBuilder;
    use crate::model::{Parameter, Visibility};

    fn split(module: &mut Module, name: &str) -> (SplitRole, OperationResult) {
        let mut result = OperationResult::new();
        let (split, _) = split_role(module, name, &mut result).unwrap();
        (split, result)
    }

    #[test]
    fn test_split_produces_three_types() {
        let mut module = ModuleBuilder::new("M")
            .role("Ns.Counter", |r| {
                r.field("count", TypeRef::Int32)
                    .method("Next", TypeRef::Int32, |m| m.returns_int(1))
                    .method("Reset", TypeRef::Void, |m| m.private().empty_body())
            })
            .build()
            .unwrap();
        let (split, result) = split(&mut module, "Ns.Counter");
        assert!(result.is_empty());

        let contract = module.get_type("Ns.Counter").unwrap();
        assert!(contract.is_interface());
        assert!(contract.methods.iter().all(|m| m.flags.is_abstract && m.body.is_none()));
        assert!(contract.find_method_by_name("Reset").is_none());
        assert!(contract.find_method_by_name("<Ns.Counter>GetState").is_some());

        let state = module.get_type("Ns.Counter/State").unwrap();
        assert_eq!(state.fields[0].name, "count");
        assert_eq!(state.fields[0].visibility, Visibility::Internal);

        let code = module.get_type("Ns.Counter/Code").unwrap();
        assert!(code.is_abstract && code.is_sealed);
        assert!(code.find_method("Init", &[TypeRef::named("Ns.Counter")], 0).is_some());
        assert!(code.find_method("Next", &[TypeRef::named("Ns.Counter")], 0).is_some());
        assert!(code.find_method("Reset", &[TypeRef::named("Ns.Counter")], 0).is_some());

        assert_eq!(split.members.len(), 1);
        assert!(split.members[0].code.is_some());
        assert!(!split.members[0].is_abstract);
    }

    #[test]
    fn test_check_rejects_malformed_roles() {
        let module = ModuleBuilder::new("M")
            .class("Base", |c| c)
            .role("R", |r| {
                r.base("Base")
                    .constructor(|c| c.param("x", TypeRef::Int32))
                    .method("Native", TypeRef::Void, |m| m.interop())
                    .method("Hole", TypeRef::Void, |m| {
                        m.annotate(Annotation::Placeholder).empty_body()
                    })
            })
            .class("User", |c| {
                c.method("Make", TypeRef::Object, |m| {
                    m.as_static().body(vec![
                        Instruction::NewObj(MethodRef::new(
                            TypeRef::named("R"),
                            CONSTRUCTOR_NAME,
                            vec![],
                            TypeRef::Void,
                        )),
                        Instruction::Ret,
                    ])
                })
            })
            .build()
            .unwrap();
        let mut result = OperationResult::new();
        let registry = RoleRegistry::build(&module, &mut result);
        check_roles(&module, &registry, &mut result);
        assert_eq!(result.numbers(), vec![302, 303, 304, 305, 309]);
    }

    #[test]
    fn test_base_method_detection() {
        let mut method = MethodDefinition::new("Equals", TypeRef::Bool);
        method.parameters.push(Parameter::new("obj", TypeRef::Object));
        method.body = Some(crate::model::MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadArg(1),
            Instruction::Call(MethodRef::new(
                TypeRef::Object,
                "Equals",
                vec![TypeRef::Object],
                TypeRef::Bool,
            )),
            Instruction::Ret,
        ]));
        assert!(is_base_method(&method));

        let mut plain = MethodDefinition::new("ToString", TypeRef::String);
        plain.body = Some(crate::model::MethodBody::new(vec![
            Instruction::LoadString("x".into()),
            Instruction::Ret,
        ]));
        assert!(!is_base_method(&plain));
        plain.annotations.push(Annotation::BaseMethod);
        assert!(is_base_method(&plain));
    }
}
