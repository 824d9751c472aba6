// Copyright 2025 Cowboy AI, LLC.

//! Member composer
//!
//! Turns the resolver's decisions for one composition into a
//! [`CompositionPlan`], then applies the plan to the module in one pass.
//! Planning only reads the module; nothing is mutated until [`apply`].

mod init;
mod methods;
mod properties;

use tracing::debug;

use crate::classifier::ConflictGroup;
use crate::errors::{WeaveError, WeaveResult};
use crate::messages::OperationResult;
use crate::model::{
    Annotation, EventDefinition, FieldDefinition, MethodBody, MethodDefinition, MethodRef, Module,
    PropertyDefinition, TypeDefinition, TypeRef,
};
use crate::registry::TypeEntry;
use crate::resolver::Resolution;
use crate::splitter::RoleCatalog;

pub use init::RoleWiring;

/// Change to a method the composition already declares
#[derive(Debug, Clone, PartialEq)]
pub struct MethodPatch {
    /// Method name
    pub name: String,
    /// Parameter types, identifying the overload
    pub parameters: Vec<TypeRef>,
    /// Method generic arity
    pub generic_arity: u16,
    /// Replacement body (placeholders)
    pub body: Option<MethodBody>,
    /// Override edges to add
    pub overrides: Vec<MethodRef>,
}

/// Everything one composition needs, decided before anything changes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionPlan {
    /// Composition type name
    pub composition: String,
    /// Fields to add
    pub fields: Vec<FieldDefinition>,
    /// Methods to add
    pub methods: Vec<MethodDefinition>,
    /// Changes to declared methods
    pub patches: Vec<MethodPatch>,
    /// Properties to declare
    pub properties: Vec<PropertyDefinition>,
    /// Events to declare
    pub events: Vec<EventDefinition>,
    /// Contracts to implement
    pub add_interfaces: Vec<TypeRef>,
    /// Views to drop from the interface list
    pub remove_interfaces: Vec<TypeRef>,
    /// Per-role state construction, in role order
    pub wiring: Vec<RoleWiring>,
}

impl CompositionPlan {
    fn new(composition: &str) -> Self {
        Self {
            composition: composition.to_string(),
            ..Self::default()
        }
    }

    /// Whether a method with this name and parameters is already planned
    fn plans_method(&self, name: &str, parameters: &[TypeRef], generic_arity: u16) -> bool {
        self.methods
            .iter()
            .any(|m| m.same_signature(name, parameters, generic_arity))
    }

    fn patch(&mut self, patch: MethodPatch) {
        match self.patches.iter_mut().find(|p| {
            p.name == patch.name
                && p.parameters == patch.parameters
                && p.generic_arity == patch.generic_arity
        }) {
            Some(existing) => {
                for edge in patch.overrides {
                    if !existing.overrides.contains(&edge) {
                        existing.overrides.push(edge);
                    }
                }
                if patch.body.is_some() {
                    existing.body = patch.body;
                }
            }
            None => self.patches.push(patch),
        }
    }
}

/// Plan the composition of one type from its resolved groups
pub fn plan(
    module: &Module,
    catalog: &RoleCatalog,
    entry: &TypeEntry,
    groups: &[ConflictGroup],
    resolutions: &[Resolution],
    result: &mut OperationResult,
) -> WeaveResult<CompositionPlan> {
    let composition = module.require_type(&entry.name)?;
    let mut plan = CompositionPlan::new(&entry.name);

    for (group, resolution) in groups.iter().zip(resolutions) {
        methods::plan_group(&mut plan, composition, catalog, group, resolution)?;
    }
    properties::declare_owners(&mut plan, composition, groups, resolutions);
    init::plan_roles(&mut plan, composition, catalog, &entry.composed, result)?;

    plan.remove_interfaces = composition
        .interfaces
        .iter()
        .filter(|i| {
            i.definition_name()
                .is_some_and(|name| entry.views.iter().any(|v| v == name))
        })
        .cloned()
        .collect();

    debug!(
        composition = %entry.name,
        methods = plan.methods.len(),
        patches = plan.patches.len(),
        fields = plan.fields.len(),
        "composition planned"
    );
    Ok(plan)
}

/// Apply a plan to the module
pub fn apply(module: &mut Module, plan: CompositionPlan) -> WeaveResult<()> {
    let base = module.require_type(&plan.composition)?.base_or_root();
    let composition = module.require_type_mut(&plan.composition)?;

    for field in plan.fields {
        if composition.find_field(&field.name).is_some() {
            return Err(WeaveError::invalid(format!(
                "field {}::{} declared twice",
                composition.name, field.name
            )));
        }
        composition.fields.push(field);
    }
    for method in plan.methods {
        composition.add_method(method)?;
    }
    for patch in plan.patches {
        let method = composition
            .find_method_mut(&patch.name, &patch.parameters, patch.generic_arity)
            .ok_or_else(|| WeaveError::MethodNotFound {
                type_name: plan.composition.clone(),
                method: patch.name.clone(),
            })?;
        methods::apply_patch(method, patch);
    }
    properties::merge(composition, plan.properties, plan.events);

    composition
        .interfaces
        .retain(|i| !plan.remove_interfaces.contains(i));
    for contract in plan.add_interfaces {
        if !composition.interfaces.contains(&contract) {
            composition.interfaces.push(contract);
        }
    }
    strip_weaver_annotations(composition);
    init::wire_constructors(composition, &base, &plan.wiring);

    debug!(composition = %plan.composition, "composition applied");
    Ok(())
}

/// Drop the annotations only the weaver reads
fn strip_weaver_annotations(composition: &mut TypeDefinition) {
    let weaver_only = |a: &Annotation| matches!(a, Annotation::Placeholder | Annotation::Supersede);
    for method in &mut composition.methods {
        method.annotations.retain(|a| !weaver_only(a));
    }
    for property in &mut composition.properties {
        property.annotations.retain(|a| !weaver_only(a));
    }
    for event in &mut composition.events {
        event.annotations.retain(|a| !weaver_only(a));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModuleBuilder;
    use crate::classifier::{classify, contributions};
    use crate::model::Instruction;
    use crate::registry::RoleRegistry;
    use crate::resolver::views::process_views;
    use crate::resolver::{resolve, CompositionContext};
    use crate::splitter::split_role;

    /// Split every role, then plan and apply `C`
    fn compose(mut module: Module) -> (Module, OperationResult) {
        let mut result = OperationResult::new();
        let registry = RoleRegistry::build(&module, &mut result);
        let mut catalog = RoleCatalog::new();
        let roles: Vec<String> = registry.roles().map(|r| r.name.clone()).collect();
        for role in roles {
            let (split, _) = split_role(&mut module, &role, &mut result).unwrap();
            catalog.insert(split);
        }
        let entry = registry.entry("C").unwrap().clone();
        let decisions = process_views(
            &module,
            &registry,
            &catalog,
            "C",
            &entry.composed,
            &entry.views,
            &mut result,
        );
        let composition = module.get_type("C").unwrap();
        let contributions =
            contributions(&module, &catalog, composition, &entry.composed, &decisions).unwrap();
        let groups = classify("C", &contributions, &mut result);
        let resolutions = resolve(
            &groups,
            CompositionContext {
                name: "C",
                is_role: false,
            },
            &mut result,
        );
        let plan = plan(&module, &catalog, &entry, &groups, &resolutions, &mut result).unwrap();
        apply(&mut module, plan).unwrap();
        (module, result)
    }

    #[test]
    fn test_forwarder_calls_code_function() {
        let module = ModuleBuilder::new("M")
            .role("R", |r| r.method("Answer", TypeRef::Int32, |m| m.returns_int(42)))
            .class("C", |c| c.does("R"))
            .build()
            .unwrap();
        let (module, result) = compose(module);
        assert!(result.success(), "{result}");

        let c = module.get_type("C").unwrap();
        let answer = c.find_method_by_name("Answer").unwrap();
        assert!(answer.flags.is_virtual);
        assert_eq!(
            answer.overrides,
            vec![MethodRef::new(TypeRef::named("R"), "Answer", vec![], TypeRef::Int32)]
        );
        assert_eq!(
            answer.body.as_ref().unwrap().instructions,
            vec![
                Instruction::LoadArg(0),
                Instruction::Call(MethodRef::new(
                    TypeRef::named("R/Code"),
                    "Answer",
                    vec![TypeRef::named("R")],
                    TypeRef::Int32
                )),
                Instruction::Ret,
            ]
        );
        assert!(c.interfaces.contains(&TypeRef::named("R")));
        assert!(c.find_field("<R>State").is_some());
    }

    #[test]
    fn test_views_and_weaver_annotations_are_removed() {
        let module = ModuleBuilder::new("M")
            .role("R", |r| r.method("Go", TypeRef::Int32, |m| m.returns_int(1)))
            .view("V", "R", |v| {
                v.method("Go", TypeRef::Int32, |m| m.abstract_method().annotate(Annotation::Supersede))
            })
            .class("C", |c| {
                c.does("R").with_view("V").method("Go", TypeRef::Int32, |m| {
                    m.annotate(Annotation::Placeholder).returns_int(0)
                })
            })
            .build()
            .unwrap();
        let (module, result) = compose(module);
        assert!(result.success(), "{result}");
        let c = module.get_type("C").unwrap();
        assert!(!c.interfaces.contains(&TypeRef::named("V")));
        let go = c.find_method_by_name("Go").unwrap();
        assert!(go.annotations.is_empty());
        assert!(matches!(
            go.body.as_ref().unwrap().instructions[1],
            Instruction::Call(ref target) if target.targets("R/Code")
        ));
    }

    #[test]
    fn test_declared_member_gains_override_edge() {
        let module = ModuleBuilder::new("M")
            .role("R", |r| r.abstract_method("Value", TypeRef::Int32))
            .class("C", |c| c.does("R").method("Value", TypeRef::Int32, |m| m.returns_int(42)))
            .build()
            .unwrap();
        let (module, result) = compose(module);
        assert!(result.is_empty(), "{result}");
        let value = module.get_type("C").unwrap().find_method_by_name("Value").unwrap();
        assert!(value.flags.is_virtual && value.flags.is_final);
        assert_eq!(value.overrides.len(), 1);
        assert_eq!(value.body.as_ref().unwrap().instructions[0], Instruction::LoadInt(42));
    }
}
