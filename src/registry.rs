// Copyright 2025 Cowboy AI, LLC.

//! Role registry
//!
//! Built once per module. Records which types are roles, which are
//! disambiguation views (and over which role), which roles every
//! composition type declares, and the order in which types must be
//! processed: a role is composed before it is split, and split before
//! anything composing it is composed.

use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

use crate::messages::{MessageCode, OperationResult};
use crate::model::{Annotation, Module, TypeDefinition, TypeKind, TypeRef};

/// What the registry knows about one type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeEntry {
    /// Full type name
    pub name: String,
    /// Implements the role marker
    pub is_role: bool,
    /// Role a disambiguation view applies to
    pub view_of: Option<TypeRef>,
    /// Composed roles, instantiated in the type's own frame, in declaration order
    pub composed: Vec<TypeRef>,
    /// Disambiguation views attached to the type, in declaration order
    pub views: Vec<String>,
    /// Base type declared in the module, if any
    pub base: Option<String>,
}

impl TypeEntry {
    /// Whether the type composes at least one role
    pub fn is_composition(&self) -> bool {
        !self.composed.is_empty()
    }

    /// Whether the type is a disambiguation view
    pub fn is_view(&self) -> bool {
        self.view_of.is_some()
    }
}

/// Typed index of roles, views and compositions
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    entries: IndexMap<String, TypeEntry>,
    order: Vec<String>,
}

impl RoleRegistry {
    /// Index a module, reporting malformed declarations
    pub fn build(module: &Module, result: &mut OperationResult) -> Self {
        let mut entries: IndexMap<String, TypeEntry> = IndexMap::new();

        for ty in module.types() {
            entries.insert(
                ty.name.clone(),
                TypeEntry {
                    name: ty.name.clone(),
                    is_role: is_role(ty),
                    base: ty
                        .base
                        .as_ref()
                        .filter(|b| !b.is_root())
                        .and_then(TypeRef::definition_name)
                        .filter(|b| module.get_type(b).is_some())
                        .map(str::to_string),
                    ..TypeEntry::default()
                },
            );
        }

        for ty in module.types() {
            if ty.has_annotation(&Annotation::RoleView) {
                let view_of = check_view(module, ty, result);
                if let Some(entry) = entries.get_mut(&ty.name) {
                    entry.view_of = view_of;
                }
            }
        }

        for ty in module.types() {
            let composed = composed_roles(module, ty, result);
            let views = ty
                .interfaces
                .iter()
                .filter_map(TypeRef::definition_name)
                .filter(|name| module.get_type(name).is_some_and(|v| v.has_annotation(&Annotation::RoleView)))
                .map(str::to_string)
                .collect::<Vec<_>>();
            for view in &views {
                check_view_attachment(&entries, ty, view, &composed, result);
            }
            if let Some(entry) = entries.get_mut(&ty.name) {
                entry.composed = composed;
                entry.views = views;
            }
        }

        let mut registry = Self {
            entries,
            order: Vec::new(),
        };
        registry.detect_cycles(result);
        if result.success() {
            registry.order = registry.processing_order();
            debug!(order = ?registry.order, "role registry built");
        }
        registry
    }

    /// Entry for a type
    pub fn entry(&self, name: &str) -> Option<&TypeEntry> {
        self.entries.get(name)
    }

    /// Whether the named type is a role
    pub fn is_role(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.is_role)
    }

    /// Roles in declaration order
    pub fn roles(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values().filter(|e| e.is_role)
    }

    /// Composition types in declaration order
    pub fn compositions(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values().filter(|e| e.is_composition())
    }

    /// Views in declaration order
    pub fn views(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values().filter(|e| e.is_view())
    }

    /// Roles and composition types, dependencies first
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Roles composed by `name` that are themselves known roles, by definition name
    fn role_dependencies(&self, name: &str) -> Vec<String> {
        self.entries
            .get(name)
            .map(|e| {
                e.composed
                    .iter()
                    .filter_map(TypeRef::definition_name)
                    .filter(|dep| *dep != name)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn detect_cycles(&self, result: &mut OperationResult) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            registry: &RoleRegistry,
            name: &str,
            marks: &mut HashMap<String, Mark>,
            path: &mut Vec<String>,
            result: &mut OperationResult,
        ) {
            match marks.get(name) {
                Some(Mark::Done) => return,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|p| p == name).unwrap_or(0);
                    let mut cycle: Vec<&str> = path[start..].iter().map(String::as_str).collect();
                    cycle.push(name);
                    result.report(
                        MessageCode::RoleCompositionCycle,
                        format!("roles compose each other in a cycle: {}", cycle.join(" -> ")),
                    );
                    return;
                }
                None => {}
            }
            marks.insert(name.to_string(), Mark::Visiting);
            path.push(name.to_string());
            for dep in registry.role_dependencies(name) {
                if registry.is_role(&dep) {
                    visit(registry, &dep, marks, path, result);
                }
            }
            path.pop();
            marks.insert(name.to_string(), Mark::Done);
        }

        let mut marks = HashMap::new();
        for entry in self.roles() {
            let mut path = Vec::new();
            visit(self, &entry.name, &mut marks, &mut path, result);
        }
    }

    fn processing_order(&self) -> Vec<String> {
        fn visit(registry: &RoleRegistry, name: &str, seen: &mut Vec<String>, order: &mut Vec<String>) {
            if seen.iter().any(|s| s == name) {
                return;
            }
            seen.push(name.to_string());
            let base = registry.entries.get(name).and_then(|e| e.base.clone());
            for dep in registry.role_dependencies(name).into_iter().chain(base) {
                if registry.entries.contains_key(&dep) {
                    visit(registry, &dep, seen, order);
                }
            }
            if registry
                .entries
                .get(name)
                .is_some_and(|e| e.is_role || e.is_composition())
            {
                order.push(name.to_string());
            }
        }

        let mut seen = Vec::new();
        let mut order = Vec::new();
        for name in self.entries.keys() {
            visit(self, name, &mut seen, &mut order);
        }
        order
    }
}

fn is_role(ty: &TypeDefinition) -> bool {
    ty.interfaces.iter().any(TypeRef::is_role_marker)
}

fn check_view(module: &Module, view: &TypeDefinition, result: &mut OperationResult) -> Option<TypeRef> {
    let pure_contract = view.kind == TypeKind::Interface
        && view.fields.is_empty()
        && view
            .methods
            .iter()
            .all(|m| m.body.is_none() && !m.flags.is_static);
    if !pure_contract {
        result.report(
            MessageCode::ViewNotAContract,
            format!("view {} must be a contract with abstract members only", view.name),
        );
        return None;
    }

    let roles: Vec<&TypeRef> = view
        .interfaces
        .iter()
        .filter(|i| module.resolve_type(i).is_some_and(is_role))
        .collect();
    match roles.as_slice() {
        [role] => Some((*role).clone()),
        _ => {
            result.report(
                MessageCode::ViewRoleCount,
                format!(
                    "view {} must refer to exactly one role, found {}",
                    view.name,
                    roles.len()
                ),
            );
            None
        }
    }
}

fn check_view_attachment(
    entries: &IndexMap<String, TypeEntry>,
    ty: &TypeDefinition,
    view: &str,
    composed: &[TypeRef],
    result: &mut OperationResult,
) {
    let Some(role) = entries.get(view).and_then(|e| e.view_of.as_ref()) else {
        return;
    };
    if !composed.contains(role) {
        result.report(
            MessageCode::ViewRoleCount,
            format!("view {view} refers to role {role}, which {} does not compose", ty.name),
        );
    }
}

fn composed_roles(module: &Module, ty: &TypeDefinition, result: &mut OperationResult) -> Vec<TypeRef> {
    let mut composed = Vec::new();
    for does in ty.interfaces.iter().filter_map(TypeRef::as_does) {
        if does.is_generic_parameter() {
            result.report(
                MessageCode::OpenTypeParameterRole,
                format!("{} composes the type parameter {does}, roles must be named", ty.name),
            );
            continue;
        }
        match module.resolve_type(does) {
            Some(def) if is_role(def) => {
                if def.name == ty.name {
                    result.report(
                        MessageCode::RoleComposesItself,
                        format!("role {} composes itself", ty.name),
                    );
                } else if !composed.contains(does) {
                    composed.push(does.clone());
                }
            }
            _ => result.report(
                MessageCode::UnknownRole,
                format!("{} composes {does}, which is not a role", ty.name),
            ),
        }
    }
    composed
}
