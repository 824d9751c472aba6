// Copyright 2025 Cowboy AI, LLC.

//! Disambiguation views
//!
//! A view is a contract scoped to one composed role. Each of its members
//! names a member of that role and carries one marking:
//!
//! - `Exclude` removes the role member from its conflict group
//! - `Alias(name)` moves the role member to a new slot called `name`
//! - `Supersede` prefers the role member over competing role members
//!
//! Markings on a view property or event apply to each of its accessors.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::member_model::{AccessorOf, Marking};
use crate::messages::{MessageCode, OperationResult};
use crate::model::{Annotation, MethodDefinition, Module, TypeDefinition, TypeRef};
use crate::registry::RoleRegistry;
use crate::splitter::RoleCatalog;

/// Role member addressed by composed-role position and contract position
pub type MemberKey = (usize, usize);

/// An aliased copy requested by a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRequest {
    /// Aliased role member
    pub target: MemberKey,
    /// New slot name
    pub name: String,
    /// Property or event the copy belongs to
    pub accessor_of: Option<AccessorOf>,
    /// View that requested it
    pub view: String,
}

/// Markings and aliases decided by the views of one composition
#[derive(Debug, Clone, Default)]
pub struct ViewDecisions {
    markings: HashMap<MemberKey, BTreeSet<Marking>>,
    aliases: Vec<AliasRequest>,
}

impl ViewDecisions {
    /// Markings of a role member
    pub fn markings(&self, key: MemberKey) -> impl Iterator<Item = Marking> + '_ {
        self.markings.get(&key).into_iter().flatten().copied()
    }

    /// Whether a role member carries a marking
    pub fn is(&self, key: MemberKey, marking: Marking) -> bool {
        self.markings.get(&key).is_some_and(|m| m.contains(&marking))
    }

    /// Aliased copies in request order
    pub fn aliases(&self) -> &[AliasRequest] {
        &self.aliases
    }

    fn mark(&mut self, key: MemberKey, marking: Marking) -> bool {
        self.markings.entry(key).or_default().insert(marking)
    }
}

/// Annotations that apply to a view method, including those of the
/// property or event owning it, with the owner's name
fn effective_annotations<'a>(
    view: &'a TypeDefinition,
    method: &'a MethodDefinition,
) -> (Vec<&'a Annotation>, Option<AccessorOf>) {
    let mut annotations: Vec<&Annotation> = method.annotations.iter().collect();
    let owner = if let Some(property) = view.property_of_accessor(&method.name) {
        annotations.extend(property.annotations.iter());
        Some(AccessorOf::Property(property.name.clone()))
    } else if let Some(event) = view.event_of_accessor(&method.name) {
        annotations.extend(event.annotations.iter());
        Some(AccessorOf::Event(event.name.clone()))
    } else {
        None
    };
    (annotations, owner)
}

/// Alias of an accessor when its owner is renamed: `get_Old` -> `get_New`
fn accessor_alias(accessor: &str, owner: &str, alias: &str) -> String {
    match accessor.strip_suffix(owner) {
        Some(prefix) if prefix.ends_with('_') => format!("{prefix}{alias}"),
        _ => alias.to_string(),
    }
}

/// Process every view attached to a composition
pub fn process_views(
    module: &Module,
    registry: &RoleRegistry,
    catalog: &RoleCatalog,
    composition: &str,
    composed: &[TypeRef],
    views: &[String],
    result: &mut OperationResult,
) -> ViewDecisions {
    let mut decisions = ViewDecisions::default();

    for view_name in views {
        let Some(view) = module.get_type(view_name) else {
            continue;
        };
        let Some(role) = registry.entry(view_name).and_then(|e| e.view_of.as_ref()) else {
            continue;
        };
        let Some(role_index) = composed.iter().position(|c| c == role) else {
            continue;
        };
        let Some(split) = catalog.resolve(role) else {
            continue;
        };
        let arguments = role.arguments();

        for method in view.methods.iter().filter(|m| m.is_instance_member()) {
            let parameters = method.parameter_types();
            let found = split.members.iter().position(|m| {
                m.method.name == method.name
                    && m.method.generic_arity == method.generic_arity
                    && m.method.parameters.len() == parameters.len()
                    && m.method
                        .parameters
                        .iter()
                        .zip(&parameters)
                        .all(|(p, t)| p.ty.substitute(arguments) == *t)
            });
            let Some(member_index) = found else {
                result.report(
                    MessageCode::ViewMemberNotFound,
                    format!(
                        "view {view_name} of {composition} declares {}, which role {role} does not have",
                        method.name
                    ),
                );
                continue;
            };
            let key = (role_index, member_index);
            let (annotations, owner) = effective_annotations(view, method);

            let mut marked = false;
            for annotation in annotations {
                match annotation {
                    Annotation::Exclude => {
                        marked = true;
                        if !decisions.mark(key, Marking::Excluded) {
                            result.report(
                                MessageCode::DoubleExclusion,
                                format!("{role}::{} is excluded more than once in {composition}", method.name),
                            );
                        }
                    }
                    Annotation::Alias(alias) => {
                        marked = true;
                        if decisions.is(key, Marking::Aliased) {
                            result.report(
                                MessageCode::DoubleAliasing,
                                format!(
                                    "{role}::{} is aliased more than once in {composition} (again by {view_name})",
                                    method.name
                                ),
                            );
                            continue;
                        }
                        decisions.mark(key, Marking::Aliased);
                        let method_alias = method.alias().map(str::to_string);
                        let (name, accessor_of) = match (&owner, method_alias) {
                            (_, Some(own)) => (own, split.members[member_index].accessor_of.clone()),
                            (Some(AccessorOf::Property(p)), None) => (
                                accessor_alias(&method.name, p, alias),
                                Some(AccessorOf::Property(alias.clone())),
                            ),
                            (Some(AccessorOf::Event(e)), None) => (
                                accessor_alias(&method.name, e, alias),
                                Some(AccessorOf::Event(alias.clone())),
                            ),
                            (None, None) => (alias.clone(), None),
                        };
                        decisions.aliases.push(AliasRequest {
                            target: key,
                            name,
                            accessor_of,
                            view: view_name.clone(),
                        });
                    }
                    Annotation::Supersede => {
                        marked = true;
                        decisions.mark(key, Marking::Supersede);
                    }
                    _ => {}
                }
            }
            if !marked {
                result.report(
                    MessageCode::ViewMemberUnmarked,
                    format!("view {view_name} declares {} without exclude, alias or supersede", method.name),
                );
            }
        }
        debug!(view = %view_name, composition, "view processed");
    }

    decisions
}
