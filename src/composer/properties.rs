// Copyright 2025 Cowboy AI, LLC.

//! Property and event declarations for composed accessors

use super::CompositionPlan;
use crate::classifier::{accessor_value_type, ConflictGroup};
use crate::member_model::{AccessorOf, ContributedMember, Marking};
use crate::model::{EventDefinition, PropertyDefinition, TypeDefinition, TypeRef};
use crate::resolver::{Resolution, Target};

/// Declare the property or event owning every accessor the composition
/// implements for a role, unless the composition already has one
pub(super) fn declare_owners(
    plan: &mut CompositionPlan,
    composition: &TypeDefinition,
    groups: &[ConflictGroup],
    resolutions: &[Resolution],
) {
    for (group, resolution) in groups.iter().zip(resolutions) {
        let implementing = match resolution {
            Resolution::RoleMember {
                target: Target::Placeholder(placeholder),
                ..
            } => placeholder,
            Resolution::ClassMember { member, .. }
            | Resolution::Ancestor { member, .. }
            | Resolution::Abstract { member, .. }
            | Resolution::RoleMember { member, .. } => member,
            _ => continue,
        };
        let Some(owner) = group
            .role_members()
            .filter(|m| !m.is(Marking::Aliased))
            .find_map(|m| m.accessor_of.clone())
        else {
            continue;
        };
        let name = implementing.name.as_str();
        if composition.property_of_accessor(name).is_some() || composition.event_of_accessor(name).is_some() {
            continue;
        }
        let ty = accessor_value_type(&implementing.return_type, implementing.parameters.last());
        match owner {
            AccessorOf::Property(property) => declare_property(plan, &property, ty, name, is_setter(implementing)),
            AccessorOf::Event(event) => declare_event(plan, &event, ty, name),
        }
    }
}

fn is_setter(member: &ContributedMember) -> bool {
    member.return_type == TypeRef::Void && !member.parameters.is_empty()
}

fn declare_property(plan: &mut CompositionPlan, name: &str, ty: TypeRef, accessor: &str, setter: bool) {
    let index = match plan.properties.iter().position(|p| p.name == name) {
        Some(index) => index,
        None => {
            plan.properties.push(PropertyDefinition {
                name: name.to_string(),
                ty,
                getter: None,
                setter: None,
                annotations: Vec::new(),
            });
            plan.properties.len() - 1
        }
    };
    let property = &mut plan.properties[index];
    let slot = if setter { &mut property.setter } else { &mut property.getter };
    if slot.is_none() {
        *slot = Some(accessor.to_string());
    }
}

fn declare_event(plan: &mut CompositionPlan, name: &str, ty: TypeRef, accessor: &str) {
    let index = match plan.events.iter().position(|e| e.name == name) {
        Some(index) => index,
        None => {
            plan.events.push(EventDefinition {
                name: name.to_string(),
                ty,
                add: None,
                remove: None,
                raise: None,
                annotations: Vec::new(),
            });
            plan.events.len() - 1
        }
    };
    let event = &mut plan.events[index];
    let slot = if accessor.starts_with("remove_") {
        &mut event.remove
    } else if accessor.starts_with("raise_") {
        &mut event.raise
    } else {
        &mut event.add
    };
    if slot.is_none() {
        *slot = Some(accessor.to_string());
    }
}

/// Merge planned declarations into the composition, filling accessor
/// slots of declarations it already has
pub(super) fn merge(
    composition: &mut TypeDefinition,
    properties: Vec<PropertyDefinition>,
    events: Vec<EventDefinition>,
) {
    for planned in properties {
        match composition.properties.iter_mut().find(|p| p.name == planned.name) {
            Some(existing) => {
                if existing.getter.is_none() {
                    existing.getter = planned.getter;
                }
                if existing.setter.is_none() {
                    existing.setter = planned.setter;
                }
            }
            None => composition.properties.push(planned),
        }
    }
    for planned in events {
        match composition.events.iter_mut().find(|e| e.name == planned.name) {
            Some(existing) => {
                existing.add = existing.add.take().or(planned.add);
                existing.remove = existing.remove.take().or(planned.remove);
                existing.raise = existing.raise.take().or(planned.raise);
            }
            None => composition.events.push(planned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_fill_one_property() {
        let mut plan = CompositionPlan::default();
        declare_property(&mut plan, "Name", TypeRef::String, "get_Name", false);
        declare_property(&mut plan, "Name", TypeRef::String, "set_Name", true);
        assert_eq!(plan.properties.len(), 1);
        assert_eq!(plan.properties[0].getter.as_deref(), Some("get_Name"));
        assert_eq!(plan.properties[0].setter.as_deref(), Some("set_Name"));
    }

    #[test]
    fn test_merge_keeps_declared_accessors() {
        let mut composition = TypeDefinition::class("C");
        composition.properties.push(PropertyDefinition {
            name: "Name".into(),
            ty: TypeRef::String,
            getter: Some("get_Name".into()),
            setter: None,
            annotations: Vec::new(),
        });
        let mut plan = CompositionPlan::default();
        declare_property(&mut plan, "Name", TypeRef::String, "get_Other", false);
        declare_property(&mut plan, "Name", TypeRef::String, "set_Name", true);
        declare_event(&mut plan, "Changed", TypeRef::named("Handler"), "add_Changed");
        merge(&mut composition, plan.properties, plan.events);
        let name = &composition.properties[0];
        assert_eq!(name.getter.as_deref(), Some("get_Name"));
        assert_eq!(name.setter.as_deref(), Some("set_Name"));
        assert_eq!(composition.events[0].add.as_deref(), Some("add_Changed"));
    }
}
