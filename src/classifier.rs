// Copyright 2025 Cowboy AI, LLC.

//! Member classifier
//!
//! Collects every member contributed to a composition and sorts them into
//! conflict groups: members denoting the same slot (name, generic arity and
//! parameter types in the composition frame). Contribution order is role
//! declaration order, then aliased copies, then the composition type's own
//! members, then inherited members nearest base first.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

use crate::errors::{WeaveError, WeaveResult};
use crate::member_model::{
    AccessorOf, ContributedMember, FieldBacking, Marking, MemberKind, MemberOrigin,
};
use crate::messages::{MessageCode, OperationResult};
use crate::model::{
    root_methods, Annotation, MethodDefinition, Module, TypeDefinition, TypeRef, Visibility,
};
use crate::resolver::views::ViewDecisions;
use crate::splitter::RoleCatalog;

/// Members denoting one slot, in contribution order
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictGroup {
    members: Vec<ContributedMember>,
}

impl ConflictGroup {
    fn new(first: ContributedMember) -> Self {
        Self {
            members: vec![first],
        }
    }

    /// All members
    pub fn members(&self) -> &[ContributedMember] {
        &self.members
    }

    /// First member, which defines the slot
    pub fn key(&self) -> &ContributedMember {
        &self.members[0]
    }

    /// Slot name
    pub fn name(&self) -> &str {
        &self.key().name
    }

    /// Members contributed by roles
    pub fn role_members(&self) -> impl Iterator<Item = &ContributedMember> {
        self.members.iter().filter(|m| m.is_role_member())
    }

    /// Member declared by the composition type
    pub fn declared(&self) -> Option<&ContributedMember> {
        self.members.iter().find(|m| m.is_declared())
    }

    /// Inherited members, nearest first
    pub fn inherited(&self) -> impl Iterator<Item = &ContributedMember> {
        self.members.iter().filter(|m| m.is_inherited())
    }

    /// `Name(params)` of the slot
    pub fn describe(&self) -> String {
        let key = self.key();
        let params = key
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({params})", key.name)
    }
}

/// A property, event or field name, for the kind-clash diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMember {
    /// Member kind
    pub kind: MemberKind,
    /// Member name
    pub name: String,
    /// Contributed by a role rather than the composition type
    pub from_role: bool,
}

/// Contributed members of one composition, before grouping
#[derive(Debug, Clone, Default)]
pub struct Contributions {
    /// Method members in contribution order
    pub methods: Vec<ContributedMember>,
    /// Properties, events and fields
    pub others: Vec<NamedMember>,
}

impl Contributions {
    fn named(&mut self, kind: MemberKind, name: &str, from_role: bool) {
        self.others.push(NamedMember {
            kind,
            name: name.to_string(),
            from_role,
        });
    }
}

/// Collect the members contributed to `composition`
pub fn contributions(
    module: &Module,
    catalog: &RoleCatalog,
    composition: &TypeDefinition,
    composed: &[TypeRef],
    decisions: &ViewDecisions,
) -> WeaveResult<Contributions> {
    let mut contributions = Contributions::default();
    let mut role_members: Vec<Vec<ContributedMember>> = Vec::new();

    for (role_index, role) in composed.iter().enumerate() {
        let split = catalog
            .resolve(role)
            .ok_or_else(|| WeaveError::TypeNotFound(format!("split role {role}")))?;
        let arguments = role.arguments();
        let mut members = Vec::new();

        for (member_index, entry) in split.members.iter().enumerate() {
            let backing = if entry.field_backed {
                entry.accessor_of.as_ref().map(|owner| FieldBacking {
                    property: owner.name().to_string(),
                    ty: accessor_value_type(
                        &entry.method.return_type,
                        entry.method.parameters.last().map(|p| &p.ty),
                    )
                    .substitute(arguments),
                    is_setter: entry.method.return_type == TypeRef::Void,
                })
            } else {
                None
            };
            let origin = MemberOrigin::Role {
                role: role.clone(),
                contract: entry.method.reference(role.clone()),
                code: split.code_function(entry, role),
                backing,
                alias_of: None,
            };
            let mut member = ContributedMember::method(&entry.method, arguments, origin);
            member.accessor_of = entry.accessor_of.clone();
            member.mark(Marking::Foreign);
            if entry.is_abstract {
                member.mark(Marking::Abstract);
            }
            if entry.is_base_method {
                member.mark(Marking::BaseMethod);
            }
            for marking in decisions.markings((role_index, member_index)) {
                member.mark(marking);
            }
            members.push(member);
        }

        for property in &split.properties {
            contributions.named(MemberKind::Property, &property.name, true);
        }
        for event in &split.events {
            contributions.named(MemberKind::Event, &event.name, true);
        }
        role_members.push(members);
    }

    for members in &role_members {
        contributions.methods.extend(members.iter().cloned());
    }

    for alias in decisions.aliases() {
        let (role_index, member_index) = alias.target;
        let Some(original) = role_members
            .get(role_index)
            .and_then(|members| members.get(member_index))
        else {
            continue;
        };
        let mut copy = original.clone();
        copy.name = alias.name.clone();
        copy.accessor_of = alias.accessor_of.clone();
        copy.markings = original
            .markings
            .iter()
            .copied()
            .filter(|m| !matches!(m, Marking::Aliased | Marking::Excluded | Marking::Supersede))
            .collect::<BTreeSet<_>>();
        if let MemberOrigin::Role {
            alias_of, backing, ..
        } = &mut copy.origin
        {
            *alias_of = Some(original.name.clone());
            if let (Some(backing), Some(owner)) = (backing.as_mut(), &alias.accessor_of) {
                backing.property = owner.name().to_string();
            }
        }
        contributions.methods.push(copy);
    }

    let self_type = composition.self_reference();
    for method in composition.methods.iter().filter(|m| m.is_instance_member()) {
        let mut member = class_member(method, &[], self_type.clone(), true);
        member.accessor_of = composition
            .property_of_accessor(&method.name)
            .map(|p| AccessorOf::Property(p.name.clone()))
            .or_else(|| {
                composition
                    .event_of_accessor(&method.name)
                    .map(|e| AccessorOf::Event(e.name.clone()))
            });
        contributions.methods.push(member);
    }
    for property in &composition.properties {
        contributions.named(MemberKind::Property, &property.name, false);
    }
    for event in &composition.events {
        contributions.named(MemberKind::Event, &event.name, false);
    }
    for field in &composition.fields {
        contributions.named(MemberKind::Field, &field.name, false);
    }

    for (base, definition) in module.base_chain(composition) {
        for method in definition
            .methods
            .iter()
            .filter(|m| m.is_instance_member() && m.visibility != Visibility::Private)
        {
            contributions
                .methods
                .push(class_member(method, base.arguments(), base.clone(), false));
        }
    }
    for method in root_methods().iter().filter(|m| m.is_instance_member()) {
        contributions
            .methods
            .push(class_member(method, &[], TypeRef::Object, false));
    }

    Ok(contributions)
}

fn class_member(
    method: &MethodDefinition,
    arguments: &[TypeRef],
    declaring: TypeRef,
    declared: bool,
) -> ContributedMember {
    let origin = MemberOrigin::Class {
        declaring,
        declared,
        definition: Box::new(method.clone()),
    };
    let mut member = ContributedMember::method(method, arguments, origin);
    if method.flags.is_abstract {
        member.mark(Marking::Abstract);
    }
    if method.has_annotation(&Annotation::Placeholder) {
        member.mark(Marking::Placeholder);
    }
    if method.has_annotation(&Annotation::Supersede) {
        member.mark(Marking::Supersede);
    }
    member
}

/// Type a property or event accessor reads or writes
pub fn accessor_value_type(return_type: &TypeRef, last_parameter: Option<&TypeRef>) -> TypeRef {
    match last_parameter {
        Some(value) if *return_type == TypeRef::Void => value.clone(),
        _ => return_type.clone(),
    }
}

/// Report signature conflicts and kind clashes, then group
pub fn classify(
    composition: &str,
    contributions: &Contributions,
    result: &mut OperationResult,
) -> Vec<ConflictGroup> {
    report_signature_conflicts(composition, &contributions.methods, result);
    report_kind_clashes(composition, contributions, result);

    let mut groups: Vec<ConflictGroup> = Vec::new();
    for member in &contributions.methods {
        match groups.iter_mut().find(|g| g.key().same_slot(member)) {
            Some(group) => group.members.push(member.clone()),
            None => groups.push(ConflictGroup::new(member.clone())),
        }
    }
    debug!(composition, groups = groups.len(), "members classified");
    groups
}

fn report_signature_conflicts(
    composition: &str,
    methods: &[ContributedMember],
    result: &mut OperationResult,
) {
    let mut slots: Vec<Vec<&ContributedMember>> = Vec::new();
    for member in methods {
        match slots.iter_mut().find(|s| s[0].same_slot(member)) {
            Some(slot) => slot.push(member),
            None => slots.push(vec![member]),
        }
    }

    for slot in slots {
        if !slot.iter().any(|m| m.is_role_member()) {
            continue;
        }
        let contenders: Vec<&&ContributedMember> = slot
            .iter()
            .filter(|m| m.is_role_member() || m.is_declared())
            .collect();
        let return_types: BTreeSet<&TypeRef> = contenders.iter().map(|m| &m.return_type).collect();
        if return_types.len() > 1 {
            let detail = contenders
                .iter()
                .map(|m| format!("{} returns {}", m.describe(), m.return_type))
                .collect::<Vec<_>>()
                .join(", ");
            result.report(
                MessageCode::SignatureConflict,
                format!("{composition}: {} is declared with different return types: {detail}", slot[0].name),
            );
        }
    }
}

fn report_kind_clashes(composition: &str, contributions: &Contributions, result: &mut OperationResult) {
    let mut kinds: IndexMap<&str, (BTreeSet<MemberKind>, bool)> = IndexMap::new();
    let methods = contributions
        .methods
        .iter()
        .filter(|m| m.is_role_member() || m.is_declared())
        .map(|m| (m.name.as_str(), m.kind, m.is_role_member()));
    let others = contributions
        .others
        .iter()
        .map(|m| (m.name.as_str(), m.kind, m.from_role));
    for (name, kind, from_role) in methods.chain(others) {
        let entry = kinds.entry(name).or_default();
        entry.0.insert(kind);
        entry.1 |= from_role;
    }

    for (name, (member_kinds, from_role)) in kinds {
        if member_kinds.len() > 1 && from_role {
            let list = member_kinds
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" and ");
            result.report(
                MessageCode::MemberKindClash,
                format!("{composition}: {name} is contributed as {list}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModuleBuilder;
    use crate::splitter::split_role;

    fn prepare(module: &mut Module, roles: &[&str]) -> RoleCatalog {
        let mut catalog = RoleCatalog::new();
        let mut result = OperationResult::new();
        for role in roles {
            let (split, _) = split_role(module, role, &mut result).unwrap();
            catalog.insert(split);
        }
        catalog
    }

    fn classify_c(module: &Module, catalog: &RoleCatalog, composed: &[TypeRef]) -> (Vec<ConflictGroup>, OperationResult) {
        let composition = module.get_type("C").unwrap();
        let contributions =
            contributions(module, catalog, composition, composed, &ViewDecisions::default()).unwrap();
        let mut result = OperationResult::new();
        let groups = classify("C", &contributions, &mut result);
        (groups, result)
    }

    #[test]
    fn test_same_slot_from_two_roles_forms_one_group() {
        let mut module = ModuleBuilder::new("M")
            .role("A", |r| r.method("M", TypeRef::Int32, |m| m.returns_int(1)))
            .role("B", |r| r.method("M", TypeRef::Int32, |m| m.returns_int(2)))
            .class("C", |c| c.does("A").does("B"))
            .build()
            .unwrap();
        let catalog = prepare(&mut module, &["A", "B"]);
        let (groups, result) = classify_c(&module, &catalog, &[TypeRef::named("A"), TypeRef::named("B")]);
        assert!(result.success());
        let m = groups.iter().find(|g| g.name() == "M").unwrap();
        assert_eq!(m.role_members().count(), 2);
        assert_eq!(groups[0].name(), "M");
    }

    #[test]
    fn test_return_type_difference_is_a_signature_conflict() {
        let mut module = ModuleBuilder::new("M")
            .role("A", |r| r.method("M", TypeRef::Int32, |m| m.returns_int(1)))
            .role("B", |r| r.method("M", TypeRef::String, |m| m.returns_string("b")))
            .class("C", |c| c.does("A").does("B"))
            .build()
            .unwrap();
        let catalog = prepare(&mut module, &["A", "B"]);
        let (groups, result) = classify_c(&module, &catalog, &[TypeRef::named("A"), TypeRef::named("B")]);
        assert!(result.has(MessageCode::SignatureConflict));
        assert_eq!(groups.iter().filter(|g| g.name() == "M").count(), 1);
    }

    #[test]
    fn test_kind_clash_between_role_method_and_class_field() {
        let mut module = ModuleBuilder::new("M")
            .role("A", |r| r.method("Size", TypeRef::Int32, |m| m.returns_int(1)))
            .class("C", |c| c.does("A").field("Size", TypeRef::Int32))
            .build()
            .unwrap();
        let catalog = prepare(&mut module, &["A"]);
        let (_, result) = classify_c(&module, &catalog, &[TypeRef::named("A")]);
        assert!(result.has(MessageCode::MemberKindClash));
    }

    #[test]
    fn test_generic_role_members_are_substituted() {
        let mut module = ModuleBuilder::new("M")
            .role("Box`1", |r| {
                r.generic("T").method("Put", TypeRef::Void, |m| {
                    m.param("item", TypeRef::TypeParam(0)).empty_body()
                })
            })
            .role("Ints", |r| {
                r.method("Put", TypeRef::Void, |m| m.param("item", TypeRef::Int32).empty_body())
            })
            .class("C", |c| c)
            .build()
            .unwrap();
        let catalog = prepare(&mut module, &["Box`1", "Ints"]);
        let composed = [
            TypeRef::instance("Box`1", vec![TypeRef::Int32]),
            TypeRef::named("Ints"),
        ];
        let (groups, _) = classify_c(&module, &catalog, &composed);
        let put = groups.iter().find(|g| g.name() == "Put").unwrap();
        assert_eq!(put.role_members().count(), 2);

        let composed = [
            TypeRef::instance("Box`1", vec![TypeRef::String]),
            TypeRef::named("Ints"),
        ];
        let (groups, _) = classify_c(&module, &catalog, &composed);
        assert_eq!(groups.iter().filter(|g| g.name() == "Put").count(), 2);
    }

    #[test]
    fn test_inherited_and_root_members_join_groups() {
        let mut module = ModuleBuilder::new("M")
            .role("A", |r| {
                r.abstract_method("Run", TypeRef::Int32)
                    .method("ToString", TypeRef::String, |m| m.returns_string("a"))
            })
            .class("Base", |c| c.method("Run", TypeRef::Int32, |m| m.as_virtual().returns_int(7)))
            .class("C", |c| c.base("Base").does("A"))
            .build()
            .unwrap();
        let catalog = prepare(&mut module, &["A"]);
        let (groups, result) = classify_c(&module, &catalog, &[TypeRef::named("A")]);
        assert!(result.success());
        let run = groups.iter().find(|g| g.name() == "Run").unwrap();
        assert_eq!(run.inherited().count(), 1);
        let to_string = groups.iter().find(|g| g.name() == "ToString").unwrap();
        assert_eq!(to_string.inherited().next().unwrap().declaring(), Some(&TypeRef::Object));
    }

    #[test]
    fn test_accessor_value_type_reads_setter_argument() {
        assert_eq!(accessor_value_type(&TypeRef::Void, Some(&TypeRef::String)), TypeRef::String);
        assert_eq!(accessor_value_type(&TypeRef::Int32, None), TypeRef::Int32);
        assert_eq!(accessor_value_type(&TypeRef::Int32, Some(&TypeRef::String)), TypeRef::Int32);
    }
}
