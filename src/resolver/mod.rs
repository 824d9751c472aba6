// Copyright 2025 Cowboy AI, LLC.

//! Conflict resolver
//!
//! Decides, for every conflict group, which member implements the slot.
//! The first applicable rule wins:
//!
//! 1. a class member that supersedes (explicitly, or implicitly by being
//!    declared on the composition type)
//! 2. a declared placeholder becomes the emission target of what follows
//! 3. excluded role members drop out; excluding all of them is an error
//! 4. aliased role members drop out; if none remain nothing is emitted
//! 5. only base-method members remain: the root implementation stays
//! 6. only abstract members remain: an inherited implementation, an
//!    abstract slot (compositions that are roles), or an error
//! 7. one concrete member remains, or a view prefers one, or it is a conflict

pub mod views;

use tracing::debug;

use crate::classifier::ConflictGroup;
use crate::member_model::{ContributedMember, Marking};
use crate::messages::{MessageCode, OperationResult};
use crate::model::MethodRef;

/// Where a winning role member is emitted
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// New forwarding method
    New {
        /// Reuse an inherited virtual slot instead of opening a new one
        reuse_slot: bool,
    },
    /// Replace the body of a declared placeholder
    Placeholder(ContributedMember),
}

/// Outcome for one conflict group
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No role contributes to the slot
    Untouched,
    /// A member declared on the composition type implements the slot
    ClassMember {
        /// Declared member
        member: ContributedMember,
        /// Contract members it implements
        subsumed: Vec<MethodRef>,
    },
    /// An inherited member implements the slot through a forwarder
    Ancestor {
        /// Inherited member
        member: ContributedMember,
        /// Reuse the inherited virtual slot
        reuse_slot: bool,
        /// Contract members it implements
        subsumed: Vec<MethodRef>,
    },
    /// A role member implements the slot
    RoleMember {
        /// Winning role member
        member: ContributedMember,
        /// Where the forwarder goes
        target: Target,
        /// Contract members it implements
        subsumed: Vec<MethodRef>,
    },
    /// The slot stays abstract in a composition that is itself a role
    Abstract {
        /// Representative abstract member
        member: ContributedMember,
        /// Contract members the declaration carries edges to
        subsumed: Vec<MethodRef>,
    },
    /// Only base-method members remain; the root implementation is used
    BaseMethodOnly,
    /// Every role member is aliased; the aliases carry the slot
    NotSynthesized,
    /// An error was reported
    Unresolved,
}

impl Resolution {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Untouched => "untouched",
            Resolution::ClassMember { .. } => "class member",
            Resolution::Ancestor { .. } => "ancestor",
            Resolution::RoleMember { .. } => "role member",
            Resolution::Abstract { .. } => "abstract",
            Resolution::BaseMethodOnly => "base method",
            Resolution::NotSynthesized => "not synthesized",
            Resolution::Unresolved => "unresolved",
        }
    }

    /// Contract members implemented by the resolution
    pub fn subsumed(&self) -> &[MethodRef] {
        match self {
            Resolution::ClassMember { subsumed, .. }
            | Resolution::Ancestor { subsumed, .. }
            | Resolution::RoleMember { subsumed, .. }
            | Resolution::Abstract { subsumed, .. } => subsumed,
            _ => &[],
        }
    }
}

/// What the resolver needs to know about the composition
#[derive(Debug, Clone, Copy)]
pub struct CompositionContext<'a> {
    /// Composition type name
    pub name: &'a str,
    /// Whether the composition is itself a role
    pub is_role: bool,
}

/// Resolve every group independently, in discovery order
pub fn resolve(
    groups: &[ConflictGroup],
    context: CompositionContext<'_>,
    result: &mut OperationResult,
) -> Vec<Resolution> {
    groups
        .iter()
        .map(|group| {
            let resolution = resolve_group(group, context, result);
            debug!(
                composition = context.name,
                slot = %group.describe(),
                resolution = resolution.label(),
                "group resolved"
            );
            resolution
        })
        .collect()
}

/// Contract members of every non-aliased role member, deduplicated
fn subsumed(group: &ConflictGroup) -> Vec<MethodRef> {
    let mut edges: Vec<MethodRef> = Vec::new();
    for member in group.role_members().filter(|m| !m.is(Marking::Aliased)) {
        if let Some(contract) = member.contract() {
            if !edges.contains(contract) {
                edges.push(contract.clone());
            }
        }
    }
    edges
}

fn roles_of<'a>(members: impl IntoIterator<Item = &'a ContributedMember>) -> String {
    let mut names: Vec<String> = Vec::new();
    for role in members.into_iter().filter_map(ContributedMember::role) {
        let name = role.to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.join(", ")
}

fn resolve_group(
    group: &ConflictGroup,
    context: CompositionContext<'_>,
    result: &mut OperationResult,
) -> Resolution {
    let slot = group.describe();
    let composition = context.name;
    let role_members: Vec<&ContributedMember> = group.role_members().collect();
    let declared = group.declared();
    let placeholder = declared.filter(|d| d.is(Marking::Placeholder));

    if role_members.is_empty() {
        if placeholder.is_some() {
            result.report(
                MessageCode::PlaceholderUnmatched,
                format!("placeholder {composition}::{slot} does not match any role member"),
            );
        }
        return Resolution::Untouched;
    }

    // 1. supersede
    if let Some(member) = declared.filter(|d| !d.is(Marking::Placeholder)) {
        if !member.is(Marking::Supersede) {
            let overridden: Vec<&ContributedMember> = role_members
                .iter()
                .copied()
                .filter(|m| {
                    !m.is(Marking::Abstract)
                        && !m.is(Marking::Aliased)
                        && !m.is(Marking::Excluded)
                        && !m.is(Marking::BaseMethod)
                })
                .collect();
            if !overridden.is_empty() {
                result.report(
                    MessageCode::ImplicitSupersede,
                    format!(
                        "{composition}::{slot} supersedes the implementation from {} without being marked",
                        roles_of(overridden)
                    ),
                );
            }
        }
        return Resolution::ClassMember {
            member: member.clone(),
            subsumed: subsumed(group),
        };
    }
    if let Some(member) = group.inherited().find(|m| m.is(Marking::Supersede)) {
        return Resolution::Ancestor {
            member: member.clone(),
            reuse_slot: reusable_slot(member),
            subsumed: subsumed(group),
        };
    }

    // 3. exclusion
    let candidates: Vec<&ContributedMember> = role_members
        .iter()
        .copied()
        .filter(|m| !m.is(Marking::Excluded))
        .collect();
    if candidates.is_empty() {
        result.report(
            MessageCode::AllMembersExcluded,
            format!(
                "all members for {composition}::{slot} are excluded (from {})",
                roles_of(role_members)
            ),
        );
        return Resolution::Unresolved;
    }

    // 4. aliasing
    let candidates: Vec<&ContributedMember> = candidates
        .into_iter()
        .filter(|m| !m.is(Marking::Aliased))
        .collect();
    if candidates.is_empty() {
        if placeholder.is_some() {
            result.report(
                MessageCode::PlaceholderUnmatched,
                format!("placeholder {composition}::{slot} only matches aliased role members and is kept as written"),
            );
        }
        return Resolution::NotSynthesized;
    }

    // 5. base-method passthrough
    if candidates.iter().all(|m| m.is(Marking::BaseMethod)) {
        if placeholder.is_some() {
            result.report(
                MessageCode::PlaceholderUnmatched,
                format!("placeholder {composition}::{slot} only matches base-method role members and is kept as written"),
            );
        }
        return Resolution::BaseMethodOnly;
    }

    // 6. abstract fallback
    if candidates.iter().all(|m| m.is(Marking::Abstract)) {
        if let Some(inherited) = group.inherited().find(|m| !m.is(Marking::Abstract)) {
            return Resolution::Ancestor {
                member: inherited.clone(),
                reuse_slot: reusable_slot(inherited),
                subsumed: subsumed(group),
            };
        }
        if let Some(placeholder) = placeholder {
            result.report(
                MessageCode::PlaceholderUnmatched,
                format!(
                    "placeholder {composition}::{slot} only matches abstract role members and is kept as written"
                ),
            );
            return Resolution::ClassMember {
                member: placeholder.clone(),
                subsumed: subsumed(group),
            };
        }
        if context.is_role {
            return Resolution::Abstract {
                member: candidates[0].clone(),
                subsumed: subsumed(group),
            };
        }
        result.report(
            MessageCode::AbstractMemberNotImplemented,
            format!(
                "{composition} does not implement abstract role member {slot} from {}",
                roles_of(candidates)
            ),
        );
        return Resolution::Unresolved;
    }

    // 7. single concrete implementation
    let concrete: Vec<&ContributedMember> = candidates
        .iter()
        .copied()
        .filter(|m| !m.is(Marking::Abstract) && !m.is(Marking::BaseMethod))
        .collect();
    let winner = match concrete.as_slice() {
        [single] => *single,
        _ => {
            let preferred: Vec<&ContributedMember> = concrete
                .iter()
                .copied()
                .filter(|m| m.is(Marking::Supersede))
                .collect();
            match preferred.as_slice() {
                [single] => *single,
                [] => {
                    result.report(
                        MessageCode::Conflict,
                        format!(
                            "conflict in {composition}: {slot} is implemented by {}",
                            roles_of(concrete)
                        ),
                    );
                    return Resolution::Unresolved;
                }
                _ => {
                    result.report(
                        MessageCode::SupersedeConflict,
                        format!(
                            "{composition}: {slot} is preferred by more than one view ({})",
                            roles_of(preferred)
                        ),
                    );
                    return Resolution::Unresolved;
                }
            }
        }
    };

    let target = match placeholder {
        Some(placeholder) => Target::Placeholder(placeholder.clone()),
        None => Target::New {
            reuse_slot: group.inherited().next().is_some_and(reusable_slot),
        },
    };
    Resolution::RoleMember {
        member: winner.clone(),
        target,
        subsumed: subsumed(group),
    }
}

/// Whether an inherited member's virtual slot can be reused
fn reusable_slot(member: &ContributedMember) -> bool {
    member
        .class_definition()
        .is_some_and(|d| d.flags.is_virtual && !d.flags.is_final)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify, Contributions};
    use crate::member_model::MemberOrigin;
    use crate::model::{MethodDefinition, TypeRef};

    fn role_member(role: &str, body: bool) -> ContributedMember {
        let method = MethodDefinition::new("M", TypeRef::Int32);
        let contract = method.reference(TypeRef::named(role));
        let code = body.then(|| {
            MethodRef::new(
                TypeRef::named(format!("{role}/Code")),
                "M",
                vec![TypeRef::named(role)],
                TypeRef::Int32,
            )
        });
        let mut member = ContributedMember::method(
            &method,
            &[],
            MemberOrigin::Role {
                role: TypeRef::named(role),
                contract,
                code,
                backing: None,
                alias_of: None,
            },
        );
        member.mark(Marking::Foreign);
        if !body {
            member.mark(Marking::Abstract);
        }
        member
    }

    fn class_member(declared: bool, virtual_slot: bool) -> ContributedMember {
        let mut method = MethodDefinition::new("M", TypeRef::Int32);
        method.flags.is_virtual = virtual_slot;
        ContributedMember::method(
            &method,
            &[],
            MemberOrigin::Class {
                declaring: TypeRef::named(if declared { "C" } else { "Base" }),
                declared,
                definition: Box::new(method.clone()),
            },
        )
    }

    fn run(members: Vec<ContributedMember>, is_role: bool) -> (Resolution, OperationResult) {
        let contributions = Contributions {
            methods: members,
            others: Vec::new(),
        };
        let mut result = OperationResult::new();
        let groups = classify("C", &contributions, &mut result);
        let mut resolutions = resolve(&groups, CompositionContext { name: "C", is_role }, &mut result);
        (resolutions.remove(0), result)
    }

    #[test]
    fn test_two_concrete_members_conflict() {
        let (resolution, result) = run(vec![role_member("A", true), role_member("B", true)], false);
        assert_eq!(resolution, Resolution::Unresolved);
        let conflict = result.with_code(MessageCode::Conflict).next().unwrap();
        assert!(conflict.text.contains('A') && conflict.text.contains('B'));
    }

    #[test]
    fn test_exclusion_leaves_single_candidate() {
        let mut a = role_member("A", true);
        a.mark(Marking::Excluded);
        let (resolution, result) = run(vec![a, role_member("B", true)], false);
        assert!(result.success());
        match resolution {
            Resolution::RoleMember { member, subsumed, .. } => {
                assert_eq!(member.role(), Some(&TypeRef::named("B")));
                assert_eq!(subsumed.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_excluding_everything_fails() {
        let mut a = role_member("A", true);
        a.mark(Marking::Excluded);
        let (resolution, result) = run(vec![a], false);
        assert_eq!(resolution, Resolution::Unresolved);
        assert!(result.has(MessageCode::AllMembersExcluded));
    }

    #[test]
    fn test_declared_member_supersedes_abstract_without_warning() {
        let (resolution, result) = run(vec![role_member("R", false), class_member(true, false)], false);
        assert!(result.is_empty());
        assert!(matches!(resolution, Resolution::ClassMember { .. }));
    }

    #[test]
    fn test_implicit_supersede_of_concrete_member_warns() {
        let (resolution, result) = run(vec![role_member("R", true), class_member(true, false)], false);
        assert!(result.success());
        assert!(result.has(MessageCode::ImplicitSupersede));
        assert!(matches!(resolution, Resolution::ClassMember { .. }));
    }

    #[test]
    fn test_inherited_member_implements_abstract_slot() {
        let (resolution, result) = run(vec![role_member("R", false), class_member(false, true)], false);
        assert!(result.success());
        assert!(matches!(resolution, Resolution::Ancestor { reuse_slot: true, .. }));
    }

    #[test]
    fn test_abstract_slot_in_role_stays_abstract() {
        let (resolution, _) = run(vec![role_member("R", false)], true);
        assert!(matches!(resolution, Resolution::Abstract { .. }));
        let (resolution, result) = run(vec![role_member("R", false)], false);
        assert_eq!(resolution, Resolution::Unresolved);
        assert!(result.has(MessageCode::AbstractMemberNotImplemented));
    }

    #[test]
    fn test_all_aliased_is_not_synthesized() {
        let mut a = role_member("A", true);
        a.mark(Marking::Aliased);
        let (resolution, result) = run(vec![a], false);
        assert!(result.success());
        assert_eq!(resolution, Resolution::NotSynthesized);
    }

    #[test]
    fn test_view_preference_breaks_conflict() {
        let mut b = role_member("B", true);
        b.mark(Marking::Supersede);
        let (resolution, result) = run(vec![role_member("A", true), b], false);
        assert!(result.success());
        match resolution {
            Resolution::RoleMember { member, .. } => assert_eq!(member.role(), Some(&TypeRef::named("B"))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_base_method_only() {
        let mut a = role_member("A", true);
        a.mark(Marking::BaseMethod);
        let (resolution, _) = run(vec![a], false);
        assert_eq!(resolution, Resolution::BaseMethodOnly);
    }

    fn placeholder() -> ContributedMember {
        let mut member = class_member(true, false);
        member.mark(Marking::Placeholder);
        member
    }

    #[test]
    fn test_placeholder_over_aliased_members_warns() {
        let mut a = role_member("A", true);
        a.mark(Marking::Aliased);
        let (resolution, result) = run(vec![a, placeholder()], false);
        assert!(result.success());
        assert_eq!(result.numbers(), vec![203]);
        assert_eq!(resolution, Resolution::NotSynthesized);
    }

    #[test]
    fn test_placeholder_over_base_methods_warns() {
        let mut a = role_member("A", true);
        a.mark(Marking::BaseMethod);
        let (resolution, result) = run(vec![a, placeholder()], false);
        assert!(result.has(MessageCode::PlaceholderUnmatched));
        assert_eq!(resolution, Resolution::BaseMethodOnly);
    }
}
