// Copyright 2025 Cowboy AI, LLC.

//! Contributed members
//!
//! A [`ContributedMember`] is a member as seen through one role, one
//! disambiguation view or the composition type itself. Signatures are
//! always expressed in the composition type's frame: the type arguments a
//! role is composed with have already been substituted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::{MethodDefinition, MethodRef, TypeRef};

/// Kind of member, used by the kind-clash diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberKind {
    /// Method (accessors included)
    Method,
    /// Property
    Property,
    /// Event
    Event,
    /// Field
    Field,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberKind::Method => "method",
            MemberKind::Property => "property",
            MemberKind::Event => "event",
            MemberKind::Field => "field",
        };
        f.write_str(name)
    }
}

/// Explicit tags attached to a member before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Marking {
    /// Removed from its group by a view
    Excluded,
    /// Reachable only under an alias
    Aliased,
    /// Has no implementation
    Abstract,
    /// Contributed by a role
    Foreign,
    /// Class member whose body is replaced by composition
    Placeholder,
    /// Wins its group (class member) or is preferred among roles (role member)
    Supersede,
    /// Only delegates to the root type's implementation
    BaseMethod,
}

/// Accessor ownership of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorOf {
    /// Property accessor
    Property(String),
    /// Event accessor
    Event(String),
}

impl AccessorOf {
    /// Name of the owning property or event
    pub fn name(&self) -> &str {
        match self {
            AccessorOf::Property(name) | AccessorOf::Event(name) => name,
        }
    }
}

/// Storage of a field-backed (auto) property accessor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldBacking {
    /// Property name
    pub property: String,
    /// Type of the stored value, in the composition frame
    pub ty: TypeRef,
    /// Whether the accessor stores rather than loads
    pub is_setter: bool,
}

/// Where a contributed member comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MemberOrigin {
    /// Member of a composed role's contract
    Role {
        /// Role as composed, in the composition frame
        role: TypeRef,
        /// Contract member this slot implements, in the role frame
        contract: MethodRef,
        /// Code-container function holding the body
        code: Option<MethodRef>,
        /// Auto-property storage, when the member has no code function
        backing: Option<FieldBacking>,
        /// Name under which the role declares the member, when this is an aliased copy
        alias_of: Option<String>,
    },
    /// Member of a disambiguation view (never emitted)
    View {
        /// View type
        view: String,
        /// Role the view applies to
        role: TypeRef,
    },
    /// Member declared on or inherited by the composition type
    Class {
        /// Declaring type, in the composition frame
        declaring: TypeRef,
        /// Declared by the composition type itself
        declared: bool,
        /// Dispatch attributes of the definition
        definition: Box<MethodDefinition>,
    },
}

/// A member contributed to a composition
#[derive(Debug, Clone, PartialEq)]
pub struct ContributedMember {
    /// Member kind
    pub kind: MemberKind,
    /// Member name
    pub name: String,
    /// Method generic arity
    pub generic_arity: u16,
    /// Parameter types in the composition frame
    pub parameters: Vec<TypeRef>,
    /// Return type (field, property or event type for non-methods)
    pub return_type: TypeRef,
    /// Where the member comes from
    pub origin: MemberOrigin,
    /// Accessor ownership
    pub accessor_of: Option<AccessorOf>,
    /// Tags
    pub markings: BTreeSet<Marking>,
}

impl ContributedMember {
    /// A method member with no markings
    pub fn method(method: &MethodDefinition, type_arguments: &[TypeRef], origin: MemberOrigin) -> Self {
        Self {
            kind: MemberKind::Method,
            name: method.name.clone(),
            generic_arity: method.generic_arity,
            parameters: method
                .parameters
                .iter()
                .map(|p| p.ty.substitute(type_arguments))
                .collect(),
            return_type: method.return_type.substitute(type_arguments),
            origin,
            accessor_of: None,
            markings: BTreeSet::new(),
        }
    }

    /// Add a marking
    pub fn mark(&mut self, marking: Marking) {
        self.markings.insert(marking);
    }

    /// Whether the member carries a marking
    pub fn is(&self, marking: Marking) -> bool {
        self.markings.contains(&marking)
    }

    /// Whether the member was contributed by a role
    pub fn is_role_member(&self) -> bool {
        matches!(self.origin, MemberOrigin::Role { .. })
    }

    /// Whether the member is declared by the composition type itself
    pub fn is_declared(&self) -> bool {
        matches!(self.origin, MemberOrigin::Class { declared: true, .. })
    }

    /// Whether the member is inherited by the composition type
    pub fn is_inherited(&self) -> bool {
        matches!(self.origin, MemberOrigin::Class { declared: false, .. })
    }

    /// Role the member comes from
    pub fn role(&self) -> Option<&TypeRef> {
        match &self.origin {
            MemberOrigin::Role { role, .. } | MemberOrigin::View { role, .. } => Some(role),
            MemberOrigin::Class { .. } => None,
        }
    }

    /// Contract member a role member implements
    pub fn contract(&self) -> Option<&MethodRef> {
        match &self.origin {
            MemberOrigin::Role { contract, .. } => Some(contract),
            _ => None,
        }
    }

    /// Class member definition
    pub fn class_definition(&self) -> Option<&MethodDefinition> {
        match &self.origin {
            MemberOrigin::Class { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Declaring type of a class member
    pub fn declaring(&self) -> Option<&TypeRef> {
        match &self.origin {
            MemberOrigin::Class { declaring, .. } => Some(declaring),
            _ => None,
        }
    }

    /// Whether two members denote the same slot: same name, generic arity
    /// and parameter types. Return types are not compared.
    pub fn same_slot(&self, other: &ContributedMember) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.generic_arity == other.generic_arity
            && self.parameters == other.parameters
    }

    /// Reference to a class member on its declaring type
    pub fn class_reference(&self) -> Option<MethodRef> {
        match &self.origin {
            MemberOrigin::Class {
                declaring,
                definition,
                ..
            } => Some(definition.reference(declaring.clone())),
            _ => None,
        }
    }

    /// Short description for messages: `A::M(int32)`
    pub fn describe(&self) -> String {
        let owner = match &self.origin {
            MemberOrigin::Role { role, .. } | MemberOrigin::View { role, .. } => role.to_string(),
            MemberOrigin::Class { declaring, .. } => declaring.to_string(),
        };
        let params = self
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{owner}::{}({params})", self.name)
    }
}
