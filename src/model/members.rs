// Copyright 2025 Cowboy AI, LLC.

//! Member definitions and member references

use serde::{Deserialize, Serialize};
use std::fmt;

use super::body::MethodBody;
use super::types::TypeRef;

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Name of static constructors
pub const STATIC_CONSTRUCTOR_NAME: &str = ".cctor";

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Visibility {
    /// Declaring type only
    Private,
    /// Declaring type and subtypes
    Protected,
    /// Anything in the same module
    Internal,
    /// Everyone
    Public,
}

impl Visibility {
    /// Whether this is public
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }
}

/// Well-known source markers carried by types and members
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Annotation {
    /// Interface is a disambiguation view over one role
    RoleView,
    /// Member body is a stand-in replaced by composition
    Placeholder,
    /// View member removes the role member from its conflict group
    Exclude,
    /// View member exposes the role member under another name
    Alias(String),
    /// Member wins its conflict group
    Supersede,
    /// Role member only delegates to the root type's implementation
    BaseMethod,
    /// Emitted by a compiler rather than written by hand
    CompilerGenerated,
}

/// Method attributes relevant to dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodFlags {
    /// No instance
    pub is_static: bool,
    /// No body
    pub is_abstract: bool,
    /// Dispatched through a virtual slot
    pub is_virtual: bool,
    /// Slot cannot be overridden further
    pub is_final: bool,
    /// Introduces a new slot instead of reusing an inherited one
    pub is_new_slot: bool,
    /// Implemented outside the module (platform interop)
    pub is_interop: bool,
}

/// Kind of method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    /// Ordinary method (including accessors)
    #[default]
    Normal,
    /// Instance constructor
    Constructor,
    /// Type initializer
    StaticConstructor,
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeRef,
}

impl Parameter {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A method declared by a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// Method kind
    #[serde(default)]
    pub kind: MethodKind,
    /// Accessibility
    pub visibility: Visibility,
    /// Dispatch attributes
    #[serde(default)]
    pub flags: MethodFlags,
    /// Number of method generic parameters
    #[serde(default)]
    pub generic_arity: u16,
    /// Parameters, excluding the implicit instance
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Return type
    pub return_type: TypeRef,
    /// Instructions, absent for abstract and interop methods
    #[serde(default)]
    pub body: Option<MethodBody>,
    /// Explicit override edges: contract or base members this method implements
    #[serde(default)]
    pub overrides: Vec<MethodRef>,
    /// Source markers
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl MethodDefinition {
    /// Create a public instance method with no parameters and no body
    pub fn new(name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Normal,
            visibility: Visibility::Public,
            flags: MethodFlags::default(),
            generic_arity: 0,
            parameters: Vec::new(),
            return_type,
            body: None,
            overrides: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Create a public parameterless instance constructor
    pub fn constructor(body: MethodBody) -> Self {
        let mut ctor = Self::new(CONSTRUCTOR_NAME, TypeRef::Void);
        ctor.kind = MethodKind::Constructor;
        ctor.body = Some(body);
        ctor
    }

    /// Whether this is an instance or static constructor
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, MethodKind::Constructor | MethodKind::StaticConstructor)
    }

    /// Whether this is a non-constructor instance method
    pub fn is_instance_member(&self) -> bool {
        !self.flags.is_static && !self.is_constructor()
    }

    /// Parameter types in order
    pub fn parameter_types(&self) -> Vec<TypeRef> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }

    /// Whether the method carries an annotation
    pub fn has_annotation(&self, annotation: &Annotation) -> bool {
        self.annotations.contains(annotation)
    }

    /// Alias name from an `Alias` annotation
    pub fn alias(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Alias(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether this method has the same name and parameter types as `other`
    pub fn same_signature(&self, name: &str, parameters: &[TypeRef], generic_arity: u16) -> bool {
        self.name == name
            && self.generic_arity == generic_arity
            && self.parameters.len() == parameters.len()
            && self
                .parameters
                .iter()
                .zip(parameters)
                .all(|(p, t)| &p.ty == t)
    }

    /// Reference to this method as declared on `declaring`
    pub fn reference(&self, declaring: TypeRef) -> MethodRef {
        MethodRef {
            declaring,
            name: self.name.clone(),
            parameters: self.parameter_types(),
            return_type: self.return_type.clone(),
            generic_arity: self.generic_arity,
            generic_arguments: Vec::new(),
        }
    }
}

/// A field declared by a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeRef,
    /// Accessibility
    pub visibility: Visibility,
    /// Shared by all instances
    #[serde(default)]
    pub is_static: bool,
    /// Assignable only during construction
    #[serde(default)]
    pub is_init_only: bool,
    /// Source markers
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl FieldDefinition {
    /// Create a private instance field
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            visibility: Visibility::Private,
            is_static: false,
            is_init_only: false,
            annotations: Vec::new(),
        }
    }

    /// Reference to this field as declared on `declaring`
    pub fn reference(&self, declaring: TypeRef) -> FieldRef {
        FieldRef {
            declaring,
            name: self.name.clone(),
            ty: self.ty.clone(),
        }
    }
}

/// A property: a name grouping accessor methods of the same type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Property name
    pub name: String,
    /// Property type
    pub ty: TypeRef,
    /// Name of the getter method
    #[serde(default)]
    pub getter: Option<String>,
    /// Name of the setter method
    #[serde(default)]
    pub setter: Option<String>,
    /// Source markers
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl PropertyDefinition {
    /// Accessor method names that are present
    pub fn accessors(&self) -> impl Iterator<Item = &str> {
        self.getter.iter().chain(self.setter.iter()).map(String::as_str)
    }
}

/// An event: a name grouping add/remove/raise accessor methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    /// Event name
    pub name: String,
    /// Handler type
    pub ty: TypeRef,
    /// Name of the add accessor
    #[serde(default)]
    pub add: Option<String>,
    /// Name of the remove accessor
    #[serde(default)]
    pub remove: Option<String>,
    /// Name of the raise accessor
    #[serde(default)]
    pub raise: Option<String>,
    /// Source markers
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl EventDefinition {
    /// Accessor method names that are present
    pub fn accessors(&self) -> impl Iterator<Item = &str> {
        self.add
            .iter()
            .chain(self.remove.iter())
            .chain(self.raise.iter())
            .map(String::as_str)
    }
}

/// Reference to a method, as it appears in instructions and override edges
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Type the method is looked up on
    pub declaring: TypeRef,
    /// Method name
    pub name: String,
    /// Parameter types in the declaring type's frame
    #[serde(default)]
    pub parameters: Vec<TypeRef>,
    /// Return type in the declaring type's frame
    pub return_type: TypeRef,
    /// Number of method generic parameters of the target
    #[serde(default)]
    pub generic_arity: u16,
    /// Method generic arguments at the call site
    #[serde(default)]
    pub generic_arguments: Vec<TypeRef>,
}

impl MethodRef {
    /// Create a reference to a non-generic method
    pub fn new(
        declaring: TypeRef,
        name: impl Into<String>,
        parameters: Vec<TypeRef>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            declaring,
            name: name.into(),
            parameters,
            return_type,
            generic_arity: 0,
            generic_arguments: Vec::new(),
        }
    }

    /// Reference to the root type's constructor
    pub fn root_constructor() -> Self {
        Self::new(TypeRef::Object, CONSTRUCTOR_NAME, Vec::new(), TypeRef::Void)
    }

    /// Whether this refers to an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Whether this reference targets a member of the named definition
    pub fn targets(&self, definition: &str) -> bool {
        self.declaring.definition_name() == Some(definition)
    }

    /// Whether both refer to the same member, ignoring the declaring type
    pub fn same_member(&self, other: &MethodRef) -> bool {
        self.name == other.name
            && self.generic_arity == other.generic_arity
            && self.parameters == other.parameters
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.return_type, self.declaring, self.name)?;
        if self.generic_arity > 0 {
            write!(f, "<{}>", self.generic_arity)?;
        }
        write!(f, "(")?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")
    }
}

/// Reference to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Type the field is declared on
    pub declaring: TypeRef,
    /// Field name
    pub name: String,
    /// Field type in the declaring type's frame
    pub ty: TypeRef,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(declaring: TypeRef, name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            declaring,
            name: name.into(),
            ty,
        }
    }

    /// Whether this reference targets a field of the named definition
    pub fn targets(&self, definition: &str) -> bool {
        self.declaring.definition_name() == Some(definition)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.ty, self.declaring, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_signature_matching() {
        let mut m = MethodDefinition::new("Run", TypeRef::Int32);
        m.parameters.push(Parameter::new("x", TypeRef::String));
        assert!(m.same_signature("Run", &[TypeRef::String], 0));
        assert!(!m.same_signature("Run", &[TypeRef::Int32], 0));
        assert!(!m.same_signature("Run", &[TypeRef::String], 1));
        assert!(m.is_instance_member());
    }

    #[test]
    fn test_alias_annotation() {
        let mut m = MethodDefinition::new("Run", TypeRef::Void);
        assert_eq!(m.alias(), None);
        m.annotations.push(Annotation::Alias("Walk".into()));
        assert_eq!(m.alias(), Some("Walk"));
    }

    #[test]
    fn test_method_ref_display() {
        let r = MethodRef::new(
            TypeRef::named("Ns.R"),
            "Add",
            vec![TypeRef::Int32, TypeRef::Int32],
            TypeRef::Int32,
        );
        assert_eq!(r.to_string(), "int32 Ns.R::Add(int32, int32)");
        assert!(r.targets("Ns.R"));
        assert!(MethodRef::root_constructor().is_constructor());
    }

    #[test]
    fn test_accessor_iteration() {
        let p = PropertyDefinition {
            name: "Name".into(),
            ty: TypeRef::String,
            getter: Some("get_Name".into()),
            setter: None,
            annotations: vec![],
        };
        assert_eq!(p.accessors().collect::<Vec<_>>(), vec!["get_Name"]);
    }
}
