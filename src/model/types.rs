// Copyright 2025 Cowboy AI, LLC.

//! Type references
//!
//! Generic parameters are positional, the way compiled modules encode them:
//! `!n` is the n-th parameter of the enclosing type (nested types share the
//! parameters of the type that declares them) and `!!n` the n-th parameter
//! of the enclosing method. Substituting type arguments into a reference
//! moves it from a role's frame into the frame of the type composing it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the universal root type
pub const ROOT_TYPE_NAME: &str = "object";

/// Marker contract implemented by every role
pub const ROLE_MARKER: &str = "Roles.Role";

/// Generic marker contract a composition uses to declare a composed role
pub const DOES_MARKER: &str = "Roles.Does`1";

/// Reference to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeRef {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// String
    String,
    /// The universal root type
    Object,
    /// Non-generic named type
    Named(String),
    /// Generic type instantiated with arguments
    Instance {
        /// Full name of the generic definition
        definition: String,
        /// Positional type arguments
        arguments: Vec<TypeRef>,
    },
    /// Positional parameter of the enclosing type (`!n`)
    TypeParam(u16),
    /// Positional parameter of the enclosing method (`!!n`)
    MethodParam(u16),
}

impl TypeRef {
    /// Reference a non-generic type by name
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Reference a generic instance
    pub fn instance(definition: impl Into<String>, arguments: Vec<TypeRef>) -> Self {
        TypeRef::Instance {
            definition: definition.into(),
            arguments,
        }
    }

    /// Reference a type by name, using the open instance `T<!0, .., !n>`
    /// when the type has generic parameters
    pub fn open(definition: impl Into<String>, arity: usize) -> Self {
        if arity == 0 {
            TypeRef::Named(definition.into())
        } else {
            TypeRef::Instance {
                definition: definition.into(),
                arguments: (0..arity as u16).map(TypeRef::TypeParam).collect(),
            }
        }
    }

    /// `Roles.Does<role>` marker
    pub fn does(role: TypeRef) -> Self {
        TypeRef::instance(DOES_MARKER, vec![role])
    }

    /// `Roles.Role` marker
    pub fn role_marker() -> Self {
        TypeRef::named(ROLE_MARKER)
    }

    /// Full name of the referenced definition, if this names one
    pub fn definition_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            TypeRef::Instance { definition, .. } => Some(definition),
            TypeRef::Object => Some(ROOT_TYPE_NAME),
            _ => None,
        }
    }

    /// Type arguments of a generic instance (empty otherwise)
    pub fn arguments(&self) -> &[TypeRef] {
        match self {
            TypeRef::Instance { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// Whether this is the universal root type
    pub fn is_root(&self) -> bool {
        match self {
            TypeRef::Object => true,
            TypeRef::Named(name) => name == ROOT_TYPE_NAME,
            _ => false,
        }
    }

    /// Whether this is a `Roles.Does<_>` marker, returning the composed type
    pub fn as_does(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Instance {
                definition,
                arguments,
            } if definition == DOES_MARKER && arguments.len() == 1 => arguments.first(),
            _ => None,
        }
    }

    /// Whether this is the `Roles.Role` marker
    pub fn is_role_marker(&self) -> bool {
        matches!(self, TypeRef::Named(name) if name == ROLE_MARKER)
    }

    /// Whether this reference is a bare generic parameter
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self, TypeRef::TypeParam(_) | TypeRef::MethodParam(_))
    }

    /// Whether the reference mentions any type parameter
    pub fn is_open(&self) -> bool {
        match self {
            TypeRef::TypeParam(_) => true,
            TypeRef::Instance { arguments, .. } => arguments.iter().any(TypeRef::is_open),
            _ => false,
        }
    }

    /// Replace `!n` with the n-th argument. Parameters without a matching
    /// argument stay as they are; method parameters are never touched.
    pub fn substitute(&self, type_arguments: &[TypeRef]) -> TypeRef {
        match self {
            TypeRef::TypeParam(position) => type_arguments
                .get(*position as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeRef::Instance {
                definition,
                arguments,
            } => TypeRef::Instance {
                definition: definition.clone(),
                arguments: arguments.iter().map(|a| a.substitute(type_arguments)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Same definition, new arguments (used to move a reference to a
    /// nested type sharing its declaring type's parameters)
    pub fn with_definition(&self, definition: impl Into<String>) -> TypeRef {
        let definition = definition.into();
        match self {
            TypeRef::Instance { arguments, .. } => TypeRef::Instance {
                definition,
                arguments: arguments.clone(),
            },
            _ => TypeRef::Named(definition),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Int32 => write!(f, "int32"),
            TypeRef::Int64 => write!(f, "int64"),
            TypeRef::String => write!(f, "string"),
            TypeRef::Object => write!(f, "{ROOT_TYPE_NAME}"),
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::Instance {
                definition,
                arguments,
            } => {
                let base = definition.split('`').next().unwrap_or(definition);
                write!(f, "{base}<")?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeRef::TypeParam(position) => write!(f, "!{position}"),
            TypeRef::MethodParam(position) => write!(f, "!!{position}"),
        }
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        if name == ROOT_TYPE_NAME {
            TypeRef::Object
        } else {
            TypeRef::Named(name.to_string())
        }
    }
}

/// Last segment of a full type name (`Ns.Outer/Inner` -> `Inner`)
pub fn simple_name(full_name: &str) -> &str {
    let nested = full_name.rsplit('/').next().unwrap_or(full_name);
    let name = nested.rsplit('.').next().unwrap_or(nested);
    name.split('`').next().unwrap_or(name)
}

/// Full name of a type nested in `outer`
pub fn nested_name(outer: &str, inner: &str) -> String {
    format!("{outer}/{inner}")
}
