// Copyright 2025 Cowboy AI, LLC.

//! In-memory model of a compiled module
//!
//! The weaver never touches a binary format directly. An I/O collaborator
//! loads a module into this model (or builds one with
//! [`ModuleBuilder`](crate::builder::ModuleBuilder)), the engine mutates it,
//! and the collaborator writes it back out.

pub mod body;
pub mod members;
pub mod module;
pub mod types;

pub use body::{Instruction, MethodBody};
pub use members::{
    Annotation, EventDefinition, FieldDefinition, FieldRef, MethodDefinition, MethodFlags,
    MethodKind, MethodRef, Parameter, PropertyDefinition, Visibility, CONSTRUCTOR_NAME,
    STATIC_CONSTRUCTOR_NAME,
};
pub use module::{
    root_method, root_methods, GenericParameter, Module, MutationStamp, TypeDefinition, TypeKind,
};
pub use types::{
    nested_name, simple_name, TypeRef, DOES_MARKER, ROLE_MARKER, ROOT_TYPE_NAME,
};
