// Copyright 2025 Cowboy AI, LLC.

//! # CIM Roles
//!
//! Post-compilation role composition for compiled modules.
//!
//! A role is a reusable unit of behavior and state, written as a class
//! implementing the `Roles.Role` marker. A type composes a role by implementing
//! `Roles.Does<R>`. After compilation the weaver rewrites the module so that:
//!
//! - **Roles** become plain contracts, with their state moved into a nested
//!   `State` type and their code into static functions on a nested `Code` type
//! - **Compositions** implement every role contract, forwarding to the role
//!   code and holding one state object per composed role
//! - **Conflicts** between members of the same name are resolved by the
//!   composition's own members, view exclusions and aliases, or supersede
//!   markers, and reported when they cannot be
//!
//! The engine works on the in-memory [`model`]. Reading and writing the
//! binary format is left to the caller. All problems are returned as
//! [`Message`]s in an [`OperationResult`]; a pass that reports an error
//! leaves the module untouched.
//!
//! ```
//! use cim_roles::builder::ModuleBuilder;
//! use cim_roles::model::TypeRef;
//! use cim_roles::{weave, WeaveConfig};
//!
//! let mut module = ModuleBuilder::new("Example")
//!     .role("Greeter", |r| r.method("Greet", TypeRef::String, |m| m.returns_string("hello")))
//!     .class("Person", |c| c.does("Greeter"))
//!     .build()
//!     .unwrap();
//!
//! let result = weave(&mut module, WeaveConfig::default());
//! assert!(result.success());
//! assert!(module.get_type("Greeter/Code").is_some());
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod classifier;
pub mod composer;
pub mod config;
pub mod errors;
pub mod interp;
pub mod member_model;
pub mod messages;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod self_type;
pub mod splitter;
pub mod verify;

pub use config::WeaveConfig;
pub use errors::{WeaveError, WeaveResult};
pub use messages::{Message, MessageCode, OperationResult, Severity};
pub use model::{Module, TypeRef};
pub use orchestrator::Weaver;
pub use registry::{RoleRegistry, TypeEntry};
pub use splitter::{RoleCatalog, SplitRole};
pub use verify::{StructuralVerifier, VerificationReport, Verifier};

/// Weave `module` in place with the built-in verifier
pub fn weave(module: &mut Module, config: WeaveConfig) -> OperationResult {
    Weaver::new(config).weave(module)
}
