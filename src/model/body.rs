// Copyright 2025 Cowboy AI, LLC.

//! Method bodies: a small stack instruction set

use serde::{Deserialize, Serialize};

use super::members::{FieldRef, MethodRef};
use super::types::TypeRef;

/// One stack-machine instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// Do nothing
    Nop,
    /// Push argument `n` (argument 0 is the instance for instance methods)
    LoadArg(u16),
    /// Pop into argument `n`
    StoreArg(u16),
    /// Push local `n`
    LoadLocal(u16),
    /// Pop into local `n`
    StoreLocal(u16),
    /// Push an integer constant
    LoadInt(i64),
    /// Push a string constant
    LoadString(String),
    /// Push null
    LoadNull,
    /// Pop an instance, push one of its fields
    LoadField(FieldRef),
    /// Pop a value and an instance, store the value into the field
    StoreField(FieldRef),
    /// Push a static field
    LoadStaticField(FieldRef),
    /// Pop into a static field
    StoreStaticField(FieldRef),
    /// Non-virtual call
    Call(MethodRef),
    /// Virtual call dispatched on the runtime type of the instance
    CallVirt(MethodRef),
    /// Allocate an instance and run the referenced constructor on it
    NewObj(MethodRef),
    /// Integer addition
    Add,
    /// Integer subtraction
    Sub,
    /// Integer multiplication
    Mul,
    /// Discard the top of the stack
    Pop,
    /// Duplicate the top of the stack
    Dup,
    /// Return (with the top of the stack unless the method returns void)
    Ret,
}

impl Instruction {
    /// Method referenced by the instruction, if any
    pub fn method_ref(&self) -> Option<&MethodRef> {
        match self {
            Instruction::Call(m) | Instruction::CallVirt(m) | Instruction::NewObj(m) => Some(m),
            _ => None,
        }
    }

    /// Field referenced by the instruction, if any
    pub fn field_ref(&self) -> Option<&FieldRef> {
        match self {
            Instruction::LoadField(f)
            | Instruction::StoreField(f)
            | Instruction::LoadStaticField(f)
            | Instruction::StoreStaticField(f) => Some(f),
            _ => None,
        }
    }
}

/// Instructions and local slots of a method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Types of local slots
    #[serde(default)]
    pub locals: Vec<TypeRef>,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Create a body without locals
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            locals: Vec::new(),
            instructions,
        }
    }

    /// A body that only returns
    pub fn empty() -> Self {
        Self::new(vec![Instruction::Ret])
    }

    /// Body of a parameterless constructor that only calls the root constructor
    pub fn default_constructor() -> Self {
        Self::new(vec![
            Instruction::LoadArg(0),
            Instruction::Call(MethodRef::root_constructor()),
            Instruction::Ret,
        ])
    }

    /// Add a local slot, returning its index
    pub fn add_local(&mut self, ty: TypeRef) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// All methods referenced by the body
    pub fn method_refs(&self) -> impl Iterator<Item = &MethodRef> {
        self.instructions.iter().filter_map(Instruction::method_ref)
    }

    /// All fields referenced by the body
    pub fn field_refs(&self) -> impl Iterator<Item = &FieldRef> {
        self.instructions.iter().filter_map(Instruction::field_ref)
    }

    /// Index of the first call to a constructor of `definition` on the
    /// instance, i.e. the base or sibling constructor call of a constructor
    pub fn constructor_call_index(&self, definition: &str) -> Option<usize> {
        self.instructions.iter().position(|i| {
            matches!(i, Instruction::Call(m) if m.is_constructor()
                && m.declaring.definition_name() == Some(definition))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constructor_calls_root() {
        let body = MethodBody::default_constructor();
        assert_eq!(body.constructor_call_index("object"), Some(1));
        assert_eq!(body.method_refs().count(), 1);
    }

    #[test]
    fn test_add_local() {
        let mut body = MethodBody::empty();
        assert_eq!(body.add_local(TypeRef::Int32), 0);
        assert_eq!(body.add_local(TypeRef::String), 1);
    }

    #[test]
    fn test_field_refs() {
        let f = FieldRef::new(TypeRef::named("R"), "count", TypeRef::Int32);
        let body = MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadField(f.clone()),
            Instruction::Ret,
        ]);
        assert_eq!(body.field_refs().collect::<Vec<_>>(), vec![&f]);
    }
}
