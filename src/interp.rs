// Copyright 2025 Cowboy AI, LLC.

//! Reference evaluator for the instruction model
//!
//! Executes method bodies directly over a [`Module`] so woven output can be
//! checked by behavior: instantiate a composition, call a member through
//! its contract, and look at what comes back. Bodies are straight-line
//! stack code; dispatch follows override edges first, then public
//! name matches, nearest type first.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::model::{
    Instruction, MethodDefinition, MethodKind, MethodRef, Module, TypeDefinition, TypeRef,
    STATIC_CONSTRUCTOR_NAME,
};

const DEFAULT_MAX_DEPTH: usize = 256;

/// Errors raised while evaluating
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// Type not present in the module
    #[error("type not found: {0}")]
    TypeNotFound(String),

    /// Method not present on its declaring type
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Interface or abstract type instantiated
    #[error("cannot instantiate {0}")]
    NotInstantiable(String),

    /// Member access on null
    #[error("null reference in {0}")]
    NullReference(String),

    /// Instruction needed more operands than the stack held
    #[error("evaluation stack underflow in {0}")]
    StackUnderflow(String),

    /// Operand of the wrong kind
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Argument or local index out of range
    #[error("invalid slot {slot} in {method}")]
    InvalidSlot {
        /// Method being executed
        method: String,
        /// Offending index
        slot: u16,
    },

    /// Virtual call with no implementation on the receiver
    #[error("no implementation of {0}")]
    NoImplementation(String),

    /// Call depth limit reached
    #[error("call depth exceeded {0}")]
    DepthExceeded(usize),
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Heap object: its runtime type and field values
#[derive(Debug)]
pub struct Object {
    /// Runtime type
    pub ty: TypeRef,
    fields: HashMap<(String, String), Value>,
}

/// Evaluation value
#[derive(Clone)]
pub enum Value {
    /// Null reference or no value
    Null,
    /// Any integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
    /// Reference to a heap object
    Object(Rc<RefCell<Object>>),
}

impl Value {
    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type name of an object
    pub fn type_name(&self) -> Option<String> {
        match self {
            Value::Object(object) => object.borrow().ty.definition_name().map(str::to_string),
            _ => None,
        }
    }

    fn default_for(ty: &TypeRef) -> Value {
        match ty {
            TypeRef::Int32 | TypeRef::Int64 => Value::Int(0),
            TypeRef::Bool => Value::Bool(false),
            _ => Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Object(object) => write!(f, "<{}>", object.borrow().ty),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

fn field_key(declaring: &TypeRef, name: &str) -> (String, String) {
    (
        declaring.definition_name().unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// Executes methods of one module
pub struct Evaluator<'m> {
    module: &'m Module,
    statics: HashMap<(String, String), Value>,
    initialized: HashSet<String>,
    depth: usize,
    max_depth: usize,
}

impl<'m> Evaluator<'m> {
    /// Create an evaluator with empty static state
    pub fn new(module: &'m Module) -> Self {
        Self {
            module,
            statics: HashMap::new(),
            initialized: HashSet::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit nested calls
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Create an instance of a non-generic type, running the constructor
    /// whose parameter count matches `args`
    pub fn instantiate(&mut self, type_name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let module = self.module;
        let ty = module
            .get_type(type_name)
            .ok_or_else(|| EvalError::TypeNotFound(type_name.to_string()))?;
        let object = self.allocate(&ty.self_reference())?;
        let ctor = ty
            .methods
            .iter()
            .find(|m| m.kind == MethodKind::Constructor && m.parameters.len() == args.len());
        match ctor {
            Some(ctor) => {
                let mut call = vec![object.clone()];
                call.extend(args);
                self.invoke(ctor, call)?;
            }
            None if args.is_empty() => {}
            None => {
                return Err(EvalError::MethodNotFound(format!(
                    "{type_name}::.ctor with {} arguments",
                    args.len()
                )))
            }
        }
        Ok(object)
    }

    /// Call the instance method `name` of the receiver's runtime type (or
    /// its bases) through virtual dispatch
    pub fn call_method(&mut self, target: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let runtime = self.runtime_type(target, name)?;
        let method = self
            .chain(runtime)
            .into_iter()
            .find_map(|(declaring, ty)| {
                ty.methods
                    .iter()
                    .find(|m| m.is_instance_member() && m.name == name && m.parameters.len() == args.len())
                    .map(|m| m.reference(declaring))
            })
            .ok_or_else(|| EvalError::MethodNotFound(format!("{}::{name}", runtime.name)))?;
        self.call_virtual(&method, target.clone(), args)
    }

    /// Call `method` on `this` through virtual dispatch, as `callvirt` does
    pub fn call_virtual(&mut self, method: &MethodRef, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Object(object) = &this else {
            return native(method, &this, &args)
                .ok_or_else(|| EvalError::NullReference(method.to_string()));
        };
        let runtime = object.borrow().ty.clone();
        let module = self.module;
        let ty = module
            .resolve_type(&runtime)
            .ok_or_else(|| EvalError::TypeNotFound(runtime.to_string()))?;

        let implementation = self.chain(ty).into_iter().find_map(|(_, candidate)| {
            candidate
                .methods
                .iter()
                .filter(|m| m.is_instance_member() && m.body.is_some())
                .find(|m| {
                    m.overrides.iter().any(|edge| module.override_reaches(edge, method))
                })
                .or_else(|| {
                    candidate.methods.iter().find(|m| {
                        m.is_instance_member()
                            && m.body.is_some()
                            && m.flags.is_virtual
                            && m.visibility.is_public()
                            && m.name == method.name
                            && m.generic_arity == method.generic_arity
                            && m.parameters.len() == method.parameters.len()
                    })
                })
        });
        let implementation =
            implementation.or_else(|| module.resolve_method(method).filter(|m| m.body.is_some()));

        match implementation {
            Some(found) => {
                let mut call = vec![this.clone()];
                call.extend(args);
                self.invoke(found, call)
            }
            None => native(method, &this, &args)
                .ok_or_else(|| EvalError::NoImplementation(format!("{method} on {runtime}"))),
        }
    }

    /// Call a static method
    pub fn call_static(&mut self, method: &MethodRef, args: Vec<Value>) -> EvalResult<Value> {
        let module = self.module;
        let found = module
            .resolve_method(method)
            .filter(|m| m.flags.is_static)
            .ok_or_else(|| EvalError::MethodNotFound(method.to_string()))?;
        self.ensure_initialized(&method.declaring)?;
        self.invoke(found, args)
    }

    /// Read an instance field of an object
    pub fn field(&self, object: &Value, declaring: &str, name: &str) -> EvalResult<Value> {
        let Value::Object(object) = object else {
            return Err(EvalError::NullReference(format!("{declaring}::{name}")));
        };
        let value = object
            .borrow()
            .fields
            .get(&(declaring.to_string(), name.to_string()))
            .cloned();
        Ok(value.unwrap_or(Value::Null))
    }

    fn runtime_type(&self, target: &Value, context: &str) -> EvalResult<&'m TypeDefinition> {
        let Value::Object(object) = target else {
            return Err(EvalError::NullReference(context.to_string()));
        };
        let runtime = object.borrow().ty.clone();
        self.module
            .resolve_type(&runtime)
            .ok_or_else(|| EvalError::TypeNotFound(runtime.to_string()))
    }

    /// `ty` and its bases, nearest first
    fn chain(&self, ty: &'m TypeDefinition) -> Vec<(TypeRef, &'m TypeDefinition)> {
        let mut chain = vec![(ty.self_reference(), ty)];
        chain.extend(self.module.base_chain(ty));
        chain
    }

    fn allocate(&mut self, ty: &TypeRef) -> EvalResult<Value> {
        let definition = self
            .module
            .resolve_type(ty)
            .ok_or_else(|| EvalError::TypeNotFound(ty.to_string()))?;
        if definition.is_interface() || definition.is_abstract {
            return Err(EvalError::NotInstantiable(ty.to_string()));
        }
        self.ensure_initialized(ty)?;
        Ok(Value::Object(Rc::new(RefCell::new(Object {
            ty: ty.clone(),
            fields: HashMap::new(),
        }))))
    }

    /// Run the type initializer on first use
    fn ensure_initialized(&mut self, ty: &TypeRef) -> EvalResult<()> {
        let module = self.module;
        let Some(definition) = module.resolve_type(ty) else {
            return Ok(());
        };
        if !self.initialized.insert(definition.name.clone()) {
            return Ok(());
        }
        let initializer = definition
            .methods
            .iter()
            .find(|m| m.kind == MethodKind::StaticConstructor || m.name == STATIC_CONSTRUCTOR_NAME);
        if let Some(initializer) = initializer {
            self.invoke(initializer, Vec::new())?;
        }
        Ok(())
    }

    fn invoke(&mut self, method: &'m MethodDefinition, args: Vec<Value>) -> EvalResult<Value> {
        if self.depth >= self.max_depth {
            return Err(EvalError::DepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let outcome = self.execute(method, args);
        self.depth -= 1;
        outcome
    }

    fn execute(&mut self, method: &'m MethodDefinition, mut args: Vec<Value>) -> EvalResult<Value> {
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| EvalError::NoImplementation(method.name.clone()))?;
        let mut locals: Vec<Value> = body.locals.iter().map(Value::default_for).collect();
        let mut stack: Vec<Value> = Vec::new();
        let name = method.name.as_str();
        let slot = |index: u16| EvalError::InvalidSlot {
            method: name.to_string(),
            slot: index,
        };

        for instruction in &body.instructions {
            match instruction {
                Instruction::Nop => {}
                Instruction::LoadArg(n) => {
                    let value = args.get(*n as usize).cloned().ok_or_else(|| slot(*n))?;
                    stack.push(value);
                }
                Instruction::StoreArg(n) => {
                    let value = pop(&mut stack, name)?;
                    *args.get_mut(*n as usize).ok_or_else(|| slot(*n))? = value;
                }
                Instruction::LoadLocal(n) => {
                    let value = locals.get(*n as usize).cloned().ok_or_else(|| slot(*n))?;
                    stack.push(value);
                }
                Instruction::StoreLocal(n) => {
                    let value = pop(&mut stack, name)?;
                    *locals.get_mut(*n as usize).ok_or_else(|| slot(*n))? = value;
                }
                Instruction::LoadInt(value) => stack.push(Value::Int(*value)),
                Instruction::LoadString(value) => stack.push(Value::Str(value.clone())),
                Instruction::LoadNull => stack.push(Value::Null),
                Instruction::LoadField(field) => {
                    let Value::Object(object) = pop(&mut stack, name)? else {
                        return Err(EvalError::NullReference(field.to_string()));
                    };
                    let value = object
                        .borrow()
                        .fields
                        .get(&field_key(&field.declaring, &field.name))
                        .cloned()
                        .unwrap_or_else(|| Value::default_for(&field.ty));
                    stack.push(value);
                }
                Instruction::StoreField(field) => {
                    let value = pop(&mut stack, name)?;
                    let Value::Object(object) = pop(&mut stack, name)? else {
                        return Err(EvalError::NullReference(field.to_string()));
                    };
                    object
                        .borrow_mut()
                        .fields
                        .insert(field_key(&field.declaring, &field.name), value);
                }
                Instruction::LoadStaticField(field) => {
                    self.ensure_initialized(&field.declaring)?;
                    let value = self
                        .statics
                        .get(&field_key(&field.declaring, &field.name))
                        .cloned()
                        .unwrap_or_else(|| Value::default_for(&field.ty));
                    stack.push(value);
                }
                Instruction::StoreStaticField(field) => {
                    self.ensure_initialized(&field.declaring)?;
                    let value = pop(&mut stack, name)?;
                    self.statics
                        .insert(field_key(&field.declaring, &field.name), value);
                }
                Instruction::Call(target) => {
                    let call_args = pop_n(&mut stack, target.parameters.len(), name)?;
                    let value = self.call_direct(target, call_args, &mut stack, name)?;
                    if target.return_type != TypeRef::Void {
                        stack.push(value);
                    }
                }
                Instruction::CallVirt(target) => {
                    let call_args = pop_n(&mut stack, target.parameters.len(), name)?;
                    let this = pop(&mut stack, name)?;
                    let value = self.call_virtual(target, this, call_args)?;
                    if target.return_type != TypeRef::Void {
                        stack.push(value);
                    }
                }
                Instruction::NewObj(ctor) => {
                    let call_args = pop_n(&mut stack, ctor.parameters.len(), name)?;
                    let object = self.allocate(&ctor.declaring)?;
                    let module = self.module;
                    let found = module
                        .resolve_method(ctor)
                        .ok_or_else(|| EvalError::MethodNotFound(ctor.to_string()))?;
                    let mut call = vec![object.clone()];
                    call.extend(call_args);
                    self.invoke(found, call)?;
                    stack.push(object);
                }
                Instruction::Add | Instruction::Sub | Instruction::Mul => {
                    let right = pop(&mut stack, name)?;
                    let left = pop(&mut stack, name)?;
                    stack.push(arithmetic(instruction, left, right)?);
                }
                Instruction::Pop => {
                    pop(&mut stack, name)?;
                }
                Instruction::Dup => {
                    let top = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| EvalError::StackUnderflow(name.to_string()))?;
                    stack.push(top);
                }
                Instruction::Ret => {
                    return if method.return_type == TypeRef::Void {
                        Ok(Value::Null)
                    } else {
                        pop(&mut stack, name)
                    };
                }
            }
        }
        Ok(Value::Null)
    }

    /// Non-virtual call: static functions, base and sibling constructors,
    /// and instance methods named exactly
    fn call_direct(
        &mut self,
        target: &MethodRef,
        args: Vec<Value>,
        stack: &mut Vec<Value>,
        context: &str,
    ) -> EvalResult<Value> {
        let module = self.module;
        match module.resolve_method(target) {
            Some(found) if found.flags.is_static => {
                self.ensure_initialized(&target.declaring)?;
                self.invoke(found, args)
            }
            Some(found) => {
                let this = pop(stack, context)?;
                if this.is_null() {
                    return Err(EvalError::NullReference(target.to_string()));
                }
                let mut call = vec![this];
                call.extend(args);
                self.invoke(found, call)
            }
            None if module.resolve_type(&target.declaring).is_none() => {
                let this = pop(stack, context)?;
                if target.is_constructor() {
                    return Ok(Value::Null);
                }
                native(target, &this, &args)
                    .ok_or_else(|| EvalError::MethodNotFound(target.to_string()))
            }
            None => Err(EvalError::MethodNotFound(target.to_string())),
        }
    }
}

/// Members of the root type, for receivers whose types do not override them
fn native(method: &MethodRef, this: &Value, args: &[Value]) -> Option<Value> {
    if this.is_null() {
        return None;
    }
    match (method.name.as_str(), args) {
        ("ToString", []) => Some(Value::Str(match this {
            Value::Object(_) => this.type_name().unwrap_or_default(),
            Value::Int(value) => value.to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Str(value) => value.clone(),
            Value::Null => String::new(),
        })),
        ("GetHashCode", []) => Some(Value::Int(0)),
        ("Equals", [other]) => Some(Value::Bool(this == other)),
        _ => None,
    }
}

fn arithmetic(instruction: &Instruction, left: Value, right: Value) -> EvalResult<Value> {
    match (instruction, left, right) {
        (Instruction::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Instruction::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
        (Instruction::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
        (Instruction::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (instruction, left, right) => Err(EvalError::TypeMismatch(format!(
            "{instruction:?} on {left:?} and {right:?}"
        ))),
    }
}

fn pop(stack: &mut Vec<Value>, context: &str) -> EvalResult<Value> {
    stack
        .pop()
        .ok_or_else(|| EvalError::StackUnderflow(context.to_string()))
}

fn pop_n(stack: &mut Vec<Value>, count: usize, context: &str) -> EvalResult<Vec<Value>> {
    if stack.len() < count {
        return Err(EvalError::StackUnderflow(context.to_string()));
    }
    Ok(stack.split_off(stack.len() - count))
}
