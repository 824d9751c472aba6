// Copyright 2025 Cowboy AI, LLC.

//! Modules and type definitions

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::body::MethodBody;
use super::members::{
    Annotation, EventDefinition, FieldDefinition, MethodDefinition, MethodFlags, MethodKind,
    MethodRef, Parameter, PropertyDefinition, Visibility, CONSTRUCTOR_NAME,
};
use super::types::{simple_name, TypeRef};
use crate::errors::{WeaveError, WeaveResult};

/// Kind of type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// Reference type
    Class,
    /// Contract with abstract members only
    Interface,
    /// Value type
    ValueType,
}

/// A generic parameter declared by a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericParameter {
    /// Parameter name (display only, references are positional)
    pub name: String,
    /// Marks the self-type parameter of a role
    #[serde(default)]
    pub is_self: bool,
}

impl GenericParameter {
    /// Ordinary parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_self: false,
        }
    }

    /// Self-type parameter
    pub fn self_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_self: true,
        }
    }
}

/// A type declared by a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Full name (`Ns.Name`, nested types `Ns.Outer/Inner`)
    pub name: String,
    /// Kind of type
    pub kind: TypeKind,
    /// Accessibility
    pub visibility: Visibility,
    /// Cannot be instantiated
    #[serde(default)]
    pub is_abstract: bool,
    /// Cannot be derived from
    #[serde(default)]
    pub is_sealed: bool,
    /// Generic parameters
    #[serde(default)]
    pub generic_parameters: Vec<GenericParameter>,
    /// Base type; `None` means the root type (or nothing, for interfaces)
    #[serde(default)]
    pub base: Option<TypeRef>,
    /// Implemented contracts, in declaration order
    #[serde(default)]
    pub interfaces: Vec<TypeRef>,
    /// Fields
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Methods, including constructors and accessors
    #[serde(default)]
    pub methods: Vec<MethodDefinition>,
    /// Properties
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    /// Events
    #[serde(default)]
    pub events: Vec<EventDefinition>,
    /// Enclosing type of a nested type
    #[serde(default)]
    pub declaring_type: Option<String>,
    /// Source markers
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl TypeDefinition {
    /// Create an empty public class
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Class,
            visibility: Visibility::Public,
            is_abstract: false,
            is_sealed: false,
            generic_parameters: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            declaring_type: None,
            annotations: Vec::new(),
        }
    }

    /// Create an empty public interface
    pub fn interface(name: impl Into<String>) -> Self {
        let mut ty = Self::class(name);
        ty.kind = TypeKind::Interface;
        ty.is_abstract = true;
        ty
    }

    /// Last segment of the full name
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Whether the type carries an annotation
    pub fn has_annotation(&self, annotation: &Annotation) -> bool {
        self.annotations.contains(annotation)
    }

    /// Number of generic parameters
    pub fn arity(&self) -> usize {
        self.generic_parameters.len()
    }

    /// Reference to this type as seen from inside itself
    pub fn self_reference(&self) -> TypeRef {
        TypeRef::open(self.name.clone(), self.arity())
    }

    /// Position of the self-type parameter, if any
    pub fn self_parameter(&self) -> Option<u16> {
        self.generic_parameters
            .iter()
            .position(|p| p.is_self)
            .map(|p| p as u16)
    }

    /// Base type, defaulting to the root
    pub fn base_or_root(&self) -> TypeRef {
        self.base.clone().unwrap_or(TypeRef::Object)
    }

    /// Instance and static constructors
    pub fn constructors(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods
            .iter()
            .filter(|m| m.kind == MethodKind::Constructor)
    }

    /// Find a method by name and parameter types
    pub fn find_method(
        &self,
        name: &str,
        parameters: &[TypeRef],
        generic_arity: u16,
    ) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| m.same_signature(name, parameters, generic_arity))
    }

    /// Find a method by name and parameter types, mutably
    pub fn find_method_mut(
        &mut self,
        name: &str,
        parameters: &[TypeRef],
        generic_arity: u16,
    ) -> Option<&mut MethodDefinition> {
        self.methods
            .iter_mut()
            .find(|m| m.same_signature(name, parameters, generic_arity))
    }

    /// Find a method by name only (accessors are never overloaded)
    pub fn find_method_by_name(&self, name: &str) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Property owning the accessor method `method`
    pub fn property_of_accessor(&self, method: &str) -> Option<&PropertyDefinition> {
        self.properties
            .iter()
            .find(|p| p.accessors().any(|a| a == method))
    }

    /// Event owning the accessor method `method`
    pub fn event_of_accessor(&self, method: &str) -> Option<&EventDefinition> {
        self.events
            .iter()
            .find(|e| e.accessors().any(|a| a == method))
    }

    /// Add a method unless one with the same signature exists
    pub fn add_method(&mut self, method: MethodDefinition) -> WeaveResult<()> {
        let params = method.parameter_types();
        if self
            .find_method(&method.name, &params, method.generic_arity)
            .is_some()
        {
            return Err(WeaveError::invalid(format!(
                "method {}::{} declared twice",
                self.name, method.name
            )));
        }
        self.methods.push(method);
        Ok(())
    }
}

/// Marker stamped on a module once it has been woven
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStamp {
    /// Tool that performed the mutation
    pub tool: String,
    /// Version of the tool
    pub version: String,
    /// When the mutation was committed
    pub applied_at: DateTime<Utc>,
}

impl MutationStamp {
    /// Stamp for this crate, now
    pub fn now() -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            applied_at: Utc::now(),
        }
    }
}

/// A compiled module held in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Module version id
    pub mvid: Uuid,
    /// Types keyed by full name, in declaration order
    types: IndexMap<String, TypeDefinition>,
    /// Present once the module has been woven
    #[serde(default)]
    pub mutation_stamp: Option<MutationStamp>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mvid: Uuid::new_v4(),
            types: IndexMap::new(),
            mutation_stamp: None,
        }
    }

    /// Load a module from JSON
    pub fn from_json(json: &str) -> WeaveResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save the module as JSON
    pub fn to_json(&self) -> WeaveResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether a weaving pass has already been committed
    pub fn is_mutated(&self) -> bool {
        self.mutation_stamp.is_some()
    }

    /// Add a type
    pub fn add_type(&mut self, ty: TypeDefinition) -> WeaveResult<()> {
        if self.types.contains_key(&ty.name) {
            return Err(WeaveError::DuplicateType(ty.name));
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Remove a type, keeping the order of the others
    pub fn remove_type(&mut self, name: &str) -> Option<TypeDefinition> {
        self.types.shift_remove(name)
    }

    /// Look up a type
    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Look up a type mutably
    pub fn get_type_mut(&mut self, name: &str) -> Option<&mut TypeDefinition> {
        self.types.get_mut(name)
    }

    /// Look up a type or fail
    pub fn require_type(&self, name: &str) -> WeaveResult<&TypeDefinition> {
        self.types
            .get(name)
            .ok_or_else(|| WeaveError::TypeNotFound(name.to_string()))
    }

    /// Look up a type mutably or fail
    pub fn require_type_mut(&mut self, name: &str) -> WeaveResult<&mut TypeDefinition> {
        self.types
            .get_mut(name)
            .ok_or_else(|| WeaveError::TypeNotFound(name.to_string()))
    }

    /// Look up the definition a reference points to
    pub fn resolve_type(&self, ty: &TypeRef) -> Option<&TypeDefinition> {
        ty.definition_name().and_then(|name| self.types.get(name))
    }

    /// All types in declaration order
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// All types in declaration order, mutably
    pub fn types_mut(&mut self) -> impl Iterator<Item = &mut TypeDefinition> {
        self.types.values_mut()
    }

    /// Names of all types in declaration order
    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the module declares no types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up the method a reference points to
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&MethodDefinition> {
        self.resolve_type(&method.declaring).and_then(|ty| {
            ty.find_method(&method.name, &method.parameters, method.generic_arity)
        })
    }

    /// Whether an override edge leads to `target`: it names the same member
    /// of the same definition, or the member it names carries an edge that does
    pub fn override_reaches(&self, edge: &MethodRef, target: &MethodRef) -> bool {
        let mut pending = vec![edge];
        let mut visited: Vec<&MethodRef> = Vec::new();
        while let Some(current) = pending.pop() {
            if current.declaring.definition_name() == target.declaring.definition_name()
                && current.same_member(target)
            {
                return true;
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);
            if let Some(method) = self.resolve_method(current) {
                pending.extend(method.overrides.iter());
            }
        }
        false
    }

    /// Base types of `ty`, nearest first, each instantiated in `ty`'s frame.
    /// Stops at the first base that is not declared in the module.
    pub fn base_chain(&self, ty: &TypeDefinition) -> Vec<(TypeRef, &TypeDefinition)> {
        let mut chain = Vec::new();
        let mut current = ty.base.clone();
        let mut type_args: Vec<TypeRef> = Vec::new();
        while let Some(base) = current {
            let base = base.substitute(&type_args);
            if base.is_root() {
                break;
            }
            let Some(def) = self.resolve_type(&base) else {
                break;
            };
            if chain.iter().any(|(_, d): &(TypeRef, &TypeDefinition)| d.name == def.name) {
                break;
            }
            type_args = base.arguments().to_vec();
            current = def.base.clone();
            chain.push((base, def));
        }
        chain
    }
}

/// Virtual methods of the universal root type
pub fn root_methods() -> Vec<MethodDefinition> {
    let virtual_flags = MethodFlags {
        is_virtual: true,
        is_new_slot: true,
        ..MethodFlags::default()
    };
    let mut ctor = MethodDefinition::new(CONSTRUCTOR_NAME, TypeRef::Void);
    ctor.kind = MethodKind::Constructor;
    ctor.body = Some(MethodBody::empty());

    let mut to_string = MethodDefinition::new("ToString", TypeRef::String);
    to_string.flags = virtual_flags;
    let mut equals = MethodDefinition::new("Equals", TypeRef::Bool);
    equals.flags = virtual_flags;
    equals.parameters.push(Parameter::new("obj", TypeRef::Object));
    let mut hash = MethodDefinition::new("GetHashCode", TypeRef::Int32);
    hash.flags = virtual_flags;

    vec![ctor, to_string, equals, hash]
}

/// Find a virtual method of the root type by signature
pub fn root_method(name: &str, parameters: &[TypeRef]) -> Option<MethodDefinition> {
    root_methods()
        .into_iter()
        .find(|m| m.same_signature(name, parameters, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup_types() {
        let mut module = Module::new("Test");
        module.add_type(TypeDefinition::class("A")).unwrap();
        module.add_type(TypeDefinition::interface("I")).unwrap();
        assert_eq!(module.type_names(), vec!["A".to_string(), "I".to_string()]);
        assert!(module.get_type("I").unwrap().is_interface());
        assert_eq!(
            module.add_type(TypeDefinition::class("A")),
            Err(WeaveError::DuplicateType("A".into()))
        );
        assert!(module.require_type("Missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_base_chain_substitutes_arguments() {
        let mut module = Module::new("Test");
        let mut generic_base = TypeDefinition::class("Base`1");
        generic_base.generic_parameters.push(GenericParameter::new("T"));
        let mut middle = TypeDefinition::class("Middle`1");
        middle.generic_parameters.push(GenericParameter::new("U"));
        middle.base = Some(TypeRef::instance("Base`1", vec![TypeRef::TypeParam(0)]));
        let mut leaf = TypeDefinition::class("Leaf");
        leaf.base = Some(TypeRef::instance("Middle`1", vec![TypeRef::Int32]));
        module.add_type(generic_base).unwrap();
        module.add_type(middle).unwrap();
        module.add_type(leaf).unwrap();

        let leaf = module.get_type("Leaf").unwrap();
        let chain: Vec<TypeRef> = module.base_chain(leaf).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            chain,
            vec![
                TypeRef::instance("Middle`1", vec![TypeRef::Int32]),
                TypeRef::instance("Base`1", vec![TypeRef::Int32]),
            ]
        );
    }

    #[test]
    fn test_override_edges_are_followed_transitively() {
        let inner = MethodRef::new(TypeRef::named("Inner"), "Run", vec![], TypeRef::Void);
        let outer = MethodRef::new(TypeRef::named("Outer"), "Run", vec![], TypeRef::Void);
        let mut module = Module::new("Test");
        let mut outer_type = TypeDefinition::interface("Outer");
        let mut run = MethodDefinition::new("Run", TypeRef::Void);
        run.overrides.push(inner.clone());
        outer_type.methods.push(run);
        module.add_type(outer_type).unwrap();
        module.add_type(TypeDefinition::interface("Inner")).unwrap();

        assert!(module.override_reaches(&outer, &inner));
        assert!(module.override_reaches(&inner, &inner));
        assert!(!module.override_reaches(&inner, &outer));
    }

    #[test]
    fn test_self_parameter() {
        let mut ty = TypeDefinition::class("R`2");
        ty.generic_parameters.push(GenericParameter::new("T"));
        ty.generic_parameters.push(GenericParameter::self_type("S"));
        assert_eq!(ty.self_parameter(), Some(1));
        assert_eq!(
            ty.self_reference(),
            TypeRef::instance("R`2", vec![TypeRef::TypeParam(0), TypeRef::TypeParam(1)])
        );
    }

    #[test]
    fn test_root_methods() {
        assert!(root_method("ToString", &[]).is_some());
        assert!(root_method("Equals", &[TypeRef::Object]).is_some());
        assert!(root_method("Equals", &[]).is_none());
    }

    #[test]
    fn test_json_round_trip_keeps_declaration_order() {
        let mut module = Module::new("Test");
        for name in ["Z", "A", "M"] {
            module.add_type(TypeDefinition::class(name)).unwrap();
        }
        let json = module.to_json().unwrap();
        let loaded = Module::from_json(&json).unwrap();
        assert_eq!(loaded.type_names(), vec!["Z", "A", "M"]);
        assert_eq!(loaded, module);
    }
}
