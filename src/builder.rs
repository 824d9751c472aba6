// Copyright 2025 Cowboy AI, LLC.

//! Fluent construction of input modules
//!
//! ```
//! use cim_roles::builder::ModuleBuilder;
//! use cim_roles::model::TypeRef;
//!
//! let module = ModuleBuilder::new("Shapes")
//!     .role("Shapes.Named", |r| {
//!         r.method("Name", TypeRef::String, |m| m.returns_string("shape"))
//!     })
//!     .class("Shapes.Circle", |c| c.does("Shapes.Named"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(module.len(), 2);
//! ```

use crate::errors::WeaveResult;
use crate::model::{
    Annotation, EventDefinition, FieldDefinition, FieldRef, GenericParameter, Instruction,
    MethodBody, MethodDefinition, MethodKind, MethodRef, Module, Parameter, PropertyDefinition,
    TypeDefinition, TypeRef, Visibility, STATIC_CONSTRUCTOR_NAME,
};

/// Builds a [`Module`] type by type
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
    types: Vec<TypeDefinition>,
}

impl ModuleBuilder {
    /// Start an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
            types: Vec::new(),
        }
    }

    /// Add a class
    pub fn class(mut self, name: &str, f: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.types.push(f(TypeBuilder::new(TypeDefinition::class(name))).ty);
        self
    }

    /// Add a role: a class implementing the role marker
    pub fn role(mut self, name: &str, f: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        let builder = TypeBuilder::new(TypeDefinition::class(name)).implements(TypeRef::role_marker());
        self.types.push(f(builder).ty);
        self
    }

    /// Add an interface
    pub fn interface(mut self, name: &str, f: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.types.push(f(TypeBuilder::new(TypeDefinition::interface(name))).ty);
        self
    }

    /// Add a disambiguation view over `role`
    pub fn view(
        mut self,
        name: &str,
        role: impl Into<TypeRef>,
        f: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        let builder = TypeBuilder::new(TypeDefinition::interface(name))
            .annotate(Annotation::RoleView)
            .implements(role.into());
        self.types.push(f(builder).ty);
        self
    }

    /// Add a prebuilt type definition
    pub fn type_definition(mut self, ty: TypeDefinition) -> Self {
        self.types.push(ty);
        self
    }

    /// Finish the module
    pub fn build(self) -> WeaveResult<Module> {
        let mut module = self.module;
        for ty in self.types {
            module.add_type(ty)?;
        }
        Ok(module)
    }
}

/// Builds one [`TypeDefinition`]
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    ty: TypeDefinition,
}

impl TypeBuilder {
    /// Wrap a definition
    pub fn new(ty: TypeDefinition) -> Self {
        Self { ty }
    }

    /// Reference to the type being built, as seen from inside itself
    pub fn self_reference(&self) -> TypeRef {
        self.ty.self_reference()
    }

    /// Add a generic parameter
    pub fn generic(mut self, name: &str) -> Self {
        self.ty.generic_parameters.push(GenericParameter::new(name));
        self
    }

    /// Add a self-type generic parameter
    pub fn self_type(mut self, name: &str) -> Self {
        self.ty
            .generic_parameters
            .push(GenericParameter::self_type(name));
        self
    }

    /// Set the base type
    pub fn base(mut self, base: impl Into<TypeRef>) -> Self {
        self.ty.base = Some(base.into());
        self
    }

    /// Add an implemented contract
    pub fn implements(mut self, contract: impl Into<TypeRef>) -> Self {
        self.ty.interfaces.push(contract.into());
        self
    }

    /// Declare a composed role
    pub fn does(self, role: impl Into<TypeRef>) -> Self {
        self.implements(TypeRef::does(role.into()))
    }

    /// Attach a disambiguation view
    pub fn with_view(self, view: impl Into<TypeRef>) -> Self {
        self.implements(view)
    }

    /// Add a type annotation
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.ty.annotations.push(annotation);
        self
    }

    /// Mark the type abstract
    pub fn abstract_type(mut self) -> Self {
        self.ty.is_abstract = true;
        self
    }

    /// Mark the type sealed
    pub fn sealed(mut self) -> Self {
        self.ty.is_sealed = true;
        self
    }

    /// Set the type's visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.ty.visibility = visibility;
        self
    }

    /// Add a private instance field
    pub fn field(mut self, name: &str, ty: TypeRef) -> Self {
        self.ty.fields.push(FieldDefinition::new(name, ty));
        self
    }

    /// Add a public instance field
    pub fn public_field(mut self, name: &str, ty: TypeRef) -> Self {
        let mut field = FieldDefinition::new(name, ty);
        field.visibility = Visibility::Public;
        self.ty.fields.push(field);
        self
    }

    /// Add a private static field
    pub fn static_field(mut self, name: &str, ty: TypeRef) -> Self {
        let mut field = FieldDefinition::new(name, ty);
        field.is_static = true;
        self.ty.fields.push(field);
        self
    }

    /// Add a public instance method
    pub fn method(
        mut self,
        name: &str,
        return_type: TypeRef,
        f: impl FnOnce(MethodBuilder) -> MethodBuilder,
    ) -> Self {
        let builder = MethodBuilder::new(MethodDefinition::new(name, return_type));
        self.ty.methods.push(f(builder).method);
        self
    }

    /// Add a public abstract instance method
    pub fn abstract_method(self, name: &str, return_type: TypeRef) -> Self {
        self.method(name, return_type, MethodBuilder::abstract_method)
    }

    /// Add an instance constructor (the body should call the base constructor)
    pub fn constructor(mut self, f: impl FnOnce(MethodBuilder) -> MethodBuilder) -> Self {
        let builder = MethodBuilder::new(MethodDefinition::constructor(
            MethodBody::default_constructor(),
        ));
        self.ty.methods.push(f(builder).method);
        self
    }

    /// Add a parameterless constructor that only calls the root constructor
    pub fn default_constructor(self) -> Self {
        self.constructor(|c| c)
    }

    /// Add a type initializer
    pub fn static_constructor(mut self, instructions: Vec<Instruction>) -> Self {
        let mut cctor = MethodDefinition::new(STATIC_CONSTRUCTOR_NAME, TypeRef::Void);
        cctor.kind = MethodKind::StaticConstructor;
        cctor.visibility = Visibility::Private;
        cctor.flags.is_static = true;
        cctor.body = Some(MethodBody::new(instructions));
        self.ty.methods.push(cctor);
        self
    }

    /// Add a property with a compiler-generated backing field and trivial
    /// accessors
    pub fn auto_property(mut self, name: &str, ty: TypeRef) -> Self {
        let field_name = format!("<{name}>k__BackingField");
        let mut field = FieldDefinition::new(&field_name, ty.clone());
        field.annotations.push(Annotation::CompilerGenerated);
        let field_ref = field.reference(self.self_reference());
        self.ty.fields.push(field);

        let (getter, setter) = trivial_accessors(name, &field_ref);
        self.ty.properties.push(PropertyDefinition {
            name: name.to_string(),
            ty,
            getter: Some(getter.name.clone()),
            setter: Some(setter.name.clone()),
            annotations: Vec::new(),
        });
        self.ty.methods.push(getter);
        self.ty.methods.push(setter);
        self
    }

    /// Add a property whose accessors are built by the caller. The getter
    /// is named `get_<name>` and the setter `set_<name>`.
    pub fn property(mut self, name: &str, ty: TypeRef, f: impl FnOnce(PropertyBuilder) -> PropertyBuilder) -> Self {
        let built = f(PropertyBuilder::new(name, ty.clone()));
        let mut property = PropertyDefinition {
            name: name.to_string(),
            ty,
            getter: None,
            setter: None,
            annotations: built.annotations,
        };
        if let Some(getter) = built.getter {
            property.getter = Some(getter.name.clone());
            self.ty.methods.push(getter);
        }
        if let Some(setter) = built.setter {
            property.setter = Some(setter.name.clone());
            self.ty.methods.push(setter);
        }
        self.ty.properties.push(property);
        self
    }

    /// Add an event stored in a private field of the handler type: `add`
    /// stores the handler, `remove` clears it
    pub fn field_event(mut self, name: &str, ty: TypeRef) -> Self {
        let field = FieldDefinition::new(name, ty.clone());
        let field_ref = field.reference(self.self_reference());
        self.ty.fields.push(field);

        let mut add = MethodDefinition::new(format!("add_{name}"), TypeRef::Void);
        add.parameters.push(Parameter::new("value", ty.clone()));
        add.body = Some(MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadArg(1),
            Instruction::StoreField(field_ref.clone()),
            Instruction::Ret,
        ]));
        let mut remove = MethodDefinition::new(format!("remove_{name}"), TypeRef::Void);
        remove.parameters.push(Parameter::new("value", ty.clone()));
        remove.body = Some(MethodBody::new(vec![
            Instruction::LoadArg(0),
            Instruction::LoadNull,
            Instruction::StoreField(field_ref),
            Instruction::Ret,
        ]));

        self.ty.events.push(EventDefinition {
            name: name.to_string(),
            ty,
            add: Some(add.name.clone()),
            remove: Some(remove.name.clone()),
            raise: None,
            annotations: Vec::new(),
        });
        self.ty.methods.push(add);
        self.ty.methods.push(remove);
        self
    }

    /// Finish the definition
    pub fn build(self) -> TypeDefinition {
        self.ty
    }
}

/// Builds the accessors of a property
#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    name: String,
    ty: TypeRef,
    getter: Option<MethodDefinition>,
    setter: Option<MethodDefinition>,
    annotations: Vec<Annotation>,
}

impl PropertyBuilder {
    fn new(name: &str, ty: TypeRef) -> Self {
        Self {
            name: name.to_string(),
            ty,
            getter: None,
            setter: None,
            annotations: Vec::new(),
        }
    }

    /// Add the getter
    pub fn getter(mut self, f: impl FnOnce(MethodBuilder) -> MethodBuilder) -> Self {
        let method = MethodDefinition::new(format!("get_{}", self.name), self.ty.clone());
        self.getter = Some(f(MethodBuilder::new(method)).method);
        self
    }

    /// Add the setter (argument 1 is the value)
    pub fn setter(mut self, f: impl FnOnce(MethodBuilder) -> MethodBuilder) -> Self {
        let mut method = MethodDefinition::new(format!("set_{}", self.name), TypeRef::Void);
        method.parameters.push(Parameter::new("value", self.ty.clone()));
        self.setter = Some(f(MethodBuilder::new(method)).method);
        self
    }

    /// Add a property annotation (views use these to mark every accessor)
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// Builds one [`MethodDefinition`]
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    method: MethodDefinition,
}

impl MethodBuilder {
    /// Wrap a definition
    pub fn new(method: MethodDefinition) -> Self {
        Self { method }
    }

    /// Add a parameter
    pub fn param(mut self, name: &str, ty: TypeRef) -> Self {
        self.method.parameters.push(Parameter::new(name, ty));
        self
    }

    /// Declare method generic parameters
    pub fn generic_arity(mut self, arity: u16) -> Self {
        self.method.generic_arity = arity;
        self
    }

    /// Set the visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.method.visibility = visibility;
        self
    }

    /// Make the method private
    pub fn private(self) -> Self {
        self.visibility(Visibility::Private)
    }

    /// Make the method static
    pub fn as_static(mut self) -> Self {
        self.method.flags.is_static = true;
        self
    }

    /// Make the method virtual with a new slot
    pub fn as_virtual(mut self) -> Self {
        self.method.flags.is_virtual = true;
        self.method.flags.is_new_slot = true;
        self
    }

    /// Make the method override an inherited virtual slot
    pub fn as_override(mut self) -> Self {
        self.method.flags.is_virtual = true;
        self.method.flags.is_new_slot = false;
        self
    }

    /// Seal the virtual slot
    pub fn as_final(mut self) -> Self {
        self.method.flags.is_final = true;
        self
    }

    /// Make the method abstract (drops the body)
    pub fn abstract_method(mut self) -> Self {
        self.method.flags.is_abstract = true;
        self.method.flags.is_virtual = true;
        self.method.flags.is_new_slot = true;
        self.method.body = None;
        self
    }

    /// Mark the method as implemented by platform interop
    pub fn interop(mut self) -> Self {
        self.method.flags.is_interop = true;
        self.method.body = None;
        self
    }

    /// Add a method annotation
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.method.annotations.push(annotation);
        self
    }

    /// Add an explicit override edge
    pub fn overrides(mut self, method: MethodRef) -> Self {
        self.method.overrides.push(method);
        self
    }

    /// Set the instruction stream
    pub fn body(mut self, instructions: Vec<Instruction>) -> Self {
        let locals = self
            .method
            .body
            .take()
            .map(|b| b.locals)
            .unwrap_or_default();
        self.method.body = Some(MethodBody {
            locals,
            instructions,
        });
        self
    }

    /// Declare local slots
    pub fn locals(mut self, locals: Vec<TypeRef>) -> Self {
        let body = self.method.body.get_or_insert_with(MethodBody::empty);
        body.locals = locals;
        self
    }

    /// Body returning an integer constant
    pub fn returns_int(self, value: i64) -> Self {
        self.body(vec![Instruction::LoadInt(value), Instruction::Ret])
    }

    /// Body returning a string constant
    pub fn returns_string(self, value: &str) -> Self {
        self.body(vec![
            Instruction::LoadString(value.to_string()),
            Instruction::Ret,
        ])
    }

    /// Body that only returns
    pub fn empty_body(self) -> Self {
        self.body(vec![Instruction::Ret])
    }

    /// Finish the definition
    pub fn build(self) -> MethodDefinition {
        self.method
    }
}

/// Getter and setter that load and store `field` on the instance
pub fn trivial_accessors(property: &str, field: &FieldRef) -> (MethodDefinition, MethodDefinition) {
    let mut getter = MethodDefinition::new(format!("get_{property}"), field.ty.clone());
    getter.annotations.push(Annotation::CompilerGenerated);
    getter.body = Some(MethodBody::new(vec![
        Instruction::LoadArg(0),
        Instruction::LoadField(field.clone()),
        Instruction::Ret,
    ]));

    let mut setter = MethodDefinition::new(format!("set_{property}"), TypeRef::Void);
    setter.annotations.push(Annotation::CompilerGenerated);
    setter.parameters.push(Parameter::new("value", field.ty.clone()));
    setter.body = Some(MethodBody::new(vec![
        Instruction::LoadArg(0),
        Instruction::LoadArg(1),
        Instruction::StoreField(field.clone()),
        Instruction::Ret,
    ]));

    (getter, setter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeKind;

    #[test]
    fn test_role_gets_marker() {
        let module = ModuleBuilder::new("M")
            .role("R", |r| r.abstract_method("Run", TypeRef::Void))
            .build()
            .unwrap();
        let role = module.get_type("R").unwrap();
        assert!(role.interfaces.iter().any(TypeRef::is_role_marker));
        assert!(role.methods[0].flags.is_abstract);
        assert!(role.methods[0].body.is_none());
    }

    #[test]
    fn test_view_is_annotated_interface() {
        let module = ModuleBuilder::new("M")
            .role("R", |r| r)
            .view("V", "R", |v| {
                v.method("M", TypeRef::Int32, |m| {
                    m.abstract_method().annotate(Annotation::Exclude)
                })
            })
            .build()
            .unwrap();
        let view = module.get_type("V").unwrap();
        assert_eq!(view.kind, TypeKind::Interface);
        assert!(view.has_annotation(&Annotation::RoleView));
        assert_eq!(view.interfaces, vec![TypeRef::named("R")]);
    }

    #[test]
    fn test_auto_property_shape() {
        let ty = TypeBuilder::new(TypeDefinition::class("C"))
            .auto_property("Count", TypeRef::Int32)
            .build();
        assert_eq!(ty.fields[0].name, "<Count>k__BackingField");
        assert_eq!(ty.properties[0].getter.as_deref(), Some("get_Count"));
        assert_eq!(ty.methods.len(), 2);
        assert_eq!(ty.methods[1].parameter_types(), vec![TypeRef::Int32]);
    }

    #[test]
    fn test_does_declares_marker() {
        let ty = TypeBuilder::new(TypeDefinition::class("C"))
            .does("R")
            .build();
        assert_eq!(ty.interfaces[0].as_does(), Some(&TypeRef::named("R")));
    }

    #[test]
    fn test_duplicate_type_fails() {
        let result = ModuleBuilder::new("M")
            .class("C", |c| c)
            .class("C", |c| c)
            .build();
        assert!(result.is_err());
    }
}
