//! Typed model of a GraphQL type system definition.
//!
//! The SDL itself is parsed by `graphql-parser`; this module lowers the parser
//! AST into owned records that the composer can merge field by field.

use std::fmt;

use graphql_parser::parse_schema;
use graphql_parser::query::Value as AstValue;
use graphql_parser::schema::{self, Definition, Type};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TypeGraphError {
    #[error("Failed to parse schema: {0}")]
    Parse(String),
    #[error("{kind} \"{name}\" is not supported")]
    Unsupported { kind: &'static str, name: String },
    #[error("Type \"{0}\" is defined more than once")]
    DuplicateType(String),
    #[error("Field \"{type_name}.{field}\" is defined more than once")]
    DuplicateField { type_name: String, field: String },
    #[error("\"{location}\" references unknown type \"{referenced}\"")]
    UnknownType {
        location: String,
        referenced: String,
    },
    #[error("Root {role} type \"{name}\" is not an object type defined in the schema")]
    InvalidRootType { role: &'static str, name: String },
    #[error("Schema does not define a query root type")]
    MissingQueryRoot,
}

/// A reference to a type from a field, argument or input field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    fn rename(&mut self, from: &str, to: &str) {
        match self {
            TypeRef::Named(name) if name == from => *name = to.to_string(),
            TypeRef::Named(_) => {}
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.rename(from, to),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

impl<'a> From<&Type<'a, String>> for TypeRef {
    fn from(ty: &Type<'a, String>) -> Self {
        match ty {
            Type::NamedType(name) => TypeRef::Named(name.clone()),
            Type::ListType(inner) => TypeRef::List(Box::new(inner.as_ref().into())),
            Type::NonNullType(inner) => TypeRef::NonNull(Box::new(inner.as_ref().into())),
        }
    }
}

/// A default value, kept both as printable GraphQL literal and as JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultValue {
    pub literal: String,
    pub value: Value,
}

/// An argument or an input object field.
#[derive(Clone, Debug, PartialEq)]
pub struct InputValueDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<DefaultValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<InputValueDefinition>,
    pub ty: TypeRef,
}

impl FieldDefinition {
    pub fn argument(&self, name: &str) -> Option<&InputValueDefinition> {
        self.arguments.iter().find(|argument| argument.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

impl ObjectType {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<InputValueDefinition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Scalar,
    Enum,
    InputObject,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeKind::Object => "object",
            TypeKind::Scalar => "scalar",
            TypeKind::Enum => "enum",
            TypeKind::InputObject => "input object",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeDefinition {
    Object(ObjectType),
    Scalar(ScalarType),
    Enum(EnumType),
    InputObject(InputObjectType),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Object(object) => &object.name,
            TypeDefinition::Scalar(scalar) => &scalar.name,
            TypeDefinition::Enum(enum_type) => &enum_type.name,
            TypeDefinition::InputObject(input) => &input.name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            TypeDefinition::Object(_) => TypeKind::Object,
            TypeDefinition::Scalar(_) => TypeKind::Scalar,
            TypeDefinition::Enum(_) => TypeKind::Enum,
            TypeDefinition::InputObject(_) => TypeKind::InputObject,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TypeDefinition::Object(object) => object.description.as_deref(),
            TypeDefinition::Scalar(scalar) => scalar.description.as_deref(),
            TypeDefinition::Enum(enum_type) => enum_type.description.as_deref(),
            TypeDefinition::InputObject(input) => input.description.as_deref(),
        }
    }

    pub fn set_description(&mut self, description: Option<String>) {
        match self {
            TypeDefinition::Object(object) => object.description = description,
            TypeDefinition::Scalar(scalar) => scalar.description = description,
            TypeDefinition::Enum(enum_type) => enum_type.description = description,
            TypeDefinition::InputObject(input) => input.description = description,
        }
    }

    fn set_name(&mut self, name: String) {
        match self {
            TypeDefinition::Object(object) => object.name = name,
            TypeDefinition::Scalar(scalar) => scalar.name = name,
            TypeDefinition::Enum(enum_type) => enum_type.name = name,
            TypeDefinition::InputObject(input) => input.name = name,
        }
    }

    fn rename_references(&mut self, from: &str, to: &str) {
        match self {
            TypeDefinition::Object(object) => {
                for field in &mut object.fields {
                    field.ty.rename(from, to);
                    for argument in &mut field.arguments {
                        argument.ty.rename(from, to);
                    }
                }
            }
            TypeDefinition::InputObject(input) => {
                for field in &mut input.fields {
                    field.ty.rename(from, to);
                }
            }
            TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) => {}
        }
    }
}

/// Names of the root operation types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootTypes {
    pub query: String,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

impl Default for RootTypes {
    fn default() -> Self {
        RootTypes {
            query: "Query".to_string(),
            mutation: None,
            subscription: None,
        }
    }
}

impl RootTypes {
    /// Iterates over `(role, type name)` pairs of the defined roots.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("query", Some(self.query.as_str())),
            ("mutation", self.mutation.as_deref()),
            ("subscription", self.subscription.as_deref()),
        ]
        .into_iter()
        .filter_map(|(role, name)| name.map(|name| (role, name)))
    }

    pub fn is_root(&self, type_name: &str) -> bool {
        self.iter().any(|(_, name)| name == type_name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeGraph {
    roots: RootTypes,
    types: IndexMap<String, TypeDefinition>,
}

impl TypeGraph {
    /// Parses SDL and lowers it into a validated type graph.
    pub fn from_sdl(sdl: &str) -> Result<Self, TypeGraphError> {
        let document =
            parse_schema::<String>(sdl).map_err(|e| TypeGraphError::Parse(e.to_string()))?;

        let mut declared_roots: Option<RootTypes> = None;
        let mut types = IndexMap::new();

        for definition in document.definitions {
            let type_definition = match definition {
                Definition::SchemaDefinition(schema_definition) => {
                    declared_roots = Some(RootTypes {
                        query: schema_definition
                            .query
                            .ok_or(TypeGraphError::MissingQueryRoot)?,
                        mutation: schema_definition.mutation,
                        subscription: schema_definition.subscription,
                    });
                    continue;
                }
                Definition::TypeDefinition(type_definition) => lower_type(type_definition)?,
                Definition::TypeExtension(_) => {
                    return Err(TypeGraphError::Unsupported {
                        kind: "Type extension",
                        name: "extend".to_string(),
                    });
                }
                Definition::DirectiveDefinition(directive) => {
                    return Err(TypeGraphError::Unsupported {
                        kind: "Directive definition",
                        name: directive.name,
                    });
                }
            };

            let name = type_definition.name().to_string();
            if types.contains_key(&name) {
                return Err(TypeGraphError::DuplicateType(name));
            }
            types.insert(name, type_definition);
        }

        let roots = declared_roots.unwrap_or_else(|| RootTypes {
            query: "Query".to_string(),
            mutation: types.contains_key("Mutation").then(|| "Mutation".to_string()),
            subscription: types
                .contains_key("Subscription")
                .then(|| "Subscription".to_string()),
        });

        Self::from_parts(roots, types)
    }

    /// Assembles a graph from already lowered definitions and checks that every
    /// reference resolves.
    pub fn from_parts(
        roots: RootTypes,
        types: IndexMap<String, TypeDefinition>,
    ) -> Result<Self, TypeGraphError> {
        let type_graph = TypeGraph { roots, types };
        type_graph.validate()?;
        Ok(type_graph)
    }

    fn validate(&self) -> Result<(), TypeGraphError> {
        for (role, name) in self.roots.iter() {
            if self.object(name).is_none() {
                return Err(TypeGraphError::InvalidRootType {
                    role,
                    name: name.to_string(),
                });
            }
        }

        for definition in self.types.values() {
            match definition {
                TypeDefinition::Object(object) => {
                    let mut seen = Vec::with_capacity(object.fields.len());
                    for field in &object.fields {
                        if seen.contains(&field.name.as_str()) {
                            return Err(TypeGraphError::DuplicateField {
                                type_name: object.name.clone(),
                                field: field.name.clone(),
                            });
                        }
                        seen.push(field.name.as_str());

                        let location = format!("{}.{}", object.name, field.name);
                        self.check_reference(&location, &field.ty)?;
                        for argument in &field.arguments {
                            self.check_reference(
                                &format!("{}({}:)", location, argument.name),
                                &argument.ty,
                            )?;
                        }
                    }
                }
                TypeDefinition::InputObject(input) => {
                    for field in &input.fields {
                        self.check_reference(&format!("{}.{}", input.name, field.name), &field.ty)?;
                    }
                }
                TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) => {}
            }
        }

        Ok(())
    }

    fn check_reference(&self, location: &str, ty: &TypeRef) -> Result<(), TypeGraphError> {
        let referenced = ty.named_type();
        if is_builtin_scalar(referenced) || self.types.contains_key(referenced) {
            Ok(())
        } else {
            Err(TypeGraphError::UnknownType {
                location: location.to_string(),
                referenced: referenced.to_string(),
            })
        }
    }

    pub fn roots(&self) -> &RootTypes {
        &self.roots
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        match self.types.get(name) {
            Some(TypeDefinition::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectType> {
        self.types.values().filter_map(|definition| match definition {
            TypeDefinition::Object(object) => Some(object),
            _ => None,
        })
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut ObjectType> {
        self.types.values_mut().filter_map(|definition| match definition {
            TypeDefinition::Object(object) => Some(object),
            _ => None,
        })
    }

    /// Number of fields across all object types, root types included.
    pub fn field_count(&self) -> usize {
        self.objects().map(|object| object.fields.len()).sum()
    }

    /// Decomposes the graph, renaming each root type to `Query`, `Mutation` or
    /// `Subscription` so graphs with custom root names line up by role.
    pub(crate) fn into_canonical_definitions(self) -> Vec<(TypeDefinition, bool)> {
        let renames: Vec<(String, &'static str)> = self
            .roots
            .iter()
            .map(|(role, name)| (name.to_string(), canonical_root_name(role)))
            .filter(|(name, canonical)| name != canonical)
            .collect();
        let roots = self.roots;

        self.types
            .into_values()
            .map(|mut definition| {
                let is_root = roots.is_root(definition.name());
                for (from, to) in &renames {
                    if definition.name() == from {
                        definition.set_name(to.to_string());
                    }
                    definition.rename_references(from, to);
                }
                (definition, is_root)
            })
            .collect()
    }
}

pub(crate) fn canonical_root_name(role: &str) -> &'static str {
    match role {
        "mutation" => "Mutation",
        "subscription" => "Subscription",
        _ => "Query",
    }
}

fn lower_type(definition: schema::TypeDefinition<'_, String>) -> Result<TypeDefinition, TypeGraphError> {
    Ok(match definition {
        schema::TypeDefinition::Object(object) => TypeDefinition::Object(ObjectType {
            name: object.name,
            description: object.description,
            fields: object
                .fields
                .into_iter()
                .map(|field| FieldDefinition {
                    ty: (&field.field_type).into(),
                    arguments: field.arguments.iter().map(lower_input_value).collect(),
                    name: field.name,
                    description: field.description,
                })
                .collect(),
        }),
        schema::TypeDefinition::Scalar(scalar) => TypeDefinition::Scalar(ScalarType {
            name: scalar.name,
            description: scalar.description,
        }),
        schema::TypeDefinition::Enum(enum_type) => TypeDefinition::Enum(EnumType {
            name: enum_type.name,
            description: enum_type.description,
            values: enum_type.values.into_iter().map(|value| value.name).collect(),
        }),
        schema::TypeDefinition::InputObject(input) => TypeDefinition::InputObject(InputObjectType {
            fields: input.fields.iter().map(lower_input_value).collect(),
            name: input.name,
            description: input.description,
        }),
        schema::TypeDefinition::Interface(interface) => {
            return Err(TypeGraphError::Unsupported {
                kind: "Interface",
                name: interface.name,
            });
        }
        schema::TypeDefinition::Union(union_type) => {
            return Err(TypeGraphError::Unsupported {
                kind: "Union",
                name: union_type.name,
            });
        }
    })
}

fn lower_input_value(input: &schema::InputValue<'_, String>) -> InputValueDefinition {
    InputValueDefinition {
        name: input.name.clone(),
        description: input.description.clone(),
        ty: (&input.value_type).into(),
        default_value: input.default_value.as_ref().map(|value| DefaultValue {
            literal: print_literal(value),
            value: literal_to_json(value, None),
        }),
    }
}

/// Converts a GraphQL literal into JSON. Variables are looked up in
/// `variables`; unknown or unavailable variables become `null`.
pub(crate) fn literal_to_json(value: &AstValue<'_, String>, variables: Option<&Map<String, Value>>) -> Value {
    match value {
        AstValue::Variable(name) => variables
            .and_then(|variables| variables.get(name))
            .cloned()
            .unwrap_or(Value::Null),
        AstValue::Int(number) => number
            .as_i64()
            .map(|int| Value::Number(int.into()))
            .unwrap_or(Value::Null),
        AstValue::Float(float) => Number::from_f64(*float)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AstValue::String(string) => Value::String(string.clone()),
        AstValue::Boolean(boolean) => Value::Bool(*boolean),
        AstValue::Null => Value::Null,
        AstValue::Enum(name) => Value::String(name.clone()),
        AstValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| literal_to_json(item, variables))
                .collect(),
        ),
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), literal_to_json(item, variables)))
                .collect(),
        ),
    }
}

fn print_literal(value: &AstValue<'_, String>) -> String {
    match value {
        AstValue::Variable(name) => format!("${}", name),
        AstValue::Int(number) => number
            .as_i64()
            .map(|int| int.to_string())
            .unwrap_or_default(),
        AstValue::Float(float) => float.to_string(),
        AstValue::String(string) => Value::String(string.clone()).to_string(),
        AstValue::Boolean(boolean) => boolean.to_string(),
        AstValue::Null => "null".to_string(),
        AstValue::Enum(name) => name.clone(),
        AstValue::List(items) => format!(
            "[{}]",
            items.iter().map(print_literal).collect::<Vec<_>>().join(", ")
        ),
        AstValue::Object(fields) => format!(
            "{{{}}}",
            fields
                .iter()
                .map(|(key, item)| format!("{}: {}", key, print_literal(item)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn write_description(f: &mut fmt::Formatter<'_>, description: Option<&str>, indent: &str) -> fmt::Result {
    if let Some(description) = description {
        writeln!(f, "{}\"\"\"", indent)?;
        for line in description.replace("\"\"\"", "\\\"\"\"").lines() {
            writeln!(f, "{}{}", indent, line)?;
        }
        writeln!(f, "{}\"\"\"", indent)?;
    }
    Ok(())
}

fn write_input_value(f: &mut fmt::Formatter<'_>, input: &InputValueDefinition) -> fmt::Result {
    write!(f, "{}: {}", input.name, input.ty)?;
    if let Some(default_value) = &input.default_value {
        write!(f, " = {}", default_value.literal)?;
    }
    Ok(())
}

/// Prints the graph back as SDL.
impl fmt::Display for TypeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom_roots = self
            .roots
            .iter()
            .any(|(role, name)| canonical_root_name(role) != name);
        if custom_roots {
            writeln!(f, "schema {{")?;
            for (role, name) in self.roots.iter() {
                writeln!(f, "  {}: {}", role, name)?;
            }
            writeln!(f, "}}\n")?;
        }

        for (index, definition) in self.types.values().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write_description(f, definition.description(), "")?;
            match definition {
                TypeDefinition::Object(object) => {
                    writeln!(f, "type {} {{", object.name)?;
                    for field in &object.fields {
                        write_description(f, field.description.as_deref(), "  ")?;
                        write!(f, "  {}", field.name)?;
                        if !field.arguments.is_empty() {
                            write!(f, "(")?;
                            for (position, argument) in field.arguments.iter().enumerate() {
                                if position > 0 {
                                    write!(f, ", ")?;
                                }
                                write_input_value(f, argument)?;
                            }
                            write!(f, ")")?;
                        }
                        writeln!(f, ": {}", field.ty)?;
                    }
                    writeln!(f, "}}")?;
                }
                TypeDefinition::Scalar(scalar) => writeln!(f, "scalar {}", scalar.name)?,
                TypeDefinition::Enum(enum_type) => {
                    writeln!(f, "enum {} {{", enum_type.name)?;
                    for value in &enum_type.values {
                        writeln!(f, "  {}", value)?;
                    }
                    writeln!(f, "}}")?;
                }
                TypeDefinition::InputObject(input) => {
                    writeln!(f, "input {} {{", input.name)?;
                    for field in &input.fields {
                        write_description(f, field.description.as_deref(), "  ")?;
                        write!(f, "  ")?;
                        write_input_value(f, field)?;
                        writeln!(f)?;
                    }
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}
