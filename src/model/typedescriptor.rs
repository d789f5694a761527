use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::model::attributetype::{AttributeType, DefaultValue};
use crate::model::value::Value;

const DEFAULT_PRIMARY_KEY_NAME: &str = "id";

/// One declared attribute of a record type.
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    name: String,
    attribute_type: Arc<AttributeType>,
    default_value: Option<DefaultValue>,
}

impl AttributeDefinition {
    /// Attribute name as it appears in raw data.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type used to coerce and serialize the attribute.
    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    /// Resolve the default for one read.
    ///
    /// The attribute's own default wins over the type's; without either the
    /// default is `Null`.
    pub fn default_value(&self) -> Arc<Value> {
        self.default_value
            .as_ref()
            .or_else(|| self.attribute_type.default_value())
            .map(DefaultValue::resolve)
            .unwrap_or_else(|| Arc::new(Value::Null))
    }

    pub(crate) fn coerce(&self, type_name: &str, raw: &Value) -> Result<Value> {
        self.attribute_type
            .coerce(raw)
            .map_err(|message| StoreError::AttributeCoercion {
                type_name: type_name.to_string(),
                attribute: self.name.clone(),
                attribute_type: self.attribute_type.name().to_string(),
                message,
            })
    }
}

/// Describes one record type: its attributes, primary key and collection.
///
/// Built once per type and shared by every record of that type. A store
/// identifies the type by this instance, not by its name.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    collection_name: String,
    primary_key_name: String,
    attributes: Vec<AttributeDefinition>,
    index: HashMap<String, usize>,
}

impl TypeDescriptor {
    /// Start describing a type; the primary key defaults to `id`.
    pub fn builder(name: &str) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            name: name.to_string(),
            collection_name: None,
            primary_key_name: DEFAULT_PRIMARY_KEY_NAME.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Type name, also used as the wire root key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the remote collection, e.g. the URL segment of a REST resource.
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Attribute holding the primary key in raw data.
    pub fn primary_key_name(&self) -> &str {
        &self.primary_key_name
    }

    /// Declared attribute named `name`.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.index.get(name).map(|&position| &self.attributes[position])
    }

    /// Declared attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes.iter()
    }

    pub(crate) fn require_attribute(&self, name: &str) -> Result<&AttributeDefinition> {
        self.attribute(name)
            .ok_or_else(|| StoreError::UnknownAttribute {
                type_name: self.name.clone(),
                attribute: name.to_string(),
            })
    }
}

/// Builder for [`TypeDescriptor`].
pub struct TypeDescriptorBuilder {
    name: String,
    collection_name: Option<String>,
    primary_key_name: String,
    attributes: Vec<AttributeDefinition>,
}

impl TypeDescriptorBuilder {
    /// Use `name` instead of `id` as the primary key attribute.
    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_key_name = name.to_string();
        self
    }

    /// Override the collection name (defaults to the type name plus `s`).
    pub fn collection(mut self, name: &str) -> Self {
        self.collection_name = Some(name.to_string());
        self
    }

    /// Declare an attribute; redeclaring a name replaces it.
    pub fn attribute(self, name: &str, attribute_type: Arc<AttributeType>) -> Self {
        self.push(name, attribute_type, None)
    }

    pub fn attribute_with_default(
        self,
        name: &str,
        attribute_type: Arc<AttributeType>,
        default_value: DefaultValue,
    ) -> Self {
        self.push(name, attribute_type, Some(default_value))
    }

    fn push(
        mut self,
        name: &str,
        attribute_type: Arc<AttributeType>,
        default_value: Option<DefaultValue>,
    ) -> Self {
        self.attributes.retain(|existing| existing.name != name);
        self.attributes.push(AttributeDefinition {
            name: name.to_string(),
            attribute_type,
            default_value,
        });
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> Arc<TypeDescriptor> {
        let index = self
            .attributes
            .iter()
            .enumerate()
            .map(|(position, attribute)| (attribute.name.clone(), position))
            .collect();
        let collection_name = self
            .collection_name
            .unwrap_or_else(|| format!("{}s", self.name));

        Arc::new(TypeDescriptor {
            name: self.name,
            collection_name,
            primary_key_name: self.primary_key_name,
            attributes: self.attributes,
            index,
        })
    }
}
