use crate::ValueType;
use serde::{Deserialize, Serialize};

/// A named, typed field of an operation's input or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Ordered set of fields. Field names are unique; declaring a name again
/// replaces the earlier declaration in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    fields: Vec<FieldDescriptor>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    pub fn field(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.with(FieldDescriptor {
            name: name.into(),
            ty,
            required: true,
        })
    }

    /// Adds a field that may be left unconnected.
    pub fn optional(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.with(FieldDescriptor {
            name: name.into(),
            ty,
            required: false,
        })
    }

    pub fn with(mut self, descriptor: FieldDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn insert(&mut self, descriptor: FieldDescriptor) {
        match self.fields.iter_mut().find(|f| f.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.fields.push(descriptor),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Shape {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_declaration_order() {
        let shape = Shape::new()
            .field("b", ValueType::Integer)
            .optional("a", ValueType::String);
        let names: Vec<_> = shape.names().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!shape.get("a").unwrap().required);
    }

    #[test]
    fn redeclaring_a_field_replaces_it() {
        let shape = Shape::new()
            .field("x", ValueType::Integer)
            .field("y", ValueType::Bool)
            .field("x", ValueType::Number);
        assert_eq!(shape.len(), 2);
        assert_eq!(shape.get("x").unwrap().ty, ValueType::Number);
        assert_eq!(shape.names().next(), Some("x"));
    }
}
