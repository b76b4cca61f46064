use std::fmt;

use crate::{Entity, extract::extract, meta::AttributeDescriptor, value::Value};

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Text attribute contains the needle as a substring.
    Contains(AttributeDescriptor, String),
    Equals(AttributeDescriptor, Value),
}

impl Predicate {
    pub fn attribute(&self) -> &AttributeDescriptor {
        match self {
            Predicate::Contains(attribute, _) | Predicate::Equals(attribute, _) => attribute,
        }
    }

    fn matches<T: Entity>(&self, candidate: &T) -> bool {
        let Ok(Some(actual)) = extract(candidate, self.attribute()) else {
            return false;
        };
        match self {
            Predicate::Contains(_, needle) => actual
                .as_text()
                .is_some_and(|text| text.contains(needle.as_str())),
            Predicate::Equals(_, expected) => &actual == expected,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Contains(attribute, needle) => {
                write!(f, "{} contains {:?}", attribute.name, needle)
            }
            Predicate::Equals(attribute, value) => write!(f, "{} = {}", attribute.name, value),
        }
    }
}

/// Conjunction of predicates. An empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn build(values: impl IntoIterator<Item = (AttributeDescriptor, Value)>) -> Self {
        let predicates = values
            .into_iter()
            .map(|(attribute, value)| match value {
                Value::Text(needle) => Predicate::Contains(attribute, needle),
                other => Predicate::Equals(attribute, other),
            })
            .collect();
        Self { predicates }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches<T: Entity>(&self, candidate: &T) -> bool {
        self.predicates.iter().all(|p| p.matches(candidate))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            return write!(f, "<all>");
        }
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            write!(f, "{}", predicate)?;
        }
        Ok(())
    }
}
