use std::collections::HashMap;

use crate::{Entity, error::Error, value::ValueType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
    pub is_array: bool,
    /// 0 for the most-derived type, +1 per supertype.
    pub level: usize,
}

impl AttributeDescriptor {
    pub const fn new(name: &'static str, value_type: ValueType, is_array: bool) -> Self {
        Self {
            name,
            value_type,
            is_array,
            level: 0,
        }
    }

    fn at_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }
}

// 实体元信息
pub struct EntityMeta {
    pub type_path: &'static str,
    pub attributes: fn() -> Vec<AttributeDescriptor>,
    pub supertype: Option<fn() -> &'static str>,
}

impl std::fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EntityMeta {{ type_path: {}, attributes: {:?}, supertype: {:?} }}",
            self.type_path,
            (self.attributes)()
                .iter()
                .map(|a| a.name)
                .collect::<Vec<_>>(),
            self.supertype.map(|s| s())
        )
    }
}

// 使用 inventory 收集所有实体
inventory::collect!(EntityMeta);

/// All registered entity types, keyed by type path.
pub fn registered_entities() -> HashMap<&'static str, &'static EntityMeta> {
    inventory::iter::<EntityMeta>()
        .map(|meta| (meta.type_path, meta))
        .collect()
}

pub fn lookup(type_path: &str) -> Option<&'static EntityMeta> {
    inventory::iter::<EntityMeta>().find(|meta| meta.type_path == type_path)
}

/// Ordered scalar attributes of `T` and all its supertypes, most-derived first.
pub fn attributes_for<T: Entity>(excluded: &[&str]) -> Result<Vec<AttributeDescriptor>, Error> {
    attributes_for_path(T::type_path(), excluded)
}

/// Same as [`attributes_for`], starting from a registered type path.
///
/// Names are not de-duplicated across levels; a supertype attribute shadowed
/// by a derived one shows up twice.
pub fn attributes_for_path(
    type_path: &str,
    excluded: &[&str],
) -> Result<Vec<AttributeDescriptor>, Error> {
    let mut meta = lookup(type_path).ok_or_else(|| Error::Introspection(type_path.to_string()))?;
    let mut level = 0;
    let mut attributes = Vec::new();
    loop {
        attributes.extend(
            (meta.attributes)()
                .into_iter()
                .filter(|a| !a.is_array && !excluded.contains(&a.name))
                .map(|a| a.at_level(level)),
        );
        let Some(supertype) = meta.supertype else {
            break;
        };
        let supertype = supertype();
        meta = lookup(supertype).ok_or_else(|| Error::Introspection(supertype.to_string()))?;
        level += 1;
    }
    Ok(attributes)
}
