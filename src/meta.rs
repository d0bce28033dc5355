//! Per-type metadata consumed from the generated-bindings collaborator.
//!
//! The binding generator knows, for every native type, which properties are
//! writable, which signals exist, and which properties can only be supplied
//! at construction time. Inheritance is flattened here once at registration,
//! so prop updates never walk an ancestor chain.

use crate::props::Key;
use std::collections::HashMap;

/// How a native container accepts direct children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerKind {
    /// No direct children.
    #[default]
    Leaf,
    /// Ordered children via append/insert-before/remove.
    MultiChild,
    /// Exactly one child via a child setter.
    SingleChild { on_second_child: SecondChildPolicy },
    /// Exactly one child via a content setter.
    Content,
}

/// Declared policy for a single-child container receiving a second child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondChildPolicy {
    Reject,
    Replace,
}

/// A writable native property: setter name plus optional getter.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    pub setter: Key,
    pub getter: Option<Key>,
}

/// Flattened metadata for one concrete native type.
#[derive(Debug, Clone, Default)]
pub struct TypeMeta {
    /// prop name → writable property.
    pub properties: HashMap<Key, PropertyMeta>,
    /// handler prop name ("on_clicked") → native signal name ("clicked").
    pub signals: HashMap<Key, Key>,
    /// prop name → construction argument name (skipped by commit updates).
    pub construct_only: HashMap<Key, Key>,
    pub container: ContainerKind,
    /// Event-controller types attach to a widget instead of parenting into it.
    pub controller: bool,
}

/// Registry of flattened type metadata, keyed by native type name.
#[derive(Default)]
pub struct TypeTable {
    types: HashMap<Key, TypeMeta>,
}

impl TypeTable {
    pub fn builder() -> TypeTableBuilder {
        TypeTableBuilder {
            table: TypeTable::default(),
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeMeta> {
        self.types.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Resolve a prop name to its writable property, if any.
    pub fn property(&self, type_name: &str, prop: &str) -> Option<&PropertyMeta> {
        self.get(type_name)?.properties.get(prop)
    }

    /// Resolve a handler prop name to its native signal name, if any.
    pub fn signal(&self, type_name: &str, prop: &str) -> Option<&Key> {
        self.get(type_name)?.signals.get(prop)
    }

    pub fn is_construct_only(&self, type_name: &str, prop: &str) -> bool {
        self.get(type_name)
            .map(|meta| meta.construct_only.contains_key(prop))
            .unwrap_or(false)
    }

    pub fn container_kind(&self, type_name: &str) -> ContainerKind {
        self.get(type_name)
            .map(|meta| meta.container)
            .unwrap_or_default()
    }
}

/// Registers types and flattens declared inheritance into closed tables.
pub struct TypeTableBuilder {
    table: TypeTable,
}

impl TypeTableBuilder {
    /// Begin registering a type. `inherits` must name an already registered
    /// type whose rows are copied before this type's own rows apply.
    pub fn ty(self, type_name: &str) -> TypeBuilder {
        TypeBuilder {
            builder: self,
            name: type_name.into(),
            meta: TypeMeta::default(),
        }
    }

    pub fn build(self) -> TypeTable {
        self.table
    }
}

pub struct TypeBuilder {
    builder: TypeTableBuilder,
    name: Key,
    meta: TypeMeta,
}

impl TypeBuilder {
    pub fn inherits(mut self, parent: &str) -> Self {
        if let Some(parent) = self.builder.table.types.get(parent) {
            let own = std::mem::take(&mut self.meta);
            let mut merged = parent.clone();
            merged.properties.extend(own.properties);
            merged.signals.extend(own.signals);
            merged.construct_only.extend(own.construct_only);
            if own.container != ContainerKind::Leaf {
                merged.container = own.container;
            }
            merged.controller = merged.controller || own.controller;
            self.meta = merged;
        }
        self
    }

    pub fn container(mut self, kind: ContainerKind) -> Self {
        self.meta.container = kind;
        self
    }

    pub fn controller(mut self) -> Self {
        self.meta.controller = true;
        self
    }

    pub fn property(mut self, prop: &str, setter: &str, getter: Option<&str>) -> Self {
        self.meta.properties.insert(
            prop.into(),
            PropertyMeta {
                setter: setter.into(),
                getter: getter.map(Into::into),
            },
        );
        self
    }

    pub fn signal(mut self, prop: &str, signal: &str) -> Self {
        self.meta.signals.insert(prop.into(), signal.into());
        self
    }

    pub fn construct_only(mut self, prop: &str, arg: &str) -> Self {
        self.meta.construct_only.insert(prop.into(), arg.into());
        self
    }

    pub fn register(mut self) -> TypeTableBuilder {
        self.builder.table.types.insert(self.name, self.meta);
        self.builder
    }
}
