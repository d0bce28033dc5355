//! Maps element type names to node behaviors.
//!
//! Resolution is an ordered rule list: each rule pairs a predicate over
//! `(type_name, props)` with a factory. The first matching rule wins, so
//! embedders can prepend their own rules ahead of the builtins. The final
//! builtin rule accepts any name known to the type table and produces a
//! plain widget behavior.

use crate::collection::view::{ItemBehavior, ItemViewBehavior, ViewKind};
use crate::error::{Error, Result};
use crate::meta::TypeTable;
use crate::node::vnode::{ControllerBehavior, PositionedChildBehavior, SlotBehavior};
use crate::node::widget::WidgetBehavior;
use crate::node::NodeBehavior;
use crate::props::Props;
use std::rc::Rc;

pub type NodePredicate = Box<dyn Fn(&str, &Props) -> bool>;
pub type NodeFactory = Box<dyn Fn(&str, &Props) -> Box<dyn NodeBehavior>>;

#[derive(Default)]
pub struct NodeRegistry {
    rules: Vec<(NodePredicate, NodeFactory)>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtin rules over `types`: slots, positioned children, controllers,
    /// collection views and items, then every remaining known type as a
    /// plain widget.
    pub fn with_builtins(types: Rc<TypeTable>) -> Self {
        let mut registry = Self::new();

        registry.register(
            Box::new(|name, _| name == "Slot"),
            Box::new(|_, _| Box::new(SlotBehavior::new())),
        );
        registry.register(
            Box::new(|name, _| name == "GridChild"),
            Box::new(|_, _| Box::new(PositionedChildBehavior::new())),
        );
        registry.register(
            Box::new(|name, _| name == "Item"),
            Box::new(|_, _| Box::new(ItemBehavior::new())),
        );
        registry.register(
            Box::new(|name, _| name == "ListView" || name == "GridView"),
            Box::new(|_, _| Box::new(ItemViewBehavior::new(ViewKind::Flat))),
        );
        registry.register(
            Box::new(|name, _| name == "TreeView"),
            Box::new(|_, _| Box::new(ItemViewBehavior::new(ViewKind::Tree))),
        );

        let controller_types = types.clone();
        registry.register(
            Box::new(move |name, _| {
                controller_types.get(name).map(|meta| meta.controller).unwrap_or(false)
            }),
            Box::new(|_, _| Box::new(ControllerBehavior::new())),
        );

        let widget_types = types;
        registry.register(
            Box::new(move |name, _| widget_types.contains(name)),
            Box::new(|_, _| Box::new(WidgetBehavior::new())),
        );

        registry
    }

    /// Prepend a rule so it takes precedence over everything registered so
    /// far.
    pub fn register_front(&mut self, predicate: NodePredicate, factory: NodeFactory) {
        self.rules.insert(0, (predicate, factory));
    }

    pub fn register(&mut self, predicate: NodePredicate, factory: NodeFactory) {
        self.rules.push((predicate, factory));
    }

    pub fn resolve(&self, type_name: &str, props: &Props) -> Result<Box<dyn NodeBehavior>> {
        for (predicate, factory) in &self.rules {
            if predicate(type_name, props) {
                return Ok(factory(type_name, props));
            }
        }
        Err(Error::UnknownNodeType(type_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRole;

    fn table() -> Rc<TypeTable> {
        Rc::new(
            TypeTable::builder()
                .ty("Label")
                .property("label", "set_label", Some("label"))
                .register()
                .ty("ClickGesture")
                .controller()
                .register()
                .build(),
        )
    }

    #[test]
    fn test_resolves_builtin_families() {
        let registry = NodeRegistry::with_builtins(table());
        let props = Props::new();

        assert_eq!(registry.resolve("Label", &props).unwrap().role(), NodeRole::Widget);
        assert_eq!(
            registry.resolve("ClickGesture", &props).unwrap().role(),
            NodeRole::Controller
        );
        assert_eq!(registry.resolve("Item", &props).unwrap().role(), NodeRole::Item);
        assert_eq!(registry.resolve("Slot", &props).unwrap().role(), NodeRole::Virtual);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let registry = NodeRegistry::with_builtins(table());
        assert!(matches!(
            registry.resolve("Bogus", &Props::new()),
            Err(Error::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_custom_rule_takes_precedence() {
        let mut registry = NodeRegistry::with_builtins(table());
        registry.register_front(
            Box::new(|name, _| name == "Label"),
            Box::new(|_, _| Box::new(ControllerBehavior::new())),
        );
        let resolved = registry.resolve("Label", &Props::new()).unwrap();
        assert_eq!(resolved.role(), NodeRole::Controller);
    }
}
