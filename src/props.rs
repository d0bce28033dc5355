use crate::error::Result;
use crate::node::BridgeTree;
use crate::toolkit::ObjectId;
use smartstring::{LazyCompact, SmartString};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Interned-friendly string used for prop names, signal names and item ids.
pub type Key = SmartString<LazyCompact>;

/// Stable caller-supplied identifier of a collection item.
pub type ItemId = SmartString<LazyCompact>;

/// Arguments delivered to a driver-supplied signal handler.
pub struct SignalArgs {
    pub target: ObjectId,
    pub payload: PropValue,
}

/// A native event callback supplied by the driver through a prop.
///
/// Handlers are compared by `Rc` pointer identity: re-committing the same
/// handler reference is a no-op in the signal store.
pub type SignalHandler = Rc<dyn Fn(&SignalArgs)>;

/// Renders the projection of an item payload into a nested reconciliation
/// root. Invoked on every bind with the then-current payload, and with `None`
/// to clear the root's content. Must be a pure projection of the payload.
pub type RenderItem = Rc<dyn Fn(&mut BridgeTree, Option<&PropValue>) -> Result<()>>;

/// Tagged prop value crossing the bridge into native property writes,
/// construction arguments and event subscriptions.
#[derive(Clone, Default)]
pub enum PropValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Key),
    /// A pre-built native object (e.g. an adjustment shared between widgets).
    Object(ObjectId),
    Handler(SignalHandler),
    Render(RenderItem),
    /// An index set, the native toolkit's selection representation.
    Indices(Vec<u32>),
    /// An id set, the driver-visible selection representation.
    Ids(Vec<ItemId>),
}

impl PropValue {
    pub fn str(value: impl Into<Key>) -> Self {
        PropValue::Str(value.into())
    }

    pub fn handler(f: impl Fn(&SignalArgs) + 'static) -> Self {
        PropValue::Handler(Rc::new(f))
    }

    pub fn render(f: impl Fn(&mut BridgeTree, Option<&PropValue>) -> Result<()> + 'static) -> Self {
        PropValue::Render(Rc::new(f))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&SignalHandler> {
        match self {
            PropValue::Handler(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_render(&self) -> Option<&RenderItem> {
        match self {
            PropValue::Render(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        use PropValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            // Callbacks compare by reference, not by behavior.
            (Handler(a), Handler(b)) => Rc::ptr_eq(a, b),
            (Render(a), Render(b)) => Rc::ptr_eq(a, b),
            (Indices(a), Indices(b)) => a == b,
            (Ids(a), Ids(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Null => write!(f, "Null"),
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Int(n) => write!(f, "Int({n})"),
            PropValue::Float(x) => write!(f, "Float({x})"),
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::Object(o) => write!(f, "Object({o:?})"),
            PropValue::Handler(_) => write!(f, "Handler(..)"),
            PropValue::Render(_) => write!(f, "Render(..)"),
            PropValue::Indices(v) => write!(f, "Indices({v:?})"),
            PropValue::Ids(v) => write!(f, "Ids({v:?})"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.into())
    }
}

/// An immutable key→value prop map, replaced wholesale on every commit pass.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Props {
    entries: BTreeMap<Key, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for drivers and tests.
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<PropValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: PropValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &PropValue)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys whose values differ between `old` and `new`, over the union of
    /// both maps. A key absent on one side counts as changed.
    pub fn changed_keys(old: Option<&Props>, new: &Props) -> Vec<Key> {
        let mut keys: Vec<Key> = Vec::new();

        for (key, value) in new.iter() {
            match old.and_then(|o| o.get(key)) {
                Some(previous) if previous == value => {}
                _ => keys.push(key.clone()),
            }
        }

        if let Some(old) = old {
            for (key, _) in old.iter() {
                if !new.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        keys
    }
}

/// Whether a single key differs between two prop maps.
pub fn has_changed(old: Option<&Props>, new: &Props, key: &str) -> bool {
    match old {
        None => new.contains(key),
        Some(old) => old.get(key) != new.get(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_keys_union() {
        let old = Props::new().with("label", "a").with("visible", true);
        let new = Props::new().with("label", "b").with("spacing", 4i64);

        let mut keys = Props::changed_keys(Some(&old), &new);
        keys.sort();
        assert_eq!(keys, vec!["label", "spacing", "visible"]);
    }

    #[test]
    fn test_unchanged_value_not_reported() {
        let old = Props::new().with("label", "same");
        let new = Props::new().with("label", "same");
        assert!(Props::changed_keys(Some(&old), &new).is_empty());
    }

    #[test]
    fn test_handler_identity_comparison() {
        let handler: SignalHandler = Rc::new(|_| {});
        let old = Props::new().with("on_clicked", PropValue::Handler(handler.clone()));
        let new = Props::new().with("on_clicked", PropValue::Handler(handler));
        assert!(Props::changed_keys(Some(&old), &new).is_empty());

        let other = Props::new().with("on_clicked", PropValue::handler(|_| {}));
        assert_eq!(Props::changed_keys(Some(&old), &other), vec!["on_clicked"]);
    }

    #[test]
    fn test_no_old_props_reports_all() {
        let new = Props::new().with("label", "x");
        assert_eq!(Props::changed_keys(None, &new), vec!["label"]);
        assert!(has_changed(None, &new, "label"));
        assert!(!has_changed(None, &new, "spacing"));
    }
}
