pub mod collection;
pub mod error;
pub mod headless;
pub mod meta;
pub mod node;
pub mod props;
pub mod scheduler;
pub mod signal;
pub mod toolkit;

use std::cell::RefCell;
use std::rc::Rc;

// Re-export the types a driver works with day to day.
pub use error::{Error, Result};
pub use headless::HeadlessToolkit;
pub use meta::{ContainerKind, SecondChildPolicy, TypeTable};
pub use node::registry::NodeRegistry;
pub use node::{BridgeTree, Env, NodeId};
pub use props::{ItemId, Key, PropValue, Props, RenderItem, SignalArgs, SignalHandler};
pub use scheduler::CommitPriority;
pub use signal::SignalStore;
pub use toolkit::{ContainerId, ItemFactory, ObjectId, Toolkit};

/// Shared reference to a bridge tree (interior mutability handled by the
/// caller at dispatch boundaries).
pub type SharedBridgeTree = Rc<RefCell<BridgeTree>>;
