use crate::toolkit::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("cannot attach '{child}' to '{parent}'")]
    InvalidChild { child: String, parent: String },

    #[error("reference child not present in '{parent}'")]
    MissingReference { parent: String },

    #[error("'{type_name}' requires an 'id' prop")]
    MissingItemId { type_name: String },

    #[error("slot requires an 'id' prop naming the parent property")]
    SlotWithoutId,

    #[error("no writable property '{prop}' on '{type_name}'")]
    UnknownSlot { type_name: String, prop: String },

    #[error("native object {0:?} has been destroyed")]
    DestroyedObject(ObjectId),

    #[error("node is not available (unmounted or mid-dispatch)")]
    NodeUnavailable,

    #[error("toolkit: {0}")]
    Toolkit(String),

    #[error("render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
