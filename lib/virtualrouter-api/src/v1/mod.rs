/// API version v1 for VirtualRouter CRDs

pub mod virtual_router;

pub use virtual_router::{VirtualRouter, VirtualRouterSpec, VirtualRouterStatus};

/// Kind name recorded in owner references of managed objects
pub const KIND: &str = "VirtualRouter";
