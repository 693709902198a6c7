//! VirtualRouter API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resource driven by the virtualrouter
//! controller, plus the well-known names stamped on the objects the
//! controller manages on its behalf:
//! - VirtualRouter: desired state of one virtual router instance
//! - names: fixed names, labels and annotations of managed objects

pub mod names;
pub mod v1;

pub use v1::{VirtualRouter, VirtualRouterSpec, VirtualRouterStatus};
