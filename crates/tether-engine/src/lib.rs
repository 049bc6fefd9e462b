//! Tether engine - cross-thread invocation bridge
//!
//! Builds signature-checked call descriptors from dynamic argument lists and
//! dispatches them on the caller's thread or on another execution context,
//! blocking or fire-and-forget.
//!
//! # Example
//!
//! ```ignore
//! use tether_engine::{Bridge, BridgeConfig, ContextThread};
//! use tether_sdk::{dyn_args, ClassRegistry};
//!
//! let bridge = Bridge::new(registry, &BridgeConfig::default());
//! let ui = ContextThread::spawn("ui")?;
//! let point = bridge.construct_on(&ui.handle(), "Point", "initWithX:Y:", dyn_args![3, 4])?;
//! let x = bridge.call_on(&ui.handle(), &point, "x", dyn_args![])?;
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod builder;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod invocation;

pub use bridge::Bridge;
pub use builder::{CallBuilder, CallDescriptor, ExecutionConstraint};
pub use config::{BridgeConfig, ConfigError, ServerConfig, TetherConfig};
pub use context::{ContextHandle, ContextThread, RunLoop};
pub use dispatch::{CallState, Dispatcher, Locality, Mode};
pub use invocation::Invocation;
