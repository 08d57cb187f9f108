//! # GPU Headless
//!
//! Headless GPU contexts: a native device and queue with no window, surface
//! or swapchain, for offscreen rendering, compute and tests.
//!
//! ## Backends
//!
//! - **Metal**: macOS and iOS
//! - **OpenGL / OpenGL ES**: through EGL device enumeration, surfaceless
//! - **Vulkan**: any target with a Vulkan loader
//! - **Direct3D 12**: Windows
//!
//! Each backend is a cargo feature and is only compiled on targets where its
//! API exists.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gpu_headless::{new_context, Context};
//!
//! fn main() -> Result<(), gpu_headless::HeadlessError> {
//!     let mut ctx = new_context()?;
//!     ctx.make_current()?;
//!
//!     let api = ctx.api();
//!     println!("{} device {:?}", api.backend(), api.device());
//!
//!     ctx.release_current();
//!     ctx.release();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

pub mod api;
pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod handle;
pub mod logging;

pub use api::{Api, Backend};
pub use config::{Config, ConfigError, D3d12Config, GlConfig, GlFlavor, HeadlessConfig};
pub use context::{Context, HeadlessContext};
pub use error::{HeadlessError, HeadlessResult};
pub use factory::{new_context, new_context_with, probe_order};
pub use handle::{NativeHandle, NativeObject, RawHandle};
