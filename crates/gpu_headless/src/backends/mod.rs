//! Native backend implementations
//!
//! Each module is compiled only on targets where its API exists and when its
//! cargo feature is enabled.

#[cfg(all(feature = "d3d12", windows))]
pub mod d3d12;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
#[cfg(all(feature = "gl", not(target_vendor = "apple")))]
pub mod gl;
#[cfg(all(feature = "metal", target_vendor = "apple"))]
pub mod metal;
#[cfg(feature = "vulkan")]
pub mod vulkan;
