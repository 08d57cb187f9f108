//! Backend tags and the API descriptor handed to rendering pipelines

use crate::config::ConfigError;
use crate::handle::RawHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `MTLPixelFormatRGBA8Unorm_sRGB`
pub const METAL_RGBA8_UNORM_SRGB: i32 = 71;
/// `GL_SRGB8_ALPHA8`
pub const GL_SRGB8_ALPHA8: i32 = 0x8C43;
/// `VK_FORMAT_R8G8B8A8_SRGB`
pub const VK_FORMAT_R8G8B8A8_SRGB: i32 = 43;
/// `DXGI_FORMAT_R8G8B8A8_UNORM_SRGB`
pub const DXGI_FORMAT_R8G8B8A8_UNORM_SRGB: i32 = 29;

/// Native GPU API a context is built on
///
/// The set is closed; which members exist in a given build depends on the
/// target and the enabled cargo features (see [`Backend::is_compiled`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Apple Metal
    Metal,
    /// OpenGL / OpenGL ES through EGL
    Gl,
    /// Vulkan
    Vulkan,
    /// Direct3D 12
    D3d12,
}

impl Backend {
    /// Every backend, in declaration order
    pub const ALL: [Self; 4] = [Self::Metal, Self::Gl, Self::Vulkan, Self::D3d12];

    /// Whether the native API binds contexts to the calling thread
    pub const fn requires_current(self) -> bool {
        matches!(self, Self::Gl)
    }

    /// The backend's sRGB, 8 bits per channel RGBA format in its own enumeration
    pub const fn srgb_format(self) -> i32 {
        match self {
            Self::Metal => METAL_RGBA8_UNORM_SRGB,
            Self::Gl => GL_SRGB8_ALPHA8,
            Self::Vulkan => VK_FORMAT_R8G8B8A8_SRGB,
            Self::D3d12 => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        }
    }

    /// Whether this build carries an implementation for the backend
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Metal => cfg!(all(feature = "metal", target_vendor = "apple")),
            Self::Gl => cfg!(all(feature = "gl", not(target_vendor = "apple"))),
            Self::Vulkan => cfg!(feature = "vulkan"),
            Self::D3d12 => cfg!(all(feature = "d3d12", windows)),
        }
    }

    /// Backends compiled into this build
    pub fn compiled() -> Vec<Self> {
        Self::ALL.into_iter().filter(|b| b.is_compiled()).collect()
    }

    /// Human readable API name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Metal => "Metal",
            Self::Gl => "OpenGL",
            Self::Vulkan => "Vulkan",
            Self::D3d12 => "Direct3D 12",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    /// Parse the lowercase config spelling (`gl` also accepts `opengl` and `egl`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metal" => Ok(Self::Metal),
            "gl" | "opengl" | "egl" => Ok(Self::Gl),
            "vulkan" => Ok(Self::Vulkan),
            "d3d12" => Ok(Self::D3d12),
            other => Err(ConfigError::Invalid(format!("Unknown backend '{other}'"))),
        }
    }
}

/// Backend-tagged bundle of native references
///
/// Every reference is borrowed from the context that produced the descriptor
/// and is only meaningful until that context is released. After release the
/// context hands out descriptors whose references are null and whose pixel
/// format is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    /// `id<MTLDevice>` / `id<MTLCommandQueue>`
    Metal {
        /// `id<MTLDevice>`
        device: RawHandle,
        /// `id<MTLCommandQueue>`
        queue: RawHandle,
        /// `MTLPixelFormat` value
        pixel_format: i32,
    },
    /// EGL display and context
    OpenGl {
        /// `EGLDisplay`
        display: RawHandle,
        /// `EGLContext`
        context: RawHandle,
        /// GL internal format enum
        pixel_format: i32,
    },
    /// Vulkan instance, device and queue
    Vulkan {
        /// `VkInstance`
        instance: RawHandle,
        /// `VkPhysicalDevice`
        physical_device: RawHandle,
        /// `VkDevice`
        device: RawHandle,
        /// `VkQueue`
        queue: RawHandle,
        /// Queue family the queue was taken from
        queue_family: u32,
        /// Index of the queue inside its family
        queue_index: u32,
        /// `VkFormat` value
        pixel_format: i32,
    },
    /// `ID3D12Device*` / `ID3D12CommandQueue*`
    Direct3D12 {
        /// `ID3D12Device*`
        device: RawHandle,
        /// `ID3D12CommandQueue*`
        queue: RawHandle,
        /// `DXGI_FORMAT` value
        pixel_format: i32,
    },
}

impl Api {
    /// The backend that produced this descriptor
    pub const fn backend(&self) -> Backend {
        match self {
            Self::Metal { .. } => Backend::Metal,
            Self::OpenGl { .. } => Backend::Gl,
            Self::Vulkan { .. } => Backend::Vulkan,
            Self::Direct3D12 { .. } => Backend::D3d12,
        }
    }

    /// Device-role reference (the EGL display on GL)
    pub const fn device(&self) -> RawHandle {
        match *self {
            Self::Metal { device, .. } | Self::Vulkan { device, .. } | Self::Direct3D12 { device, .. } => {
                device
            }
            Self::OpenGl { display, .. } => display,
        }
    }

    /// Queue-role reference (the EGL context on GL)
    pub const fn queue(&self) -> RawHandle {
        match *self {
            Self::Metal { queue, .. } | Self::Vulkan { queue, .. } | Self::Direct3D12 { queue, .. } => {
                queue
            }
            Self::OpenGl { context, .. } => context,
        }
    }

    /// Pixel format code in the backend's native enumeration
    pub const fn pixel_format(&self) -> i32 {
        match *self {
            Self::Metal { pixel_format, .. }
            | Self::OpenGl { pixel_format, .. }
            | Self::Vulkan { pixel_format, .. }
            | Self::Direct3D12 { pixel_format, .. } => pixel_format,
        }
    }

    /// Whether the device or queue reference is null
    pub fn is_null(&self) -> bool {
        self.device().is_null() || self.queue().is_null()
    }

    /// Descriptor returned by a released context of `backend`
    pub const fn released(backend: Backend) -> Self {
        Self::paired(backend, RawHandle::NULL, RawHandle::NULL, 0)
    }

    /// Descriptor for backends that only carry a device/queue pair
    ///
    /// Vulkan's extra fields are zeroed; the Vulkan backend builds its
    /// descriptor directly.
    pub(crate) const fn paired(
        backend: Backend,
        device: RawHandle,
        queue: RawHandle,
        pixel_format: i32,
    ) -> Self {
        match backend {
            Backend::Metal => Self::Metal {
                device,
                queue,
                pixel_format,
            },
            Backend::Gl => Self::OpenGl {
                display: device,
                context: queue,
                pixel_format,
            },
            Backend::Vulkan => Self::Vulkan {
                instance: RawHandle::NULL,
                physical_device: RawHandle::NULL,
                device,
                queue,
                queue_family: 0,
                queue_index: 0,
                pixel_format,
            },
            Backend::D3d12 => Self::Direct3D12 {
                device,
                queue,
                pixel_format,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_gl_requires_current() {
        assert!(Backend::Gl.requires_current());
        assert!(!Backend::Metal.requires_current());
        assert!(!Backend::Vulkan.requires_current());
        assert!(!Backend::D3d12.requires_current());
    }

    #[test]
    fn test_srgb_format_codes() {
        assert_eq!(Backend::Metal.srgb_format(), 71);
        assert_eq!(Backend::Gl.srgb_format(), 0x8C43);
        assert_eq!(Backend::Vulkan.srgb_format(), 43);
        assert_eq!(Backend::D3d12.srgb_format(), 29);
    }

    #[test]
    fn test_uniform_accessors_across_variants() {
        let device = RawHandle::from_u64(0x10);
        let queue = RawHandle::from_u64(0x20);
        for backend in Backend::ALL {
            let api = Api::paired(backend, device, queue, backend.srgb_format());
            assert_eq!(api.backend(), backend);
            assert_eq!(api.device(), device);
            assert_eq!(api.queue(), queue);
            assert_eq!(api.pixel_format(), backend.srgb_format());
            assert!(!api.is_null());
        }
    }

    #[test]
    fn test_released_descriptor_is_zeroed() {
        for backend in Backend::ALL {
            let api = Api::released(backend);
            assert_eq!(api.backend(), backend);
            assert!(api.device().is_null());
            assert!(api.queue().is_null());
            assert_eq!(api.pixel_format(), 0);
            assert!(api.is_null());
        }
    }

    #[test]
    fn test_backend_serde_names() {
        let encoded = toml::to_string(&Wrapper { backend: Backend::D3d12 }).unwrap();
        assert!(encoded.contains("\"d3d12\""));
        let decoded: Wrapper = toml::from_str("backend = \"gl\"").unwrap();
        assert_eq!(decoded.backend, Backend::Gl);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("vulkan".parse::<Backend>().unwrap(), Backend::Vulkan);
        assert_eq!("OpenGL".parse::<Backend>().unwrap(), Backend::Gl);
        assert_eq!("egl".parse::<Backend>().unwrap(), Backend::Gl);
        assert!("webgpu".parse::<Backend>().is_err());
    }

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        backend: Backend,
    }

    #[test]
    fn test_compiled_backends_are_consistent() {
        for backend in Backend::compiled() {
            assert!(backend.is_compiled());
        }
        #[cfg(feature = "vulkan")]
        assert!(Backend::compiled().contains(&Backend::Vulkan));
    }
}
