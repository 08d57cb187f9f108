//! OpenGL / OpenGL ES headless context over EGL
//!
//! The display is opened on an EGL device (`EGL_EXT_device_enumeration`), so
//! no window system connection is needed. The context is bound without a
//! surface (`EGL_KHR_surfaceless_context`); rendering goes to framebuffer
//! objects the caller creates.
//!
//! EGL contexts are current per thread. The context remembers which thread
//! it was bound on and refuses to bind from another thread until that
//! thread releases it.

use std::ffi::c_void;

use glutin::api::egl::context::PossiblyCurrentContext;
use glutin::api::egl::device::Device as EglDevice;
use glutin::api::egl::display::Display as EglDisplay;
use glutin::config::{ConfigSurfaceTypes, ConfigTemplateBuilder};
use glutin::context::{AsRawContext, ContextApi, ContextAttributesBuilder, RawContext, Version};
use glutin::display::{AsRawDisplay, GlDisplay as _, RawDisplay};
use glutin::prelude::{NotCurrentGlContext, PossiblyCurrentGlContext};

use crate::api::{Api, Backend};
use crate::config::{GlConfig, GlFlavor, HeadlessConfig};
use crate::context::{Binding, Context, ThreadBinding};
use crate::error::{HeadlessError, HeadlessResult};
use crate::handle::{NativeHandle, NativeObject, RawHandle};

struct EglDisplayObject {
    display: EglDisplay,
}

impl NativeObject for EglDisplayObject {
    const KIND: &'static str = "EGLDisplay";

    fn raw(&self) -> RawHandle {
        #[allow(unreachable_patterns)]
        match self.display.raw_display() {
            RawDisplay::Egl(ptr) => RawHandle::from_const_ptr(ptr),
            _ => RawHandle::NULL,
        }
    }

    fn release(self) {
        drop(self.display);
    }
}

struct EglContextObject {
    context: PossiblyCurrentContext,
}

impl NativeObject for EglContextObject {
    const KIND: &'static str = "EGLContext";

    fn raw(&self) -> RawHandle {
        #[allow(unreachable_patterns)]
        match self.context.raw_context() {
            RawContext::Egl(ptr) => RawHandle::from_const_ptr(ptr),
            _ => RawHandle::NULL,
        }
    }

    fn release(self) {
        drop(self.context);
    }
}

fn open_display() -> HeadlessResult<EglDisplay> {
    let devices = EglDevice::query_devices().map_err(|e| {
        HeadlessError::device(Backend::Gl, format!("EGL_EXT_device_enumeration unavailable: {e}"))
    })?;

    let mut last_error = None;
    for device in devices {
        match unsafe { EglDisplay::with_device(&device, None) } {
            Ok(display) => {
                log::info!(
                    "Selected EGL device: {} ({})",
                    device.name().unwrap_or("unnamed"),
                    display.version_string()
                );
                return Ok(display);
            }
            Err(e) => {
                log::debug!("EGL device {:?} rejected: {e}", device.name());
                last_error = Some(e.to_string());
            }
        }
    }

    Err(no_display_error(last_error))
}

fn no_display_error(last_error: Option<String>) -> HeadlessError {
    let reason = last_error.map_or_else(
        || "EGL device enumeration found no devices".to_string(),
        |e| format!("no EGL device yields a display: {e}"),
    );
    HeadlessError::device(Backend::Gl, reason)
}

fn context_api(gl: &GlConfig) -> ContextApi {
    let version = Some(Version::new(gl.version.0, gl.version.1));
    match gl.flavor {
        GlFlavor::Gles => ContextApi::Gles(version),
        GlFlavor::OpenGl => ContextApi::OpenGl(version),
    }
}

fn create_context(display: &EglDisplay, gl: &GlConfig) -> HeadlessResult<PossiblyCurrentContext> {
    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_surface_type(ConfigSurfaceTypes::empty())
        .build();

    let config = unsafe { display.find_configs(template) }
        .map_err(|e| HeadlessError::queue(Backend::Gl, format!("eglChooseConfig: {e}")))?
        .next()
        .ok_or_else(|| HeadlessError::queue(Backend::Gl, "no EGL config matches"))?;

    let attributes = ContextAttributesBuilder::new()
        .with_context_api(context_api(gl))
        .build(None);

    let context = unsafe { display.create_context(&config, &attributes) }
        .map_err(|e| HeadlessError::queue(Backend::Gl, format!("eglCreateContext: {e}")))?;

    Ok(context.treat_as_possibly_current())
}

/// Headless EGL context
///
/// Not `Send`: an EGL context is used from the thread it was created on.
pub struct GlContext {
    context: NativeHandle<EglContextObject>,
    display: NativeHandle<EglDisplayObject>,
    pixel_format: i32,
    binding: ThreadBinding,
}

impl GlContext {
    /// Open an EGL display and create a context on it
    ///
    /// The context starts out not current.
    pub fn new(config: &HeadlessConfig) -> HeadlessResult<Self> {
        let display = open_display()?;

        let context = match create_context(&display, &config.gl) {
            Ok(context) => context,
            Err(error) => {
                EglDisplayObject { display }.release();
                return Err(error);
            }
        };

        log::info!("Created headless {:?} context", config.gl.flavor);
        Ok(Self {
            context: NativeHandle::acquire(EglContextObject { context }),
            display: NativeHandle::acquire(EglDisplayObject { display }),
            pixel_format: Backend::Gl.srgb_format(),
            binding: ThreadBinding::default(),
        })
    }

    /// Resolve a GL entry point, for loaders such as `glow`
    ///
    /// Returns null once released.
    pub fn get_proc_address(&self, symbol: &std::ffi::CStr) -> *const c_void {
        self.display
            .get()
            .map_or(std::ptr::null(), |d| d.display.get_proc_address(symbol))
    }
}

impl Context for GlContext {
    fn backend(&self) -> Backend {
        Backend::Gl
    }

    fn api(&self) -> Api {
        Api::OpenGl {
            display: self.display.raw(),
            context: self.context.raw(),
            pixel_format: self.pixel_format,
        }
    }

    fn make_current(&mut self) -> HeadlessResult<()> {
        let Some(object) = self.context.get() else {
            return Err(HeadlessError::ContextReleased(Backend::Gl));
        };

        match self.binding.binding() {
            // Rebinding on the owning thread is a no-op
            Binding::CurrentHere => Ok(()),
            Binding::CurrentElsewhere(owner) => Err(HeadlessError::make_current(
                Backend::Gl,
                format!("already current on thread {owner:?}"),
            )),
            Binding::Unbound => {
                object
                    .context
                    .make_current_surfaceless()
                    .map_err(|e| HeadlessError::make_current(Backend::Gl, e.to_string()))?;
                self.binding.bind_here();
                log::debug!("EGL context bound to {:?}", std::thread::current().id());
                Ok(())
            }
        }
    }

    fn release_current(&mut self) {
        match self.binding.binding() {
            Binding::CurrentHere => {
                if let Some(object) = self.context.get() {
                    if let Err(e) = object.context.make_not_current_in_place() {
                        log::warn!("eglMakeCurrent(NULL) failed: {e}");
                    }
                }
                self.binding.clear();
                log::debug!("EGL context unbound");
            }
            Binding::CurrentElsewhere(owner) => {
                log::warn!("release_current called off thread {owner:?}; ignoring");
            }
            Binding::Unbound => {}
        }
    }

    fn release(&mut self) {
        self.release_current();
        // The context must go before its display
        self.context.release();
        self.display.release();
        self.pixel_format = 0;
        self.binding.clear();
    }

    fn is_released(&self) -> bool {
        self.context.is_released() && self.display.is_released()
    }
}

impl std::fmt::Debug for GlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlContext")
            .field("display", &self.display)
            .field("context", &self.context)
            .field("binding", &self.binding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_api_follows_config() {
        let gles = GlConfig::default();
        assert_eq!(context_api(&gles), ContextApi::Gles(Some(Version::new(3, 0))));

        let desktop = GlConfig {
            flavor: GlFlavor::OpenGl,
            version: (4, 1),
        };
        assert_eq!(context_api(&desktop), ContextApi::OpenGl(Some(Version::new(4, 1))));
    }

    #[test]
    fn test_display_failures_are_device_errors() {
        let none_found = no_display_error(None);
        assert!(matches!(none_found, HeadlessError::DeviceUnavailable { backend: Backend::Gl, .. }));
        assert!(none_found.to_string().contains("no devices"));

        let rejected = no_display_error(Some("EGL_BAD_DEVICE_EXT".to_string()));
        assert!(rejected.to_string().contains("EGL_BAD_DEVICE_EXT"));
    }

    #[test]
    fn test_context_lifecycle_when_available() {
        let mut ctx = match GlContext::new(&HeadlessConfig::default()) {
            Ok(ctx) => ctx,
            Err(error) => {
                println!("Skipping, EGL unavailable: {error}");
                return;
            }
        };

        let api = ctx.api();
        assert_eq!(api.backend(), Backend::Gl);
        assert!(!api.is_null());
        assert_eq!(api.pixel_format(), Backend::Gl.srgb_format());

        // Unbinding before any bind does nothing
        ctx.release_current();

        if let Err(error) = ctx.make_current() {
            println!("Surfaceless binding unsupported: {error}");
        } else {
            // Second bind on the same thread is idempotent
            ctx.make_current().unwrap();
            assert!(!ctx.get_proc_address(c"glGetString").is_null());
            ctx.release_current();
        }

        ctx.release();
        assert!(ctx.is_released());
        assert!(ctx.api().is_null());
        assert!(matches!(ctx.make_current(), Err(HeadlessError::ContextReleased(Backend::Gl))));
    }
}
