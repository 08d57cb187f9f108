//! Context factory
//!
//! Walks the configured backend order and returns the first backend that
//! constructs. Failures are logged and collected so the caller sees why every
//! candidate was rejected.

use crate::api::Backend;
use crate::config::HeadlessConfig;
use crate::context::HeadlessContext;
use crate::error::{HeadlessError, HeadlessResult};

/// Create a context for the platform's preferred backend
///
/// Same as [`new_context_with`] on [`HeadlessConfig::default`].
pub fn new_context() -> HeadlessResult<HeadlessContext> {
    new_context_with(&HeadlessConfig::default())
}

/// Create a context following `config.backends`
///
/// The config is validated first. On error no native resource is left
/// allocated.
pub fn new_context_with(config: &HeadlessConfig) -> HeadlessResult<HeadlessContext> {
    config.validate()?;
    probe_order(&config.backends, |backend| open_backend(backend, config))
}

/// Try `open` on each backend of `order` until one succeeds
///
/// Every failure is kept. When all fail the result is
/// [`HeadlessError::NoBackend`], except that a lone failure is returned as
/// is. Backends missing from this build fail with
/// [`HeadlessError::BackendNotCompiled`] and are only logged at debug level.
pub fn probe_order<F>(order: &[Backend], mut open: F) -> HeadlessResult<HeadlessContext>
where
    F: FnMut(Backend) -> HeadlessResult<HeadlessContext>,
{
    let mut errors = Vec::new();

    for &backend in order {
        match open(backend) {
            Ok(context) => {
                log::info!("Using {backend} headless backend");
                return Ok(context);
            }
            Err(error @ HeadlessError::BackendNotCompiled(_)) => {
                log::debug!("Skipping {backend}: {error}");
                errors.push(error);
            }
            Err(error) => {
                log::warn!("{backend} backend unavailable: {error}");
                errors.push(error);
            }
        }
    }

    if errors.len() == 1 {
        if let Some(error) = errors.pop() {
            return Err(error);
        }
    }
    Err(HeadlessError::NoBackend(errors))
}

/// Construct one backend, or report it as missing from this build
#[allow(unused_variables)]
fn open_backend(backend: Backend, config: &HeadlessConfig) -> HeadlessResult<HeadlessContext> {
    match backend {
        #[cfg(all(feature = "metal", target_vendor = "apple"))]
        Backend::Metal => crate::backends::metal::MetalContext::new().map(HeadlessContext::from),
        #[cfg(all(feature = "gl", not(target_vendor = "apple")))]
        Backend::Gl => crate::backends::gl::GlContext::new(config).map(HeadlessContext::from),
        #[cfg(feature = "vulkan")]
        Backend::Vulkan => crate::backends::vulkan::VulkanContext::new(config).map(HeadlessContext::from),
        #[cfg(all(feature = "d3d12", windows))]
        Backend::D3d12 => crate::backends::d3d12::D3d12Context::new(config).map(HeadlessContext::from),
        #[allow(unreachable_patterns)]
        other => Err(HeadlessError::BackendNotCompiled(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::fake::{Fault, FakeDriver};
    use crate::context::Context;

    fn open_fake(driver: &FakeDriver) -> HeadlessResult<HeadlessContext> {
        driver.open().map(HeadlessContext::from)
    }

    #[test]
    fn test_first_success_wins() {
        let vulkan = FakeDriver::new(Backend::Vulkan);
        let gl = FakeDriver::new(Backend::Gl);

        let mut ctx = probe_order(&[Backend::Vulkan, Backend::Gl], |backend| match backend {
            Backend::Vulkan => open_fake(&vulkan),
            _ => open_fake(&gl),
        })
        .unwrap();

        assert_eq!(ctx.backend(), Backend::Vulkan);
        assert_eq!(gl.device_creations(), 0);
        ctx.release();
    }

    #[test]
    fn test_falls_back_to_next_backend() {
        let vulkan = FakeDriver::new(Backend::Vulkan).with_fault(Fault::Device);
        let gl = FakeDriver::new(Backend::Gl);

        let mut ctx = probe_order(&[Backend::Vulkan, Backend::Gl], |backend| match backend {
            Backend::Vulkan => open_fake(&vulkan),
            _ => open_fake(&gl),
        })
        .unwrap();

        assert_eq!(ctx.backend(), Backend::Gl);
        assert_eq!(vulkan.live_objects(), 0);
        ctx.release();
        assert_eq!(gl.live_objects(), 0);
    }

    #[test]
    fn test_all_failures_are_collected() {
        let vulkan = FakeDriver::new(Backend::Vulkan).with_fault(Fault::Device);
        let gl = FakeDriver::new(Backend::Gl).with_fault(Fault::Queue);

        let error = probe_order(&[Backend::Vulkan, Backend::Gl], |backend| match backend {
            Backend::Vulkan => open_fake(&vulkan),
            _ => open_fake(&gl),
        })
        .unwrap_err();

        let HeadlessError::NoBackend(errors) = error else {
            panic!("expected NoBackend");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], HeadlessError::DeviceUnavailable { backend: Backend::Vulkan, .. }));
        assert!(matches!(errors[1], HeadlessError::QueueCreation { backend: Backend::Gl, .. }));
        assert_eq!(gl.live_objects(), 0);
    }

    #[test]
    fn test_single_candidate_error_is_unchanged() {
        let metal = FakeDriver::new(Backend::Metal).with_fault(Fault::Device);

        let error = probe_order(&[Backend::Metal], |_| open_fake(&metal)).unwrap_err();

        assert!(matches!(error, HeadlessError::DeviceUnavailable { backend: Backend::Metal, .. }));
        assert!(error.to_string().contains("device"));
    }

    #[test]
    fn test_empty_order_yields_no_backend() {
        let error = probe_order(&[], |_| unreachable!()).unwrap_err();
        assert!(matches!(error, HeadlessError::NoBackend(ref errors) if errors.is_empty()));
    }

    #[test]
    fn test_missing_backends_are_skipped() {
        let missing = Backend::ALL.into_iter().find(|b| !b.is_compiled());
        let Some(missing) = missing else {
            return;
        };
        let gl = FakeDriver::new(Backend::Gl);

        let mut ctx = probe_order(&[missing, Backend::Gl], |backend| {
            if backend == missing {
                open_backend(backend, &HeadlessConfig::default())
            } else {
                open_fake(&gl)
            }
        })
        .unwrap();

        assert_eq!(ctx.backend(), Backend::Gl);
        ctx.release();
    }

    #[test]
    fn test_invalid_config_is_rejected_before_probing() {
        let config = HeadlessConfig::default().with_backends(Vec::<Backend>::new());
        let error = new_context_with(&config).unwrap_err();
        assert!(matches!(error, HeadlessError::Config(_)));
    }
}
