//! GPU context — owns `wgpu::Instance`, `Device`, and `Queue`.
//!
//! One context is acquired at runtime init and shared by every animation.
//! Surfaces are NOT owned here: each animation binds its own surface
//! through [`crate::surface::SurfaceManager`], so animations on different
//! threads never contend for per-frame state.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use log::{debug, error, warn};
use thiserror::Error;
use wgpu::{
    Adapter, Device, DeviceDescriptor, Instance, InstanceDescriptor, Queue,
    RequestAdapterOptions, ShaderModule, ShaderModuleDescriptor, TextureFormat,
};

use pngine_core::error::{EngineError, ErrorCode};

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Surface error: {0}")]
    Surface(String),
}

impl From<GpuError> for EngineError {
    fn from(err: GpuError) -> Self {
        let code = match err {
            GpuError::Surface(_) => ErrorCode::SurfaceFailed,
            _ => ErrorCode::ContextFailed,
        };
        EngineError::new(code, err.to_string())
    }
}

/// Core GPU state shared by all animations.
pub struct GpuContext {
    pub instance: Instance,
    pub device: Device,
    pub queue: Queue,
    pub adapter: Adapter,
    /// Fallback format for offscreen targets; window surfaces negotiate
    /// their own from surface capabilities.
    pub offscreen_format: TextureFormat,
}

impl GpuContext {
    /// Acquire adapter and device, blocking the calling thread.
    ///
    /// The engine is a synchronous library; callers drive it from their
    /// own render thread, so the wgpu futures are resolved in place.
    pub fn acquire() -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("pngine-device"),
                ..Default::default()
            },
            None,
        ))?;

        // Errors that escape every scope are engine defects; surface them
        // through the host's logger instead of the default panic.
        device.on_uncaptured_error(Box::new(|e| {
            error!("uncaptured GPU error: {e}");
        }));

        debug!("acquired GPU context: {:?}", adapter.get_info().backend);

        Ok(Self {
            instance,
            device,
            queue,
            adapter,
            // Bgra8UnormSrgb is the most universally supported format.
            offscreen_format: TextureFormat::Bgra8UnormSrgb,
        })
    }

    /// Compile (or fetch from the shared cache) a shader module.
    ///
    /// Compilation errors are captured through a validation scope and
    /// reported as [`ErrorCode::ShaderCompile`].
    pub fn compile_shader(
        &self,
        cache: &ShaderCache,
        wgsl: &str,
    ) -> Result<ShaderModule, EngineError> {
        let key = ShaderCache::key(wgsl);
        if let Some(module) = cache.get(key) {
            return Ok(module);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("pngine_shader"),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        if let Some(e) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EngineError::new(
                ErrorCode::ShaderCompile,
                format!("shader compilation failed: {e}"),
            ));
        }

        cache.insert(key, module.clone());
        Ok(module)
    }
}

/// Process-shared shader module cache.
///
/// Purged on memory-pressure notification; purging never invalidates
/// modules already referenced by built pipelines, so live animations are
/// unaffected. Interior `Mutex` because `memory_warning` may arrive on
/// any thread.
#[derive(Default)]
pub struct ShaderCache {
    modules: Mutex<HashMap<u64, ShaderModule>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(wgsl: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        wgsl.hash(&mut hasher);
        hasher.finish()
    }

    fn get(&self, key: u64) -> Option<ShaderModule> {
        self.modules.lock().ok()?.get(&key).cloned()
    }

    fn insert(&self, key: u64, module: ShaderModule) {
        if let Ok(mut map) = self.modules.lock() {
            map.insert(key, module);
        }
    }

    /// Drop every cached module. Called on memory pressure.
    pub fn purge(&self) {
        match self.modules.lock() {
            Ok(mut map) => {
                let n = map.len();
                map.clear();
                debug!("purged {n} cached shader modules");
            }
            Err(_) => warn!("shader cache lock poisoned; skipping purge"),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.modules.lock().map(|m| m.len()).unwrap_or(0)
    }
}
