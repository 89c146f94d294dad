//! Surface/swapchain management for one animation.
//!
//! Two binding modes:
//!
//! 1. **Window** — a platform surface handle (`CAMetalLayer`,
//!    `ANativeWindow`, `HWND`, Wayland/X11 surface) wrapped in a
//!    `wgpu::SurfaceTarget`. The native object stays caller-owned; only
//!    the swapchain configuration is released on drop.
//!
//! 2. **Offscreen** — a plain render-target texture. Used for tests,
//!    CI, and server-side rendering, mirroring the windowed path closely
//!    enough that the frame executor cannot tell them apart.

use log::{debug, warn};
use wgpu::{
    SurfaceConfiguration, Texture, TextureDescriptor, TextureDimension, TextureUsages,
    TextureView, TextureViewDescriptor,
};

use pngine_core::error::{EngineError, EngineResult, ErrorCode};

use crate::context::GpuContext;

/// Where an animation's frames go.
pub enum SurfaceTarget {
    /// A caller-owned platform surface. Must remain valid for the
    /// animation's lifetime.
    Window(wgpu::SurfaceTarget<'static>),
    /// Headless render target of the given creation size.
    Offscreen,
}

#[derive(Debug)]
enum SurfaceMode {
    Window {
        surface: wgpu::Surface<'static>,
        config: SurfaceConfiguration,
    },
    Offscreen {
        texture: Texture,
    },
}

/// One presentable frame texture, acquired per render call.
pub enum FrameTexture {
    Swapchain { frame: wgpu::SurfaceTexture, view: TextureView },
    Offscreen { view: TextureView },
}

impl FrameTexture {
    pub fn view(&self) -> &TextureView {
        match self {
            Self::Swapchain { view, .. } => view,
            Self::Offscreen { view } => view,
        }
    }

    /// Present the frame. Offscreen targets have nothing to present.
    pub fn present(self) {
        if let Self::Swapchain { frame, .. } = self {
            frame.present();
        }
    }
}

/// Binds one surface, hands out frame textures, and tracks dimensions.
#[derive(Debug)]
pub struct SurfaceManager {
    mode: SurfaceMode,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl SurfaceManager {
    /// Bind to the target and configure the initial swapchain.
    pub fn bind(
        gpu: &GpuContext,
        target: SurfaceTarget,
        width: u32,
        height: u32,
    ) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("surface dimensions must be non-zero, got {width}x{height}"),
            ));
        }

        match target {
            SurfaceTarget::Window(window) => {
                let surface = gpu.instance.create_surface(window).map_err(|e| {
                    EngineError::new(
                        ErrorCode::SurfaceFailed,
                        format!("surface creation failed: {e}"),
                    )
                })?;

                let caps = surface.get_capabilities(&gpu.adapter);
                if caps.formats.is_empty() {
                    return Err(EngineError::new(
                        ErrorCode::SurfaceFailed,
                        "surface is incompatible with the GPU adapter",
                    ));
                }
                let format = caps
                    .formats
                    .iter()
                    .find(|f| f.is_srgb())
                    .copied()
                    .unwrap_or(caps.formats[0]);

                let config = SurfaceConfiguration {
                    usage: TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width,
                    height,
                    present_mode: wgpu::PresentMode::Fifo, // VSync
                    desired_maximum_frame_latency: 2,
                    alpha_mode: caps.alpha_modes[0],
                    view_formats: vec![],
                };
                surface.configure(&gpu.device, &config);
                debug!("bound window surface {width}x{height} ({format:?})");

                Ok(Self {
                    mode: SurfaceMode::Window { surface, config },
                    format,
                    width,
                    height,
                })
            }
            SurfaceTarget::Offscreen => {
                let format = gpu.offscreen_format;
                let texture = create_offscreen(gpu, width, height, format);
                debug!("bound offscreen surface {width}x{height} ({format:?})");

                Ok(Self {
                    mode: SurfaceMode::Offscreen { texture },
                    format,
                    width,
                    height,
                })
            }
        }
    }

    /// Acquire the next presentable frame texture.
    ///
    /// Failure is the recoverable [`ErrorCode::TextureUnavail`] — the
    /// platform may simply have no frame right now (minimized, surface
    /// lost mid-reconfigure). Lost/outdated swapchains are reconfigured
    /// so the next call can succeed.
    pub fn acquire(&mut self, gpu: &GpuContext) -> EngineResult<FrameTexture> {
        match &mut self.mode {
            SurfaceMode::Window { surface, config } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame.texture.create_view(&TextureViewDescriptor::default());
                    Ok(FrameTexture::Swapchain { frame, view })
                }
                Err(wgpu::SurfaceError::OutOfMemory) => Err(EngineError::new(
                    ErrorCode::OutOfMemory,
                    "out of memory acquiring frame texture",
                )),
                Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    warn!("swapchain {e}; reconfiguring");
                    surface.configure(&gpu.device, config);
                    Err(EngineError::new(
                        ErrorCode::TextureUnavail,
                        format!("frame texture unavailable: {e}"),
                    ))
                }
                Err(e) => Err(EngineError::new(
                    ErrorCode::TextureUnavail,
                    format!("frame texture unavailable: {e}"),
                )),
            },
            SurfaceMode::Offscreen { texture } => Ok(FrameTexture::Offscreen {
                view: texture.create_view(&TextureViewDescriptor::default()),
            }),
        }
    }

    /// Reconfigure for new dimensions.
    ///
    /// Reported width/height change immediately, whether or not a frame
    /// is ever rendered afterwards.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> EngineResult<()> {
        if width == 0 || height == 0 {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("resize dimensions must be non-zero, got {width}x{height}"),
            ));
        }

        match &mut self.mode {
            SurfaceMode::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&gpu.device, config);
            }
            SurfaceMode::Offscreen { texture } => {
                *texture = create_offscreen(gpu, width, height, self.format);
            }
        }
        self.width = width;
        self.height = height;
        debug!("surface resized to {width}x{height}");
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Format the frame executor must target.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

fn create_offscreen(
    gpu: &GpuContext,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Texture {
    gpu.device.create_texture(&TextureDescriptor {
        label: Some("pngine_offscreen_target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        let Ok(gpu) = GpuContext::acquire() else {
            return;
        };
        let err = SurfaceManager::bind(&gpu, SurfaceTarget::Offscreen, 0, 64).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn offscreen_acquire_and_resize() {
        let Ok(gpu) = GpuContext::acquire() else {
            return;
        };
        let mut mgr = SurfaceManager::bind(&gpu, SurfaceTarget::Offscreen, 64, 32).unwrap();
        assert_eq!((mgr.width(), mgr.height()), (64, 32));
        assert!(mgr.acquire(&gpu).is_ok());

        mgr.resize(&gpu, 128, 256).unwrap();
        // Dimensions update immediately, no render needed.
        assert_eq!((mgr.width(), mgr.height()), (128, 256));
        assert!(mgr.acquire(&gpu).is_ok());

        let err = mgr.resize(&gpu, 0, 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        // Failed resize leaves dimensions untouched.
        assert_eq!((mgr.width(), mgr.height()), (128, 256));
    }
}
