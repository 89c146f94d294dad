//! One animation: a loaded program bound to a surface, plus the GPU
//! resources and counters it owns.
//!
//! Animations are exclusively owned by the runtime's arena and addressed
//! by opaque IDs; nothing here is internally synchronized — the runtime
//! wraps each animation in its own lock so different animations can be
//! driven from different threads.

use log::debug;

use pngine_core::bytecode;
use pngine_core::diagnostics::Diagnostics;
use pngine_core::error::{EngineError, EngineResult, ErrorCode};
use pngine_core::program::{PipelineKind, Program, ResourceDesc};

use crate::context::{GpuContext, ShaderCache};
use crate::executor::{execute_frame, PassStatus};
use crate::resources::ResourceTable;
use crate::surface::{SurfaceManager, SurfaceTarget};

#[derive(Debug)]
pub struct Animation {
    program: Program,
    surface: SurfaceManager,
    table: ResourceTable,
    diagnostics: Diagnostics,
    last_error: Option<EngineError>,
    pass_status: PassStatus,
}

impl Animation {
    /// Parse, validate, bind the surface, and pre-warm the program's
    /// pipelines.
    ///
    /// Validation itself never touches the GPU; pre-warming afterwards
    /// realizes every declared pipeline so shader and pipeline failures
    /// surface at creation rather than on some later frame. Buffers,
    /// textures, and bind groups stay lazy.
    pub(crate) fn create(
        gpu: &GpuContext,
        cache: &ShaderCache,
        bytecode: &[u8],
        target: SurfaceTarget,
        width: u32,
        height: u32,
    ) -> EngineResult<Self> {
        let program = bytecode::parse(bytecode)
            .map_err(|e| EngineError::new(ErrorCode::BytecodeInvalid, e.to_string()))?;
        let surface = SurfaceManager::bind(gpu, target, width, height)?;

        let mut animation = Self {
            program,
            surface,
            table: ResourceTable::new(),
            diagnostics: Diagnostics::new(),
            last_error: None,
            pass_status: PassStatus::Clean,
        };
        animation.prewarm(gpu, cache)?;

        debug!(
            "created animation: {} resources, {} instructions, {width}x{height}",
            animation.program.resources().len(),
            animation.program.timeline().len()
        );
        Ok(animation)
    }

    fn prewarm(&mut self, gpu: &GpuContext, cache: &ShaderCache) -> EngineResult<()> {
        let format = self.surface.format();
        for decl in self.program.resources() {
            if let ResourceDesc::Pipeline(p) = &decl.desc {
                match p.kind {
                    PipelineKind::Render => self.table.realize_render_pipeline(
                        gpu,
                        cache,
                        &self.program,
                        decl.id,
                        format,
                    )?,
                    PipelineKind::Compute => {
                        self.table
                            .realize_compute_pipeline(gpu, cache, &self.program, decl.id)?
                    }
                }
            }
        }
        Ok(())
    }

    /// Render one frame at `time` seconds. Failures are recorded as this
    /// animation's last error before being returned.
    pub fn render(&mut self, gpu: &GpuContext, cache: &ShaderCache, time: f32) -> EngineResult<()> {
        let result = execute_frame(
            gpu,
            cache,
            &self.program,
            &mut self.surface,
            &mut self.table,
            &mut self.diagnostics,
            &mut self.pass_status,
            time,
        );
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) -> EngineResult<()> {
        let result = self.surface.resize(gpu, width, height);
        if let Err(e) = &result {
            self.last_error = Some(e.clone());
        }
        result
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn compute_counters(&self) -> u32 {
        self.diagnostics.packed_compute()
    }

    pub fn render_counters(&self) -> u32 {
        self.diagnostics.packed_render()
    }

    pub fn frame_count(&self) -> u32 {
        self.diagnostics.frame_count()
    }

    pub fn reset_counters(&mut self) {
        self.diagnostics.reset();
    }

    /// Last failure recorded by this animation's own calls. Success does
    /// not clear it.
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn pass_status(&self) -> PassStatus {
        self.pass_status
    }

    /// Coarse health probe: 0 when nothing is known to be wrong,
    /// otherwise the code identifying the failing layer (surface,
    /// shader, or pipeline).
    pub fn debug_status(&self) -> i32 {
        if self.surface.width() == 0 || self.surface.height() == 0 {
            return ErrorCode::SurfaceFailed.code();
        }
        match self.last_error.as_ref().map(|e| e.code) {
            Some(code @ (ErrorCode::ShaderCompile | ErrorCode::PipelineCreate)) => code.code(),
            _ => 0,
        }
    }
}

impl Drop for Animation {
    fn drop(&mut self) {
        // Dependency-ordered release (bind groups before the objects
        // they reference) lives in the table.
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pngine_core::testing::ProgramBuilder;

    fn gpu() -> Option<GpuContext> {
        GpuContext::acquire().ok()
    }

    #[test]
    fn create_rejects_corrupt_bytecode_without_gpu_side_effects() {
        let Some(gpu) = gpu() else { return };
        let cache = ShaderCache::new();
        let mut bytes = ProgramBuilder::new().build();
        bytes[0] = b'Z';

        let err = Animation::create(&gpu, &cache, &bytes, SurfaceTarget::Offscreen, 64, 64)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BytecodeInvalid);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn create_prewarms_pipelines_and_reports_shader_errors() {
        let Some(gpu) = gpu() else { return };
        let cache = ShaderCache::new();
        let bytes = ProgramBuilder::new()
            .compute_pipeline(1, "cs_main", "not a shader")
            .build();

        let err = Animation::create(&gpu, &cache, &bytes, SurfaceTarget::Offscreen, 64, 64)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShaderCompile);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn resize_updates_dimensions_without_render() {
        let Some(gpu) = gpu() else { return };
        let cache = ShaderCache::new();
        let bytes = ProgramBuilder::new()
            .clear(0.0, f32::INFINITY, [0.0; 4])
            .build();
        let mut anim =
            Animation::create(&gpu, &cache, &bytes, SurfaceTarget::Offscreen, 64, 64).unwrap();

        anim.resize(&gpu, 320, 240).unwrap();
        assert_eq!((anim.width(), anim.height()), (320, 240));
        assert_eq!(anim.frame_count(), 0);
    }

    #[test]
    fn successful_frames_increment_frame_count() {
        let Some(gpu) = gpu() else { return };
        let cache = ShaderCache::new();
        let bytes = ProgramBuilder::new()
            .clear(0.0, f32::INFINITY, [0.0, 0.0, 0.0, 1.0])
            .build();
        let mut anim =
            Animation::create(&gpu, &cache, &bytes, SurfaceTarget::Offscreen, 64, 64).unwrap();

        for i in 0..3 {
            anim.render(&gpu, &cache, i as f32 * 0.016).unwrap();
        }
        assert_eq!(anim.frame_count(), 3);
        assert_eq!(anim.pass_status(), PassStatus::Clean);
        assert!(anim.last_error().is_none());

        anim.reset_counters();
        assert_eq!(anim.compute_counters(), 0);
        assert_eq!(anim.render_counters(), 0);
        assert_eq!(anim.frame_count(), 3);
    }
}
