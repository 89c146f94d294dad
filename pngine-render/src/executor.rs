//! Per-frame command orchestration.
//!
//! [`execute_frame`] drives one frame: acquire a frame texture, select
//! the timeline instructions active at the supplied time, resolve their
//! resources through the table (lazy-create on first reference), then
//! encode compute dispatches followed by render draws into a single
//! command stream, submit, and present.
//!
//! Compute always runs before render so dispatch results are visible to
//! render-time reads. Resolution happens before the encoder opens, so a
//! resolution failure aborts the frame with nothing to clean up; encode
//! and submit failures are caught through validation scopes with the
//! encoder and passes already closed. The [`PassStatus`] the caller
//! passes in is the introspection hook behind `debug_render_pass_status`
//! and must read [`PassStatus::Clean`] on every exit path.

use bytemuck::{Pod, Zeroable};
use wgpu::{
    CommandEncoderDescriptor, ComputePassDescriptor, LoadOp, Operations,
    RenderPassColorAttachment, RenderPassDescriptor, StoreOp,
};

use pngine_core::diagnostics::Diagnostics;
use pngine_core::error::{EngineError, EngineResult, ErrorCode};
use pngine_core::program::{Op, Program, ResourceDesc, ResourceId, FRAME_UNIFORMS_ID};

use crate::context::{GpuContext, ShaderCache};
use crate::resources::ResourceTable;
use crate::surface::SurfaceManager;

/// Contents of the reserved frame-uniform buffer (resource ID 0),
/// rewritten before every frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    /// Animation time in seconds, as passed to `render`.
    pub time: f32,
    pub width: f32,
    pub height: f32,
    /// Frame index (the monotonic frame count before this frame).
    pub frame: u32,
}

/// Encoder/pass bookkeeping exposed through `debug_render_pass_status`.
///
/// Anything other than `Clean` after a render call returned is an engine
/// defect, not a caller error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PassStatus {
    #[default]
    Clean,
    EncoderOpen,
    PassOpen,
}

impl PassStatus {
    /// Wire value: 0 = clean, 1 = encoder leaked, 2 = pass leaked.
    pub fn code(self) -> u32 {
        match self {
            Self::Clean => 0,
            Self::EncoderOpen => 1,
            Self::PassOpen => 2,
        }
    }
}

struct ResolvedBind {
    id: ResourceId,
    group: u32,
    bind_group: wgpu::BindGroup,
}

struct ResolvedDispatch {
    pipeline_id: ResourceId,
    pipeline: wgpu::ComputePipeline,
    bind: Option<ResolvedBind>,
    workgroups: [u32; 3],
}

struct ResolvedDraw {
    pipeline: wgpu::RenderPipeline,
    bind: Option<ResolvedBind>,
    vertices: u32,
    instances: u32,
}

/// Run one frame of `program` at `time`.
pub fn execute_frame(
    gpu: &GpuContext,
    cache: &ShaderCache,
    program: &Program,
    surface: &mut SurfaceManager,
    table: &mut ResourceTable,
    diag: &mut Diagnostics,
    status: &mut PassStatus,
    time: f32,
) -> EngineResult<()> {
    *status = PassStatus::Clean;

    // ── Acquire ─────────────────────────────────────────────────────
    let frame = surface.acquire(gpu)?;

    // ── Select + resolve ────────────────────────────────────────────
    // Lazy resource creation happens here, before any encoder exists:
    // a failure aborts the whole frame with nothing left open.
    let mut clear_color = wgpu::Color::BLACK;
    let mut dispatches: Vec<ResolvedDispatch> = Vec::new();
    let mut draws: Vec<ResolvedDraw> = Vec::new();

    for instr in program.active_at(time) {
        match instr.op {
            Op::Clear { color } => {
                // Later timeline entries override earlier ones.
                clear_color = wgpu::Color {
                    r: color[0] as f64,
                    g: color[1] as f64,
                    b: color[2] as f64,
                    a: color[3] as f64,
                };
            }
            Op::Dispatch {
                pipeline,
                bind_group,
                workgroups,
            } => {
                table.realize_compute_pipeline(gpu, cache, program, pipeline)?;
                let bind = resolve_bind(gpu, cache, program, table, surface, bind_group)?;
                let resolved = table
                    .compute_pipeline(pipeline)
                    .cloned()
                    .ok_or_else(|| missing(pipeline))?;
                dispatches.push(ResolvedDispatch {
                    pipeline_id: pipeline,
                    pipeline: resolved,
                    bind,
                    workgroups,
                });
            }
            Op::Draw {
                pipeline,
                bind_group,
                vertices,
                instances,
            } => {
                table.realize_render_pipeline(gpu, cache, program, pipeline, surface.format())?;
                let bind = resolve_bind(gpu, cache, program, table, surface, bind_group)?;
                let resolved = table
                    .render_pipeline(pipeline)
                    .cloned()
                    .ok_or_else(|| missing(pipeline))?;
                draws.push(ResolvedDraw {
                    pipeline: resolved,
                    bind,
                    vertices,
                    instances,
                });
            }
        }
    }

    // ── Frame uniforms ──────────────────────────────────────────────
    table.realize_buffer(gpu, program, FRAME_UNIFORMS_ID)?;
    let uniforms = FrameUniforms {
        time,
        width: surface.width() as f32,
        height: surface.height() as f32,
        frame: diag.frame_count(),
    };
    if let Some(buffer) = table.buffer(FRAME_UNIFORMS_ID) {
        gpu.queue.write_buffer(buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    // ── Encode ──────────────────────────────────────────────────────
    let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("pngine_frame_encoder"),
    });
    *status = PassStatus::EncoderOpen;

    if !dispatches.is_empty() {
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        {
            *status = PassStatus::PassOpen;
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("pngine_compute_pass"),
                timestamp_writes: None,
            });
            diag.compute_passes += 1;

            let mut bound_pipeline: Option<ResourceId> = None;
            let mut bound_group: Option<ResourceId> = None;
            for d in &dispatches {
                if bound_pipeline != Some(d.pipeline_id) {
                    pass.set_pipeline(&d.pipeline);
                    diag.compute_pipelines += 1;
                    bound_pipeline = Some(d.pipeline_id);
                }
                if let Some(bind) = &d.bind {
                    if bound_group != Some(bind.id) {
                        pass.set_bind_group(bind.group, &bind.bind_group, &[]);
                        diag.compute_bind_groups += 1;
                        bound_group = Some(bind.id);
                    }
                }
                pass.dispatch_workgroups(d.workgroups[0], d.workgroups[1], d.workgroups[2]);
                diag.dispatches += 1;
            }
        }
        *status = PassStatus::EncoderOpen;

        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            drop(encoder);
            *status = PassStatus::Clean;
            return Err(EngineError::new(
                ErrorCode::ComputeFailed,
                format!("compute stage failed: {e}"),
            ));
        }
    }

    // One render pass per frame: clear to the active clear color, then
    // replay the active draws in timeline order.
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    {
        *status = PassStatus::PassOpen;
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("pngine_render_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: frame.view(),
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(clear_color),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        diag.render_passes += 1;

        for d in &draws {
            pass.set_pipeline(&d.pipeline);
            if let Some(bind) = &d.bind {
                pass.set_bind_group(bind.group, &bind.bind_group, &[]);
            }
            pass.draw(0..d.vertices, 0..d.instances);
            diag.draws += 1;
        }
    }
    *status = PassStatus::EncoderOpen;

    let commands = encoder.finish();
    *status = PassStatus::Clean;

    if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
        // Frame is dropped without presenting; the swapchain recycles it.
        return Err(EngineError::new(
            ErrorCode::RenderFailed,
            format!("render stage failed: {e}"),
        ));
    }

    // ── Submit + present ────────────────────────────────────────────
    gpu.queue.submit(std::iter::once(commands));
    frame.present();
    diag.frame_presented();
    Ok(())
}

fn resolve_bind(
    gpu: &GpuContext,
    cache: &ShaderCache,
    program: &Program,
    table: &mut ResourceTable,
    surface: &SurfaceManager,
    bind_group: Option<ResourceId>,
) -> EngineResult<Option<ResolvedBind>> {
    let Some(id) = bind_group else {
        return Ok(None);
    };
    table.realize_bind_group(gpu, cache, program, id, surface.format())?;
    let group = match program.resource(id).map(|d| &d.desc) {
        Some(ResourceDesc::BindGroup(desc)) => desc.group,
        _ => return Err(missing(id)),
    };
    let bind = table.bind_group(id).cloned().ok_or_else(|| missing(id))?;
    Ok(Some(ResolvedBind {
        id,
        group,
        bind_group: bind,
    }))
}

fn missing(id: ResourceId) -> EngineError {
    EngineError::new(
        ErrorCode::ResourceNotFound,
        format!("resource {id} missing after realization"),
    )
}
