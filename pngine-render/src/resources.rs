//! Per-animation resource table.
//!
//! Owns every GPU object an animation's program references, keyed by the
//! program's stable resource IDs. Objects are created lazily on first
//! realization and cached; descriptors are immutable after creation, so a
//! later realization with the same ID always returns the cached handle.
//! A failed realization leaves the table unchanged — the entry is only
//! inserted after every GPU sub-operation succeeded.
//!
//! GPU failures are captured through wgpu error scopes and mapped onto
//! the stable taxonomy: buffer/texture allocation → `OutOfMemory`,
//! shader module → `ShaderCompile`, pipeline/bind-group build →
//! `PipelineCreate`.

use std::collections::HashMap;

use log::debug;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry as WgpuBindGroupEntry, BindingResource,
    Buffer, BufferDescriptor, BufferUsages, ComputePipeline, ComputePipelineDescriptor, Device,
    PipelineCompilationOptions, RenderPipeline, RenderPipelineDescriptor, Texture,
    TextureDescriptor, TextureDimension, TextureUsages, TextureView, TextureViewDescriptor,
};

use pngine_core::error::{EngineError, EngineResult, ErrorCode};
use pngine_core::program::{
    PipelineDesc, PipelineKind, Program, ResourceDesc, ResourceId, TextureFormat,
    FRAME_UNIFORMS_ID,
};

use crate::context::{GpuContext, ShaderCache};

/// Size of the runtime-provided frame-uniform buffer (resource ID 0):
/// `time: f32, width: f32, height: f32, frame: u32`.
pub const FRAME_UNIFORMS_SIZE: u64 = 16;

#[derive(Debug)]
struct TextureEntry {
    #[allow(dead_code)] // keeps the texture alive alongside its view
    texture: Texture,
    view: TextureView,
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    buffers: HashMap<ResourceId, Buffer>,
    textures: HashMap<ResourceId, TextureEntry>,
    render_pipelines: HashMap<ResourceId, RenderPipeline>,
    compute_pipelines: HashMap<ResourceId, ComputePipeline>,
    bind_groups: HashMap<ResourceId, BindGroup>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of realized GPU objects.
    pub fn len(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.render_pipelines.len()
            + self.compute_pipelines.len()
            + self.bind_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ───────────────────── Realization ────────────────────────────

    /// Create-or-get the buffer for `id`. ID 0 is the runtime-owned
    /// frame-uniform buffer and needs no declaration.
    pub fn realize_buffer(
        &mut self,
        gpu: &GpuContext,
        program: &Program,
        id: ResourceId,
    ) -> EngineResult<()> {
        if self.buffers.contains_key(&id) {
            return Ok(());
        }

        let buffer = if id == FRAME_UNIFORMS_ID {
            scoped(&gpu.device, ErrorCode::OutOfMemory, "frame uniform buffer", || {
                gpu.device.create_buffer(&BufferDescriptor {
                    label: Some("pngine_frame_uniforms"),
                    size: FRAME_UNIFORMS_SIZE,
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })?
        } else {
            let desc = match program.resource(id).map(|d| &d.desc) {
                Some(ResourceDesc::Buffer(desc)) => desc,
                _ => return Err(not_found(id, "buffer")),
            };

            let mut usage = BufferUsages::COPY_DST;
            if desc.usage.uniform {
                usage |= BufferUsages::UNIFORM;
            }
            if desc.usage.storage {
                usage |= BufferUsages::STORAGE;
            }
            if desc.usage.vertex {
                usage |= BufferUsages::VERTEX;
            }

            let buffer = scoped(&gpu.device, ErrorCode::OutOfMemory, "buffer", || {
                gpu.device.create_buffer(&BufferDescriptor {
                    label: Some("pngine_buffer"),
                    size: desc.size,
                    usage,
                    mapped_at_creation: false,
                })
            })?;

            if !desc.init.is_empty() {
                gpu.queue.write_buffer(&buffer, 0, &desc.init);
            }
            buffer
        };

        debug!("realized buffer {id}");
        self.buffers.insert(id, buffer);
        Ok(())
    }

    pub fn realize_texture(
        &mut self,
        gpu: &GpuContext,
        program: &Program,
        id: ResourceId,
    ) -> EngineResult<()> {
        if self.textures.contains_key(&id) {
            return Ok(());
        }

        let desc = match program.resource(id).map(|d| &d.desc) {
            Some(ResourceDesc::Texture(desc)) => desc,
            _ => return Err(not_found(id, "texture")),
        };

        let mut usage = TextureUsages::COPY_DST;
        if desc.usage.binding {
            usage |= TextureUsages::TEXTURE_BINDING;
        }
        if desc.usage.storage {
            usage |= TextureUsages::STORAGE_BINDING;
        }
        if desc.usage.attachment {
            usage |= TextureUsages::RENDER_ATTACHMENT;
        }

        let format = map_format(desc.format);
        let (width, height) = (desc.width, desc.height);
        let texture = scoped(&gpu.device, ErrorCode::OutOfMemory, "texture", || {
            gpu.device.create_texture(&TextureDescriptor {
                label: Some("pngine_texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&TextureViewDescriptor::default());

        debug!("realized texture {id} ({width}x{height})");
        self.textures.insert(id, TextureEntry { texture, view });
        Ok(())
    }

    /// Create-or-get a render pipeline targeting `target_format`.
    ///
    /// Render pipelines draw full-screen/vertex-index geometry: the
    /// entry-point stem `s` selects `vs_s`/`fs_s` in the embedded WGSL,
    /// and no vertex buffers are bound.
    pub fn realize_render_pipeline(
        &mut self,
        gpu: &GpuContext,
        cache: &ShaderCache,
        program: &Program,
        id: ResourceId,
        target_format: wgpu::TextureFormat,
    ) -> EngineResult<()> {
        if self.render_pipelines.contains_key(&id) {
            return Ok(());
        }

        let desc = match pipeline_desc(program, id)? {
            d if d.kind == PipelineKind::Render => d,
            _ => return Err(not_found(id, "render pipeline")),
        };

        let module = gpu.compile_shader(cache, &desc.wgsl)?;
        let vs_entry = format!("vs_{}", desc.entry_point);
        let fs_entry = format!("fs_{}", desc.entry_point);

        let pipeline = scoped(&gpu.device, ErrorCode::PipelineCreate, "render pipeline", || {
            gpu.device.create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("pngine_render_pipeline"),
                layout: None, // auto layout; bind groups fetch it by index
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(&vs_entry),
                    compilation_options: PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(&fs_entry),
                    compilation_options: PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None, // 2D animation surfaces, no backface culling
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        debug!("realized render pipeline {id}");
        self.render_pipelines.insert(id, pipeline);
        Ok(())
    }

    pub fn realize_compute_pipeline(
        &mut self,
        gpu: &GpuContext,
        cache: &ShaderCache,
        program: &Program,
        id: ResourceId,
    ) -> EngineResult<()> {
        if self.compute_pipelines.contains_key(&id) {
            return Ok(());
        }

        let desc = match pipeline_desc(program, id)? {
            d if d.kind == PipelineKind::Compute => d,
            _ => return Err(not_found(id, "compute pipeline")),
        };

        let module = gpu.compile_shader(cache, &desc.wgsl)?;
        let entry = desc.entry_point.clone();

        let pipeline = scoped(&gpu.device, ErrorCode::PipelineCreate, "compute pipeline", || {
            gpu.device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some("pngine_compute_pipeline"),
                layout: None,
                module: &module,
                entry_point: Some(&entry),
                compilation_options: PipelineCompilationOptions::default(),
                cache: None,
            })
        })?;

        debug!("realized compute pipeline {id}");
        self.compute_pipelines.insert(id, pipeline);
        Ok(())
    }

    /// Create-or-get a bind group, realizing its pipeline and every
    /// bound buffer/texture first.
    pub fn realize_bind_group(
        &mut self,
        gpu: &GpuContext,
        cache: &ShaderCache,
        program: &Program,
        id: ResourceId,
        target_format: wgpu::TextureFormat,
    ) -> EngineResult<()> {
        if self.bind_groups.contains_key(&id) {
            return Ok(());
        }

        let desc = match program.resource(id).map(|d| &d.desc) {
            Some(ResourceDesc::BindGroup(desc)) => desc.clone(),
            _ => return Err(not_found(id, "bind group")),
        };

        // Realize dependencies. The layout comes from the pipeline the
        // group was declared against.
        let pipeline_kind = match program.resource(desc.pipeline).map(|d| &d.desc) {
            Some(ResourceDesc::Pipeline(p)) => p.kind,
            _ => return Err(not_found(desc.pipeline, "pipeline")),
        };
        match pipeline_kind {
            PipelineKind::Render => {
                self.realize_render_pipeline(gpu, cache, program, desc.pipeline, target_format)?
            }
            PipelineKind::Compute => {
                self.realize_compute_pipeline(gpu, cache, program, desc.pipeline)?
            }
        }

        for entry in &desc.entries {
            match program.resource(entry.resource).map(|d| &d.desc) {
                Some(ResourceDesc::Texture(_)) => {
                    self.realize_texture(gpu, program, entry.resource)?
                }
                // Declared buffers and the reserved frame-uniform id.
                _ => self.realize_buffer(gpu, program, entry.resource)?,
            }
        }

        let mut entries = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let resource = if let Some(buffer) = self.buffers.get(&entry.resource) {
                BindingResource::Buffer(buffer.as_entire_buffer_binding())
            } else if let Some(tex) = self.textures.get(&entry.resource) {
                BindingResource::TextureView(&tex.view)
            } else {
                return Err(not_found(entry.resource, "bind group entry"));
            };
            entries.push(WgpuBindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }

        let group_index = desc.group;
        let bind_group = match pipeline_kind {
            PipelineKind::Render => {
                let pipeline = &self.render_pipelines[&desc.pipeline];
                scoped(&gpu.device, ErrorCode::PipelineCreate, "bind group", || {
                    let layout = pipeline.get_bind_group_layout(group_index);
                    gpu.device.create_bind_group(&BindGroupDescriptor {
                        label: Some("pngine_bind_group"),
                        layout: &layout,
                        entries: &entries,
                    })
                })?
            }
            PipelineKind::Compute => {
                let pipeline = &self.compute_pipelines[&desc.pipeline];
                scoped(&gpu.device, ErrorCode::PipelineCreate, "bind group", || {
                    let layout = pipeline.get_bind_group_layout(group_index);
                    gpu.device.create_bind_group(&BindGroupDescriptor {
                        label: Some("pngine_bind_group"),
                        layout: &layout,
                        entries: &entries,
                    })
                })?
            }
        };

        debug!("realized bind group {id}");
        self.bind_groups.insert(id, bind_group);
        Ok(())
    }

    // ───────────────────── Lookup ─────────────────────────────────

    pub fn buffer(&self, id: ResourceId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    pub fn render_pipeline(&self, id: ResourceId) -> Option<&RenderPipeline> {
        self.render_pipelines.get(&id)
    }

    pub fn compute_pipeline(&self, id: ResourceId) -> Option<&ComputePipeline> {
        self.compute_pipelines.get(&id)
    }

    pub fn bind_group(&self, id: ResourceId) -> Option<&BindGroup> {
        self.bind_groups.get(&id)
    }

    // ───────────────────── Teardown ───────────────────────────────

    /// Release one resource. Idempotent; unknown IDs are a no-op.
    pub fn release(&mut self, id: ResourceId) {
        self.bind_groups.remove(&id);
        self.render_pipelines.remove(&id);
        self.compute_pipelines.remove(&id);
        self.textures.remove(&id);
        self.buffers.remove(&id);
    }

    /// Release everything, dependents first: bind groups reference
    /// pipelines and buffers/textures, so they go before either.
    pub fn clear(&mut self) {
        let n = self.len();
        self.bind_groups.clear();
        self.render_pipelines.clear();
        self.compute_pipelines.clear();
        self.textures.clear();
        self.buffers.clear();
        if n > 0 {
            debug!("released {n} GPU resources");
        }
    }
}

fn pipeline_desc(program: &Program, id: ResourceId) -> EngineResult<&PipelineDesc> {
    match program.resource(id).map(|d| &d.desc) {
        Some(ResourceDesc::Pipeline(desc)) => Ok(desc),
        _ => Err(not_found(id, "pipeline")),
    }
}

fn not_found(id: ResourceId, what: &str) -> EngineError {
    EngineError::new(
        ErrorCode::ResourceNotFound,
        format!("{what} {id} not found in resource table"),
    )
}

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
    }
}

/// Run a GPU creation closure inside OOM + validation error scopes.
///
/// Scopes pop in LIFO order: out-of-memory first, then validation; the
/// validation error maps to `code` (the sub-operation's failure code).
fn scoped<T>(
    device: &Device,
    code: ErrorCode,
    what: &str,
    f: impl FnOnce() -> T,
) -> EngineResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = f();
    let oom = pollster::block_on(device.pop_error_scope());
    let validation = pollster::block_on(device.pop_error_scope());

    if let Some(e) = oom {
        return Err(EngineError::new(
            ErrorCode::OutOfMemory,
            format!("{what} allocation failed: {e}"),
        ));
    }
    if let Some(e) = validation {
        return Err(EngineError::new(code, format!("{what} creation failed: {e}")));
    }
    Ok(value)
}
