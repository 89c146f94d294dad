//! In-memory representation of a loaded PNGB program.
//!
//! A [`Program`] is immutable once built: a set of typed resource
//! declarations plus a time-indexed instruction timeline. Construction
//! validates referential integrity — every resource reference in the
//! timeline must resolve to a declaration of the right kind, or the whole
//! program is rejected. Nothing here touches the GPU; backing objects are
//! created lazily by the render crate's resource table.

use std::collections::HashMap;

use crate::bytecode::BytecodeError;

/// Stable resource identifier, unique within one program.
pub type ResourceId = u32;

/// Reserved buffer ID: the runtime-provided frame-uniform buffer
/// (`time`, `width`, `height`, `frame`). Bind groups may reference it;
/// programs may not declare it.
pub const FRAME_UNIFORMS_ID: ResourceId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8UnormSrgb,
    R32Float,
}

impl TextureFormat {
    pub fn from_wire(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Rgba8Unorm,
            1 => Self::Bgra8UnormSrgb,
            2 => Self::R32Float,
            _ => return None,
        })
    }
}

/// Buffer usage bits declared in the bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferUsage {
    pub uniform: bool,
    pub storage: bool,
    pub vertex: bool,
}

impl BufferUsage {
    /// Decode the wire byte. Unknown bits reject the stream.
    pub fn from_wire(bits: u8) -> Option<Self> {
        if bits & !0b111 != 0 || bits == 0 {
            return None;
        }
        Some(Self {
            uniform: bits & 0b001 != 0,
            storage: bits & 0b010 != 0,
            vertex: bits & 0b100 != 0,
        })
    }
}

/// Texture usage bits declared in the bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureUsage {
    pub binding: bool,
    pub storage: bool,
    pub attachment: bool,
}

impl TextureUsage {
    pub fn from_wire(bits: u8) -> Option<Self> {
        if bits & !0b111 != 0 || bits == 0 {
            return None;
        }
        Some(Self {
            binding: bits & 0b001 != 0,
            storage: bits & 0b010 != 0,
            attachment: bits & 0b100 != 0,
        })
    }
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    /// Initial contents, uploaded on first realization. May be shorter
    /// than `size`; never longer.
    pub init: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Render,
    Compute,
}

#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub kind: PipelineKind,
    /// Shader entry point (`vs_main`/`fs_main` pair for render pipelines
    /// is derived from this stem; compute pipelines use it verbatim).
    pub entry_point: String,
    /// WGSL source embedded in the bytecode.
    pub wgsl: String,
}

#[derive(Clone, Copy, Debug)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: ResourceId,
}

#[derive(Clone, Debug)]
pub struct BindGroupDesc {
    /// Pipeline whose layout this group binds against.
    pub pipeline: ResourceId,
    /// Bind group index within the pipeline layout.
    pub group: u32,
    pub entries: Vec<BindGroupEntry>,
}

/// A declared resource: a small closed set of kinds known at validation
/// time, so a tagged union rather than a trait object.
#[derive(Clone, Debug)]
pub enum ResourceDesc {
    Buffer(BufferDesc),
    Texture(TextureDesc),
    Pipeline(PipelineDesc),
    BindGroup(BindGroupDesc),
}

impl ResourceDesc {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Texture(_) => "texture",
            Self::Pipeline(p) => match p.kind {
                PipelineKind::Render => "render pipeline",
                PipelineKind::Compute => "compute pipeline",
            },
            Self::BindGroup(_) => "bind group",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceDecl {
    pub id: ResourceId,
    pub desc: ResourceDesc,
}

/// Half-open activation window `[start, end)` in seconds.
/// `end` may be `+inf` for instructions that never expire.
#[derive(Clone, Copy, Debug)]
pub struct TimeRange {
    pub start: f32,
    pub end: f32,
}

impl TimeRange {
    pub fn contains(&self, t: f32) -> bool {
        t >= self.start && t < self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && !self.end.is_nan() && self.end >= self.start
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Op {
    /// Clear the frame texture to a constant color. Opens a render pass
    /// with no draws.
    Clear { color: [f32; 4] },
    /// One draw into the current frame's render pass.
    Draw {
        pipeline: ResourceId,
        bind_group: Option<ResourceId>,
        vertices: u32,
        instances: u32,
    },
    /// One compute dispatch. Always issued before the frame's render work.
    Dispatch {
        pipeline: ResourceId,
        bind_group: Option<ResourceId>,
        workgroups: [u32; 3],
    },
}

#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub range: TimeRange,
    pub op: Op,
}

impl Instruction {
    pub fn is_compute(&self) -> bool {
        matches!(self.op, Op::Dispatch { .. })
    }
}

/// A validated, immutable PNGB program.
#[derive(Debug)]
pub struct Program {
    resources: Vec<ResourceDecl>,
    index: HashMap<ResourceId, usize>,
    timeline: Vec<Instruction>,
}

impl Program {
    /// Build a program from declarations and a timeline, checking every
    /// cross-reference. All-or-nothing: any dangling or mistyped
    /// reference rejects the whole program.
    pub fn new(
        resources: Vec<ResourceDecl>,
        timeline: Vec<Instruction>,
    ) -> Result<Self, BytecodeError> {
        let mut index = HashMap::with_capacity(resources.len());
        for (i, decl) in resources.iter().enumerate() {
            if decl.id == FRAME_UNIFORMS_ID {
                return Err(BytecodeError::ReservedId);
            }
            if index.insert(decl.id, i).is_some() {
                return Err(BytecodeError::DuplicateId(decl.id));
            }
        }

        let program = Self {
            resources,
            index,
            timeline,
        };
        program.validate_references()?;
        Ok(program)
    }

    fn validate_references(&self) -> Result<(), BytecodeError> {
        for decl in &self.resources {
            if let ResourceDesc::BindGroup(bg) = &decl.desc {
                match self.resource(bg.pipeline).map(|d| &d.desc) {
                    Some(ResourceDesc::Pipeline(_)) => {}
                    Some(other) => {
                        return Err(BytecodeError::KindMismatch {
                            id: bg.pipeline,
                            expected: "pipeline",
                            found: other.kind_name(),
                        });
                    }
                    None => return Err(BytecodeError::UnresolvedReference(bg.pipeline)),
                }
                for entry in &bg.entries {
                    if entry.resource == FRAME_UNIFORMS_ID {
                        continue; // runtime-provided uniform buffer
                    }
                    match self.resource(entry.resource).map(|d| &d.desc) {
                        Some(ResourceDesc::Buffer(_)) | Some(ResourceDesc::Texture(_)) => {}
                        Some(other) => {
                            return Err(BytecodeError::KindMismatch {
                                id: entry.resource,
                                expected: "buffer or texture",
                                found: other.kind_name(),
                            });
                        }
                        None => {
                            return Err(BytecodeError::UnresolvedReference(entry.resource));
                        }
                    }
                }
            }
        }

        for (i, instr) in self.timeline.iter().enumerate() {
            if !instr.range.is_valid() {
                return Err(BytecodeError::InvalidTimeRange { index: i });
            }
            let (pipeline, bind_group, expected) = match instr.op {
                Op::Clear { .. } => continue,
                Op::Draw {
                    pipeline,
                    bind_group,
                    ..
                } => (pipeline, bind_group, PipelineKind::Render),
                Op::Dispatch {
                    pipeline,
                    bind_group,
                    ..
                } => (pipeline, bind_group, PipelineKind::Compute),
            };

            match self.resource(pipeline).map(|d| &d.desc) {
                Some(ResourceDesc::Pipeline(p)) if p.kind == expected => {}
                Some(other) => {
                    return Err(BytecodeError::KindMismatch {
                        id: pipeline,
                        expected: match expected {
                            PipelineKind::Render => "render pipeline",
                            PipelineKind::Compute => "compute pipeline",
                        },
                        found: other.kind_name(),
                    });
                }
                None => return Err(BytecodeError::UnresolvedReference(pipeline)),
            }

            if let Some(bg) = bind_group {
                match self.resource(bg).map(|d| &d.desc) {
                    Some(ResourceDesc::BindGroup(_)) => {}
                    Some(other) => {
                        return Err(BytecodeError::KindMismatch {
                            id: bg,
                            expected: "bind group",
                            found: other.kind_name(),
                        });
                    }
                    None => return Err(BytecodeError::UnresolvedReference(bg)),
                }
            }
        }

        Ok(())
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceDecl> {
        self.index.get(&id).map(|&i| &self.resources[i])
    }

    pub fn resources(&self) -> &[ResourceDecl] {
        &self.resources
    }

    pub fn timeline(&self) -> &[Instruction] {
        &self.timeline
    }

    /// Instructions active at time `t`, in timeline order.
    pub fn active_at(&self, t: f32) -> impl Iterator<Item = &Instruction> {
        self.timeline.iter().filter(move |i| i.range.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_pipeline_decl(id: ResourceId) -> ResourceDecl {
        ResourceDecl {
            id,
            desc: ResourceDesc::Pipeline(PipelineDesc {
                kind: PipelineKind::Render,
                entry_point: "main".to_string(),
                wgsl: "// wgsl".to_string(),
            }),
        }
    }

    fn draw(pipeline: ResourceId, start: f32, end: f32) -> Instruction {
        Instruction {
            range: TimeRange { start, end },
            op: Op::Draw {
                pipeline,
                bind_group: None,
                vertices: 3,
                instances: 1,
            },
        }
    }

    #[test]
    fn accepts_resolved_references() {
        let program =
            Program::new(vec![render_pipeline_decl(1)], vec![draw(1, 0.0, 1.0)]).unwrap();
        assert_eq!(program.resources().len(), 1);
        assert_eq!(program.timeline().len(), 1);
    }

    #[test]
    fn rejects_dangling_pipeline_reference() {
        let err = Program::new(vec![render_pipeline_decl(1)], vec![draw(2, 0.0, 1.0)])
            .err()
            .unwrap();
        assert!(matches!(err, BytecodeError::UnresolvedReference(2)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Program::new(
            vec![render_pipeline_decl(1), render_pipeline_decl(1)],
            vec![],
        )
        .err()
        .unwrap();
        assert!(matches!(err, BytecodeError::DuplicateId(1)));
    }

    #[test]
    fn rejects_reserved_id_zero() {
        let err = Program::new(vec![render_pipeline_decl(0)], vec![])
            .err()
            .unwrap();
        assert!(matches!(err, BytecodeError::ReservedId));
    }

    #[test]
    fn rejects_draw_through_compute_pipeline() {
        let decl = ResourceDecl {
            id: 1,
            desc: ResourceDesc::Pipeline(PipelineDesc {
                kind: PipelineKind::Compute,
                entry_point: "cs_main".to_string(),
                wgsl: String::new(),
            }),
        };
        let err = Program::new(vec![decl], vec![draw(1, 0.0, 1.0)])
            .err()
            .unwrap();
        assert!(matches!(err, BytecodeError::KindMismatch { id: 1, .. }));
    }

    #[test]
    fn rejects_inverted_time_range() {
        let err = Program::new(vec![render_pipeline_decl(1)], vec![draw(1, 2.0, 1.0)])
            .err()
            .unwrap();
        assert!(matches!(err, BytecodeError::InvalidTimeRange { index: 0 }));
    }

    #[test]
    fn active_at_respects_half_open_window() {
        let program = Program::new(
            vec![render_pipeline_decl(1)],
            vec![draw(1, 0.0, 1.0), draw(1, 1.0, f32::INFINITY)],
        )
        .unwrap();
        assert_eq!(program.active_at(0.0).count(), 1);
        assert_eq!(program.active_at(0.999).count(), 1);
        // First window is half-open, the second picks up exactly at 1.0.
        assert_eq!(program.active_at(1.0).count(), 1);
        assert_eq!(program.active_at(1e9).count(), 1);
    }

    #[test]
    fn bind_group_may_reference_frame_uniforms() {
        let decls = vec![
            render_pipeline_decl(1),
            ResourceDecl {
                id: 2,
                desc: ResourceDesc::BindGroup(BindGroupDesc {
                    pipeline: 1,
                    group: 0,
                    entries: vec![BindGroupEntry {
                        binding: 0,
                        resource: FRAME_UNIFORMS_ID,
                    }],
                }),
            },
        ];
        assert!(Program::new(decls, vec![]).is_ok());
    }

    #[test]
    fn bind_group_rejects_pipeline_as_binding() {
        let decls = vec![
            render_pipeline_decl(1),
            ResourceDecl {
                id: 2,
                desc: ResourceDesc::BindGroup(BindGroupDesc {
                    pipeline: 1,
                    group: 0,
                    entries: vec![BindGroupEntry {
                        binding: 0,
                        resource: 1,
                    }],
                }),
            },
        ];
        assert!(matches!(
            Program::new(decls, vec![]),
            Err(BytecodeError::KindMismatch { id: 1, .. })
        ));
    }
}
