//! Test and bench support: a small encoder that assembles well-formed
//! (or deliberately malformed) PNGB streams without an authoring tool.
//!
//! This is the write-side mirror of [`crate::bytecode::parse`] and is used
//! by this crate's tests, the parse benchmark, and the render crate's
//! integration tests. It is not a public authoring API.

use crate::bytecode::{MAGIC, VERSION};

/// Builds a PNGB byte stream record by record.
#[derive(Default)]
pub struct ProgramBuilder {
    resources: Vec<u8>,
    resource_count: u32,
    instructions: Vec<u8>,
    instruction_count: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Resources ───────────────────────────────────────────────────

    pub fn buffer(self, id: u32, size: u64, usage: u8) -> Self {
        self.raw_buffer(id, size, usage, &[])
    }

    /// Buffer record with explicit init bytes; `init` may deliberately
    /// exceed `size` to exercise validation.
    pub fn raw_buffer(mut self, id: u32, size: u64, usage: u8, init: &[u8]) -> Self {
        self.resources.extend_from_slice(&id.to_le_bytes());
        self.resources.push(1);
        self.resources.extend_from_slice(&size.to_le_bytes());
        self.resources.push(usage);
        self.resources
            .extend_from_slice(&(init.len() as u32).to_le_bytes());
        self.resources.extend_from_slice(init);
        self.resource_count += 1;
        self
    }

    pub fn texture(mut self, id: u32, width: u32, height: u32, format: u8, usage: u8) -> Self {
        self.resources.extend_from_slice(&id.to_le_bytes());
        self.resources.push(2);
        self.resources.extend_from_slice(&width.to_le_bytes());
        self.resources.extend_from_slice(&height.to_le_bytes());
        self.resources.push(format);
        self.resources.push(usage);
        self.resource_count += 1;
        self
    }

    pub fn render_pipeline(self, id: u32, entry: &str, wgsl: &str) -> Self {
        self.pipeline(id, 3, entry, wgsl)
    }

    pub fn compute_pipeline(self, id: u32, entry: &str, wgsl: &str) -> Self {
        self.pipeline(id, 4, entry, wgsl)
    }

    fn pipeline(mut self, id: u32, kind: u8, entry: &str, wgsl: &str) -> Self {
        self.resources.extend_from_slice(&id.to_le_bytes());
        self.resources.push(kind);
        self.resources
            .extend_from_slice(&(entry.len() as u16).to_le_bytes());
        self.resources.extend_from_slice(entry.as_bytes());
        self.resources
            .extend_from_slice(&(wgsl.len() as u32).to_le_bytes());
        self.resources.extend_from_slice(wgsl.as_bytes());
        self.resource_count += 1;
        self
    }

    pub fn bind_group(
        mut self,
        id: u32,
        pipeline: u32,
        group: u32,
        entries: &[(u32, u32)],
    ) -> Self {
        self.resources.extend_from_slice(&id.to_le_bytes());
        self.resources.push(5);
        self.resources.extend_from_slice(&pipeline.to_le_bytes());
        self.resources.extend_from_slice(&group.to_le_bytes());
        self.resources.push(entries.len() as u8);
        for &(binding, resource) in entries {
            self.resources.extend_from_slice(&binding.to_le_bytes());
            self.resources.extend_from_slice(&resource.to_le_bytes());
        }
        self.resource_count += 1;
        self
    }

    // ── Timeline ────────────────────────────────────────────────────

    pub fn clear(mut self, start: f32, end: f32, color: [f32; 4]) -> Self {
        self.instr_header(start, end, 1);
        for c in color {
            self.instructions.extend_from_slice(&c.to_le_bytes());
        }
        self
    }

    pub fn draw(
        mut self,
        start: f32,
        end: f32,
        pipeline: u32,
        bind_group: Option<u32>,
        vertices: u32,
        instances: u32,
    ) -> Self {
        self.instr_header(start, end, 2);
        self.instructions.extend_from_slice(&pipeline.to_le_bytes());
        self.instructions
            .extend_from_slice(&bind_group.unwrap_or(0).to_le_bytes());
        self.instructions.extend_from_slice(&vertices.to_le_bytes());
        self.instructions
            .extend_from_slice(&instances.to_le_bytes());
        self
    }

    pub fn dispatch(
        mut self,
        start: f32,
        end: f32,
        pipeline: u32,
        bind_group: Option<u32>,
        workgroups: [u32; 3],
    ) -> Self {
        self.instr_header(start, end, 3);
        self.instructions.extend_from_slice(&pipeline.to_le_bytes());
        self.instructions
            .extend_from_slice(&bind_group.unwrap_or(0).to_le_bytes());
        for g in workgroups {
            self.instructions.extend_from_slice(&g.to_le_bytes());
        }
        self
    }

    fn instr_header(&mut self, start: f32, end: f32, opcode: u8) {
        self.instructions.extend_from_slice(&start.to_le_bytes());
        self.instructions.extend_from_slice(&end.to_le_bytes());
        self.instructions.push(opcode);
        self.instruction_count += 1;
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.resources.len() + self.instructions.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.resource_count.to_le_bytes());
        out.extend_from_slice(&self.resources);
        out.extend_from_slice(&self.instruction_count.to_le_bytes());
        out.extend_from_slice(&self.instructions);
        out
    }
}
