//! PNGB bytecode loader and validator.
//!
//! The stream is little-endian and self-describing: a fixed header,
//! a resource-declaration section, and a timeline-instruction section.
//! Parsing is all-or-nothing — a truncated, corrupted, or
//! version-mismatched buffer fails before any allocation proportional to
//! attacker-controlled size fields (declared counts and lengths are
//! checked against the bytes actually remaining in the stream).
//!
//! No GPU object is created here; [`parse`] produces a validated
//! [`Program`] and nothing else.

use log::debug;
use thiserror::Error;

use crate::program::{
    BindGroupDesc, BindGroupEntry, BufferDesc, BufferUsage, Instruction, Op, PipelineDesc,
    PipelineKind, Program, ResourceDecl, ResourceDesc, TextureDesc, TextureFormat, TextureUsage,
    TimeRange,
};

/// Stream magic, first four bytes of every PNGB buffer.
pub const MAGIC: [u8; 4] = *b"PNGB";

/// The single container version this engine understands.
pub const VERSION: u16 = 1;

/// Resource kind tags (wire values).
const KIND_BUFFER: u8 = 1;
const KIND_TEXTURE: u8 = 2;
const KIND_RENDER_PIPELINE: u8 = 3;
const KIND_COMPUTE_PIPELINE: u8 = 4;
const KIND_BIND_GROUP: u8 = 5;

/// Timeline opcodes (wire values).
const OP_CLEAR: u8 = 1;
const OP_DRAW: u8 = 2;
const OP_DISPATCH: u8 = 3;

/// Smallest possible encoded resource record: id + kind tag.
const MIN_RESOURCE_RECORD: usize = 5;
/// Smallest possible encoded instruction: time range + opcode.
const MIN_INSTRUCTION_RECORD: usize = 9;

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("stream truncated reading {what} at offset {offset}")]
    Truncated { what: &'static str, offset: usize },
    #[error("bad magic (not a PNGB stream)")]
    BadMagic,
    #[error("unsupported PNGB version {0}")]
    UnsupportedVersion(u16),
    #[error("reserved header flags set: {0:#06x}")]
    ReservedFlags(u16),
    #[error("declared {what} count {count} exceeds stream capacity")]
    CountTooLarge { what: &'static str, count: u32 },
    #[error("declared {what} length {len} exceeds stream capacity")]
    LengthTooLarge { what: &'static str, len: u64 },
    #[error("duplicate resource id {0}")]
    DuplicateId(u32),
    #[error("resource id 0 is reserved for the frame-uniform buffer")]
    ReservedId,
    #[error("unknown resource kind tag {0}")]
    UnknownKind(u8),
    #[error("unknown timeline opcode {0}")]
    UnknownOpcode(u8),
    #[error("invalid usage bits {bits:#04x} for {what}")]
    InvalidUsage { what: &'static str, bits: u8 },
    #[error("unknown texture format {0}")]
    UnknownFormat(u8),
    #[error("{what} is not valid UTF-8")]
    InvalidUtf8 { what: &'static str },
    #[error("reference to undeclared resource id {0}")]
    UnresolvedReference(u32),
    #[error("resource id {id} is a {found}, expected a {expected}")]
    KindMismatch {
        id: u32,
        expected: &'static str,
        found: &'static str,
    },
    #[error("instruction {index} has an invalid time range")]
    InvalidTimeRange { index: usize },
    #[error("buffer init data ({init} bytes) exceeds declared size ({size} bytes)")]
    InitTooLarge { init: u32, size: u64 },
    #[error("{0} trailing bytes after timeline section")]
    TrailingBytes(usize),
}

/// Bounds-checked little-endian cursor over the input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], BytecodeError> {
        if self.remaining() < n {
            return Err(BytecodeError::Truncated {
                what,
                offset: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, BytecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, BytecodeError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, BytecodeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, BytecodeError> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self, what: &'static str) -> Result<f32, BytecodeError> {
        Ok(f32::from_bits(self.u32(what)?))
    }

    /// Length-prefixed byte run; the length is validated against the
    /// remaining input before anything is copied.
    fn bytes(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>, BytecodeError> {
        if self.remaining() < len {
            return Err(BytecodeError::LengthTooLarge {
                what,
                len: len as u64,
            });
        }
        Ok(self.take(len, what)?.to_vec())
    }

    fn string(&mut self, len: usize, what: &'static str) -> Result<String, BytecodeError> {
        let raw = self.bytes(len, what)?;
        String::from_utf8(raw).map_err(|_| BytecodeError::InvalidUtf8 { what })
    }
}

/// Parse and validate a PNGB stream into a [`Program`].
pub fn parse(bytes: &[u8]) -> Result<Program, BytecodeError> {
    let mut r = Reader::new(bytes);

    // ── Header ──────────────────────────────────────────────────────
    let magic = r.take(4, "magic")?;
    if magic != MAGIC {
        return Err(BytecodeError::BadMagic);
    }
    let version = r.u16("version")?;
    if version != VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }
    let flags = r.u16("flags")?;
    if flags != 0 {
        return Err(BytecodeError::ReservedFlags(flags));
    }

    // ── Resource declarations ───────────────────────────────────────
    let resource_count = r.u32("resource count")?;
    if resource_count as usize > r.remaining() / MIN_RESOURCE_RECORD {
        return Err(BytecodeError::CountTooLarge {
            what: "resource",
            count: resource_count,
        });
    }

    let mut resources = Vec::with_capacity(resource_count as usize);
    for _ in 0..resource_count {
        let id = r.u32("resource id")?;
        let kind = r.u8("resource kind")?;
        let desc = match kind {
            KIND_BUFFER => parse_buffer(&mut r)?,
            KIND_TEXTURE => parse_texture(&mut r)?,
            KIND_RENDER_PIPELINE => parse_pipeline(&mut r, PipelineKind::Render)?,
            KIND_COMPUTE_PIPELINE => parse_pipeline(&mut r, PipelineKind::Compute)?,
            KIND_BIND_GROUP => parse_bind_group(&mut r)?,
            other => return Err(BytecodeError::UnknownKind(other)),
        };
        resources.push(ResourceDecl { id, desc });
    }

    // ── Timeline ────────────────────────────────────────────────────
    let instr_count = r.u32("instruction count")?;
    if instr_count as usize > r.remaining() / MIN_INSTRUCTION_RECORD {
        return Err(BytecodeError::CountTooLarge {
            what: "instruction",
            count: instr_count,
        });
    }

    let mut timeline = Vec::with_capacity(instr_count as usize);
    for _ in 0..instr_count {
        let start = r.f32("instruction start time")?;
        let end = r.f32("instruction end time")?;
        let op = match r.u8("opcode")? {
            OP_CLEAR => Op::Clear {
                color: [
                    r.f32("clear r")?,
                    r.f32("clear g")?,
                    r.f32("clear b")?,
                    r.f32("clear a")?,
                ],
            },
            OP_DRAW => Op::Draw {
                pipeline: r.u32("draw pipeline")?,
                bind_group: non_zero_id(r.u32("draw bind group")?),
                vertices: r.u32("draw vertex count")?,
                instances: r.u32("draw instance count")?,
            },
            OP_DISPATCH => Op::Dispatch {
                pipeline: r.u32("dispatch pipeline")?,
                bind_group: non_zero_id(r.u32("dispatch bind group")?),
                workgroups: [
                    r.u32("dispatch x")?,
                    r.u32("dispatch y")?,
                    r.u32("dispatch z")?,
                ],
            },
            other => return Err(BytecodeError::UnknownOpcode(other)),
        };
        timeline.push(Instruction {
            range: TimeRange { start, end },
            op,
        });
    }

    if r.remaining() != 0 {
        return Err(BytecodeError::TrailingBytes(r.remaining()));
    }

    debug!(
        "parsed PNGB program: {} resources, {} instructions",
        resources.len(),
        timeline.len()
    );

    // Referential integrity lives with the program model.
    Program::new(resources, timeline)
}

/// Wire encodes "no bind group" as 0, which doubles as the reserved
/// frame-uniform buffer id and can never name a bind group.
fn non_zero_id(id: u32) -> Option<u32> {
    (id != 0).then_some(id)
}

fn parse_buffer(r: &mut Reader<'_>) -> Result<ResourceDesc, BytecodeError> {
    let size = r.u64("buffer size")?;
    let usage_bits = r.u8("buffer usage")?;
    let usage = BufferUsage::from_wire(usage_bits).ok_or(BytecodeError::InvalidUsage {
        what: "buffer",
        bits: usage_bits,
    })?;
    let init_len = r.u32("buffer init length")?;
    if u64::from(init_len) > size {
        return Err(BytecodeError::InitTooLarge {
            init: init_len,
            size,
        });
    }
    let init = r.bytes(init_len as usize, "buffer init data")?;
    Ok(ResourceDesc::Buffer(BufferDesc { size, usage, init }))
}

fn parse_texture(r: &mut Reader<'_>) -> Result<ResourceDesc, BytecodeError> {
    let width = r.u32("texture width")?;
    let height = r.u32("texture height")?;
    let format_tag = r.u8("texture format")?;
    let format =
        TextureFormat::from_wire(format_tag).ok_or(BytecodeError::UnknownFormat(format_tag))?;
    let usage_bits = r.u8("texture usage")?;
    let usage = TextureUsage::from_wire(usage_bits).ok_or(BytecodeError::InvalidUsage {
        what: "texture",
        bits: usage_bits,
    })?;
    Ok(ResourceDesc::Texture(TextureDesc {
        width,
        height,
        format,
        usage,
    }))
}

fn parse_pipeline(r: &mut Reader<'_>, kind: PipelineKind) -> Result<ResourceDesc, BytecodeError> {
    let entry_len = r.u16("pipeline entry point length")?;
    let entry_point = r.string(entry_len as usize, "pipeline entry point")?;
    let wgsl_len = r.u32("pipeline shader length")?;
    let wgsl = r.string(wgsl_len as usize, "pipeline shader source")?;
    Ok(ResourceDesc::Pipeline(PipelineDesc {
        kind,
        entry_point,
        wgsl,
    }))
}

fn parse_bind_group(r: &mut Reader<'_>) -> Result<ResourceDesc, BytecodeError> {
    let pipeline = r.u32("bind group pipeline")?;
    let group = r.u32("bind group index")?;
    let entry_count = r.u8("bind group entry count")?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(BindGroupEntry {
            binding: r.u32("bind group entry binding")?,
            resource: r.u32("bind group entry resource")?,
        });
    }
    Ok(ResourceDesc::BindGroup(BindGroupDesc {
        pipeline,
        group,
        entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProgramBuilder;

    #[test]
    fn parses_minimal_clear_program() {
        let bytes = ProgramBuilder::new()
            .clear(0.0, f32::INFINITY, [0.0, 0.0, 0.0, 1.0])
            .build();
        let program = parse(&bytes).unwrap();
        assert_eq!(program.resources().len(), 0);
        assert_eq!(program.timeline().len(), 1);
        assert!(matches!(program.timeline()[0].op, Op::Clear { .. }));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            parse(&[]),
            Err(BytecodeError::Truncated { what: "magic", .. })
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ProgramBuilder::new().build();
        bytes[0] = b'X';
        assert!(matches!(parse(&bytes), Err(BytecodeError::BadMagic)));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = ProgramBuilder::new().build();
        bytes[4] = 0x7f;
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::UnsupportedVersion(0x7f))
        ));
    }

    #[test]
    fn rejects_reserved_flags() {
        let mut bytes = ProgramBuilder::new().build();
        bytes[6] = 1;
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::ReservedFlags(1))
        ));
    }

    #[test]
    fn rejects_amplified_resource_count() {
        // Header followed by a count claiming 4 billion resources.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::CountTooLarge {
                what: "resource",
                ..
            })
        ));
    }

    #[test]
    fn rejects_amplified_shader_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes()); // one resource
        bytes.extend_from_slice(&1u32.to_le_bytes()); // id
        bytes.push(3); // render pipeline
        bytes.extend_from_slice(&0u16.to_le_bytes()); // empty entry point
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // absurd wgsl length
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::LengthTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_truncated_timeline() {
        let bytes = ProgramBuilder::new()
            .clear(0.0, 1.0, [0.0; 4])
            .build();
        // Drop the last byte of the final instruction.
        assert!(matches!(
            parse(&bytes[..bytes.len() - 1]),
            Err(BytecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut bytes = ProgramBuilder::new().build();
        bytes.push(0xff);
        assert!(matches!(parse(&bytes), Err(BytecodeError::TrailingBytes(1))));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // no resources
        bytes.extend_from_slice(&1u32.to_le_bytes()); // one instruction
        bytes.extend_from_slice(&0f32.to_le_bytes());
        bytes.extend_from_slice(&1f32.to_le_bytes());
        bytes.push(99);
        assert!(matches!(parse(&bytes), Err(BytecodeError::UnknownOpcode(99))));
    }

    #[test]
    fn rejects_buffer_init_larger_than_size() {
        let bytes = ProgramBuilder::new()
            .raw_buffer(1, 4, 0b001, &[0u8; 8])
            .build();
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::InitTooLarge { init: 8, size: 4 })
        ));
    }

    #[test]
    fn parses_full_program() {
        let bytes = ProgramBuilder::new()
            .buffer(1, 16, 0b001)
            .texture(2, 64, 64, 0, 0b001)
            .compute_pipeline(3, "cs_main", "@compute @workgroup_size(1) fn cs_main() {}")
            .render_pipeline(4, "main", "// vs_main / fs_main")
            .bind_group(5, 4, 0, &[(0, 1)])
            .dispatch(0.0, 1.0, 3, None, [1, 1, 1])
            .draw(0.0, f32::INFINITY, 4, Some(5), 3, 1)
            .build();
        let program = parse(&bytes).unwrap();
        assert_eq!(program.resources().len(), 5);
        assert_eq!(program.timeline().len(), 2);
        assert_eq!(program.active_at(0.5).count(), 2);
        assert_eq!(program.active_at(2.0).count(), 1);
    }

    #[test]
    fn rejects_bind_group_against_missing_pipeline() {
        let bytes = ProgramBuilder::new()
            .bind_group(5, 42, 0, &[])
            .build();
        assert!(matches!(
            parse(&bytes),
            Err(BytecodeError::UnresolvedReference(42))
        ));
    }
}
