//! # pngine-core
//!
//! CPU-pure foundation of the PNGine animation runtime: the PNGB
//! bytecode loader/validator, the immutable [`Program`] model, the
//! stable error taxonomy, and the packed diagnostics counters.
//!
//! ## Architecture
//!
//! ```text
//!  PNGB byte stream
//!       │
//!       ▼
//!  bytecode::parse()        ◀─── magic/version/bounds checks
//!       │
//!       ▼
//!  Program::new()           ◀─── referential integrity
//!       │
//!       ▼
//!  Program                  ◀─── consumed by pngine-render each frame
//! ```
//!
//! No GPU object is created anywhere in this crate; resource
//! declarations stay declarative until the render crate's resource
//! table realizes them lazily.
//!
//! ## Crate modules
//!
//! - [`bytecode`] — PNGB stream parsing and validation
//! - [`program`] — resource declarations and the instruction timeline
//! - [`diagnostics`] — per-animation packed counters
//! - [`error`] — stable error codes and `error_string`
//! - [`testing`] — PNGB stream encoder for tests and benches

pub mod bytecode;
pub mod diagnostics;
pub mod error;
pub mod program;
pub mod testing;

// Re-exports for convenience
pub use bytecode::{parse, BytecodeError};
pub use diagnostics::Diagnostics;
pub use error::{error_string, EngineError, EngineResult, ErrorCode};
pub use program::{Instruction, Op, Program, ResourceDecl, ResourceDesc, ResourceId};
