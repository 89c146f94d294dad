//! Stable error taxonomy shared by the engine and its host bindings.
//!
//! Every fallible engine call reports one of the [`ErrorCode`] values
//! below. The numeric values are negative, stable, and part of the ABI —
//! hosts persist and compare them, so they must never be renumbered.

use thiserror::Error;

/// Stable engine error codes.
///
/// The discriminants are the wire-level return codes. New codes may be
/// appended; existing values are frozen.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A runtime call was made before `init` (or after `shutdown`).
    NotInitialized = -1,
    /// `init` was called while the runtime was already live.
    AlreadyInitialized = -2,
    /// The GPU context (adapter/device) could not be acquired.
    ContextFailed = -3,
    /// The PNGB stream failed magic/version/bounds/reference validation.
    BytecodeInvalid = -4,
    /// The platform surface could not be created or configured.
    SurfaceFailed = -5,
    /// A shader module failed to compile.
    ShaderCompile = -6,
    /// A render or compute pipeline failed to build.
    PipelineCreate = -7,
    /// No presentable frame texture is currently available (retryable).
    TextureUnavail = -8,
    /// An instruction referenced a resource the table could not resolve.
    ResourceNotFound = -9,
    /// GPU or host allocation failure.
    OutOfMemory = -10,
    /// Bad caller input: unknown handle, zero dimensions, and the like.
    InvalidArgument = -11,
    /// A failure inside the render stage of a frame.
    RenderFailed = -12,
    /// A failure inside the compute stage of a frame.
    ComputeFailed = -13,
}

impl ErrorCode {
    /// The stable integer value of this code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Reverse mapping from a wire value. Returns `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Self::NotInitialized,
            -2 => Self::AlreadyInitialized,
            -3 => Self::ContextFailed,
            -4 => Self::BytecodeInvalid,
            -5 => Self::SurfaceFailed,
            -6 => Self::ShaderCompile,
            -7 => Self::PipelineCreate,
            -8 => Self::TextureUnavail,
            -9 => Self::ResourceNotFound,
            -10 => Self::OutOfMemory,
            -11 => Self::InvalidArgument,
            -12 => Self::RenderFailed,
            -13 => Self::ComputeFailed,
            _ => return None,
        })
    }

    /// Whether a caller may retry the same call next frame without
    /// changing its inputs.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::TextureUnavail | Self::ResourceNotFound)
    }
}

/// Static description for an error code, with a fallback for values the
/// engine does not recognise.
pub fn error_string(code: i32) -> &'static str {
    match ErrorCode::from_code(code) {
        Some(ErrorCode::NotInitialized) => "runtime not initialized",
        Some(ErrorCode::AlreadyInitialized) => "runtime already initialized",
        Some(ErrorCode::ContextFailed) => "failed to acquire GPU context",
        Some(ErrorCode::BytecodeInvalid) => "invalid PNGB bytecode",
        Some(ErrorCode::SurfaceFailed) => "failed to create or configure surface",
        Some(ErrorCode::ShaderCompile) => "shader compilation failed",
        Some(ErrorCode::PipelineCreate) => "pipeline creation failed",
        Some(ErrorCode::TextureUnavail) => "no presentable frame texture available",
        Some(ErrorCode::ResourceNotFound) => "referenced resource not found",
        Some(ErrorCode::OutOfMemory) => "out of memory",
        Some(ErrorCode::InvalidArgument) => "invalid argument",
        Some(ErrorCode::RenderFailed) => "render stage failed",
        Some(ErrorCode::ComputeFailed) => "compute stage failed",
        None => "unknown error code",
    }
}

/// An engine failure: a stable code plus a human-readable message.
///
/// The message is what error listeners receive; the code is what the ABI
/// returns.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
