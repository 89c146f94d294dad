//! GPU execution layer: runs validated PNGB programs against a wgpu
//! device, one frame per call.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         Runtime         │
//!                    │  init / create / render │
//!                    └───────────┬─────────────┘
//!                                │ per animation
//!              ┌─────────────────┼──────────────────┐
//!              ▼                 ▼                  ▼
//!      ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!      │SurfaceManager│  │ResourceTable │  │ Diagnostics  │
//!      │ swapchain /  │  │ lazy buffers │  │ packed frame │
//!      │  offscreen   │  │ pipelines... │  │   counters   │
//!      └──────┬───────┘  └──────┬───────┘  └──────────────┘
//!             │                 │
//!             └────────┬────────┘
//!                      ▼
//!              ┌──────────────┐
//!              │   executor   │  compute passes, then exactly
//!              │  (per frame) │  one render pass, then present
//!              └──────────────┘
//! ```
//!
//! All entry points are synchronous; async adapter and device futures
//! are resolved internally with `pollster`. Failures carry stable
//! negative codes from [`pngine_core::error::ErrorCode`] and also reach
//! the optional process-wide error listener.

pub mod animation;
pub mod context;
pub mod executor;
pub mod resources;
pub mod runtime;
pub mod surface;

pub use executor::PassStatus;
pub use runtime::{is_initialized, version, AnimationId, ErrorListener, Runtime};
pub use surface::SurfaceTarget;

pub use pngine_core::error::{EngineError, EngineResult, ErrorCode};
