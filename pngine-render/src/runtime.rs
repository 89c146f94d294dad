//! Process-wide runtime: lifecycle, the animation arena, and error
//! delivery.
//!
//! The [`Runtime`] is an explicit context object rather than a hidden
//! singleton; a process-wide atomic guard still enforces the init-once
//! contract (`init` twice without a `shutdown` fails with
//! `AlreadyInitialized`). `init` and `shutdown` belong on one designated
//! thread — conventionally the main thread — and must not race.
//!
//! Animations live in an arena keyed by opaque [`AnimationId`]s, each
//! behind its own lock: callers must serialize calls on a single
//! animation, but different animations can be driven concurrently from
//! different threads. `memory_warning` touches only the globally shared
//! shader cache and is safe from any thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use log::{debug, error};

use pngine_core::error::{EngineError, EngineResult, ErrorCode};

use crate::animation::Animation;
use crate::context::{GpuContext, ShaderCache};
use crate::surface::SurfaceTarget;

static RUNTIME_LIVE: AtomicBool = AtomicBool::new(false);

/// Whether a runtime is currently live in this process.
pub fn is_initialized() -> bool {
    RUNTIME_LIVE.load(Ordering::SeqCst)
}

/// Engine version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Opaque handle to an animation owned by the runtime's arena.
///
/// IDs are never reused within a process, so a stale handle can only
/// miss the arena — it can never alias a newer animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u64);

/// Error listener: invoked synchronously on the thread where the failure
/// happened, with the originating animation when one exists.
///
/// At most one listener is registered at a time. The listener is an
/// observability hook only — every fallible call also returns its error
/// directly.
pub type ErrorListener = Box<dyn Fn(ErrorCode, &str, Option<AnimationId>) + Send + Sync>;

pub struct Runtime {
    gpu: GpuContext,
    shader_cache: ShaderCache,
    animations: RwLock<HashMap<AnimationId, Mutex<Animation>>>,
    listener: Mutex<Option<ErrorListener>>,
    last_error: Mutex<Option<EngineError>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    /// Acquire the GPU context and bring the runtime up.
    ///
    /// Fails with `AlreadyInitialized` if a runtime is already live, or
    /// `ContextFailed` if no usable adapter/device exists.
    pub fn init() -> EngineResult<Self> {
        if RUNTIME_LIVE.swap(true, Ordering::SeqCst) {
            return Err(EngineError::new(
                ErrorCode::AlreadyInitialized,
                "runtime already initialized; shut the previous one down first",
            ));
        }

        match GpuContext::acquire() {
            Ok(gpu) => {
                debug!("runtime initialized (pngine {})", version());
                Ok(Self {
                    gpu,
                    shader_cache: ShaderCache::new(),
                    animations: RwLock::new(HashMap::new()),
                    listener: Mutex::new(None),
                    last_error: Mutex::new(None),
                    next_id: AtomicU64::new(1),
                })
            }
            Err(e) => {
                RUNTIME_LIVE.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Tear the runtime down.
    ///
    /// Callers must destroy every animation first. If any are still
    /// alive this reports `InvalidArgument` — but still releases them,
    /// so the process neither leaks nor deadlocks.
    pub fn shutdown(self) -> EngineResult<()> {
        let live = self
            .animations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if live > 0 {
            let err = EngineError::new(
                ErrorCode::InvalidArgument,
                format!("shutdown called with {live} live animations"),
            );
            self.report(&err, None);
            drop(self);
            return Err(err);
        }
        debug!("runtime shut down");
        Ok(())
    }

    /// Memory-pressure notification. Purges the shared shader cache;
    /// per-animation state is never touched, so in-flight renders on
    /// other threads are unaffected.
    pub fn memory_warning(&self) {
        debug!("memory warning: purging shared caches");
        self.shader_cache.purge();
    }

    /// Register (or, with `None`, clear) the process-wide error listener.
    pub fn set_error_listener(&self, listener: Option<ErrorListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    // ───────────────────── Animation lifecycle ────────────────────

    /// Create an animation from PNGB bytecode bound to `target`.
    pub fn create(
        &self,
        bytecode: &[u8],
        target: SurfaceTarget,
        width: u32,
        height: u32,
    ) -> EngineResult<AnimationId> {
        match Animation::create(&self.gpu, &self.shader_cache, bytecode, target, width, height) {
            Ok(animation) => {
                let id = AnimationId(self.next_id.fetch_add(1, Ordering::SeqCst));
                self.animations
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, Mutex::new(animation));
                Ok(id)
            }
            Err(e) => {
                // Creation failures are global-scope: no animation exists
                // to own them.
                self.report(&e, None);
                Err(e)
            }
        }
    }

    /// Render one frame of `id` at `time` seconds.
    ///
    /// A destroyed or unknown handle is a safe `InvalidArgument`, never
    /// undefined behavior — the arena lookup simply misses.
    pub fn render(&self, id: AnimationId, time: f32) -> EngineResult<()> {
        self.drive(id, |anim, gpu, cache| anim.render(gpu, cache, time))
    }

    /// Resize `id`'s surface. Reported dimensions change immediately.
    pub fn resize(&self, id: AnimationId, width: u32, height: u32) -> EngineResult<()> {
        self.drive(id, |anim, gpu, _| anim.resize(gpu, width, height))
    }

    /// Destroy `id`, releasing its GPU resources and surface binding.
    /// The caller-owned platform surface object is not touched.
    pub fn destroy(&self, id: AnimationId) -> EngineResult<()> {
        let removed = self
            .animations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(_) => Ok(()),
            None => {
                let err = unknown_id(id);
                self.report(&err, None);
                Err(err)
            }
        }
    }

    // ───────────────────── Queries ────────────────────────────────

    pub fn width(&self, id: AnimationId) -> EngineResult<u32> {
        self.query(id, |a| a.width())
    }

    pub fn height(&self, id: AnimationId) -> EngineResult<u32> {
        self.query(id, |a| a.height())
    }

    /// Packed compute counters: `[passes:8][pipelines:8][bindgroups:8][dispatches:8]`.
    pub fn compute_counters(&self, id: AnimationId) -> EngineResult<u32> {
        self.query(id, |a| a.compute_counters())
    }

    /// Packed render counters: `[render_passes:16][draws:16]`.
    pub fn render_counters(&self, id: AnimationId) -> EngineResult<u32> {
        self.query(id, |a| a.render_counters())
    }

    pub fn frame_count(&self, id: AnimationId) -> EngineResult<u32> {
        self.query(id, |a| a.frame_count())
    }

    pub fn reset_counters(&self, id: AnimationId) -> EngineResult<()> {
        self.query_mut(id, |a| a.reset_counters())
    }

    /// Global-scope last error (init/shutdown/create failures).
    /// Success never clears it; check the failing call's return value.
    pub fn last_error(&self) -> Option<EngineError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `id`'s own last render/resize error code, if any.
    pub fn animation_last_error(&self, id: AnimationId) -> EngineResult<Option<ErrorCode>> {
        self.query(id, |a| a.last_error().map(|e| e.code))
    }

    // ───────────────────── Debug introspection ────────────────────

    /// Coarse health code: `InvalidArgument` for a missing animation,
    /// otherwise the animation's own status (0 = healthy).
    pub fn debug_status(&self, id: AnimationId) -> i32 {
        self.query(id, |a| a.debug_status())
            .unwrap_or_else(|e| e.code.code())
    }

    /// Run one frame and return its fine-grained result code
    /// (0 = success, otherwise the stable failure code).
    pub fn debug_frame(&self, id: AnimationId, time: f32) -> i32 {
        match self.render(id, time) {
            Ok(()) => 0,
            Err(e) => e.code.code(),
        }
    }

    /// Encoder/pass cleanup status after the most recent frame:
    /// 0 = clean, 1 = encoder leaked, 2 = pass leaked. Anything non-zero
    /// is an engine defect. Unknown handles report `InvalidArgument`.
    pub fn debug_render_pass_status(&self, id: AnimationId) -> i32 {
        match self.query(id, |a| a.pass_status().code()) {
            Ok(code) => code as i32,
            Err(e) => e.code.code(),
        }
    }

    // ───────────────────── Internals ──────────────────────────────

    fn drive(
        &self,
        id: AnimationId,
        f: impl FnOnce(&mut Animation, &GpuContext, &ShaderCache) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let map = self
            .animations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = map.get(&id) else {
            drop(map);
            let err = unknown_id(id);
            self.report(&err, None);
            return Err(err);
        };

        let result = {
            let mut anim = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut anim, &self.gpu, &self.shader_cache)
        };
        drop(map);

        if let Err(e) = &result {
            // The animation already recorded this as its last error;
            // here it only reaches the listener.
            self.notify(e, Some(id));
        }
        result
    }

    fn query<T>(&self, id: AnimationId, f: impl FnOnce(&Animation) -> T) -> EngineResult<T> {
        let map = self
            .animations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(&id) {
            Some(slot) => {
                let anim = slot.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(f(&anim))
            }
            None => Err(unknown_id(id)),
        }
    }

    fn query_mut<T>(
        &self,
        id: AnimationId,
        f: impl FnOnce(&mut Animation) -> T,
    ) -> EngineResult<T> {
        let map = self
            .animations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(&id) {
            Some(slot) => {
                let mut anim = slot.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(f(&mut anim))
            }
            None => Err(unknown_id(id)),
        }
    }

    /// Record a global-scope failure and notify the listener.
    fn report(&self, err: &EngineError, animation: Option<AnimationId>) {
        if animation.is_none() {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
        }
        self.notify(err, animation);
    }

    fn notify(&self, err: &EngineError, animation: Option<AnimationId>) {
        error!("engine error ({:?}): {}", err.code, err.message);
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listener.as_ref() {
            listener(err.code, &err.message, animation);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.animations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.shader_cache.purge();
        RUNTIME_LIVE.store(false, Ordering::SeqCst);
    }
}

fn unknown_id(id: AnimationId) -> EngineError {
    EngineError::new(
        ErrorCode::InvalidArgument,
        format!("unknown or destroyed animation id {}", id.0),
    )
}
