//! End-to-end runtime tests against the offscreen surface path.
//!
//! Every test acquires a real adapter; environments without one skip
//! silently. The process-wide init guard means runtimes cannot overlap,
//! so tests serialize through a shared lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use pngine_core::testing::ProgramBuilder;
use pngine_render::{ErrorCode, Runtime, SurfaceTarget};

fn serial() -> MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn clear_program() -> Vec<u8> {
    ProgramBuilder::new()
        .clear(0.0, f32::INFINITY, [0.05, 0.05, 0.08, 1.0])
        .build()
}

const TRIANGLE_WGSL: &str = "\
@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(0.0, 0.5),
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
    );
    return vec4<f32>(pos[i], 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.4, 0.1, 1.0);
}
";

#[test]
fn render_loop_counts_frames_and_passes() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let id = runtime
        .create(&clear_program(), SurfaceTarget::Offscreen, 128, 128)
        .unwrap();

    for frame in 0..5 {
        runtime.render(id, frame as f32 / 60.0).unwrap();
    }

    assert_eq!(runtime.frame_count(id).unwrap(), 5);
    // One render pass per frame, no draws in a clear-only program.
    assert_eq!(runtime.render_counters(id).unwrap(), 5 << 16);
    assert_eq!(runtime.compute_counters(id).unwrap(), 0);
    assert_eq!(runtime.debug_render_pass_status(id), 0);

    runtime.destroy(id).unwrap();
    runtime.shutdown().unwrap();
}

#[test]
fn draw_program_renders_and_resets_counters() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let bytes = ProgramBuilder::new()
        .render_pipeline(1, "main", TRIANGLE_WGSL)
        .clear(0.0, f32::INFINITY, [0.0, 0.0, 0.0, 1.0])
        .draw(0.0, f32::INFINITY, 1, None, 3, 1)
        .build();
    let id = runtime
        .create(&bytes, SurfaceTarget::Offscreen, 64, 64)
        .unwrap();

    runtime.render(id, 0.0).unwrap();
    runtime.render(id, 0.1).unwrap();
    assert_eq!(runtime.render_counters(id).unwrap(), (2 << 16) | 2);

    // Reset clears pass and draw counters but keeps the frame count.
    runtime.reset_counters(id).unwrap();
    assert_eq!(runtime.render_counters(id).unwrap(), 0);
    assert_eq!(runtime.frame_count(id).unwrap(), 2);

    runtime.destroy(id).unwrap();
    runtime.shutdown().unwrap();
}

#[test]
fn bad_magic_reports_bytecode_invalid_to_listener() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    runtime.set_error_listener(Some(Box::new(move |code, message, animation| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((code, message.to_string(), animation));
    })));

    let mut bytes = clear_program();
    bytes[0] = b'X';
    let err = runtime
        .create(&bytes, SurfaceTarget::Offscreen, 32, 32)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BytecodeInvalid);

    let seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, ErrorCode::BytecodeInvalid);
    assert!(seen[0].2.is_none());
    drop(seen);

    // The failure also lands in the global error scope.
    assert_eq!(
        runtime.last_error().map(|e| e.code),
        Some(ErrorCode::BytecodeInvalid)
    );

    runtime.shutdown().unwrap();
}

#[test]
fn shader_failure_at_create_reaches_listener_with_no_handle() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    runtime.set_error_listener(Some(Box::new(move |code, _, animation| {
        assert_eq!(code, ErrorCode::ShaderCompile);
        assert!(animation.is_none());
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    let bytes = ProgramBuilder::new()
        .render_pipeline(1, "main", "this is not wgsl")
        .draw(0.0, f32::INFINITY, 1, None, 3, 1)
        .build();
    let err = runtime
        .create(&bytes, SurfaceTarget::Offscreen, 32, 32)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ShaderCompile);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Clearing the listener stops delivery.
    runtime.set_error_listener(None);
    let _ = runtime.create(&bytes, SurfaceTarget::Offscreen, 32, 32);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runtime.shutdown().unwrap();
}

#[test]
fn resize_updates_reported_dimensions_immediately() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let id = runtime
        .create(&clear_program(), SurfaceTarget::Offscreen, 100, 50)
        .unwrap();
    assert_eq!(runtime.width(id).unwrap(), 100);
    assert_eq!(runtime.height(id).unwrap(), 50);

    runtime.resize(id, 320, 240).unwrap();
    assert_eq!(runtime.width(id).unwrap(), 320);
    assert_eq!(runtime.height(id).unwrap(), 240);
    runtime.render(id, 0.0).unwrap();

    runtime.destroy(id).unwrap();
    runtime.shutdown().unwrap();
}

#[test]
fn memory_warning_between_frames_is_harmless() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let bytes = ProgramBuilder::new()
        .render_pipeline(1, "main", TRIANGLE_WGSL)
        .draw(0.0, f32::INFINITY, 1, None, 3, 1)
        .build();
    let id = runtime
        .create(&bytes, SurfaceTarget::Offscreen, 64, 64)
        .unwrap();

    runtime.render(id, 0.0).unwrap();
    runtime.memory_warning();
    runtime.render(id, 0.1).unwrap();
    assert_eq!(runtime.frame_count(id).unwrap(), 2);

    runtime.destroy(id).unwrap();
    runtime.shutdown().unwrap();
}

#[test]
fn debug_frame_reports_stable_codes() {
    let _serial = serial();
    let Ok(runtime) = Runtime::init() else {
        return;
    };

    let id = runtime
        .create(&clear_program(), SurfaceTarget::Offscreen, 32, 32)
        .unwrap();
    assert_eq!(runtime.debug_frame(id, 0.0), 0);
    assert_eq!(runtime.debug_status(id), 0);

    runtime.destroy(id).unwrap();
    assert_eq!(
        runtime.debug_frame(id, 0.0),
        ErrorCode::InvalidArgument.code()
    );

    runtime.shutdown().unwrap();
}
