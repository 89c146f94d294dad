//! Per-animation diagnostics counters.
//!
//! Counters accumulate across render calls until [`Diagnostics::reset`]
//! is called — never implicitly, not even on resize or frame acquisition.
//! The packed snapshots saturate each field at its bit width's maximum so
//! a long-running animation reads "pegged", not "wrapped back to small".
//! The frame counter is separate: a wrapping `u32` untouched by `reset`.

/// Counter snapshot for one animation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Diagnostics {
    pub compute_passes: u32,
    pub compute_pipelines: u32,
    pub compute_bind_groups: u32,
    pub dispatches: u32,
    pub render_passes: u32,
    pub draws: u32,
    frames: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packed compute counters: `[passes:8][pipelines:8][bindgroups:8][dispatches:8]`.
    pub fn packed_compute(&self) -> u32 {
        (sat8(self.compute_passes) << 24)
            | (sat8(self.compute_pipelines) << 16)
            | (sat8(self.compute_bind_groups) << 8)
            | sat8(self.dispatches)
    }

    /// Packed render counters: `[render_passes:16][draws:16]`.
    pub fn packed_render(&self) -> u32 {
        (sat16(self.render_passes) << 16) | sat16(self.draws)
    }

    /// Zero every counter. The frame count is deliberately left alone.
    pub fn reset(&mut self) {
        let frames = self.frames;
        *self = Self::default();
        self.frames = frames;
    }

    /// Record one successfully presented frame.
    pub fn frame_presented(&mut self) {
        self.frames = self.frames.wrapping_add(1);
    }

    pub fn frame_count(&self) -> u32 {
        self.frames
    }
}

fn sat8(v: u32) -> u32 {
    v.min(0xff)
}

fn sat16(v: u32) -> u32 {
    v.min(0xffff)
}
