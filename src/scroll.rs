use crate::schema::Environment;

/// Vertical extent of the scrolled content area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollGeometry {
    pub line_height: f32,
    pub viewport_height: f32,
}

impl ScrollGeometry {
    pub fn from_environment(environment: &Environment) -> Self {
        let viewport_height = environment.resolution.height as f32
            - environment.title_bar_height as f32
            - 2.0 * environment.pad_y as f32;
        Self {
            line_height: environment.line_height as f32,
            viewport_height,
        }
    }

    /// Offset that keeps the last of `line_count` lines two rows above the
    /// bottom of the viewport. Never negative.
    pub fn target(&self, line_count: usize) -> f32 {
        let content_bottom = line_count as f32 * self.line_height;
        (content_bottom - self.viewport_height + 2.0 * self.line_height).max(0.0)
    }
}

/// One smoothing step toward `target`; snaps once within a pixel.
pub fn next_offset(current: f32, target: f32, smoothing: f32) -> f32 {
    let delta = target - current;
    if delta.abs() < 1.0 {
        target
    } else {
        current + delta * smoothing
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollFollower {
    offset: f32,
    smoothing: f32,
}

impl ScrollFollower {
    pub fn new(smoothing: f32) -> Self {
        Self {
            offset: 0.0,
            smoothing,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn advance(&mut self, target: f32) -> f32 {
        self.offset = next_offset(self.offset, target, self.smoothing);
        self.offset
    }
}
