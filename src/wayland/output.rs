//! Per-output bookkeeping, independent of the protocol objects.
//!
//! An output goes through `Discovered -> GeometryKnown -> SurfaceReady ->
//! (BufferValid <-> Resizing) -> Removed`. The protocol layer feeds events in
//! and acts on what comes back; everything here can be tested without a
//! compositor.

use super::BarPosition;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Discovered,
    GeometryKnown,
    SurfaceReady,
    BufferValid,
    Resizing,
    Removed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FootprintError {
    #[error("output reports no logical size ({width}x{height})")]
    ZeroGeometry { width: u32, height: u32 },

    #[error("bar thickness {thickness}px does not fit in {extent}px")]
    TooThick { thickness: u32, extent: u32 },
}

/// The event that may close a burst of geometry events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryDone {
    /// `wl_output.done`
    Output,
    /// `zxdg_output_v1.done`
    XdgOutput,
}

impl GeometryDone {
    /// Whether nothing more about the geometry will follow. From xdg-output
    /// version 3 on the logical output sends no `done` of its own and the
    /// output's `done` closes its events too.
    pub fn is_final(self, xdg_output_version: u32) -> bool {
        match self {
            Self::XdgOutput => true,
            Self::Output => xdg_output_version >= 3,
        }
    }
}

/// Outcome of a configure event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Configure {
    Unchanged,
    Resize { width: u32, height: u32 },
}

#[derive(Debug)]
pub struct OutputState {
    id: u32,
    name: Option<String>,
    description: Option<String>,
    logical_width: u32,
    logical_height: u32,
    /// Size asked of the compositor, used when it leaves a dimension to us
    footprint: (u32, u32),
    surface_width: u32,
    surface_height: u32,
    frame_ready: bool,
    buffer_dirty: bool,
    phase: Phase,
}

impl OutputState {
    /// `id` is the registry name of the `wl_output` global
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            description: None,
            logical_width: 0,
            logical_height: 0,
            footprint: (0, 0),
            surface_width: 0,
            surface_height: 0,
            frame_ready: false,
            buffer_dirty: false,
            phase: Phase::Discovered,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Name for log messages
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("UNK")
    }

    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    pub fn logical_size(&self) -> (u32, u32) {
        (self.logical_width, self.logical_height)
    }

    /// Negative sizes from a confused compositor count as zero
    pub fn set_logical_size(&mut self, width: i32, height: i32) {
        self.logical_width = width.max(0) as u32;
        self.logical_height = height.max(0) as u32;
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Buffer was (re)allocated and has never been submitted
    pub fn buffer_dirty(&self) -> bool {
        self.buffer_dirty
    }

    pub fn has_surface(&self) -> bool {
        matches!(
            self.phase,
            Phase::SurfaceReady | Phase::BufferValid | Phase::Resizing
        )
    }

    /// Size of the layer surface to request once geometry is known. The bar
    /// spans the whole width and must leave part of the height free.
    pub fn footprint(&mut self, position: BarPosition, thickness: u32) -> Result<(u32, u32), FootprintError> {
        let (width, height) = self.logical_size();
        if width == 0 || height == 0 {
            return Err(FootprintError::ZeroGeometry { width, height });
        }

        let extent = match position {
            BarPosition::Top | BarPosition::Bottom => height,
        };
        if thickness >= extent {
            return Err(FootprintError::TooThick { thickness, extent });
        }

        self.footprint = (width, thickness);
        self.phase = Phase::GeometryKnown;
        Ok(self.footprint)
    }

    pub fn surface_created(&mut self) {
        debug_assert_eq!(self.phase, Phase::GeometryKnown);
        self.phase = Phase::SurfaceReady;
    }

    /// Record a configure. A zero dimension means "your choice", which is the
    /// requested footprint. The first configure also opens the frame gate:
    /// there is no previous frame to wait for.
    pub fn configure(&mut self, width: u32, height: u32) -> Configure {
        let width = if width == 0 { self.footprint.0 } else { width };
        let height = if height == 0 { self.footprint.1 } else { height };

        if self.phase == Phase::SurfaceReady {
            self.frame_ready = true;
        }

        if (width, height) == (self.surface_width, self.surface_height) {
            return Configure::Unchanged;
        }

        self.surface_width = width;
        self.surface_height = height;
        self.phase = Phase::Resizing;
        Configure::Resize { width, height }
    }

    pub fn buffer_allocated(&mut self) {
        debug_assert_eq!(self.phase, Phase::Resizing);
        self.phase = Phase::BufferValid;
        self.buffer_dirty = true;
    }

    /// A frame was committed; the gate stays closed until `frame_done`
    pub fn frame_submitted(&mut self) {
        self.frame_ready = false;
        self.buffer_dirty = false;
    }

    pub fn frame_done(&mut self) {
        self.frame_ready = true;
    }

    pub fn remove(&mut self) {
        self.phase = Phase::Removed;
        self.frame_ready = false;
    }
}

/// Drawing may start only when every output with a surface has finished its
/// previous frame, and at least one of them has a buffer to draw into.
pub fn frame_gate<'a, I>(outputs: I) -> bool
where
    I: IntoIterator<Item = &'a OutputState>,
{
    let mut drawable = false;
    for output in outputs.into_iter().filter(|o| o.has_surface()) {
        if !output.frame_ready {
            return false;
        }
        drawable |= output.phase == Phase::BufferValid;
    }
    drawable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(id: u32, width: u32, height: u32) -> OutputState {
        let mut output = OutputState::new(id);
        output.set_logical_size(width as i32, height as i32);
        output.footprint(BarPosition::Top, 32).unwrap();
        output.surface_created();
        if let Configure::Resize { .. } = output.configure(width, 32) {
            output.buffer_allocated();
        }
        output
    }

    #[test]
    fn test_geometry_done() {
        assert!(GeometryDone::XdgOutput.is_final(1));
        assert!(GeometryDone::XdgOutput.is_final(3));
        assert!(!GeometryDone::Output.is_final(2));
        assert!(GeometryDone::Output.is_final(3));
    }

    #[test]
    fn test_footprint() {
        let mut output = OutputState::new(7);
        assert_eq!(
            output.footprint(BarPosition::Top, 32),
            Err(FootprintError::ZeroGeometry { width: 0, height: 0 })
        );

        output.set_logical_size(1920, 32);
        assert_eq!(
            output.footprint(BarPosition::Bottom, 32),
            Err(FootprintError::TooThick { thickness: 32, extent: 32 })
        );
        assert_eq!(output.phase(), Phase::Discovered);

        output.set_logical_size(1920, 1080);
        assert_eq!(output.footprint(BarPosition::Top, 32), Ok((1920, 32)));
        assert_eq!(output.phase(), Phase::GeometryKnown);
    }

    #[test]
    fn test_negative_logical_size() {
        let mut output = OutputState::new(1);
        output.set_logical_size(-5, 600);
        assert_eq!(output.logical_size(), (0, 600));
    }

    #[test]
    fn test_same_configure_is_ignored() {
        let mut output = OutputState::new(1);
        output.set_logical_size(1920, 1080);
        output.footprint(BarPosition::Top, 32).unwrap();
        output.surface_created();

        assert_eq!(
            output.configure(1920, 32),
            Configure::Resize {
                width: 1920,
                height: 32
            }
        );
        output.buffer_allocated();
        assert_eq!(output.configure(1920, 32), Configure::Unchanged);
        assert_eq!(output.phase(), Phase::BufferValid);

        assert_eq!(
            output.configure(2560, 32),
            Configure::Resize {
                width: 2560,
                height: 32
            }
        );
        assert_eq!(output.phase(), Phase::Resizing);
    }

    #[test]
    fn test_zero_configure_uses_footprint() {
        let mut output = OutputState::new(1);
        output.set_logical_size(1280, 720);
        output.footprint(BarPosition::Bottom, 20).unwrap();
        output.surface_created();
        assert_eq!(
            output.configure(0, 0),
            Configure::Resize {
                width: 1280,
                height: 20
            }
        );
    }

    #[test]
    fn test_first_configure_opens_gate() {
        let mut output = OutputState::new(1);
        output.set_logical_size(800, 600);
        output.footprint(BarPosition::Top, 32).unwrap();
        output.surface_created();
        assert!(!output.frame_ready());

        output.configure(800, 32);
        assert!(output.frame_ready());
        output.buffer_allocated();
        assert!(output.buffer_dirty());

        output.frame_submitted();
        assert!(!output.frame_ready());
        assert!(!output.buffer_dirty());
        // A later configure must not reopen it
        output.configure(1024, 32);
        assert!(!output.frame_ready());

        output.frame_done();
        assert!(output.frame_ready());
    }

    #[test]
    fn test_frame_gate() {
        let mut a = configured(1, 1920, 1080);
        let mut b = configured(2, 1280, 1024);
        let pending = OutputState::new(3);
        assert!(frame_gate([&a, &b, &pending]));

        a.frame_submitted();
        assert!(!frame_gate([&a, &b]));
        a.frame_done();
        b.remove();
        assert!(frame_gate([&a, &b]));

        // Nothing to draw into yet
        assert!(!frame_gate([&pending]));
        assert!(!frame_gate(std::iter::empty()));
    }
}
