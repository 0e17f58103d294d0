//! Display session: the connection to the compositor and every output on it.

mod dispatch;
pub mod output;
pub mod shm;

use crate::ui::drawing::Rect;
use output::{frame_gate, GeometryDone, OutputState};
use serde::Deserialize;
use shm::ShmBuffer;
use std::os::fd::AsRawFd;
use std::time::Duration;
use thiserror::Error;
use wayland_client::backend::WaylandError;
use wayland_client::globals::{registry_queue_init, BindError, GlobalError, GlobalList};
use wayland_client::protocol::{wl_callback, wl_compositor, wl_output, wl_shm, wl_surface};
use wayland_client::{ConnectError, Connection, DispatchError, EventQueue, Proxy, QueueHandle};
use wayland_protocols::xdg::xdg_output::zv1::client::{zxdg_output_manager_v1, zxdg_output_v1};
use wayland_protocols_wlr::layer_shell::v1::client::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to the wayland display: {0}")]
    Connect(#[from] ConnectError),

    #[error("could not read the global registry: {0}")]
    Registry(#[from] GlobalError),

    #[error("compositor does not provide {interface}: {source}")]
    MissingInterface {
        interface: &'static str,
        source: BindError,
    },

    #[error("could not detect any screen")]
    NoOutputs,

    #[error("compositor offers no 32-bit shm format")]
    NoShmFormat,

    #[error("wayland connection error: {0}")]
    Connection(#[from] WaylandError),

    #[error("could not dispatch wayland events: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Screen edge the bar is docked to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPosition {
    #[default]
    Top,
    Bottom,
}

impl BarPosition {
    fn anchor(self) -> zwlr_layer_surface_v1::Anchor {
        match self {
            Self::Top => zwlr_layer_surface_v1::Anchor::Top,
            Self::Bottom => zwlr_layer_surface_v1::Anchor::Bottom,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarGeometry {
    pub position: BarPosition,
    pub thickness: u32,
}

/// Protocol objects of one monitor
pub struct Output {
    state: OutputState,
    wl_output: wl_output::WlOutput,
    xdg_output: zxdg_output_v1::ZxdgOutputV1,
    surface: Option<wl_surface::WlSurface>,
    layer_surface: Option<zwlr_layer_surface_v1::ZwlrLayerSurfaceV1>,
    frame_callback: Option<wl_callback::WlCallback>,
    buffer: Option<ShmBuffer>,
    damage: Vec<Rect>,
}

impl Output {
    fn new(
        id: u32,
        wl_output: wl_output::WlOutput,
        manager: &zxdg_output_manager_v1::ZxdgOutputManagerV1,
        qh: &QueueHandle<SessionState>,
    ) -> Self {
        let xdg_output = manager.get_xdg_output(&wl_output, qh, id);
        Self {
            state: OutputState::new(id),
            wl_output,
            xdg_output,
            surface: None,
            layer_surface: None,
            frame_callback: None,
            buffer: None,
            damage: Vec::new(),
        }
    }

    pub fn state(&self) -> &OutputState {
        &self.state
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.state.remove();
        if let Some(layer_surface) = self.layer_surface.take() {
            layer_surface.destroy();
        }
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
        self.buffer = None;
        self.xdg_output.destroy();
        if self.wl_output.version() >= 3 {
            self.wl_output.release();
        }
        log::trace!("released output {}", self.state.id());
    }
}

/// Everything protocol events mutate
pub struct SessionState {
    qh: QueueHandle<SessionState>,
    compositor: wl_compositor::WlCompositor,
    shm: wl_shm::WlShm,
    layer_shell: zwlr_layer_shell_v1::ZwlrLayerShellV1,
    xdg_output_manager: zxdg_output_manager_v1::ZxdgOutputManagerV1,
    format: Option<wl_shm::Format>,
    outputs: Vec<Output>,
    /// Replaced buffers the compositor still holds
    retired: Vec<ShmBuffer>,
    geometry: BarGeometry,
    closed: bool,
}

impl SessionState {
    fn output_mut(&mut self, id: u32) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.state.id() == id)
    }

    fn add_output(&mut self, id: u32, wl_output: wl_output::WlOutput) {
        log::debug!("new output {}", id);
        let output = Output::new(id, wl_output, &self.xdg_output_manager, &self.qh);
        self.outputs.push(output);
    }

    /// Drop an output and everything attached to it. Safe from inside that
    /// output's own event handlers. With `last_closes`, losing the final
    /// output ends the session.
    fn remove_output(&mut self, id: u32, last_closes: bool) {
        let Some(i) = self.outputs.iter().position(|o| o.state.id() == id) else {
            return;
        };
        let output = self.outputs.remove(i);
        log::info!("removed output {} (id: {})", output.state.display_name(), id);
        drop(output);

        if last_closes && self.outputs.is_empty() {
            log::info!("no outputs left, closing");
            self.closed = true;
        }
    }

    /// Geometry may be complete: create the layer surface, or reject the
    /// output. Unless `done` is final for the bound xdg-output version, a
    /// missing logical size means more events are on the way.
    fn geometry_done(&mut self, id: u32, done: GeometryDone) {
        let last_word = done.is_final(self.xdg_output_manager.version());
        let BarGeometry {
            position,
            thickness,
        } = self.geometry;
        let Self {
            compositor,
            layer_shell,
            outputs,
            qh,
            ..
        } = self;
        let Some(output) = outputs.iter_mut().find(|o| o.state.id() == id) else {
            return;
        };
        if output.state.phase() != output::Phase::Discovered {
            return;
        }
        let (w, h) = output.state.logical_size();
        if !last_word && (w == 0 || h == 0) {
            return;
        }

        let (width, height) = match output.state.footprint(position, thickness) {
            Ok(size) => size,
            Err(e) => {
                log::error!("dropping output {} (id: {}): {}", output.state.display_name(), id, e);
                self.remove_output(id, true);
                return;
            }
        };

        let surface = compositor.create_surface(qh, ());
        let layer_surface = layer_shell.get_layer_surface(
            &surface,
            Some(&output.wl_output),
            zwlr_layer_shell_v1::Layer::Background,
            crate::ui::theme::NAMESPACE.to_string(),
            qh,
            id,
        );
        layer_surface.set_anchor(position.anchor());
        layer_surface.set_size(width, height);
        layer_surface.set_margin(0, 0, 0, 0);
        layer_surface.set_exclusive_zone(thickness as i32);
        // The first commit has no buffer and asks for a configure
        surface.commit();

        output.surface = Some(surface);
        output.layer_surface = Some(layer_surface);
        output.state.surface_created();
        log::debug!(
            "output {} (id: {}): {}x{} layer surface requested",
            output.state.display_name(),
            id,
            width,
            height
        );
    }

    /// New surface size: swap the buffer for one of the right size
    fn reallocate(&mut self, id: u32, width: u32, height: u32) {
        let Some(format) = self.format else {
            log::error!("no shm format negotiated, dropping output {}", id);
            self.remove_output(id, true);
            return;
        };
        let Self {
            shm,
            outputs,
            retired,
            qh,
            ..
        } = self;
        let Some(output) = outputs.iter_mut().find(|o| o.state.id() == id) else {
            return;
        };

        if let Some(old) = output.buffer.take() {
            if old.is_busy() {
                retired.push(old);
            }
        }
        output.damage.clear();

        match ShmBuffer::new(shm, format, width, height, id, qh) {
            Ok(buffer) => {
                output.buffer = Some(buffer);
                output.state.buffer_allocated();
            }
            Err(e) => {
                log::error!("could not create buffer for output {}: {}", output.state.display_name(), e);
                self.remove_output(id, true);
            }
        }
    }
}

/// Connection plus protocol state
pub struct Session {
    conn: Connection,
    queue: EventQueue<SessionState>,
    state: SessionState,
}

fn bind<I>(
    globals: &GlobalList,
    qh: &QueueHandle<SessionState>,
    versions: std::ops::RangeInclusive<u32>,
) -> Result<I, SessionError>
where
    I: Proxy + 'static,
    SessionState: wayland_client::Dispatch<I, ()>,
{
    globals
        .bind(qh, versions, ())
        .map_err(|source| SessionError::MissingInterface {
            interface: I::interface().name,
            source,
        })
}

impl Session {
    /// Connect, bind the required globals and set up every output present.
    pub fn connect(geometry: BarGeometry) -> Result<Self, SessionError> {
        let conn = Connection::connect_to_env()?;
        let (globals, mut queue) = registry_queue_init::<SessionState>(&conn)?;
        let qh = queue.handle();
        log::trace!("connected to wayland display");

        let compositor = bind::<wl_compositor::WlCompositor>(&globals, &qh, 1..=4)?;
        let shm = bind::<wl_shm::WlShm>(&globals, &qh, 1..=1)?;
        let layer_shell = bind::<zwlr_layer_shell_v1::ZwlrLayerShellV1>(&globals, &qh, 1..=4)?;
        let xdg_output_manager = bind::<zxdg_output_manager_v1::ZxdgOutputManagerV1>(&globals, &qh, 1..=3)?;
        log::trace!("got all the wayland interfaces");

        let mut state = SessionState {
            qh: qh.clone(),
            compositor,
            shm,
            layer_shell,
            xdg_output_manager,
            format: None,
            outputs: Vec::new(),
            retired: Vec::new(),
            geometry,
            closed: false,
        };

        let present: Vec<(u32, u32)> = globals.contents().with_list(|list| {
            list.iter()
                .filter(|g| g.interface == wl_output::WlOutput::interface().name)
                .map(|g| (g.name, g.version))
                .collect()
        });
        if present.is_empty() {
            return Err(SessionError::NoOutputs);
        }
        for (name, version) in present {
            let wl_output = globals
                .registry()
                .bind::<wl_output::WlOutput, _, _>(name, version.min(4), &qh, name);
            state.add_output(name, wl_output);
        }

        // Formats and output geometry, which creates the layer surfaces
        queue.roundtrip(&mut state)?;
        if state.format.is_none() {
            queue.roundtrip(&mut state)?;
        }
        if state.format.is_none() {
            return Err(SessionError::NoShmFormat);
        }

        // First configures and buffers
        queue.roundtrip(&mut state)?;
        if state.outputs.is_empty() {
            return Err(SessionError::NoOutputs);
        }

        log::info!(
            "session ready with {} output(s): {}",
            state.outputs.len(),
            state
                .outputs
                .iter()
                .map(|o| o.state.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { conn, queue, state })
    }

    pub fn should_close(&self) -> bool {
        self.state.closed
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputState> {
        self.state.outputs.iter().map(|o| &o.state)
    }

    /// An output got a fresh buffer that has not been drawn yet
    pub fn needs_repaint(&self) -> bool {
        self.state
            .outputs
            .iter()
            .any(|o| o.buffer.is_some() && o.state.buffer_dirty())
    }

    /// Flush requests, wait up to `timeout` for the compositor (forever with
    /// `None`), then dispatch whatever arrived. Signals cut the wait short.
    pub fn pump_events(&mut self, timeout: Option<Duration>) -> Result<(), SessionError> {
        match self.conn.flush() {
            Ok(()) => {}
            Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        self.queue.dispatch_pending(&mut self.state)?;
        let Some(guard) = self.queue.prepare_read() else {
            self.queue.dispatch_pending(&mut self.state)?;
            return Ok(());
        };

        // Round up so a sub-millisecond deadline does not spin
        let timeout_ms = timeout.map_or(-1, |d| {
            d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as libc::c_int
        });
        let mut pfd = libc::pollfd {
            fd: guard.connection_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                log::error!("poll on the wayland connection failed: {}", err);
                self.state.closed = true;
            }
            return Ok(());
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            log::error!("wayland connection lost");
            self.state.closed = true;
            return Ok(());
        }

        if pfd.revents & libc::POLLIN != 0 {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.queue.dispatch_pending(&mut self.state)?;
        Ok(())
    }

    /// Open a draw pass if every output finished its last frame. Buffers are
    /// attached here; only damaged outputs get committed when the pass ends.
    pub fn begin_frame(&mut self) -> Option<Frame<'_>> {
        if !frame_gate(self.outputs()) {
            return None;
        }

        for output in &self.state.outputs {
            match (&output.surface, &output.buffer) {
                (Some(surface), Some(buffer)) => surface.attach(Some(buffer.wl_buffer()), 0, 0),
                (Some(_), None) => log::warn!(
                    "output {} (id: {}) has no buffer yet",
                    output.state.display_name(),
                    output.state.id()
                ),
                _ => {}
            }
        }

        Some(Frame {
            state: &mut self.state,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.state.outputs.clear();
        self.state.retired.clear();
        if self.state.layer_shell.version() >= 3 {
            self.state.layer_shell.destroy();
        }
        self.state.xdg_output_manager.destroy();
        if let Err(e) = self.conn.flush() {
            log::warn!("could not flush wayland connection on exit: {}", e);
        }
        log::trace!("wayland session closed");
    }
}

/// One output buffer to draw into during a pass
pub struct Target<'a> {
    pub id: u32,
    pub pixels: &'a mut [u32],
    pub width: u32,
    pub height: u32,
    /// Never drawn before: everything must be painted
    pub fresh: bool,
    damage: &'a mut Vec<Rect>,
}

impl Target<'_> {
    pub fn damage(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.damage.push(rect);
        }
    }
}

/// An open draw pass. Dropping it ends the frame: damaged outputs are
/// committed and wait for their next frame callback.
pub struct Frame<'a> {
    state: &'a mut SessionState,
}

impl Frame<'_> {
    pub fn targets(&mut self) -> impl Iterator<Item = Target<'_>> {
        self.state.outputs.iter_mut().filter_map(|output| {
            let buffer = output.buffer.as_mut()?;
            Some(Target {
                id: output.state.id(),
                width: buffer.width(),
                height: buffer.height(),
                fresh: output.state.buffer_dirty(),
                pixels: buffer.pixels_mut(),
                damage: &mut output.damage,
            })
        })
    }

    fn end_frame(&mut self) {
        let qh = &self.state.qh;
        for output in &mut self.state.outputs {
            if output.damage.is_empty() {
                continue;
            }
            let (Some(surface), Some(buffer)) = (&output.surface, &mut output.buffer) else {
                output.damage.clear();
                continue;
            };

            // Buffer and surface coordinates match at scale 1
            let buffer_damage = surface.version() >= 4;
            for rect in output.damage.drain(..) {
                let (x, y) = (rect.x as i32, rect.y as i32);
                let (w, h) = (rect.width as i32, rect.height as i32);
                if buffer_damage {
                    surface.damage_buffer(x, y, w, h);
                } else {
                    surface.damage(x, y, w, h);
                }
            }
            output.frame_callback = Some(surface.frame(qh, output.state.id()));
            surface.commit();
            buffer.set_busy(true);
            output.state.frame_submitted();
        }
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.end_frame();
    }
}
