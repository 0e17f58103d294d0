//! Protocol event handlers. Objects tied to an output carry its registry name
//! as user data; events for an output that is already gone are dropped.

use super::output::{Configure, GeometryDone};
use super::SessionState;
use wayland_client::globals::GlobalListContents;
use wayland_client::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_output, wl_registry, wl_shm, wl_shm_pool, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, Proxy, QueueHandle, WEnum};
use wayland_protocols::xdg::xdg_output::zv1::client::{zxdg_output_manager_v1, zxdg_output_v1};
use wayland_protocols_wlr::layer_shell::v1::client::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};

delegate_noop!(SessionState: wl_compositor::WlCompositor);
delegate_noop!(SessionState: wl_shm_pool::WlShmPool);
delegate_noop!(SessionState: zwlr_layer_shell_v1::ZwlrLayerShellV1);
delegate_noop!(SessionState: zxdg_output_manager_v1::ZxdgOutputManagerV1);
delegate_noop!(SessionState: ignore wl_surface::WlSurface);

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for SessionState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                log::trace!("got interface {} (name: {}, version: {})", interface, name, version);
                if interface == wl_output::WlOutput::interface().name {
                    let wl_output = registry.bind::<wl_output::WlOutput, _, _>(name, version.min(4), qh, name);
                    state.add_output(name, wl_output);
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                log::trace!("got global remove event (name: {})", name);
                // Unplugging every monitor is not a reason to exit
                state.remove_output(name, false);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for SessionState {
    fn event(
        state: &mut Self,
        _: &wl_shm::WlShm,
        event: wl_shm::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format {
            format: WEnum::Value(format),
        } = event
        {
            match format {
                wl_shm::Format::Argb8888 => state.format = Some(format),
                wl_shm::Format::Xrgb8888 if state.format.is_none() => state.format = Some(format),
                _ => {}
            }
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for SessionState {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        id: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_output::Event::Name { name } => {
                if let Some(output) = state.output_mut(*id) {
                    output.state.set_name(name);
                }
            }
            wl_output::Event::Description { description } => {
                if let Some(output) = state.output_mut(*id) {
                    output.state.set_description(description);
                }
            }
            wl_output::Event::Done => state.geometry_done(*id, GeometryDone::Output),
            _ => {}
        }
    }
}

impl Dispatch<zxdg_output_v1::ZxdgOutputV1, u32> for SessionState {
    fn event(
        state: &mut Self,
        _: &zxdg_output_v1::ZxdgOutputV1,
        event: zxdg_output_v1::Event,
        id: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let id = *id;
        match event {
            zxdg_output_v1::Event::LogicalSize { width, height } => {
                log::trace!("output {}: logical size {}x{}", id, width, height);
                if let Some(output) = state.output_mut(id) {
                    output.state.set_logical_size(width, height);
                }
            }
            zxdg_output_v1::Event::Name { name } => {
                if let Some(output) = state.output_mut(id) {
                    if output.state.name().is_none() {
                        output.state.set_name(name);
                    }
                }
            }
            zxdg_output_v1::Event::Description { description } => {
                if let Some(output) = state.output_mut(id) {
                    if output.state.description().is_none() {
                        output.state.set_description(description);
                    }
                }
            }
            zxdg_output_v1::Event::Done => state.geometry_done(id, GeometryDone::XdgOutput),
            _ => {}
        }
    }
}

impl Dispatch<zwlr_layer_surface_v1::ZwlrLayerSurfaceV1, u32> for SessionState {
    fn event(
        state: &mut Self,
        layer_surface: &zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        id: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let id = *id;
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => {
                layer_surface.ack_configure(serial);
                let Some(output) = state.output_mut(id) else {
                    return;
                };
                log::trace!("output {}: configure {}x{}", id, width, height);
                if let Configure::Resize { width, height } = output.state.configure(width, height) {
                    state.reallocate(id, width, height);
                }
            }
            zwlr_layer_surface_v1::Event::Closed => {
                log::info!("compositor closed the bar on output {}", id);
                state.remove_output(id, true);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_callback::WlCallback, u32> for SessionState {
    fn event(
        state: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        id: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            if let Some(output) = state.output_mut(*id) {
                output.frame_callback = None;
                output.state.frame_done();
            }
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, u32> for SessionState {
    fn event(
        state: &mut Self,
        buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        id: &u32,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            log::trace!("buffer released (output {})", id);
            if let Some(current) = state
                .output_mut(*id)
                .and_then(|output| output.buffer.as_mut())
                .filter(|current| current.wl_buffer() == buffer)
            {
                current.set_busy(false);
                return;
            }
            state.retired.retain(|old| old.wl_buffer() != buffer);
        }
    }
}
