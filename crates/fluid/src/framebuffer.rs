use crate::backend::{Capabilities, DrawCall, Output, RenderBackend, TargetDescriptor, TargetId};
use crate::error::{BackendError, InitError};
use crate::programs::CopyProgram;
use crate::types::{BlendMode, Channels, FilterMode, Precision, SimulationConfig, TextureFormat};

/// Size used when probing whether a format can be rendered into.
const PROBE_SIZE: u32 = 4;

/// One render target of fixed size and format.
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub id: TargetId,
    pub width: u32,
    pub height: u32,
    pub texel_size: [f32; 2],
    pub format: TextureFormat,
    pub filter: FilterMode,
}

impl Framebuffer {
    pub fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.delete_target(self.id);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Allocates a target and clears it to transparent black.
pub fn create_fbo<B: RenderBackend + ?Sized>(
    backend: &mut B,
    label: &'static str,
    (width, height): (u32, u32),
    format: TextureFormat,
    filter: FilterMode,
) -> Result<Framebuffer, BackendError> {
    let width = width.max(1);
    let height = height.max(1);
    let id = backend.create_target(&TargetDescriptor {
        label,
        width,
        height,
        format,
        filter,
    })?;
    backend.clear(Output::Target(id), [0.0; 4])?;
    Ok(Framebuffer {
        id,
        width,
        height,
        texel_size: [1.0 / width as f32, 1.0 / height as f32],
        format,
        filter,
    })
}

/// Ping-pong pair: passes read one buffer and write the other, then swap.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleFramebuffer {
    buffers: [Framebuffer; 2],
    read_index: usize,
}

impl DoubleFramebuffer {
    pub fn new(first: Framebuffer, second: Framebuffer) -> Self {
        Self {
            buffers: [first, second],
            read_index: 0,
        }
    }

    pub fn read(&self) -> &Framebuffer {
        &self.buffers[self.read_index]
    }

    pub fn write(&self) -> &Framebuffer {
        &self.buffers[1 - self.read_index]
    }

    /// Makes the most recently written buffer the one that is read.
    pub fn swap(&mut self) {
        self.read_index = 1 - self.read_index;
    }

    pub fn width(&self) -> u32 {
        self.read().width
    }

    pub fn height(&self) -> u32 {
        self.read().height
    }

    pub fn size(&self) -> (u32, u32) {
        self.read().size()
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.read().texel_size
    }

    pub fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        for buffer in &self.buffers {
            buffer.release(backend);
        }
    }
}

pub fn create_double_fbo<B: RenderBackend + ?Sized>(
    backend: &mut B,
    label: &'static str,
    size: (u32, u32),
    format: TextureFormat,
    filter: FilterMode,
) -> Result<DoubleFramebuffer, BackendError> {
    let first = create_fbo(backend, label, size, format, filter)?;
    let second = match create_fbo(backend, label, size, format, filter) {
        Ok(second) => second,
        Err(err) => {
            first.release(backend);
            return Err(err);
        }
    };
    Ok(DoubleFramebuffer::new(first, second))
}

/// Grid size for a surface: the short edge gets `resolution` cells and the
/// long edge is stretched by the aspect ratio.
pub fn resolution_for((width, height): (u32, u32), resolution: u32) -> (u32, u32) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let aspect = (w / h).max(h / w);
    let short = (resolution as f32).round().max(1.0) as u32;
    let long = (resolution as f32 * aspect).round().max(1.0) as u32;
    if width >= height {
        (long, short)
    } else {
        (short, long)
    }
}

/// Scales `size` down, keeping its aspect, until both edges fit `limit`.
pub fn fit_within((width, height): (u32, u32), limit: u32) -> (u32, u32) {
    let limit = limit.max(1);
    let longest = width.max(height);
    if longest <= limit {
        return (width, height);
    }
    let scale = f64::from(limit) / f64::from(longest);
    let shrink = |edge: u32| ((f64::from(edge) * scale).round() as u32).clamp(1, limit);
    (shrink(width), shrink(height))
}

/// [`resolution_for`] bounded by the backend's largest texture.
pub fn grid_size(surface: (u32, u32), resolution: u32, limit: u32) -> (u32, u32) {
    fit_within(resolution_for(surface, resolution), limit)
}

/// Storage chosen for every field after probing the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFormats {
    pub velocity: TextureFormat,
    pub dye: TextureFormat,
    /// Pressure, divergence and curl.
    pub scalar: TextureFormat,
    /// Filter for velocity and dye; scalar fields always sample nearest.
    pub filter: FilterMode,
}

pub fn select_precision(capabilities: Capabilities) -> Result<Precision, InitError> {
    if capabilities.full_float {
        Ok(Precision::Full)
    } else if capabilities.half_float {
        tracing::info!("full float targets unavailable; using half float");
        Ok(Precision::Half)
    } else {
        Err(InitError::NoFloatTargets)
    }
}

fn probe<B: RenderBackend + ?Sized>(
    backend: &mut B,
    format: TextureFormat,
) -> Result<bool, BackendError> {
    let id = backend.create_target(&TargetDescriptor {
        label: "format probe",
        width: PROBE_SIZE,
        height: PROBE_SIZE,
        format,
        filter: FilterMode::Nearest,
    })?;
    let complete = backend.target_complete(id);
    backend.delete_target(id);
    Ok(complete)
}

/// Returns `format` or the narrowest wider layout the backend can render into.
pub fn supported_format<B: RenderBackend + ?Sized>(
    backend: &mut B,
    format: TextureFormat,
) -> Result<TextureFormat, InitError> {
    let mut candidate = format;
    loop {
        if probe(backend, candidate)? {
            return Ok(candidate);
        }
        match candidate.channels.widen() {
            Some(wider) => {
                tracing::warn!(
                    from = ?candidate.channels,
                    to = ?wider,
                    "render target layout not supported; widening"
                );
                candidate = candidate.with_channels(wider);
            }
            None => return Err(InitError::NoRenderableFormat(format.channels)),
        }
    }
}

pub fn probe_formats<B: RenderBackend + ?Sized>(backend: &mut B) -> Result<FieldFormats, InitError> {
    let capabilities = backend.capabilities();
    let precision = select_precision(capabilities)?;
    let formats = FieldFormats {
        velocity: supported_format(backend, TextureFormat::new(Channels::Rg, precision))?,
        dye: supported_format(backend, TextureFormat::new(Channels::Rgba, precision))?,
        scalar: supported_format(backend, TextureFormat::new(Channels::R, precision))?,
        filter: if capabilities.linear_filtering {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        },
    };
    tracing::debug!(
        ?precision,
        velocity = ?formats.velocity.channels,
        dye = ?formats.dye.channels,
        scalar = ?formats.scalar.channels,
        filter = ?formats.filter,
        "selected field formats"
    );
    Ok(formats)
}

/// Every off-screen field of the simulation.
#[derive(Debug)]
pub struct FramebufferPool {
    pub velocity: DoubleFramebuffer,
    pub dye: DoubleFramebuffer,
    pub pressure: DoubleFramebuffer,
    pub divergence: Framebuffer,
    pub curl: Framebuffer,
    formats: FieldFormats,
}

struct SimFields {
    velocity: DoubleFramebuffer,
    pressure: DoubleFramebuffer,
    divergence: Framebuffer,
    curl: Framebuffer,
}

impl SimFields {
    fn create<B: RenderBackend + ?Sized>(
        backend: &mut B,
        formats: &FieldFormats,
        size: (u32, u32),
    ) -> Result<Self, BackendError> {
        let velocity = create_double_fbo(backend, "velocity", size, formats.velocity, formats.filter)?;
        let pressure =
            match create_double_fbo(backend, "pressure", size, formats.scalar, FilterMode::Nearest)
            {
                Ok(pressure) => pressure,
                Err(err) => {
                    velocity.release(backend);
                    return Err(err);
                }
            };
        let divergence =
            match create_fbo(backend, "divergence", size, formats.scalar, FilterMode::Nearest) {
                Ok(divergence) => divergence,
                Err(err) => {
                    velocity.release(backend);
                    pressure.release(backend);
                    return Err(err);
                }
            };
        let curl = match create_fbo(backend, "curl", size, formats.scalar, FilterMode::Nearest) {
            Ok(curl) => curl,
            Err(err) => {
                velocity.release(backend);
                pressure.release(backend);
                divergence.release(backend);
                return Err(err);
            }
        };
        Ok(Self {
            velocity,
            pressure,
            divergence,
            curl,
        })
    }

    fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        self.velocity.release(backend);
        self.pressure.release(backend);
        self.divergence.release(backend);
        self.curl.release(backend);
    }
}

fn resample<B: RenderBackend + ?Sized>(
    backend: &mut B,
    copy: &CopyProgram,
    from: &Framebuffer,
    to: &Framebuffer,
) -> Result<(), BackendError> {
    let uniforms = copy.program.new_block();
    backend.draw(&DrawCall {
        program: copy.program.id,
        uniforms: &uniforms,
        textures: &[(copy.source, from.id)],
        output: Output::Target(to.id),
        blend: BlendMode::Replace,
    })
}

impl FramebufferPool {
    pub fn create<B: RenderBackend + ?Sized>(
        backend: &mut B,
        formats: FieldFormats,
        surface: (u32, u32),
        config: &SimulationConfig,
    ) -> Result<Self, BackendError> {
        let limit = backend.max_texture_dimension();
        let sim_size = grid_size(surface, config.sim_resolution, limit);
        let dye_size = grid_size(surface, config.dye_resolution, limit);
        let sim = SimFields::create(backend, &formats, sim_size)?;
        let dye = match create_double_fbo(backend, "dye", dye_size, formats.dye, formats.filter) {
            Ok(dye) => dye,
            Err(err) => {
                sim.release(backend);
                return Err(err);
            }
        };
        tracing::debug!(?sim_size, ?dye_size, "allocated simulation fields");
        Ok(Self {
            velocity: sim.velocity,
            dye,
            pressure: sim.pressure,
            divergence: sim.divergence,
            curl: sim.curl,
            formats,
        })
    }

    pub fn formats(&self) -> FieldFormats {
        self.formats
    }

    pub fn sim_size(&self) -> (u32, u32) {
        self.velocity.size()
    }

    pub fn dye_size(&self) -> (u32, u32) {
        self.dye.size()
    }

    /// Reallocates fields whose grid size changed for `surface`.
    ///
    /// Velocity and dye are resampled into their new buffers; pressure,
    /// divergence and curl start blank. Returns whether anything changed. On
    /// error the fields allocated for the new size are released again.
    pub fn resize_all<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        copy: &CopyProgram,
        surface: (u32, u32),
        config: &SimulationConfig,
    ) -> Result<bool, BackendError> {
        let limit = backend.max_texture_dimension();
        let sim_size = grid_size(surface, config.sim_resolution, limit);
        let dye_size = grid_size(surface, config.dye_resolution, limit);
        let mut changed = false;

        if sim_size != self.sim_size() {
            let mut sim = SimFields::create(backend, &self.formats, sim_size)?;
            if let Err(err) = resample(backend, copy, self.velocity.read(), sim.velocity.write()) {
                sim.release(backend);
                return Err(err);
            }
            sim.velocity.swap();
            self.velocity.release(backend);
            self.pressure.release(backend);
            self.divergence.release(backend);
            self.curl.release(backend);
            self.velocity = sim.velocity;
            self.pressure = sim.pressure;
            self.divergence = sim.divergence;
            self.curl = sim.curl;
            changed = true;
        }

        if dye_size != self.dye_size() {
            let mut dye =
                create_double_fbo(backend, "dye", dye_size, self.formats.dye, self.formats.filter)?;
            if let Err(err) = resample(backend, copy, self.dye.read(), dye.write()) {
                dye.release(backend);
                return Err(err);
            }
            dye.swap();
            self.dye.release(backend);
            self.dye = dye;
            changed = true;
        }

        if changed {
            tracing::debug!(?sim_size, ?dye_size, "resized simulation fields");
        }
        Ok(changed)
    }

    pub fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        self.velocity.release(backend);
        self.dye.release(backend);
        self.pressure.release(backend);
        self.divergence.release(backend);
        self.curl.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::FluidPrograms;
    use crate::software::SoftwareBackend;

    fn formats() -> FieldFormats {
        FieldFormats {
            velocity: TextureFormat::new(Channels::Rg, Precision::Full),
            dye: TextureFormat::new(Channels::Rgba, Precision::Full),
            scalar: TextureFormat::new(Channels::R, Precision::Full),
            filter: FilterMode::Linear,
        }
    }

    #[test]
    fn swap_twice_is_identity() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend");
        let format = TextureFormat::new(Channels::Rg, Precision::Full);
        let mut pair =
            create_double_fbo(&mut backend, "pair", (4, 4), format, FilterMode::Nearest)
                .expect("pair");
        let original = pair.clone();
        let (read, write) = (pair.read().id, pair.write().id);
        pair.swap();
        assert_eq!(pair.read().id, write);
        assert_eq!(pair.write().id, read);
        pair.swap();
        assert_eq!(pair, original);
    }

    #[test]
    fn swap_exposes_the_last_written_buffer() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend");
        let format = TextureFormat::new(Channels::Rgba, Precision::Full);
        let mut pair =
            create_double_fbo(&mut backend, "pair", (2, 2), format, FilterMode::Nearest)
                .expect("pair");
        let written = pair.write().id;
        backend
            .clear(Output::Target(written), [1.0, 0.0, 0.0, 1.0])
            .expect("clear");
        pair.swap();
        let snapshot = backend.read_target(pair.read().id).expect("read");
        assert_eq!(snapshot.texel(0, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn resolution_keeps_short_edge_and_stretches_long_edge() {
        assert_eq!(resolution_for((1920, 1080), 128), (228, 128));
        assert_eq!(resolution_for((1080, 1920), 128), (128, 228));
        assert_eq!(resolution_for((500, 500), 64), (64, 64));
    }

    #[test]
    fn grids_shrink_to_the_texture_limit_keeping_aspect() {
        assert_eq!(fit_within((228, 128), 4096), (228, 128));
        assert_eq!(grid_size((7680, 1080), 1024, 4096), (4096, 576));
        assert_eq!(fit_within((10_000, 1), 100), (100, 1));
    }

    #[test]
    fn failed_pool_allocation_releases_partial_fields() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend");
        let config = SimulationConfig {
            sim_resolution: 4,
            dye_resolution: 4,
            ..SimulationConfig::default()
        };
        for limit in 0..8 {
            backend.set_target_limit(Some(limit));
            let err = FramebufferPool::create(&mut backend, formats(), (8, 8), &config)
                .expect_err("allocation fails");
            assert!(matches!(err, BackendError::OutOfMemory(_)));
            assert_eq!(backend.live_targets(), 0, "limit {limit}");
        }
        backend.set_target_limit(Some(8));
        let pool = FramebufferPool::create(&mut backend, formats(), (8, 8), &config).expect("pool");
        assert_eq!(backend.live_targets(), 8);
        pool.release(&mut backend);
        assert_eq!(backend.live_targets(), 0);
    }

    #[test]
    fn failed_resize_keeps_the_old_fields_and_nothing_else() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend");
        let programs = FluidPrograms::compile(&mut backend).expect("programs");
        let config = SimulationConfig {
            sim_resolution: 4,
            dye_resolution: 4,
            ..SimulationConfig::default()
        };
        let mut pool =
            FramebufferPool::create(&mut backend, formats(), (8, 8), &config).expect("pool");
        for extra in 0..6 {
            backend.set_target_limit(Some(8 + extra));
            pool.resize_all(&mut backend, &programs.copy, (16, 8), &config)
                .expect_err("allocation fails");
            assert_eq!(backend.live_targets(), 8, "extra {extra}");
            assert_eq!(pool.sim_size(), (4, 4));
        }
        backend.set_target_limit(None);
        assert!(pool
            .resize_all(&mut backend, &programs.copy, (16, 8), &config)
            .expect("resize"));
        assert_eq!(backend.live_targets(), 8);
    }

    #[test]
    fn precision_falls_back_to_half_then_fails() {
        let half_only = Capabilities {
            full_float: false,
            half_float: true,
            linear_filtering: false,
        };
        assert_eq!(select_precision(half_only).expect("half"), Precision::Half);
        let none = Capabilities {
            half_float: false,
            ..half_only
        };
        assert!(matches!(select_precision(none), Err(InitError::NoFloatTargets)));
    }

    #[test]
    fn unrenderable_single_and_dual_channel_formats_widen_to_rgba() {
        let mut backend =
            SoftwareBackend::new((8, 8)).expect("backend").with_unrenderable(&[Channels::R, Channels::Rg]);
        let formats = probe_formats(&mut backend).expect("fallback formats");
        assert_eq!(formats.velocity.channels, Channels::Rgba);
        assert_eq!(formats.scalar.channels, Channels::Rgba);
        assert_eq!(formats.dye.channels, Channels::Rgba);
        assert_eq!(backend.live_targets(), 0, "probe targets are released");
    }

    #[test]
    fn no_renderable_layout_is_reported() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend").with_unrenderable(&[
            Channels::R,
            Channels::Rg,
            Channels::Rgba,
        ]);
        let err = probe_formats(&mut backend).expect_err("nothing renders");
        assert!(matches!(err, InitError::NoRenderableFormat(Channels::Rg)));
    }

    #[test]
    fn resize_preserves_dye_and_recreates_scalar_fields() {
        let mut backend = SoftwareBackend::new((8, 8)).expect("backend");
        let programs = FluidPrograms::compile(&mut backend).expect("programs");
        let config = SimulationConfig {
            sim_resolution: 4,
            dye_resolution: 4,
            ..SimulationConfig::default()
        };
        let mut pool =
            FramebufferPool::create(&mut backend, formats(), (8, 8), &config).expect("pool");
        backend
            .clear(Output::Target(pool.dye.read().id), [0.5, 0.25, 0.0, 1.0])
            .expect("fill dye");
        let targets_before = backend.live_targets();

        assert!(!pool
            .resize_all(&mut backend, &programs.copy, (8, 8), &config)
            .expect("noop resize"));
        assert!(pool
            .resize_all(&mut backend, &programs.copy, (16, 8), &config)
            .expect("resize"));

        assert_eq!(pool.sim_size(), (8, 4));
        assert_eq!(pool.dye_size(), (8, 4));
        assert_eq!(backend.live_targets(), targets_before);
        let dye = backend.read_target(pool.dye.read().id).expect("dye");
        assert!(dye.texels.iter().all(|t| (t[0] - 0.5).abs() < 1e-6));
        let pressure = backend.read_target(pool.pressure.read().id).expect("pressure");
        assert_eq!(pressure.max_norm(1), 0.0);
    }
}
