//! Deterministic CPU execution of the fluid programs.
//!
//! Each program is bound to a kernel that mirrors its fragment shader texel
//! for texel. Targets hold `[f32; 4]` texels with unused channels forced to
//! `(0, 0, 1)` the way a GPU reads an R or RG texture, and half precision
//! targets drop the low mantissa bits on store.

use std::collections::HashMap;

use crate::backend::{
    Capabilities, DrawCall, FieldSnapshot, Output, ProgramId, RenderBackend, TargetDescriptor,
    TargetId,
};
use crate::compile::{LinkedProgram, ProgramReflection, UniformBlock, MANUAL_FILTERING_DEFINE};
use crate::error::BackendError;
use crate::shaders::Kernel;
use crate::types::{Channels, FilterMode, Precision};

type Texel = [f32; 4];

struct SoftwareProgram {
    name: &'static str,
    kernel: Kernel,
    reflection: ProgramReflection,
    manual_filtering: bool,
}

struct SoftwareTarget {
    descriptor: TargetDescriptor,
    texels: Vec<Texel>,
}

impl SoftwareTarget {
    fn store(&self, texel: Texel) -> Texel {
        let format = self.descriptor.format;
        let mut out = texel;
        if format.precision == Precision::Half {
            for value in &mut out {
                *value = quantize_half(*value);
            }
        }
        match format.channels {
            Channels::R => [out[0], 0.0, 0.0, 1.0],
            Channels::Rg => [out[0], out[1], 0.0, 1.0],
            Channels::Rgba => out,
        }
    }
}

/// Largest edge the software backend allocates, in line with desktop GPUs.
pub const MAX_TEXTURE_DIMENSION: u32 = 16_384;

fn texel_count(width: u32, height: u32) -> Result<usize, BackendError> {
    let too_large = BackendError::TooLarge { width, height };
    if width > MAX_TEXTURE_DIMENSION || height > MAX_TEXTURE_DIMENSION {
        return Err(too_large);
    }
    (width as usize).checked_mul(height as usize).ok_or(too_large)
}

fn quantize_half(value: f32) -> f32 {
    f32::from_bits(value.to_bits() & 0xFFFF_E000)
}

/// CPU render backend used by tests and headless snapshots.
pub struct SoftwareBackend {
    capabilities: Capabilities,
    unrenderable: Vec<Channels>,
    target_limit: Option<usize>,
    programs: HashMap<ProgramId, SoftwareProgram>,
    targets: HashMap<TargetId, SoftwareTarget>,
    surface_size: (u32, u32),
    surface: Vec<Texel>,
    next_id: u32,
    frames: u64,
}

impl SoftwareBackend {
    pub fn new(surface_size: (u32, u32)) -> Result<Self, BackendError> {
        let (width, height) = (surface_size.0.max(1), surface_size.1.max(1));
        let len = texel_count(width, height)?;
        Ok(Self {
            capabilities: Capabilities {
                full_float: true,
                half_float: true,
                linear_filtering: true,
            },
            unrenderable: Vec::new(),
            target_limit: None,
            programs: HashMap::new(),
            targets: HashMap::new(),
            surface_size: (width, height),
            surface: vec![[0.0; 4]; len],
            next_id: 1,
            frames: 0,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Marks channel layouts whose targets report incomplete.
    pub fn with_unrenderable(mut self, channels: &[Channels]) -> Self {
        self.unrenderable = channels.to_vec();
        self
    }

    /// Caps the number of live targets; allocations beyond it fail with
    /// [`BackendError::OutOfMemory`].
    pub fn set_target_limit(&mut self, limit: Option<usize>) {
        self.target_limit = limit;
    }

    pub fn set_surface_size(&mut self, size: (u32, u32)) -> Result<(), BackendError> {
        let (width, height) = (size.0.max(1), size.1.max(1));
        if (width, height) != self.surface_size {
            let len = texel_count(width, height)?;
            self.surface_size = (width, height);
            self.surface = vec![[0.0; 4]; len];
        }
        Ok(())
    }

    pub fn surface_snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            width: self.surface_size.0,
            height: self.surface_size.1,
            texels: self.surface.clone(),
        }
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn target_descriptor(&self, id: TargetId) -> Option<TargetDescriptor> {
        self.targets.get(&id).map(|target| target.descriptor)
    }

    /// Overwrites a target with `f(x, y, uv)` evaluated at each texel centre.
    pub fn write_field<F>(&mut self, id: TargetId, f: F) -> Result<(), BackendError>
    where
        F: Fn(u32, u32, [f32; 2]) -> Texel,
    {
        let target = self
            .targets
            .get(&id)
            .ok_or(BackendError::UnknownTarget(id))?;
        let (width, height) = (target.descriptor.width, target.descriptor.height);
        let texels: Vec<Texel> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| target.store(f(x, y, texel_uv(x, y, width, height))))
            .collect();
        if let Some(target) = self.targets.get_mut(&id) {
            target.texels = texels;
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn output_size(&self, output: Output) -> Result<(u32, u32), BackendError> {
        match output {
            Output::Surface => Ok(self.surface_size),
            Output::Target(id) => {
                let target = self
                    .targets
                    .get(&id)
                    .ok_or(BackendError::UnknownTarget(id))?;
                if !self.target_complete(id) {
                    return Err(BackendError::IncompleteTarget(id));
                }
                Ok((target.descriptor.width, target.descriptor.height))
            }
        }
    }
}

fn texel_uv(x: u32, y: u32, width: u32, height: u32) -> [f32; 2] {
    [
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    ]
}

impl RenderBackend for SoftwareBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramId, BackendError> {
        let id = ProgramId(self.allocate_id());
        self.programs.insert(
            id,
            SoftwareProgram {
                name: program.name,
                kernel: program.kernel,
                reflection: program.reflection.clone(),
                manual_filtering: program.fragment.contains(MANUAL_FILTERING_DEFINE),
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, BackendError> {
        let descriptor = TargetDescriptor {
            width: descriptor.width.max(1),
            height: descriptor.height.max(1),
            ..*descriptor
        };
        let len = texel_count(descriptor.width, descriptor.height)?;
        if self
            .target_limit
            .is_some_and(|limit| self.targets.len() >= limit)
        {
            return Err(BackendError::OutOfMemory(descriptor.label));
        }
        let id = TargetId(self.allocate_id());
        let mut target = SoftwareTarget {
            descriptor,
            texels: Vec::new(),
        };
        target.texels = vec![target.store([0.0; 4]); len];
        self.targets.insert(id, target);
        Ok(id)
    }

    fn target_complete(&self, id: TargetId) -> bool {
        let Some(target) = self.targets.get(&id) else {
            return false;
        };
        let format = target.descriptor.format;
        let precision_ok = match format.precision {
            Precision::Full => self.capabilities.full_float,
            Precision::Half => self.capabilities.half_float,
        };
        precision_ok && !self.unrenderable.contains(&format.channels)
    }

    fn delete_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), BackendError> {
        match output {
            Output::Surface => {
                self.surface.iter_mut().for_each(|texel| *texel = color);
            }
            Output::Target(id) => {
                let target = self
                    .targets
                    .get_mut(&id)
                    .ok_or(BackendError::UnknownTarget(id))?;
                let stored = target.store(color);
                target.texels.iter_mut().for_each(|texel| *texel = stored);
            }
        }
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        let (width, height) = self.output_size(call.output)?;
        let program = self
            .programs
            .get(&call.program)
            .ok_or(BackendError::UnknownProgram(call.program))?;
        let inputs = Inputs {
            program,
            call,
            targets: &self.targets,
            linear_filtering: self.capabilities.linear_filtering,
        };
        let shade = build_kernel(&inputs)?;
        let mut shaded = Vec::with_capacity(texel_count(width, height)?);
        for y in 0..height {
            for x in 0..width {
                shaded.push(shade(texel_uv(x, y, width, height)));
            }
        }
        drop(shade);

        let blend = call.blend;
        match call.output {
            Output::Surface => {
                for (dst, src) in self.surface.iter_mut().zip(shaded) {
                    *dst = blend.apply(src, *dst);
                }
            }
            Output::Target(id) => {
                let target = self
                    .targets
                    .get_mut(&id)
                    .ok_or(BackendError::UnknownTarget(id))?;
                let stored: Vec<Texel> = target
                    .texels
                    .iter()
                    .zip(shaded)
                    .map(|(dst, src)| target.store(blend.apply(src, *dst)))
                    .collect();
                target.texels = stored;
            }
        }
        Ok(())
    }

    fn read_target(&self, id: TargetId) -> Result<FieldSnapshot, BackendError> {
        let target = self
            .targets
            .get(&id)
            .ok_or(BackendError::UnknownTarget(id))?;
        Ok(FieldSnapshot {
            width: target.descriptor.width,
            height: target.descriptor.height,
            texels: target.texels.clone(),
        })
    }

    fn max_texture_dimension(&self) -> u32 {
        MAX_TEXTURE_DIMENSION
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.frames += 1;
        Ok(())
    }
}

/// Read-only view of a bound target.
#[derive(Clone, Copy)]
struct Sampler<'a> {
    texels: &'a [Texel],
    width: u32,
    height: u32,
    linear: bool,
}

impl Sampler<'_> {
    fn fetch(&self, x: i64, y: i64) -> Texel {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.texels[(y * self.width + x) as usize]
    }

    fn nearest(&self, uv: [f32; 2]) -> Texel {
        let x = (uv[0] * self.width as f32).floor() as i64;
        let y = (uv[1] * self.height as f32).floor() as i64;
        self.fetch(x, y)
    }

    fn bilinear(&self, uv: [f32; 2]) -> Texel {
        let sx = uv[0] * self.width as f32 - 0.5;
        let sy = uv[1] * self.height as f32 - 0.5;
        let (x0, y0) = (sx.floor(), sy.floor());
        let (fx, fy) = (sx - x0, sy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);
        std::array::from_fn(|i| mix(mix(a[i], b[i], fx), mix(c[i], d[i], fx), fy))
    }

    fn sample(&self, uv: [f32; 2]) -> Texel {
        if self.linear {
            self.bilinear(uv)
        } else {
            self.nearest(uv)
        }
    }

    /// Bilinear blend of four nearest fetches, as the `MANUAL_FILTERING` path does.
    fn manual_bilerp(&self, uv: [f32; 2], texel: [f32; 2]) -> Texel {
        let st = [uv[0] / texel[0] - 0.5, uv[1] / texel[1] - 0.5];
        let iuv = [st[0].floor(), st[1].floor()];
        let f = [st[0] - iuv[0], st[1] - iuv[1]];
        let at = |ox: f32, oy: f32| {
            self.nearest([(iuv[0] + ox) * texel[0], (iuv[1] + oy) * texel[1]])
        };
        let a = at(0.5, 0.5);
        let b = at(1.5, 0.5);
        let c = at(0.5, 1.5);
        let d = at(1.5, 1.5);
        std::array::from_fn(|i| mix(mix(a[i], b[i], f[0]), mix(c[i], d[i], f[0]), f[1]))
    }
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

struct Inputs<'a> {
    program: &'a SoftwareProgram,
    call: &'a DrawCall<'a>,
    targets: &'a HashMap<TargetId, SoftwareTarget>,
    linear_filtering: bool,
}

impl<'a> Inputs<'a> {
    fn block(&self) -> &'a UniformBlock {
        self.call.uniforms
    }

    fn uniform(&self, name: &str) -> Result<crate::compile::UniformLocation, BackendError> {
        self.program
            .reflection
            .uniform(name)
            .ok_or(BackendError::Unsupported("uniform missing from reflection"))
    }

    fn f32(&self, name: &str) -> Result<f32, BackendError> {
        Ok(self.block().f32(self.uniform(name)?))
    }

    fn vec2(&self, name: &str) -> Result<[f32; 2], BackendError> {
        Ok(self.block().vec2(self.uniform(name)?))
    }

    fn vec3(&self, name: &str) -> Result<[f32; 3], BackendError> {
        Ok(self.block().vec3(self.uniform(name)?))
    }

    fn texture(&self, name: &str) -> Result<Sampler<'a>, BackendError> {
        let slot = self
            .program
            .reflection
            .texture(name)
            .ok_or(BackendError::Unsupported("texture missing from reflection"))?;
        let (_, id) = self
            .call
            .textures
            .iter()
            .find(|(bound, _)| bound.binding == slot.binding)
            .ok_or_else(|| BackendError::MissingBinding {
                program: self.program.name.to_string(),
                binding: slot.binding,
            })?;
        let target = self
            .targets
            .get(id)
            .ok_or(BackendError::UnknownTarget(*id))?;
        Ok(Sampler {
            texels: &target.texels,
            width: target.descriptor.width,
            height: target.descriptor.height,
            linear: self.linear_filtering && target.descriptor.filter == FilterMode::Linear,
        })
    }
}

type Shade<'a> = Box<dyn Fn([f32; 2]) -> Texel + 'a>;

struct Neighbours {
    left: [f32; 2],
    right: [f32; 2],
    top: [f32; 2],
    bottom: [f32; 2],
}

fn neighbours(uv: [f32; 2], texel: [f32; 2]) -> Neighbours {
    Neighbours {
        left: [uv[0] - texel[0], uv[1]],
        right: [uv[0] + texel[0], uv[1]],
        top: [uv[0], uv[1] + texel[1]],
        bottom: [uv[0], uv[1] - texel[1]],
    }
}

fn build_kernel<'a>(inputs: &Inputs<'a>) -> Result<Shade<'a>, BackendError> {
    let shade: Shade<'a> = match inputs.program.kernel {
        Kernel::Clear => {
            let value = inputs.f32("value")?;
            let field = inputs.texture("field")?;
            Box::new(move |uv| field.sample(uv).map(|v| v * value))
        }
        Kernel::Splat => {
            let color = inputs.vec3("color")?;
            let aspect = inputs.f32("aspect_ratio")?;
            let point = inputs.vec2("point")?;
            let radius = inputs.f32("radius")?;
            let target = inputs.texture("target")?;
            Box::new(move |uv| {
                let px = (uv[0] - point[0]) * aspect;
                let py = uv[1] - point[1];
                let falloff = (-(px * px + py * py) / radius).exp();
                let base = target.sample(uv);
                [
                    base[0] + falloff * color[0],
                    base[1] + falloff * color[1],
                    base[2] + falloff * color[2],
                    1.0,
                ]
            })
        }
        Kernel::Curl => {
            let texel = inputs.vec2("texel_size")?;
            let velocity = inputs.texture("velocity")?;
            Box::new(move |uv| {
                let n = neighbours(uv, texel);
                let l = velocity.sample(n.left)[1];
                let r = velocity.sample(n.right)[1];
                let t = velocity.sample(n.top)[0];
                let b = velocity.sample(n.bottom)[0];
                [0.5 * (r - l - t + b), 0.0, 0.0, 1.0]
            })
        }
        Kernel::Vorticity => {
            let texel = inputs.vec2("texel_size")?;
            let strength = inputs.f32("curl_strength")?;
            let dt = inputs.f32("dt")?;
            let velocity = inputs.texture("velocity")?;
            let curl = inputs.texture("curl")?;
            Box::new(move |uv| {
                let n = neighbours(uv, texel);
                let l = curl.sample(n.left)[0];
                let r = curl.sample(n.right)[0];
                let t = curl.sample(n.top)[0];
                let b = curl.sample(n.bottom)[0];
                let c = curl.sample(uv)[0];
                let mut force = [0.5 * (t.abs() - b.abs()), 0.5 * (r.abs() - l.abs())];
                let len = (force[0] * force[0] + force[1] * force[1]).sqrt() + 0.0001;
                force = [force[0] / len, force[1] / len];
                force = [force[0] * strength * c, -(force[1] * strength * c)];
                let v = velocity.sample(uv);
                [
                    (v[0] + force[0] * dt).clamp(-1000.0, 1000.0),
                    (v[1] + force[1] * dt).clamp(-1000.0, 1000.0),
                    0.0,
                    1.0,
                ]
            })
        }
        Kernel::Divergence => {
            let texel = inputs.vec2("texel_size")?;
            let velocity = inputs.texture("velocity")?;
            Box::new(move |uv| {
                let n = neighbours(uv, texel);
                let mut l = velocity.sample(n.left)[0];
                let mut r = velocity.sample(n.right)[0];
                let mut t = velocity.sample(n.top)[1];
                let mut b = velocity.sample(n.bottom)[1];
                let c = velocity.sample(uv);
                if n.left[0] < 0.0 {
                    l = -c[0];
                }
                if n.right[0] > 1.0 {
                    r = -c[0];
                }
                if n.top[1] > 1.0 {
                    t = -c[1];
                }
                if n.bottom[1] < 0.0 {
                    b = -c[1];
                }
                [0.5 * (r - l + t - b), 0.0, 0.0, 1.0]
            })
        }
        Kernel::Pressure => {
            let texel = inputs.vec2("texel_size")?;
            let pressure = inputs.texture("pressure")?;
            let divergence = inputs.texture("divergence")?;
            Box::new(move |uv| {
                let n = neighbours(uv, texel);
                let sum = pressure.sample(n.left)[0]
                    + pressure.sample(n.right)[0]
                    + pressure.sample(n.bottom)[0]
                    + pressure.sample(n.top)[0];
                let div = divergence.sample(uv)[0];
                [(sum - div) * 0.25, 0.0, 0.0, 1.0]
            })
        }
        Kernel::GradientSubtract => {
            let texel = inputs.vec2("texel_size")?;
            let pressure = inputs.texture("pressure")?;
            let velocity = inputs.texture("velocity")?;
            Box::new(move |uv| {
                let n = neighbours(uv, texel);
                let l = pressure.sample(n.left)[0];
                let r = pressure.sample(n.right)[0];
                let t = pressure.sample(n.top)[0];
                let b = pressure.sample(n.bottom)[0];
                let v = velocity.sample(uv);
                [v[0] - 0.5 * (r - l), v[1] - 0.5 * (t - b), 0.0, 1.0]
            })
        }
        Kernel::Advection => {
            let texel = inputs.vec2("texel_size")?;
            let source_texel = inputs.vec2("source_texel_size")?;
            let dt = inputs.f32("dt")?;
            let dissipation = inputs.f32("dissipation")?;
            let velocity = inputs.texture("velocity")?;
            let source = inputs.texture("source")?;
            let manual = inputs.program.manual_filtering;
            Box::new(move |uv| {
                let v = if manual {
                    velocity.manual_bilerp(uv, texel)
                } else {
                    velocity.sample(uv)
                };
                let coord = [uv[0] - dt * v[0] * texel[0], uv[1] - dt * v[1] * texel[1]];
                let result = if manual {
                    source.manual_bilerp(coord, source_texel)
                } else {
                    source.sample(coord)
                };
                let decay = 1.0 + dissipation * dt;
                result.map(|value| value / decay)
            })
        }
        Kernel::Display => {
            let tint = inputs.vec3("tint")?;
            let saturation = inputs.f32("saturation")?;
            let gain = inputs.f32("gain")?;
            let alpha_scale = inputs.f32("alpha_scale")?;
            let alpha_clamp = inputs.f32("alpha_clamp")?;
            let dye = inputs.texture("dye")?;
            Box::new(move |uv| {
                let d = dye.sample(uv);
                let c = [d[0] * gain, d[1] * gain, d[2] * gain];
                let alpha = (c[0].max(c[1]).max(c[2]) * alpha_scale).min(alpha_clamp);
                let luma = c[0] * 0.299 + c[1] * 0.587 + c[2] * 0.114;
                let rgb: [f32; 3] =
                    std::array::from_fn(|i| (mix(luma, c[i], saturation) * tint[i]).clamp(0.0, 1.0));
                [rgb[0], rgb[1], rgb[2], alpha]
            })
        }
        Kernel::Copy => {
            let source = inputs.texture("source")?;
            Box::new(move |uv| source.sample(uv))
        }
    };
    Ok(shade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_program;
    use crate::shaders;
    use crate::types::{BlendMode, TextureFormat};

    fn descriptor(channels: Channels, width: u32, height: u32) -> TargetDescriptor {
        TargetDescriptor {
            label: "test",
            width,
            height,
            format: TextureFormat::new(channels, Precision::Full),
            filter: FilterMode::Nearest,
        }
    }

    #[test]
    fn single_channel_targets_read_back_like_gpu_textures() {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        let id = backend
            .create_target(&descriptor(Channels::R, 2, 2))
            .expect("target");
        backend
            .clear(Output::Target(id), [0.5, 0.7, 0.9, 0.2])
            .expect("clear");
        let snapshot = backend.read_target(id).expect("read");
        assert_eq!(snapshot.texel(1, 1), [0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unrenderable_layouts_report_incomplete() {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend").with_unrenderable(&[Channels::R]);
        let r = backend.create_target(&descriptor(Channels::R, 4, 4)).expect("r");
        let rg = backend.create_target(&descriptor(Channels::Rg, 4, 4)).expect("rg");
        assert!(!backend.target_complete(r));
        assert!(backend.target_complete(rg));
    }

    #[test]
    fn copy_pass_resamples_into_a_larger_target() {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        let copy = compile_program(&mut backend, &shaders::COPY).expect("copy");
        let small = backend
            .create_target(&descriptor(Channels::Rgba, 2, 2))
            .expect("small");
        let large = backend
            .create_target(&descriptor(Channels::Rgba, 4, 4))
            .expect("large");
        backend
            .write_field(small, |x, y, _| [x as f32, y as f32, 0.0, 1.0])
            .expect("write");
        let block = copy.new_block();
        let source = copy.texture("source").expect("source slot");
        backend
            .draw(&DrawCall {
                program: copy.id,
                uniforms: &block,
                textures: &[(source, small)],
                output: Output::Target(large),
                blend: BlendMode::Replace,
            })
            .expect("draw");
        let out = backend.read_target(large).expect("read");
        assert_eq!(out.texel(0, 0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(out.texel(3, 3), [1.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn drawing_without_a_bound_texture_is_an_error() {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        let copy = compile_program(&mut backend, &shaders::COPY).expect("copy");
        let block = copy.new_block();
        let err = backend
            .draw(&DrawCall {
                program: copy.id,
                uniforms: &block,
                textures: &[],
                output: Output::Surface,
                blend: BlendMode::Replace,
            })
            .expect_err("missing texture");
        assert!(matches!(err, BackendError::MissingBinding { binding: 0, .. }));
    }

    #[test]
    fn half_precision_drops_low_mantissa_bits() {
        let value = 1.0 + 1.0e-6;
        assert_eq!(quantize_half(value), 1.0);
        assert_eq!(quantize_half(0.5), 0.5);
    }

    #[test]
    fn oversized_surfaces_are_rejected() {
        let err = SoftwareBackend::new((65_536, 65_537)).err().expect("too large");
        assert!(matches!(
            err,
            BackendError::TooLarge {
                width: 65_536,
                height: 65_537
            }
        ));

        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        assert!(backend.set_surface_size((u32::MAX, 2)).is_err());
        assert_eq!(backend.surface_size(), (4, 4));
        let err = backend
            .create_target(&descriptor(Channels::R, MAX_TEXTURE_DIMENSION + 1, 1))
            .expect_err("too wide");
        assert!(matches!(err, BackendError::TooLarge { .. }));
        assert_eq!(backend.live_targets(), 0);
    }

    #[test]
    fn target_limit_fails_further_allocations() {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        backend.set_target_limit(Some(1));
        backend
            .create_target(&descriptor(Channels::R, 2, 2))
            .expect("first");
        let err = backend
            .create_target(&descriptor(Channels::R, 2, 2))
            .expect_err("over the limit");
        assert!(matches!(err, BackendError::OutOfMemory("test")));
        assert_eq!(backend.live_targets(), 1);
    }
}
