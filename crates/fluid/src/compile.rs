use std::collections::BTreeMap;

use wgpu::naga::{
    self, front::glsl, valid, AddressSpace, Binding, ScalarKind, ShaderStage, TypeInner,
    VectorSize,
};

use crate::backend::{ProgramId, RenderBackend};
use crate::error::{CompileError, ShaderStageKind};
use crate::shaders::{Kernel, ProgramSource};

/// Define injected when float textures cannot be filtered by the sampler.
pub const MANUAL_FILTERING_DEFINE: &str = "#define MANUAL_FILTERING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
        }
    }
}

/// Byte offset of a member inside the program's std140 uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Binding of a `texture2D`; its sampler sits at `binding + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    pub binding: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramReflection {
    pub uniforms: BTreeMap<String, UniformLocation>,
    pub textures: BTreeMap<String, TextureSlot>,
    /// Size of the uniform block in bytes, zero when the program has none.
    pub uniform_size: u32,
}

impl ProgramReflection {
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn texture(&self, name: &str) -> Option<TextureSlot> {
        self.textures.get(name).copied()
    }
}

/// Preprocessed, validated sources ready to hand to a backend.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub name: &'static str,
    pub kernel: Kernel,
    pub vertex: String,
    pub fragment: String,
    pub reflection: ProgramReflection,
}

/// A program living on a backend together with its reflected interface.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub id: ProgramId,
    pub name: &'static str,
    pub reflection: ProgramReflection,
}

impl ShaderProgram {
    pub fn uniform(&self, name: &str) -> Result<UniformLocation, CompileError> {
        self.reflection
            .uniform(name)
            .ok_or_else(|| CompileError::MissingUniform {
                program: self.name.to_string(),
                name: name.to_string(),
            })
    }

    pub fn texture(&self, name: &str) -> Result<TextureSlot, CompileError> {
        self.reflection
            .texture(name)
            .ok_or_else(|| CompileError::MissingTexture {
                program: self.name.to_string(),
                name: name.to_string(),
            })
    }

    pub fn new_block(&self) -> UniformBlock {
        UniformBlock::new(self.reflection.uniform_size)
    }

    pub fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.delete_program(self.id);
    }
}

/// CPU-side bytes of a uniform block, written through reflected locations.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(size: u32) -> Self {
        let padded = (size as usize).div_ceil(16) * 16;
        Self {
            bytes: vec![0; padded],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn write(&mut self, location: UniformLocation, data: &[u8]) {
        debug_assert_eq!(location.kind.size(), data.len());
        let start = location.offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    fn read<const N: usize>(&self, location: UniformLocation) -> [f32; N] {
        let start = location.offset as usize;
        let mut out = [0.0_f32; N];
        for (index, slot) in out.iter_mut().enumerate() {
            let at = start + index * 4;
            *slot = bytemuck::pod_read_unaligned(&self.bytes[at..at + 4]);
        }
        out
    }

    pub fn set_f32(&mut self, location: UniformLocation, value: f32) {
        self.write(location, bytemuck::bytes_of(&value));
    }

    pub fn set_vec2(&mut self, location: UniformLocation, value: [f32; 2]) {
        self.write(location, bytemuck::cast_slice(&value));
    }

    pub fn set_vec3(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.write(location, bytemuck::cast_slice(&value));
    }

    pub fn set_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.write(location, bytemuck::cast_slice(&value));
    }

    pub fn f32(&self, location: UniformLocation) -> f32 {
        self.read::<1>(location)[0]
    }

    pub fn vec2(&self, location: UniformLocation) -> [f32; 2] {
        self.read(location)
    }

    pub fn vec3(&self, location: UniformLocation) -> [f32; 3] {
        self.read(location)
    }

    pub fn vec4(&self, location: UniformLocation) -> [f32; 4] {
        self.read(location)
    }
}

/// Inserts the manual filtering define right after the `#version` line.
pub fn preprocess(source: &str, manual_filtering: bool) -> String {
    if !manual_filtering {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len() + MANUAL_FILTERING_DEFINE.len() + 1);
    let mut injected = false;
    for line in source.lines() {
        out.push_str(line);
        out.push('\n');
        if !injected && line.trim_start().starts_with("#version") {
            out.push_str(MANUAL_FILTERING_DEFINE);
            out.push('\n');
            injected = true;
        }
    }
    if !injected {
        out.insert_str(0, &format!("{MANUAL_FILTERING_DEFINE}\n"));
    }
    out
}

/// Parses, validates and links both stages, and reflects the fragment interface.
pub fn link_program(
    source: &ProgramSource,
    manual_filtering: bool,
) -> Result<LinkedProgram, CompileError> {
    let vertex = preprocess(source.vertex, manual_filtering);
    let fragment = preprocess(source.fragment, manual_filtering);

    let vertex_module = parse_stage(source.name, ShaderStageKind::Vertex, &vertex)?;
    let fragment_module = parse_stage(source.name, ShaderStageKind::Fragment, &fragment)?;
    check_interface(source.name, &vertex_module, &fragment_module)?;

    Ok(LinkedProgram {
        name: source.name,
        kernel: source.kernel,
        vertex,
        fragment,
        reflection: reflect(&fragment_module),
    })
}

/// Builds `source` on `backend`.
pub fn compile_program<B: RenderBackend + ?Sized>(
    backend: &mut B,
    source: &ProgramSource,
) -> Result<ShaderProgram, CompileError> {
    let manual_filtering = !backend.capabilities().linear_filtering;
    let linked = link_program(source, manual_filtering)?;
    let id = backend.create_program(&linked)?;
    tracing::debug!(
        program = source.name,
        uniforms = linked.reflection.uniforms.len(),
        textures = linked.reflection.textures.len(),
        manual_filtering,
        "compiled program"
    );
    Ok(ShaderProgram {
        id,
        name: source.name,
        reflection: linked.reflection,
    })
}

fn parse_stage(
    program: &str,
    stage: ShaderStageKind,
    source: &str,
) -> Result<naga::Module, CompileError> {
    let naga_stage = match stage {
        ShaderStageKind::Vertex => ShaderStage::Vertex,
        ShaderStageKind::Fragment => ShaderStage::Fragment,
    };
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(naga_stage), source)
        .map_err(|errors| CompileError::Compile {
            program: program.to_string(),
            stage,
            log: errors.emit_to_string(source),
        })?;

    let mut validator =
        valid::Validator::new(valid::ValidationFlags::all(), valid::Capabilities::all());
    validator
        .validate(&module)
        .map_err(|error| CompileError::Compile {
            program: program.to_string(),
            stage,
            log: error.emit_to_string(source),
        })?;
    Ok(module)
}

fn check_interface(
    program: &str,
    vertex: &naga::Module,
    fragment: &naga::Module,
) -> Result<(), CompileError> {
    let produced = vertex_outputs(vertex);
    for location in fragment_inputs(fragment) {
        if !produced.contains(&location) {
            return Err(CompileError::Link {
                program: program.to_string(),
                log: format!(
                    "fragment input at location {location} is not written by the vertex stage"
                ),
            });
        }
    }
    Ok(())
}

fn binding_locations(
    module: &naga::Module,
    binding: Option<&Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(*location),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    binding_locations(module, member.binding.as_ref(), member.ty, out);
                }
            }
        }
    }
}

fn vertex_outputs(module: &naga::Module) -> Vec<u32> {
    let mut out = Vec::new();
    for entry in &module.entry_points {
        if let Some(result) = &entry.function.result {
            binding_locations(module, result.binding.as_ref(), result.ty, &mut out);
        }
    }
    out
}

fn fragment_inputs(module: &naga::Module) -> Vec<u32> {
    let mut out = Vec::new();
    for entry in &module.entry_points {
        for argument in &entry.function.arguments {
            binding_locations(module, argument.binding.as_ref(), argument.ty, &mut out);
        }
    }
    out
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => Some(UniformKind::Float),
            ScalarKind::Sint => Some(UniformKind::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Bi => Some(UniformKind::Vec2),
            VectorSize::Tri => Some(UniformKind::Vec3),
            VectorSize::Quad => Some(UniformKind::Vec4),
        },
        _ => None,
    }
}

fn reflect(module: &naga::Module) -> ProgramReflection {
    let mut reflection = ProgramReflection::default();
    for (_, global) in module.global_variables.iter() {
        let inner = &module.types[global.ty].inner;
        match global.space {
            AddressSpace::Uniform => {
                if let TypeInner::Struct { members, span } = inner {
                    reflection.uniform_size = *span;
                    for member in members {
                        let kind = uniform_kind(&module.types[member.ty].inner);
                        if let (Some(name), Some(kind)) = (&member.name, kind) {
                            reflection.uniforms.insert(
                                name.clone(),
                                UniformLocation {
                                    offset: member.offset,
                                    kind,
                                },
                            );
                        }
                    }
                }
            }
            AddressSpace::Handle => {
                if let (TypeInner::Image { .. }, Some(name), Some(binding)) =
                    (inner, &global.name, &global.binding)
                {
                    let key = name.strip_suffix("_texture").unwrap_or(name);
                    reflection.textures.insert(
                        key.to_string(),
                        TextureSlot {
                            binding: binding.binding,
                        },
                    );
                }
            }
            _ => {}
        }
    }
    reflection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::SIMULATION_VERTEX;

    const PROBE_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
    float dt;
    float dissipation;
    vec3 color;
} params;

layout(set = 1, binding = 0) uniform texture2D source_texture;
layout(set = 1, binding = 1) uniform sampler source_sampler;

void main() {
    vec4 base = texture(sampler2D(source_texture, source_sampler), v_uv);
    out_color = base * params.dt + vec4(params.color, params.dissipation) + vec4(params.texel_size, 0.0, 0.0);
}
";

    fn probe(fragment: &'static str) -> ProgramSource {
        ProgramSource {
            name: "probe",
            kernel: Kernel::Copy,
            vertex: SIMULATION_VERTEX,
            fragment,
        }
    }

    #[test]
    fn manual_filtering_define_follows_version_line() {
        let out = preprocess("#version 450\nvoid main() {}\n", true);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("#version 450"));
        assert_eq!(lines.next(), Some(MANUAL_FILTERING_DEFINE));
        assert_eq!(preprocess("#version 450\n", false), "#version 450\n");
    }

    #[test]
    fn reflection_reports_std140_offsets_and_textures() {
        let linked = link_program(&probe(PROBE_FRAGMENT), false).expect("link probe");
        let uniforms = &linked.reflection.uniforms;
        assert_eq!(uniforms["texel_size"].offset, 0);
        assert_eq!(uniforms["texel_size"].kind, UniformKind::Vec2);
        assert_eq!(uniforms["dt"].offset, 8);
        assert_eq!(uniforms["dissipation"].offset, 12);
        assert_eq!(uniforms["color"].offset, 16);
        assert_eq!(uniforms["color"].kind, UniformKind::Vec3);
        assert_eq!(linked.reflection.texture("source"), Some(TextureSlot { binding: 0 }));
        assert!(linked.reflection.uniform_size >= 28);
    }

    #[test]
    fn syntax_errors_carry_the_compiler_log() {
        let broken = "#version 450\nlayout(location = 0) out vec4 c;\nvoid main() { c = vec4(1.0) }\n";
        let err = link_program(&probe(broken), false).expect_err("must not compile");
        match err {
            CompileError::Compile { stage, log, .. } => {
                assert_eq!(stage, ShaderStageKind::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let fragment = r"#version 450
layout(location = 3) in vec2 v_other;
layout(location = 0) out vec4 out_color;
void main() {
    out_color = vec4(v_other, 0.0, 1.0);
}
";
        let err = link_program(&probe(fragment), false).expect_err("must not link");
        assert!(matches!(err, CompileError::Link { .. }), "{err:?}");
    }

    #[test]
    fn uniform_block_round_trips_through_locations() {
        let linked = link_program(&probe(PROBE_FRAGMENT), false).expect("link probe");
        let mut block = UniformBlock::new(linked.reflection.uniform_size);
        let color = linked.reflection.uniform("color").expect("color");
        let dt = linked.reflection.uniform("dt").expect("dt");
        block.set_vec3(color, [0.25, 0.5, 1.0]);
        block.set_f32(dt, 0.016);
        assert_eq!(block.vec3(color), [0.25, 0.5, 1.0]);
        assert_eq!(block.f32(dt), 0.016);
        assert_eq!(block.as_bytes().len() % 16, 0);
    }
}
