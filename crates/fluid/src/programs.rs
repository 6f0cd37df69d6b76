use crate::backend::RenderBackend;
use crate::compile::{compile_program, ShaderProgram, TextureSlot, UniformLocation};
use crate::error::CompileError;
use crate::shaders::{self, ProgramSource};

/// Declares a program wrapper whose fields are the locations it needs.
///
/// `resolve` fails with [`CompileError::MissingUniform`] or
/// [`CompileError::MissingTexture`] when the compiled shader does not expose a
/// listed name.
macro_rules! program_bindings {
    (
        $(#[$meta:meta])*
        $name:ident {
            uniforms: [$($uniform:ident),* $(,)?],
            textures: [$($texture:ident),* $(,)?] $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub program: ShaderProgram,
            $(pub $uniform: UniformLocation,)*
            $(pub $texture: TextureSlot,)*
        }

        impl $name {
            pub fn resolve(program: ShaderProgram) -> Result<Self, CompileError> {
                Ok(Self {
                    $($uniform: program.uniform(stringify!($uniform))?,)*
                    $($texture: program.texture(stringify!($texture))?,)*
                    program,
                })
            }
        }
    };
}

program_bindings! {
    /// Multiplies a field by a constant; used to decay pressure between solves.
    ClearProgram {
        uniforms: [value],
        textures: [field],
    }
}

program_bindings! {
    SplatProgram {
        uniforms: [color, aspect_ratio, point, radius],
        textures: [target],
    }
}

program_bindings! {
    CurlProgram {
        uniforms: [texel_size],
        textures: [velocity],
    }
}

program_bindings! {
    VorticityProgram {
        uniforms: [texel_size, curl_strength, dt],
        textures: [velocity, curl],
    }
}

program_bindings! {
    DivergenceProgram {
        uniforms: [texel_size],
        textures: [velocity],
    }
}

program_bindings! {
    PressureProgram {
        uniforms: [texel_size],
        textures: [pressure, divergence],
    }
}

program_bindings! {
    GradientSubtractProgram {
        uniforms: [texel_size],
        textures: [pressure, velocity],
    }
}

program_bindings! {
    AdvectionProgram {
        uniforms: [texel_size, source_texel_size, dt, dissipation],
        textures: [velocity, source],
    }
}

program_bindings! {
    DisplayProgram {
        uniforms: [tint, saturation, gain, alpha_scale, alpha_clamp],
        textures: [dye],
    }
}

program_bindings! {
    /// Resamples one field into a target of a different size.
    CopyProgram {
        uniforms: [],
        textures: [source],
    }
}

/// Every program the simulation and compositor run.
#[derive(Debug, Clone)]
pub struct FluidPrograms {
    pub clear: ClearProgram,
    pub splat: SplatProgram,
    pub curl: CurlProgram,
    pub vorticity: VorticityProgram,
    pub divergence: DivergenceProgram,
    pub pressure: PressureProgram,
    pub gradient_subtract: GradientSubtractProgram,
    pub advection: AdvectionProgram,
    pub display: DisplayProgram,
    pub copy: CopyProgram,
}

impl FluidPrograms {
    /// Compiles every program, releasing the ones already built if a later one fails.
    pub fn compile<B: RenderBackend + ?Sized>(backend: &mut B) -> Result<Self, CompileError> {
        let mut built: Vec<ShaderProgram> = Vec::with_capacity(shaders::ALL.len());
        let result = Self::compile_into(backend, &mut built);
        if result.is_err() {
            for program in &built {
                program.release(backend);
            }
        }
        result
    }

    fn compile_into<B: RenderBackend + ?Sized>(
        backend: &mut B,
        built: &mut Vec<ShaderProgram>,
    ) -> Result<Self, CompileError> {
        let mut next = |source: &ProgramSource| -> Result<ShaderProgram, CompileError> {
            let program = compile_program(&mut *backend, source)?;
            built.push(program.clone());
            Ok(program)
        };
        Ok(Self {
            clear: ClearProgram::resolve(next(&shaders::CLEAR)?)?,
            splat: SplatProgram::resolve(next(&shaders::SPLAT)?)?,
            curl: CurlProgram::resolve(next(&shaders::CURL)?)?,
            vorticity: VorticityProgram::resolve(next(&shaders::VORTICITY)?)?,
            divergence: DivergenceProgram::resolve(next(&shaders::DIVERGENCE)?)?,
            pressure: PressureProgram::resolve(next(&shaders::PRESSURE)?)?,
            gradient_subtract: GradientSubtractProgram::resolve(next(
                &shaders::GRADIENT_SUBTRACT,
            )?)?,
            advection: AdvectionProgram::resolve(next(&shaders::ADVECTION)?)?,
            display: DisplayProgram::resolve(next(&shaders::DISPLAY)?)?,
            copy: CopyProgram::resolve(next(&shaders::COPY)?)?,
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        for program in [
            &self.clear.program,
            &self.splat.program,
            &self.curl.program,
            &self.vorticity.program,
            &self.divergence.program,
            &self.pressure.program,
            &self.gradient_subtract.program,
            &self.advection.program,
            &self.display.program,
            &self.copy.program,
        ] {
            program.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProgramId;
    use crate::compile::ProgramReflection;
    use crate::software::SoftwareBackend;

    #[test]
    fn all_programs_compile_on_the_software_backend() {
        let mut backend = SoftwareBackend::new((16, 16)).expect("backend");
        let programs = FluidPrograms::compile(&mut backend).expect("programs compile");
        assert_eq!(backend.live_programs(), 10);
        programs.release(&mut backend);
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn resolve_reports_missing_uniform_by_name() {
        let program = ShaderProgram {
            id: ProgramId(7),
            name: "bare",
            reflection: ProgramReflection::default(),
        };
        let err = CurlProgram::resolve(program).expect_err("no texel_size");
        match err {
            CompileError::MissingUniform { program, name } => {
                assert_eq!(program, "bare");
                assert_eq!(name, "texel_size");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
