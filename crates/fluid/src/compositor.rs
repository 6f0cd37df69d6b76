use crate::backend::{DrawCall, Output, RenderBackend};
use crate::error::BackendError;
use crate::framebuffer::Framebuffer;
use crate::programs::DisplayProgram;
use crate::types::{CompositorStyle, Theme};

/// Per-theme compositor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeStyles {
    pub dark: CompositorStyle,
    pub light: CompositorStyle,
}

impl Default for ThemeStyles {
    fn default() -> Self {
        Self {
            dark: CompositorStyle::for_theme(Theme::Dark),
            light: CompositorStyle::for_theme(Theme::Light),
        }
    }
}

impl ThemeStyles {
    pub fn for_theme(&self, theme: Theme) -> CompositorStyle {
        match theme {
            Theme::Dark => self.dark,
            Theme::Light => self.light,
        }
    }
}

/// Draws the dye field onto the transparent surface.
#[derive(Debug, Clone)]
pub struct Compositor {
    styles: ThemeStyles,
    theme: Theme,
}

impl Compositor {
    pub fn new(theme: Theme, styles: ThemeStyles) -> Self {
        Self { styles, theme }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn style(&self) -> CompositorStyle {
        self.styles.for_theme(self.theme)
    }

    pub fn composite<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        display: &DisplayProgram,
        dye: &Framebuffer,
    ) -> Result<(), BackendError> {
        let style = self.style();
        let mut uniforms = display.program.new_block();
        uniforms.set_vec3(display.tint, style.tint);
        uniforms.set_f32(display.saturation, style.saturation);
        uniforms.set_f32(display.gain, style.gain);
        uniforms.set_f32(display.alpha_scale, style.alpha);
        uniforms.set_f32(display.alpha_clamp, style.clamp);

        backend.clear(Output::Surface, [0.0; 4])?;
        backend.draw(&DrawCall {
            program: display.program.id,
            uniforms: &uniforms,
            textures: &[(display.dye, dye.id)],
            output: Output::Surface,
            blend: style.blend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::create_fbo;
    use crate::programs::FluidPrograms;
    use crate::software::SoftwareBackend;
    use crate::types::{Channels, FilterMode, Precision, TextureFormat};

    fn composite_uniform_dye(theme: Theme, dye_value: [f32; 4]) -> [f32; 4] {
        let mut backend = SoftwareBackend::new((4, 4)).expect("backend");
        let programs = FluidPrograms::compile(&mut backend).expect("programs");
        let dye = create_fbo(
            &mut backend,
            "dye",
            (4, 4),
            TextureFormat::new(Channels::Rgba, Precision::Full),
            FilterMode::Linear,
        )
        .expect("dye");
        backend
            .clear(Output::Target(dye.id), dye_value)
            .expect("fill dye");
        backend
            .clear(Output::Surface, [0.3, 0.3, 0.3, 1.0])
            .expect("dirty surface");
        let compositor = Compositor::new(theme, ThemeStyles::default());
        compositor
            .composite(&mut backend, &programs.display, &dye)
            .expect("composite");
        backend.surface_snapshot().texel(2, 1)
    }

    #[test]
    fn empty_dye_leaves_a_transparent_surface() {
        for theme in [Theme::Dark, Theme::Light] {
            let pixel = composite_uniform_dye(theme, [0.0; 4]);
            assert_eq!(pixel, [0.0; 4], "{theme}");
        }
    }

    #[test]
    fn dense_dye_is_clamped_per_theme() {
        for theme in [Theme::Dark, Theme::Light] {
            let clamp = CompositorStyle::for_theme(theme).clamp;
            let pixel = composite_uniform_dye(theme, [5.0, 5.0, 5.0, 1.0]);
            assert!((pixel[3] - clamp).abs() < 1e-6, "{theme}: {pixel:?}");
        }
    }

    #[test]
    fn faint_dye_alpha_follows_brightest_channel() {
        let style = CompositorStyle::for_theme(Theme::Dark);
        let pixel = composite_uniform_dye(Theme::Dark, [0.1, 0.05, 0.0, 1.0]);
        let expected = 0.1 * style.gain * style.alpha;
        assert!((pixel[3] - expected).abs() < 1e-5);
        assert!(pixel[0] > pixel[1]);
    }

    #[test]
    fn light_theme_desaturates_towards_the_tint() {
        let pixel = composite_uniform_dye(Theme::Light, [0.3, 0.0, 0.0, 1.0]);
        let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
        assert!(r > 0.0 && g > 0.0 && b > 0.0);
        assert!(g / r > 0.5, "light smoke stays near gray: {pixel:?}");
    }
}
