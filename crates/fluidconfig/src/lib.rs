use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeSetting {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSetting {
    #[default]
    Desktop,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendSetting {
    Premultiplied,
    Alpha,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FluidConfig {
    pub version: u32,
    #[serde(default)]
    pub theme: ThemeSetting,
    #[serde(default)]
    pub simulation: SimulationSection,
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub compositor: CompositorSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub velocity_dissipation: f32,
    pub dye_dissipation: f32,
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    /// Percent of the surface height.
    pub splat_radius: f32,
    pub splat_force: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub max_frame_time: Duration,
    pub initial_splats: u32,
    pub paused: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1024,
            velocity_dissipation: 0.9,
            dye_dissipation: 0.6,
            pressure: 0.8,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.25,
            splat_force: 6000.0,
            max_frame_time: default_max_frame_time(),
            initial_splats: 0,
            paused: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostSection {
    pub device: DeviceSetting,
    pub reduced_motion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositorSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark: Option<StyleOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<StyleOverride>,
}

/// Partial compositor style; unset fields keep the theme's built-in value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend: Option<BlendSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tint: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamp: Option<f32>,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            version: 1,
            theme: ThemeSetting::default(),
            simulation: SimulationSection::default(),
            host: HostSection::default(),
            compositor: CompositorSection::default(),
        }
    }
}

fn default_max_frame_time() -> Duration {
    Duration::from_secs_f64(1.0 / 60.0)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within {min}..={max}, got {value}")))
    }
}

impl FluidConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: FluidConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn style_override(&self, theme: ThemeSetting) -> Option<&StyleOverride> {
        match theme {
            ThemeSetting::Dark => self.compositor.dark.as_ref(),
            ThemeSetting::Light => self.compositor.light.as_ref(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let sim = &self.simulation;
        for (name, resolution) in [
            ("simulation.sim_resolution", sim.sim_resolution),
            ("simulation.dye_resolution", sim.dye_resolution),
        ] {
            if !(8..=4096).contains(&resolution) {
                return Err(invalid(format!(
                    "{name} must be within 8..=4096, got {resolution}"
                )));
            }
        }
        check_range(
            "simulation.velocity_dissipation",
            sim.velocity_dissipation,
            0.0,
            100.0,
        )?;
        check_range("simulation.dye_dissipation", sim.dye_dissipation, 0.0, 100.0)?;
        check_range("simulation.pressure", sim.pressure, 0.0, 1.0)?;
        if sim.pressure_iterations == 0 {
            return Err(invalid("simulation.pressure_iterations must be at least 1"));
        }
        check_range("simulation.curl", sim.curl, 0.0, 1000.0)?;
        if !(sim.splat_radius.is_finite() && sim.splat_radius > 0.0) {
            return Err(invalid("simulation.splat_radius must be greater than zero"));
        }
        check_range("simulation.splat_force", sim.splat_force, 0.0, 1.0e6)?;
        if sim.max_frame_time.is_zero() || sim.max_frame_time > Duration::from_secs(1) {
            return Err(invalid(
                "simulation.max_frame_time must be greater than zero and at most 1s",
            ));
        }

        for (theme, style) in [
            ("dark", self.compositor.dark.as_ref()),
            ("light", self.compositor.light.as_ref()),
        ] {
            let Some(style) = style else { continue };
            if let Some(tint) = style.tint {
                for component in tint {
                    check_range(&format!("compositor.{theme}.tint"), component, 0.0, 1.0)?;
                }
            }
            if let Some(saturation) = style.saturation {
                check_range(&format!("compositor.{theme}.saturation"), saturation, 0.0, 1.0)?;
            }
            if let Some(gain) = style.gain {
                check_range(&format!("compositor.{theme}.gain"), gain, 0.0, 100.0)?;
            }
            if let Some(alpha) = style.alpha {
                check_range(&format!("compositor.{theme}.alpha"), alpha, 0.0, 100.0)?;
            }
            if let Some(clamp) = style.clamp {
                check_range(&format!("compositor.{theme}.clamp"), clamp, 0.0, 1.0)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
theme = "light"

[simulation]
sim_resolution = 64
dye_resolution = 512
curl = 12
max_frame_time = "20ms"
initial_splats = 8

[host]
device = "desktop"
reduced_motion = false

[compositor.light]
blend = "alpha"
tint = [0.3, 0.3, 0.3]
clamp = 0.5
"#;

    #[test]
    fn parses_sample_config() {
        let config = FluidConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.theme, ThemeSetting::Light);
        assert_eq!(config.simulation.sim_resolution, 64);
        assert_eq!(config.simulation.curl, 12.0);
        assert_eq!(config.simulation.max_frame_time, Duration::from_millis(20));
        assert_eq!(config.simulation.pressure_iterations, 20);
        let light = config
            .style_override(ThemeSetting::Light)
            .expect("light override");
        assert_eq!(light.blend, Some(BlendSetting::Alpha));
        assert_eq!(light.clamp, Some(0.5));
        assert_eq!(light.gain, None);
        assert!(config.style_override(ThemeSetting::Dark).is_none());
    }

    #[test]
    fn version_alone_yields_defaults() {
        let config = FluidConfig::from_toml_str("version = 1").expect("parse");
        assert_eq!(config, FluidConfig::default());
        assert_eq!(config.host.device, DeviceSetting::Desktop);
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let config = FluidConfig::from_toml_str(
            r#"
version = 1
[simulation]
max_frame_time = 0.05
"#,
        )
        .expect("parse");
        assert_eq!(
            config.simulation.max_frame_time,
            Duration::from_secs_f64(0.05)
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let err = FluidConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_pressure() {
        let err = FluidConfig::from_toml_str(
            r#"
version = 1
[simulation]
pressure = 1.5
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("pressure")));
    }

    #[test]
    fn rejects_long_frame_budget() {
        let err = FluidConfig::from_toml_str(
            r#"
version = 1
[simulation]
max_frame_time = "5s"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_style_override() {
        let err = FluidConfig::from_toml_str(
            r#"
version = 1
[compositor.dark]
clamp = 2.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("compositor.dark.clamp")));
    }

    #[test]
    fn unknown_theme_is_a_parse_error() {
        let err = FluidConfig::from_toml_str("version = 1\ntheme = \"sepia\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn dumped_config_parses_back() {
        let config = FluidConfig::from_toml_str(SAMPLE).expect("parse");
        let dumped = config.to_toml_string().expect("dump");
        assert!(dumped.contains("max_frame_time = \"20ms\""));
        let reparsed = FluidConfig::from_toml_str(&dumped).expect("reparse");
        assert_eq!(reparsed, config);
    }
}
