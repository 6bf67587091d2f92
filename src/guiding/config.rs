// Copyright @yucwang 2026

use std::convert::TryFrom;
use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::guiding::{ BsdfSamplingFractionLoss, DirectionalFilter, SpatialFilter };
use crate::math::constants::Float;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Parse(String),
    UnknownProperty(String),
    InvalidValue { name: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "parse error: {}", msg),
            ConfigError::UnknownProperty(name) => write!(f, "unknown property: {}", name),
            ConfigError::InvalidValue { name, value } =>
                write!(f, "invalid value for {}: {}", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings of the guiding engine, named after the properties of the
/// guided path tracer that drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidingConfig {
    pub spatial_filter: SpatialFilter,
    pub directional_filter: DirectionalFilter,
    pub bsdf_sampling_fraction_loss: BsdfSamplingFractionLoss,
    /// Used when the fraction is not learned.
    pub bsdf_sampling_fraction: Float,
    pub s_tree_threshold: Float,
    pub d_tree_threshold: Float,
    pub d_tree_max_depth: usize,
    pub sd_tree_max_memory_mb: Option<usize>,
    pub spp_per_pass: u32,
}

impl Default for GuidingConfig {
    fn default() -> Self {
        Self {
            spatial_filter: SpatialFilter::Nearest,
            directional_filter: DirectionalFilter::Nearest,
            bsdf_sampling_fraction_loss: BsdfSamplingFractionLoss::None,
            bsdf_sampling_fraction: 0.5,
            s_tree_threshold: 12000.0,
            d_tree_threshold: 0.01,
            d_tree_max_depth: 20,
            sd_tree_max_memory_mb: None,
            spp_per_pass: 4,
        }
    }
}

impl GuidingConfig {
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "spatialFilter" => {
                self.spatial_filter = match value {
                    "nearest" => SpatialFilter::Nearest,
                    "stochastic" => SpatialFilter::StochasticBox,
                    "box" => SpatialFilter::Box,
                    _ => return Err(invalid(name, value)),
                };
            }
            "directionalFilter" => {
                self.directional_filter = match value {
                    "nearest" => DirectionalFilter::Nearest,
                    "box" => DirectionalFilter::Box,
                    _ => return Err(invalid(name, value)),
                };
            }
            "bsdfSamplingFractionLoss" => {
                self.bsdf_sampling_fraction_loss = match value {
                    "none" => BsdfSamplingFractionLoss::None,
                    "kl" => BsdfSamplingFractionLoss::KL,
                    "var" => BsdfSamplingFractionLoss::Variance,
                    _ => return Err(invalid(name, value)),
                };
            }
            "bsdfSamplingFraction" => self.bsdf_sampling_fraction = parse_float(name, value)?,
            "sTreeThreshold" => self.s_tree_threshold = parse_float(name, value)?,
            "dTreeThreshold" => self.d_tree_threshold = parse_float(name, value)?,
            "dTreeMaxDepth" => self.d_tree_max_depth = parse_usize(name, value)?,
            "sdTreeMaxMemory" => {
                let mb = value.parse::<i64>().map_err(|_| invalid(name, value))?;
                self.sd_tree_max_memory_mb = if mb < 0 {
                    None
                } else {
                    Some(usize::try_from(mb).map_err(|_| invalid(name, value))?)
                };
            }
            "sppPerPass" => {
                self.spp_per_pass = value.parse::<u32>().map_err(|_| invalid(name, value))?;
            }
            _ => return Err(ConfigError::UnknownProperty(name.to_string())),
        }
        Ok(())
    }

    /// Reads the `<integer|float|string|boolean name=".." value=".."/>`
    /// properties nested in the document's `<integrator>` element.
    pub fn from_xml_str(xml: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut config = GuidingConfig::default();
        let mut integrator_depth: usize = 0;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    if e.name().as_ref() == b"integrator" || integrator_depth > 0 {
                        integrator_depth += 1;
                    }
                }
                Ok(Event::End(_)) => {
                    integrator_depth = integrator_depth.saturating_sub(1);
                }
                Ok(Event::Empty(e)) => {
                    if integrator_depth == 0 {
                        buf.clear();
                        continue;
                    }
                    match e.name().as_ref() {
                        b"integer" | b"float" | b"string" | b"boolean" => {
                            let mut key: Option<String> = None;
                            let mut value: Option<String> = None;
                            for attr in e.attributes().flatten() {
                                let text = attr.unescape_value()
                                    .map_err(|err| ConfigError::Parse(err.to_string()))?
                                    .to_string();
                                match attr.key.as_ref() {
                                    b"name" => key = Some(text),
                                    b"value" => value = Some(text),
                                    _ => {}
                                }
                            }
                            match (key, value) {
                                (Some(k), Some(v)) => config.set_property(&k, &v)?,
                                _ => return Err(ConfigError::Parse("property without name or value".to_string())),
                            }
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    return Err(ConfigError::Parse(format!("error at position {}: {:?}",
                                                          reader.buffer_position(), e)));
                }
                _ => {}
            }
            buf.clear();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bsdf_sampling_fraction >= 0.0 && self.bsdf_sampling_fraction <= 1.0) {
            return Err(invalid("bsdfSamplingFraction", &self.bsdf_sampling_fraction.to_string()));
        }
        if !(self.s_tree_threshold > 0.0) {
            return Err(invalid("sTreeThreshold", &self.s_tree_threshold.to_string()));
        }
        if !(self.d_tree_threshold > 0.0) {
            return Err(invalid("dTreeThreshold", &self.d_tree_threshold.to_string()));
        }
        if self.d_tree_max_depth == 0 {
            return Err(invalid("dTreeMaxDepth", "0"));
        }
        if self.spp_per_pass == 0 {
            return Err(invalid("sppPerPass", "0"));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { name: name.to_string(), value: value.to_string() }
}

fn parse_float(name: &str, value: &str) -> Result<Float, ConfigError> {
    value.parse::<Float>().map_err(|_| invalid(name, value))
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid(name, value))
}

#[cfg(test)]
mod tests {
    use super::{ ConfigError, GuidingConfig };
    use crate::guiding::{ BsdfSamplingFractionLoss, DirectionalFilter, SpatialFilter };

    #[test]
    fn test_defaults_are_valid() {
        let config = GuidingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.s_tree_threshold, 12000.0);
        assert_eq!(config.d_tree_max_depth, 20);
        assert_eq!(config.sd_tree_max_memory_mb, None);
    }

    #[test]
    fn test_from_xml() {
        let xml = r#"
            <scene version="2.0.0">
                <integer name="ignored" value="1"/>
                <integrator type="guided_path">
                    <string name="spatialFilter" value="stochastic"/>
                    <string name="directionalFilter" value="box"/>
                    <string name="bsdfSamplingFractionLoss" value="kl"/>
                    <float name="sTreeThreshold" value="4000"/>
                    <float name="dTreeThreshold" value="0.02"/>
                    <integer name="sdTreeMaxMemory" value="256"/>
                    <integer name="sppPerPass" value="8"/>
                </integrator>
            </scene>
        "#;
        let config = GuidingConfig::from_xml_str(xml).expect("valid config");
        assert_eq!(config.spatial_filter, SpatialFilter::StochasticBox);
        assert_eq!(config.directional_filter, DirectionalFilter::Box);
        assert_eq!(config.bsdf_sampling_fraction_loss, BsdfSamplingFractionLoss::KL);
        assert_eq!(config.s_tree_threshold, 4000.0);
        assert_eq!(config.d_tree_threshold, 0.02);
        assert_eq!(config.sd_tree_max_memory_mb, Some(256));
        assert_eq!(config.spp_per_pass, 8);
    }

    #[test]
    fn test_rejects_bad_properties() {
        let mut config = GuidingConfig::default();
        assert_eq!(config.set_property("spatialFilter", "gaussian"),
                   Err(ConfigError::InvalidValue { name: "spatialFilter".to_string(),
                                                   value: "gaussian".to_string() }));
        assert_eq!(config.set_property("maxDepth", "3"),
                   Err(ConfigError::UnknownProperty("maxDepth".to_string())));
        assert!(config.set_property("sdTreeMaxMemory", "-1").is_ok());
        assert_eq!(config.sd_tree_max_memory_mb, None);
        assert!(config.set_property("sdTreeMaxMemory", "99999999999999999999").is_err());

        let xml = r#"<integrator type="guided_path"><float name="bsdfSamplingFraction" value="1.5"/></integrator>"#;
        assert!(GuidingConfig::from_xml_str(xml).is_err());
    }
}
