use anyhow::{Context, Result};
use idcrop_vision::{CropConfig, FaceSelector, HairRatio, HairThresholds, OutputFormat, Plausibility};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::naming::NamingConfig;

pub static CONFIG_PATH: Lazy<&'static Path> =
    Lazy::new(|| Path::new(option_env!("IDCROP_CONFIG_PATH").unwrap_or("idcrop.toml")));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub detection: DetectionConfig,
    pub cropping: CroppingConfig,
    pub batch: BatchConfig,
    pub naming: NamingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1..=100.
    pub quality: u32,
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 360,
            height: 450,
            quality: 95,
            format: OutputFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f64,
    pub nms_threshold: f32,
    pub plausibility: Plausibility,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            confidence_threshold: 0.5,
            nms_threshold: 0.3,
            plausibility: Plausibility::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CroppingConfig {
    pub target_head_ratio: f64,
    pub target_top_margin: f64,
    pub chin_extra_ratio: f64,
    pub hair_ratio: HairRatio,
    pub hair_thresholds: HairThresholds,
}

impl Default for CroppingConfig {
    fn default() -> Self {
        let crop = CropConfig::default();
        Self {
            target_head_ratio: crop.target_head_ratio,
            target_top_margin: crop.target_top_margin,
            chin_extra_ratio: crop.chin_extra_ratio,
            hair_ratio: crop.hair_ratio,
            hair_thresholds: crop.hair_thresholds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// File extensions accepted as input, case-insensitive, without the dot.
    pub extensions: Vec<String>,
    pub recursive: bool,
    /// Output directory created next to the input when `-o` is not given.
    pub output_dir_name: String,
    /// Worker threads; 0 uses every available core.
    pub workers: usize,
    pub debug: bool,
    /// Write `summary.json` into the output directory.
    pub summary: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recursive: false,
            output_dir_name: "crop".to_string(),
            workers: 0,
            debug: false,
            summary: true,
        }
    }
}

impl Config {
    pub fn crop_config(&self) -> CropConfig {
        CropConfig {
            output_width: self.output.width,
            output_height: self.output.height,
            target_head_ratio: self.cropping.target_head_ratio,
            target_top_margin: self.cropping.target_top_margin,
            chin_extra_ratio: self.cropping.chin_extra_ratio,
            hair_ratio: self.cropping.hair_ratio.clone(),
            hair_thresholds: self.cropping.hair_thresholds.clone(),
        }
    }

    pub fn selector(&self) -> FaceSelector {
        FaceSelector::new(self.detection.confidence_threshold)
            .with_plausibility(self.detection.plausibility.clone())
    }

    pub fn quality(&self) -> u8 {
        self.output.quality.clamp(1, 100) as u8
    }

    /// Reset every semantically invalid value to its default.
    ///
    /// Returns the dotted names of the fields that were reset.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = Config::default();
        let mut fixes = Vec::new();

        let out = &mut self.output;
        let (bad_width, bad_height) = (out.width == 0, out.height == 0);
        reset_if(&mut out.width, defaults.output.width, bad_width, "output.width", &mut fixes);
        reset_if(&mut out.height, defaults.output.height, bad_height, "output.height", &mut fixes);
        let bad_quality = !(1..=100).contains(&out.quality);
        reset_if(&mut out.quality, defaults.output.quality, bad_quality, "output.quality", &mut fixes);

        let det = &mut self.detection;
        let bad_conf = !(0.0..=1.0).contains(&det.confidence_threshold);
        reset_if(
            &mut det.confidence_threshold,
            defaults.detection.confidence_threshold,
            bad_conf,
            "detection.confidence_threshold",
            &mut fixes,
        );
        let bad_nms = !(det.nms_threshold > 0.0 && det.nms_threshold <= 1.0);
        reset_if(
            &mut det.nms_threshold,
            defaults.detection.nms_threshold,
            bad_nms,
            "detection.nms_threshold",
            &mut fixes,
        );
        let p = &det.plausibility;
        let bad_plausibility = !(0.0 <= p.min_area_ratio
            && p.min_area_ratio <= p.max_area_ratio
            && p.max_area_ratio <= 1.0
            && 0.0 < p.min_aspect
            && p.min_aspect <= p.max_aspect
            && p.max_aspect.is_finite());
        reset_if(
            &mut det.plausibility,
            defaults.detection.plausibility.clone(),
            bad_plausibility,
            "detection.plausibility",
            &mut fixes,
        );

        let crop = &mut self.cropping;
        let bad_head = !(crop.target_head_ratio > 0.0 && crop.target_head_ratio < 1.0);
        reset_if(
            &mut crop.target_head_ratio,
            defaults.cropping.target_head_ratio,
            bad_head,
            "cropping.target_head_ratio",
            &mut fixes,
        );
        let bad_margin = !(crop.target_top_margin >= 0.0 && crop.target_top_margin < 1.0);
        reset_if(
            &mut crop.target_top_margin,
            defaults.cropping.target_top_margin,
            bad_margin,
            "cropping.target_top_margin",
            &mut fixes,
        );
        let bad_chin = !(crop.chin_extra_ratio >= 0.0 && crop.chin_extra_ratio.is_finite());
        reset_if(
            &mut crop.chin_extra_ratio,
            defaults.cropping.chin_extra_ratio,
            bad_chin,
            "cropping.chin_extra_ratio",
            &mut fixes,
        );
        let hair = &crop.hair_ratio;
        let multipliers = [
            hair.small_face_multiplier,
            hair.large_face_multiplier,
            hair.top_position_multiplier,
            hair.bottom_position_multiplier,
        ];
        let bad_hair = !(0.0 <= hair.min
            && hair.min <= hair.base
            && hair.base <= hair.max
            && hair.max.is_finite()
            && multipliers.iter().all(|m| m.is_finite() && *m >= 0.0));
        reset_if(
            &mut crop.hair_ratio,
            defaults.cropping.hair_ratio.clone(),
            bad_hair,
            "cropping.hair_ratio",
            &mut fixes,
        );
        let t = &crop.hair_thresholds;
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        let bad_thresholds = !(in_unit(t.small_face)
            && in_unit(t.large_face)
            && in_unit(t.near_top)
            && in_unit(t.near_bottom)
            && t.small_face < t.large_face
            && t.near_top < t.near_bottom);
        reset_if(
            &mut crop.hair_thresholds,
            defaults.cropping.hair_thresholds.clone(),
            bad_thresholds,
            "cropping.hair_thresholds",
            &mut fixes,
        );

        let batch = &mut self.batch;
        let bad_ext = batch.extensions.iter().all(|e| e.trim().is_empty());
        reset_if(
            &mut batch.extensions,
            defaults.batch.extensions.clone(),
            bad_ext,
            "batch.extensions",
            &mut fixes,
        );
        let name = batch.output_dir_name.trim();
        let bad_dir = name.is_empty() || name.contains(['/', '\\']) || name == "." || name == "..";
        reset_if(
            &mut batch.output_dir_name,
            defaults.batch.output_dir_name.clone(),
            bad_dir,
            "batch.output_dir_name",
            &mut fixes,
        );

        fixes
    }
}

fn reset_if<T: Debug>(field: &mut T, default: T, invalid: bool, name: &str, fixes: &mut Vec<String>) {
    if invalid {
        log::warn!(
            "config: invalid {} = {:?}, using default {:?}",
            name,
            field,
            default
        );
        *field = default;
        fixes.push(name.to_string());
    }
}

/// Flatten `overlay` into the leaf values that may replace entries of `base`.
/// Keys unknown to `base` or carrying a different type are dropped with a
/// warning.
fn collect_leaves(
    base: &toml::Value,
    overlay: toml::Value,
    path: &[String],
    leaves: &mut Vec<(Vec<String>, toml::Value)>,
) {
    use toml::Value;

    match (base, overlay) {
        (Value::Table(base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                let mut child = path.to_vec();
                child.push(key.clone());
                match base.get(&key) {
                    Some(slot) => collect_leaves(slot, value, &child, leaves),
                    None => log::warn!("config: ignoring unknown key {}", child.join(".")),
                }
            }
        }
        (slot, Value::Integer(i)) if slot.is_float() => {
            leaves.push((path.to_vec(), Value::Float(i as f64)))
        }
        (slot, value) if slot.same_type(&value) => leaves.push((path.to_vec(), value)),
        (slot, value) => log::warn!(
            "config: {} expects {}, got {}; keeping default",
            path.join("."),
            slot.type_str(),
            value.type_str()
        ),
    }
}

fn slot_mut<'a>(root: &'a mut toml::Value, path: &[String]) -> Option<&'a mut toml::Value> {
    path.iter().try_fold(root, |node, key| node.get_mut(key.as_str()))
}

/// Apply each user value on top of the defaults, keeping the default for any
/// value the typed config rejects (e.g. `format = "gif"`).
fn merge_values(merged: &mut toml::Value, user: toml::Value) {
    let mut leaves = Vec::new();
    collect_leaves(merged, user, &[], &mut leaves);

    for (path, value) in leaves {
        let Some(slot) = slot_mut(merged, &path) else {
            continue;
        };
        let previous = std::mem::replace(slot, value);
        if let Err(e) = merged.clone().try_into::<Config>() {
            log::warn!(
                "config: invalid value for {} ({}), keeping default",
                path.join("."),
                e
            );
            if let Some(slot) = slot_mut(merged, &path) {
                *slot = previous;
            }
        }
    }
}

/// Parse a TOML document on top of the defaults, then sanitize.
pub fn from_toml_str(raw: &str) -> Config {
    let user: toml::Value = match toml::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("config: could not parse ({}), using defaults", e);
            return Config::default();
        }
    };

    let mut merged = match toml::Value::try_from(Config::default()) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("config: could not serialize defaults ({}), using defaults", e);
            return Config::default();
        }
    };
    merge_values(&mut merged, user);

    let mut cfg: Config = match merged.try_into() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("config: invalid value ({}), using defaults", e);
            return Config::default();
        }
    };
    cfg.sanitize();
    cfg
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(from_toml_str(&raw))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(from_toml_str(""), Config::default());
    }

    #[test]
    fn nested_keys_merge_into_defaults() {
        let cfg = from_toml_str(
            r#"
            [output]
            width = 413

            [cropping.hair_ratio]
            base = 0.3
            "#,
        );
        assert_eq!(cfg.output.width, 413);
        assert_eq!(cfg.output.height, 450);
        assert_eq!(cfg.cropping.hair_ratio.base, 0.3);
        assert_eq!(cfg.cropping.hair_ratio.max, 0.35);
        assert_eq!(cfg.cropping.target_head_ratio, 0.75);
    }

    #[test]
    fn integer_promotes_to_float() {
        let cfg = from_toml_str("[cropping]\nchin_extra_ratio = 0\n");
        assert_eq!(cfg.cropping.chin_extra_ratio, 0.0);
    }

    #[test]
    fn wrong_type_keeps_default() {
        let cfg = from_toml_str("[output]\nwidth = \"wide\"\nheight = 500\n");
        assert_eq!(cfg.output.width, 360);
        assert_eq!(cfg.output.height, 500);
    }

    #[test]
    fn unparsable_file_falls_back() {
        assert_eq!(from_toml_str("this is = = not toml"), Config::default());
    }

    #[test]
    fn invalid_values_reset_individually() {
        let cfg = from_toml_str(
            r#"
            [output]
            quality = 0
            height = 600

            [cropping]
            target_head_ratio = 1.5
            target_top_margin = 0.1

            [cropping.hair_ratio]
            min = 0.5
            max = 0.2
            "#,
        );
        let defaults = Config::default();
        assert_eq!(cfg.output.quality, 95);
        assert_eq!(cfg.output.height, 600);
        assert_eq!(cfg.cropping.target_head_ratio, 0.75);
        assert_eq!(cfg.cropping.target_top_margin, 0.1);
        assert_eq!(cfg.cropping.hair_ratio, defaults.cropping.hair_ratio);
    }

    #[test]
    fn sanitize_reports_fixes() {
        let mut cfg = Config::default();
        cfg.detection.confidence_threshold = 2.0;
        cfg.batch.output_dir_name = "../out".into();
        let fixes = cfg.sanitize();
        assert_eq!(
            fixes,
            vec!["detection.confidence_threshold", "batch.output_dir_name"]
        );
        assert!(Config::default().sanitize().is_empty());
    }

    #[test]
    fn rejected_enum_keeps_the_rest_of_the_file() {
        let cfg = from_toml_str(
            r#"
            [output]
            format = "gif"
            width = 413
            quality = 80

            [batch]
            recursive = true
            "#,
        );
        assert_eq!(cfg.output.format, OutputFormat::Jpeg);
        assert_eq!(cfg.output.width, 413);
        assert_eq!(cfg.output.quality, 80);
        assert!(cfg.batch.recursive);
    }

    #[test]
    fn out_of_range_integer_keeps_default() {
        let cfg = from_toml_str("[output]\nwidth = -5\nheight = 500\n");
        assert_eq!(cfg.output.width, 360);
        assert_eq!(cfg.output.height, 500);
    }

    #[test]
    fn output_format_parses() {
        let cfg = from_toml_str("[output]\nformat = \"png\"\n");
        assert_eq!(cfg.output.format, OutputFormat::Png);
    }

    #[test]
    fn crop_config_carries_values() {
        let cfg = from_toml_str("[output]\nwidth = 300\nheight = 400\n");
        let crop = cfg.crop_config();
        assert_eq!((crop.output_width, crop.output_height), (300, 400));
        assert_eq!(crop.hair_thresholds, HairThresholds::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("idcrop.toml");
        let mut cfg = Config::default();
        cfg.batch.recursive = true;
        cfg.output.quality = 80;
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
