use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::PredictorError;
use crate::features::{FeatureWindow, FEATURE_COUNT, FEATURE_NAMES, WINDOW_LEN};
use crate::scaler::ScaleBounds;

/// Anything that maps a scaled `(6, 27)` window to a normalized volume.
pub trait VolumePredictor: Send + Sync {
    fn predict(&self, scaled: &FeatureWindow) -> Result<f32, PredictorError>;
}

/// Real-world range the model's [0, 1] output is stretched back onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    pub min: f32,
    pub max: f32,
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            min: 1000.0,
            max: 2000.0,
        }
    }
}

impl VolumeRange {
    /// Vehicles/hour, truncated toward zero. Not clipped.
    pub fn denormalize(&self, raw: f32) -> i32 {
        (raw * (self.max - self.min) + self.min) as i32
    }
}

fn default_window() -> usize {
    WINDOW_LEN
}

fn default_volume_min() -> f32 {
    VolumeRange::default().min
}

fn default_volume_max() -> f32 {
    VolumeRange::default().max
}

/// Sidecar JSON shipped next to the model artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMeta {
    pub feat_list: Vec<String>,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_volume_min")]
    pub volume_min: f32,
    #[serde(default = "default_volume_max")]
    pub volume_max: f32,
    #[serde(default)]
    pub feature_min: Option<Vec<f32>>,
    #[serde(default)]
    pub feature_max: Option<Vec<f32>>,
}

impl Default for ModelMeta {
    fn default() -> Self {
        Self {
            feat_list: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            window: WINDOW_LEN,
            volume_min: default_volume_min(),
            volume_max: default_volume_max(),
            feature_min: None,
            feature_max: None,
        }
    }
}

impl ModelMeta {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PredictorError> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path).map_err(|e| {
            PredictorError::Meta(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&txt)
    }

    pub fn from_json(txt: &str) -> Result<Self, PredictorError> {
        let meta: Self = serde_json::from_str(txt)
            .map_err(|e| PredictorError::Meta(format!("failed to parse meta JSON: {}", e)))?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<(), PredictorError> {
        if self.feat_list.len() != FEATURE_COUNT {
            return Err(PredictorError::Meta(format!(
                "feat_list has {} entries, the assembler produces {}",
                self.feat_list.len(),
                FEATURE_COUNT
            )));
        }
        if self.window != WINDOW_LEN {
            return Err(PredictorError::Meta(format!(
                "window {} != {}",
                self.window, WINDOW_LEN
            )));
        }
        if self.volume_max <= self.volume_min {
            return Err(PredictorError::Meta(format!(
                "volume range {}..{} is empty",
                self.volume_min, self.volume_max
            )));
        }
        let renamed: Vec<_> = self
            .feat_list
            .iter()
            .zip(FEATURE_NAMES)
            .filter(|(got, want)| got.as_str() != *want)
            .collect();
        if !renamed.is_empty() {
            tracing::warn!(
                "feat_list differs from assembler order at {} positions; first: {:?}",
                renamed.len(),
                renamed[0]
            );
        }
        Ok(())
    }

    /// Bounds from the meta file when both vectors are present, built-in
    /// bounds otherwise.
    pub fn scale_bounds(&self) -> Result<ScaleBounds, PredictorError> {
        match (&self.feature_min, &self.feature_max) {
            (Some(min), Some(max)) => ScaleBounds::from_slices(min, max),
            (None, None) => Ok(ScaleBounds::default()),
            _ => Err(PredictorError::Meta(
                "feature_min and feature_max must be given together".into(),
            )),
        }
    }

    pub fn volume_range(&self) -> VolumeRange {
        VolumeRange {
            min: self.volume_min,
            max: self.volume_max,
        }
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchPredictor;

#[cfg(feature = "torch")]
mod torch {
    use anyhow::{bail, Context, Result};
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::VolumePredictor;
    use crate::error::PredictorError;
    use crate::features::{FeatureWindow, FEATURE_COUNT, WINDOW_LEN};

    const INPUT_SHAPE: [i64; 3] = [1, WINDOW_LEN as i64, FEATURE_COUNT as i64];

    /// TorchScript export of the sequence model, run on CPU.
    pub struct TorchPredictor {
        model: CModule,
        device: Device,
    }

    impl TorchPredictor {
        pub fn load(model_path: &str) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path))?;

            // Probe output shape with a dummy forward; expect a single value
            let dummy = Tensor::zeros(INPUT_SHAPE, (Kind::Float, device));
            let t = tch::no_grad(|| model.forward_ts(&[dummy]))?;
            if t.numel() != 1 {
                bail!("unexpected model output size: {:?}", t.size());
            }
            Ok(Self { model, device })
        }
    }

    impl VolumePredictor for TorchPredictor {
        fn predict(&self, scaled: &FeatureWindow) -> Result<f32, PredictorError> {
            let input = Tensor::from_slice(&scaled.to_flat())
                .reshape(INPUT_SHAPE)
                .to_device(self.device);
            let t = tch::no_grad(|| self.model.forward_ts(&[input]))
                .map_err(|e| PredictorError::Inference(e.to_string()))?;
            let got = t.numel();
            if got != 1 {
                return Err(PredictorError::OutputShape { got });
            }
            Ok(t.reshape([-1]).double_value(&[0]) as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denormalize_endpoints() {
        let r = VolumeRange::default();
        assert_eq!(r.denormalize(0.0), 1000);
        assert_eq!(r.denormalize(1.0), 2000);
        assert_eq!(r.denormalize(0.3499), 1349);
        // no clipping
        assert_eq!(r.denormalize(1.2), 2200);
        assert_eq!(r.denormalize(-0.25), 750);
    }

    #[test]
    fn test_meta_defaults_and_bounds() {
        let names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let txt = serde_json::json!({ "feat_list": names }).to_string();
        let meta = ModelMeta::from_json(&txt).unwrap();
        assert_eq!(meta.window, 6);
        assert_eq!(meta.volume_range(), VolumeRange::default());
        assert_eq!(meta.scale_bounds().unwrap(), ScaleBounds::default());
    }

    #[test]
    fn test_meta_rejects_wrong_feature_count() {
        let txt = r#"{ "feat_list": ["a", "b"] }"#;
        assert!(matches!(
            ModelMeta::from_json(txt),
            Err(PredictorError::Meta(_))
        ));
    }

    #[test]
    fn test_meta_requires_paired_bounds() {
        let mut meta = ModelMeta::default();
        meta.feature_min = Some(vec![0.0; FEATURE_COUNT]);
        assert!(meta.scale_bounds().is_err());
        meta.feature_max = Some(vec![2.0; FEATURE_COUNT]);
        let b = meta.scale_bounds().unwrap();
        assert_eq!(b.max()[0], 2.0);
    }
}
