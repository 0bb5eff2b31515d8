//! Print-production gate for [`LayoutSpec`]s.
//!
//! Checks run in a fixed order (page size, colour space, resolution, bleed)
//! and stop at the first failure, so an invalid spec always maps to exactly
//! one [`ValidationError`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{ColorSpace, LayoutSpec, PaperSize};

/// Thresholds the validator enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub standard_format: PaperSize,
    pub production_color_space: ColorSpace,
    pub min_resolution_dpi: u32,
    pub min_bleed_mm: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            standard_format: PaperSize::A4,
            production_color_space: ColorSpace::Cmyk,
            min_resolution_dpi: 300,
            min_bleed_mm: 3.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayoutValidator {
    config: ValidatorConfig,
}

impl LayoutValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn validate(&self, spec: &LayoutSpec) -> Result<(), ValidationError> {
        let cfg = &self.config;

        if spec.paper_size != cfg.standard_format {
            return Err(ValidationError::UnsupportedPageSize {
                found: spec.paper_size,
                expected: cfg.standard_format,
            });
        }
        if spec.color_space != cfg.production_color_space {
            return Err(ValidationError::UnsupportedColorSpace {
                found: spec.color_space,
                expected: cfg.production_color_space,
            });
        }
        if spec.resolution < cfg.min_resolution_dpi {
            return Err(ValidationError::InsufficientResolution {
                found: spec.resolution,
                required: cfg.min_resolution_dpi,
            });
        }
        if !spec.bleed_mm.is_finite() || spec.bleed_mm < cfg.min_bleed_mm {
            return Err(ValidationError::InsufficientBleed {
                found_mm: spec.bleed_mm,
                required_mm: cfg.min_bleed_mm,
            });
        }
        Ok(())
    }
}
