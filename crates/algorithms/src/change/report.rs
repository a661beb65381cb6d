//! Change report assembly
//!
//! Combines per-class areas, the transition matrix, forest loss and
//! agricultural expansion into one immutable [`ChangeReport`] per
//! (t1, t2, region) triple. Class names and the forest class set come from
//! an explicit [`ReportConfig`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use surtland_core::raster::{ClassificationRaster, Raster};
use surtland_core::{Error, Region, Result};
use surtland_parallel::ExecutionContext;
use tracing::debug;

use super::matrix::{build_matrix, class_mask, forest_loss, round2, transition_mask, MAX_CLASS_CODE};
use crate::statistics::{area_hectares, focal_intensity, region_area_hectares};

/// One entry of the class-name table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub code: u8,
    pub name: String,
}

fn default_hotspot_radius() -> f64 {
    500.0
}

/// Report configuration, typically loaded from TOML:
///
/// ```toml
/// year1 = 2019
/// year2 = 2024
/// forest_classes = [1, 2]
/// agriculture_class = 4
///
/// [[classes]]
/// code = 1
/// name = "Primary Forest"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub year1: i32,
    pub year2: i32,
    pub classes: Vec<ClassEntry>,
    pub forest_classes: BTreeSet<u8>,
    pub agriculture_class: u8,
    /// Radius of the hotspot kernel in meters
    #[serde(default = "default_hotspot_radius")]
    pub hotspot_radius_m: f64,
}

impl ReportConfig {
    /// Class-name table keyed by code
    pub fn class_names(&self) -> BTreeMap<u8, String> {
        self.classes.iter().map(|c| (c.code, c.name.clone())).collect()
    }

    /// Name of a class, or `class <code>` when it has none
    pub fn class_name(&self, code: u8) -> String {
        self.classes
            .iter()
            .find(|c| c.code == code)
            .map_or_else(|| format!("class {}", code), |c| c.name.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.year2 < self.year1 {
            return Err(Error::invalid_parameter(
                "year2",
                self.year2,
                format!("must not precede year1 ({})", self.year1),
            ));
        }
        let codes = self
            .classes
            .iter()
            .map(|c| c.code)
            .chain(self.forest_classes.iter().copied())
            .chain(std::iter::once(self.agriculture_class));
        for code in codes {
            if code > MAX_CLASS_CODE {
                return Err(Error::invalid_parameter("class code", code, "must be in [0, 9]"));
            }
        }
        let mut seen = BTreeSet::new();
        for c in &self.classes {
            if !seen.insert(c.code) {
                return Err(Error::invalid_parameter("classes", c.code, "duplicate class code"));
            }
        }
        Ok(())
    }
}

/// Area of one class at both dates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAreaChange {
    pub class: String,
    pub code: u8,
    pub t1_ha: f64,
    pub t2_ha: f64,
    pub change_ha: f64,
    /// `change / t1 * 100`; exactly 0 when the t1 area is 0
    pub percent_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyTransitions {
    pub forest_loss_ha: f64,
    /// `<forest name>_to_<target name>_ha` per forest class, plus the total
    pub agricultural_expansion: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_study_area_ha: f64,
    /// Forest loss as a share of the study area; 0 when the area is 0
    pub forest_loss_percent: f64,
    pub period_years: i32,
}

/// Land-cover change between two dates, at full precision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeReport {
    pub year1: i32,
    pub year2: i32,
    pub area_changes: Vec<ClassAreaChange>,
    pub key_transitions: KeyTransitions,
    pub summary: ReportSummary,
}

impl ChangeReport {
    /// `"Y1-Y2"`
    pub fn period(&self) -> String {
        format!("{}-{}", self.year1, self.year2)
    }

    /// Nested presentation map with numbers rounded to 2 decimals:
    /// `{period, area_changes: {name: {Y1_ha, Y2_ha, change_ha, percent_change}},
    /// key_transitions, summary}`
    pub fn to_presentation(&self) -> Value {
        let mut changes = Map::new();
        for c in &self.area_changes {
            changes.insert(
                c.class.clone(),
                json!({
                    format!("{}_ha", self.year1): round2(c.t1_ha),
                    format!("{}_ha", self.year2): round2(c.t2_ha),
                    "change_ha": round2(c.change_ha),
                    "percent_change": round2(c.percent_change),
                }),
            );
        }

        let expansion: Map<String, Value> = self
            .key_transitions
            .agricultural_expansion
            .iter()
            .map(|(k, v)| (k.clone(), json!(round2(*v))))
            .collect();

        json!({
            "period": self.period(),
            "area_changes": changes,
            "key_transitions": {
                "forest_loss_ha": round2(self.key_transitions.forest_loss_ha),
                "agricultural_expansion": expansion,
            },
            "summary": {
                "total_study_area_ha": round2(self.summary.total_study_area_ha),
                "forest_loss_percent": round2(self.summary.forest_loss_percent),
                "period_years": self.summary.period_years,
            },
        })
    }
}

/// Percent change with the zero-baseline convention: 0 when `t1` is 0
pub fn percent_change(t1: f64, t2: f64) -> f64 {
    if t1 == 0.0 { 0.0 } else { (t2 - t1) / t1 * 100.0 }
}

/// Builds change reports and hotspot surfaces for one pair of
/// classifications over one region.
pub struct ChangeReportAssembler<'a> {
    t1: &'a ClassificationRaster,
    t2: &'a ClassificationRaster,
    config: &'a ReportConfig,
    region: &'a Region,
}

impl<'a> ChangeReportAssembler<'a> {
    pub fn new(
        t1: &'a ClassificationRaster,
        t2: &'a ClassificationRaster,
        config: &'a ReportConfig,
        region: &'a Region,
    ) -> Self {
        Self { t1, t2, config, region }
    }

    /// Assemble the report.
    ///
    /// # Errors
    /// `GeometryMismatch`, `CodeRange` or `InvalidParameter` for misaligned
    /// inputs, unencodable codes or an invalid configuration.
    pub fn assemble(&self, ctx: &ExecutionContext) -> Result<ChangeReport> {
        let config = self.config;
        config.validate()?;
        let matrix = build_matrix(self.t1, self.t2)?;

        let mut area_changes = Vec::with_capacity(config.classes.len());
        for entry in &config.classes {
            let t1_ha = area_hectares(&class_mask(self.t1, entry.code)?, self.region, ctx)?.hectares;
            let t2_ha = area_hectares(&class_mask(self.t2, entry.code)?, self.region, ctx)?.hectares;
            area_changes.push(ClassAreaChange {
                class: entry.name.clone(),
                code: entry.code,
                t1_ha,
                t2_ha,
                change_ha: t2_ha - t1_ha,
                percent_change: percent_change(t1_ha, t2_ha),
            });
        }

        let loss = forest_loss(self.t1, self.t2, &config.forest_classes)?;
        let forest_loss_ha = area_hectares(&loss, self.region, ctx)?.hectares;

        let target = config.agriculture_class;
        let target_name = config.class_name(target);
        let mut agricultural_expansion = BTreeMap::new();
        let mut total = 0.0;
        for &forest in config.forest_classes.iter().filter(|&&f| f != target) {
            let ha = area_hectares(&transition_mask(&matrix, forest, target)?, self.region, ctx)?.hectares;
            agricultural_expansion.insert(format!("{}_to_{}_ha", config.class_name(forest), target_name), ha);
            total += ha;
        }
        agricultural_expansion.insert(format!("Total_Forest_to_{}_ha", target_name), total);

        let total_study_area_ha = region_area_hectares(self.t1.raster(), self.region, ctx)?;
        let forest_loss_percent = if total_study_area_ha > 0.0 {
            forest_loss_ha / total_study_area_ha * 100.0
        } else {
            0.0
        };

        debug!(
            classes = area_changes.len(),
            forest_loss_ha,
            total_study_area_ha,
            "assembled change report"
        );

        Ok(ChangeReport {
            year1: config.year1,
            year2: config.year2,
            area_changes,
            key_transitions: KeyTransitions {
                forest_loss_ha,
                agricultural_expansion,
            },
            summary: ReportSummary {
                total_study_area_ha,
                forest_loss_percent,
                period_years: config.year2 - config.year1,
            },
        })
    }

    /// Hotspot intensity (0-1) of forest loss within `radius_m` meters
    pub fn hotspots(&self, radius_m: f64, ctx: &ExecutionContext) -> Result<Raster> {
        let loss = forest_loss(self.t1, self.t2, &self.config.forest_classes)?;
        let intensity = focal_intensity(&loss, radius_m, ctx)?;
        intensity.rename_bands(|_| "hotspot_intensity".to_string())
    }
}

/// Assemble a change report in one call
pub fn assemble_change_report(
    t1: &ClassificationRaster,
    t2: &ClassificationRaster,
    config: &ReportConfig,
    region: &Region,
    ctx: &ExecutionContext,
) -> Result<ChangeReport> {
    ChangeReportAssembler::new(t1, t2, config, region).assemble(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use surtland_core::GeoTransform;

    fn config() -> ReportConfig {
        toml::from_str(
            r#"
            year1 = 2019
            year2 = 2024
            forest_classes = [1, 2]
            agriculture_class = 4

            [[classes]]
            code = 1
            name = "Primary Forest"

            [[classes]]
            code = 2
            name = "Secondary Forest"

            [[classes]]
            code = 4
            name = "Agriculture"

            [[classes]]
            code = 5
            name = "Water"
            "#,
        )
        .unwrap()
    }

    fn classes(codes: Vec<u8>) -> ClassificationRaster {
        ClassificationRaster::from_codes("class", Array2::from_shape_vec((2, 3), codes).unwrap())
            .with_georef(GeoTransform::new(0.0, 20.0, 10.0, -10.0), None)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::sequential()
    }

    #[test]
    fn test_percent_change_zero_baseline() {
        assert_eq!(percent_change(0.0, 12.5), 0.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_relative_eq!(percent_change(2.0, 3.0), 50.0);
    }

    #[test]
    fn test_report_values() {
        // 100 m² pixels = 0.01 ha
        let t1 = classes(vec![1, 1, 1, 2, 2, 4]);
        let t2 = classes(vec![1, 4, 4, 2, 4, 4]);
        let report = assemble_change_report(&t1, &t2, &config(), &Region::Extent, &ctx()).unwrap();

        let forest = &report.area_changes[0];
        assert_eq!(forest.class, "Primary Forest");
        assert_relative_eq!(forest.t1_ha, 0.03);
        assert_relative_eq!(forest.t2_ha, 0.01);
        assert_relative_eq!(forest.percent_change, -2.0 / 3.0 * 100.0, epsilon = 1e-9);

        let water = &report.area_changes[3];
        assert_eq!(water.percent_change, 0.0);

        assert_relative_eq!(report.key_transitions.forest_loss_ha, 0.03);
        let ag = &report.key_transitions.agricultural_expansion;
        assert_relative_eq!(ag["Primary Forest_to_Agriculture_ha"], 0.02);
        assert_relative_eq!(ag["Secondary Forest_to_Agriculture_ha"], 0.01);
        assert_relative_eq!(ag["Total_Forest_to_Agriculture_ha"], 0.03);

        assert_relative_eq!(report.summary.total_study_area_ha, 0.06);
        assert_relative_eq!(report.summary.forest_loss_percent, 50.0, epsilon = 1e-9);
        assert_eq!(report.summary.period_years, 5);
    }

    #[test]
    fn test_presentation_shape() {
        let t1 = classes(vec![1, 1, 1, 2, 2, 4]);
        let t2 = classes(vec![1, 4, 4, 2, 4, 4]);
        let value = assemble_change_report(&t1, &t2, &config(), &Region::Extent, &ctx())
            .unwrap()
            .to_presentation();
        assert_eq!(value["period"], json!("2019-2024"));
        assert_eq!(value["area_changes"]["Primary Forest"]["2019_ha"], json!(0.03));
        assert_eq!(value["area_changes"]["Primary Forest"]["percent_change"], json!(-66.67));
        assert_eq!(value["summary"]["period_years"], json!(5));
    }

    #[test]
    fn test_empty_region_gives_zero_percent() {
        let t1 = classes(vec![1; 6]);
        let t2 = classes(vec![4; 6]);
        let region = Region::rectangle(1000.0, 1000.0, 2000.0, 2000.0);
        let report = assemble_change_report(&t1, &t2, &config(), &region, &ctx()).unwrap();
        assert_eq!(report.summary.total_study_area_ha, 0.0);
        assert_eq!(report.summary.forest_loss_percent, 0.0);
    }

    #[test]
    fn test_invalid_config() {
        let mut cfg = config();
        cfg.year2 = 2010;
        let t = classes(vec![1; 6]);
        assert!(matches!(
            assemble_change_report(&t, &t, &cfg, &Region::Extent, &ctx()),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_hotspots() {
        let t1 = classes(vec![1; 6]);
        let t2 = classes(vec![4, 1, 1, 1, 1, 1]);
        let cfg = config();
        let region = Region::Extent;
        let assembler = ChangeReportAssembler::new(&t1, &t2, &cfg, &region);
        let hot = assembler.hotspots(10.0, &ctx()).unwrap();
        let band = hot.band("hotspot_intensity").unwrap();
        // (0,0) neighbors inside the raster: itself, (0,1), (1,0)
        assert_relative_eq!(band[(0, 0)], 1.0 / 3.0);
        assert_relative_eq!(band[(1, 2)], 0.0);
    }
}
