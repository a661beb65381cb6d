//! Compositing through feature derivation on synthetic Sentinel-2-like frames.

use approx::assert_relative_eq;
use geo_types::polygon;
use ndarray::Array2;
use surtland_algorithms::imagery::{
    composite, phenology_composites, stack_multi_year, stack_seasonal_features, CompositeParams, Reducer,
    SeasonalFeatureParams,
};
use surtland_algorithms::texture::{multiscale_texture, texture, GlcmParams};
use surtland_algorithms::timeseries::{fit_harmonic, HarmonicParams, HarmonicTarget};
use surtland_core::io::{read_geotiff_from_buffer, write_geotiff_to_buffer};
use surtland_core::raster::{ymd, DateWindow, FrameSequence, TemporalFrame};
use surtland_core::{Error, GeoTransform, Raster, Region, CRS};
use surtland_parallel::{ExecutionContext, ProcessingMode};

const BANDS: [&str; 6] = ["B2", "B3", "B4", "B8", "B11", "B12"];

/// Digital counts; NIR is higher in the wet season
fn frame(year: i32, month: u32, nir: f64, qa: impl Fn(usize, usize) -> f64) -> TemporalFrame {
    let mut raster = Raster::new(6, 6)
        .with_transform(GeoTransform::new(300_000.0, 1_200_060.0, 10.0, -10.0))
        .with_crs(CRS::utm(16, true));
    for band in BANDS {
        let value = match band {
            "B8" => nir,
            "B4" => 800.0,
            "B3" => 900.0,
            _ => 1200.0,
        };
        raster
            .push_band(band, Array2::from_shape_fn((6, 6), |(r, c)| value + (r * 6 + c) as f64))
            .unwrap();
    }
    raster.push_band("QA60", Array2::from_shape_fn((6, 6), |(r, c)| qa(r, c))).unwrap();
    TemporalFrame::on_date(raster, ymd(year, month, 15).unwrap(), 0.1)
}

fn clear(_: usize, _: usize) -> f64 {
    0.0
}

fn year_of_frames(year: i32) -> Vec<TemporalFrame> {
    vec![
        frame(year, 2, 2400.0, clear),
        frame(year, 3, 2600.0, |r, _| if r == 0 { 2048.0 } else { 0.0 }),
        frame(year, 4, 2500.0, clear),
        frame(year, 7, 4000.0, clear),
        frame(year, 9, 4200.0, clear),
    ]
}

#[test]
fn seasonal_feature_stack() {
    let frames: FrameSequence = year_of_frames(2024).into_iter().collect();
    let ctx = ExecutionContext::default().with_tile_rows(2);
    let (dry, wet) = phenology_composites(&frames, 2024, &CompositeParams::default(), &ctx).unwrap();

    // median of 2400/2600/2500 (row 0 drops the cirrus-flagged frame)
    assert_relative_eq!(dry.band("B8").unwrap()[(1, 0)], (2500.0 + 6.0) / 10_000.0, epsilon = 1e-12);
    assert_relative_eq!(dry.band("B8").unwrap()[(0, 0)], 2450.0 / 10_000.0, epsilon = 1e-12);
    assert!(!dry.has_band("QA60"));

    let features = stack_seasonal_features(&dry, &wet, &SeasonalFeatureParams::default()).unwrap();
    assert_eq!(features.band_count(), 12);
    let diff = features.band("NDVI_diff").unwrap()[(2, 2)];
    assert!(diff > 0.0, "wet season should be greener, diff = {}", diff);
    for v in features.band("NDVI_dry").unwrap().iter() {
        assert!((-1.0..=1.0).contains(v));
    }
}

#[test]
fn multi_year_stack_and_export() {
    let frames: FrameSequence = year_of_frames(2020).into_iter().chain(year_of_frames(2024)).collect();
    let ctx = ExecutionContext::sequential();
    let params = CompositeParams {
        bands: Some(vec!["B4".into(), "B8".into()]),
        ..Default::default()
    };
    let composites: Vec<Raster> = [2020, 2024]
        .iter()
        .map(|&y| composite(&frames, &DateWindow::year(y).unwrap(), &params, &ctx).unwrap())
        .collect();
    let stack = stack_multi_year(&composites, &[2020, 2024]).unwrap();
    assert_eq!(stack.band_names(), vec!["B4_2020", "B8_2020", "B4_2024", "B8_2024"]);

    let bytes = write_geotiff_to_buffer(&stack, None).unwrap();
    let back = read_geotiff_from_buffer(&bytes).unwrap();
    assert_eq!(back.band_names(), stack.band_names());
    assert!(back.transform().is_aligned_with(stack.transform()));
    assert_relative_eq!(
        back.band("B8_2024").unwrap()[(3, 3)],
        stack.band("B8_2024").unwrap()[(3, 3)],
        epsilon = 1e-6
    );
}

#[test]
fn region_filter_drops_frames_outside_footprint() {
    let frames: FrameSequence = year_of_frames(2024).into_iter().collect();
    let far_away = Region::polygon(polygon![
        (x: 0.0, y: 0.0),
        (x: 10.0, y: 0.0),
        (x: 10.0, y: 10.0),
        (x: 0.0, y: 10.0),
    ]);
    let params = CompositeParams {
        region: Some(far_away),
        ..Default::default()
    };
    let err = composite(&frames, &DateWindow::year(2024).unwrap(), &params, &ExecutionContext::sequential())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyCollection { .. }));
}

#[test]
fn constant_band_texture_is_flat() {
    let raster = Raster::filled(12, 12, "B8", 0.25);
    let ctx = ExecutionContext::default().with_mode(ProcessingMode::ParallelWith(2)).with_tile_rows(3);
    let out = texture(&raster, &["B8"], &GlcmParams { radius: 2, ..Default::default() }, &ctx).unwrap();
    assert!(out.band("B8_contrast").unwrap().iter().all(|&v| v == 0.0));
    assert!(out.band("B8_ent").unwrap().iter().all(|&v| v == 0.0));

    let multi = multiscale_texture(&raster, "B8", &[1, 3], &GlcmParams::default(), &ctx).unwrap();
    assert!(multi.band("texture_entropy_r3").unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn harmonic_fit_needs_four_observations() {
    let frames: FrameSequence = year_of_frames(2024).into_iter().take(3).collect();
    let masked = frames
        .iter()
        .map(|f| f.with_raster(surtland_algorithms::imagery::mask_sentinel2_clouds(f, &Default::default()).unwrap()))
        .collect::<FrameSequence>();
    let out = fit_harmonic(
        &masked,
        ymd(2024, 1, 1).unwrap(),
        &HarmonicTarget::ndvi(),
        &HarmonicParams::default(),
        &ExecutionContext::default(),
    )
    .unwrap();
    for band in ["constant", "t", "cos", "sin", "rmse"] {
        assert!(out.band(band).unwrap().iter().all(|v| v.is_nan()), "{}", band);
    }
}

#[test]
fn composite_all_reducers_agree_on_masking() {
    let cloudy = |r: usize, c: usize| if r == 5 && c == 5 { 1024.0 } else { 0.0 };
    let frames: FrameSequence = vec![frame(2024, 2, 2400.0, cloudy), frame(2024, 3, 2600.0, cloudy)]
        .into_iter()
        .collect();
    for reducer in [Reducer::Median, Reducer::Mean, Reducer::Max, Reducer::StdDev, Reducer::Percentile(10.0)] {
        let params = CompositeParams {
            reducer,
            ..Default::default()
        };
        let out = composite(&frames, &DateWindow::year(2024).unwrap(), &params, &ExecutionContext::sequential())
            .unwrap();
        assert!(!out.is_pixel_valid(5, 5));
        assert!(out.is_pixel_valid(0, 0));
    }
}
