//! End-to-end detection scenarios over small synthetic stacks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use slice_printability::{
    detect_issues, drill_suction_cups, BorderFollower, CancelToken, DetectionConfig, IssueType,
    NullProgress, ProgressSink, Raster, SliceStack, Witness,
};

fn block(raster: &mut Raster, x0: i32, y0: i32, w: i32, h: i32, value: u8) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            raster.set_pixel(x, y, value);
        }
    }
}

/// 32x32 layer fully solid over the 24x24 model footprint.
fn solid() -> Raster {
    let mut r = Raster::new(32, 32);
    block(&mut r, 4, 4, 24, 24, 255);
    r
}

/// Same footprint with a hollow 12x12 interior.
fn shell() -> Raster {
    let mut r = solid();
    block(&mut r, 10, 10, 12, 12, 0);
    r
}

/// Shell with a 2px channel connecting the interior to the exterior.
fn breached_shell() -> Raster {
    let mut r = shell();
    block(&mut r, 4, 14, 6, 2, 0);
    r
}

fn air_only_config() -> DetectionConfig {
    let mut config = DetectionConfig::all_disabled();
    config.resin_trap.enabled = true;
    config
}

fn run(stack: &SliceStack, config: &DetectionConfig) -> slice_printability::DetectionReport {
    init_logging();
    detect_issues(stack, &BorderFollower, config, &NullProgress, &CancelToken::new()).unwrap()
}

// Override with RUST_LOG (e.g. RUST_LOG=slice_printability=debug).
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scenario: a fully sealed void spanning layers 40-60.
#[test]
fn test_sealed_void_reports_one_resin_trap() {
    let layers: Vec<Raster> = (0..100)
        .map(|i| if (40..=60).contains(&i) { shell() } else { solid() })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let report = run(&stack, &air_only_config());
    assert!(!report.cancelled);
    assert_eq!(report.issues.len(), 1);
    let trap = &report.issues[0];
    assert_eq!(trap.issue_type, IssueType::ResinTrap);
    assert_eq!(trap.start_layer_index, 40);
    assert_eq!(trap.end_layer_index, 60);
    assert_eq!(trap.issues.len(), 21);
}

/// Scenario: the same void vents to the exterior on its top layer, so the
/// whole span reclassifies as a suction cup and no trap remains.
#[test]
fn test_top_vented_void_reclassifies_to_suction_cup() {
    let layers: Vec<Raster> = (0..100)
        .map(|i| match i {
            40..=59 => shell(),
            60 => breached_shell(),
            _ => solid(),
        })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let report = run(&stack, &air_only_config());
    assert!(report
        .issues
        .iter()
        .all(|issue| issue.issue_type != IssueType::ResinTrap));
    let cups: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.issue_type == IssueType::SuctionCup)
        .collect();
    assert_eq!(cups.len(), 1);
    assert_eq!(cups[0].start_layer_index, 40);
    assert_eq!(cups[0].end_layer_index, 59);
    // 20 layers of 0.05mm clear the default 0.5mm height minimum.
    assert!(cups[0].total_height >= 0.5);
}

/// Scenario: a 50px component with zero support below is one island with
/// all 50 pixels as witnesses.
#[test]
fn test_unsupported_blob_is_island_with_full_witness_set() {
    let mut base = Raster::new(32, 32);
    block(&mut base, 2, 2, 8, 8, 255);
    let mut top = base.clone();
    block(&mut top, 16, 16, 10, 5, 255); // 50px, floating

    let layers = vec![base.clone(), base.clone(), base.clone(), base.clone(), base, top];
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let mut config = DetectionConfig::all_disabled();
    config.island.enabled = true;
    config.island.enhanced_detection = false;

    let report = run(&stack, &config);
    assert_eq!(report.issues.len(), 1);
    let island = &report.issues[0];
    assert_eq!(island.issue_type, IssueType::Island);
    assert_eq!(island.start_layer_index, 5);
    assert_eq!(island.area_px, 50);
    match &island.issues[0].witness {
        Witness::Points(points) => assert_eq!(points.len(), 50),
        other => panic!("expected point witnesses, got {other:?}"),
    }
}

/// Scenario: an all-empty stack yields exactly one empty-layer issue per
/// layer and nothing else.
#[test]
fn test_all_empty_stack() {
    let stack = SliceStack::from_layers(vec![Raster::new(16, 16); 7], 0.05, 150.0);
    let report = run(&stack, &DetectionConfig::default());
    assert_eq!(report.issues.len(), 7);
    for (i, issue) in report.issues.iter().enumerate() {
        assert_eq!(issue.issue_type, IssueType::EmptyLayer);
        assert_eq!(issue.start_layer_index, i as u32);
    }
}

/// Progress sink that fires a cancellation token after a fixed number of
/// steps.
struct CancelAfter {
    token: CancelToken,
    after: u32,
    seen: AtomicU32,
}

impl ProgressSink for CancelAfter {
    fn reset(&self, _label: &str, _total: u32, _start: u32) {}

    fn increment(&self) {
        if self.seen.fetch_add(1, Ordering::Relaxed) + 1 >= self.after {
            self.token.cancel();
        }
    }
}

/// Scenario: cancellation mid-run returns a partial report, not an error.
#[test]
fn test_cancellation_yields_partial_report() {
    let layers: Vec<Raster> = (0..100)
        .map(|i| if (40..=60).contains(&i) { shell() } else { solid() })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let token = CancelToken::new();
    let progress = CancelAfter {
        token: token.clone(),
        after: 30,
        seen: AtomicU32::new(0),
    };
    let report =
        detect_issues(&stack, &BorderFollower, &DetectionConfig::default(), &progress, &token)
            .unwrap();
    assert!(report.cancelled);
    // The sweep never finished, so no void classification is reported.
    assert!(report.issues.iter().all(|issue| !issue.is_air_issue()));
}

/// Progress sink that fires the token a few steps into the
/// area-interpolation phase, after the sweep has fully classified.
struct CancelDuringInterpolation {
    token: CancelToken,
    in_phase: AtomicBool,
    seen: AtomicU32,
}

impl ProgressSink for CancelDuringInterpolation {
    fn reset(&self, label: &str, _total: u32, _start: u32) {
        self.in_phase
            .store(label.starts_with("Interpolating"), Ordering::Relaxed);
    }

    fn increment(&self) {
        if self.in_phase.load(Ordering::Relaxed)
            && self.seen.fetch_add(1, Ordering::Relaxed) + 1 >= 5
        {
            self.token.cancel();
        }
    }
}

/// Scenario: cancellation during interpolation drops the half-built groups
/// instead of reporting a truncated span.
#[test]
fn test_cancellation_during_interpolation_drops_partial_groups() {
    let layers: Vec<Raster> = (0..100)
        .map(|i| if (40..=60).contains(&i) { shell() } else { solid() })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let token = CancelToken::new();
    let progress = CancelDuringInterpolation {
        token: token.clone(),
        in_phase: AtomicBool::new(false),
        seen: AtomicU32::new(0),
    };
    let report =
        detect_issues(&stack, &BorderFollower, &air_only_config(), &progress, &token).unwrap();
    assert!(report.cancelled);
    assert!(report.issues.is_empty());
}

/// A void whose group reaches layer 0 drains when the print lifts off the
/// plate and is never a resin trap.
#[test]
fn test_plate_adjacent_void_not_reported() {
    let mut layers = vec![shell(); 5];
    layers.push(solid());
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);

    let report = run(&stack, &air_only_config());
    assert!(report
        .issues
        .iter()
        .all(|issue| issue.issue_type != IssueType::ResinTrap));
}

/// A side-open void is air-connected in pass 1 and stays that way.
#[test]
fn test_side_open_void_never_classified() {
    let layers = vec![breached_shell(); 10];
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);
    let report = run(&stack, &air_only_config());
    assert!(report.issues.is_empty());
}

/// Two identical runs produce identical, order-stable reports.
#[test]
fn test_detection_is_idempotent() {
    let layers: Vec<Raster> = (0..60)
        .map(|i| match i {
            20..=29 => shell(),
            30 => breached_shell(),
            _ => solid(),
        })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);
    let config = DetectionConfig::default();

    let first = run(&stack, &config);
    let second = run(&stack, &config);
    assert_eq!(first.issues.len(), second.issues.len());
    for (a, b) in first.issues.iter().zip(&second.issues) {
        assert_eq!(a, b);
    }
}

/// Suction cups from a full run receive a drill point inside the void.
#[test]
fn test_drill_vents_detected_suction_cups() {
    let layers: Vec<Raster> = (0..40)
        .map(|i| match i {
            10..=24 => shell(),
            25 => breached_shell(),
            _ => solid(),
        })
        .collect();
    let stack = SliceStack::from_layers(layers, 0.05, 150.0);
    let report = run(&stack, &air_only_config());

    let (drilled, ops) = drill_suction_cups(&report.issues, 4, &NullProgress);
    assert_eq!(drilled.len(), 1);
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].layer_index, 10);
    // The interior spans 10..22 in frame coordinates.
    assert!((10..22).contains(&ops[0].center.x));
    assert!((10..22).contains(&ops[0].center.y));
}
