//! Detection entry point and issue aggregation.

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use tracing::info;

use crate::airflow::{sweep_air_connectivity, AirSweepResult};
use crate::bounds::{PixelPoint, PixelRect};
use crate::config::DetectionConfig;
use crate::contour::ContourExtractor;
use crate::error::DetectResult;
use crate::groups::{HollowRegion, TemporalGroups};
use crate::issues::{Issue, IssueType, MainIssue};
use crate::progress::{CancelToken, ProgressSink};
use crate::scanner::scan_layers;
use crate::stack::{round_height, CrossSectionSource, LayerMeta};

/// Outcome of one detection run.
///
/// A cancelled run is a valid, possibly incomplete result: `issues` holds
/// everything fully resolved before the token fired.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    /// Aggregated defects in report order.
    pub issues: Vec<MainIssue>,
    /// True when the run stopped early on cancellation.
    pub cancelled: bool,
}

/// Run every enabled check over the stack and aggregate the findings.
///
/// # Errors
///
/// Returns [`DetectError::InvalidConfig`](crate::DetectError::InvalidConfig)
/// for a bad configuration before any scan starts, and propagates layer
/// decode failures, which are fatal for the run.
///
/// # Example
///
/// ```
/// use slice_printability::{
///     detect_issues, BorderFollower, CancelToken, DetectionConfig, NullProgress, Raster,
///     SliceStack,
/// };
///
/// let stack = SliceStack::from_layers(vec![Raster::new(16, 16); 3], 0.05, 150.0);
/// let report = detect_issues(
///     &stack,
///     &BorderFollower,
///     &DetectionConfig::default(),
///     &NullProgress,
///     &CancelToken::new(),
/// )
/// .unwrap();
/// // Three empty layers, nothing else.
/// assert_eq!(report.issues.len(), 3);
/// ```
pub fn detect_issues<S: CrossSectionSource + ?Sized>(
    source: &S,
    extractor: &dyn ContourExtractor,
    config: &DetectionConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> DetectResult<DetectionReport> {
    config.validate()?;
    let layer_count = source.layer_count();
    info!(layer_count, "starting defect detection");

    let metas = (0..layer_count)
        .map(|i| source.meta(i))
        .collect::<DetectResult<Vec<_>>>()?;

    let mut issues: Vec<MainIssue> = Vec::new();

    let scanned = scan_layers(source, config, progress, cancel)?;
    for issue in scanned {
        let height = metas[issue.layer_index as usize].height;
        issues.push(MainIssue::single(issue, height));
    }

    let mut cancelled = cancel.is_cancelled();
    if config.resin_trap.enabled && !cancelled {
        let sweep = sweep_air_connectivity(source, extractor, &config.resin_trap, progress, cancel)?;
        if sweep.cancelled {
            cancelled = true;
        } else {
            issues.extend(aggregate_air_issues(
                source, &metas, &sweep, config, progress, cancel,
            ));
            cancelled = cancel.is_cancelled();
        }
    }

    issues.sort_by(MainIssue::report_order);
    info!(issue_count = issues.len(), cancelled, "defect detection finished");
    Ok(DetectionReport { issues, cancelled })
}

/// Group the sweep's per-layer regions into [`MainIssue`]s.
///
/// The grouping is the same adjacency + intersection chaining the sweep
/// uses, re-run over the final classification top-down. Traps and suction
/// cups group independently and in parallel.
fn aggregate_air_issues<S: CrossSectionSource + ?Sized>(
    source: &S,
    metas: &[LayerMeta],
    sweep: &AirSweepResult,
    config: &DetectionConfig,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Vec<MainIssue> {
    let roi = source.bounding_rect();
    let trap_layers = sweep.traps.iter().filter(|l| !l.is_empty()).count() as u32;
    let suction_layers = sweep.suctions.iter().filter(|l| !l.is_empty()).count() as u32;
    if config.resin_trap.detect_suction_cups {
        progress.reset(
            "Interpolating areas (Resin traps & suction cups)",
            trap_layers + suction_layers,
            0,
        );
    } else {
        progress.reset("Interpolating areas (Resin traps)", trap_layers, 0);
    }

    let (mut traps, suctions) = rayon::join(
        || {
            let groups = group_top_down(&sweep.traps, 0, progress, cancel);
            groups
                .into_iter()
                // A group reaching the plate drains when the print lifts.
                .filter(|group| group.iter().all(|r| r.layer_index != 0))
                .map(|group| build_air_issue(IssueType::ResinTrap, &group, metas, &roi))
                .collect::<Vec<_>>()
        },
        || {
            if !config.resin_trap.detect_suction_cups {
                return Vec::new();
            }
            let min_area = config.resin_trap.min_suction_cup_area;
            let groups = group_top_down(&sweep.suctions, min_area, progress, cancel);
            groups
                .into_iter()
                .map(|group| build_air_issue(IssueType::SuctionCup, &group, metas, &roi))
                .filter(|issue| issue.total_height >= config.resin_trap.min_suction_cup_height)
                .collect::<Vec<_>>()
        },
    );
    traps.extend(suctions);
    traps
}

/// Chain regions across layers, walking the stack from the top so a group's
/// newest entry is always its lowest layer.
///
/// Cancellation mid-walk yields no groups at all: a half-built chain has a
/// truncated span and could even sidestep the plate-adjacency drop.
fn group_top_down(
    layers: &[Vec<Arc<HollowRegion>>],
    min_area: u64,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Vec<Vec<Arc<HollowRegion>>> {
    let mut groups = TemporalGroups::new();
    for layer in layers.iter().rev() {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        if layer.is_empty() {
            continue;
        }
        for region in layer {
            if region.area_px < min_area {
                continue;
            }
            groups.insert(Arc::clone(region));
        }
        progress.increment();
    }
    groups
        .into_groups()
        .into_iter()
        .map(|group| group.entries)
        .collect()
}

/// One aggregated air issue with witnesses shifted back to full-frame
/// coordinates.
fn build_air_issue(
    issue_type: IssueType,
    group: &[Arc<HollowRegion>],
    metas: &[LayerMeta],
    roi: &PixelRect,
) -> MainIssue {
    let children = group
        .iter()
        .map(|region| {
            let outline = region
                .outline
                .iter()
                .map(|p| PixelPoint::new(p.x + roi.x, p.y + roi.y))
                .collect();
            Issue::from_contour(
                issue_type,
                region.layer_index,
                outline,
                region.bounds.translated(roi.x, roi.y),
                region.area_px,
            )
        })
        .collect::<Vec<_>>();

    let start = group.iter().map(|r| r.layer_index).min().unwrap_or(0) as usize;
    let end = group.iter().map(|r| r.layer_index).max().unwrap_or(0) as usize;
    let total_height = round_height(metas[start].height + metas[end].z - metas[start].z);
    MainIssue::new(issue_type, children, total_height)
}

/// Retains detection results and the user's ignore list between runs.
///
/// Identity is the [`MainIssue`] equality (type, span, bounds, area), so a
/// re-detected defect stays ignored as long as it did not move or change
/// size.
#[derive(Debug, Default)]
pub struct IssueManager {
    issues: Vec<MainIssue>,
    ignored: Vec<MainIssue>,
}

impl IssueManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the detected set with a fresh report, keeping the ignore
    /// list.
    pub fn set_detected(&mut self, issues: Vec<MainIssue>) {
        self.issues = issues;
    }

    /// Every detected issue, ignored ones included.
    #[must_use]
    pub fn all(&self) -> &[MainIssue] {
        &self.issues
    }

    /// Add an issue to the ignore list.
    pub fn ignore(&mut self, issue: MainIssue) {
        if !self.ignored.contains(&issue) {
            self.ignored.push(issue);
        }
    }

    /// Drop an issue from the ignore list.
    pub fn unignore(&mut self, issue: &MainIssue) {
        self.ignored.retain(|i| i != issue);
    }

    /// Clear the ignore list.
    pub fn clear_ignored(&mut self) {
        self.ignored.clear();
    }

    /// Detected issues not on the ignore list.
    #[must_use]
    pub fn get_visible(&self) -> Vec<&MainIssue> {
        self.issues
            .iter()
            .filter(|issue| !self.ignored.contains(issue))
            .collect()
    }

    /// Detected issues of one type.
    #[must_use]
    pub fn get_issues_by_type(&self, issue_type: IssueType) -> Vec<&MainIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.issue_type == issue_type)
            .collect()
    }

    /// Detected issues whose span includes `layer_index`.
    #[must_use]
    pub fn get_issues_by_layer(&self, layer_index: u32) -> Vec<&MainIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.spans_layer(layer_index))
            .collect()
    }

    /// Every per-layer witness across all detected issues.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Issue> {
        self.issues.iter().flat_map(|issue| &issue.issues).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trap(layer: u32, x: i32, area: u64) -> MainIssue {
        MainIssue::single(
            Issue::from_contour(
                IssueType::ResinTrap,
                layer,
                vec![PixelPoint::new(x, 0)],
                PixelRect::new(x, 0, 4, 4),
                area,
            ),
            0.05,
        )
    }

    #[test]
    fn test_manager_visibility_and_projections() {
        let mut manager = IssueManager::new();
        manager.set_detected(vec![trap(3, 0, 10), trap(5, 8, 20)]);

        assert_eq!(manager.get_visible().len(), 2);
        manager.ignore(trap(3, 0, 10));
        assert_eq!(manager.get_visible().len(), 1);
        assert_eq!(manager.all().len(), 2);

        // Re-detection with the same geometry stays ignored.
        manager.set_detected(vec![trap(3, 0, 10), trap(5, 8, 20)]);
        assert_eq!(manager.get_visible().len(), 1);

        manager.unignore(&trap(3, 0, 10));
        assert_eq!(manager.get_visible().len(), 2);

        assert_eq!(manager.get_issues_by_type(IssueType::ResinTrap).len(), 2);
        assert_eq!(manager.get_issues_by_layer(5).len(), 1);
        assert_eq!(manager.flatten().len(), 2);
    }
}
