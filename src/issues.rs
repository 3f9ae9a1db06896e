//! The issue model: per-layer witnesses and aggregated defects.

use std::cmp::Ordering;

use crate::bounds::{PixelPoint, PixelRect};

/// Kind of printability defect.
///
/// The discriminant order is the report order: structural defects first,
/// then the void classes, then stack-level flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IssueType {
    /// Solid region insufficiently supported by the layer below.
    Island,
    /// Newly added solid area not present on the layer below.
    Overhang,
    /// Hollow region with no proven path to open air.
    ResinTrap,
    /// Hollow region with a proven air path that still risks vacuum
    /// adhesion.
    SuctionCup,
    /// Cured pixels inside the configured plate margin bands.
    TouchingBound,
    /// Layer above the machine's usable build height.
    PrintHeight,
    /// Layer with no cured pixels.
    EmptyLayer,
}

impl IssueType {
    /// Short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Island => "island",
            Self::Overhang => "overhang",
            Self::ResinTrap => "resin trap",
            Self::SuctionCup => "suction cup",
            Self::TouchingBound => "touching bound",
            Self::PrintHeight => "print height",
            Self::EmptyLayer => "empty layer",
        }
    }
}

/// Geometric evidence carried by one per-layer issue.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Witness {
    /// Individual defect pixels, for point-based checks.
    Points(Vec<PixelPoint>),
    /// One closed polygon outline, for region-based checks.
    Contour(Vec<PixelPoint>),
    /// The whole layer, for checks without pixel geometry.
    Layer,
}

/// One defect instance on one layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Issue {
    /// Defect kind.
    pub issue_type: IssueType,
    /// Layer the witness lives on.
    pub layer_index: u32,
    /// Geometric evidence.
    pub witness: Witness,
    /// Bounding box of the evidence; empty for [`Witness::Layer`].
    pub bounds: PixelRect,
    /// Defect pixel area.
    pub area_px: u64,
}

impl Issue {
    /// Issue witnessed by a set of defect pixels.
    #[must_use]
    pub fn from_points(issue_type: IssueType, layer_index: u32, points: Vec<PixelPoint>) -> Self {
        let bounds = PixelRect::around_points(&points);
        let area_px = points.len() as u64;
        Self {
            issue_type,
            layer_index,
            witness: Witness::Points(points),
            bounds,
            area_px,
        }
    }

    /// Issue witnessed by a closed contour with a known pixel area.
    #[must_use]
    pub fn from_contour(
        issue_type: IssueType,
        layer_index: u32,
        outline: Vec<PixelPoint>,
        bounds: PixelRect,
        area_px: u64,
    ) -> Self {
        Self {
            issue_type,
            layer_index,
            witness: Witness::Contour(outline),
            bounds,
            area_px,
        }
    }

    /// Issue whose witness is the layer itself.
    #[must_use]
    pub fn whole_layer(issue_type: IssueType, layer_index: u32) -> Self {
        Self {
            issue_type,
            layer_index,
            witness: Witness::Layer,
            bounds: PixelRect::default(),
            area_px: 0,
        }
    }

    /// Translate the witness geometry by `(dx, dy)`.
    ///
    /// The air sweep works in model-ROI coordinates; the aggregator calls
    /// this once to shift the evidence back into full-frame coordinates.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        match &mut self.witness {
            Witness::Points(points) | Witness::Contour(points) => {
                for p in points.iter_mut() {
                    p.x += dx;
                    p.y += dy;
                }
            }
            Witness::Layer => {}
        }
        if !self.bounds.is_empty() {
            self.bounds = self.bounds.translated(dx, dy);
        }
    }
}

/// All per-layer witnesses of one physical defect under one identity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MainIssue {
    /// Defect kind shared by every child issue.
    pub issue_type: IssueType,
    /// First layer of the span.
    pub start_layer_index: u32,
    /// Last layer of the span, inclusive.
    pub end_layer_index: u32,
    /// Union of the child bounding boxes.
    pub bounds: PixelRect,
    /// Sum of the child pixel areas.
    pub area_px: u64,
    /// Physical height of the span in mm; zero for flat defects.
    pub total_height: f32,
    /// Child issues, ordered by layer.
    pub issues: Vec<Issue>,
}

impl MainIssue {
    /// Aggregate child issues into one defect.
    ///
    /// # Panics
    ///
    /// Panics when `issues` is empty; a defect with no witnesses is a bug
    /// in the caller.
    #[must_use]
    pub fn new(issue_type: IssueType, mut issues: Vec<Issue>, total_height: f32) -> Self {
        assert!(!issues.is_empty(), "a defect needs at least one witness");
        issues.sort_by_key(|issue| issue.layer_index);
        let start_layer_index = issues[0].layer_index;
        let end_layer_index = issues[issues.len() - 1].layer_index;
        let mut bounds = PixelRect::default();
        let mut area_px = 0;
        for issue in &issues {
            bounds = bounds.union(&issue.bounds);
            area_px += issue.area_px;
        }
        Self {
            issue_type,
            start_layer_index,
            end_layer_index,
            bounds,
            area_px,
            total_height,
            issues,
        }
    }

    /// Defect from a single witness.
    #[must_use]
    pub fn single(issue: Issue, total_height: f32) -> Self {
        Self::new(issue.issue_type, vec![issue], total_height)
    }

    /// Number of layers in the span.
    #[must_use]
    pub const fn layer_span(&self) -> u32 {
        self.end_layer_index - self.start_layer_index + 1
    }

    /// Whether the span includes `layer_index`.
    #[must_use]
    pub const fn spans_layer(&self, layer_index: u32) -> bool {
        self.start_layer_index <= layer_index && layer_index <= self.end_layer_index
    }

    /// True for the void classes produced by the air sweep.
    #[must_use]
    pub const fn is_air_issue(&self) -> bool {
        matches!(self.issue_type, IssueType::ResinTrap | IssueType::SuctionCup)
    }

    /// Display string for the span, e.g. `"40-60"` or `"5"`.
    #[must_use]
    pub fn layer_info(&self) -> String {
        if self.start_layer_index == self.end_layer_index {
            format!("{}", self.start_layer_index)
        } else {
            format!("{}-{}", self.start_layer_index, self.end_layer_index)
        }
    }

    /// Report ordering: type, then start layer ascending, then area
    /// descending.
    #[must_use]
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.issue_type
            .cmp(&other.issue_type)
            .then(self.start_layer_index.cmp(&other.start_layer_index))
            .then(other.area_px.cmp(&self.area_px))
    }
}

/// Identity used by the ignore list: a re-detected defect with the same
/// type, span, bounds, and area is the same defect.
impl PartialEq for MainIssue {
    fn eq(&self, other: &Self) -> bool {
        self.issue_type == other.issue_type
            && self.start_layer_index == other.start_layer_index
            && self.end_layer_index == other.end_layer_index
            && self.bounds == other.bounds
            && self.area_px == other.area_px
    }
}

impl Eq for MainIssue {}

#[cfg(test)]
mod tests {
    use super::*;

    fn contour_issue(layer: u32, x: i32, area: u64) -> Issue {
        Issue::from_contour(
            IssueType::ResinTrap,
            layer,
            vec![PixelPoint::new(x, 0), PixelPoint::new(x + 3, 0)],
            PixelRect::new(x, 0, 4, 4),
            area,
        )
    }

    #[test]
    fn test_points_issue_bounds() {
        let issue = Issue::from_points(
            IssueType::Island,
            5,
            vec![PixelPoint::new(2, 3), PixelPoint::new(7, 4)],
        );
        assert_eq!(issue.bounds, PixelRect::new(2, 3, 6, 2));
        assert_eq!(issue.area_px, 2);
    }

    #[test]
    fn test_main_issue_aggregates() {
        let main = MainIssue::new(
            IssueType::ResinTrap,
            vec![contour_issue(7, 0, 10), contour_issue(5, 2, 12), contour_issue(6, 1, 8)],
            0.15,
        );
        assert_eq!(main.start_layer_index, 5);
        assert_eq!(main.end_layer_index, 7);
        assert_eq!(main.layer_span(), 3);
        assert_eq!(main.area_px, 30);
        assert_eq!(main.bounds, PixelRect::new(0, 0, 6, 4));
        assert_eq!(main.layer_info(), "5-7");
        assert!(main.spans_layer(6));
        assert!(!main.spans_layer(8));
    }

    #[test]
    fn test_report_order() {
        let island = MainIssue::single(
            Issue::from_points(IssueType::Island, 9, vec![PixelPoint::new(0, 0)]),
            0.0,
        );
        let trap_small = MainIssue::single(contour_issue(3, 0, 5), 0.05);
        let trap_big = MainIssue::single(contour_issue(3, 2, 50), 0.05);

        let mut report = vec![trap_small.clone(), island.clone(), trap_big.clone()];
        report.sort_by(MainIssue::report_order);
        assert_eq!(report[0], island); // Island sorts before ResinTrap
        assert_eq!(report[1], trap_big); // Bigger area first within a layer
        assert_eq!(report[2], trap_small);
    }

    #[test]
    fn test_identity_ignores_witness_detail() {
        let a = MainIssue::single(contour_issue(3, 0, 5), 0.05);
        let mut b = MainIssue::single(contour_issue(3, 0, 5), 0.05);
        b.issues[0].witness = Witness::Layer;
        assert_eq!(a, b);
    }

    #[test]
    fn test_translate() {
        let mut issue = contour_issue(5, 0, 10);
        issue.translate(100, 50);
        assert_eq!(issue.bounds, PixelRect::new(100, 50, 4, 4));
        match &issue.witness {
            Witness::Contour(points) => assert_eq!(points[0], PixelPoint::new(100, 50)),
            _ => panic!("expected contour witness"),
        }
    }
}
