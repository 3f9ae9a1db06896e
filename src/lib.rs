//! Printability analysis for rasterized resin-print layer stacks.
//!
//! Given an ordered stack of single-channel cross-sections, one bitmap per
//! Z height, this crate reports the manufacturing defects that sink MSLA
//! prints before they start: unsupported islands and overhangs, enclosed
//! voids that trap liquid resin, drainable voids that act as suction cups,
//! layers past the machine's build height, empty layers, and geometry
//! touching the plate margins.
//!
//! The per-layer checks are independent and run in parallel across the
//! stack. The void classification is the interesting part: a two-pass
//! air-connectivity sweep carries a cumulative reachability raster bottom
//! to top and then top to bottom, chaining hollow regions across layers so
//! a vent discovered near the top surface reclassifies the whole void it
//! belongs to.
//!
//! # Example
//!
//! ```
//! use slice_printability::{
//!     detect_issues, BorderFollower, CancelToken, DetectionConfig, IssueType, NullProgress,
//!     Raster, SliceStack,
//! };
//!
//! // Two layers: a solid pad, then a pad plus a floating blob.
//! let mut base = Raster::new(64, 64);
//! let mut top = Raster::new(64, 64);
//! for y in 20..40 {
//!     for x in 20..40 {
//!         base.set_pixel(x, y, 255);
//!         top.set_pixel(x, y, 255);
//!     }
//! }
//! for y in 50..55 {
//!     for x in 50..55 {
//!         top.set_pixel(x, y, 255);
//!     }
//! }
//! let stack = SliceStack::from_layers(vec![base, top], 0.05, 150.0);
//!
//! let report = detect_issues(
//!     &stack,
//!     &BorderFollower,
//!     &DetectionConfig::default(),
//!     &NullProgress,
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! assert!(report
//!     .issues
//!     .iter()
//!     .any(|issue| issue.issue_type == IssueType::Island));
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod airflow;
mod bounds;
mod cache;
mod config;
mod contour;
mod detect;
mod drill;
mod error;
mod groups;
mod issues;
mod progress;
mod raster;
mod scanner;
mod stack;

pub use bounds::{PixelPoint, PixelRect};
pub use cache::{Direction, LayerCache, PostDecode};
pub use config::{
    DetectionConfig, EmptyLayerConfig, IslandConfig, OverhangConfig, PrintHeightConfig,
    ResinTrapConfig, TouchingBoundConfig,
};
pub use contour::{BorderFollower, Contour, ContourExtractor, ContourTree};
pub use detect::{detect_issues, DetectionReport, IssueManager};
pub use drill::{drill_point, drill_suction_cups, DrillOperation};
pub use error::{DetectError, DetectResult};
pub use groups::{HollowRegion, RegionGroup, RegionState, TemporalGroups};
pub use issues::{Issue, IssueType, MainIssue, Witness};
pub use progress::{CancelToken, CountingProgress, NullProgress, ProgressSink};
pub use raster::{ComponentLabels, ComponentStats, Connectivity, Raster};
pub use stack::{round_height, CrossSectionSource, LayerMeta, SliceStack};
