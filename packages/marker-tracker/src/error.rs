use thiserror::Error;

/// Why no pose was produced for a marker observation this frame.
///
/// None of these are fatal: the caller keeps the last pose and lets the
/// receiving driver's staleness watchdog take over.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    #[error("marker {marker_id}: {found} corners visible, 4 required")]
    TooFewCorners { marker_id: u32, found: usize },
    #[error("marker size must be positive and finite, got {0}")]
    InvalidMarkerSize(f64),
    #[error("degenerate corner configuration")]
    Degenerate,
    #[error("PnP did not converge (reprojection error {rms_px:.2} px)")]
    NoConvergence { rms_px: f64 },
    #[error("solved pose places the marker behind the camera")]
    BehindCamera,
}
