//! observations.rs — MarkerObservation stream from an external detector
//!
//! One JSON object per line on stdin:
//!
//! ```text
//! {"marker_id":0,"corners":[{"x":301.2,"y":219.8},{"x":339.9,"y":220.4},...]}
//! ```
//!
//! Blank and malformed lines are skipped (logged at debug); EOF ends the stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::estimator::MarkerObservation;

/// Parse one input line. None for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<MarkerObservation> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<MarkerObservation>(line) {
        Ok(obs) => Some(obs),
        Err(e) => {
            debug!("observations: skipping malformed line ({e})");
            None
        }
    }
}

pub struct ObservationReader<R> {
    lines: tokio::io::Lines<R>,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> ObservationReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), skipped: 0 }
    }

    /// Lines that did not parse so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next valid observation, or None at end of input.
    pub async fn next(&mut self) -> std::io::Result<Option<MarkerObservation>> {
        while let Some(line) = self.lines.next_line().await? {
            match parse_line(&line) {
                Some(obs) => return Ok(Some(obs)),
                None if line.trim().is_empty() => {}
                None => self.skipped += 1,
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detector_line() {
        let obs = parse_line(
            r#"{"marker_id":1,"corners":[{"x":1,"y":2},{"x":3,"y":4},{"x":5,"y":6},{"x":7,"y":8}]}"#,
        )
        .unwrap();
        assert_eq!(obs.marker_id, 1);
        assert_eq!(obs.corners.len(), 4);
        assert_eq!(obs.corners[3].y, 8.0);
    }

    #[tokio::test]
    async fn reader_skips_garbage_and_stops_at_eof() {
        let input: &[u8] = b"\n{not json}\n{\"marker_id\":2,\"corners\":[]}\n";
        let mut reader = ObservationReader::new(input);
        let obs = reader.next().await.unwrap().unwrap();
        assert_eq!(obs.marker_id, 2);
        assert!(obs.corners.is_empty());
        assert_eq!(reader.skipped(), 1);
        assert!(reader.next().await.unwrap().is_none());
    }
}
