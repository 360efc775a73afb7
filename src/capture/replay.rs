//! JSON-lines frame replay
//!
//! Replays detector output previously captured to disk, one `TimedFrame`
//! object per line. Blank lines are skipped.

use super::traits::{FrameSource, TimedFrame};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Replay errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame on line {line}: {source}")]
    InvalidFrame {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Frame source reading JSON lines from any buffered reader
pub struct JsonLinesReplay<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl JsonLinesReplay<BufReader<File>> {
    /// Open a replay file
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path)?;
        tracing::info!("Replaying frames from {:?}", path);
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesReplay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> FrameSource for JsonLinesReplay<R> {
    type Error = CaptureError;

    fn next_frame(&mut self) -> Option<Result<TimedFrame, CaptureError>> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(
                serde_json::from_str(trimmed).map_err(|source| CaptureError::InvalidFrame {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesReplay<R> {
    type Item = Result<TimedFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Handedness;
    use std::io::Cursor;

    #[test]
    fn test_replay_reads_frames_and_skips_blank_lines() {
        let input = concat!(
            r#"{"tMs":0,"hands":[]}"#,
            "\n\n",
            r#"{"tMs":33,"hands":[{"handedness":"Left","keypoints":[{"x":0.1,"y":0.2,"z":0.0}]}]}"#,
            "\n",
        );
        let frames: Vec<_> = JsonLinesReplay::new(Cursor::new(input))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].t_ms, 0);
        assert!(frames[0].frame.is_empty());
        assert_eq!(frames[1].t_ms, 33);
        assert_eq!(frames[1].frame.hands[0].handedness, Handedness::Left);
    }

    #[test]
    fn test_replay_reports_line_of_bad_frame() {
        let input = "{\"tMs\":0}\nnot json\n";
        let mut replay = JsonLinesReplay::new(Cursor::new(input));

        assert!(replay.next_frame().unwrap().is_ok());
        match replay.next_frame().unwrap() {
            Err(CaptureError::InvalidFrame { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
