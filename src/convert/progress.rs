use crate::error::{GpkgError, Result};
use std::sync::mpsc::Sender;

/// Number of insert-progress events emitted per table, one every ~5% of the
/// features. Collections smaller than this only report completion.
pub const PROGRESS_CHECKPOINTS: usize = 20;

/// A lifecycle event of a conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// An existing GeoPackage handle is being used.
    OpeningGeoPackage,
    CreatingGeoPackage,
    /// The GeoJSON file is being read and parsed.
    ReadingSource,
    CreatingTable {
        table_name: String,
    },
    InsertProgress {
        table_name: String,
        completed: usize,
        total: usize,
    },
    Done {
        table_name: String,
    },
}

impl ProgressEvent {
    /// Human-readable status line.
    pub fn status(&self) -> String {
        match self {
            ProgressEvent::OpeningGeoPackage => "Opening GeoPackage".to_string(),
            ProgressEvent::CreatingGeoPackage => "Creating GeoPackage".to_string(),
            ProgressEvent::ReadingSource => "Reading GeoJSON file".to_string(),
            ProgressEvent::CreatingTable { table_name } => {
                format!("Creating table \"{table_name}\"")
            }
            ProgressEvent::InsertProgress { table_name, .. } => {
                format!("Inserting features into table \"{table_name}\"")
            }
            ProgressEvent::Done { table_name } => {
                format!("Done inserting features into table \"{table_name}\"")
            }
        }
    }

    pub fn completed(&self) -> Option<usize> {
        match self {
            ProgressEvent::InsertProgress { completed, .. } => Some(*completed),
            _ => None,
        }
    }

    pub fn total(&self) -> Option<usize> {
        match self {
            ProgressEvent::InsertProgress { total, .. } => Some(*total),
            _ => None,
        }
    }
}

/// Receiver of conversion progress.
///
/// Events are delivered synchronously; the conversion waits for
/// `on_progress` to return. Returning an error aborts the conversion with
/// that error.
pub trait ProgressSink {
    fn on_progress(&mut self, event: &ProgressEvent) -> Result<()>;
}

/// Sink that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _event: &ProgressEvent) -> Result<()> {
        Ok(())
    }
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent) -> Result<()>,
{
    fn on_progress(&mut self, event: &ProgressEvent) -> Result<()> {
        self(event)
    }
}

/// Forwards events over a channel. A dropped receiver cancels the conversion.
impl ProgressSink for Sender<ProgressEvent> {
    fn on_progress(&mut self, event: &ProgressEvent) -> Result<()> {
        self.send(event.clone())
            .map_err(|_| GpkgError::Cancelled("progress receiver was dropped".to_string()))
    }
}

/// Whether the insert at `index` (0-based) of `total` is a progress checkpoint.
pub(crate) fn is_checkpoint(index: usize, total: usize) -> bool {
    let step = total / PROGRESS_CHECKPOINTS;
    step > 0 && index % step == 0
}

#[cfg(test)]
mod tests {
    use super::{PROGRESS_CHECKPOINTS, ProgressEvent, ProgressSink, is_checkpoint};
    use crate::error::GpkgError;
    use std::sync::mpsc;

    #[test]
    fn status_lines() {
        let event = ProgressEvent::InsertProgress {
            table_name: "roads".to_string(),
            completed: 3,
            total: 40,
        };
        assert_eq!(event.status(), r#"Inserting features into table "roads""#);
        assert_eq!(event.completed(), Some(3));
        assert_eq!(event.total(), Some(40));
        assert_eq!(ProgressEvent::ReadingSource.status(), "Reading GeoJSON file");
        assert_eq!(ProgressEvent::ReadingSource.completed(), None);
    }

    #[test]
    fn checkpoints_every_twentieth() {
        let hits = (0..100).filter(|&i| is_checkpoint(i, 100)).count();
        assert_eq!(hits, PROGRESS_CHECKPOINTS);
        assert!(is_checkpoint(0, 100));
        assert!(is_checkpoint(95, 100));
        assert!(!is_checkpoint(96, 100));

        // Fewer features than checkpoints never reports mid-way.
        assert!((0..19).all(|i| !is_checkpoint(i, 19)));
    }

    #[test]
    fn closed_channel_cancels() {
        let (mut sender, receiver) = mpsc::channel();
        sender
            .on_progress(&ProgressEvent::CreatingGeoPackage)
            .expect("receiver alive");
        assert_eq!(receiver.recv().ok(), Some(ProgressEvent::CreatingGeoPackage));

        drop(receiver);
        let err = sender
            .on_progress(&ProgressEvent::CreatingGeoPackage)
            .expect_err("receiver dropped");
        assert!(matches!(err, GpkgError::Cancelled(_)));
    }
}
