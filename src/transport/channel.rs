//! In-process handoff of publications.
//!
//! Each camera worker owns the sending half of its own channel; the
//! publisher thread owns every receiving half. Nothing else is shared.

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, Sender};

use crate::session::Publication;
use crate::transport::RecordSink;

pub struct ChannelSink {
    tx: Sender<Publication>,
}

pub fn publication_channel(capacity: usize) -> (ChannelSink, Receiver<Publication>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (ChannelSink { tx }, rx)
}

impl RecordSink for ChannelSink {
    /// Blocks while the consumer is a full queue behind.
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        self.tx
            .send(publication.clone())
            .map_err(|_| anyhow!("publication consumer for {} is gone", publication.camera))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_off_in_order() {
        let (mut sink, rx) = publication_channel(4);
        for fps in [10, 20] {
            sink.publish(&Publication {
                camera: "front".to_string(),
                records: Vec::new(),
                fps,
            })
            .unwrap();
        }
        assert_eq!(rx.recv().unwrap().fps, 10);
        assert_eq!(rx.recv().unwrap().fps, 20);

        drop(rx);
        let err = sink
            .publish(&Publication {
                camera: "front".to_string(),
                records: Vec::new(),
                fps: 0,
            })
            .unwrap_err();
        assert!(err.to_string().contains("front"));
    }
}
