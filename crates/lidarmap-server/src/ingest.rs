//! Point batches arriving over the message bus
//!
//! A batch payload is a packed sequence of 32-byte records:
//!
//! ```text
//! [x: f64 BE][y: f64 BE][z: f64 BE][timestamp_ms: f64 BE] ...
//! ```

use std::sync::Arc;
use std::time::Duration;

use lidarmap::TimedPoint;
use lidarmap_pubsub::{ClientError, PubSubClient};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::ServerCore;

/// Size of one encoded point
pub const RECORD_LEN: usize = 32;

const CONNECT_POLL: Duration = Duration::from_millis(250);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Batch of {0} bytes is not a whole number of 32-byte records")]
    BadLength(usize),
}

/// Decode a point batch payload.
pub fn decode_point_batch(payload: &[u8]) -> Result<Vec<TimedPoint>, IngestError> {
    if payload.len() % RECORD_LEN != 0 {
        return Err(IngestError::BadLength(payload.len()));
    }

    Ok(payload
        .chunks_exact(RECORD_LEN)
        .map(|record| {
            let field = |i: usize| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&record[i * 8..i * 8 + 8]);
                f64::from_be_bytes(bytes)
            };
            TimedPoint::new(field(0), field(1), field(2), field(3))
        })
        .collect())
}

pub fn encode_point_batch(points: &[TimedPoint]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(points.len() * RECORD_LEN);
    for p in points {
        for value in [p.x, p.y, p.z, p.timestamp] {
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }
    buf
}

/// Vertical band of accepted points. Unset bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightFilter {
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
}

impl HeightFilter {
    pub fn admits(&self, point: &TimedPoint) -> bool {
        self.min_height.is_none_or(|min| point.z >= min)
            && self.max_height.is_none_or(|max| point.z <= max)
    }
}

/// Subscribe `core` to point batches on `topic` once the client is connected.
///
/// Waits for the client's own reconnect logic rather than dialing itself.
/// Returns when subscribed, or early if `cancel` fires.
pub async fn attach_to_bus(
    client: Arc<PubSubClient>,
    topic: String,
    core: Arc<ServerCore>,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    loop {
        if client.is_connected() {
            let core = core.clone();
            let label = topic.clone();
            let handler = move |payload: &[u8]| match decode_point_batch(payload) {
                Ok(points) => {
                    let received = points.len();
                    let accepted = core.ingest(points);
                    debug!("{}: stored {}/{} points", label, accepted, received);
                }
                Err(e) => warn!("{}: dropping batch: {}", label, e),
            };

            match client.subscribe(topic.as_str(), handler).await {
                Ok(()) => {
                    info!("Ingesting point batches from '{}'", topic);
                    return Ok(());
                }
                // Lost the connection between the check and the send.
                Err(ClientError::NotConnected) => {}
                Err(e) => return Err(e),
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Shutdown),
            _ = tokio::time::sleep(CONNECT_POLL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_layout() {
        let batch = encode_point_batch(&[TimedPoint::new(1.0, -2.0, 0.5, 1234.0)]);
        assert_eq!(batch.len(), RECORD_LEN);
        assert_eq!(&batch[0..8], &1.0f64.to_be_bytes());
        assert_eq!(&batch[24..32], &1234.0f64.to_be_bytes());

        let points = decode_point_batch(&batch).unwrap();
        assert_eq!(points, vec![TimedPoint::new(1.0, -2.0, 0.5, 1234.0)]);
    }

    #[test]
    fn empty_batch_is_valid() {
        assert_eq!(decode_point_batch(&[]), Ok(Vec::new()));
    }

    #[test]
    fn partial_record_is_rejected() {
        let mut batch = encode_point_batch(&[TimedPoint::new(0.0, 0.0, 0.0, 0.0); 2]);
        batch.pop();
        assert_eq!(decode_point_batch(&batch), Err(IngestError::BadLength(63)));
    }

    #[test]
    fn height_filter_bounds() {
        let open = HeightFilter::default();
        let band = HeightFilter {
            min_height: Some(-0.5),
            max_height: Some(1.5),
        };
        let at = |z| TimedPoint::new(0.0, 0.0, z, 0.0);

        assert!(open.admits(&at(-100.0)));
        assert!(band.admits(&at(-0.5)));
        assert!(band.admits(&at(1.5)));
        assert!(!band.admits(&at(-0.6)));
        assert!(!band.admits(&at(2.0)));

        let floor_only = HeightFilter {
            min_height: Some(0.0),
            max_height: None,
        };
        assert!(floor_only.admits(&at(1e6)));
        assert!(!floor_only.admits(&at(-0.1)));
    }
}
