//! Per-BRC mirrored logging (spec §6.2 `GET /benchmark/:id/log`): every
//! `tracing` event carrying a `brc_id` field is copied into a bounded
//! ring buffer the server can read back out for that id, in addition to
//! flowing through the normal subscriber pipeline.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const RING_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct MirroredLogLine {
    pub level: String,
    pub message: String,
}

#[derive(Default)]
struct BrcIdVisitor {
    brc_id: Option<i64>,
    message: Option<String>,
}

impl Visit for BrcIdVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "brc_id" {
            self.brc_id = Some(value);
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "brc_id" {
            self.brc_id = Some(value as i64);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else if field.name() == "brc_id" {
            if let Ok(id) = format!("{value:?}").parse::<i64>() {
                self.brc_id = Some(id);
            }
        }
    }
}

/// Shared store of per-BRC ring buffers. Cheap to clone (`Arc` inside).
#[derive(Clone)]
pub struct LogMirror {
    buffers: Arc<Mutex<HashMap<i64, VecDeque<MirroredLogLine>>>>,
}

impl LogMirror {
    pub fn new() -> Self {
        Self {
            buffers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn lines_for(&self, brc_id: i64) -> Vec<MirroredLogLine> {
        self.buffers
            .lock()
            .get(&brc_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn push(&self, brc_id: i64, line: MirroredLogLine) {
        let mut buffers = self.buffers.lock();
        let ring = buffers.entry(brc_id).or_insert_with(VecDeque::new);
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

impl Default for LogMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Subscriber> Layer<S> for LogMirror {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = BrcIdVisitor::default();
        event.record(&mut visitor);

        let Some(brc_id) = visitor.brc_id else {
            return;
        };

        self.push(
            brc_id,
            MirroredLogLine {
                level: event.metadata().level().to_string(),
                message: visitor.message.unwrap_or_default(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_for_unknown_brc_is_empty() {
        let mirror = LogMirror::new();
        assert!(mirror.lines_for(42).is_empty());
    }

    #[test]
    fn push_then_read_round_trips() {
        let mirror = LogMirror::new();
        mirror.push(
            1,
            MirroredLogLine {
                level: "INFO".to_string(),
                message: "hello".to_string(),
            },
        );
        let lines = mirror.lines_for(1);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message, "hello");
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let mirror = LogMirror::new();
        for i in 0..(RING_CAPACITY + 10) {
            mirror.push(
                7,
                MirroredLogLine {
                    level: "INFO".to_string(),
                    message: i.to_string(),
                },
            );
        }
        let lines = mirror.lines_for(7);
        assert_eq!(lines.len(), RING_CAPACITY);
        assert_eq!(lines[0].message, "10");
    }
}
