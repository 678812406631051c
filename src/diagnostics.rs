//! Audio-thread events, carried over an SPSC ring and logged elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticEvent {
    BypassEntered,
    BypassExited,
    /// Samples in one block whose output hit the limiter ceiling.
    LimiterEngaged { samples: u32 },
    /// Non-finite input samples replaced with silence in one block.
    NonFiniteInput { samples: u32 },
    Reset,
}

pub struct DiagnosticsProducer {
    producer: rtrb::Producer<DiagnosticEvent>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsProducer {
    /// Never blocks; a full ring drops the event.
    #[inline]
    pub fn push(&mut self, event: DiagnosticEvent) {
        if self.producer.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct DiagnosticsDrain {
    consumer: rtrb::Consumer<DiagnosticEvent>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsDrain {
    pub fn pop(&mut self) -> Option<DiagnosticEvent> {
        self.consumer.pop().ok()
    }

    /// Events lost because the ring was full, since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    /// Forwards every pending event to the `log` facade. Returns the number
    /// of events drained.
    pub fn drain_to_log(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.pop() {
            match event {
                DiagnosticEvent::BypassEntered => log::debug!("harmonizer bypassed"),
                DiagnosticEvent::BypassExited => log::debug!("harmonizer active"),
                DiagnosticEvent::LimiterEngaged { samples } => {
                    log::trace!("limiter engaged on {} samples", samples)
                }
                DiagnosticEvent::NonFiniteInput { samples } => {
                    log::warn!("replaced {} non-finite input samples", samples)
                }
                DiagnosticEvent::Reset => log::debug!("harmonizer reset"),
            }
            count += 1;
        }

        let dropped = self.take_dropped();
        if dropped > 0 {
            log::warn!("dropped {} diagnostic events (ring full)", dropped);
        }
        count
    }
}

pub fn diagnostics_channel(capacity: usize) -> (DiagnosticsProducer, DiagnosticsDrain) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DiagnosticsProducer {
            producer,
            dropped: dropped.clone(),
        },
        DiagnosticsDrain { consumer, dropped },
    )
}
