use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Counters for the receive pipeline.
///
/// Every skipped frame and transport hiccup lands in exactly one of these;
/// nothing is dropped silently. Counters are cheap clones of shared state,
/// so the hub can be handed to the worker thread and read from anywhere.
#[derive(Clone)]
pub struct TelemetryMetrics {
    pub registry: Registry,
    pub frames_received: IntCounter,
    pub frames_published: IntCounter,
    pub unrecognized_frames: IntCounter,
    pub truncated_frames: IntCounter,
    pub transport_timeouts: IntCounter,
    pub source_reopens: IntCounter,
}

impl TelemetryMetrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let frames_received = IntCounter::new("vesc_rx_frames", "Raw CAN frames received")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let frames_published =
            IntCounter::new("vesc_snapshots_published", "Snapshots pushed to the publisher")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let unrecognized_frames =
            IntCounter::new("vesc_rx_unrecognized", "Frames with an unknown CAN id")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let truncated_frames =
            IntCounter::new("vesc_rx_truncated", "Frames shorter than their kind requires")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let transport_timeouts =
            IntCounter::new("vesc_rx_timeouts", "Receive timeouts (idle bus)")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let source_reopens =
            IntCounter::new("vesc_source_reopens", "Frame source reopen attempts")
                .map_err(|e| format!("metrics init error: {e}"))?;

        let _ = registry.register(Box::new(frames_received.clone()));
        let _ = registry.register(Box::new(frames_published.clone()));
        let _ = registry.register(Box::new(unrecognized_frames.clone()));
        let _ = registry.register(Box::new(truncated_frames.clone()));
        let _ = registry.register(Box::new(transport_timeouts.clone()));
        let _ = registry.register(Box::new(source_reopens.clone()));

        Ok(Self {
            registry,
            frames_received,
            frames_published,
            unrecognized_frames,
            truncated_frames,
            transport_timeouts,
            source_reopens,
        })
    }

    /// Prometheus text exposition of all counters.
    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_dump() {
        let metrics = TelemetryMetrics::new().unwrap();
        metrics.frames_received.inc();
        metrics.frames_received.inc();
        metrics.unrecognized_frames.inc();
        let text = metrics.encode_text();
        assert!(text.contains("vesc_rx_frames 2"));
        assert!(text.contains("vesc_rx_unrecognized 1"));
    }
}
