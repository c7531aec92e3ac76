// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry boundary. The core never talks to a real monitoring backend;
//! it only emits tagged [`MonitorEvent`]s into whatever [`MonitorSink`] the
//! binary wires in.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventKind {
    TypeMismatch,
    QosMismatch,
    McapFileCreationFailure,
    DiskFull,
}

impl MonitorEventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            MonitorEventKind::TypeMismatch => "TYPE_MISMATCH",
            MonitorEventKind::QosMismatch => "QOS_MISMATCH",
            MonitorEventKind::McapFileCreationFailure => "MCAP_FILE_CREATION_FAILURE",
            MonitorEventKind::DiskFull => "DISK_FULL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorEvent {
    pub kind: MonitorEventKind,
    pub detail: String,
}

pub trait MonitorSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// Default sink: logs every event through `tracing`.
pub struct TracingMonitorSink;

impl MonitorSink for TracingMonitorSink {
    fn emit(&self, event: MonitorEvent) {
        match event.kind {
            MonitorEventKind::DiskFull | MonitorEventKind::McapFileCreationFailure => {
                tracing::error!(tag = event.kind.tag(), detail = %event.detail, "monitor event");
            }
            MonitorEventKind::TypeMismatch | MonitorEventKind::QosMismatch => {
                tracing::warn!(tag = event.kind.tag(), detail = %event.detail, "monitor event");
            }
        }
    }
}

/// Discards every event. Useful in tests where telemetry noise is unwanted.
pub struct NullMonitorSink;

impl MonitorSink for NullMonitorSink {
    fn emit(&self, _event: MonitorEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_sink_accepts_all_kinds() {
        let sink = TracingMonitorSink;
        for kind in [
            MonitorEventKind::TypeMismatch,
            MonitorEventKind::QosMismatch,
            MonitorEventKind::McapFileCreationFailure,
            MonitorEventKind::DiskFull,
        ] {
            sink.emit(MonitorEvent { kind, detail: "test".to_string() });
        }
    }
}
