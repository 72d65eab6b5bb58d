//! I/O trace instrumentation
//!
//! The target registers a fixed catalog of NVMf I/O trace points with an
//! injected recorder and emits them synchronously at I/O lifecycle points.
//! No concrete tracing backend is assumed; a recorder decides what to do
//! with each event.

/// Object category all NVMf I/O trace points belong to
pub const OBJECT_NVMF_IO: &str = "nvmf_io";

/// The fixed catalog of NVMf I/O trace points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoTracePoint {
    IoStart,
    RdmaReadStart,
    RdmaWriteStart,
    RdmaReadComplete,
    RdmaWriteComplete,
    LibReadStart,
    LibWriteStart,
    LibComplete,
    IoCompletionDone,
}

impl IoTracePoint {
    /// Every trace point, in registration order
    pub const ALL: [IoTracePoint; 9] = [
        IoTracePoint::IoStart,
        IoTracePoint::RdmaReadStart,
        IoTracePoint::RdmaWriteStart,
        IoTracePoint::RdmaReadComplete,
        IoTracePoint::RdmaWriteComplete,
        IoTracePoint::LibReadStart,
        IoTracePoint::LibWriteStart,
        IoTracePoint::LibComplete,
        IoTracePoint::IoCompletionDone,
    ];

    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            IoTracePoint::IoStart => "NVMF_IO_START",
            IoTracePoint::RdmaReadStart => "NVMF_RDMA_READ_START",
            IoTracePoint::RdmaWriteStart => "NVMF_RDMA_WRITE_START",
            IoTracePoint::RdmaReadComplete => "NVMF_RDMA_READ_COMPLETE",
            IoTracePoint::RdmaWriteComplete => "NVMF_RDMA_WRITE_COMPLETE",
            IoTracePoint::LibReadStart => "NVMF_LIB_READ_START",
            IoTracePoint::LibWriteStart => "NVMF_LIB_WRITE_START",
            IoTracePoint::LibComplete => "NVMF_LIB_COMPLETE",
            IoTracePoint::IoCompletionDone => "NVMF_IO_COMPLETION_DONE",
        }
    }

    /// Which lifecycle phase this point marks
    pub fn phase(&self) -> TracePhase {
        match self {
            IoTracePoint::IoStart
            | IoTracePoint::RdmaReadStart
            | IoTracePoint::RdmaWriteStart
            | IoTracePoint::LibReadStart
            | IoTracePoint::LibWriteStart => TracePhase::Begin,
            IoTracePoint::RdmaReadComplete
            | IoTracePoint::RdmaWriteComplete
            | IoTracePoint::LibComplete
            | IoTracePoint::IoCompletionDone => TracePhase::End,
        }
    }
}

/// Phase of a trace event relative to the operation it marks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracePhase {
    Begin,
    End,
}

/// A single trace event emitted by the target
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent {
    pub category: &'static str,
    pub point: IoTracePoint,
    pub object_id: u64,
    pub phase: TracePhase,
    /// Microseconds since the target was created
    pub timestamp_us: u64,
}

/// Recorder a tracing backend implements to receive target trace events
pub trait TraceRecorder {
    /// Called once when the recorder is installed; `points` is the full
    /// catalog of events the target may emit for `category`.
    fn register(&mut self, category: &'static str, points: &[IoTracePoint]);

    /// Called synchronously at each instrumented point.
    fn record(&mut self, event: &TraceEvent);
}

/// Recorder that forwards every event to the `log` crate at trace level
#[derive(Debug, Default)]
pub struct LogRecorder;

impl TraceRecorder for LogRecorder {
    fn register(&mut self, category: &'static str, points: &[IoTracePoint]) {
        log::debug!("registered {} trace points for {}", points.len(), category);
    }

    fn record(&mut self, event: &TraceEvent) {
        log::trace!(
            "{} {} obj={:#x} {:?} t={}us",
            event.category,
            event.point.name(),
            event.object_id,
            event.phase,
            event.timestamp_us
        );
    }
}
