use std::{fmt, sync::Arc, time::Instant};

use cofhe_telemetry::TelemetryHandle;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// The five canonical steps of one encryption, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptStep {
    InitTfhe,
    FetchKeys,
    Pack,
    Prove,
    Verify,
}

impl EncryptStep {
    pub const ALL: [EncryptStep; 5] = [
        EncryptStep::InitTfhe,
        EncryptStep::FetchKeys,
        EncryptStep::Pack,
        EncryptStep::Prove,
        EncryptStep::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptStep::InitTfhe => "init-tfhe",
            EncryptStep::FetchKeys => "fetch-keys",
            EncryptStep::Pack => "pack",
            EncryptStep::Prove => "prove",
            EncryptStep::Verify => "verify",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EncryptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished step reports about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepContext {
    InitTfhe {
        tfhe_initialized: bool,
    },
    FetchKeys {
        fhe_key_fetched_from_network: bool,
        crs_fetched_from_network: bool,
    },
    Pack {
        items: usize,
    },
    Prove {
        use_worker: bool,
        used_worker: bool,
        worker_failed_error: Option<String>,
    },
    Verify {
        items: usize,
    },
}

impl StepContext {
    pub fn step(&self) -> EncryptStep {
        match self {
            StepContext::InitTfhe { .. } => EncryptStep::InitTfhe,
            StepContext::FetchKeys { .. } => EncryptStep::FetchKeys,
            StepContext::Pack { .. } => EncryptStep::Pack,
            StepContext::Prove { .. } => EncryptStep::Prove,
            StepContext::Verify { .. } => EncryptStep::Verify,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum StepEvent {
    Start {
        step: EncryptStep,
    },
    End {
        step: EncryptStep,
        duration_ms: u64,
        mocked: bool,
        context: StepContext,
    },
}

impl StepEvent {
    pub fn step(&self) -> EncryptStep {
        match self {
            StepEvent::Start { step } | StepEvent::End { step, .. } => *step,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, StepEvent::Start { .. })
    }
}

/// Where progress events go.
#[derive(Clone)]
pub enum StepSink {
    Channel(UnboundedSender<StepEvent>),
    Callback(Arc<dyn Fn(&StepEvent) + Send + Sync>),
}

impl StepSink {
    fn emit(&self, event: StepEvent) {
        match self {
            // A dropped receiver only means nobody is listening anymore.
            StepSink::Channel(sender) => {
                let _ = sender.send(event);
            }
            StepSink::Callback(callback) => callback(&event),
        }
    }
}

/// Per-request record of when each step started.
pub(crate) struct StepTimeline {
    sink: Option<StepSink>,
    telemetry: TelemetryHandle,
    started: [Option<Instant>; 5],
    mocked: bool,
}

impl StepTimeline {
    pub(crate) fn new(sink: Option<StepSink>, telemetry: TelemetryHandle, mocked: bool) -> Self {
        Self {
            sink,
            telemetry,
            started: [None; 5],
            mocked,
        }
    }

    pub(crate) fn start(&mut self, step: EncryptStep) {
        self.started[step.index()] = Some(Instant::now());
        debug!(step = step.as_str(), mocked = self.mocked, "step started");
        if let Some(sink) = &self.sink {
            sink.emit(StepEvent::Start { step });
        }
    }

    pub(crate) fn end(&mut self, context: StepContext) {
        let step = context.step();
        let duration_ms = self.started[step.index()]
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();
        self.telemetry.record_step_ms(step.as_str(), duration_ms);
        debug!(step = step.as_str(), duration_ms, ?context, "step finished");
        if let Some(sink) = &self.sink {
            sink.emit(StepEvent::End {
                step,
                duration_ms,
                mocked: self.mocked,
                context,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[test]
    fn timeline_emits_paired_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let telemetry = TelemetryHandle::default();
        let mut timeline = StepTimeline::new(
            Some(StepSink::Callback(Arc::new(move |event: &StepEvent| {
                sink_seen.lock().push(event.clone())
            }))),
            telemetry.clone(),
            true,
        );
        timeline.start(EncryptStep::Pack);
        timeline.end(StepContext::Pack { items: 2 });

        let events = seen.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StepEvent::Start { step: EncryptStep::Pack });
        assert!(matches!(
            &events[1],
            StepEvent::End { step: EncryptStep::Pack, mocked: true, context: StepContext::Pack { items: 2 }, .. }
        ));
        assert_eq!(
            telemetry.snapshot().latencies_ms["encrypt.step.pack"].len(),
            1
        );
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        drop(receiver);
        let mut timeline =
            StepTimeline::new(Some(StepSink::Channel(sender)), TelemetryHandle::default(), false);
        timeline.start(EncryptStep::InitTfhe);
        timeline.end(StepContext::InitTfhe {
            tfhe_initialized: true,
        });
    }

    #[test]
    fn events_serialize_with_phase_and_step() {
        let event = StepEvent::End {
            step: EncryptStep::Prove,
            duration_ms: 12,
            mocked: false,
            context: StepContext::Prove {
                use_worker: true,
                used_worker: false,
                worker_failed_error: Some("worker unavailable".into()),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "end");
        assert_eq!(json["step"], "prove");
        assert_eq!(json["context"]["used_worker"], false);
        assert_eq!(json["context"]["worker_failed_error"], "worker unavailable");
    }
}
