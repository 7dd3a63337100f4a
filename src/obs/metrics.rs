// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter bumped once when a flow starts and once when it finishes.
pub const FLOW_COUNTER: &str = "sensor_proxy_flow_total";

/// Label pairs attached to every [`FLOW_COUNTER`] sample.
pub fn flow_labels(kind: FlowKind, outcome: FlowOutcome) -> [(&'static str, &'static str); 2] {
	[("flow", kind.as_str()), ("outcome", outcome.as_str())]
}

/// Counts one flow outcome.
///
/// With the `metrics` feature the sample goes to the global recorder. Without it the
/// sample is emitted as a `trace` event so the counts remain visible to a subscriber.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	let labels = flow_labels(kind, outcome);

	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_COUNTER, &labels).increment(1);

	#[cfg(not(feature = "metrics"))]
	::tracing::trace!(counter = FLOW_COUNTER, flow = labels[0].1, outcome = labels[1].1);
}
