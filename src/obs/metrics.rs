// self
use crate::obs::{CallStage, StageOutcome};

/// Records a stage outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(stage: CallStage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"api_relay_call_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Records a failed call under its error label (when enabled).
pub fn record_call_failure(label: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("api_relay_call_failure_total", "kind" => label).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = label;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_call_outcome(CallStage::Dispatch, StageOutcome::Failure);
		record_call_failure("auth_rejected");
	}
}
