// self
use crate::{_prelude::*, obs::CallStage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by relay components.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(operation: &str, stage: CallStage) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("api_relay.call", operation, stage = stage.as_str());

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Emits a debug event describing a state transition inside the span.
	pub fn transition(&self, from: &'static str, to: &'static str) {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(|| tracing::debug!(from, to, "call state transition"));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (from, to);
		}
	}

	/// Emits a warning inside the span.
	pub fn warn(&self, message: &str) {
		#[cfg(feature = "tracing")]
		{
			self.span.in_scope(|| tracing::warn!("{message}"));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = message;
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn call_span_noop_without_tracing() {
		let span = CallSpan::new("getProducts", CallStage::Dispatch);

		span.transition("preparing", "rate_checking");
		span.warn("smoke test");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = CallSpan::new("getProducts", CallStage::Refresh);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
