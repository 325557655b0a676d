// self
use crate::{_prelude::*, http::Method, obs::FlowKind};

/// Future type returned by [`FlowSpan::instrument`]; a passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future type returned by [`FlowSpan::instrument`]; a passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// The `session_broker.flow` span wrapped around every broker flow.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span tagged with the flow kind and the calling stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Opens a request span that also carries the method and the URL path (never the query).
	pub fn request(method: Method, url: &Url) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_broker.flow",
				flow = FlowKind::Request.as_str(),
				stage = "send",
				method = method.as_str(),
				path = url.path(),
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url);

			Self {}
		}
	}

	/// Runs `fut` inside the span; no guard is held across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
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
}

/// Emits a warning for a failure the broker recovered from or deliberately ignored.
pub fn warn(stage: &'static str, message: impl Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(stage, "{message}");

	#[cfg(not(feature = "tracing"))]
	let _ = (stage, message);
}

/// Emits a debug event describing a coordination step.
pub fn debug(stage: &'static str, message: impl Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(stage, "{message}");

	#[cfg(not(feature = "tracing"))]
	let _ = (stage, message);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_accept_formatted_messages() {
		warn("test", format_args!("value={}", 1));
		debug("test", "plain");
	}

	#[tokio::test]
	async fn spans_pass_values_through() {
		let url = Url::parse("https://api.example.com/quote/random?token=secret")
			.expect("Fixture URL should parse.");
		let refresh = FlowSpan::new(FlowKind::Refresh, "spans_pass_values_through");
		let request = FlowSpan::request(Method::Get, &url);

		assert_eq!(refresh.instrument(async { 42 }).await, 42);
		assert_eq!(request.instrument(async { "ok" }).await, "ok");
	}
}
