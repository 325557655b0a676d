//! Drives a full session against a mock quote API: login, a transparent refresh after the
//! server rejects an expired access token, and logout.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
use serde_json::json;
use time::Duration;
use url::Url;
// self
use session_broker::{
	_preludet::token_expiring_in,
	config::SessionConfig,
	flows::{LoginRequest, SessionBroker},
	http::Method,
	notify::TerminationReason,
	store::MemoryKv,
};

#[derive(Debug, Deserialize)]
struct Quote {
	quote: String,
	author: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = token_expiring_in("demo-access-1", Duration::minutes(-1));
	let fresh = token_expiring_in("demo-access-2", Duration::minutes(15));
	let refresh = token_expiring_in("demo-refresh", Duration::hours(12));
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).json_body(json!({
				"accessToken": &expired,
				"refreshToken": &refresh,
				"currentUser": { "email": "demo@example.com", "name": "Demo User" },
				"sessionId": "demo-session",
			}));
		})
		.await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/quote/random")
				.header("authorization", format!("Bearer {expired}"));
			then.status(401).json_body(json!({ "message": "jwt expired" }));
		})
		.await;
	let quote_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/quote/random").header("authorization", format!("Bearer {fresh}"));
			then.status(200)
				.json_body(json!({ "quote": "Simplicity is prerequisite for reliability.", "author": "E. Dijkstra" }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/refresh");
			then.status(200).json_body(json!({ "accessToken": &fresh }));
		})
		.await;
	let logout_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/logout");
			then.status(200);
		})
		.await;
	let config = SessionConfig::builder(Url::parse(&server.base_url())?)
		.request_timeout(std::time::Duration::from_secs(5))
		.build()?;
	let broker = SessionBroker::new(config, Arc::new(MemoryKv::default()))?.with_listener(
		Arc::new(|reason: &TerminationReason| println!("Session ended ({reason}).")),
	);
	let session = broker.login(&LoginRequest::new("demo@example.com", "demo-password")).await?;

	println!("Logged in as {:?}; token state: {:?}.", session.user, broker.token_state());

	let quote = broker
		.send(broker.request(Method::Get, "quote/random")?)
		.await?
		.json::<Quote>()?;

	println!("\"{}\" - {}", quote.quote, quote.author);
	println!("Refresh calls: {}.", broker.refresh_metrics.attempts());

	broker.logout().await;

	println!("Token state after logout: {:?}.", broker.token_state());

	for mock in [&login_mock, &stale_mock, &quote_mock, &refresh_mock, &logout_mock] {
		mock.assert_async().await;
	}

	Ok(())
}
