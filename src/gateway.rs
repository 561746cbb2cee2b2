//! Request routing.
//!
//! Wires the key classifier, the account dispatcher, the slot ledger and the
//! admission gate into a single call that hands the downstream invoker an
//! account, a held generation slot and, when a project is given, a fresh
//! challenge token.
//!
//! Every gateway with a browser engine shares the one process-wide
//! [`AdmissionGate`]. The first gateway built decides its browser and
//! admission settings.

use std::sync::Arc;

use thiserror::Error;

use crate::challenges::admission::{
	AdmissionError, AdmissionGate, GLOBAL_GATE, GateCell, TokenSource,
};
use crate::challenges::core::{ChallengeToken, ProjectContext};
use crate::challenges::session::{CaptchaConfigSource, ChallengeSession};
use crate::config::{ConfigError, GatewayConfig};
use crate::dispatch::{
	AccessScope, Account, AccountDispatcher, AccountPool, ApiKeyClassifier, AuthError,
	ConcurrencyLedger, GenerationKind, MemoryConcurrencyLedger, SelectionRequest, SlotGuard,
};
use crate::external_deps::browser::BrowserEngine;
use crate::modules::events::EventDispatcher;
use crate::modules::metrics::{MetricsCollector, MetricsSnapshot};

/// How often selection is retried when another request takes the last slot
/// between selection and reservation.
const RESERVE_ATTEMPTS: usize = 3;

/// Result alias used across the routing layer.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Routing outcome surfaced to the HTTP layer. Each variant maps to its own
/// response so callers can tell an exhausted pool from an unsolved challenge.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("unauthorized: {0}")]
	Unauthorized(#[from] AuthError),
	#[error("no eligible account for {} generation", .0.as_str())]
	NoEligibleAccount(GenerationKind),
	#[error("challenge token could not be obtained for project {0}")]
	ChallengeUnsolved(String),
	#[error("challenge tokens requested but no challenge engine is configured")]
	ChallengeDisabled,
	#[error("challenge engine unavailable: {0}")]
	Challenge(#[from] AdmissionError),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

/// What the caller wants to generate.
#[derive(Debug, Clone)]
pub struct RouteRequest {
	pub kind: GenerationKind,
	pub model: Option<String>,
	pub project: Option<ProjectContext>,
}

impl RouteRequest {
	pub fn image() -> Self {
		Self {
			kind: GenerationKind::Image,
			model: None,
			project: None,
		}
	}

	pub fn video() -> Self {
		Self {
			kind: GenerationKind::Video,
			..Self::image()
		}
	}

	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = Some(model.into());
		self
	}

	pub fn with_project(mut self, project: ProjectContext) -> Self {
		self.project = Some(project);
		self
	}
}

/// Everything the downstream invoker needs. The slot is released when this
/// value is dropped.
#[derive(Debug)]
pub struct RoutedRequest {
	pub account: Account,
	pub scope: AccessScope,
	pub token: Option<ChallengeToken>,
	pub slot: SlotGuard,
}

/// Fluent builder for [`Gateway`].
pub struct GatewayBuilder {
	config: GatewayConfig,
	pool: Arc<dyn AccountPool>,
	ledger: Arc<dyn ConcurrencyLedger>,
	engine: Option<Arc<dyn BrowserEngine>>,
	tokens: Option<Arc<dyn TokenSource>>,
	captcha_source: Option<Arc<dyn CaptchaConfigSource>>,
	enable_metrics: bool,
	gate_cell: &'static GateCell,
}

impl GatewayBuilder {
	pub fn new(config: GatewayConfig, pool: Arc<dyn AccountPool>) -> Self {
		Self {
			config,
			pool,
			ledger: Arc::new(MemoryConcurrencyLedger::new()),
			engine: None,
			tokens: None,
			captcha_source: None,
			enable_metrics: true,
			gate_cell: &GLOBAL_GATE,
		}
	}

	/// Slot bookkeeping used both to filter candidates and to reserve the
	/// chosen account. Defaults to an unlimited in-memory ledger.
	pub fn with_ledger(mut self, ledger: Arc<dyn ConcurrencyLedger>) -> Self {
		self.ledger = ledger;
		self
	}

	/// Mint tokens with a browser session on `engine`. Ignored when the
	/// process gate already exists.
	pub fn with_browser_engine(mut self, engine: Arc<dyn BrowserEngine>) -> Self {
		self.engine = Some(engine);
		self
	}

	#[cfg(feature = "chromium")]
	pub fn with_chromium(self) -> Self {
		self.with_browser_engine(Arc::new(crate::external_deps::browser::ChromiumEngine::new()))
	}

	/// Use an existing token source instead of building a gate.
	pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
		self.tokens = Some(tokens);
		self
	}

	/// Read browser proxy settings from `source` at launch time instead of
	/// the static config.
	pub fn with_captcha_source(mut self, source: Arc<dyn CaptchaConfigSource>) -> Self {
		self.captcha_source = Some(source);
		self
	}

	pub fn disable_metrics(mut self) -> Self {
		self.enable_metrics = false;
		self
	}

	#[cfg(test)]
	pub(crate) fn with_gate_cell(mut self, cell: &'static GateCell) -> Self {
		self.gate_cell = cell;
		self
	}

	pub fn build(self) -> GatewayResult<Gateway> {
		self.config.validate()?;

		let metrics = self.enable_metrics.then(MetricsCollector::new);
		let events = Arc::new(EventDispatcher::with_defaults(metrics.clone()));

		let classifier = ApiKeyClassifier::new(self.config.api_key.clone())
			.with_premium_key(self.config.premium_api_key.clone());
		let dispatcher = AccountDispatcher::new(self.pool)
			.with_ledger(Arc::clone(&self.ledger))
			.with_events(events.clone());

		let mut gate = None;
		let tokens = match (self.tokens, self.engine) {
			(Some(tokens), _) => Some(tokens),
			(None, Some(engine)) => {
				let browser = &self.config.browser;
				let captcha = self
					.captcha_source
					.unwrap_or_else(|| Arc::new(self.config.captcha.clone()));
				let session_events = events.clone();
				let built = AdmissionGate::get_or_init_in(
					self.gate_cell,
					|| {
						Ok(ChallengeSession::new(
							engine,
							browser.launch_options(),
							browser.challenge_config(),
						)?
						.with_launch_timeout(browser.launch_timeout())
						.with_captcha_source(captcha)
						.with_events(session_events))
					},
					self.config.admission.admission_config(),
					Some(events.clone()),
				)?;
				gate = Some(built.clone());
				Some(built as Arc<dyn TokenSource>)
			}
			(None, None) => None,
		};

		Ok(Gateway {
			classifier,
			dispatcher,
			ledger: self.ledger,
			tokens,
			gate,
			metrics,
		})
	}
}

/// Main routing entry point.
pub struct Gateway {
	classifier: ApiKeyClassifier,
	dispatcher: AccountDispatcher,
	ledger: Arc<dyn ConcurrencyLedger>,
	tokens: Option<Arc<dyn TokenSource>>,
	gate: Option<Arc<AdmissionGate>>,
	metrics: Option<MetricsCollector>,
}

impl Gateway {
	/// Obtain a builder over `pool`.
	pub fn builder(config: GatewayConfig, pool: Arc<dyn AccountPool>) -> GatewayBuilder {
		GatewayBuilder::new(config, pool)
	}

	pub fn classifier(&self) -> &ApiKeyClassifier {
		&self.classifier
	}

	pub fn ledger(&self) -> &Arc<dyn ConcurrencyLedger> {
		&self.ledger
	}

	pub fn metrics(&self) -> Option<MetricsSnapshot> {
		self.metrics.as_ref().map(MetricsCollector::snapshot)
	}

	/// Route a request presented with an `Authorization` header value.
	pub async fn route_bearer(
		&self,
		authorization: &str,
		request: RouteRequest,
	) -> GatewayResult<RoutedRequest> {
		let scope = self.classifier.classify_bearer(authorization)?;
		self.route_scoped(scope, request).await
	}

	/// Route a request presented with a bare API key.
	pub async fn route(&self, api_key: &str, request: RouteRequest) -> GatewayResult<RoutedRequest> {
		let scope = self.classifier.classify(api_key)?;
		self.route_scoped(scope, request).await
	}

	async fn route_scoped(
		&self,
		scope: AccessScope,
		request: RouteRequest,
	) -> GatewayResult<RoutedRequest> {
		let (account, slot) = self.reserve(scope, &request).await?;

		let token = match &request.project {
			Some(project) => {
				let tokens = self.tokens.as_ref().ok_or(GatewayError::ChallengeDisabled)?;
				match tokens.token_for(project).await? {
					Some(token) => Some(token),
					None => {
						return Err(GatewayError::ChallengeUnsolved(
							project.project_id().to_string(),
						));
					}
				}
			}
			None => None,
		};

		Ok(RoutedRequest {
			account,
			scope,
			token,
			slot,
		})
	}

	/// Select an account and take its slot. Selection is advisory, so a
	/// lost reservation race triggers a fresh selection.
	async fn reserve(
		&self,
		scope: AccessScope,
		request: &RouteRequest,
	) -> GatewayResult<(Account, SlotGuard)> {
		let selection = SelectionRequest {
			require_image: request.kind == GenerationKind::Image,
			require_video: request.kind == GenerationKind::Video,
			model: request.model.clone(),
			scope,
		};

		for _ in 0..RESERVE_ATTEMPTS {
			let Some(account) = self.dispatcher.select(&selection).await else {
				break;
			};
			match self.ledger.try_reserve(account.id, request.kind).await {
				Some(slot) => return Ok((account, slot)),
				None => log::debug!(
					"account {} lost its {} slot before reservation, reselecting",
					account.id,
					request.kind.as_str()
				),
			}
		}
		Err(GatewayError::NoEligibleAccount(request.kind))
	}

	/// Stop the process admission gate, if this gateway uses it. Every other
	/// gateway sharing the gate is stopped with it.
	pub async fn shutdown(&self) {
		if let Some(gate) = &self.gate {
			gate.shutdown().await;
		}
	}
}
