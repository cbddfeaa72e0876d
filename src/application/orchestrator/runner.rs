use super::errors::NavigationError;
use super::models::{NavigationState, Resolution, ToolStep};
use crate::application::ai::{
    NavigationIntent, NavigationModel, ToolSelection, coordinate_from_result, parse_intent,
    select_geocoding_tool,
};
use crate::application::context::{ContextStore, SessionFact};
use crate::application::tooling::{
    ProtocolSession, SessionConnector, ToolDescriptor, ToolRegistry, ToolResult,
};
use crate::config::NavigationSettings;
use crate::domain::{Coordinate, LocationRef, MessageRole, RoutePreference};
use crate::infrastructure::navigation_url::navigation_url;
use serde_json::{Map as JsonMap, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one navigation request at a time from free text to a resolved
/// route. Owns its conversation context and its protocol session.
pub struct Orchestrator {
    model: Arc<dyn NavigationModel>,
    connector: Option<Arc<dyn SessionConnector>>,
    session: Option<ProtocolSession>,
    settings: NavigationSettings,
    context: ContextStore,
    transitions: Vec<NavigationState>,
    steps: Vec<ToolStep>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn NavigationModel>,
        settings: NavigationSettings,
    ) -> Result<Self, NavigationError> {
        let context = ContextStore::new(settings.max_context_turns)?;
        Ok(Self {
            model,
            connector: None,
            session: None,
            settings,
            context,
            transitions: vec![NavigationState::Idle],
            steps: Vec::new(),
        })
    }

    /// Source of sessions, used for the first connection and for the single
    /// reconnect after a transport failure.
    pub fn with_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Uses an already established session.
    pub fn with_session(mut self, session: ProtocolSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Connects eagerly instead of on the first tool call.
    pub async fn connect(&mut self) -> Result<(), NavigationError> {
        self.session().await.map(|_| ())
    }

    pub async fn navigate(&mut self, text: &str) -> Result<Resolution, NavigationError> {
        self.transitions.clear();
        self.steps.clear();
        self.enter(NavigationState::Idle);
        info!(model = self.model.name(), "navigation request received");

        let outcome = self.run_request(text).await;
        match &outcome {
            Ok(resolution) => {
                self.enter(NavigationState::Resolved);
                info!(
                    origin = resolution.origin.name(),
                    destination = resolution.destination.name(),
                    preference = %resolution.preference,
                    "navigation resolved"
                );
                self.remember(
                    MessageRole::Assistant,
                    &format!(
                        "Route from {} to {} ({}): {}",
                        resolution.origin.name(),
                        resolution.destination.name(),
                        resolution.preference,
                        resolution.url
                    ),
                );
            }
            Err(err) => {
                self.enter(NavigationState::Failed);
                warn!(kind = %err.kind(), %err, "navigation failed");
                self.remember(
                    MessageRole::System,
                    &format!("Navigation failed ({}): {err}", err.kind()),
                );
            }
        }
        outcome
    }

    /// Forgets the conversation so the next request starts fresh. The
    /// session stays open.
    pub fn reset(&mut self) {
        self.context.reset();
        self.transitions = vec![NavigationState::Idle];
        self.steps.clear();
        debug!("navigation context reset");
    }

    pub async fn shutdown(&mut self) {
        self.drop_session().await;
    }

    pub fn state(&self) -> NavigationState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(NavigationState::Idle)
    }

    /// States visited by the most recent request, in order.
    pub fn transitions(&self) -> &[NavigationState] {
        &self.transitions
    }

    pub fn steps(&self) -> &[ToolStep] {
        &self.steps
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    async fn run_request(&mut self, text: &str) -> Result<Resolution, NavigationError> {
        self.enter(NavigationState::IntentExtraction);
        self.context.add_turn(MessageRole::User, text)?;
        let summary = self.context.summary();
        let intent = self.extract_intent(text, &summary).await;
        debug!(?intent, "intent extracted");

        let facts = self.context.facts().clone();
        let preference = intent
            .preference
            .or(facts.preference)
            .unwrap_or(RoutePreference::Fastest);
        let mut origin = match intent.origin.as_deref() {
            Some(name) if self.is_current_location(name) => self.settings.default_origin.clone(),
            Some(name) => self.known_location(name),
            None => facts
                .origin
                .clone()
                .unwrap_or_else(|| self.settings.default_origin.clone()),
        };
        let mut destination = match intent.destination.as_deref() {
            Some(name) => self.known_location(name),
            None => facts.destination.clone().ok_or_else(|| {
                NavigationError::incomplete("the request does not name a destination")
            })?,
        };

        self.context.set_fact(SessionFact::Origin(origin.clone()));
        self.context.set_fact(SessionFact::Destination(destination.clone()));
        self.context.set_fact(SessionFact::Preference(preference));

        if !origin.is_resolved() {
            self.resolve_location(&mut origin, &summary).await?;
            self.context.set_fact(SessionFact::Origin(origin.clone()));
        }
        if !destination.is_resolved() {
            self.resolve_location(&mut destination, &summary).await?;
            self.context.set_fact(SessionFact::Destination(destination.clone()));
        }

        let url = navigation_url(&origin, &destination, preference)?;
        Ok(Resolution {
            origin,
            destination,
            preference,
            url: url.to_string(),
        })
    }

    async fn extract_intent(&self, text: &str, summary: &str) -> NavigationIntent {
        let from_model = match self.model.extract_intent(text, summary).await {
            Ok(intent) => intent,
            Err(err) => {
                warn!(model = self.model.name(), %err, "intent extraction failed, using rules");
                None
            }
        };
        match from_model {
            Some(intent) if intent.destination.is_some() => intent,
            Some(intent) => intent.or(parse_intent(text)),
            None => parse_intent(text),
        }
    }

    async fn resolve_location(
        &mut self,
        location: &mut LocationRef,
        summary: &str,
    ) -> Result<(), NavigationError> {
        let place = location.name().to_string();
        self.enter(NavigationState::ToolSelection);
        let registry = self.registry().await?;
        let selection = self.select_tool(&place, &registry, summary).await?;

        self.enter(NavigationState::ToolInvocation);
        let (result, attempts) = self.invoke(&selection).await?;
        self.steps.push(ToolStep {
            place: place.clone(),
            tool: selection.tool.clone(),
            attempts,
        });

        self.enter(NavigationState::ResultInterpretation);
        let coordinate = self.interpret(&place, &selection.tool, &result).await?;
        location.resolve(coordinate);
        info!(place = %place, tool = %selection.tool, %coordinate, "location resolved");
        self.remember(
            MessageRole::System,
            &format!("Resolved {place} to {coordinate} via {}", selection.tool),
        );
        Ok(())
    }

    async fn select_tool(
        &self,
        place: &str,
        registry: &ToolRegistry,
        summary: &str,
    ) -> Result<ToolSelection, NavigationError> {
        match self.model.select_tool(place, registry, summary).await {
            Ok(Some(selection)) => match registry.get(&selection.tool) {
                Some(descriptor) => match unfilled_parameter(descriptor, &selection.arguments) {
                    None => return Ok(selection),
                    Some(parameter) => warn!(
                        tool = %selection.tool,
                        parameter,
                        "model left a required parameter empty, using rules"
                    ),
                },
                None => warn!(tool = %selection.tool, "model picked an unknown tool, using rules"),
            },
            Ok(None) => debug!(model = self.model.name(), "model made no tool choice"),
            Err(err) => warn!(model = self.model.name(), %err, "tool selection failed, using rules"),
        }

        let selection = select_geocoding_tool(place, registry).ok_or(NavigationError::NoGeocoder)?;
        if let Some(parameter) = registry
            .get(&selection.tool)
            .and_then(|descriptor| unfilled_parameter(descriptor, &selection.arguments))
        {
            return Err(NavigationError::incomplete(format!(
                "tool '{}' needs '{parameter}', which the request does not provide",
                selection.tool
            )));
        }
        Ok(selection)
    }

    async fn invoke(
        &mut self,
        selection: &ToolSelection,
    ) -> Result<(ToolResult, u8), NavigationError> {
        let first = self
            .session()
            .await?
            .call_tool(&selection.tool, selection.arguments.clone())
            .await;
        let err = match first {
            Ok(result) => return Ok((result, 1)),
            Err(err) => err,
        };
        if !err.is_retryable() || self.connector.is_none() {
            return Err(err.into());
        }

        warn!(tool = %selection.tool, %err, "tool call failed, reconnecting once");
        self.drop_session().await;
        let result = self
            .session()
            .await?
            .call_tool(&selection.tool, selection.arguments.clone())
            .await?;
        Ok((result, 2))
    }

    async fn interpret(
        &self,
        place: &str,
        tool: &str,
        result: &ToolResult,
    ) -> Result<Coordinate, NavigationError> {
        if let ToolResult::Error(message) = result {
            return Err(NavigationError::interpretation(place, tool, message.as_str()));
        }
        match self.model.interpret_tool_result(tool, result).await {
            Ok(coordinate) => return Ok(coordinate),
            Err(err) => debug!(
                model = self.model.name(),
                %err,
                "model could not interpret the result, parsing it directly"
            ),
        }
        coordinate_from_result(result).ok_or_else(|| {
            NavigationError::interpretation(place, tool, "no coordinate in tool result")
        })
    }

    /// Tool catalogue of the current session, reconnecting once when the
    /// listing fails on a transport error.
    async fn registry(&mut self) -> Result<Arc<ToolRegistry>, NavigationError> {
        let err = match self.session().await?.list_tools().await {
            Ok(registry) => return Ok(registry),
            Err(err) => err,
        };
        if !err.is_retryable() || self.connector.is_none() {
            return Err(err.into());
        }
        warn!(%err, "listing tools failed, reconnecting once");
        self.drop_session().await;
        Ok(self.session().await?.list_tools().await?)
    }

    async fn session(&mut self) -> Result<&ProtocolSession, NavigationError> {
        if self.session.as_ref().is_some_and(ProtocolSession::is_closed) && self.connector.is_some()
        {
            debug!("session closed underneath, reconnecting");
            self.drop_session().await;
        }
        if self.session.is_none() {
            let connector = self.connector.clone().ok_or(NavigationError::NoToolHost)?;
            info!(connector = %connector.describe(), "opening tool host session");
            let session = match connector.connect().await {
                Ok(session) => session,
                Err(err) if err.is_retryable() => {
                    warn!(connector = %connector.describe(), %err, "connecting failed, retrying once");
                    connector.connect().await?
                }
                Err(err) => return Err(err.into()),
            };
            self.session = Some(session);
        }
        self.session.as_ref().ok_or(NavigationError::NoToolHost)
    }

    async fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    fn known_location(&self, name: &str) -> LocationRef {
        let facts = self.context.facts();
        [facts.origin.as_ref(), facts.destination.as_ref()]
            .into_iter()
            .flatten()
            .find(|known| known.is_resolved() && known.name() == name)
            .cloned()
            .unwrap_or_else(|| LocationRef::unresolved(name))
    }

    fn is_current_location(&self, name: &str) -> bool {
        let lowered = name.trim().to_lowercase();
        self.settings
            .current_location_keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .any(|keyword| !keyword.is_empty() && lowered.contains(&keyword))
    }

    fn enter(&mut self, state: NavigationState) {
        debug!(%state, "navigation state");
        self.transitions.push(state);
    }

    fn remember(&mut self, role: MessageRole, text: &str) {
        if let Err(err) = self.context.add_turn(role, text) {
            debug!(%err, "turn not recorded");
        }
    }
}

fn unfilled_parameter<'a>(
    descriptor: &'a ToolDescriptor,
    arguments: &JsonMap<String, Value>,
) -> Option<&'a str> {
    descriptor
        .required_parameters()
        .find(|parameter| arguments.get(*parameter).is_none_or(is_blank))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}
