//! Shared application state.

use std::sync::Arc;

use crate::assistant::CodeAssistant;
use crate::gateway::SandboxGateway;
use crate::registry::SessionRegistry;
use crate::service::ExecutionService;

/// State shared by all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: ExecutionService,
    pub assistant: Arc<CodeAssistant>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn SandboxGateway>, assistant: CodeAssistant) -> Self {
        let registry = Arc::new(SessionRegistry::new(gateway));
        Self {
            service: ExecutionService::new(registry),
            assistant: Arc::new(assistant),
        }
    }
}
