use crate::envelope::Envelope;
use crate::errors::{RegistryError, Result};
use crate::tool::{ActionDescriptor, InvocationContext, Tool};
use async_trait::async_trait;
use serde_json::Value;

/// A minimal local tool used to exercise the registry end-to-end. Individual
/// tool business logic is out of scope; this exists only as a concrete
/// `Tool` implementation demonstrating the contract discovery registers.
pub struct EchoTool {
    actions: Vec<ActionDescriptor>,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self {
            actions: vec![ActionDescriptor::new("say", "echoes `text` back verbatim").requires(&["text"])],
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "echoes input back, for smoke-testing the registry"
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    fn actions(&self) -> &[ActionDescriptor] {
        &self.actions
    }

    async fn execute(
        &self,
        action_name: &str,
        parameters: Value,
        _context: &InvocationContext,
    ) -> Result<Envelope> {
        match action_name {
            "say" => Ok(Envelope::ok(parameters)),
            other => Err(RegistryError::not_found(format!("unknown action: {other}"))),
        }
    }
}
