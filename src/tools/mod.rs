pub mod echo;

use crate::registry::Registry;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Local tool discovery: registers every in-process tool. Unlike
/// external/remote entries, local tools are never restored from disk — they
/// are compiled into the binary and registered fresh on every startup. A
/// conflict here means persisted state collided with a builtin tool_id,
/// which should never happen and is treated as an invariant violation
/// rather than an ordinary startup failure.
pub async fn register_builtin(registry: &Arc<Registry>) -> anyhow::Result<()> {
    registry
        .register_local(Arc::new(echo::EchoTool::default()), BTreeSet::new(), BTreeSet::new())
        .await
        .map_err(|e| {
            anyhow::Error::from(crate::errors::InvariantViolation(format!(
                "failed to register builtin echo tool: {}",
                e.message()
            )))
        })?;
    Ok(())
}
