//! Tool-invocation dispatch: every invocation the remote model issues
//! is consumed exactly once and answered with exactly one response
//! carrying the same correlation id, even when several invocations
//! arrive in one message.

use serde::Deserialize;

use crate::capability::Capability;
use crate::hud::{HudState, Role};
use crate::memory::{MemoryFact, MemoryVault};
use jarvis_realtime::types::{ToolDeclaration, ToolInvocation, ToolResponseEvent};

pub const SAVE_MEMORY: &str = "save_memory";
pub const WEB_SEARCH: &str = "web_search";
pub const FIND_NEARBY: &str = "find_nearby";

/// The tool roster advertised on `session.update`.
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration::new(
            SAVE_MEMORY,
            "Store personal info/preferences to the vault.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "category": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["category", "content"]
            }),
        ),
        ToolDeclaration::new(
            WEB_SEARCH,
            "Search the web for news or complex facts.",
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        ),
        ToolDeclaration::new(
            FIND_NEARBY,
            "Get location data or directions using Maps grounding.",
            serde_json::json!({
                "type": "object",
                "properties": { "location_query": { "type": "string" } },
                "required": ["location_query"]
            }),
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct SaveMemoryArgs {
    category: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct FindNearbyArgs {
    location_query: String,
}

/// Handles one invocation and always yields its single correlated
/// response; failures are folded into the result payload rather than
/// swallowing the response.
pub async fn dispatch_invocation(
    invocation: &ToolInvocation,
    capability: &dyn Capability,
    hud: &mut HudState,
    vault: &mut MemoryVault,
) -> ToolResponseEvent {
    hud.push_log(Role::System, format!("Protocol: {}", invocation.name()));

    let result = match invocation.name() {
        SAVE_MEMORY => match serde_json::from_value::<SaveMemoryArgs>(invocation.args().clone()) {
            Ok(args) => {
                let fact = MemoryFact {
                    category: args.category,
                    content: args.content,
                };
                match vault.remember(fact) {
                    Ok(()) => "ok".to_string(),
                    Err(e) => {
                        tracing::error!("failed to persist memory fact: {:?}", e);
                        format!("memory store failed: {}", e)
                    }
                }
            }
            Err(e) => format!("invalid save_memory arguments: {}", e),
        },
        WEB_SEARCH => match serde_json::from_value::<WebSearchArgs>(invocation.args().clone()) {
            Ok(args) => match capability.web_search(&args.query).await {
                Ok(grounded) => {
                    hud.set_grounding_sources(grounded.sources);
                    grounded.text
                }
                Err(e) => {
                    hud.push_log(Role::System, format!("Web search error: {}", e));
                    format!("web search failed: {}", e)
                }
            },
            Err(e) => format!("invalid web_search arguments: {}", e),
        },
        FIND_NEARBY => match serde_json::from_value::<FindNearbyArgs>(invocation.args().clone()) {
            Ok(args) => match capability.find_nearby(&args.location_query).await {
                Ok(grounded) => {
                    hud.set_grounding_sources(grounded.sources);
                    grounded.text
                }
                Err(e) => {
                    hud.push_log(Role::System, format!("Maps grounding error: {}", e));
                    format!("maps grounding failed: {}", e)
                }
            },
            Err(e) => format!("invalid find_nearby arguments: {}", e),
        },
        other => {
            tracing::warn!("unknown tool invocation: {}", other);
            format!("unknown tool: {}", other)
        }
    };

    ToolResponseEvent::new(
        invocation.id().to_string(),
        invocation.name().to_string(),
        serde_json::json!({ "result": result }),
    )
}
