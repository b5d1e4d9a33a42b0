mod schema;

pub use schema::{FieldSpec, FieldType, ToolSchema};

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cadence_types::{Error, Result};
use serde_json::{Value, json};
use tracing::debug;

/// Reserved name that returns the registry itself
pub const LIST_TOOLS: &str = "_list_tools";

const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What a tool does to server state when called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Read,
    Mutate,
    Destructive,
}

impl SideEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffect::Read => "read",
            SideEffect::Mutate => "mutate",
            SideEffect::Destructive => "destructive",
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// A named, schema-validated operation
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub side_effect: SideEffect,
    pub schema: ToolSchema,
    pub handler: Handler,
}

impl ToolDef {
    pub fn new<F, Fut>(
        name: &str,
        description: &str,
        side_effect: SideEffect,
        schema: ToolSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            side_effect,
            schema,
            handler: Arc::new(move |params| Box::pin(handler(params))),
        }
    }
}

/// Registry populated at startup by each component registering its
/// operations. Handlers are re-entrant; they never touch the bus directly
/// and publish through observables instead.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<ToolDef>>>,
    dispatch_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DISPATCH_TIMEOUT)
    }

    pub fn with_timeout(dispatch_timeout: Duration) -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            dispatch_timeout,
        }
    }

    pub fn register(&self, def: ToolDef) -> Result<()> {
        if def.name == LIST_TOOLS {
            return Err(Error::Conflict(format!("{} is reserved", LIST_TOOLS)));
        }
        let mut tools = self
            .tools
            .write()
            .map_err(|_| Error::Storage("registry lock poisoned".into()))?;
        if tools.contains_key(&def.name) {
            return Err(Error::Conflict(format!(
                "tool {} already registered",
                def.name
            )));
        }
        tools.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .map(|tools| tools.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tools.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registry dump served for the reserved `_list_tools` name
    pub fn list(&self) -> Value {
        let tools = match self.tools.read() {
            Ok(tools) => tools,
            Err(_) => return json!({ "tools": [] }),
        };
        let entries: Vec<Value> = tools
            .values()
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "side_effect": def.side_effect.as_str(),
                    "input_schema": def.schema.to_json(),
                })
            })
            .collect();
        json!({ "tools": entries })
    }

    /// Validate → call → bound by the dispatch wall clock.
    pub async fn dispatch(&self, tool: &str, params: Value) -> Result<Value> {
        if tool == LIST_TOOLS {
            return Ok(self.list());
        }

        let def = {
            let tools = self
                .tools
                .read()
                .map_err(|_| Error::Storage("registry lock poisoned".into()))?;
            match tools.get(tool) {
                Some(def) => def.clone(),
                None => {
                    return Err(Error::UnknownTool {
                        name: tool.to_string(),
                        suggestions: closest_names(tool, tools.keys()),
                    });
                }
            }
        };

        let typed = def.schema.validate(&params)?;
        debug!(tool, "dispatching");

        match tokio::time::timeout(self.dispatch_timeout, (def.handler)(typed)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "tool {} exceeded {:?}",
                tool, self.dispatch_timeout
            ))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest-common-prefix ranking; close misses like `session_statu`
/// surface `session_status` first.
fn closest_names<'a>(query: &str, names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = names
        .map(|name| (common_prefix_len(query, name), name.clone()))
        .filter(|(score, _)| *score >= 4)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(3).map(|(_, name)| name).collect()
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> ToolDef {
        ToolDef::new(
            "echo",
            "returns its params",
            SideEffect::Read,
            ToolSchema::new().required("message", FieldType::String, "text to echo"),
            |params| async move { Ok(json!({ "echo": params["message"] })) },
        )
    }

    #[tokio::test]
    async fn dispatch_validates_then_calls() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let out = registry
            .dispatch("echo", json!({ "message": "hi" }))
            .await
            .unwrap();
        assert_eq!(out["echo"], "hi");

        let err = registry.dispatch("echo", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
    }

    #[tokio::test]
    async fn unknown_tool_suggests_neighbours() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let err = registry.dispatch("echo_loud", json!({})).await.unwrap_err();
        match err {
            Error::UnknownTool { suggestions, .. } => {
                assert_eq!(suggestions, vec!["echo".to_string()])
            }
            other => panic!("expected UnknownTool, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();
        let err = registry.register(echo_tool()).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn reserved_name_cannot_be_registered() {
        let registry = ToolRegistry::new();
        let def = ToolDef::new(
            LIST_TOOLS,
            "shadow",
            SideEffect::Read,
            ToolSchema::new(),
            |_| async { Ok(json!(null)) },
        );
        assert!(registry.register(def).is_err());
    }

    #[tokio::test]
    async fn slow_handlers_report_timeout() {
        let registry = ToolRegistry::with_timeout(Duration::from_millis(20));
        registry
            .register(ToolDef::new(
                "sleepy",
                "never wakes in time",
                SideEffect::Read,
                ToolSchema::new(),
                |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!(null))
                },
            ))
            .unwrap();

        let err = registry.dispatch("sleepy", json!({})).await.unwrap_err();
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn list_tools_round_trips_examples() {
        let registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let listing = registry.dispatch(LIST_TOOLS, json!({})).await.unwrap();
        let tools = listing["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);

        // Every listed tool is callable and its schema validates its own
        // example.
        for entry in tools {
            let name = entry["name"].as_str().unwrap();
            let tools_guard = registry.tools.read().unwrap();
            let def = tools_guard.get(name).unwrap();
            let example = def.schema.example();
            assert!(def.schema.validate(&example).is_ok());
        }
    }
}
