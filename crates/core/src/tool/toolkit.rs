use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;

use super::object::{ToolObject, ToolObjectImpl};
use super::{Error, Tool, ToolResult};

const INSTRUCTION_HEADER: &str = "## Tool Functions:
The following tool functions are available in the format of
```
{index}. {function name}: {function description}
    {argument1 name} ({argument type}): {argument description}
    {argument2 name} ({argument type}): {argument description}
    ...
```
";

/// Describes a registered tool in a machine-readable form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// JSON schema of the parameters.
    pub parameters: Value,
}

/// A registry of tools, keyed by name.
///
/// Tools keep their registration order, which is also the order they are
/// listed in [`Toolkit::tools_instruction`]. The toolkit is meant to be
/// set up once and then only read.
#[derive(Clone, Default)]
pub struct Toolkit {
    tools: Vec<Arc<dyn ToolObject>>,
}

impl Toolkit {
    /// Creates an empty toolkit.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A tool with the same name is replaced in place.
    pub fn add<T: Tool>(&mut self, tool: T) {
        let tool: Arc<dyn ToolObject> = Arc::new(ToolObjectImpl(tool));
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => {
                debug!("replacing tool: {}", tool.name());
                *slot = tool;
            }
            None => self.tools.push(tool),
        }
    }

    /// Registers a tool, builder style.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add(tool);
        self
    }

    /// Returns `true` if a tool with the name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns `true` if the named tool ends the turn loop.
    #[inline]
    pub fn is_terminal(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.is_terminal())
    }

    /// Returns the names of all tools, in registration order.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the definitions of all tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().trim().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Returns the parameter names of the named tool, in declaration order.
    pub fn parameter_names(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(|t| t.parameter_schema().get("properties"))
            .and_then(Value::as_object)
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Renders the human-readable documentation of all tools.
    pub fn tools_instruction(&self) -> String {
        let mut instruction = String::from(INSTRUCTION_HEADER);
        instruction.push('\n');
        for (idx, tool) in self.tools.iter().enumerate() {
            let description = tool.description().trim();
            // Writing to a `String` never fails.
            let _ = writeln!(
                instruction,
                "{}. {}: {}",
                idx + 1,
                tool.name(),
                description
            );
            let properties = tool
                .parameter_schema()
                .get("properties")
                .and_then(Value::as_object);
            for (param, schema) in properties.into_iter().flatten() {
                let description = schema
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let _ = writeln!(
                    instruction,
                    "\t{param} ({}): {description}",
                    type_name(schema)
                );
            }
        }
        instruction
    }

    /// Calls the named tool with arguments as a JSON object.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!("tool not found: {name}");
            return Err(Error::invalid_input()
                .with_reason(format!("tool not found: {name}")));
        };
        trace!("calling tool ({name}) with args: {arguments:?}");
        tool.execute(arguments).await
    }

    #[inline]
    fn get(&self, name: &str) -> Option<&Arc<dyn ToolObject>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

fn type_name(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(ty)) => ty.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        _ => "any".to_owned(),
    }
}
