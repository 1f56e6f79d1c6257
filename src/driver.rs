//! Remote Automation Driver
//!
//! The executor talks to the remote page only through `AutomationDriver`: evaluate an
//! expression, send a fire-and-forget command, wait for an asynchronous event, discard
//! buffered events. One channel multiplexes id-correlated responses with unsolicited events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

pub mod cdp;

pub use cdp::{discover_target, CdpDriver};

/// Driver failures. `Timeout` is the only variant the executor treats as a protocol timeout.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out after {after:?} waiting for {waiting_for}")]
    Timeout { waiting_for: String, after: Duration },

    #[error("Remote channel closed")]
    Closed,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Target discovery failed: {0}")]
    Discovery(String),
}

impl DriverError {
    pub fn timeout(waiting_for: impl Into<String>, after: Duration) -> Self {
        DriverError::Timeout {
            waiting_for: waiting_for.into(),
            after,
        }
    }
}

/// Outgoing command: `{id, method, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Asynchronous notification; carries no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Event {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Anything read off the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: u64,
        result: Result<Value, (i64, String)>,
    },
    Event(Event),
}

impl Incoming {
    /// Classify one text frame. A frame with an `id` is a response, one with only a
    /// `method` is an event.
    pub fn parse(text: &str) -> Result<Self, DriverError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DriverError::Protocol(format!("invalid frame: {}", e)))?;

        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            if let Some(error) = value.get("error") {
                let body: RemoteErrorBody = serde_json::from_value(error.clone())
                    .map_err(|e| DriverError::Protocol(format!("invalid error body: {}", e)))?;
                return Ok(Incoming::Response {
                    id,
                    result: Err((body.code, body.message)),
                });
            }
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            return Ok(Incoming::Response {
                id,
                result: Ok(result),
            });
        }

        if value.get("method").is_some() {
            let event: Event = serde_json::from_value(value)
                .map_err(|e| DriverError::Protocol(format!("invalid event: {}", e)))?;
            return Ok(Incoming::Event(event));
        }

        Err(DriverError::Protocol(format!(
            "frame has neither id nor method: {}",
            text
        )))
    }
}

/// Unwrap a `Runtime.evaluate` result: the inner `value` when present, else the inner object.
pub fn evaluation_value(result: &Value) -> Value {
    let inner = result.get("result").cloned().unwrap_or(Value::Null);
    match inner.get("value") {
        Some(value) => value.clone(),
        None => inner,
    }
}

pub fn evaluate_params(expression: &str) -> Value {
    json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

/// Predicate applied to incoming events while waiting.
pub type EventFilter<'a> = &'a (dyn Fn(&Event) -> bool + Send + Sync);

/// Remote automation channel
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Send a command and wait up to `timeout` for its correlated response.
    async fn call(&self, method: &str, params: Value, timeout: Duration)
        -> Result<Value, DriverError>;

    /// Send a command without waiting; its response is discarded.
    async fn send_command(&self, method: &str, params: Value) -> Result<(), DriverError>;

    /// Wait for the first event accepted by `filter`. Rejected events are dropped.
    async fn await_event(
        &self,
        filter: EventFilter<'_>,
        timeout: Duration,
    ) -> Result<Event, DriverError>;

    /// Discard buffered events. Returns how many were dropped.
    async fn drain_pending(&self) -> usize;

    /// Evaluate an expression in the page and return its value.
    async fn evaluate(&self, expression: &str, timeout: Duration) -> Result<Value, DriverError> {
        let result = self
            .call("Runtime.evaluate", evaluate_params(expression), timeout)
            .await?;
        Ok(evaluation_value(&result))
    }

    /// Find a live page component exposing `method_name` and bind it to `window[handle]`.
    async fn find_component(
        &self,
        method_name: &str,
        handle: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let expression = component_lookup_expr(method_name, handle);
        let found = self.evaluate(&expression, timeout).await?;
        Ok(found.as_bool().unwrap_or(false))
    }
}

fn component_lookup_expr(method_name: &str, handle: &str) -> String {
    let method_name = Value::String(method_name.to_string());
    let handle = Value::String(handle.to_string());
    format!(
        r#"(function() {{
    var els = document.querySelectorAll('*');
    for (var i = 0; i < els.length; i++) {{
        var vm = els[i].__vue__;
        if (vm && vm.$options && vm.$options.methods &&
            vm.$options.methods[{method_name}]) {{
            window[{handle}] = vm;
            return true;
        }}
    }}
    return false;
}})()"#
    )
}
