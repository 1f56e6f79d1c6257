//! Scripted in-memory page used to drive the executor without a browser.

use async_trait::async_trait;
use ivcmerge::driver::{AutomationDriver, DriverError, Event, EventFilter};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

pub const LISTING_URL: &str = "https://invoice-m.jd.com/#/orderList?sourceId=0";
pub const FORM_URL: &str = "https://invoice-m.jd.com/#/HksAppIvcTitle?from=merge";
pub const SUCCESS_URL: &str = "https://invoice-m.jd.com/#/changeSuccess";

pub const ACCEPTED_BODY: &str = r#"{"code":0,"data":{"allSuccess":true}}"#;

/// How the page responds. Fields apply to every attempt.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub start_url: String,
    pub navigation_works: bool,
    pub form_opens: bool,
    pub component_present: bool,
    pub commit_reply: String,
    /// `None` never acknowledges.
    pub ack_status: Option<i64>,
    /// Readiness replies in order; the last one repeats.
    pub readiness: Vec<String>,
    /// `None` never delivers the finalize event.
    pub finalize_body: Option<String>,
    pub page_text: String,
    /// Every call fails as if the channel were gone.
    pub unreachable: bool,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            start_url: LISTING_URL.to_string(),
            navigation_works: true,
            form_opens: true,
            component_present: true,
            commit_reply: "OK".to_string(),
            ack_status: Some(200),
            readiness: vec!["waiting_groupList".to_string(), "submitMerge_ok".to_string()],
            finalize_body: Some(ACCEPTED_BODY.to_string()),
            page_text: String::new(),
            unreachable: false,
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    events: VecDeque<Event>,
    readiness_polls: usize,
    evaluations: Vec<String>,
    commands: Vec<String>,
    commits: Vec<Value>,
    navigations: usize,
    drained: usize,
}

pub struct ScriptedDriver {
    script: Mutex<PageScript>,
    state: Mutex<PageState>,
}

impl ScriptedDriver {
    pub fn new(script: PageScript) -> Self {
        let state = PageState {
            url: script.start_url.clone(),
            // left over from before monitoring was enabled; must be drained
            events: VecDeque::from(vec![response_event("stale-1", "/checkMergeHkfpReq", 500)]),
            ..PageState::default()
        };
        Self {
            script: Mutex::new(script),
            state: Mutex::new(state),
        }
    }

    pub fn set_script(&self, script: PageScript) {
        *self.script.lock() = script;
    }

    pub fn commits(&self) -> Vec<Value> {
        self.state.lock().commits.clone()
    }

    pub fn evaluation_count(&self) -> usize {
        self.state.lock().evaluations.len()
    }

    pub fn navigations(&self) -> usize {
        self.state.lock().navigations
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn drained(&self) -> usize {
        self.state.lock().drained
    }

    fn evaluate_expression(&self, expression: &str) -> Value {
        let script = self.script.lock().clone();
        let mut state = self.state.lock();
        state.evaluations.push(expression.to_string());

        if expression == "location.href" {
            return json!(state.url);
        }
        if expression.starts_with("location.href=") {
            state.navigations += 1;
            if script.navigation_works {
                state.url = LISTING_URL.to_string();
            }
            return json!(LISTING_URL);
        }
        if expression.contains("button.nut-button.primary") {
            if script.form_opens {
                state.url = FORM_URL.to_string();
            }
            return Value::Null;
        }
        if expression.contains("__vue__") {
            return json!(script.component_present);
        }
        if expression.contains("formData.invoiceModelType") {
            state.commits.push(extract_orders(expression));
            state.readiness_polls = 0;
            if script.commit_reply == "OK" {
                state
                    .events
                    .push_back(Event::new("Page.frameNavigated", json!({"frame": {}})));
                if let Some(status) = script.ack_status {
                    state
                        .events
                        .push_back(response_event("ack-1", "/checkMergeHkfpReq", status));
                }
            }
            return json!(script.commit_reply);
        }
        if expression.contains("groupList") {
            let idx = state.readiness_polls.min(script.readiness.len().saturating_sub(1));
            state.readiness_polls += 1;
            let reply = script
                .readiness
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "waiting_groupList".to_string());
            if reply == "submitMerge_ok" && script.finalize_body.is_some() {
                state
                    .events
                    .push_back(response_event("merge-1", "/appDoMergeHkfpReq", 200));
                state.url = SUCCESS_URL.to_string();
            }
            return json!(reply);
        }
        if expression.contains("innerText") {
            return json!(script.page_text);
        }
        Value::Null
    }
}

/// Pull the injected order array back out of a commit expression.
fn extract_orders(expression: &str) -> Value {
    expression
        .lines()
        .find_map(|line| line.trim().strip_prefix("var orders = "))
        .and_then(|rest| serde_json::from_str(rest.trim_end_matches(';')).ok())
        .unwrap_or(Value::Null)
}

pub fn response_event(request_id: &str, path: &str, status: i64) -> Event {
    Event::new(
        "Network.responseReceived",
        json!({
            "requestId": request_id,
            "response": { "url": format!("https://api.m.jd.com{}", path), "status": status }
        }),
    )
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn call(
        &self,
        method: &str,
        params: Value,
        _timeout: Duration,
    ) -> Result<Value, DriverError> {
        if self.script.lock().unreachable {
            return Err(DriverError::Closed);
        }
        match method {
            "Runtime.evaluate" => {
                let expression = params["expression"].as_str().unwrap_or_default().to_string();
                let value = self.evaluate_expression(&expression);
                Ok(json!({ "result": { "type": "string", "value": value } }))
            }
            "Network.getResponseBody" => {
                let body = self.script.lock().finalize_body.clone().unwrap_or_default();
                Ok(json!({ "body": body, "base64Encoded": false }))
            }
            other => Err(DriverError::Remote {
                code: -32601,
                message: format!("'{}' wasn't found", other),
            }),
        }
    }

    async fn send_command(&self, method: &str, _params: Value) -> Result<(), DriverError> {
        if self.script.lock().unreachable {
            return Err(DriverError::Closed);
        }
        self.state.lock().commands.push(method.to_string());
        Ok(())
    }

    async fn await_event(
        &self,
        filter: EventFilter<'_>,
        timeout: Duration,
    ) -> Result<Event, DriverError> {
        let mut state = self.state.lock();
        while let Some(event) = state.events.pop_front() {
            if filter(&event) {
                return Ok(event);
            }
        }
        Err(DriverError::timeout("matching event", timeout))
    }

    async fn drain_pending(&self) -> usize {
        let mut state = self.state.lock();
        let drained = state.events.len();
        state.events.clear();
        state.drained += drained;
        drained
    }
}
