//! Remote page profile: URL markers, event matchers and page scripts for the merge form.

use crate::config::InvoiceConfig;
use crate::driver::Event;
use serde_json::Value;

pub const ACK_EVENT: &str = "Network.responseReceived";
pub const RESPONSE_BODY_METHOD: &str = "Network.getResponseBody";
pub const NETWORK_ENABLE_METHOD: &str = "Network.enable";

/// Where and how the merge form lives on the remote page.
#[derive(Debug, Clone)]
pub struct PageProfile {
    pub base_url: String,
    /// URL fragments left behind by a previous submission.
    pub aftermath_markers: Vec<String>,
    /// URL fragments of the order listing.
    pub listing_markers: Vec<String>,
    /// URL fragments of the merge form.
    pub form_markers: Vec<String>,
    /// Method exposed by the form component; used to locate it.
    pub component_method: String,
    /// Global the located component is bound to.
    pub component_handle: String,
    pub ack_url_marker: String,
    pub finalize_url_marker: String,
    /// Text shown once the merge request is accepted.
    pub applied_text: String,
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            base_url: "https://invoice-m.jd.com/#/orderList?sourceId=0".to_string(),
            aftermath_markers: vec!["changeSuccess".to_string(), "ivcTitle".to_string()],
            listing_markers: vec!["orderList".to_string(), "hkList".to_string()],
            form_markers: vec!["ivcTitle".to_string(), "HksAppIvcTitle".to_string()],
            component_method: "commitBatchHkfpReq".to_string(),
            component_handle: "__vm".to_string(),
            ack_url_marker: "checkMerge".to_string(),
            finalize_url_marker: "DoMerge".to_string(),
            applied_text: "已申请".to_string(),
        }
    }
}

fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| haystack.contains(m.as_str()))
}

/// Render an evaluated value the way it is compared against markers.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

impl PageProfile {
    pub fn is_aftermath(&self, url: &str) -> bool {
        contains_any(url, &self.aftermath_markers)
    }

    pub fn is_listing(&self, url: &str) -> bool {
        contains_any(url, &self.listing_markers)
    }

    pub fn is_form(&self, url: &str) -> bool {
        contains_any(url, &self.form_markers)
    }

    pub fn location_expr(&self) -> &'static str {
        "location.href"
    }

    pub fn navigate_expr(&self) -> String {
        format!("location.href={}", js_string(&self.base_url))
    }

    /// Switch the listing to the re-issue tab.
    pub fn select_tab_expr(&self) -> &'static str {
        "var tab = document.querySelector('.tab-title-item.change');\nif (tab) tab.click();"
    }

    pub fn check_first_order_expr(&self) -> &'static str {
        "var cb = document.querySelector('.order-box-item input[type=checkbox]');\nif (cb && !cb.checked) cb.click();"
    }

    pub fn open_form_expr(&self) -> &'static str {
        "var btn = document.querySelector('button.nut-button.primary');\nif (btn) btn.click();"
    }

    /// Fill the form and hand `orders` to the component's commit method.
    /// Evaluates to `'OK'` on success.
    pub fn commit_expr(&self, invoice: &InvoiceConfig, orders: &Value) -> String {
        let handle = js_string(&self.component_handle);
        let method = js_string(&self.component_method);
        format!(
            r#"(function() {{
    var vm = window[{handle}];
    if (!vm) return 'no_vm';
    vm.formData.invoiceModelType = 2;
    vm.formData.ivcTitleType = {title_type};
    vm.formData.ivcType = {invoice_type};
    vm.formData.ivcContent = {content};
    vm.formData.changeReason = {change_reason};
    if (vm.formData.self) vm.formData.self.ivcTitle = {title};
    var orders = {orders};
    try {{
        vm[{method}](orders);
        return 'OK';
    }} catch(e) {{
        return 'commit_error: ' + e.message;
    }}
}})()"#,
            title_type = invoice.title_type,
            invoice_type = invoice.invoice_type,
            content = invoice.content,
            change_reason = js_string(&invoice.change_reason),
            title = js_string(&invoice.title),
        )
    }

    /// Finalize once the component has built its groups. Evaluates to `'submitMerge_ok'`.
    pub fn readiness_expr(&self) -> String {
        let handle = js_string(&self.component_handle);
        format!(
            r#"(function() {{
    var vm = window[{handle}];
    if (!vm) return 'no_vm';
    if (vm.groupList && vm.groupList.length > 0) {{
        vm.submitMerge();
        return 'submitMerge_ok';
    }}
    return 'waiting_groupList';
}})()"#
        )
    }

    pub fn page_text_expr(&self) -> &'static str {
        "document.body.innerText.substring(0, 200)"
    }

    /// HTTP status of a network response event whose URL contains `marker`.
    fn response_status(event: &Event, marker: &str) -> Option<Option<i64>> {
        if event.method != ACK_EVENT {
            return None;
        }
        let response = event.params.get("response")?;
        let url = response.get("url").and_then(Value::as_str).unwrap_or("");
        if !url.contains(marker) {
            return None;
        }
        Some(response.get("status").and_then(Value::as_i64))
    }

    pub fn is_ack(&self, event: &Event) -> bool {
        Self::response_status(event, &self.ack_url_marker).is_some()
    }

    /// Status carried by an acknowledgement event.
    pub fn ack_status(&self, event: &Event) -> Option<i64> {
        Self::response_status(event, &self.ack_url_marker).flatten()
    }

    pub fn is_finalize(&self, event: &Event) -> bool {
        Self::response_status(event, &self.finalize_url_marker).is_some()
    }

    pub fn request_id<'e>(&self, event: &'e Event) -> Option<&'e str> {
        event.params.get("requestId").and_then(Value::as_str)
    }
}
