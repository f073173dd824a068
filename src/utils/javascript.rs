use crate::core::PageTrait;
use crate::errors::Result;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Expression reporting `{ readyState, resources, pending }` for load-state
/// polling. `pending` counts resource entries that have not finished.
pub const LOAD_STATE_PROBE: &str = r#"(() => {
    const entries = performance.getEntriesByType('resource');
    return {
        readyState: document.readyState,
        resources: entries.length,
        pending: entries.filter(e => e.responseEnd === 0).length,
    };
})()"#;

/// Called with `{ limit }` in any frame; returns the frame's visible text,
/// preferring a semantic content container over the whole body.
pub const FRAME_TEXT_SCRIPT: &str = r#"function (args) {
    const candidates = [
        'main', '[role="main"]', 'article', '#content',
        '.inbox', '.message-list', '.mail-list', '.email-list',
        'table', '[role="grid"]', '[role="list"]', '[role="tabpanel"]',
    ];
    let root = null;
    for (const sel of candidates) {
        root = document.querySelector(sel);
        if (root) break;
    }
    if (!root) root = document.body;
    if (!root) return '';
    return (root.innerText || '').slice(0, args.limit);
}"#;

/// Clicks the first visible consent/cookie accept control; returns whether
/// one was found.
pub const DISMISS_BANNERS_SCRIPT: &str = r#"(() => {
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== 'hidden';
    };
    const selectors = [
        'button[id*="accept"]', 'button[id*="cookie"]', 'button[id*="consent"]',
        'button[class*="accept"]', 'button[class*="cookie"]',
        '[aria-label*="Accept"]', '[aria-label*="Close"]',
    ];
    for (const sel of selectors) {
        const el = document.querySelector(sel);
        if (el && visible(el)) { el.click(); return true; }
    }
    const labels = ['accept all', 'i agree', 'got it', 'ok'];
    for (const el of document.querySelectorAll('button')) {
        const text = (el.innerText || '').trim().toLowerCase();
        if (labels.includes(text) && visible(el)) { el.click(); return true; }
    }
    return false;
})()"#;

pub const ELEMENT_CLICK_SCRIPT: &str = r#"function () {
    this.scrollIntoView({ block: 'center' });
    if (typeof this.focus === 'function') this.focus();
    this.click();
    return true;
}"#;

/// Bound to a `<select>`; called with `(value, label)`, either may be null.
/// Returns whether an option matched.
pub const SELECT_OPTION_SCRIPT: &str = r#"function (value, label) {
    const options = Array.from(this.options || []);
    const match = options.find(o => value !== null ? o.value === value : o.text.trim() === label);
    if (!match) return false;
    this.value = match.value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

/// Frame-scoped interaction, called with
/// `{ selector, action, value, label }` where action is one of
/// `click`, `focus`, `clear`, `hover`, `select`. Returns `{ ok, error }`.
pub const FRAME_ACTION_SCRIPT: &str = r#"function (args) {
    const el = document.querySelector(args.selector);
    if (!el) return { ok: false, error: 'no element matches ' + args.selector };
    el.scrollIntoView({ block: 'center' });
    switch (args.action) {
        case 'click':
            el.click();
            return { ok: true };
        case 'focus':
            el.focus();
            return { ok: true };
        case 'clear':
            el.focus();
            if (el.isContentEditable) {
                document.execCommand('selectAll', false, null);
                document.execCommand('delete', false, null);
            } else if ('value' in el) {
                el.select && el.select();
                el.value = '';
                el.dispatchEvent(new Event('input', { bubbles: true }));
            }
            return { ok: true };
        case 'hover':
            for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
                el.dispatchEvent(new MouseEvent(type, { bubbles: type !== 'mouseenter' }));
            }
            return { ok: true };
        case 'select': {
            const options = Array.from(el.options || []);
            const match = options.find(o => args.value !== null ? o.value === args.value : o.text.trim() === args.label);
            if (!match) return { ok: false, error: 'no option matches' };
            el.value = match.value;
            el.dispatchEvent(new Event('input', { bubbles: true }));
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return { ok: true };
        }
        default:
            return { ok: false, error: 'unsupported action ' + args.action };
    }
}"#;

pub const SELECTOR_PRESENT_SCRIPT: &str = r#"function (args) {
    return document.querySelector(args.selector) !== null;
}"#;

pub const HISTORY_BACK_SCRIPT: &str = "history.back()";
pub const HISTORY_FORWARD_SCRIPT: &str = "history.forward()";

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    /// Script errors while the page is changing count as "not yet".
    pub async fn wait_for_condition<P: PageTrait>(
        page: &P,
        function: &str,
        args: Value,
        timeout_ms: u64,
        poll_interval_ms: u64,
    ) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let poll_interval = Duration::from_millis(poll_interval_ms);

        loop {
            match page.call_in_frame(0, function, args.clone()).await {
                Ok(Value::Bool(true)) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_session_lost() => return Err(e),
                Err(e) => debug!("condition probe failed: {}", e),
            }
            if Instant::now() + poll_interval > deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn dismiss_banners<P: PageTrait>(page: &P) -> bool {
        match page.evaluate(DISMISS_BANNERS_SCRIPT).await {
            Ok(Value::Bool(clicked)) => clicked,
            Ok(_) => false,
            Err(e) => {
                debug!("banner dismissal skipped: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_condition_sees_late_element() {
        let page = FakePage::new("https://a.test/");
        page.set_selector_present_after("#done", 3);

        let found = JavaScriptRunner::wait_for_condition(
            &page,
            SELECTOR_PRESENT_SCRIPT,
            json!({ "selector": "#done" }),
            5_000,
            100,
        )
        .await
        .unwrap();
        assert!(found);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_condition_gives_up() {
        let page = FakePage::new("https://a.test/");
        let started = Instant::now();
        let found = JavaScriptRunner::wait_for_condition(
            &page,
            SELECTOR_PRESENT_SCRIPT,
            json!({ "selector": "#never" }),
            1_000,
            100,
        )
        .await
        .unwrap();
        assert!(!found);
        assert!(started.elapsed() <= Duration::from_millis(1_000));
    }

    #[test]
    fn test_scripts_take_structured_arguments() {
        for script in [FRAME_TEXT_SCRIPT, FRAME_ACTION_SCRIPT, SELECTOR_PRESENT_SCRIPT] {
            assert!(script.starts_with("function (args)"));
        }
    }
}
