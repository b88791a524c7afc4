use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::domain::RunKind;
use crate::stats::RunSummary;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct Payload<'a> {
    run_id: i64,
    kind: RunKind,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// POST the run summary as JSON. Delivery problems are logged and otherwise ignored.
pub fn notify_webhook(url: &str, run_id: i64, kind: RunKind, summary: &RunSummary) -> bool {
    let agent = ureq::AgentBuilder::new().timeout(WEBHOOK_TIMEOUT).build();
    match agent.post(url).send_json(Payload {
        run_id,
        kind,
        summary,
    }) {
        Ok(resp) => {
            info!(status = resp.status(), "webhook notified");
            true
        }
        Err(ureq::Error::Status(code, _)) => {
            error!(status = code, "webhook rejected the notification");
            false
        }
        Err(ureq::Error::Transport(e)) => {
            error!(error = %e, "webhook failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_endpoint_is_not_fatal() {
        // port 9 on localhost: connection refused without any network access
        assert!(!notify_webhook(
            "http://127.0.0.1:9/hook",
            1,
            RunKind::Scan,
            &RunSummary::default()
        ));
    }
}
