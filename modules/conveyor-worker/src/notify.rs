//! Notification decoration: when a work has a notification channel
//! configured, artifact paths are wrapped as Slack-style links against the
//! workspace's products baseurl before the final report.

use conveyor_common::{Work, Workspace};

pub fn decorate(work: &mut Work, workspace: &Workspace) {
    if !work.notify.is_configured() {
        return;
    }
    let base = workspace.baseurl("products").unwrap_or_default().to_string();
    if let Some(products) = &mut work.products {
        for path in products.iter_mut() {
            *path = format!("<{base}{path}|{path}>");
        }
    }
    if let Some(plots) = &mut work.plots {
        for path in plots.iter_mut() {
            *path = format!("<{base}{path}|{path}>");
        }
    }
}
