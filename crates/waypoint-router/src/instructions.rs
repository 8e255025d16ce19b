//! System instructions handed to the agent on every execution

use indoc::{formatdoc, indoc};
use waypoint_core::DISCOVER_TOOLS;

use crate::registry::SearchHit;

const NO_MATCHES: &str = "No matching tools found for those queries.";

/// Instructions reflecting the servers currently connected
///
/// `discovery_feedback` carries the result of the previous discovery round
/// within the same turn, if any.
pub fn build(active_servers: &[String], discovery_feedback: Option<&str>) -> String {
    let status = if active_servers.is_empty() {
        "You have no tool servers connected yet.".to_owned()
    } else {
        format!(
            "You currently have these tool servers connected: {}.",
            active_servers.join(", ")
        )
    };

    let guidance = formatdoc! {"
        If you need a capability that is NOT available in the currently connected tools, \
        call the {DISCOVER_TOOLS} function with short search queries describing what you need. \
        When formulating search queries, consider the full conversation context, not just \
        the latest message. For example, if the user discussed Microsoft and then asks \
        \"what is its stock price?\", search for \"stock market data\" rather than guessing.

        Example: {DISCOVER_TOOLS}([\"stock market data\", \"text translation\"])
    "};

    let closing = indoc! {"
        If no external tools are needed, answer directly from your knowledge. \
        Do NOT call discover_tools if you already have the right tools connected."};

    let mut out = format!("You are a helpful assistant with access to external tool servers.\n\n{status}\n\n{guidance}\n");

    if let Some(feedback) = discovery_feedback {
        out.push_str(feedback);
        out.push_str("\n\n");
    }

    out.push_str(closing);
    out
}

/// Summary of a discovery round, phrased for the agent
pub fn discovery_feedback(hits: &[SearchHit], admitted: &[String]) -> String {
    if hits.is_empty() {
        return NO_MATCHES.to_owned();
    }

    let mut out = String::from("Found these capabilities:");
    for hit in hits {
        let note = if admitted.contains(&hit.id) { "" } else { ", unavailable" };
        out.push_str(&format!("\n- {} (score: {}{note})", hit.description, hit.score));
    }
    out
}
