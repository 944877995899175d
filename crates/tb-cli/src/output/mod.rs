//! Output formatting utilities for the CLI
//!
//! Human-readable renderings of change events and connection status, plus
//! colored status lines for operator feedback.

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use tb_client::{ConnectionState, Event, NotifyLevel};

/// Format an event as a single line
///
/// ```text
/// #42 database_changed scope-7 at 1700000000000
/// ```
pub fn format_event(event: &Event) -> String {
    format!(
        "#{} {} {} at {}",
        event.sequence,
        event.event_type,
        event.scope_id,
        event.occurred_at
    )
}

/// Format an event as one line of JSON
pub fn format_event_json(event: &Event) -> anyhow::Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Describe a final connection state for the operator
pub fn describe_state(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "Connected to taskboard daemon",
        ConnectionState::Reconnecting => "Reconnecting to taskboard daemon",
        ConnectionState::Terminated => "Gave up reconnecting to taskboard daemon",
        ConnectionState::Closed => "Disconnected",
        ConnectionState::Disconnected | ConnectionState::Connecting => "Not connected",
    }
}

/// Route a client notification to the matching colored printer
pub fn print_notification(level: NotifyLevel, msg: &str) {
    match level {
        NotifyLevel::Info => print_info(msg),
        NotifyLevel::Warning => print_warning(msg),
        NotifyLevel::Error => print_error(msg),
    }
}

fn print_tagged(mut out: impl std::io::Write, color: Color, tag: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(tag),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_tagged(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red with an X prefix
///
/// Goes to stderr so it never mixes with event output.
pub fn print_error(msg: &str) {
    print_tagged(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_tagged(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan to stderr
pub fn print_info(msg: &str) {
    print_tagged(std::io::stderr(), Color::Cyan, "ℹ ", msg);
}
