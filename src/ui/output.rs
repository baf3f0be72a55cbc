//! Result lines

use super::context::UiContext;
use console::style;

fn marker(ctx: &UiContext, fancy: &'static str, plain: &'static str) -> &'static str {
    if ctx.use_fancy_output() {
        fancy
    } else {
        plain
    }
}

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    println!("{} {}", style(marker(ctx, "✓", "[OK]")).green(), message);
}

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    println!(
        "{} {} ({})",
        style(marker(ctx, "✓", "[OK]")).green(),
        message,
        style(detail).dim()
    );
}

/// Display a warning step
pub fn step_warn(ctx: &UiContext, message: &str) {
    println!("{} {}", style(marker(ctx, "!", "[WARN]")).yellow(), message);
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    println!(
        "{} {} - {}",
        style(marker(ctx, "!", "[WARN]")).yellow(),
        message,
        style(hint).dim()
    );
}

/// Display an aligned key/value line
pub fn key_value(key: &str, value: &str) {
    println!("  {:<16} {}", style(key).dim(), value);
}
