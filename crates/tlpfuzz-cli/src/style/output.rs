use super::colors::SemanticStyle;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".error(), msg);
}

pub fn print_warn(msg: &str) {
    println!("{} {}", "⚠".warning(), msg);
}

/// Prints a follow-up suggestion, dimmed.
pub fn print_hint(msg: &str) {
    println!("{} {}", "→".muted(), msg.muted());
}

pub fn print_heading(title: &str) {
    println!("{}", title.header());
}

pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}

/// Prints a file path the user may want to open.
pub fn print_path(label: &str, path: &std::path::Path) {
    println!("  {}: {}", label.muted(), path.display().code());
}
