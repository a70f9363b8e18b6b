//! Prompt rendering.

/// Interpolate `{{topic}}`, `{{criteria}}` and `{{text}}` into `template`.
///
/// The excerpt is substituted last so text that happens to contain a
/// placeholder is left as-is.
pub fn render(template: &str, topic: &str, criteria: &str, text: &str) -> String {
    template
        .replace("{{topic}}", topic)
        .replace("{{criteria}}", criteria)
        .replace("{{text}}", text)
}

/// Command-line exclusions first, then the configured ones, one per line.
pub fn combine_criteria(cli: Option<&str>, configured: &str) -> String {
    [cli.unwrap_or_default(), configured]
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
