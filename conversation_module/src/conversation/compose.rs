use regex::Regex;

pub const DEFAULT_RECIPIENT_NAME: &str = "Candidate";
pub const DEFAULT_SUBJECT: &str = "An opportunity for you";

const RECIPIENT_PLACEHOLDER: &str = r"\{\{\s*recipient_?[Nn]ame\s*\}\}";

/// Substitutes the recipient's name into every placeholder spelling used by
/// job templates (`{{recipient_name}}`, `{{recipientName}}`, `{{recipient_Name}}`).
pub fn render_first_message(template: &str, recipient_name: Option<&str>) -> String {
    let name = recipient_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_RECIPIENT_NAME);
    match Regex::new(RECIPIENT_PLACEHOLDER) {
        Ok(re) => re.replace_all(template, regex::NoExpand(name)).into_owned(),
        Err(_) => template.replace("{{recipient_name}}", name),
    }
}

/// `References` for a reply: prior references followed by the message being answered.
pub fn build_references(existing: Option<&str>, last_message_id: &str) -> String {
    let last = last_message_id.trim();
    match existing.map(str::trim).filter(|refs| !refs.is_empty()) {
        Some(refs) if refs.split_whitespace().any(|id| id == last) => refs.to_string(),
        Some(refs) if !last.is_empty() => format!("{} {}", refs, last),
        Some(refs) => refs.to_string(),
        None => last.to_string(),
    }
}
