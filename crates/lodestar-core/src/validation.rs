/// Input normalisation for account identifiers.
///
/// Usernames and emails are unique case-insensitively. Rather than keep a
/// separate `*_lower` column, both are stored already normalised, so every
/// lookup must go through these helpers.

pub fn normalize_username(username: &str) -> String {
	username.trim().to_lowercase()
}

pub fn normalize_email(email: &str) -> String {
	email.trim().to_lowercase()
}

pub fn is_blank(value: &str) -> bool {
	value.trim().is_empty()
}

/// Names of the fields whose value is missing or blank, in the given order.
pub fn blank_fields<'a>(fields: &[(&'a str, Option<&str>)]) -> Vec<&'a str> {
	fields
		.iter()
		.filter(|(_, value)| value.map_or(true, is_blank))
		.map(|(name, _)| *name)
		.collect()
}

/// Returns the trimmed value if present and non-blank.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|v| !v.is_empty())
}
