use serde::Serialize;

/// Represents ways to locate an element in the portal page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// Select by ARIA role and optional accessible name.
    /// Names match as a case-insensitive substring unless `exact` is set.
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    /// Select the innermost elements whose text matches
    Text { text: String, exact: bool },
    /// Select using a CSS query
    Css(String),
    /// Keep only current matches whose text contains the value
    HasText(String),
    /// Select the n-th element from the matches (negative counts from the end)
    Nth(i32),
    /// Filter by visibility on screen
    Visible(bool),
    /// Chain multiple selectors; later steps search inside earlier matches
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn role(role: &str, name: &str) -> Self {
        Selector::Role {
            role: role.to_string(),
            name: Some(name.to_string()),
            exact: false,
        }
    }

    pub fn role_exact(role: &str, name: &str) -> Self {
        Selector::Role {
            role: role.to_string(),
            name: Some(name.to_string()),
            exact: true,
        }
    }

    pub fn text(text: &str) -> Self {
        Selector::Text {
            text: text.to_string(),
            exact: false,
        }
    }

    pub fn text_exact(text: &str) -> Self {
        Selector::Text {
            text: text.to_string(),
            exact: true,
        }
    }

    pub fn css(query: &str) -> Self {
        Selector::Css(query.to_string())
    }

    /// Appends `next` to this selector, flattening chains.
    pub fn then(self, next: Selector) -> Selector {
        let mut chain = match self {
            Selector::Chain(existing) => existing,
            s => vec![s],
        };
        match next {
            Selector::Chain(mut rest) => chain.append(&mut rest),
            s => chain.push(s),
        }
        Selector::Chain(chain)
    }

    /// Filters narrow the current match set instead of searching inside it.
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            Selector::HasText(_) | Selector::Nth(_) | Selector::Visible(_)
        )
    }

    /// First invalid part of this selector, if any.
    pub fn invalid_reason(&self) -> Option<&str> {
        match self {
            Selector::Invalid(reason) => Some(reason),
            Selector::Chain(parts) => parts.iter().find_map(|p| p.invalid_reason()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        // role:button|name:Query (substring) or role:button|name=Query (exact)
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role = role_part
                .trim()
                .strip_prefix("role:")
                .unwrap_or(role_part.trim())
                .to_string();
            let name_part = name_part.trim_start();
            let (name, exact) = if let Some(exact_name) = name_part.strip_prefix("name=") {
                (exact_name.to_string(), true)
            } else {
                (
                    name_part
                        .strip_prefix("name:")
                        .unwrap_or(name_part)
                        .to_string(),
                    false,
                )
            };
            return Selector::Role {
                role,
                name: Some(name),
                exact,
            };
        }

        let lower = s.to_lowercase();
        match s {
            _ if s.starts_with("role:") => Selector::Role {
                role: s[5..].to_string(),
                name: None,
                exact: false,
            },
            "button" | "link" | "textbox" | "checkbox" | "listitem" | "menuitem" | "menu"
            | "tab" | "combobox" => Selector::Role {
                role: s.to_string(),
                name: None,
                exact: false,
            },
            _ if s.starts_with("text=") => Selector::text_exact(&s[5..]),
            _ if s.starts_with("text:") => Selector::text(&s[5..]),
            _ if s.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ if lower.starts_with("hastext:") => Selector::HasText(s["hastext:".len()..].to_string()),
            _ if lower.starts_with("visible:") => {
                let value = s[8..].trim().to_lowercase();
                Selector::Visible(value == "true")
            }
            _ if lower.starts_with("nth=") || lower.starts_with("nth:") => {
                let index_str = s[4..].trim();
                if let Ok(index) = index_str.parse::<i32>() {
                    Selector::Nth(index)
                } else {
                    Selector::Invalid(format!("Invalid index for nth selector: '{index_str}'"))
                }
            }
            _ if s.starts_with('#') || s.starts_with('[') || s.starts_with('.') => {
                Selector::Css(s.to_string())
            }
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'role:', 'text:', 'css:', 'hastext:', 'nth:' or 'visible:' to specify the selector type."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}
