use crate::element::PageElement;

/// Ways to locate elements in the rendered page.
///
/// The vocabulary is deliberately small and fixed: the dashboard's markup
/// churns, but always within this pattern set (test ids, aria labels,
/// structural marker attributes, roles, tag names, text fragments).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by `data-testid` attribute
    TestId(String),
    /// Select by `aria-label` attribute
    AriaLabel(String),
    /// Select by `role` attribute
    Role(String),
    /// Select by the structural marker attribute (`data-baseweb`)
    Marker(String),
    /// Select by tag name
    Tag(String),
    /// Select by class-list membership
    Class(String),
    /// Select elements whose text contains every fragment, case-insensitive
    TextContains(Vec<String>),
    /// Select by tag name, filtered to elements containing every fragment
    TagWithText(String, Vec<String>),
    /// Represents an invalid selector string, with a reason
    Invalid(String),
}

impl Selector {
    /// Whether `element` matches this selector.
    pub fn matches(&self, element: &PageElement) -> bool {
        match self {
            Selector::TestId(id) => element.attribute("data-testid").as_deref() == Some(id),
            Selector::AriaLabel(label) => {
                element.attribute("aria-label").as_deref() == Some(label)
            }
            Selector::Role(role) => element.attribute("role").as_deref() == Some(role),
            Selector::Marker(marker) => {
                element.attribute("data-baseweb").as_deref() == Some(marker)
            }
            Selector::Tag(tag) => element.tag().eq_ignore_ascii_case(tag),
            Selector::Class(class) => element
                .attribute("class")
                .is_some_and(|list| list.split_whitespace().any(|c| c == class)),
            Selector::TextContains(fragments) => contains_all(&element.text(), fragments),
            Selector::TagWithText(tag, fragments) => {
                element.tag().eq_ignore_ascii_case(tag) && contains_all(&element.text(), fragments)
            }
            Selector::Invalid(_) => false,
        }
    }
}

fn contains_all(text: &str, fragments: &[String]) -> bool {
    let lower = text.to_lowercase();
    fragments.iter().all(|f| lower.contains(&f.to_lowercase()))
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        match s {
            _ if s.starts_with("testid:") => Selector::TestId(s["testid:".len()..].to_string()),
            _ if s.starts_with("aria:") => Selector::AriaLabel(s["aria:".len()..].to_string()),
            _ if s.starts_with("role:") => Selector::Role(s["role:".len()..].to_string()),
            _ if s.starts_with("baseweb:") => Selector::Marker(s["baseweb:".len()..].to_string()),
            _ if s.starts_with("tag:") => Selector::Tag(s["tag:".len()..].to_string()),
            _ if s.starts_with('.') => Selector::Class(s[1..].to_string()),
            _ if s.starts_with("text:") => {
                let fragments = s["text:".len()..]
                    .split('+')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect::<Vec<_>>();
                if fragments.is_empty() {
                    Selector::Invalid("empty text selector".to_string())
                } else {
                    Selector::TextContains(fragments)
                }
            }
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes 'testid:', 'aria:', 'role:', 'baseweb:', 'tag:' or 'text:'."
            )),
        }
    }
}
