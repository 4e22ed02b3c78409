use tracing::warn;

/// Which schedule day a caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DateSelector {
    /// The site's default page, i.e. today.
    #[default]
    None,
    /// Zero-based position in the advertised date list.
    Index(usize),
    /// A date label passed straight to the site.
    Literal(String),
}

impl DateSelector {
    /// Interprets a raw `date` request value: empty means today, all digits an
    /// index, anything else a literal label.
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::None;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse() {
                return Self::Index(index);
            }
        }
        Self::Literal(raw.to_string())
    }

    /// Positive indexes can only be resolved against a fetched date list.
    pub fn needs_known_dates(&self) -> bool {
        matches!(self, Self::Index(n) if *n > 0)
    }
}

/// A request the page fetcher can issue directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// No date parameter.
    Default,
    Literal(String),
}

impl From<Resolved> for DateSelector {
    fn from(resolved: Resolved) -> Self {
        match resolved {
            Resolved::Default => DateSelector::None,
            Resolved::Literal(date) => DateSelector::Literal(date),
        }
    }
}

/// Turns a selector into a fetchable request.
///
/// Index 0 is today and never becomes a parameter. An index past the end of
/// `known_dates` falls back to today. Literals are not checked against
/// `known_dates`.
pub fn resolve(selector: &DateSelector, known_dates: &[String]) -> Resolved {
    match selector {
        DateSelector::None | DateSelector::Index(0) => Resolved::Default,
        DateSelector::Index(n) => match known_dates.get(*n) {
            Some(date) => Resolved::Literal(date.clone()),
            None => {
                warn!(
                    index = *n,
                    known = known_dates.len(),
                    "Invalid date index. Using default URL."
                );
                Resolved::Default
            }
        },
        DateSelector::Literal(date) => Resolved::Literal(date.clone()),
    }
}
