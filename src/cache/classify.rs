//! Caller classification from the `User-Agent` header.

use std::fmt;

/// Which kind of client issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerClass {
    /// Crawlers, link unfurlers, SEO and monitoring tools.
    Bot,
    /// Interactive browsers and anything not recognised as a bot.
    Human,
}

impl CallerClass {
    /// Tag used to partition the cache key space.
    pub fn key_prefix(self) -> &'static str {
        match self {
            CallerClass::Bot => "bot-",
            CallerClass::Human => "user-",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallerClass::Bot => "bot",
            CallerClass::Human => "human",
        }
    }
}

impl fmt::Display for CallerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable matcher over known automated-agent identifiers.
///
/// Built once at startup from configuration; matching is case-insensitive
/// substring containment.
#[derive(Debug, Clone)]
pub struct BotMatcher {
    patterns: Box<[String]>,
}

impl BotMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|pattern| {
                let trimmed = pattern.as_ref().trim();
                (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
            })
            .collect();
        Self { patterns }
    }

    /// Classify a raw `User-Agent` value. Absent or blank headers are human.
    pub fn classify(&self, user_agent: Option<&str>) -> CallerClass {
        let Some(agent) = user_agent.map(str::trim).filter(|agent| !agent.is_empty()) else {
            return CallerClass::Human;
        };

        let agent = agent.to_lowercase();
        if self
            .patterns
            .iter()
            .any(|pattern| agent.contains(pattern.as_str()))
        {
            CallerClass::Bot
        } else {
            CallerClass::Human
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for BotMatcher {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_BOT_AGENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_blank_agent_is_human() {
        let matcher = BotMatcher::default();
        assert_eq!(matcher.classify(None), CallerClass::Human);
        assert_eq!(matcher.classify(Some("")), CallerClass::Human);
        assert_eq!(matcher.classify(Some("   ")), CallerClass::Human);
    }

    #[test]
    fn full_crawler_agent_strings_are_bots() {
        let matcher = BotMatcher::default();
        let googlebot =
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
        assert_eq!(matcher.classify(Some(googlebot)), CallerClass::Bot);
        assert_eq!(
            matcher.classify(Some("facebookexternalhit/1.1")),
            CallerClass::Bot
        );
        assert_eq!(
            matcher.classify(Some("Screaming Frog SEO Spider/19.0")),
            CallerClass::Bot
        );
    }

    #[test]
    fn browsers_are_human() {
        let matcher = BotMatcher::default();
        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
        assert_eq!(matcher.classify(Some(firefox)), CallerClass::Human);
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let matcher = BotMatcher::new(["  InternalProbe ", ""]);
        assert_eq!(matcher.len(), 1);
        assert_eq!(
            matcher.classify(Some("internalprobe/2.0")),
            CallerClass::Bot
        );
        assert_eq!(matcher.classify(Some("Googlebot/2.1")), CallerClass::Human);
    }

    #[test]
    fn prefixes_differ_per_class() {
        assert_ne!(
            CallerClass::Bot.key_prefix(),
            CallerClass::Human.key_prefix()
        );
    }
}
