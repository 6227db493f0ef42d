//! Pure, deterministic rewrite of the user's turn into a retrieval query
//! (C4). Matches the lower-cased, whitespace-collapsed input against an
//! ordered rule table; the first rule whose keyword set matches contributes
//! its expansion. Never removes or reorders the original text (invariant 9:
//! `expand(t)` contains `t` as a substring).

use tracing::debug;

struct Rule {
    name: &'static str,
    keywords: &'static [&'static str],
    expansion: &'static str,
}

/// The rule table of spec §6, in match order. The fallback rule always
/// matches and must stay last.
static RULES: &[Rule] = &[
    Rule {
        name: "audience",
        keywords: &["who are my", "my niche", "potential clients", "target audience", "ideal client"],
        expansion: "avatar sheet, ICP, ideal customer profile, demographics, psychographics",
    },
    Rule {
        name: "tone",
        keywords: &["tone", "voice", "style", "how should i write"],
        expansion: "brand tone, voice, writing style, brand identity, brand vision",
    },
    Rule {
        name: "scripts",
        keywords: &["script", "hook", "cta", "storytelling", "video", "reel"],
        expansion: "script structure, hook formulas, CTA, storytelling, retention",
    },
    Rule {
        name: "carousel",
        keywords: &["carousel", "slides"],
        expansion: "carousel rules, slide structure, headline",
    },
    Rule {
        name: "content-strategy",
        keywords: &["content strategy", "weekly", "ideas", "content plan", "what to post"],
        expansion: "content pillars, weekly planning, content calendar",
    },
    Rule {
        name: "competitor",
        keywords: &["competitor", "rewrite", "in my voice"],
        expansion: "competitor adaptation, brand voice rewrite",
    },
    Rule {
        name: "personal",
        keywords: &["tell me about yourself", "your story", "about you", "who are you"],
        expansion: "personal background, journey, transformation",
    },
    Rule {
        name: "brand-general",
        keywords: &["brand", "identity", "philosophy", "positioning", "values"],
        expansion: "brand identity, philosophy, mission, values",
    },
    Rule {
        name: "fallback",
        keywords: &[],
        expansion: "brand documents, content strategy",
    },
];

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn matches(normalized: &str, rule: &Rule) -> bool {
    rule.keywords.is_empty() || rule.keywords.iter().any(|kw| normalized.contains(kw))
}

/// Rewrites `user_text` into a retrieval query by appending the first
/// matching rule's expansion. Pure and side-effect-free.
pub fn expand(user_text: &str) -> String {
    let normalized = normalize(user_text);

    let rule = RULES
        .iter()
        .find(|r| matches(&normalized, r))
        .expect("fallback rule always matches");

    debug!(rule = rule.name, "query_expansion");
    format!("{user_text} {}", rule.expansion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_contains_original_text() {
        let cases = [
            "who are my ideal clients?",
            "what tone should I use?",
            "write me a hook for a reel",
            "design a carousel",
            "what's my content plan this week",
            "rewrite this competitor post in my voice",
            "tell me about yourself",
            "what's our brand positioning",
            "completely unrelated gibberish query",
        ];
        for text in cases {
            let expanded = expand(text);
            assert!(expanded.contains(text), "expansion dropped original text for {text:?}");
        }
    }

    #[test]
    fn audience_rule_wins_first() {
        let expanded = expand("who are my target audience members");
        assert!(expanded.contains("ICP"));
    }

    #[test]
    fn unrecognized_query_gets_fallback() {
        let expanded = expand("xyzzy plugh quux");
        assert!(expanded.contains("brand documents, content strategy"));
    }

    #[test]
    fn is_case_insensitive_and_whitespace_collapsed() {
        let expanded = expand("WHO   ARE\tMY   NICHE");
        assert!(expanded.contains("ICP"));
    }

    #[test]
    fn deterministic_for_equal_inputs() {
        let text = "what's my tone?";
        assert_eq!(expand(text), expand(text));
    }
}
