/// Placeholder replaced with the joined input texts.
pub const DOCS_PLACEHOLDER: &str = "{docs}";

/// Separator between inputs when several are sent in one prompt.
pub const DOC_SEPARATOR: &str = "\n\n";

/// Single-article summary. Used for both the map and combine steps of a
/// per-document reduction.
pub const DOCUMENT_PROMPT: &str = r#"Write a concise summary of the following:


"{docs}"


CONCISE SUMMARY:"#;

/// Map step over a group of article summaries.
pub const TOPIC_MAP_PROMPT: &str = r#"The following is a set of articles
{docs}
Based on this list of docs, identify the main themes and concisely summarize the articles in an article like tone and format. Format your summary in markdown and make sure to include the [one alphanumeric source] notation whenever you use information from the article summaries provided to you. Place these citations at the end of the sentence or paragraph that reference them - do NOT put them all at the end. Do NOT include multiple sources within one pair of brackets. There should only be one source per pair of brackets. Remember: concise, article like summary with citations like these [source] that match with the citations given in the articles.
Summary:"#;

/// Who the digest is written for. Prepended to the combine prompt.
pub const AUDIENCE_BRIEF: &str = r#"You are a security analyst summarizing articles for a university technology department. The department's current priorities are:

1. Identity and Access Management: a multi-year effort to manage identities and entitlements so the right people reach the right resources at the right time.
2. Regulated research: an enclave that meets federal regulatory compliance requirements for defense research grants and contracts.
3. Cybersecurity investment: campus-wide cybersecurity training and protection of digital assets and sensitive information.
4. Generative AI security: data security assessments for the use of generative AI in education, research and operations.
5. Network modernization: upgrading and simplifying network infrastructure to better control and secure the flow of data."#;

/// Combine step: turns a set of summaries into one cited summary.
pub const TOPIC_COMBINE_PROMPT: &str = r#"{brief}

Here are a list of article summaries:
{docs}
Write a summary of the article summaries in an article like tone and format. Cite your sources using [one alphanumeric source] notation which maps to the source of the article summaries provided to you. Format your summary in markdown and make sure to include the [one alphanumeric source] notation whenever you use information from the article summaries provided to you.
Place these citations at the end of the sentence or paragraph that reference them - do NOT put them all at the end. Do NOT include multiple sources within one pair of brackets. There should only be one source per pair of brackets. Your markdown formatted response should be easy to read, concise and information dense.
Do not summarize the department priorities, use them to tailor your summary to the needs of the department. Your summary should not exceed 200 words.
Article/Summary:"#;

/// Fill a template with the joined inputs.
pub fn render(template: &str, docs: &str) -> String {
    template.replace(DOCS_PLACEHOLDER, docs)
}

/// The combine prompt with the audience brief filled in.
pub fn topic_combine_prompt(brief: &str) -> String {
    TOPIC_COMBINE_PROMPT.replace("{brief}", brief)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_carry_placeholder() {
        for template in [DOCUMENT_PROMPT, TOPIC_MAP_PROMPT, TOPIC_COMBINE_PROMPT] {
            assert_eq!(template.matches(DOCS_PLACEHOLDER).count(), 1);
        }
    }

    #[test]
    fn test_render_keeps_markers_verbatim() {
        let prompt = render(TOPIC_MAP_PROMPT, "Story one.[abc1234]");
        assert!(prompt.contains("Story one.[abc1234]"));
        assert!(!prompt.contains(DOCS_PLACEHOLDER));
    }

    #[test]
    fn test_combine_prompt_includes_brief() {
        let prompt = topic_combine_prompt("BRIEF");
        assert!(prompt.starts_with("BRIEF"));
        assert!(prompt.contains(DOCS_PLACEHOLDER));
    }
}
