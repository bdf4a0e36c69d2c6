//! Long-term memory and skills interfaces (§6): both optional, consumed
//! collaborators with trivial no-op defaults, following the teacher's habit
//! of shipping a default implementation for an optional collaborator (e.g.
//! `loom`'s in-memory `Store` as the default when none is configured).

use async_trait::async_trait;

use crate::error::AgentError;

/// Supplies a system-prompt section summarizing durable, cross-session
/// memory (§6). The runtime prepends this section, when present, to the
/// root agent's system messages ahead of the skills section.
#[async_trait]
pub trait LongTermMemoryProvider: Send + Sync {
    /// Returns the formatted section, or `None` if there is nothing to add.
    async fn load_and_format(&self) -> Result<Option<String>, AgentError>;

    /// Polls for out-of-band mutation since the last `load_and_format` call.
    async fn has_changed_since_load(&self) -> bool;
}

/// Supplies a system-prompt section listing available skills (§6).
#[async_trait]
pub trait SkillsProvider: Send + Sync {
    /// Returns the formatted section, or `None` if no skills are registered.
    async fn render_section(&self) -> Result<Option<String>, AgentError>;
}

/// Default `LongTermMemoryProvider`: contributes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLongTermMemory;

#[async_trait]
impl LongTermMemoryProvider for NoopLongTermMemory {
    async fn load_and_format(&self) -> Result<Option<String>, AgentError> {
        Ok(None)
    }

    async fn has_changed_since_load(&self) -> bool {
        false
    }
}

/// Default `SkillsProvider`: contributes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSkillsProvider;

#[async_trait]
impl SkillsProvider for NoopSkillsProvider {
    async fn render_section(&self) -> Result<Option<String>, AgentError> {
        Ok(None)
    }
}

/// Rewrites a `$<name> <args>` prefixed user input into an explicit
/// invocation block (§6); input without the prefix passes through
/// unchanged.
pub fn rewrite_skill_invocation(input: &str) -> String {
    let trimmed = input.trim_start();
    let Some(rest) = trimmed.strip_prefix('$') else {
        return input.to_string();
    };
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return input.to_string();
    }
    let args = parts.next().unwrap_or("").trim();
    format!("Invoke skill `{name}` with arguments: {args}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_providers_contribute_nothing() {
        let memory = NoopLongTermMemory;
        assert_eq!(memory.load_and_format().await.unwrap(), None);
        assert!(!memory.has_changed_since_load().await);

        let skills = NoopSkillsProvider;
        assert_eq!(skills.render_section().await.unwrap(), None);
    }

    #[test]
    fn rewrites_dollar_prefixed_input_into_invocation_block() {
        let rewritten = rewrite_skill_invocation("$summarize the report");
        assert_eq!(rewritten, "Invoke skill `summarize` with arguments: the report");
    }

    #[test]
    fn passes_through_input_without_dollar_prefix() {
        let input = "plain user message";
        assert_eq!(rewrite_skill_invocation(input), input);
    }

    #[test]
    fn bare_dollar_sign_passes_through_unchanged() {
        let input = "$ no name here";
        assert_eq!(rewrite_skill_invocation(input), input);
    }
}
