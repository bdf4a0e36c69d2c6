//! Bundled prompt templates (§6): composition assessment, exploration,
//! synthesis, and subtask framing. Plain `const` strings, not a
//! configuration surface — a deployment that wants different wording wraps
//! these functions rather than templating at load time.

/// Classifies a task into a composition pattern (§4.9). The response is
/// parsed for the first matching pattern keyword it contains.
pub fn composition_assessment_prompt(task: &str) -> String {
    format!(
        "{ASSESSMENT_PREAMBLE}\n\nTask:\n{task}\n\n{ASSESSMENT_INSTRUCTION}"
    )
}

const ASSESSMENT_PREAMBLE: &str = "\
You are deciding how to structure work on a task before any work begins.";

const ASSESSMENT_INSTRUCTION: &str = "\
Respond with exactly one of the following words, with nothing else:
- none: the task is simple enough for a single agent to handle directly
- plan_execute: the task needs an explicit plan before execution
- parallel_explore: the task benefits from exploring several independent \
  angles before an answer can be synthesized
- sequential_delegate: the task decomposes into an ordered chain of \
  dependent sub-tasks";

/// Frames one aspect for a parallel-exploration child agent (§4.9).
pub fn exploration_aspect_prompt(aspect: &str) -> String {
    format!(
        "Investigate the following aspect using only read-only tools. \
         Report concrete findings; do not attempt to solve the overall task.\n\n\
         Aspect: {aspect}"
    )
}

/// Synthesizes exploration findings into a final answer (§4.9).
pub fn synthesis_prompt(task: &str, findings: &[String]) -> String {
    let mut rendered = String::new();
    for (i, finding) in findings.iter().enumerate() {
        rendered.push_str(&format!("### Finding {}\n{}\n\n", i + 1, finding));
    }
    format!(
        "Task:\n{task}\n\nThe following independent findings were gathered:\n\n\
         {rendered}Synthesize a single final answer to the task from these findings."
    )
}

/// Breaks a task into `count` ordered sub-task descriptions for
/// `sequential_delegate` composition (§4.9). The response is parsed as a
/// numbered list; each line becomes one [`crate::composition::SubtaskSpec`]
/// depending on the line before it.
pub fn decomposition_prompt(task: &str, count: usize) -> String {
    format!(
        "Break the following task into an ordered chain of at most {count} \
         sub-tasks, each depending on the one before it. Respond with a \
         numbered list, one sub-task per line, with nothing else.\n\n\
         Task:\n{task}"
    )
}

/// Verification prompt used by the default [`crate::agent::LlmVerifier`] (§4.8).
pub fn verification_prompt(task: &str, candidate: &str, iteration: u32, previous: &str) -> String {
    format!(
        "Task:\n{task}\n\nIteration: {iteration}\n\nCandidate answer:\n{candidate}\n\n\
         Previous attempts:\n{previous}\n\n\
         Judge whether the candidate answer fully satisfies the task. \
         Respond with exactly one line starting with either \"COMPLETE:\" \
         followed by a brief confirmation, or \"INCOMPLETE:\" followed by \
         what is missing."
    )
}
