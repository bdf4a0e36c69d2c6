//! Tool-Result Processor (§4.4): decides per-tool whether a result is within
//! budget; when not, truncates and appends a tool-specific Recovery Section.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;

/// Characters kept per token in the coarse estimator (§4.4); no real
/// tokenizer is required.
const CHARS_PER_TOKEN: f64 = 3.5;

/// Maximum preserved prefix before the truncation marker and Recovery
/// Section are appended (§4.4).
const MAX_TRUNCATED_CHARS: usize = 2000;

const DEFAULT_THRESHOLD: usize = 3500;

/// Estimates token count for `text` at ~3.5 chars/token (§4.4).
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / CHARS_PER_TOKEN).round() as usize
}

/// Per-tool threshold table and bypass set (§4.4).
pub struct ToolResultProcessor {
    thresholds: HashMap<String, usize>,
    default_threshold: usize,
    bypass: HashSet<String>,
}

impl Default for ToolResultProcessor {
    fn default() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert("read_file".to_string(), 3500);
        thresholds.insert("grep".to_string(), 3500);
        thresholds.insert("bash".to_string(), 3500);
        thresholds.insert("web_fetch".to_string(), 5000);
        thresholds.insert("web_search".to_string(), 4000);
        thresholds.insert("glob".to_string(), 3500);
        thresholds.insert("ls".to_string(), 3500);

        let mut bypass = HashSet::new();
        bypass.insert("manage_todo_list".to_string());

        Self {
            thresholds,
            default_threshold: DEFAULT_THRESHOLD,
            bypass,
        }
    }
}

impl ToolResultProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bypass_tool(mut self, name: impl Into<String>) -> Self {
        self.bypass.insert(name.into());
        self
    }

    pub fn with_threshold(mut self, tool_name: impl Into<String>, threshold: usize) -> Self {
        self.thresholds.insert(tool_name.into(), threshold);
        self
    }

    fn threshold_for(&self, tool_name: &str) -> usize {
        *self
            .thresholds
            .get(tool_name)
            .unwrap_or(&self.default_threshold)
    }

    /// `(tool_name, raw_result, tool_context) -> (processed, was_modified)` (§4.4).
    pub fn process(
        &self,
        tool_name: &str,
        raw_result: &str,
        tool_context: &HashMap<String, Value>,
    ) -> (String, bool) {
        if self.bypass.contains(tool_name) {
            return (raw_result.to_string(), false);
        }

        if raw_result.chars().count() <= self.threshold_for(tool_name) {
            return (raw_result.to_string(), false);
        }

        let truncated = truncate_prefix(raw_result);
        let recovery = format_recovery_section(tool_name, raw_result, tool_context);
        let processed = if recovery.is_empty() {
            truncated
        } else {
            format!("{truncated}\n\n{recovery}")
        };
        (processed, true)
    }
}

fn truncate_prefix(raw_result: &str) -> String {
    let total = raw_result.chars().count();
    let prefix: String = raw_result.chars().take(MAX_TRUNCATED_CHARS).collect();
    if total > MAX_TRUNCATED_CHARS {
        format!(
            "{prefix}\n\n[... {} characters truncated ...]",
            total - MAX_TRUNCATED_CHARS
        )
    } else {
        prefix
    }
}

fn ctx_str<'a>(ctx: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    ctx.get(key).and_then(Value::as_str)
}

fn format_recovery_section(
    tool_name: &str,
    raw_result: &str,
    ctx: &HashMap<String, Value>,
) -> String {
    match tool_name {
        "read_file" => format_read_file(raw_result, ctx),
        "grep" => format_grep(raw_result, ctx),
        "bash" => format_bash(raw_result, ctx),
        "glob" | "ls" => format_glob(raw_result, ctx),
        "web_fetch" => format_web_fetch(raw_result, ctx),
        "web_search" => format_web_search(raw_result, ctx),
        _ => format_default(raw_result),
    }
}

fn format_read_file(raw_result: &str, ctx: &HashMap<String, Value>) -> String {
    let filename = ctx_str(ctx, "filename").unwrap_or("unknown");
    let line_count = raw_result.lines().count();
    let char_count = raw_result.chars().count();
    let structure = extract_code_structure(raw_result);

    let mut out = vec!["--- Recovery Options ---".to_string()];
    out.push(format!(
        "File: {filename} | {line_count} lines, {char_count} chars"
    ));
    out.push(String::new());

    if !structure.is_empty() {
        out.push("Structure:".to_string());
        for (kind, name, line) in structure.iter().take(10) {
            out.push(format!("  - {kind} {name} (line {line})"));
        }
        if structure.len() > 10 {
            out.push(format!("  ... and {} more", structure.len() - 10));
        }
        out.push(String::new());
    }

    out.push("Commands:".to_string());
    if let Some((_, name, _)) = structure.first() {
        out.push(format!("  • grep(pattern=\"{name}\", path=\"{filename}\")"));
    } else {
        out.push(format!("  • grep(pattern=\"keyword\", path=\"{filename}\")"));
    }
    out.push(format!("  • bash(command=\"sed -n '1,50p' {filename}\")"));
    out.push(format!("  • bash(command=\"sed -n '100,150p' {filename}\")"));
    out.join("\n")
}

/// Top functions/classes from the file, as `(kind, name, line)` (§4.4).
fn extract_code_structure(content: &str) -> Vec<(String, String, usize)> {
    let def_re = Regex::new(r"^\s*(?:pub\s+)?(fn|struct|enum|trait|class|def)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex");
    let mut structure = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(caps) = def_re.captures(line) {
            structure.push((caps[1].to_string(), caps[2].to_string(), idx + 1));
            if structure.len() >= 20 {
                break;
            }
        }
    }
    structure
}

fn format_grep(raw_result: &str, ctx: &HashMap<String, Value>) -> String {
    let line_re = Regex::new(r"^([^:]+):(\d+):").expect("static regex");
    let mut per_file: HashMap<String, usize> = HashMap::new();
    let mut match_count = 0usize;
    for line in raw_result.lines() {
        if let Some(caps) = line_re.captures(line) {
            *per_file.entry(caps[1].to_string()).or_insert(0) += 1;
            match_count += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = per_file.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(5);

    let pattern = ctx_str(ctx, "pattern").unwrap_or("pattern");
    let mut out = vec!["--- Recovery Options ---".to_string()];
    out.push(format!(
        "Searched: {}+ files | {match_count} total matches | Showing first ~50",
        ranked.len()
    ));
    out.push(String::new());
    if !ranked.is_empty() {
        out.push("Top files by matches:".to_string());
        for (path, count) in &ranked {
            out.push(format!("  - {path}: {count} matches"));
        }
        out.push(String::new());
    }
    out.push("Commands:".to_string());
    if let Some((top_file, _)) = ranked.first() {
        out.push(format!(
            "  • grep(pattern=\"{pattern}\", file_pattern=\"{top_file}\")"
        ));
    }
    out.push(format!("  • grep(pattern=\"{pattern}\", max_matches_per_file=3)"));
    out.join("\n")
}

fn format_bash(raw_result: &str, ctx: &HashMap<String, Value>) -> String {
    let command = ctx_str(ctx, "command").unwrap_or("<command>");
    let line_count = raw_result.lines().count();
    let mut out = vec!["--- Recovery Options ---".to_string()];
    out.push(format!("Command: {command} | {line_count} lines of output"));
    out.push(String::new());
    out.push("Commands:".to_string());
    out.push(format!("  • bash(command=\"{command} | head -n 50\")"));
    out.push(format!("  • bash(command=\"{command} | tail -n 50\")"));
    out.join("\n")
}

fn format_glob(raw_result: &str, _ctx: &HashMap<String, Value>) -> String {
    let files: Vec<&str> = raw_result.lines().collect();
    let file_count = files.len();
    let common_prefixes = common_directory_prefixes(&files);

    let mut out = vec!["--- Recovery Options ---".to_string()];
    out.push(format!("{file_count} files matched"));
    out.push(String::new());
    if !common_prefixes.is_empty() {
        out.push("Common directories:".to_string());
        for prefix in &common_prefixes {
            out.push(format!("  - {prefix}"));
        }
        out.push(String::new());
    }
    out.push("Commands:".to_string());
    if let Some(prefix) = common_prefixes.first() {
        out.push(format!("  • glob(pattern=\"{prefix}/**/*\")"));
    }
    out.push("  • glob(pattern=\"...\", limit=50)".to_string());
    out.join("\n")
}

fn common_directory_prefixes(files: &[&str]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for f in files {
        if let Some(dir) = f.rsplit_once('/').map(|(d, _)| d) {
            *counts.entry(dir.to_string()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(5).map(|(d, _)| d).collect()
}

fn format_web_fetch(_raw_result: &str, ctx: &HashMap<String, Value>) -> String {
    let url = ctx_str(ctx, "url").unwrap_or("<url>");
    format!(
        "--- Recovery Options ---\nURL: {url}\n\nCommands:\n  • web_fetch(url=\"{url}\", start_char=2000)"
    )
}

fn format_web_search(_raw_result: &str, ctx: &HashMap<String, Value>) -> String {
    let query = ctx_str(ctx, "query").unwrap_or("<query>");
    format!(
        "--- Recovery Options ---\nQuery: {query}\n\nCommands:\n  • web_search(query=\"{query}\", offset=10)"
    )
}

fn format_default(raw_result: &str) -> String {
    let line_count = raw_result.lines().count();
    format!(
        "--- Recovery Options ---\n{line_count} lines total.\n\nCommands:\n  • re-run the tool with a narrower filter"
    )
}
