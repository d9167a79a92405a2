//! Prompt templates. Everything the generation service ever sees is built
//! here so wording changes stay in one place.

pub const SYSTEM_INSTRUCTION: &str = "SYSTEM: You are Patchpilot, a local coding assistant. \
Never repeat the prompt or context; only output your answer.";

/// Prompt for a whole-file rewrite. The reply should be a single fenced
/// code block, but extraction tolerates commentary around it.
pub fn patch_prompt(task: &str, filename: &str, original: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\n\
         Modify this file to accomplish the task below.\n\n\
         Task: {task}\n\
         Filename: {filename}\n\n\
         Original Code:\n{original}\n\n\
         Updated Code (full file, one fenced code block, no commentary):"
    )
}

/// Chat prompt: persona, rolling context, tree overviews, then the user turn.
pub fn chat_prompt(
    root_path: &str,
    context_json: &str,
    folders: &str,
    files: &str,
    user: &str,
) -> String {
    format!(
        "You are Patchpilot, a local assistant living in {root_path}.\n\
         You can read, write, and modify files after review. Speak \
         conversationally and ask clarifying questions if unsure.\n\n\
         Current context:\n{context_json}\n\n\
         Known folders:\n{folders}\n\n\
         Known files:\n{files}\n\n\
         [User]: {user}\n[Patchpilot]:"
    )
}

/// One consolidated reflection prompt over the whole file list.
pub fn reflection_prompt(files: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\n\
         Review this project's source files and suggest concrete, small \
         improvements. At most two suggestions per file, one bullet each, \
         formatted as `- suggestion text` and naming the file in backticks.\n\n\
         Files:\n{files}\n\nSuggestions:"
    )
}
