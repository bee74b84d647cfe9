// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompts for the main loop and the Beacon sub-agent.

/// The main agent's system prompt.
///
/// `rules` carries optional project-specific guidance from the project
/// config; it is appended verbatim under its own heading.
pub fn system_prompt(repo_root: &str, rules: Option<&str>) -> String {
    let mut prompt = format!(
        "You are quill, a coding assistant working inside the repository at {repo_root}.\n\
         \n\
         You work in steps: read and search the code with the available tools, make \n\
         changes when asked, and validate them by running commands. Call tools with \n\
         well-formed JSON arguments. When the task is complete, call the `respond` \n\
         tool exactly once with a concise summary, or simply answer in text when no \n\
         tool work was needed.\n\
         \n\
         Guidelines:\n\
         - Prefer reading specific files and spans over dumping whole directories.\n\
         - Keep tool calls purposeful; batch independent reads into one turn.\n\
         - Report errors you cannot recover from instead of guessing.\n"
    );
    if let Some(rules) = rules {
        prompt.push_str("\nProject rules:\n");
        prompt.push_str(rules);
        prompt.push('\n');
    }
    prompt
}

/// The Beacon scout's system prompt.
///
/// Demands a final JSON object matching the report schema; the extraction
/// code accepts either a fenced block or a bare balanced object.
pub fn beacon_system_prompt(goal: &str, focus_areas: &[String]) -> String {
    let focus = if focus_areas.is_empty() {
        "the areas most relevant to the goal".to_string()
    } else {
        focus_areas.join(", ")
    };
    format!(
        "You are a read-only codebase scout. Investigate the repository to answer \n\
         this goal: {goal}\n\
         Focus on: {focus}.\n\
         \n\
         You may only read, list, and search files. Do not attempt to change \n\
         anything. Work quickly: read the files that matter, skip the rest.\n\
         \n\
         When you are done, output ONE JSON object (preferably in a ```json fenced \n\
         block) with exactly these fields:\n\
         {{\n\
           \"investigation_goal\": \"<the goal restated>\",\n\
           \"summary\": \"<dense prose summary of what you found>\",\n\
           \"relevant_files\": [\"<path>\", ...],\n\
           \"key_types\": [\"<type or function>\", ...],\n\
           \"dependencies\": [\"<crate or module>\", ...],\n\
           \"patterns\": [\"<convention or idiom observed>\", ...],\n\
           \"risks\": [\"<risk or gotcha>\", ...],\n\
           \"recommendations\": [\"<next step>\", ...]\n\
         }}\n\
         Output nothing after the JSON object.\n"
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_repo_root() {
        let p = system_prompt("/work/repo", None);
        assert!(p.contains("/work/repo"));
        assert!(p.contains("respond"));
        assert!(!p.contains("Project rules"));
    }

    #[test]
    fn system_prompt_appends_rules() {
        let p = system_prompt("/r", Some("never touch vendored code"));
        assert!(p.contains("Project rules"));
        assert!(p.contains("never touch vendored code"));
    }

    #[test]
    fn beacon_prompt_includes_goal_and_schema() {
        let p = beacon_system_prompt("find the config loader", &["config".into(), "io".into()]);
        assert!(p.contains("find the config loader"));
        assert!(p.contains("config, io"));
        assert!(p.contains("investigation_goal"));
        assert!(p.contains("relevant_files"));
    }

    #[test]
    fn beacon_prompt_without_focus_areas() {
        let p = beacon_system_prompt("map the crate", &[]);
        assert!(p.contains("most relevant to the goal"));
    }
}
