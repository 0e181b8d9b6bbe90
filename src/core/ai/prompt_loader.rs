// System prompt assembly: knowledge files first, then the main prompt.
//
// Missing or unreadable files are logged and skipped; the service still runs
// with whatever prompt could be built.

use std::fs;
use std::path::Path;

/// Concatenate every `*.txt` in `prompt_dir` (sorted by name, each headed by
/// its file name) followed by the contents of `prompt_file`.
pub fn load_prompt(prompt_dir: Option<&Path>, prompt_file: Option<&Path>) -> String {
    let mut prompt = String::new();

    match prompt_dir {
        None => tracing::warn!("No prompt directory configured, skipping knowledge files"),
        Some(dir) => match fs::read_dir(dir) {
            Ok(entries) => {
                let mut files: Vec<_> = entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.extension().map_or(false, |ext| ext == "txt"))
                    .collect();
                files.sort();

                for path in files {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match fs::read_to_string(&path) {
                        Ok(content) => {
                            prompt.push_str(&format!("Contents of {}\n{}\n\n", name, content.trim()));
                            tracing::info!(file = %name, "Loaded knowledge file");
                        }
                        Err(e) => tracing::warn!(file = %name, "Failed to read knowledge file: {}", e),
                    }
                }
            }
            Err(e) => tracing::warn!(dir = %dir.display(), "Prompt directory unavailable: {}", e),
        },
    }

    match prompt_file {
        None => tracing::warn!("No main prompt file configured"),
        Some(file) => match fs::read_to_string(file) {
            Ok(content) => prompt.push_str(content.trim()),
            Err(e) => tracing::warn!(file = %file.display(), "Failed to read main prompt: {}", e),
        },
    }

    tracing::info!(chars = prompt.chars().count(), "System prompt assembled");
    prompt
}
