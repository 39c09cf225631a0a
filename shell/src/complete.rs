use std::fs;
use std::path::Path;

/// Outcome of completing the last word of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Sorted matches for the word.
    pub candidates: Vec<String>,
    /// The line with the word completed as far as the candidates agree.
    pub line: String,
}

/// Complete the word after the last whitespace of `line`.
///
/// In command position (first word of a stage) the candidates are `commands`
/// plus the files of `bin_dir`; elsewhere they are entries of the directory
/// the word points into, resolved against `cwd`.
pub fn complete(line: &str, commands: &[&str], bin_dir: &Path, cwd: &Path) -> Completion {
    let word_start = line
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let (head, word) = line.split_at(word_start);

    let before = head.trim_end();
    let command_position = before.is_empty() || before.ends_with('|');

    let candidates = if command_position && !word.contains('/') {
        command_candidates(word, commands, bin_dir)
    } else {
        path_candidates(word, cwd)
    };

    let completed = match candidates.as_slice() {
        [] => word.to_string(),
        [single] if single.ends_with('/') => single.clone(),
        [single] => format!("{} ", single),
        many => longest_common_prefix(many).to_string(),
    };

    Completion {
        line: format!("{}{}", head, completed),
        candidates,
    }
}

fn command_candidates(prefix: &str, commands: &[&str], bin_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = commands
        .iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| name.to_string())
        .collect();

    if let Ok(entries) = fs::read_dir(bin_dir) {
        names.extend(
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.starts_with(prefix)),
        );
    }

    names.sort();
    names.dedup();
    names
}

fn path_candidates(word: &str, cwd: &Path) -> Vec<String> {
    let (dir_part, file_prefix) = match word.rfind('/') {
        Some(i) => word.split_at(i + 1),
        None => ("", word),
    };
    let dir = if dir_part.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(dir_part)
    };

    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let show_hidden = file_prefix.starts_with('.');

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(file_prefix) || (name.starts_with('.') && !show_hidden) {
                return None;
            }
            let suffix = if entry.path().is_dir() { "/" } else { "" };
            Some(format!("{}{}{}", dir_part, name, suffix))
        })
        .collect();
    names.sort();
    names
}

fn longest_common_prefix(words: &[String]) -> &str {
    let Some(first) = words.first() else {
        return "";
    };
    let mut end = first.len();
    for word in &words[1..] {
        end = first
            .char_indices()
            .zip(word.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, a), _)| i + a.len_utf8())
            .unwrap_or(0)
            .min(end);
    }
    &first[..end]
}
