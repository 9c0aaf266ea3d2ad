//! Ini editing for MySQL option files
//!
//! Edits are line based so that directives (`!includedir`), comments and
//! boolean keys (`skip-name-resolve`) survive untouched. An existing key is
//! rewritten in place; a new key is appended to the end of its section, and a
//! missing section is appended to the file.

use perconaflow_remote::FileEditor;
use std::io::{Read, Seek, SeekFrom, Write};

/// Ordered `key = value` pairs for one section
pub type IniFields = Vec<(String, String)>;

/// Build [`IniFields`] from borrowed pairs
pub fn fields<K: ToString, V: ToString>(pairs: impl IntoIterator<Item = (K, V)>) -> IniFields {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn section_name(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn key_of(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(['#', ';', '!', '[']) {
        return None;
    }
    Some(line.split_once('=').map_or(line, |(k, _)| k).trim())
}

/// Set `fields` in `section` of `text`
pub fn set_fields(text: &str, section: &str, fields: &[(String, String)]) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut pending: Vec<&(String, String)> = fields.iter().collect();

    // (start, end) of the section body, end exclusive
    let mut body: Option<(usize, usize)> = None;
    for (i, line) in lines.iter().enumerate() {
        if let Some(name) = section_name(line) {
            if let Some((start, _)) = body {
                body = Some((start, i));
                break;
            }
            if name == section {
                body = Some((i + 1, lines.len()));
            }
        }
    }

    match body {
        Some((start, end)) => {
            for line in &mut lines[start..end] {
                let Some(key) = key_of(line) else { continue };
                if let Some(pos) = pending.iter().position(|(k, _)| k == key) {
                    let (k, v) = pending.remove(pos);
                    *line = format!("{} = {}", k, v);
                }
            }
            // New keys go after the section's last key
            let at = (start..end)
                .rev()
                .find(|&i| key_of(&lines[i]).is_some())
                .map_or(start, |i| i + 1);
            let new_lines = pending.iter().map(|(k, v)| format!("{} = {}", k, v));
            lines.splice(at..at, new_lines);
        }
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{}]", section));
            lines.extend(pending.iter().map(|(k, v)| format!("{} = {}", k, v)));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// [`FileEditor`] applying [`set_fields`] to a remote file
pub fn ini_editor(section: &str, fields: IniFields) -> FileEditor {
    let section = section.to_string();
    Box::new(move |file| {
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        let edited = set_fields(&text, &section, &fields);

        file.seek(SeekFrom::Start(0))?;
        file.get_mut().clear();
        file.write_all(edited.as_bytes())?;
        Ok(())
    })
}

/// `[client]` credentials file
pub fn client_credentials(user: &str, password: &str) -> String {
    set_fields(
        "",
        "client",
        &fields([("user", user), ("password", password)]),
    )
}
