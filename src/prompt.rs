use mediashift_transfer::PathPrompt;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

/// Asks on the terminal where a missing disk is mounted today.
///
/// Never prompts when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PathPrompt for TerminalPrompt {
    fn alternate_mount(&self, missing: &Path) -> Option<PathBuf> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        let mut stderr = std::io::stderr();
        _ = write!(stderr, "{} is not mounted. Mount path to use instead (empty to abort): ", missing.display());
        _ = stderr.flush();
        let mut line = String::new();
        stdin.lock().read_line(&mut line).ok()?;
        parse_answer(&line)
    }
}

fn parse_answer(line: &str) -> Option<PathBuf> {
    let answer = line.trim();
    match answer.is_empty() {
        true => None,
        false => Some(PathBuf::from(answer)),
    }
}
