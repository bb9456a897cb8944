//! Terminal output and prompting.

use std::io::{self, BufRead as _, Write as _};

/// Prints a value picked on the user's behalf, e.g. the CA endpoint.
pub fn print_selected(name: &str, value: &str) {
    eprintln!("✔ {name}: {value}");
}

/// Asks the user for input.
pub trait Prompter {
    /// Prompts until a non-empty answer is given.
    fn prompt_non_empty(&self, question: &str) -> eyre::Result<String>;
}

/// Prompts on stderr and reads answers from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_non_empty(&self, question: &str) -> eyre::Result<String> {
        let stdin = io::stdin();

        loop {
            eprint!("{question}: ");
            io::stderr().flush()?;

            let mut answer = String::new();
            if stdin.lock().read_line(&mut answer)? == 0 {
                eyre::bail!("no input available for prompt");
            }

            let answer = answer.trim();
            if !answer.is_empty() {
                return Ok(answer.to_owned());
            }

            eprintln!("value cannot be empty");
        }
    }
}
