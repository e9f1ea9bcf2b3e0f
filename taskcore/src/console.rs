//! Terminal implementation of [`UserInterface`].
//!
//! Prompts and errors go to stderr; command output goes to stdout.

use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

use taskcore::TaskError;
use taskcore::handler::{Answer, Table, UserInterface};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ConsoleUi {
    // Keeps concurrent prompts from interleaving.
    prompt: Mutex<()>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserInterface for ConsoleUi {
    /// Reads answers from stdin until one parses. EOF is a cancel.
    fn ask(&self, question: &str) -> Answer {
        let _prompt = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            eprint!("{question} [y/n/c] ");
            let _ = io::stderr().flush();
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return Answer::Cancel,
                Ok(_) => {
                    if let Some(answer) = parse_answer(&line) {
                        return answer;
                    }
                }
                Err(err) => {
                    warn!(%err, "reading answer failed");
                    return Answer::Cancel;
                }
            }
        }
    }

    fn output(&self, title: &str, message: &str) {
        println!("{title}: {message}");
    }

    fn output_table(&self, title: &str, table: &Table) {
        println!("{title}");
        print!("{}", render_table(table));
    }

    fn report_error(&self, error: &TaskError) {
        eprintln!("error: {}", error.chain_message());
    }
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Yes),
        "n" | "no" => Some(Answer::No),
        "c" | "cancel" => Some(Answer::Cancel),
        _ => None,
    }
}

/// Left-aligned columns separated by two spaces, one line per row.
fn render_table(table: &Table) -> String {
    let widths = table.column_widths();
    let mut out = String::new();
    for row in std::iter::once(&table.headers).chain(&table.rows) {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}
