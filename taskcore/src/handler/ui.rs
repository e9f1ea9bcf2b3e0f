//! The confirmation and output surface a handler talks to.
//!
//! Rendering is up to the implementation; the handler only fixes the call
//! contract (in particular, a user who declines to decide produces a
//! cancellation, not a "no").

use serde::Serialize;

use crate::error::TaskError;

/// Answer to a yes/no question. `Cancel` means the user declined to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

/// Tabular output: a header row and data rows of the same width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Width of every column: the longest cell, header included.
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(width),
                    None => widths.push(width),
                }
            }
        }
        widths
    }
}

/// Presentation surface for a [`TaskHandler`](crate::handler::TaskHandler).
///
/// Implementations must be callable from several threads at once.
pub trait UserInterface: Send + Sync {
    fn ask(&self, question: &str) -> Answer;
    fn output(&self, title: &str, message: &str);
    fn output_table(&self, title: &str, table: &Table);
    fn report_error(&self, error: &TaskError);
}
