//! Minimal terminal-echo utility. Echoes stdin lines to stdout; does not
//! attempt raw-mode/ANSI passthrough — that is OS-terminal plumbing, not
//! core-language behavior.

use std::io::{BufRead, Write};

pub fn run(mut input: impl BufRead, mut out: impl Write) {
    let mut line = String::new();
    loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                let _ = write!(out, "{}", line.trim_end_matches(['\n', '\r']));
                let _ = writeln!(out);
            }
        }
    }
}
