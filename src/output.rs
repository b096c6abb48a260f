use std::io::{self, Write};

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{Clear, ClearType};
use serde::Serialize;

use crate::app::{LoadResult, ProgressEvent, ProgressSink};
use crate::datasets::DatasetFetch;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_load(result: &LoadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dataset(result: &DatasetFetch) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TerminalProgress;

impl TerminalProgress {
    fn draw(event: &ProgressEvent) -> io::Result<()> {
        let mut stderr = io::stderr();
        let line = match event.elapsed {
            Some(elapsed) => format!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => event.message.clone(),
        };
        stderr
            .queue(MoveToColumn(0))?
            .queue(Clear(ClearType::CurrentLine))?
            .queue(SetAttribute(Attribute::Dim))?
            .queue(Print(line))?
            .queue(SetAttribute(Attribute::Reset))?;
        stderr.flush()
    }

    pub fn finish(&self) {
        let _ = writeln!(io::stderr());
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        // progress is advisory; a broken stderr must not fail the load
        let _ = Self::draw(&event);
    }
}
